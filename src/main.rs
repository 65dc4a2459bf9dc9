use anyhow::Result;
use ddd::{ChatLogETL, IntegrityMode};
use std::path::PathBuf;
use time::Duration;

const RAW_ROOT: &str = "./raw";
const STORE: &str = "./ddd.db";
const CORPUS_ROOT: &str = "./corpus";

fn main() -> Result<()> {
    let hw = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(8);

    let etl = ChatLogETL::new()
        .raw_dir(PathBuf::from(RAW_ROOT))
        .store_path(PathBuf::from(STORE))
        .parallelism(hw)
        .file_concurrency(4)
        .integrity(Some(IntegrityMode::Quick { sample_bytes: 1 << 20 }))
        .progress(true)
        .progress_label("Aggregating")
        .env_overrides();

    let report = etl.build()?;
    println!(
        "Stored {} messages in {} rows ({} users, {} months)",
        report.messages, report.store.rows, report.store.users, report.store.months
    );

    let store = etl.open_store()?;
    let ranked = store.top_users_per_guild(None, 5, None)?;
    for guild in store.guilds()? {
        let Some(top) = ranked.get(&guild.id) else { continue };
        println!("{} ({})", guild.name, guild.id);
        for (rank, user) in top.iter().enumerate() {
            println!("  {}. {} - {}", rank + 1, user.display_name, user.total);
        }
    }

    if std::env::args().nth(1).as_deref() == Some("corpus") {
        let corpus = etl.training_corpus(PathBuf::from(CORPUS_ROOT), Some(Duration::days(365)), 10)?;
        println!("Wrote {} messages into {} corpus files", corpus.messages, corpus.files.len());
    }

    Ok(())
}
