#[path = "common/mod.rs"]
mod common;

use common::*;
use ddd::{
    staging_path_for, Catalog, HourBucket, HourlyCounts, IdentityReconciler, IntegrityMode, ReportFilter, StagingStore,
};
use std::fs;

fn out_dir_entries(tree: &RawTree) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(tree.store().parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn missing_guild_dump_leaves_store_untouched() {
    let tree = make_raw_basic();
    tree.etl().build().unwrap();
    let before = fs::read(tree.store()).unwrap();

    fs::remove_file(tree.raw().join("guilds.txt")).unwrap();
    tree.archive_csv("extra.csv", &format!("channel_id,message_id,user_id\n10,{},7\n", snowflake_at(H10, 77)));
    let err = tree.etl().build().unwrap_err();
    assert!(format!("{err:#}").contains("guild dump"));

    assert_eq!(fs::read(tree.store()).unwrap(), before);
    assert_eq!(out_dir_entries(&tree), vec!["ddd.db"]);
}

#[test]
fn corrupt_archive_aborts_and_discards_staging() {
    let tree = make_raw_basic();
    tree.etl().build().unwrap();
    let before = fs::read(tree.store()).unwrap();

    // Named like a compressed archive, but not a zstd stream.
    tree.archive_csv("broken.csv.zst", "channel_id,message_id,user_id\n10,1,7\n");
    assert!(tree.etl().build().is_err());
    assert!(tree.etl().integrity(Some(IntegrityMode::Quick { sample_bytes: 1024 })).build().is_err());

    assert_eq!(fs::read(tree.store()).unwrap(), before);
    assert_eq!(out_dir_entries(&tree), vec!["ddd.db"]);
}

#[test]
fn archive_without_usable_header_is_fatal() {
    let tree = make_raw_basic();
    tree.archive_csv("headless.csv", "guild_id,user_id\n1,7\n");
    let err = tree.etl().build().unwrap_err();
    assert!(format!("{err:#}").contains("channel_id"));
    assert!(!tree.store().exists());
}

#[test]
fn dropped_staging_store_removes_its_file() {
    let tree = RawTree::new();
    let live = tree.store();
    let staging = StagingStore::create(&live).unwrap();
    let path = staging.path().to_path_buf();
    assert_eq!(path, staging_path_for(&live));
    assert!(path.exists());
    assert_ne!(path, live);

    drop(staging);
    assert!(!path.exists());
    assert!(!live.exists());
}

#[test]
fn rebuild_replaces_the_store_and_old_readers_keep_working() {
    let tree = make_raw_basic();
    let etl = tree.etl();
    etl.build().unwrap();
    let old = etl.open_store().unwrap();
    assert_eq!(old.total(&ReportFilter::default()).unwrap(), 15);

    tree.archive_csv("more.csv", &format!("channel_id,message_id,user_id\n10,{},7\n", snowflake_at(H11, 1)));
    etl.build().unwrap();

    assert_eq!(etl.open_store().unwrap().total(&ReportFilter::default()).unwrap(), 16);
    assert_eq!(old.total(&ReportFilter::default()).unwrap(), 15);
    assert_eq!(out_dir_entries(&tree), vec!["ddd.db"]);
}

#[test]
fn failed_write_discards_a_partially_written_staging_store() {
    let tree = RawTree::new();
    let live = tree.store();
    let mut catalog = Catalog::new();
    catalog.add_guild(1, "One");
    let mut users = IdentityReconciler::new();
    users.register_external(7, "Alice");
    let mut counts: HourlyCounts = HourlyCounts::new();
    counts.add(10, 7, HourBucket::containing(H10), u64::MAX);

    let mut staging = StagingStore::create(&live).unwrap();
    let path = staging.path().to_path_buf();
    let err = staging.write_all(&catalog, &users, &counts, false).unwrap_err();
    assert!(format!("{err:#}").contains("count for channel 10"));
    assert!(path.exists());

    drop(staging);
    assert!(!path.exists());
    assert!(!live.exists());
}

#[test]
fn store_write_failure_leaves_the_live_store_untouched() {
    let tree = make_raw_basic();
    tree.etl().build().unwrap();
    let before = fs::read(tree.store()).unwrap();

    // Summed with Alice's two messages at 10:00 the count no longer fits the store.
    tree.archive_csv(
        "overflow.csv",
        "channel_id,user_id,hour,count
10,7,2021-03-04 10:00:00,9223372036854775807
",
    );
    let err = tree.etl().build().unwrap_err();
    assert!(format!("{err:#}").contains("does not fit"));

    assert_eq!(fs::read(tree.store()).unwrap(), before);
    assert_eq!(out_dir_entries(&tree), vec!["ddd.db"]);
}
