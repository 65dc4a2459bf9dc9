#[path = "common/mod.rs"]
mod common;

use common::*;
use ddd::{BuildOptions, ChatLogETL, IntegrityMode};
use std::collections::BTreeMap;

#[test]
fn build_stores_every_hourly_count() {
    let tree = make_raw_basic();
    let report = tree.etl().build().unwrap();

    assert_eq!(
        tree.stored_rows(),
        vec![
            (10, 7, H10, 2),
            (10, 7, H11, 1),
            (10, 8, H10, 1),
            (11, 8, H10, 5),
            (11, 9000, APRIL, 3),
            (20, 8, H11, 1),
            (20, 9, H10, 2),
        ]
    );
    assert_eq!(report.messages, 15);
    assert_eq!(report.store.rows, 7);
    assert_eq!(report.store.rejected_rows, 0);
    assert_eq!(report.sources.files, 3);
    assert_eq!(report.sources.records, 9);
    assert_eq!(report.sources.malformed, 0);
    assert_eq!(report.dumps.records, 2 + 3 + 4);
    assert_eq!(report.unresolved, 0);
}

#[test]
fn per_channel_totals_are_conserved() {
    let tree = make_raw_basic();
    tree.etl().build().unwrap();

    let mut per_channel: BTreeMap<u64, u64> = BTreeMap::new();
    for (channel, _, _, count) in tree.stored_rows() {
        *per_channel.entry(channel).or_default() += count;
    }
    // Per-message rows count one each; pre-aggregated rows add their count.
    assert_eq!(per_channel.get(&10), Some(&4));
    assert_eq!(per_channel.get(&11), Some(&(5 + 3)));
    assert_eq!(per_channel.get(&20), Some(&3));
}

#[test]
fn triples_are_unique_and_counts_positive() {
    let tree = make_raw_basic();
    // The same messages again from a second archive: summed, never a second row.
    tree.archive_csv(
        "messages_again.csv",
        &format!("channel_id,message_id,user_id\n10,{},7\n", snowflake_at(H10 + 7, 99)),
    );
    tree.etl().build().unwrap();

    let conn = tree.open_db();
    let dupes: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM (SELECT 1 FROM messages GROUP BY channel_id, user_id, hour HAVING COUNT(*) > 1)",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(dupes, 0);
    let non_positive: i64 = conn.query_row("SELECT COUNT(*) FROM messages WHERE count <= 0", [], |r| r.get(0)).unwrap();
    assert_eq!(non_positive, 0);
    assert!(tree.stored_rows().contains(&(10, 7, H10, 3)));
}

#[test]
fn months_catalog_and_users_are_written() {
    let tree = make_raw_basic();
    tree.etl().build().unwrap();
    let conn = tree.open_db();

    let months: Vec<String> = conn
        .prepare("SELECT month FROM months ORDER BY month")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(months, vec!["2021-03", "2021-04"]);

    let channels: Vec<(i64, i64, String)> = conn
        .prepare("SELECT channel_id, guild_id, name FROM channels ORDER BY channel_id")
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(
        channels,
        vec![(10, 1, "general".to_string()), (11, 1, "help".to_string()), (20, 2, "lobby".to_string())]
    );

    let users: Vec<(i64, i64, Option<String>)> = conn
        .prepare("SELECT user_id, external_id, name FROM users ORDER BY user_id")
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(
        users,
        vec![
            (7, 7, Some("Alice".to_string())),
            (8, 8, Some("Bob".to_string())),
            (9, 9, Some("Carol".to_string())),
            (9000, 500, Some("Dave".to_string())),
        ]
    );
}

#[test]
fn ids_seen_only_in_data_are_named_by_id() {
    let tree = make_raw_basic();
    tree.day_log(3, 30, "2021-03-04", &[framed(snowflake_at(H10, 1), 31337, "hey")]);
    tree.etl().build().unwrap();

    let store = tree.etl().open_store().unwrap();
    let guilds: Vec<(u64, String)> = store.guilds().unwrap().into_iter().map(|g| (g.id, g.name)).collect();
    assert!(guilds.contains(&(3, "3".to_string())));
    let orphan = store.channels().unwrap().into_iter().find(|c| c.id == 30).unwrap();
    assert_eq!((orphan.guild_id, orphan.name.as_str()), (3, "30"));
    assert!(tree.stored_rows().contains(&(30, 31337, H10, 1)));
    let users = store.users().unwrap();
    let unnamed = users.iter().find(|u| u.id == 31337).unwrap();
    assert_eq!(unnamed.name, "31337");
}

#[test]
fn duplicate_identities_are_counted_not_fatal() {
    let tree = make_raw_basic();
    tree.users("zz_more.txt", &["7|alice", "7|Alicia", "8|Bob"]);
    let report = tree.etl().build().unwrap();

    assert_eq!(report.duplicate_identities, 1);
    let name: String = tree
        .open_db()
        .query_row("SELECT name FROM users WHERE user_id = 7", [], |r| r.get(0))
        .unwrap();
    assert_eq!(name, "Alice");
}

#[test]
fn malformed_and_empty_records_are_skipped() {
    let tree = make_raw_basic();
    tree.archive_csv(
        "noisy.csv",
        &format!(
            "channel_id,message_id,user_id\n\
             10,not-a-number,7\n\
             10,{},\n\
             10,{},8\n",
            snowflake_at(H10 + 1, 50),
            snowflake_at(H10 + 2, 51),
        ),
    );
    tree.day_log(
        2,
        20,
        "2021-03-05",
        &["   ".to_string(), "garbage".to_string(), framed(snowflake_at(H11 + 86_400, 60), 9, "next day")],
    );
    let report = tree.etl().build().unwrap();

    assert_eq!(report.sources.malformed, 3);
    assert_eq!(report.sources.empty, 1);
    assert_eq!(report.messages, 15 + 2);
    assert!(tree.stored_rows().contains(&(10, 8, H10, 2)));
    assert!(tree.stored_rows().contains(&(20, 9, H11 + 86_400, 1)));
}

#[test]
fn options_come_from_the_builder_and_environment() {
    let tree = make_raw_basic();
    let opts = BuildOptions::default()
        .with_raw_dir(tree.raw())
        .with_file_concurrency(0)
        .with_integrity(Some(IntegrityMode::Full));
    assert_eq!(opts.guilds_file, tree.raw().join("guilds.txt"));
    assert_eq!(opts.logs_dir, tree.raw().join("logs"));
    assert_eq!(opts.file_concurrency, 1);

    std::env::set_var("DDD_STORE", tree.store());
    std::env::set_var("DDD_FILE_CONCURRENCY", "3");
    let etl = ChatLogETL::from_options(opts).env_overrides().progress(false);
    std::env::remove_var("DDD_STORE");
    std::env::remove_var("DDD_FILE_CONCURRENCY");

    assert_eq!(etl.options().store_path, tree.store());
    assert_eq!(etl.options().file_concurrency, 3);
    assert_eq!(etl.options().integrity, Some(IntegrityMode::Full));
    etl.build().unwrap();
    assert_eq!(tree.stored_rows().len(), 7);
}

/// Channel 10 with a native user whose external id 100 collides with the internal
/// id of a migrated user (external 500), each in its own archive.
fn colliding_ids(native_file: &str, migrated_file: &str) -> RawTree {
    let tree = RawTree::new();
    tree.guilds(&[(1, "One")]).channels(1, &[(10, "general")]);
    tree.archive_csv(native_file, &format!("channel_id,message_id,user_id\n10,{},100\n", snowflake_at(H10 + 1, 1)));
    tree.archive_csv(
        migrated_file,
        &format!(
            "channel_id,message_id,user_id,int_user_id\n10,{},500,100\n10,{},500,100\n",
            snowflake_at(H10 + 2, 2),
            snowflake_at(H10 + 3, 3),
        ),
    );
    tree
}

fn stored_users(tree: &RawTree) -> Vec<(i64, i64)> {
    tree.open_db()
        .prepare("SELECT user_id, external_id FROM users ORDER BY user_id")
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
}

#[test]
fn source_order_does_not_change_identities_or_counts() {
    let native_first = colliding_ids("a.csv", "b.csv");
    let migrated_first = colliding_ids("b.csv", "a.csv");
    let first = native_first.etl().file_concurrency(1).build().unwrap();
    let second = migrated_first.etl().file_concurrency(1).build().unwrap();

    assert_eq!(native_first.stored_rows(), migrated_first.stored_rows());
    assert_eq!(native_first.stored_rows(), vec![(10, 100, H10, 2), (10, 101, H10, 1)]);
    assert_eq!(stored_users(&native_first), vec![(100, 500), (101, 100)]);
    assert_eq!(stored_users(&native_first), stored_users(&migrated_first));
    assert_eq!(first.duplicate_identities, second.duplicate_identities);
    assert_eq!(first.duplicate_identities, 0);
}

#[test]
fn migrated_row_conflicting_with_a_named_user_is_a_duplicate() {
    let tree = colliding_ids("a.csv", "b.csv");
    tree.users("users.txt", &["100|Zed"]);
    let report = tree.etl().build().unwrap();

    // Internal id 100 already belongs to Zed (external 100); the migrated rows still count for it.
    assert_eq!(report.duplicate_identities, 1);
    assert_eq!(tree.stored_rows(), vec![(10, 100, H10, 3)]);
    assert_eq!(stored_users(&tree), vec![(100, 100)]);
}

#[test]
fn ids_beyond_the_storable_range_are_malformed_not_fatal() {
    let tree = make_raw_basic();
    tree.archive_csv(
        "odd.csv",
        &format!(
            "channel_id,guild_id,message_id,user_id,int_user_id\n\
             18446744073709551615,1,{},7,\n\
             10,18446744073709551615,{},7,\n\
             10,1,{},9223372036854775808,\n\
             10,1,{},,9223372036854775808\n\
             10,1,{},9223372036854775807,\n",
            snowflake_at(H10, 70),
            snowflake_at(H10, 71),
            snowflake_at(H10, 72),
            snowflake_at(H10, 73),
            snowflake_at(H10, 74),
        ),
    );
    tree.day_log(2, 20, "2021-03-07", &[format!("{}|t|18446744073709551615|too big", snowflake_at(H10, 75))]);
    let report = tree.etl().build().unwrap();

    assert_eq!(report.sources.malformed, 5);
    assert_eq!(report.messages, 15 + 1);
    assert!(tree.stored_rows().contains(&(10, i64::MAX as u64, H10, 1)));
}
