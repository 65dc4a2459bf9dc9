#[path = "common/mod.rs"]
mod common;

use common::*;
use ddd::{
    aggregate_sources, discover_all, Aggregator, BuildOptions, HourBucket, HourlyCount, HourlyCounts,
    IdentityReconciler, Moment, ReadOptions, ResolvedRecord, UserRef, YearMonth,
};

fn record(channel_id: u64, user_id: u64, message_id: u64) -> ResolvedRecord {
    ResolvedRecord { channel_id, user_id, hour: Moment::Message(message_id).hour(), count: 1 }
}

#[test]
fn messages_in_one_hour_fold_into_counts() {
    let mut counts: HourlyCounts = HourlyCounts::new();
    for rec in [record(1, 7, 1000), record(1, 7, 1001), record(1, 9, 2000)] {
        counts.ingest(&rec);
    }
    let h = HourBucket::of_snowflake(1000);
    assert_eq!(
        counts.sorted_rows(),
        vec![
            HourlyCount { channel_id: 1, user_id: 7, hour: h, count: 2 },
            HourlyCount { channel_id: 1, user_id: 9, hour: h, count: 1 },
        ]
    );
    assert_eq!(counts.channel_total(1), 3);
    assert_eq!(counts.months().iter().copied().collect::<Vec<_>>(), vec![YearMonth::new(2015, 1)]);
}

#[test]
fn merge_order_does_not_matter() {
    let h10 = HourBucket::containing(H10);
    let h11 = HourBucket::containing(H11);
    let april = HourBucket::containing(APRIL);

    let part = |rows: &[(u64, u64, HourBucket, u64)]| {
        let mut c: HourlyCounts = HourlyCounts::new();
        for &(ch, u, h, n) in rows {
            c.add(ch, u, h, n);
        }
        c
    };
    let a = part(&[(10, 7, h10, 2), (10, 8, h11, 1)]);
    let b = part(&[(10, 7, h10, 3), (11, 7, april, 4)]);
    let c = part(&[(11, 9, h11, 1)]);

    let mut left = a.clone();
    left.merge(b.clone());
    left.merge(c.clone());

    let mut right = c;
    right.merge(a);
    right.merge(b);

    assert_eq!(left.sorted_rows(), right.sorted_rows());
    assert_eq!(left.months(), right.months());
    assert_eq!(left.get(10, 7, h10), 5);
    assert_eq!(left.total(), 11);
    assert_eq!(left.triples(), 4);
}

#[test]
fn zero_counts_leave_no_trace() {
    let mut counts: HourlyCounts = HourlyCounts::new();
    counts.add(10, 7, HourBucket::containing(APRIL), 0);
    assert_eq!(counts.triples(), 0);
    assert!(counts.months().is_empty());
}

#[test]
fn file_concurrency_does_not_change_the_result() {
    let tree = make_raw_basic();
    let opts = BuildOptions::default().with_raw_dir(tree.raw());
    let jobs = discover_all(&opts).jobs;
    assert_eq!(jobs.len(), 3);

    let run = |limit: usize| aggregate_sources(&jobs, limit, &ReadOptions::default()).unwrap();
    let serial = run(1);
    let parallel = run(4);
    let resolved = |counts: HourlyCounts<UserRef>| counts.resolve_users(&mut IdentityReconciler::new()).sorted_rows();

    assert_eq!(serial.counts.total(), 15);
    assert_eq!(serial.stats, parallel.stats);
    assert_eq!(serial.stats.files, 3);
    assert_eq!(serial.stats.records, 9);
    assert_eq!(serial.channel_guilds.get(&20), Some(&2));
    assert_eq!(serial.channel_guilds.get(&10), Some(&1));
    assert_eq!(resolved(serial.counts), resolved(parallel.counts));
}

#[test]
fn reconciliation_does_not_depend_on_arrival_order() {
    let h = HourBucket::containing(H10);
    let native = UserRef::external(100);
    let migrated = UserRef { internal: Some(100), external: Some(500) };

    let resolve = |native_first: bool| {
        let mut a = HourlyCounts::<UserRef>::new();
        a.add(10, native, h, 1);
        let mut b = HourlyCounts::<UserRef>::new();
        b.add(10, migrated, h, 2);
        let merged = if native_first {
            a.merge(b);
            a
        } else {
            b.merge(a);
            b
        };
        let mut ids = IdentityReconciler::new();
        let rows = merged.resolve_users(&mut ids).sorted_rows();
        (rows, ids.external_map(), ids.duplicates())
    };

    let (rows, aliases, duplicates) = resolve(true);
    assert_eq!((rows.clone(), aliases.clone(), duplicates), resolve(false));
    // The migrated reference keeps internal id 100; the native id 100 is moved past it.
    assert_eq!(
        rows,
        vec![
            HourlyCount { channel_id: 10, user_id: 100, hour: h, count: 2 },
            HourlyCount { channel_id: 10, user_id: 101, hour: h, count: 1 },
        ]
    );
    assert_eq!(aliases, vec![(100, 101), (500, 100)]);
    assert_eq!(duplicates, 0);
}

#[test]
fn references_to_one_user_are_summed_after_resolution() {
    let h = HourBucket::containing(H10);
    let mut counts = HourlyCounts::<UserRef>::new();
    counts.add(10, UserRef::external(500), h, 2);
    counts.add(10, UserRef { internal: Some(9000), external: Some(500) }, h, 3);
    counts.add(10, UserRef::internal(9000), h, 4);

    let mut ids = IdentityReconciler::new();
    let resolved = counts.resolve_users(&mut ids);
    assert_eq!(resolved.sorted_rows(), vec![HourlyCount { channel_id: 10, user_id: 9000, hour: h, count: 9 }]);
    assert_eq!(resolved.months().len(), 1);
}
