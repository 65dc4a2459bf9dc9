#![allow(dead_code)]

use ddd::ChatLogETL;
use rusqlite::{Connection, OpenFlags};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const EPOCH_MS: u64 = 1_420_070_400_000;

/// 2021-03-04 10:00:00 UTC
pub const H10: i64 = 1_614_852_000;
/// 2021-03-04 11:00:00 UTC
pub const H11: i64 = H10 + 3600;
/// 2021-04-01 00:00:00 UTC
pub const APRIL: i64 = 1_617_235_200;

/// A snowflake created at `unix_secs`, made unique by `seq`.
pub fn snowflake_at(unix_secs: i64, seq: u64) -> u64 {
    ((unix_secs as u64 * 1000 - EPOCH_MS) << 22) | (seq & 0x3f_ffff)
}

/// Write a compressed `.zst` file with the given bytes.
pub fn write_zst(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap();
}

pub fn write_text(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

/// Read a text file line-by-line into strings (skips empty lines).
pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    let r = BufReader::new(f);
    r.lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

/// Framed day-log record: `message_id|send_time|user_id|content`.
pub fn framed(message_id: u64, user_id: u64, content: &str) -> String {
    format!("{}|2021-03-04T10:00:00|{}|{}", message_id, user_id, content)
}

/// A raw directory plus a store location, both inside one temp dir.
pub struct RawTree {
    pub base: PathBuf,
}

impl RawTree {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self { base: dir.into_path() }
    }

    pub fn raw(&self) -> PathBuf {
        self.base.join("raw")
    }

    pub fn store(&self) -> PathBuf {
        self.base.join("out").join("ddd.db")
    }

    pub fn guilds(&self, rows: &[(u64, &str)]) -> &Self {
        let text: String = rows.iter().map(|(id, name)| format!("{}|{}\n", id, name)).collect();
        write_text(&self.raw().join("guilds.txt"), &text);
        self
    }

    pub fn channels(&self, guild_id: u64, rows: &[(u64, &str)]) -> &Self {
        let text: String = rows.iter().map(|(id, name)| format!("{}|{}\n", id, name)).collect();
        write_text(&self.raw().join("channels").join(format!("{}.txt", guild_id)), &text);
        self
    }

    /// Raw user dump lines (`id|name[|internal_id]`).
    pub fn users(&self, file: &str, lines: &[&str]) -> &Self {
        let text: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        write_text(&self.raw().join("users").join(file), &text);
        self
    }

    pub fn archive_csv(&self, file: &str, text: &str) -> &Self {
        write_text(&self.raw().join("archives").join(file), text);
        self
    }

    pub fn archive_zst(&self, file: &str, text: &str) -> &Self {
        write_zst(&self.raw().join("archives").join(file), text.as_bytes());
        self
    }

    /// Compressed day log of NUL-separated records.
    pub fn day_log(&self, guild_id: u64, channel_id: u64, day: &str, records: &[String]) -> &Self {
        let path = self.raw().join("logs").join(guild_id.to_string()).join(channel_id.to_string()).join(format!("{}.zst", day));
        write_zst(&path, records.join("\0").as_bytes());
        self
    }

    pub fn etl(&self) -> ChatLogETL {
        ChatLogETL::new()
            .raw_dir(self.raw())
            .store_path(self.store())
            .file_concurrency(2)
            .progress(false)
    }

    pub fn open_db(&self) -> Connection {
        Connection::open_with_flags(self.store(), OpenFlags::SQLITE_OPEN_READ_ONLY).unwrap()
    }

    /// All `(channel_id, user_id, hour, count)` rows, sorted.
    pub fn stored_rows(&self) -> Vec<(u64, u64, i64, u64)> {
        let conn = self.open_db();
        let mut stmt = conn
            .prepare("SELECT channel_id, user_id, hour, count FROM messages ORDER BY channel_id, user_id, hour")
            .unwrap();
        stmt.query_map([], |r| {
            Ok((r.get::<_, i64>(0)? as u64, r.get::<_, i64>(1)? as u64, r.get(2)?, r.get::<_, i64>(3)? as u64))
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
    }
}

/// A small but complete raw tree:
/// - guild 1 "Rustaceans" with channels 10 "general" and 11 "help"; guild 2 "Gamers" with channel 20.
/// - users 7 "Alice", 8 "Bob", 9 "Carol" (external ids); user 500 migrated with internal id 9000.
/// - a plain archive of per-message rows, a compressed pre-aggregated archive,
///   and one compressed day log for channel 20.
pub fn make_raw_basic() -> RawTree {
    let tree = RawTree::new();
    tree.guilds(&[(1, "Rustaceans"), (2, "Gamers")])
        .channels(1, &[(10, "general"), (11, "help")])
        .channels(2, &[(20, "lobby")])
        .users("users.txt", &["7|Alice", "8|Bob", "9|Carol", "500|Dave|9000"]);

    // Channel 10: Alice x2 and Bob x1 in hour H10, Alice x1 in H11.
    let messages = format!(
        "channel_id,guild_id,message_id,user_id,content\n\
         10,1,{},7,hello\n\
         10,1,{},7,again\n\
         10,1,{},8,hi alice\n\
         10,1,{},7,later\n",
        snowflake_at(H10 + 5, 1),
        snowflake_at(H10 + 65, 2),
        snowflake_at(H10 + 120, 3),
        snowflake_at(H11 + 30, 4),
    );
    tree.archive_csv("messages.csv", &messages);

    // Channel 11: pre-aggregated counts, one for the migrated user by internal id.
    let hourly = "channel_id,guild_id,user_id,int_user_id,hour,count\n\
                  11,1,8,,2021-03-04 10:00:00,5\n\
                  11,1,,9000,2021-04-01 00:00:00,3\n";
    tree.archive_zst("hourly.csv.zst", hourly);

    // Channel 20: Carol x2, Bob x1.
    tree.day_log(
        2,
        20,
        "2021-03-04",
        &[
            framed(snowflake_at(H10 + 10, 5), 9, "gg"),
            framed(snowflake_at(H10 + 20, 6), 9, "wp"),
            framed(snowflake_at(H11 + 40, 7), 8, "rematch?"),
        ],
    );
    tree
}
