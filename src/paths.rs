use crate::config::BuildOptions;
use crate::sources::parse_id;
use regex::Regex;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::Date;
use walkdir::WalkDir;

/// Type of record-bearing source file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// `archives/*.csv[.zst]`
    Archive { compressed: bool },
    /// `logs/<guild_id>/<channel_id>/<YYYY-MM-DD>[.zst]`
    DayLog { guild_id: u64, channel_id: u64, day: Date, compressed: bool },
}

#[derive(Clone, Debug)]
pub struct SourceJob {
    pub kind: SourceKind,
    pub path: PathBuf,
}

/// Per-guild channel dump (`channels/<guild_id>.txt`).
#[derive(Clone, Debug)]
pub struct ChannelDump {
    pub guild_id: u64,
    pub path: PathBuf,
}

/// Everything found under the raw directory, in deterministic order.
#[derive(Clone, Debug, Default)]
pub struct Discovered {
    pub guilds_file: PathBuf,
    pub channel_dumps: Vec<ChannelDump>,
    pub user_dumps: Vec<PathBuf>,
    pub jobs: Vec<SourceJob>,
}

fn sorted_files(dir: &Path, min_depth: usize, max_depth: usize) -> Vec<walkdir::DirEntry> {
    if !dir.exists() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(min_depth)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect()
}

fn discover_channel_dumps(dir: &Path) -> Vec<ChannelDump> {
    let re = Regex::new(r"^(\d+)\.txt$").unwrap();
    sorted_files(dir, 1, 1)
        .into_iter()
        .filter_map(|ent| {
            let name = ent.file_name().to_str()?;
            let caps = re.captures(name)?;
            let guild_id = parse_id(&caps[1])?;
            Some(ChannelDump { guild_id, path: ent.path().to_path_buf() })
        })
        .collect()
}

fn discover_user_dumps(dir: &Path) -> Vec<PathBuf> {
    sorted_files(dir, 1, 1)
        .into_iter()
        .filter(|ent| ent.path().extension().is_some_and(|x| x == "txt"))
        .map(|ent| ent.path().to_path_buf())
        .collect()
}

fn discover_archives(dir: &Path) -> Vec<SourceJob> {
    let re = Regex::new(r"^.+\.csv(\.zst)?$").unwrap();
    sorted_files(dir, 1, 1)
        .into_iter()
        .filter_map(|ent| {
            let name = ent.file_name().to_str()?;
            let caps = re.captures(name)?;
            Some(SourceJob {
                kind: SourceKind::Archive { compressed: caps.get(1).is_some() },
                path: ent.path().to_path_buf(),
            })
        })
        .collect()
}

fn discover_day_logs(dir: &Path) -> Vec<SourceJob> {
    let id_re = Regex::new(r"^\d+$").unwrap();
    let day_re = Regex::new(r"^(\d{4}-\d{2}-\d{2})(\.zst)?$").unwrap();
    let day_format = format_description!("[year]-[month]-[day]");

    let mut jobs = Vec::new();
    for ent in sorted_files(dir, 3, 3) {
        let path = ent.path();
        let Some(name) = ent.file_name().to_str() else { continue };
        let Some(caps) = day_re.captures(name) else {
            tracing::debug!(path = %path.display(), "ignoring file with a non-date name under logs/");
            continue;
        };
        let Ok(day) = Date::parse(&caps[1], day_format) else { continue };

        let channel_dir = path.parent();
        let guild_dir = channel_dir.and_then(Path::parent);
        let component = |p: Option<&Path>| -> Option<u64> {
            let s = p?.file_name()?.to_str()?;
            if id_re.is_match(s) { parse_id(s) } else { None }
        };
        let (Some(guild_id), Some(channel_id)) = (component(guild_dir), component(channel_dir)) else {
            tracing::debug!(path = %path.display(), "ignoring day log outside <guild_id>/<channel_id>/");
            continue;
        };
        jobs.push(SourceJob {
            kind: SourceKind::DayLog { guild_id, channel_id, day, compressed: caps.get(2).is_some() },
            path: path.to_path_buf(),
        });
    }
    jobs
}

/// Walk the raw directory. Missing optional directories simply contribute nothing;
/// the presence of the required guild dump is checked by the pipeline.
pub fn discover_all(opts: &BuildOptions) -> Discovered {
    let mut jobs = discover_archives(&opts.archives_dir);
    jobs.extend(discover_day_logs(&opts.logs_dir));
    Discovered {
        guilds_file: opts.guilds_file.clone(),
        channel_dumps: discover_channel_dumps(&opts.channels_dir),
        user_dumps: discover_user_dumps(&opts.users_dir),
        jobs,
    }
}
