//! `club_backup_YYYYMMDD_HHMMSS[_NN].<ext>` file names, always in UTC.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

pub const PREFIX: &str = "club_backup_";

const STAMP: &[FormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

/// Highest same-second suffix tried before giving up.
const MAX_SEQ: u32 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    /// Output of the server's own dump tool.
    Sql,
    /// Portable row dump written by the application.
    Json,
}

impl DumpFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            DumpFormat::Sql => "sql",
            DumpFormat::Json => "json",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "sql" => Some(DumpFormat::Sql),
            "json" => Some(DumpFormat::Json),
            _ => None,
        }
    }
}

/// A file name that follows the dump naming scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpName {
    pub file_name: String,
    pub created_at: OffsetDateTime,
    pub seq: u32,
    pub format: DumpFormat,
}

pub fn compose(at: OffsetDateTime, seq: u32, format: DumpFormat) -> String {
    let at = at.to_offset(time::UtcOffset::UTC);
    let stamp = PrimitiveDateTime::new(at.date(), at.time())
        .format(STAMP)
        .unwrap_or_else(|_| "00000000_000000".to_string());
    if seq == 0 {
        format!("{PREFIX}{stamp}.{}", format.extension())
    } else {
        format!("{PREFIX}{stamp}_{seq:02}.{}", format.extension())
    }
}

/// `None` for anything that is not a dump produced by [`compose`].
pub fn parse(file_name: &str) -> Option<DumpName> {
    let rest = file_name.strip_prefix(PREFIX)?;
    let (stem, ext) = rest.rsplit_once('.')?;
    let format = DumpFormat::from_extension(ext)?;

    // date(8) + '_' + time(6), optionally followed by '_NN'
    let (stamp, seq) = match stem.len() {
        15 => (stem, 0),
        18 if stem.as_bytes()[15] == b'_' => {
            let digits = &stem[16..];
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (&stem[..15], digits.parse().ok()?)
        }
        _ => return None,
    };

    let created_at = PrimitiveDateTime::parse(stamp, STAMP).ok()?.assume_utc();
    Some(DumpName {
        file_name: file_name.to_string(),
        created_at,
        seq,
        format,
    })
}

/// Newest first: embedded timestamp, then file name.
pub fn sort_newest_first(names: &mut [DumpName]) {
    names.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.file_name.cmp(&a.file_name))
    });
}

/// Atomically claim a fresh dump path in `dir` by creating it empty.
/// Same-second collisions get a `_NN` suffix.
pub fn reserve(
    dir: &Path,
    at: OffsetDateTime,
    format: DumpFormat,
) -> std::io::Result<(PathBuf, DumpName)> {
    for seq in 0..=MAX_SEQ {
        let file_name = compose(at, seq, format);
        let path = dir.join(&file_name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                let name = parse(&file_name).ok_or_else(|| {
                    std::io::Error::new(ErrorKind::InvalidData, "composed name does not parse")
                })?;
                return Ok((path, name));
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("more than {MAX_SEQ} dumps in the same second"),
    ))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn compose_and_parse_agree() {
        let at = datetime!(2025-03-09 07:05:03 UTC);
        let name = compose(at, 0, DumpFormat::Sql);
        assert_eq!(name, "club_backup_20250309_070503.sql");

        let parsed = parse(&name).unwrap();
        assert_eq!(parsed.created_at, at);
        assert_eq!(parsed.seq, 0);
        assert_eq!(parsed.format, DumpFormat::Sql);

        let suffixed = compose(at, 2, DumpFormat::Json);
        assert_eq!(suffixed, "club_backup_20250309_070503_02.json");
        assert_eq!(parse(&suffixed).unwrap().seq, 2);
    }

    #[test]
    fn compose_normalises_to_utc() {
        let at = datetime!(2025-03-09 09:05:03 +02:00);
        assert_eq!(
            compose(at, 0, DumpFormat::Json),
            "club_backup_20250309_070503.json"
        );
    }

    #[test]
    fn foreign_names_are_ignored() {
        for name in [
            "notes.txt",
            "club_backup_2025.sql",
            "club_backup_20250309_070503.tar",
            "club_backup_20251309_070503.sql",
            "club_backup_20250309_070503_xx.sql",
            "other_backup_20250309_070503.sql",
        ] {
            assert!(parse(name).is_none(), "{name}");
        }
    }

    #[test]
    fn ordering_uses_timestamp_then_name() {
        let mut names: Vec<DumpName> = [
            "club_backup_20250101_000000.sql",
            "club_backup_20250102_000000.json",
            "club_backup_20250101_000000_01.sql",
        ]
        .iter()
        .filter_map(|n| parse(n))
        .collect();
        sort_newest_first(&mut names);
        let order: Vec<&str> = names.iter().map(|n| n.file_name.as_str()).collect();
        assert_eq!(
            order,
            [
                "club_backup_20250102_000000.json",
                "club_backup_20250101_000000_01.sql",
                "club_backup_20250101_000000.sql",
            ]
        );
    }

    #[test]
    fn reserve_adds_suffix_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let at = datetime!(2025-03-09 07:05:03 UTC);

        let (first, _) = reserve(dir.path(), at, DumpFormat::Json).unwrap();
        let (second, name) = reserve(dir.path(), at, DumpFormat::Json).unwrap();
        assert_ne!(first, second);
        assert_eq!(name.seq, 1);
        assert!(second.ends_with("club_backup_20250309_070503_01.json"));
    }
}
