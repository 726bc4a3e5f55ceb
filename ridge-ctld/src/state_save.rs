// `last_config_lite` (spec.md §6): a small record {version, timestamp,
// accounting-backend kind} written atomically via write-new, fsync,
// rename-old-aside, rename-new-into-place; recovery tolerates a missing
// or short file and refuses to load across an incompatible version
// unless the caller passes `ignore_state = true`.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ridge_base::{err, Result};

/// Bumped only when the on-disk shape of `LastConfigLite` changes in a
/// way that makes an old record unreadable by a newer binary.
pub const CURRENT_VERSION: u16 = 1;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastConfigLite {
    pub version: u16,
    pub timestamp: i64,
    pub accounting_backend: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadOutcome {
    Loaded,
    MissingOrShort,
    IncompatibleVersion { found: u16 },
}

/// Atomically replaces `path`: serialize to `path.new`, fsync it, rename
/// any existing `path` aside to `path.old`, then rename `path.new` into
/// `path`. A crash between the two renames leaves either the old file or
/// the new one fully in place, never a half-written one.
pub fn save(path: &Path, record: &LastConfigLite) -> Result<()> {
    let bytes = rmp_serde::to_vec(record).map_err(|e| err(e.to_string()))?;
    let new_path = with_suffix(path, "new");
    {
        let mut file = File::create(&new_path).map_err(|e| err(e.to_string()))?;
        file.write_all(&bytes).map_err(|e| err(e.to_string()))?;
        file.sync_all().map_err(|e| err(e.to_string()))?;
    }
    if path.exists() {
        let old_path = with_suffix(path, "old");
        fs::rename(path, &old_path).map_err(|e| err(e.to_string()))?;
    }
    fs::rename(&new_path, path).map_err(|e| err(e.to_string()))?;
    Ok(())
}

/// Loads `path`. A missing or implausibly-short file is reported as
/// `MissingOrShort` rather than an error -- the controller's first-ever
/// startup has no state to recover. An incompatible version is refused
/// unless `ignore_state` is set, in which case the record is still
/// returned to the caller (who then treats it as informational only,
/// never relied on for recovery decisions).
pub fn load(path: &Path, ignore_state: bool) -> Result<(LoadOutcome, Option<LastConfigLite>)> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(_) => return Ok((LoadOutcome::MissingOrShort, None)),
    };
    if bytes.len() < 4 {
        return Ok((LoadOutcome::MissingOrShort, None));
    }
    let record: LastConfigLite = match rmp_serde::from_slice(&bytes) {
        Ok(r) => r,
        Err(_) => return Ok((LoadOutcome::MissingOrShort, None)),
    };
    if record.version != CURRENT_VERSION && !ignore_state {
        return Ok((LoadOutcome::IncompatibleVersion { found: record.version }, None));
    }
    Ok((LoadOutcome::Loaded, Some(record)))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = std::env::temp_dir().join(format!("ridge-ctld-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("last_config_lite");
        let record = LastConfigLite { version: CURRENT_VERSION, timestamp: 123, accounting_backend: "slurmdbd".to_string() };
        save(&path, &record).unwrap();
        let (outcome, loaded) = load(&path, false).unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded);
        assert_eq!(loaded, Some(record));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_is_tolerated() {
        let path = std::env::temp_dir().join("ridge-ctld-test-does-not-exist-xyz");
        let (outcome, loaded) = load(&path, false).unwrap();
        assert_eq!(outcome, LoadOutcome::MissingOrShort);
        assert!(loaded.is_none());
    }

    #[test]
    fn incompatible_version_is_refused_unless_ignored() {
        let dir = std::env::temp_dir().join(format!("ridge-ctld-test-version-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("last_config_lite");
        let record = LastConfigLite { version: CURRENT_VERSION + 1, timestamp: 0, accounting_backend: String::new() };
        save(&path, &record).unwrap();

        let (outcome, loaded) = load(&path, false).unwrap();
        assert_eq!(outcome, LoadOutcome::IncompatibleVersion { found: CURRENT_VERSION + 1 });
        assert!(loaded.is_none());

        let (outcome, loaded) = load(&path, true).unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded);
        assert!(loaded.is_some());
        fs::remove_dir_all(&dir).ok();
    }
}
