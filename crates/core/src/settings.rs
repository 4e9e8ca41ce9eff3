use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use crate::config::Profile;

/// `<file>.bak`, next to the settings file.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

fn read(path: &Path) -> anyhow::Result<Profile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let profile = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(profile)
}

/// Load the saved profile, falling back to the backup and then to the
/// defaults. Never fails.
pub fn load(path: &Path) -> Profile {
    let mut profile = match read(path) {
        Ok(p) => p,
        Err(e) => {
            let backup = backup_path(path);
            if path.exists() {
                warn!(target: "settings", "{:#}", e);
            }
            match read(&backup) {
                Ok(p) => {
                    warn!(target: "settings", "restored settings from {}", backup.display());
                    p
                }
                Err(_) => {
                    info!(target: "settings", "no usable settings at {}, using defaults", path.display());
                    Profile::default()
                }
            }
        }
    };
    for fix in profile.sanitize() {
        warn!(target: "settings", "replaced invalid {}", fix);
    }
    profile
}

/// Write `profile` as pretty JSON, keeping the previous file as a backup.
pub fn save(profile: &Profile, path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        if let Err(e) = std::fs::copy(path, backup_path(path)) {
            warn!(target: "settings", "cannot back up {}: {}", path.display(), e);
        }
    }
    let json = serde_json::to_string_pretty(profile)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    info!(target: "settings", "saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect;

    fn sample() -> Profile {
        let mut p = Profile::default();
        p.heal.heal_active = true;
        p.heal.heal_threshold = 65.0;
        p.regions[3].active = true;
        p.regions[3].bounds = Some(Rect::new(10, 20, 110, 30).unwrap());
        p.buffs.active = true;
        p.buffs.slots[0].key = "F1".into();
        p.buffs.slots[0].interval = 120;
        p.buffs.slots[0].name = "Fortitude".into();
        p
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        save(&sample(), &path).unwrap();
        assert_eq!(load(&path), sample());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(&dir.path().join("nope.json")), Profile::default());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        save(&sample(), &path).unwrap();
        // Second save moves the first into the backup.
        save(&sample(), &path).unwrap();
        assert!(backup_path(&path).exists());
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load(&path), sample());
    }

    #[test]
    fn test_reads_bracketed_coords_and_partial_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "heal": { "heal_threshold": 70 },
                "regions": [
                    { "active": true, "coords": "[5, 5, 55, 15]" },
                    {}, {}, {}, {}, {}, {}, {}
                ]
            }"#,
        )
        .unwrap();
        let p = load(&path);
        assert_eq!(p.heal.heal_threshold, 70.0);
        assert_eq!(p.heal.heal_key, "1");
        assert_eq!(p.regions[0].bounds, Some(Rect::new(5, 5, 55, 15).unwrap()));
        assert!(!p.buffs.active);
    }

    #[test]
    fn test_invalid_values_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "heal": { "heal_threshold": 400, "poll_interval": 0.01 } }"#).unwrap();
        let p = load(&path);
        assert_eq!(p.heal.heal_threshold, 80.0);
        assert_eq!(p.heal.poll_interval, crate::config::MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_invalid_slots_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "buffs": { "active": true, "slots": [
                { "active": true, "key": "F1", "interval": 0 },
                { "active": true, "key": "bogus!!", "interval": 60 },
                {}, {}, {}, {}, {}, {}, {}, {}
            ] } }"#,
        )
        .unwrap();
        let p = load(&path);
        assert_eq!(p.buffs.slots[0].interval, crate::config::DEFAULT_SLOT_INTERVAL_SECS);
        assert!(p.buffs.slots[0].is_ready());
        assert_eq!(p.buffs.slots[1].key, "");
        assert!(!p.buffs.slots[1].is_ready());
    }
}
