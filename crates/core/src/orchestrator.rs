use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex, PoisonError};

use tracing::{error, info};

use crate::controller::Controller;
use crate::settings;
use crate::types::*;

/// Last message for the UI status line.
pub type Notice = Arc<Mutex<Option<String>>>;

fn notify(notice: &Notice, msg: impl Into<String>) {
    *notice.lock().unwrap_or_else(PoisonError::into_inner) = Some(msg.into());
}

fn report<E: std::fmt::Display>(notice: &Notice, context: &str, result: Result<(), E>) {
    if let Err(e) = result {
        error!(target: "orchestrator", "{}: {}", context, e);
        notify(notice, format!("{}: {}", context, e));
    }
}

fn adjust(current: f64, delta: i32) -> f64 {
    (current + f64::from(delta)).clamp(0.0, 100.0)
}

/// Apply one command. Returns false on Quit.
fn process_command(cmd: Command, controller: &Controller, settings_path: &Path, notice: &Notice) -> bool {
    let profile = controller.profile();
    match cmd {
        Command::Quit => {
            info!(target: "orchestrator", "shutting down");
            controller.stop();
            report(notice, "save", settings::save(&controller.profile(), settings_path));
            return false;
        }
        Command::StartStop => {
            if controller.is_running() {
                controller.stop();
                notify(notice, "stopped");
            } else {
                match controller.start() {
                    Ok(()) => notify(notice, "running"),
                    Err(e) => report(notice, "start", Err(e)),
                }
            }
        }
        Command::ToggleRegion(i) => {
            let active = profile.regions.get(i).is_some_and(|r| !r.active);
            report(notice, &format!("region {}", i + 1), controller.set_region_active(i, active));
        }
        Command::SetRegionBounds(i, text) => {
            let result = text.parse::<Rect>().and_then(|r| controller.set_region_bounds(i, Some(r)));
            report(notice, &format!("region {}", i + 1), result);
        }
        Command::ClearRegionBounds(i) => {
            report(notice, &format!("region {}", i + 1), controller.set_region_bounds(i, None));
        }
        Command::ToggleSlot(i) => {
            let active = profile.buffs.slots.get(i).is_some_and(|s| !s.active);
            report(notice, &format!("slot {}", i + 1), controller.set_slot_active(i, active));
        }
        Command::SetSlotKey(i, key) => {
            report(notice, &format!("slot {}", i + 1), controller.set_slot_key(i, &key));
        }
        Command::SetSlotInterval(i, text) => {
            let context = format!("slot {}", i + 1);
            match text.trim().parse::<i64>() {
                Ok(secs) => report(notice, &context, controller.set_slot_interval(i, secs)),
                Err(_) => report(notice, &context, Err(format!("not a number of seconds: {:?}", text))),
            }
        }
        Command::ResetSlot(i) => {
            report(notice, &format!("slot {}", i + 1), controller.reset_slot_timer(i));
        }
        Command::ToggleHeal => controller.set_heal_active(!profile.heal.heal_active),
        Command::ToggleMassHeal => controller.set_mass_heal_active(!profile.heal.mass_heal_active),
        Command::ToggleParty => controller.set_party_check(!profile.heal.party_check),
        Command::ToggleBuffs => controller.set_buff_active(!profile.buffs.active),
        Command::AdjustHealThreshold(delta) => {
            let pct = adjust(profile.heal.heal_threshold, delta);
            report(notice, "heal threshold", controller.set_heal_threshold(pct));
        }
        Command::AdjustMassThreshold(delta) => {
            let pct = adjust(profile.heal.mass_heal_threshold, delta);
            report(notice, "mass heal threshold", controller.set_mass_heal_threshold(pct));
        }
        Command::SetHealKey(key) => {
            report(notice, "heal key", controller.set_heal_key(&key));
        }
        Command::SetMassHealKey(key) => {
            report(notice, "mass heal key", controller.set_mass_heal_key(&key));
        }
        Command::Save => match settings::save(&profile, settings_path) {
            Ok(()) => notify(notice, format!("saved {}", settings_path.display())),
            Err(e) => report(notice, "save", Err(format!("{:#}", e))),
        },
        Command::Reload => {
            controller.apply_profile(settings::load(settings_path));
            notify(notice, format!("reloaded {}", settings_path.display()));
        }
    }
    true
}

/// Command loop. Runs on a background thread so that the UI never waits
/// on `stop()`.
pub fn orchestrate(
    controller: Controller,
    settings_path: PathBuf,
    cmd_rx: mpsc::Receiver<Command>,
    notice: Notice,
) {
    while let Ok(cmd) = cmd_rx.recv() {
        if !process_command(cmd, &controller, &settings_path, &notice) {
            return;
        }
    }
    // Sender gone without Quit: stop anyway.
    controller.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::platform::stub;

    fn setup() -> (Controller, PathBuf, Notice, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let controller = Controller::new(stub::ports(), Profile::default());
        (controller, path, Arc::new(Mutex::new(None)), dir)
    }

    fn notice_text(notice: &Notice) -> Option<String> {
        notice.lock().unwrap().clone()
    }

    #[test]
    fn test_toggles_and_thresholds() {
        let (c, path, notice, _dir) = setup();
        process_command(Command::ToggleRegion(1), &c, &path, &notice);
        process_command(Command::ToggleHeal, &c, &path, &notice);
        process_command(Command::AdjustHealThreshold(30), &c, &path, &notice);
        let p = c.profile();
        assert!(p.regions[1].active);
        assert!(p.heal.heal_active);
        assert_eq!(p.heal.heal_threshold, 100.0);
    }

    #[test]
    fn test_bad_input_sets_notice() {
        let (c, path, notice, _dir) = setup();
        process_command(Command::SetSlotInterval(0, "0".into()), &c, &path, &notice);
        assert!(notice_text(&notice).unwrap().starts_with("slot 1"));
        process_command(Command::SetRegionBounds(0, "1,2,3".into()), &c, &path, &notice);
        assert!(notice_text(&notice).unwrap().contains("malformed"));
        assert_eq!(c.profile(), Profile::default());
    }

    #[test]
    fn test_region_bounds_round_trip() {
        let (c, path, notice, _dir) = setup();
        process_command(Command::SetRegionBounds(4, "[10, 10, 60, 20]".into()), &c, &path, &notice);
        assert_eq!(c.profile().regions[4].bounds, Some(Rect::new(10, 10, 60, 20).unwrap()));
        process_command(Command::ClearRegionBounds(4), &c, &path, &notice);
        assert_eq!(c.profile().regions[4].bounds, None);
    }

    #[test]
    fn test_reload_discards_unsaved_edits() {
        let (c, path, notice, _dir) = setup();
        process_command(Command::ToggleHeal, &c, &path, &notice);
        process_command(Command::Save, &c, &path, &notice);
        process_command(Command::ToggleHeal, &c, &path, &notice);
        process_command(Command::SetSlotKey(0, "F4".into()), &c, &path, &notice);
        assert!(!c.profile().heal.heal_active);

        process_command(Command::Reload, &c, &path, &notice);
        let p = c.profile();
        assert!(p.heal.heal_active);
        assert_eq!(p.buffs.slots[0].key, "");
        assert!(notice_text(&notice).unwrap().starts_with("reloaded"));
    }

    #[test]
    fn test_quit_stops_and_saves() {
        let (c, path, notice, _dir) = setup();
        process_command(Command::ToggleBuffs, &c, &path, &notice);
        process_command(Command::StartStop, &c, &path, &notice);
        assert!(c.is_running());
        assert!(!process_command(Command::Quit, &c, &path, &notice));
        assert!(!c.is_running());
        assert!(settings::load(&path).buffs.active);
    }
}
