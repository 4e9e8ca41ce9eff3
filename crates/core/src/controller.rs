//! Control facade: owns the configuration and the engine lifecycle.
//!
//! The controller keeps the authoritative [`Profile`]. Engines are built
//! from it on [`Controller::start`] and dropped on [`Controller::stop`];
//! every setter validates first, then updates the profile and mirrors the
//! change into whatever engine is running.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::caster::{self, CasterTable, IntervalCaster, SharedCaster};
use crate::clock::{Clock, SystemClock};
use crate::color::MatchRule;
use crate::config::{check_index, validate_interval, Profile};
use crate::keys;
use crate::engine::{gated_ports, ActionGate, LoopExit, PollingEngine, Worker};
use crate::error::ConfigError;
use crate::monitor::{self, MonitorTable, SharedMonitor, VitalityMonitor};
use crate::platform::Ports;
use crate::types::{Rect, RunState, REGION_COUNT, SLOT_COUNT};

/// Total time `stop` waits for both engine threads.
pub const STOP_WAIT: Duration = Duration::from_secs(2);

struct Engine<T> {
    table: Arc<Mutex<T>>,
    worker: Worker,
}

struct Inner {
    profile: Profile,
    ports: Ports,
    clock: Arc<dyn Clock>,
    monitor: Option<Engine<MonitorTable>>,
    caster: Option<Engine<CasterTable>>,
    stopping: bool,
    #[cfg(feature = "debug-capture")]
    frame_dump: Option<crate::debug::FrameDumper>,
}

impl Inner {
    /// Copy the profile into the running engine tables. Timestamps and
    /// ratios stay as they are.
    fn sync(&self) {
        if let Some(m) = &self.monitor {
            let mut table = monitor::lock(&m.table);
            table.heal = self.profile.heal.clone();
            for (region, config) in table.regions.iter_mut().zip(self.profile.regions.iter()) {
                region.config = *config;
            }
        }
        if let Some(c) = &self.caster {
            let mut table = caster::lock(&c.table);
            table.active = self.profile.buffs.active;
            for (slot, config) in table.slots.iter_mut().zip(self.profile.buffs.slots.iter()) {
                slot.config = config.clone();
            }
        }
    }

    fn spawn<E: PollingEngine, T>(
        &self,
        table: Arc<Mutex<T>>,
        build: impl FnOnce(Arc<Mutex<T>>, Ports, Arc<dyn Clock>) -> E,
    ) -> std::io::Result<Engine<T>> {
        let gate = ActionGate::new();
        let engine = build(table.clone(), gated_ports(&self.ports, &gate), self.clock.clone());
        let worker = Worker::spawn(engine, gate, self.clock.clone())?;
        Ok(Engine { table, worker })
    }

    fn spawn_monitor(&self) -> std::io::Result<Engine<MonitorTable>> {
        let table = MonitorTable::new(self.profile.heal.clone(), &self.profile.regions, self.clock.now());
        self.spawn(Arc::new(Mutex::new(table)), |table, ports, clock| {
            let monitor = VitalityMonitor::new(table, ports, clock);
            #[cfg(feature = "debug-capture")]
            let monitor = match &self.frame_dump {
                Some(dumper) => monitor.with_frame_dump(dumper.clone()),
                None => monitor,
            };
            monitor
        })
    }

    fn spawn_caster(&self) -> std::io::Result<Engine<CasterTable>> {
        let table = CasterTable::new(&self.profile.buffs, self.clock.now());
        self.spawn(Arc::new(Mutex::new(table)), IntervalCaster::new)
    }
}

fn is_alive<T>(engine: &mut Option<Engine<T>>) -> bool {
    engine.as_mut().is_some_and(|e| e.worker.is_running())
}

fn log_exit<T>(engine: &mut Option<Engine<T>>) {
    if let Some(e) = engine.as_mut() {
        if e.worker.exit() == Some(LoopExit::Exhausted) {
            warn!(target: "controller", "{} had stopped after repeated faults, restarting", e.worker.name());
        }
    }
}

/// What the UI shows.
#[derive(Debug, Clone)]
pub struct Status {
    pub state: RunState,
    pub monitor_running: bool,
    pub caster_running: bool,
    /// Live ratios while the monitor runs, full health otherwise.
    pub ratios: [f64; REGION_COUNT],
    /// Seconds until each armed slot is due, while the caster runs.
    pub countdowns: [Option<u64>; SLOT_COUNT],
    pub profile: Profile,
}

/// Cheap to clone; all clones drive the same engines.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Mutex<Inner>>,
}

impl Controller {
    pub fn new(ports: Ports, profile: Profile) -> Self {
        Self::with_clock(ports, profile, Arc::new(SystemClock))
    }

    /// Fields of `profile` that fail validation are replaced with their
    /// defaults and logged.
    pub fn with_clock(ports: Ports, mut profile: Profile, clock: Arc<dyn Clock>) -> Self {
        for fix in profile.sanitize() {
            warn!(target: "controller", "profile: replaced invalid {}", fix);
        }
        let inner = Inner {
            profile,
            ports,
            clock,
            monitor: None,
            caster: None,
            stopping: false,
            #[cfg(feature = "debug-capture")]
            frame_dump: None,
        };
        Self { inner: Arc::new(Mutex::new(inner)) }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dump the frame behind every heal into `dumper`'s directory. Takes
    /// effect on the next start.
    #[cfg(feature = "debug-capture")]
    pub fn set_frame_dump(&self, dumper: Option<crate::debug::FrameDumper>) {
        self.lock().frame_dump = dumper;
    }

    /// Validate and apply a profile change, then mirror it into the
    /// running engines.
    fn update(
        &self,
        what: impl std::fmt::Display,
        f: impl FnOnce(&mut Profile) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        let mut inner = self.lock();
        let mut next = inner.profile.clone();
        match f(&mut next) {
            Ok(()) => {
                inner.profile = next;
                inner.sync();
                info!(target: "controller", "{}", what);
                Ok(())
            }
            Err(e) => {
                warn!(target: "controller", "rejected {}: {}", what, e);
                Err(e)
            }
        }
    }

    // -- lifecycle --

    /// Start both engines. Engines that are already running are left
    /// alone; engines that stopped themselves are replaced.
    pub fn start(&self) -> std::io::Result<()> {
        let mut inner = self.lock();
        let monitor_alive = is_alive(&mut inner.monitor);
        let caster_alive = is_alive(&mut inner.caster);
        if monitor_alive && caster_alive {
            info!(target: "controller", "already running");
            return Ok(());
        }
        if !monitor_alive {
            log_exit(&mut inner.monitor);
            inner.monitor = Some(inner.spawn_monitor()?);
        }
        if !caster_alive {
            log_exit(&mut inner.caster);
            inner.caster = Some(inner.spawn_caster()?);
        }
        info!(target: "controller", "started");
        Ok(())
    }

    /// Signal both engines and wait at most [`STOP_WAIT`] for them.
    /// Returns `true` when both threads finished in time. After this
    /// returns, no engine issues further input either way.
    pub fn stop(&self) -> bool {
        let (monitor, caster) = {
            let mut inner = self.lock();
            inner.stopping = true;
            (inner.monitor.take(), inner.caster.take())
        };
        for worker in monitor.iter().map(|m| &m.worker).chain(caster.iter().map(|c| &c.worker)) {
            worker.signal();
        }
        let deadline = Instant::now() + STOP_WAIT;
        let mut clean = true;
        if let Some(mut m) = monitor {
            clean &= m.worker.stop(deadline);
        }
        if let Some(mut c) = caster {
            clean &= c.worker.stop(deadline);
        }
        self.lock().stopping = false;
        if clean {
            info!(target: "controller", "stopped");
        } else {
            warn!(target: "controller", "stopped, some engine threads were detached");
        }
        clean
    }

    pub fn is_running(&self) -> bool {
        let mut inner = self.lock();
        is_alive(&mut inner.monitor) || is_alive(&mut inner.caster)
    }

    pub fn snapshot(&self) -> Status {
        let mut inner = self.lock();
        let monitor_running = is_alive(&mut inner.monitor);
        let caster_running = is_alive(&mut inner.caster);
        let state = if inner.stopping {
            RunState::Stopping
        } else if monitor_running || caster_running {
            RunState::Running
        } else {
            RunState::Stopped
        };
        let ratios = match &inner.monitor {
            Some(m) if monitor_running => monitor::lock(&m.table).ratios(),
            _ => [crate::color::FULL_HEALTH; REGION_COUNT],
        };
        let countdowns = match &inner.caster {
            Some(c) if caster_running => caster::lock(&c.table).countdowns(inner.clock.now()),
            _ => [None; SLOT_COUNT],
        };
        Status {
            state,
            monitor_running,
            caster_running,
            ratios,
            countdowns,
            profile: inner.profile.clone(),
        }
    }

    pub fn profile(&self) -> Profile {
        self.lock().profile.clone()
    }

    /// Replace the whole configuration. Fields that fail validation are
    /// logged and left at their current values.
    pub fn apply_profile(&self, mut profile: Profile) {
        for fix in profile.heal.sanitize() {
            warn!(target: "controller", "profile: replaced invalid {}", fix);
        }
        let mut inner = self.lock();
        for (i, slot) in profile.buffs.slots.iter_mut().enumerate() {
            let current = &inner.profile.buffs.slots[i];
            if let Err(e) = validate_interval(slot.interval.into()) {
                warn!(target: "controller", "profile: slot {}: {}", i + 1, e);
                slot.interval = current.interval;
            }
            if let Err(e) = keys::validate(&slot.key).map(|k| slot.key = k) {
                warn!(target: "controller", "profile: slot {}: {}", i + 1, e);
                slot.key = current.key.clone();
            }
        }
        inner.profile = profile;
        inner.sync();
        info!(target: "controller", "profile applied");
    }

    // -- regions --

    pub fn configure_region(&self, index: usize, active: bool, bounds: Option<Rect>) -> Result<(), ConfigError> {
        let what = format!(
            "region {}: active={} bounds={}",
            index + 1,
            active,
            bounds.map_or_else(|| "none".to_string(), |b| b.to_string())
        );
        self.update(what, |p| {
            check_index("region", index, REGION_COUNT)?;
            p.regions[index].active = active;
            p.regions[index].bounds = bounds;
            Ok(())
        })
    }

    pub fn set_region_active(&self, index: usize, active: bool) -> Result<(), ConfigError> {
        self.update(format!("region {} active: {}", index + 1, active), |p| {
            check_index("region", index, REGION_COUNT)?;
            p.regions[index].active = active;
            Ok(())
        })
    }

    pub fn set_region_bounds(&self, index: usize, bounds: Option<Rect>) -> Result<(), ConfigError> {
        let what = format!(
            "region {} bounds: {}",
            index + 1,
            bounds.map_or_else(|| "none".to_string(), |b| b.to_string())
        );
        self.update(what, |p| {
            check_index("region", index, REGION_COUNT)?;
            p.regions[index].bounds = bounds;
            Ok(())
        })
    }

    // -- slots --

    /// Set a slot's flag, key and interval together. If any part is
    /// invalid nothing changes.
    pub fn configure_slot(&self, index: usize, active: bool, key: &str, interval_secs: i64) -> Result<(), ConfigError> {
        let what = format!("slot {}: active={} key={:?} interval={}s", index + 1, active, key, interval_secs);
        self.update(what, |p| {
            check_index("slot", index, SLOT_COUNT)?;
            let slot = &mut p.buffs.slots[index];
            slot.active = active;
            slot.set_key(key)?;
            slot.set_interval(interval_secs)
        })
    }

    pub fn set_slot_active(&self, index: usize, active: bool) -> Result<(), ConfigError> {
        self.update(format!("slot {} active: {}", index + 1, active), |p| {
            check_index("slot", index, SLOT_COUNT)?;
            p.buffs.slots[index].active = active;
            Ok(())
        })
    }

    pub fn set_slot_key(&self, index: usize, key: &str) -> Result<(), ConfigError> {
        self.update(format!("slot {} key: {:?}", index + 1, key), |p| {
            check_index("slot", index, SLOT_COUNT)?;
            p.buffs.slots[index].set_key(key)
        })
    }

    pub fn set_slot_interval(&self, index: usize, secs: i64) -> Result<(), ConfigError> {
        self.update(format!("slot {} interval: {}s", index + 1, secs), |p| {
            check_index("slot", index, SLOT_COUNT)?;
            p.buffs.slots[index].set_interval(secs)
        })
    }

    pub fn set_slot_name(&self, index: usize, name: &str) -> Result<(), ConfigError> {
        self.update(format!("slot {} name: {:?}", index + 1, name), |p| {
            check_index("slot", index, SLOT_COUNT)?;
            p.buffs.slots[index].name = name.trim().to_string();
            Ok(())
        })
    }

    /// Restart a slot's countdown. Only meaningful while the caster runs.
    pub fn reset_slot_timer(&self, index: usize) -> Result<(), ConfigError> {
        check_index("slot", index, SLOT_COUNT)?;
        let inner = self.lock();
        if let Some(c) = &inner.caster {
            caster::lock(&c.table).reset_slot_timer(index, inner.clock.now())?;
            info!(target: "controller", "slot {} timer reset", index + 1);
        }
        Ok(())
    }

    pub fn set_buff_active(&self, active: bool) {
        self.update(format!("buffs active: {}", active), |p| {
            p.buffs.active = active;
            Ok(())
        })
        .ok();
    }

    // -- heal settings --

    pub fn set_heal_active(&self, active: bool) {
        self.update(format!("heal active: {}", active), |p| {
            p.heal.heal_active = active;
            Ok(())
        })
        .ok();
    }

    pub fn set_mass_heal_active(&self, active: bool) {
        self.update(format!("mass heal active: {}", active), |p| {
            p.heal.mass_heal_active = active;
            Ok(())
        })
        .ok();
    }

    pub fn set_party_check(&self, enabled: bool) {
        self.update(format!("party check: {}", enabled), |p| {
            p.heal.party_check = enabled;
            Ok(())
        })
        .ok();
    }

    pub fn set_heal_key(&self, key: &str) -> Result<(), ConfigError> {
        self.update(format!("heal key: {:?}", key), |p| p.heal.set_heal_key(key))
    }

    pub fn set_mass_heal_key(&self, key: &str) -> Result<(), ConfigError> {
        self.update(format!("mass heal key: {:?}", key), |p| p.heal.set_mass_heal_key(key))
    }

    pub fn set_heal_threshold(&self, pct: f64) -> Result<(), ConfigError> {
        self.update(format!("heal threshold: {}%", pct), |p| p.heal.set_heal_threshold(pct))
    }

    pub fn set_mass_heal_threshold(&self, pct: f64) -> Result<(), ConfigError> {
        self.update(format!("mass heal threshold: {}%", pct), |p| p.heal.set_mass_heal_threshold(pct))
    }

    pub fn set_poll_interval(&self, interval: Duration) {
        self.update(format!("poll interval: {:?}", interval), |p| {
            p.heal.set_poll_interval(interval);
            Ok(())
        })
        .ok();
    }

    pub fn set_heal_cooldown(&self, secs: f64) -> Result<(), ConfigError> {
        self.update(format!("heal cooldown: {}s", secs), |p| p.heal.set_heal_cooldown(secs))
    }

    pub fn set_mass_heal_cooldown(&self, secs: f64) -> Result<(), ConfigError> {
        self.update(format!("mass heal cooldown: {}s", secs), |p| p.heal.set_mass_heal_cooldown(secs))
    }

    pub fn set_color_rule(&self, rule: MatchRule) {
        self.update(format!("color rule: {:?}", rule), |p| {
            p.heal.color_rule = rule;
            Ok(())
        })
        .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub;

    fn controller() -> Controller {
        Controller::new(stub::ports(), Profile::default())
    }

    #[test]
    fn test_configure_slot_is_all_or_nothing() {
        let c = controller();
        c.configure_slot(0, true, "F1", 30).unwrap();
        assert_eq!(
            c.configure_slot(0, false, "F2", 0),
            Err(ConfigError::NonPositiveInterval(0))
        );
        let slot = &c.profile().buffs.slots[0];
        assert!(slot.active);
        assert_eq!(slot.key, "F1");
        assert_eq!(slot.interval, 30);
    }

    #[test]
    fn test_index_out_of_range() {
        let c = controller();
        assert!(matches!(
            c.configure_region(REGION_COUNT, true, None),
            Err(ConfigError::IndexOutOfRange { kind: "region", .. })
        ));
        assert!(c.set_slot_interval(SLOT_COUNT, 5).is_err());
        assert!(c.reset_slot_timer(SLOT_COUNT).is_err());
    }

    #[test]
    fn test_rejected_threshold_keeps_value() {
        let c = controller();
        c.set_heal_threshold(55.0).unwrap();
        assert!(c.set_heal_threshold(-1.0).is_err());
        assert_eq!(c.profile().heal.heal_threshold, 55.0);
    }

    #[test]
    fn test_setters_reach_running_engine() {
        let c = controller();
        c.start().unwrap();
        c.set_heal_threshold(42.0).unwrap();
        c.configure_region(2, true, Some(Rect::new(0, 0, 10, 10).unwrap())).unwrap();
        {
            let inner = c.lock();
            let table = monitor::lock(&inner.monitor.as_ref().unwrap().table);
            assert_eq!(table.heal.heal_threshold, 42.0);
            assert!(table.regions[2].config.is_armed());
        }
        c.stop();
    }

    #[test]
    fn test_new_replaces_invalid_slot_fields() {
        let mut p = Profile::default();
        p.buffs.slots[1].interval = 0;
        p.buffs.slots[1].key = "bogus".into();
        p.buffs.slots[2].key = "f3".into();
        let slots = Controller::new(stub::ports(), p).profile().buffs.slots;
        assert_eq!(slots[1].interval, crate::config::DEFAULT_SLOT_INTERVAL_SECS);
        assert_eq!(slots[1].key, "");
        assert_eq!(slots[2].key, "F3");
    }

    #[test]
    fn test_apply_profile_keeps_current_on_invalid_slot_fields() {
        let c = controller();
        c.configure_slot(1, true, "F2", 45).unwrap();
        let mut p = Profile::default();
        p.buffs.slots[1].interval = 0;
        p.buffs.slots[1].key = "bogus".into();
        p.buffs.slots[2].key = "f3".into();
        c.apply_profile(p);
        let slots = c.profile().buffs.slots;
        assert_eq!(slots[1].interval, 45);
        assert_eq!(slots[1].key, "F2");
        assert_eq!(slots[2].key, "F3");
    }

    #[test]
    fn test_snapshot_when_stopped() {
        let status = controller().snapshot();
        assert_eq!(status.state, RunState::Stopped);
        assert!(status.ratios.iter().all(|r| *r == crate::color::FULL_HEALTH));
        assert!(status.countdowns.iter().all(Option::is_none));
    }
}
