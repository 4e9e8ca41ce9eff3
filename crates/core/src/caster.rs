//! Interval caster: presses each slot's key once per configured interval.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

use crate::clock::Clock;
use crate::config::{check_index, BuffConfig, SlotConfig};
use crate::engine::{ActionGate, PollingEngine, Tick};
use crate::platform::Ports;
use crate::types::SLOT_COUNT;

/// Cycle period, also the sleep while inactive.
pub const CAST_PERIOD: Duration = Duration::from_secs(1);
/// After each cast, before checking the next slot.
pub const POST_CAST_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CastSlot {
    pub config: SlotConfig,
    pub last_cast: Instant,
}

impl CastSlot {
    /// Time until the slot is due, zero when it already is.
    pub fn remaining(&self, now: Instant) -> Duration {
        let interval = Duration::from_secs(self.config.interval.into());
        interval.saturating_sub(now.saturating_duration_since(self.last_cast))
    }
}

#[derive(Debug, Clone)]
pub struct CasterTable {
    pub active: bool,
    pub slots: [CastSlot; SLOT_COUNT],
}

impl CasterTable {
    pub fn new(config: &BuffConfig, now: Instant) -> Self {
        Self {
            active: config.active,
            slots: config
                .slots
                .clone()
                .map(|config| CastSlot { config, last_cast: now }),
        }
    }

    /// Restart a slot's countdown from `now`.
    pub fn reset_slot_timer(&mut self, index: usize, now: Instant) -> Result<(), crate::error::ConfigError> {
        check_index("slot", index, SLOT_COUNT)?;
        self.slots[index].last_cast = now;
        Ok(())
    }

    /// Seconds left per slot, `None` for slots that are not armed.
    pub fn countdowns(&self, now: Instant) -> [Option<u64>; SLOT_COUNT] {
        std::array::from_fn(|i| {
            let slot = &self.slots[i];
            slot.config.is_ready().then(|| slot.remaining(now).as_secs())
        })
    }
}

pub type SharedCaster = Arc<Mutex<CasterTable>>;

pub(crate) fn lock(table: &SharedCaster) -> MutexGuard<'_, CasterTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `MM:SS`, or `READY` once the countdown is over.
pub fn format_remaining(secs: u64) -> String {
    if secs == 0 {
        return "READY".to_string();
    }
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub struct IntervalCaster {
    table: SharedCaster,
    ports: Ports,
    clock: Arc<dyn Clock>,
}

impl IntervalCaster {
    pub fn new(table: SharedCaster, ports: Ports, clock: Arc<dyn Clock>) -> Self {
        Self { table, ports, clock }
    }
}

impl PollingEngine for IntervalCaster {
    fn name(&self) -> &'static str {
        "caster"
    }

    fn tick(&mut self, gate: &ActionGate) -> Tick {
        let now = self.clock.now();
        let due: Vec<(usize, String)> = {
            let table = lock(&self.table);
            if !table.active {
                drop(table);
                gate.pause(self.clock.as_ref(), CAST_PERIOD);
                return Tick::Idle;
            }
            table
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.config.is_ready() && s.remaining(now).is_zero())
                .map(|(i, s)| (i, s.config.key.clone()))
                .collect()
        };

        for (index, key) in due {
            if !gate.is_open() {
                return Tick::Ran(Ok(()));
            }
            self.ports.input.press_key(&key);
            lock(&self.table).slots[index].last_cast = now;
            info!(target: "caster", "slot {} cast ({})", index + 1, key);
            if !gate.pause(self.clock.as_ref(), POST_CAST_DELAY) {
                return Tick::Ran(Ok(()));
            }
        }

        gate.pause(self.clock.as_ref(), CAST_PERIOD);
        Tick::Ran(Ok(()))
    }
}
