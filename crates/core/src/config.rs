//! Engine configuration with validated setters.
//!
//! Every setter either applies its value or returns a [`ConfigError`] and
//! leaves the previous value untouched.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::MatchRule;
use crate::error::ConfigError;
use crate::keys;
use crate::types::{Rect, REGION_COUNT, SLOT_COUNT};

/// Floor for the monitor's poll interval; faster polling saturates the
/// capture backend.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const DEFAULT_SLOT_INTERVAL_SECS: u32 = 60;

fn validate_threshold(pct: f64) -> Result<f64, ConfigError> {
    if pct.is_finite() && (0.0..=100.0).contains(&pct) {
        Ok(pct)
    } else {
        Err(ConfigError::ThresholdOutOfRange(pct))
    }
}

/// Seconds to a `Duration`, rejecting negative and non-finite values.
pub fn secs_to_duration(secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidDuration(secs))
}

pub(crate) fn check_index(kind: &'static str, index: usize, len: usize) -> Result<(), ConfigError> {
    if index < len {
        Ok(())
    } else {
        Err(ConfigError::IndexOutOfRange { kind, index, max: len - 1 })
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Settings shared by the vitality monitor's single-target and mass heals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealConfig {
    pub heal_active: bool,
    pub heal_key: String,
    pub heal_threshold: f64,
    pub mass_heal_active: bool,
    pub mass_heal_key: String,
    /// Stored and shown, but mass-heal gating counts regions below
    /// `heal_threshold`.
    pub mass_heal_threshold: f64,
    pub party_check: bool,
    #[serde(with = "secs")]
    pub poll_interval: Duration,
    #[serde(with = "secs")]
    pub heal_cooldown: Duration,
    #[serde(with = "secs")]
    pub mass_heal_cooldown: Duration,
    pub color_rule: MatchRule,
}

impl Default for HealConfig {
    fn default() -> Self {
        Self {
            heal_active: false,
            heal_key: "1".into(),
            heal_threshold: 80.0,
            mass_heal_active: false,
            mass_heal_key: "2".into(),
            mass_heal_threshold: 60.0,
            party_check: false,
            poll_interval: MIN_POLL_INTERVAL,
            heal_cooldown: Duration::from_secs(1),
            mass_heal_cooldown: Duration::from_secs(3),
            color_rule: MatchRule::default(),
        }
    }
}

impl HealConfig {
    pub fn set_heal_key(&mut self, key: &str) -> Result<(), ConfigError> {
        self.heal_key = keys::validate(key)?;
        Ok(())
    }

    pub fn set_mass_heal_key(&mut self, key: &str) -> Result<(), ConfigError> {
        self.mass_heal_key = keys::validate(key)?;
        Ok(())
    }

    pub fn set_heal_threshold(&mut self, pct: f64) -> Result<(), ConfigError> {
        self.heal_threshold = validate_threshold(pct)?;
        Ok(())
    }

    pub fn set_mass_heal_threshold(&mut self, pct: f64) -> Result<(), ConfigError> {
        self.mass_heal_threshold = validate_threshold(pct)?;
        Ok(())
    }

    /// Values under [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
    }

    pub fn set_heal_cooldown(&mut self, secs: f64) -> Result<(), ConfigError> {
        self.heal_cooldown = secs_to_duration(secs)?;
        Ok(())
    }

    pub fn set_mass_heal_cooldown(&mut self, secs: f64) -> Result<(), ConfigError> {
        self.mass_heal_cooldown = secs_to_duration(secs)?;
        Ok(())
    }

    /// Re-validate a config read from disk, replacing bad fields with the
    /// defaults. Returns one message per replaced field.
    pub fn sanitize(&mut self) -> Vec<String> {
        let defaults = HealConfig::default();
        let mut fixes = Vec::new();
        if let Err(e) = keys::validate(&self.heal_key).map(|k| self.heal_key = k) {
            fixes.push(format!("heal_key: {}", e));
            self.heal_key = defaults.heal_key.clone();
        }
        if let Err(e) = keys::validate(&self.mass_heal_key).map(|k| self.mass_heal_key = k) {
            fixes.push(format!("mass_heal_key: {}", e));
            self.mass_heal_key = defaults.mass_heal_key.clone();
        }
        if let Err(e) = validate_threshold(self.heal_threshold) {
            fixes.push(format!("heal_threshold: {}", e));
            self.heal_threshold = defaults.heal_threshold;
        }
        if let Err(e) = validate_threshold(self.mass_heal_threshold) {
            fixes.push(format!("mass_heal_threshold: {}", e));
            self.mass_heal_threshold = defaults.mass_heal_threshold;
        }
        self.poll_interval = self.poll_interval.max(MIN_POLL_INTERVAL);
        fixes
    }
}

/// Configured part of a watch region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub active: bool,
    #[serde(rename = "coords")]
    pub bounds: Option<Rect>,
}

impl RegionConfig {
    /// Active and bounded: the region takes part in polling.
    pub fn is_armed(&self) -> bool {
        self.active && self.bounds.is_some()
    }
}

/// Configured part of a cast slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    pub active: bool,
    pub key: String,
    #[serde(alias = "duration")]
    pub interval: u32,
    pub name: String,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            active: false,
            key: String::new(),
            interval: DEFAULT_SLOT_INTERVAL_SECS,
            name: String::new(),
        }
    }
}

impl SlotConfig {
    pub fn set_key(&mut self, key: &str) -> Result<(), ConfigError> {
        self.key = keys::validate(key)?;
        Ok(())
    }

    /// Zero or negative intervals are rejected.
    pub fn set_interval(&mut self, secs: i64) -> Result<(), ConfigError> {
        self.interval = validate_interval(secs)?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.active && !self.key.is_empty()
    }

    /// Re-validate a slot read from disk. A bad interval falls back to the
    /// default; a bad key clears the slot's key so it never fires.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut fixes = Vec::new();
        if let Err(e) = validate_interval(self.interval.into()) {
            fixes.push(format!("interval: {}", e));
            self.interval = DEFAULT_SLOT_INTERVAL_SECS;
        }
        if let Err(e) = keys::validate(&self.key).map(|k| self.key = k) {
            fixes.push(format!("key: {}", e));
            self.key.clear();
        }
        fixes
    }
}

pub(crate) fn validate_interval(secs: i64) -> Result<u32, ConfigError> {
    match u32::try_from(secs) {
        Ok(s) if s > 0 => Ok(s),
        _ => Err(ConfigError::NonPositiveInterval(secs)),
    }
}

/// Interval caster settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuffConfig {
    pub active: bool,
    pub slots: [SlotConfig; SLOT_COUNT],
}

/// Everything the controller needs to rebuild its engines.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub heal: HealConfig,
    pub regions: [RegionConfig; REGION_COUNT],
    pub buffs: BuffConfig,
}

impl Profile {
    /// Re-validate every field that has a setter. Returns one message per
    /// replaced field.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut fixes = self.heal.sanitize();
        for (i, slot) in self.buffs.slots.iter_mut().enumerate() {
            fixes.extend(slot.sanitize().into_iter().map(|f| format!("slot {} {}", i + 1, f)));
        }
        fixes
    }
}
