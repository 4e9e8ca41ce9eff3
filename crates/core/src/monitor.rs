//! Vitality monitor: samples health-bar regions and triggers heals.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::clock::Clock;
use crate::color::{ratio_or_full, FULL_HEALTH};
use crate::config::{HealConfig, RegionConfig};
use crate::engine::{ActionGate, PollingEngine, Tick};
use crate::error::CycleError;
use crate::platform::Ports;
use crate::types::{Point, Rect, REGION_COUNT};

/// Sleep while neither heal mode is active.
pub const IDLE_SLEEP: Duration = Duration::from_millis(500);
/// Between the targeting click and the heal key.
pub const CLICK_TO_KEY_DELAY: Duration = Duration::from_millis(100);
/// After each single-target heal, before the next region.
pub const POST_HEAL_DELAY: Duration = Duration::from_millis(500);

/// One watched health bar.
#[derive(Debug, Clone, Copy)]
pub struct WatchRegion {
    pub config: RegionConfig,
    pub last_ratio: f64,
    pub last_trigger: Instant,
}

impl WatchRegion {
    fn new(config: RegionConfig, now: Instant) -> Self {
        Self { config, last_ratio: FULL_HEALTH, last_trigger: now }
    }
}

/// State shared between the monitor thread and the controller.
#[derive(Debug, Clone)]
pub struct MonitorTable {
    pub heal: HealConfig,
    pub regions: [WatchRegion; REGION_COUNT],
}

impl MonitorTable {
    pub fn new(heal: HealConfig, regions: &[RegionConfig; REGION_COUNT], now: Instant) -> Self {
        Self {
            heal,
            regions: (*regions).map(|r| WatchRegion::new(r, now)),
        }
    }

    /// Current ratio of every region, in index order.
    pub fn ratios(&self) -> [f64; REGION_COUNT] {
        self.regions.map(|r| r.last_ratio)
    }
}

pub type SharedMonitor = Arc<Mutex<MonitorTable>>;

pub(crate) fn lock(table: &SharedMonitor) -> MutexGuard<'_, MonitorTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct VitalityMonitor {
    table: SharedMonitor,
    ports: Ports,
    clock: Arc<dyn Clock>,
    last_cycle: Option<Instant>,
    last_mass_heal: Instant,
    #[cfg(feature = "debug-capture")]
    dumper: Option<crate::debug::FrameDumper>,
}

impl VitalityMonitor {
    /// `ports` should already be gated (see [`crate::engine::gated_ports`]).
    pub fn new(table: SharedMonitor, ports: Ports, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            table,
            ports,
            clock,
            last_cycle: None,
            last_mass_heal: now,
            #[cfg(feature = "debug-capture")]
            dumper: None,
        }
    }

    #[cfg(feature = "debug-capture")]
    pub fn with_frame_dump(mut self, dumper: crate::debug::FrameDumper) -> Self {
        self.dumper = Some(dumper);
        self
    }

    fn armed(&self) -> (HealConfig, Vec<(usize, Rect, Instant)>) {
        let table = lock(&self.table);
        let armed = table
            .regions
            .iter()
            .enumerate()
            .filter_map(|(i, r)| match r.config.bounds {
                Some(bounds) if r.config.active => Some((i, bounds, r.last_trigger)),
                _ => None,
            })
            .collect();
        (table.heal.clone(), armed)
    }

    fn cycle(&mut self, gate: &ActionGate, now: Instant) -> Result<(), CycleError> {
        let (heal, armed) = self.armed();
        let Some(area) = Rect::bounding(armed.iter().map(|(_, r, _)| r)) else {
            return Ok(());
        };
        let frame = self
            .ports
            .screen
            .capture(Some(area))
            .ok_or(CycleError::CaptureUnavailable)?;
        let origin = Point { x: area.x1(), y: area.y1() };

        let mut low = 0usize;
        for (index, bounds, last_trigger) in armed {
            let ratio = ratio_or_full(&frame, origin, &bounds, &heal.color_rule);
            lock(&self.table).regions[index].last_ratio = ratio;
            if ratio > heal.heal_threshold {
                continue;
            }
            low += 1;

            if !heal.heal_active || now.saturating_duration_since(last_trigger) < heal.heal_cooldown {
                continue;
            }
            if !gate.is_open() {
                return Ok(());
            }
            let center = bounds.center();
            self.ports.input.click(center.x, center.y);
            if !gate.pause(self.clock.as_ref(), CLICK_TO_KEY_DELAY) {
                return Ok(());
            }
            self.ports.input.press_key(&heal.heal_key);
            lock(&self.table).regions[index].last_trigger = now;
            info!(target: "monitor", "healed region {} ({:.1}%)", index + 1, ratio);
            #[cfg(feature = "debug-capture")]
            if let Some(dumper) = &self.dumper {
                dumper.dump(&frame, &format!("heal_{}", index + 1));
            }
            if !gate.pause(self.clock.as_ref(), POST_HEAL_DELAY) {
                return Ok(());
            }
        }

        let required = if heal.party_check { 2 } else { 1 };
        if heal.mass_heal_active
            && low >= required
            && now.saturating_duration_since(self.last_mass_heal) >= heal.mass_heal_cooldown
            && gate.is_open()
        {
            self.ports.input.press_key(&heal.mass_heal_key);
            self.last_mass_heal = now;
            info!(target: "monitor", "mass heal ({} regions low)", low);
        }
        Ok(())
    }
}

impl PollingEngine for VitalityMonitor {
    fn name(&self) -> &'static str {
        "monitor"
    }

    fn tick(&mut self, gate: &ActionGate) -> Tick {
        let (active, poll) = {
            let table = lock(&self.table);
            (table.heal.heal_active || table.heal.mass_heal_active, table.heal.poll_interval)
        };
        if !active {
            gate.pause(self.clock.as_ref(), IDLE_SLEEP);
            return Tick::Idle;
        }

        let now = self.clock.now();
        if let Some(last) = self.last_cycle {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < poll {
                gate.pause(self.clock.as_ref(), poll - elapsed);
                return Tick::Idle;
            }
        }
        self.last_cycle = Some(now);
        debug!(target: "monitor", "cycle");
        Tick::Ran(self.cycle(gate, now))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::color::HEALTH_BAR_COLOR;
    use crate::platform::{InputInjector, ScreenCapture};
    use crate::types::{Capture, Rgb};

    const EMPTY: Rgb = Rgb(30, 30, 30);

    /// Records captures and input; serves a frame where region `i` shows
    /// `fill[i]` percent of health bar.
    #[derive(Default)]
    pub(crate) struct FakeScreen {
        pub fill: Mutex<Vec<(Rect, u32)>>,
        pub captures: Mutex<Vec<Option<Rect>>>,
        pub broken: Mutex<bool>,
    }

    impl ScreenCapture for FakeScreen {
        fn capture(&self, rect: Option<Rect>) -> Option<Capture> {
            self.captures.lock().unwrap().push(rect);
            if *self.broken.lock().unwrap() {
                return None;
            }
            let rect = rect?;
            let mut cap = Capture::solid(rect.width(), rect.height(), EMPTY);
            for (bar, pct) in self.fill.lock().unwrap().iter() {
                let filled = bar.width() * pct / 100;
                for y in bar.y1()..bar.y2() {
                    for x in bar.x1()..bar.x1() + filled as i32 {
                        cap.put((x - rect.x1()) as u32, (y - rect.y1()) as u32, HEALTH_BAR_COLOR);
                    }
                }
            }
            Some(cap)
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeInput {
        pub events: Mutex<Vec<String>>,
    }

    impl InputInjector for FakeInput {
        fn press_key(&self, key: &str) {
            self.events.lock().unwrap().push(format!("key {}", key));
        }

        fn click(&self, x: i32, y: i32) {
            self.events.lock().unwrap().push(format!("click {},{}", x, y));
        }
    }

    struct Rig {
        screen: Arc<FakeScreen>,
        input: Arc<FakeInput>,
        clock: Arc<ManualClock>,
        table: SharedMonitor,
        monitor: VitalityMonitor,
        gate: ActionGate,
    }

    fn bar(i: i32) -> Rect {
        Rect::new(0, i * 20, 100, i * 20 + 10).unwrap()
    }

    fn rig(heal: HealConfig, armed: &[usize]) -> Rig {
        let screen = Arc::new(FakeScreen::default());
        let input = Arc::new(FakeInput::default());
        let clock = Arc::new(ManualClock::new());
        let mut regions = [RegionConfig::default(); REGION_COUNT];
        for &i in armed {
            regions[i] = RegionConfig { active: true, bounds: Some(bar(i as i32)) };
        }
        let table = Arc::new(Mutex::new(MonitorTable::new(heal, &regions, clock.now())));
        let ports = Ports { screen: screen.clone(), input: input.clone() };
        let monitor = VitalityMonitor::new(table.clone(), ports, clock.clone());
        Rig { screen, input, clock, table, monitor, gate: ActionGate::new() }
    }

    impl Rig {
        fn set_fill(&self, region: usize, pct: u32) {
            let mut fill = self.screen.fill.lock().unwrap();
            fill.retain(|(r, _)| *r != bar(region as i32));
            fill.push((bar(region as i32), pct));
        }

        fn tick(&mut self) -> Tick {
            self.monitor.tick(&self.gate)
        }

        /// Tick until a full cycle runs.
        fn cycle(&mut self) -> Result<(), CycleError> {
            loop {
                if let Tick::Ran(r) = self.tick() {
                    return r;
                }
            }
        }

        fn events(&self) -> Vec<String> {
            self.input.events.lock().unwrap().clone()
        }
    }

    fn single() -> HealConfig {
        HealConfig { heal_active: true, ..HealConfig::default() }
    }

    fn mass(party: bool) -> HealConfig {
        HealConfig { mass_heal_active: true, party_check: party, ..HealConfig::default() }
    }

    #[test]
    fn test_idle_when_no_mode_active() {
        let mut r = rig(HealConfig::default(), &[0]);
        let start = r.clock.now();
        assert_eq!(r.tick(), Tick::Idle);
        assert_eq!(r.clock.now() - start, IDLE_SLEEP);
        assert!(r.screen.captures.lock().unwrap().is_empty());
    }

    #[test]
    fn test_inactive_regions_never_captured() {
        let mut r = rig(single(), &[2]);
        // Region 0 has bounds but is inactive; region 1 is active but unbounded.
        {
            let mut t = lock(&r.table);
            t.regions[0].config = RegionConfig { active: false, bounds: Some(bar(0)) };
            t.regions[1].config = RegionConfig { active: true, bounds: None };
        }
        r.set_fill(2, 100);
        r.cycle().unwrap();
        assert_eq!(*r.screen.captures.lock().unwrap(), vec![Some(bar(2))]);
        let ratios = lock(&r.table).ratios();
        assert_eq!(ratios[0], FULL_HEALTH);
        assert_eq!(ratios[2], 100.0);
    }

    #[test]
    fn test_no_armed_regions_succeeds_without_capture() {
        let mut r = rig(single(), &[]);
        assert_eq!(r.cycle(), Ok(()));
        assert!(r.screen.captures.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_frame_is_fault() {
        let mut r = rig(single(), &[0]);
        *r.screen.broken.lock().unwrap() = true;
        assert_eq!(r.cycle(), Err(CycleError::CaptureUnavailable));
        assert!(r.events().is_empty());
    }

    #[test]
    fn test_low_region_healed_after_cooldown() {
        let mut r = rig(single(), &[0]);
        r.set_fill(0, 40);
        // last_trigger starts at construction, so the first cycle is
        // still inside the 1s cooldown.
        r.cycle().unwrap();
        assert!(r.events().is_empty());
        assert_eq!(lock(&r.table).regions[0].last_ratio, 40.0);

        r.clock.advance(Duration::from_secs(1));
        r.cycle().unwrap();
        assert_eq!(r.events(), vec!["click 50,5".to_string(), "key 1".to_string()]);
    }

    #[test]
    fn test_single_target_cooldown() {
        let mut r = rig(single(), &[0]);
        r.set_fill(0, 10);
        r.clock.advance(Duration::from_secs(1));
        let t1 = r.clock.now();
        r.cycle().unwrap();
        assert_eq!(r.events().len(), 2);

        // Cycles inside the cooldown never heal the region again.
        while r.clock.now().saturating_duration_since(t1) + Duration::from_millis(100)
            < Duration::from_secs(1)
        {
            r.cycle().unwrap();
        }
        assert_eq!(r.events().len(), 2);
        r.clock.advance(Duration::from_millis(200));
        r.cycle().unwrap();
        assert_eq!(r.events().len(), 4);
    }

    #[test]
    fn test_healthy_region_not_healed() {
        let mut r = rig(single(), &[0]);
        r.set_fill(0, 90);
        r.clock.advance(Duration::from_secs(5));
        r.cycle().unwrap();
        assert!(r.events().is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut r = rig(single(), &[0]);
        r.set_fill(0, 80);
        r.clock.advance(Duration::from_secs(5));
        r.cycle().unwrap();
        assert_eq!(r.events().len(), 2);
    }

    #[test]
    fn test_mass_heal_without_party_check() {
        let mut r = rig(mass(false), &[0, 1]);
        r.set_fill(0, 20);
        r.set_fill(1, 100);
        r.clock.advance(Duration::from_secs(3));
        r.cycle().unwrap();
        assert_eq!(r.events(), vec!["key 2".to_string()]);
    }

    #[test]
    fn test_party_check_needs_two_low() {
        let mut r = rig(mass(true), &[0, 1]);
        r.set_fill(0, 20);
        r.set_fill(1, 100);
        r.clock.advance(Duration::from_secs(3));
        r.cycle().unwrap();
        assert!(r.events().is_empty());

        r.set_fill(1, 50);
        r.clock.advance(Duration::from_millis(100));
        r.cycle().unwrap();
        assert_eq!(r.events(), vec!["key 2".to_string()]);
    }

    #[test]
    fn test_mass_heal_cooldown() {
        let mut r = rig(mass(false), &[0, 1, 2]);
        for i in 0..3 {
            r.set_fill(i, 10);
        }
        r.clock.advance(Duration::from_secs(3));
        r.cycle().unwrap();
        // Three low regions still give one mass heal per cycle.
        assert_eq!(r.events(), vec!["key 2".to_string()]);
        r.clock.advance(Duration::from_secs(2));
        r.cycle().unwrap();
        assert_eq!(r.events().len(), 1);
        r.clock.advance(Duration::from_secs(1));
        r.cycle().unwrap();
        assert_eq!(r.events().len(), 2);
    }

    #[test]
    fn test_poll_interval_paces_cycles() {
        let mut r = rig(single(), &[0]);
        r.set_fill(0, 100);
        assert!(matches!(r.tick(), Tick::Ran(Ok(()))));
        assert_eq!(r.tick(), Tick::Idle);
        assert!(matches!(r.tick(), Tick::Ran(Ok(()))));
        assert_eq!(r.screen.captures.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_closed_gate_suppresses_heal() {
        let mut r = rig(single(), &[0]);
        r.set_fill(0, 10);
        r.clock.advance(Duration::from_secs(2));
        r.gate.close();
        let now = r.clock.now();
        assert_eq!(r.monitor.cycle(&r.gate, now), Ok(()));
        assert!(r.events().is_empty());
    }
}
