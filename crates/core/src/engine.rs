//! Shared loop machinery for the polling engines.
//!
//! An engine implements [`PollingEngine`]; [`Worker::spawn`] runs it on its
//! own thread through [`run_loop`], which owns fault counting, panic
//! isolation and cooperative cancellation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::CycleError;
use crate::platform::{InputInjector, Ports};

/// Consecutive faulted cycles after which a loop stops itself.
pub const MAX_CONSECUTIVE_FAULTS: u32 = 10;

/// Pause after a faulted cycle.
pub const FAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Longest uninterrupted sleep inside [`ActionGate::pause`].
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Shared run flag of one engine instance. Open while the engine may act.
#[derive(Debug, Clone)]
pub struct ActionGate(Arc<AtomicBool>);

impl ActionGate {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Sleep `dur` in short slices, returning early once the gate closes.
    /// Returns whether the gate is still open.
    pub fn pause(&self, clock: &dyn Clock, dur: Duration) -> bool {
        let mut left = dur;
        while !left.is_zero() {
            if !self.is_open() {
                return false;
            }
            let step = left.min(PAUSE_SLICE);
            clock.sleep(step);
            left -= step;
        }
        self.is_open()
    }
}

impl Default for ActionGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Input wrapper that drops every action once its gate is closed.
pub struct GatedInput {
    inner: Arc<dyn InputInjector>,
    gate: ActionGate,
}

impl GatedInput {
    pub fn new(inner: Arc<dyn InputInjector>, gate: ActionGate) -> Self {
        Self { inner, gate }
    }
}

impl InputInjector for GatedInput {
    fn press_key(&self, key: &str) {
        if self.gate.is_open() {
            self.inner.press_key(key);
        } else {
            debug!(target: "engine", "gate closed, dropping press_key({})", key);
        }
    }

    fn click(&self, x: i32, y: i32) {
        if self.gate.is_open() {
            self.inner.click(x, y);
        } else {
            debug!(target: "engine", "gate closed, dropping click({}, {})", x, y);
        }
    }
}

/// Copy of `ports` whose input side is bound to `gate`.
pub fn gated_ports(ports: &Ports, gate: &ActionGate) -> Ports {
    Ports {
        screen: ports.screen.clone(),
        input: Arc::new(GatedInput::new(ports.input.clone(), gate.clone())),
    }
}

/// Outcome of one call to [`PollingEngine::tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Nothing to do this time (inactive, or waiting for the poll period).
    /// Does not touch the fault counter.
    Idle,
    /// A full cycle ran.
    Ran(Result<(), CycleError>),
}

/// One polling engine. `tick` performs at most one cycle, including any
/// pacing sleeps, and must check `gate` before each action.
pub trait PollingEngine: Send + 'static {
    fn name(&self) -> &'static str;
    fn tick(&mut self, gate: &ActionGate) -> Tick;
}

/// Consecutive fault counter.
#[derive(Debug, Clone)]
pub struct FaultBudget {
    consecutive: u32,
    limit: u32,
}

impl FaultBudget {
    pub fn new(limit: u32) -> Self {
        Self { consecutive: 0, limit }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Count a fault. Returns `true` once the limit is reached.
    pub fn record_fault(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.limit
    }
}

impl Default for FaultBudget {
    fn default() -> Self {
        Self::new(MAX_CONSECUTIVE_FAULTS)
    }
}

/// Why [`run_loop`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The gate was closed from outside.
    Stopped,
    /// Too many consecutive faults; the loop closed its own gate.
    Exhausted,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Tick `engine` until `gate` closes or the fault budget runs out.
pub fn run_loop(engine: &mut dyn PollingEngine, gate: &ActionGate, clock: &dyn Clock) -> LoopExit {
    let name = engine.name();
    let mut budget = FaultBudget::default();
    info!(target: "engine", "{} loop started", name);

    while gate.is_open() {
        let tick = panic::catch_unwind(AssertUnwindSafe(|| engine.tick(gate)))
            .unwrap_or_else(|payload| Tick::Ran(Err(CycleError::Panicked(panic_message(&*payload)))));

        match tick {
            Tick::Idle => {}
            Tick::Ran(Ok(())) => budget.record_success(),
            Tick::Ran(Err(e)) => {
                if budget.record_fault() {
                    error!(
                        target: "engine",
                        "{}: {} consecutive faults (last: {}), stopping",
                        name, budget.consecutive(), e
                    );
                    gate.close();
                    return LoopExit::Exhausted;
                }
                warn!(target: "engine", "{} cycle fault {}/{}: {}", name, budget.consecutive(), MAX_CONSECUTIVE_FAULTS, e);
                gate.pause(clock, FAULT_BACKOFF);
            }
        }
    }

    info!(target: "engine", "{} loop stopped", name);
    LoopExit::Stopped
}

/// A running engine thread.
pub struct Worker {
    name: &'static str,
    gate: ActionGate,
    handle: Option<JoinHandle<()>>,
    done_rx: mpsc::Receiver<LoopExit>,
    exit: Option<LoopExit>,
}

impl Worker {
    /// Start `engine` on a named thread. `gate` must be the one its ports
    /// were bound to.
    pub fn spawn<E: PollingEngine>(
        mut engine: E,
        gate: ActionGate,
        clock: Arc<dyn Clock>,
    ) -> std::io::Result<Self> {
        let name = engine.name();
        let (done_tx, done_rx) = mpsc::channel();
        let loop_gate = gate.clone();
        let handle = thread::Builder::new()
            .name(format!("medic-{}", name))
            .spawn(move || {
                let exit = run_loop(&mut engine, &loop_gate, clock.as_ref());
                done_tx.send(exit).ok();
            })?;
        Ok(Self { name, gate, handle: Some(handle), done_rx, exit: None })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn poll_exit(&mut self) {
        if self.exit.is_none() {
            match self.done_rx.try_recv() {
                Ok(exit) => self.exit = Some(exit),
                Err(mpsc::TryRecvError::Disconnected) => self.exit = Some(LoopExit::Stopped),
                Err(mpsc::TryRecvError::Empty) => {}
            }
        }
    }

    /// How the loop ended, or `None` while it is still running.
    pub fn exit(&mut self) -> Option<LoopExit> {
        self.poll_exit();
        self.exit
    }

    pub fn is_running(&mut self) -> bool {
        self.exit().is_none()
    }

    /// Close the gate without waiting. No input passes once this returns.
    pub fn signal(&self) {
        self.gate.close();
    }

    /// Close the gate and wait up to `deadline` for the thread to finish.
    /// Returns `true` if it finished in time; otherwise the thread is
    /// detached and its remaining actions are dropped by the gate.
    pub fn stop(&mut self, deadline: Instant) -> bool {
        self.signal();
        if self.exit.is_none() {
            let wait = deadline.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(wait) {
                Ok(exit) => self.exit = Some(exit),
                Err(mpsc::RecvTimeoutError::Disconnected) => self.exit = Some(LoopExit::Stopped),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    warn!(target: "engine", "{} did not stop in time, detaching", self.name);
                    self.handle.take();
                    return false;
                }
            }
        }
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
        true
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.gate.close();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::clock::manual::ManualClock;

    struct Scripted {
        script: VecDeque<Tick>,
        ticks: Arc<Mutex<u32>>,
    }

    impl Scripted {
        fn new(script: Vec<Tick>) -> (Self, Arc<Mutex<u32>>) {
            let ticks = Arc::new(Mutex::new(0));
            (Self { script: script.into(), ticks: ticks.clone() }, ticks)
        }
    }

    impl PollingEngine for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn tick(&mut self, gate: &ActionGate) -> Tick {
            *self.ticks.lock().unwrap() += 1;
            match self.script.pop_front() {
                Some(t) => t,
                None => {
                    gate.close();
                    Tick::Idle
                }
            }
        }
    }

    fn faults(n: usize) -> Vec<Tick> {
        vec![Tick::Ran(Err(CycleError::CaptureUnavailable)); n]
    }

    #[test]
    fn test_budget_counts_and_resets() {
        let mut b = FaultBudget::new(3);
        assert!(!b.record_fault());
        assert!(!b.record_fault());
        b.record_success();
        assert_eq!(b.consecutive(), 0);
        assert!(!b.record_fault());
        assert!(!b.record_fault());
        assert!(b.record_fault());
    }

    #[test]
    fn test_self_stop_at_tenth_fault() {
        let (mut engine, ticks) = Scripted::new(faults(20));
        let gate = ActionGate::new();
        let clock = ManualClock::new();
        assert_eq!(run_loop(&mut engine, &gate, &clock), LoopExit::Exhausted);
        assert_eq!(*ticks.lock().unwrap(), 10);
        assert!(!gate.is_open());
    }

    #[test]
    fn test_success_at_nine_resets_counter() {
        let mut script = faults(9);
        script.push(Tick::Ran(Ok(())));
        script.extend(faults(9));
        let (mut engine, ticks) = Scripted::new(script);
        let gate = ActionGate::new();
        let clock = ManualClock::new();
        // Nine faults after the success are not enough; the script runs dry
        // and closes the gate itself.
        assert_eq!(run_loop(&mut engine, &gate, &clock), LoopExit::Stopped);
        assert_eq!(*ticks.lock().unwrap(), 20);
    }

    #[test]
    fn test_idle_ticks_do_not_reset_counter() {
        let mut script = faults(5);
        script.push(Tick::Idle);
        script.extend(faults(5));
        let (mut engine, _) = Scripted::new(script);
        let clock = ManualClock::new();
        assert_eq!(run_loop(&mut engine, &ActionGate::new(), &clock), LoopExit::Exhausted);
    }

    struct Panicker;

    impl PollingEngine for Panicker {
        fn name(&self) -> &'static str {
            "panicker"
        }

        fn tick(&mut self, _gate: &ActionGate) -> Tick {
            panic!("boom");
        }
    }

    #[test]
    fn test_panics_count_as_faults() {
        let clock = ManualClock::new();
        assert_eq!(run_loop(&mut Panicker, &ActionGate::new(), &clock), LoopExit::Exhausted);
    }

    #[test]
    fn test_pause_returns_early_when_closed() {
        let gate = ActionGate::new();
        let clock = ManualClock::new();
        let start = clock.now();
        assert!(gate.pause(&clock, Duration::from_millis(120)));
        assert_eq!(clock.now() - start, Duration::from_millis(120));
        gate.close();
        assert!(!gate.pause(&clock, Duration::from_secs(5)));
        assert_eq!(clock.now() - start, Duration::from_millis(120));
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl InputInjector for Recorder {
        fn press_key(&self, key: &str) {
            self.0.lock().unwrap().push(key.to_string());
        }

        fn click(&self, x: i32, y: i32) {
            self.0.lock().unwrap().push(format!("{},{}", x, y));
        }
    }

    #[test]
    fn test_gated_input_drops_after_close() {
        let rec = Arc::new(Recorder::default());
        let gate = ActionGate::new();
        let input = GatedInput::new(rec.clone(), gate.clone());
        input.press_key("1");
        gate.close();
        input.press_key("2");
        input.click(1, 1);
        assert_eq!(*rec.0.lock().unwrap(), vec!["1".to_string()]);
    }

    struct Spinner;

    impl PollingEngine for Spinner {
        fn name(&self) -> &'static str {
            "spinner"
        }

        fn tick(&mut self, gate: &ActionGate) -> Tick {
            gate.pause(&crate::clock::SystemClock, Duration::from_millis(200));
            Tick::Ran(Ok(()))
        }
    }

    #[test]
    fn test_worker_stop_is_prompt() {
        let gate = ActionGate::new();
        let mut worker =
            Worker::spawn(Spinner, gate.clone(), Arc::new(crate::clock::SystemClock)).unwrap();
        assert!(worker.is_running());
        let begin = Instant::now();
        assert!(worker.stop(begin + Duration::from_secs(2)));
        assert!(begin.elapsed() < Duration::from_secs(1));
        assert_eq!(worker.exit(), Some(LoopExit::Stopped));
    }
}
