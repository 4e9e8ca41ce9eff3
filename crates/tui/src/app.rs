use std::collections::VecDeque;
use std::sync::{mpsc, PoisonError};

use medic_core::controller::{Controller, Status};
use medic_core::orchestrator::Notice;
use medic_core::types::{Command, RunState, REGION_COUNT, SLOT_COUNT};

use crate::confirm::ConfirmDialog;

/// Threshold step for `+` / `-`.
pub const THRESHOLD_STEP: i32 = 5;

/// Log lines kept for the logs panel; older ones are dropped.
pub const LOG_CAPACITY: usize = 1000;

/// One selectable line of the settings panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    Heal,
    MassHeal,
    Party,
    Region(usize),
    Buffs,
    Slot(usize),
}

impl Row {
    pub fn all() -> Vec<Row> {
        let mut rows = vec![Row::Heal, Row::MassHeal, Row::Party];
        rows.extend((0..REGION_COUNT).map(Row::Region));
        rows.push(Row::Buffs);
        rows.extend((0..SLOT_COUNT).map(Row::Slot));
        rows
    }
}

/// What a text prompt edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTarget {
    RegionBounds(usize),
    SlotKey(usize),
    SlotInterval(usize),
    HealKey,
    MassHealKey,
}

impl PromptTarget {
    pub fn title(&self) -> String {
        match self {
            PromptTarget::RegionBounds(i) => format!(" Region {} bounds (x1,y1,x2,y2) ", i + 1),
            PromptTarget::SlotKey(i) => format!(" Slot {} key ", i + 1),
            PromptTarget::SlotInterval(i) => format!(" Slot {} interval (s) ", i + 1),
            PromptTarget::HealKey => " Heal key ".to_string(),
            PromptTarget::MassHealKey => " Mass heal key ".to_string(),
        }
    }

    fn command(self, text: String) -> Command {
        match self {
            PromptTarget::RegionBounds(i) => Command::SetRegionBounds(i, text),
            PromptTarget::SlotKey(i) => Command::SetSlotKey(i, text),
            PromptTarget::SlotInterval(i) => Command::SetSlotInterval(i, text),
            PromptTarget::HealKey => Command::SetHealKey(text),
            PromptTarget::MassHealKey => Command::SetMassHealKey(text),
        }
    }
}

pub struct Prompt {
    pub target: PromptTarget,
    pub buffer: String,
}

pub struct App {
    pub controller: Controller,
    pub status: Status,
    pub notice: Notice,
    pub rows: Vec<Row>,
    pub selected: usize,
    pub prompt: Option<Prompt>,
    pub confirm: Option<ConfirmDialog>,
    pub log_visible: bool,
    pub log_messages: VecDeque<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub cmd_tx: mpsc::Sender<Command>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        controller: Controller,
        notice: Notice,
        log_rx: mpsc::Receiver<String>,
        cmd_tx: mpsc::Sender<Command>,
    ) -> Self {
        let status = controller.snapshot();
        Self {
            controller,
            status,
            notice,
            rows: Row::all(),
            selected: 0,
            prompt: None,
            confirm: None,
            log_visible: true,
            log_messages: VecDeque::new(),
            log_scroll: 0,
            log_rx,
            cmd_tx,
            should_quit: false,
        }
    }

    pub fn refresh(&mut self) {
        self.status = self.controller.snapshot();
    }

    pub fn notice_text(&self) -> Option<String> {
        self.notice.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn drain_logs(&mut self) {
        while let Ok(msg) = self.log_rx.try_recv() {
            if self.log_messages.len() == LOG_CAPACITY {
                self.log_messages.pop_front();
            }
            self.log_messages.push_back(msg);
            if self.log_scroll > 0 {
                // keep the viewport on the same lines
                self.log_scroll += 1;
            }
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn current_row(&self) -> Row {
        self.rows[self.selected]
    }

    pub fn move_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn move_down(&mut self) {
        if self.selected + 1 < self.rows.len() {
            self.selected += 1;
        }
    }

    fn send(&self, cmd: Command) {
        self.cmd_tx.send(cmd).ok();
    }

    pub fn toggle_selected(&mut self) {
        let cmd = match self.current_row() {
            Row::Heal => Command::ToggleHeal,
            Row::MassHeal => Command::ToggleMassHeal,
            Row::Party => Command::ToggleParty,
            Row::Region(i) => Command::ToggleRegion(i),
            Row::Buffs => Command::ToggleBuffs,
            Row::Slot(i) => Command::ToggleSlot(i),
        };
        self.send(cmd);
    }

    /// `+` / `-` on a heal row.
    pub fn adjust_threshold(&mut self, sign: i32) {
        match self.current_row() {
            Row::Heal => self.send(Command::AdjustHealThreshold(sign * THRESHOLD_STEP)),
            Row::MassHeal => self.send(Command::AdjustMassThreshold(sign * THRESHOLD_STEP)),
            _ => {}
        }
    }

    /// Open the main editor for the selected row: bounds for regions,
    /// keys for heals and slots.
    pub fn edit_selected(&mut self) {
        let profile = &self.status.profile;
        let (target, current) = match self.current_row() {
            Row::Heal => (PromptTarget::HealKey, profile.heal.heal_key.clone()),
            Row::MassHeal => (PromptTarget::MassHealKey, profile.heal.mass_heal_key.clone()),
            Row::Region(i) => (
                PromptTarget::RegionBounds(i),
                profile.regions[i]
                    .bounds
                    .map(|b| {
                        let [x1, y1, x2, y2] = b.coords();
                        format!("{},{},{},{}", x1, y1, x2, y2)
                    })
                    .unwrap_or_default(),
            ),
            Row::Slot(i) => (PromptTarget::SlotKey(i), profile.buffs.slots[i].key.clone()),
            Row::Party | Row::Buffs => return,
        };
        self.prompt = Some(Prompt { target, buffer: current });
    }

    pub fn edit_interval(&mut self) {
        if let Row::Slot(i) = self.current_row() {
            let current = self.status.profile.buffs.slots[i].interval.to_string();
            self.prompt = Some(Prompt { target: PromptTarget::SlotInterval(i), buffer: current });
        }
    }

    pub fn clear_selected(&mut self) {
        if let Row::Region(i) = self.current_row() {
            self.send(Command::ClearRegionBounds(i));
        }
    }

    pub fn reset_selected(&mut self) {
        if let Row::Slot(i) = self.current_row() {
            self.send(Command::ResetSlot(i));
        }
    }

    pub fn submit_prompt(&mut self) {
        if let Some(prompt) = self.prompt.take() {
            self.send(prompt.target.command(prompt.buffer));
        }
    }

    pub fn cancel_prompt(&mut self) {
        self.prompt = None;
    }

    pub fn start_stop(&mut self) {
        if self.status.state != RunState::Stopping {
            self.send(Command::StartStop);
        }
    }

    pub fn save(&mut self) {
        self.send(Command::Save);
    }

    /// Throw away unsaved edits.
    pub fn reload(&mut self) {
        self.send(Command::Reload);
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    /// Ask first while the engines are running.
    pub fn request_quit(&mut self) {
        if self.status.state == RunState::Stopped {
            self.quit();
        } else {
            self.confirm = Some(ConfirmDialog::new("Engines are running. Quit?"));
        }
    }

    pub fn quit(&mut self) {
        self.send(Command::Quit);
        self.should_quit = true;
    }
}
