use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    execute,
    event::{EnableMouseCapture, DisableMouseCapture},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::info;

use medic_core::{logger, orchestrator, settings};
use medic_core::controller::Controller;
use medic_core::platform::{create_platform, hotkey};
use medic_core::types::Command;

#[derive(Parser)]
#[command(name = "medic", about = "Health-bar heal bot and interval buff caster")]
struct Cli {
    /// Use the logging stub backend instead of real capture and input
    #[arg(long)]
    stub: bool,

    /// Settings file, restored at start and written on save/quit
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// Directory for app.log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Save the frame behind every heal as PNG into this directory
    #[cfg(feature = "debug-capture")]
    #[arg(long)]
    debug_capture: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logger::init(&cli.log_dir)?;

    let profile = settings::load(&cli.settings);
    let controller = Controller::new(create_platform(cli.stub), profile);

    #[cfg(feature = "debug-capture")]
    if let Some(dir) = &cli.debug_capture {
        controller.set_frame_dump(Some(medic_core::debug::FrameDumper::new(dir)?));
    }

    let (log_tx, log_rx) = mpsc::channel::<String>();
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
    let notice = Arc::new(Mutex::new(None));

    logger::set_tui_sender(log_tx);
    info!("medic started, settings {}", cli.settings.display());

    // Global F10 start/stop
    let hotkey_tx = cmd_tx.clone();
    hotkey::listen(move || {
        hotkey_tx.send(Command::StartStop).ok();
    })?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = medic_tui::App::new(controller.clone(), Arc::clone(&notice), log_rx, cmd_tx.clone());

    let orch_settings = cli.settings.clone();
    let orch = thread::Builder::new()
        .name("medic-orchestrator".into())
        .spawn(move || orchestrator::orchestrate(controller, orch_settings, cmd_rx, notice))?;

    let result = medic_tui::event::run(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    // The hotkey thread holds a sender for good, so ask for the stop and
    // save explicitly. A second Quit after the app's own is never read.
    cmd_tx.send(Command::Quit).ok();
    drop(app);
    orch.join().ok();

    result
}
