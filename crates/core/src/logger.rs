use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock, PoisonError};

use anyhow::Context;
use chrono::Local;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "MEDIC_LOG";

static TUI_TX: OnceLock<Mutex<Option<mpsc::Sender<String>>>> = OnceLock::new();

fn tui_slot() -> &'static Mutex<Option<mpsc::Sender<String>>> {
    TUI_TX.get_or_init(|| Mutex::new(None))
}

/// Local wall-clock `HH:MM:SS`.
#[derive(Debug, Clone, Copy)]
pub struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%H:%M:%S"))
    }
}

/// Writer factory that forwards each formatted line to the TUI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TuiMakeWriter;

impl<'a> MakeWriter<'a> for TuiMakeWriter {
    type Writer = TuiWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TuiWriter
    }
}

/// Sends what it is given, one message per write. Drops output until a
/// sender is wired.
pub struct TuiWriter;

impl Write for TuiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        let line = line.trim_end();
        if !line.is_empty() {
            let slot = tui_slot().lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(tx) = slot.as_ref() {
                tx.send(line.to_string()).ok();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Install the global subscriber: `<log_dir>/app.log` (truncated) plus
/// the TUI channel, both filtered by `MEDIC_LOG` (default `info`).
pub fn init(log_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating {}", log_dir.display()))?;
    let log_path = log_dir.join("app.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_timer(LocalTimer);
    let tui_layer = fmt::layer()
        .with_writer(TuiMakeWriter)
        .with_ansi(false)
        .with_timer(LocalTimer);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(tui_layer)
        .try_init()
        .context("installing log subscriber")?;
    Ok(())
}

/// Wire the TUI log channel.
pub fn set_tui_sender(tx: mpsc::Sender<String>) {
    *tui_slot().lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tui_writer_forwards_lines() {
        let (tx, rx) = mpsc::channel();
        set_tui_sender(tx);
        let mut w = TuiMakeWriter.make_writer();
        w.write_all(b"12:00:00  INFO monitor: healed region 1\n").unwrap();
        w.write_all(b"\n").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "12:00:00  INFO monitor: healed region 1");
        assert!(rx.try_recv().is_err());
    }
}
