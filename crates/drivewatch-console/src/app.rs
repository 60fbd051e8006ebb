/// Console application: listens for the change signal and redraws.
///
/// The core's notifier calls the listener on its own delivery thread; the
/// listener only pokes a `bounded(1)` channel. The console thread waits on
/// that channel, re-reads the registry snapshot, and reconciles its rows.
use crate::render::{render_json, render_rows, render_summary, render_total};
use crate::state::{ConsoleState, ReconcileSummary};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use drivewatch_core::DriveManager;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How the table is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

pub struct ConsoleApp {
    manager: Arc<DriveManager>,
    pub state: ConsoleState,
    changes: Receiver<()>,
    format: OutputFormat,
}

impl ConsoleApp {
    /// Attach to `manager`'s change signal. Call before or after
    /// `DriveManager::start`; a signal raised earlier is delivered on attach.
    pub fn new(manager: Arc<DriveManager>, format: OutputFormat) -> Self {
        let (tx, rx) = bounded::<()>(1);
        manager.attach_listener(Arc::new(move || {
            let _ = tx.try_send(());
        }));
        Self {
            manager,
            state: ConsoleState::new(),
            changes: rx,
            format,
        }
    }

    /// Reconcile against the current registry snapshot.
    pub fn refresh(&mut self) -> ReconcileSummary {
        let snapshot = self.manager.drives();
        self.state.reconcile(&snapshot)
    }

    /// Wait up to `timeout` for a change signal. Returns the reconcile
    /// summary when one arrived.
    pub fn pump(&mut self, timeout: Duration) -> Option<ReconcileSummary> {
        match self.changes.recv_timeout(timeout) {
            Ok(()) => Some(self.refresh()),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Change listener detached");
                None
            }
        }
    }

    /// Write the consent hint (once) and the current table to `out`.
    pub fn draw(&mut self, out: &mut impl Write, summary: &ReconcileSummary) -> anyhow::Result<()> {
        if let Some(hint) = self.state.consent_hint(self.manager.take_consent_prompt()) {
            writeln!(out, "note: {hint}")?;
        }
        match self.format {
            OutputFormat::Table => {
                writeln!(out, "{}", render_summary(summary, self.state.rows.len()))?;
                write!(out, "{}", render_rows(&self.state.rows))?;
                writeln!(out, "{}", render_total(&self.state.rows))?;
                writeln!(out)?;
            }
            OutputFormat::Json => {
                writeln!(out, "{}", render_json(&self.state.rows)?)?;
            }
        }
        out.flush()?;
        Ok(())
    }

    /// Redraw on every change until `deadline` (or forever).
    pub fn run(&mut self, out: &mut impl Write, deadline: Option<Instant>) -> anyhow::Result<()> {
        let initial = self.refresh();
        self.draw(out, &initial)?;

        loop {
            let wait = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        info!("Exit deadline reached");
                        return Ok(());
                    }
                    (d - now).min(Duration::from_millis(250))
                }
                None => Duration::from_millis(250),
            };
            if let Some(summary) = self.pump(wait) {
                if !summary.is_empty() {
                    self.draw(out, &summary)?;
                }
            }
        }
    }
}
