/// DriveWatch console: terminal frontend over the live drive registry.
///
/// This crate contains all presentation code. Discovery and watching live
/// in `drivewatch-core`.
pub mod app;
pub mod render;
pub mod simulate;
pub mod state;

pub use app::{ConsoleApp, OutputFormat};
pub use state::{ConsoleRow, ConsoleState, ReconcileSummary};
