//! TUI debugger for the SPI peripheral.
//!
//! Steps the peripheral through a rendered script with:
//! - Live register view
//! - Synchronizer histories and the frame being assembled
//! - Decoder event log
//! - Step/next-event/run/break-on-write controls

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
