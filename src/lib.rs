//! # SPI Register Peripheral
//!
//! A tick-accurate model of a small SPI-slave register peripheral.
//!
//! The peripheral watches three asynchronous serial lines (COPI, nCS, SCLK),
//! assembles 16-bit write frames, and applies each valid frame to one of
//! five 8-bit output registers. Everything advances one tick at a time,
//! the way the synchronous logic it models does.

pub mod signal;
pub mod periph;
pub mod host;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use signal::{PinInputs, SyncedSignal, Synchronizer};
pub use periph::{DecodeEvent, Frame, RegAddr, Registers, SpiPeripheral};
pub use host::{load_script, parse_script, DriverTiming, Session, SessionReport, Stimulus, Transaction};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
