//! Controller-side tooling.
//!
//! This module provides:
//! - A stimulus generator that renders bus transactions to pin levels
//! - A small script format for describing bus sessions
//! - A session runner that checks register expectations

pub mod driver;
pub mod script;
pub mod session;

pub use driver::{DriverError, DriverTiming, Stimulus, Transaction};
pub use script::{load_script, parse_script, Command, Script, ScriptError};
pub use session::{run_script_file, ExpectationFailed, Session, SessionError, SessionReport};
