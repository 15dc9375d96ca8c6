//! External signal handling.
//!
//! - [`PinInputs`] - raw levels on the three serial lines plus reset
//! - [`Synchronizer`] - 2-deep sample histories used for edge detection

mod pins;
mod sync;

pub use pins::{PinInputs, PORT_COPI, PORT_NCS, PORT_SCLK};
pub use sync::{Edge, SyncedSignal, Synchronizer};
