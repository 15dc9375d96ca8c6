//! The SPI register peripheral.
//!
//! Pipeline per tick, leaves first:
//! - input synchronizer ([`crate::signal`])
//! - transaction framer and bit sampler ([`decoder`])
//! - frame validation and dispatch ([`frame`], [`decoder`])
//! - five 8-bit output registers ([`registers`])

pub mod registers;
pub mod frame;
pub mod decoder;

pub use registers::{Registers, RegAddr, UnmappedAddress, REGISTER_COUNT};
pub use frame::{Frame, FrameError, RegisterWrite, FRAME_BITS, MAX_ADDRESS};
pub use decoder::{
    transition, DecodeEvent, DecoderState, Phase, Rejection, SpiPeripheral, TransactionState,
};
