//! 16-bit command frame.
//!
//! Wire format, transmitted MSB first:
//!
//! ```text
//!  15   14 ........ 8   7 ........ 0
//! [W] [  address (7) ] [  data (8)  ]
//! ```
//!
//! `W` is the write flag. Frames with `W = 0` are read requests, which the
//! peripheral does not implement.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use super::registers::{RegAddr, UnmappedAddress};

/// Number of bits in a complete frame.
pub const FRAME_BITS: u8 = 16;

/// Largest encodable register address.
pub const MAX_ADDRESS: u8 = 0x7F;

/// A frame as assembled from the serial bitstream.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Frame(u16);

impl Frame {
    const WRITE_FLAG: u16 = 1 << 15;

    /// Interpret a raw shift-buffer value.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Build a frame. The address is truncated to 7 bits.
    pub const fn new(write: bool, address: u8, data: u8) -> Self {
        let flag = if write { Self::WRITE_FLAG } else { 0 };
        Self(flag | (((address & MAX_ADDRESS) as u16) << 8) | data as u16)
    }

    /// Build a write frame targeting a mapped register.
    pub const fn write(reg: RegAddr, data: u8) -> Self {
        Self::new(true, reg.address(), data)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn write_flag(self) -> bool {
        self.0 & Self::WRITE_FLAG != 0
    }

    /// Bits 14-8.
    #[inline]
    pub const fn address(self) -> u8 {
        ((self.0 >> 8) as u8) & MAX_ADDRESS
    }

    /// Bits 7-0.
    #[inline]
    pub const fn data(self) -> u8 {
        self.0 as u8
    }

    /// The frame's bits in transmission order (MSB first).
    pub fn bits(self) -> impl Iterator<Item = bool> {
        (0..FRAME_BITS).rev().map(move |i| self.0 & (1 << i) != 0)
    }

    /// Decode into a register write, or say why the frame is not one.
    pub fn decode(self) -> Result<RegisterWrite, FrameError> {
        if !self.write_flag() {
            return Err(FrameError::ReadNotSupported { address: self.address() });
        }
        let reg = RegAddr::try_from(self.address())?;
        Ok(RegisterWrite { reg, value: self.data() })
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({:#06x})", self.0)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.write_flag() { 'W' } else { 'R' };
        write!(f, "{} a=0x{:02X} d=0x{:02X}", kind, self.address(), self.data())
    }
}

/// A decoded single-register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWrite {
    pub reg: RegAddr,
    pub value: u8,
}

/// Reasons a complete frame does not decode to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FrameError {
    #[error("read of address 0x{address:02X} is not supported")]
    ReadNotSupported { address: u8 },

    #[error(transparent)]
    Unmapped(#[from] UnmappedAddress),
}
