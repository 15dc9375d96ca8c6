//! Bus-master side stimulus generation.
//!
//! Builds the per-tick pin levels a controller would drive while talking to
//! the peripheral. Bits go out MSB first: COPI is set while SCLK is low for
//! one half period, then SCLK is raised for another half period with COPI
//! held.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::periph::frame::{Frame, MAX_ADDRESS};
use crate::signal::PinInputs;

/// Tick counts used when rendering bus activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverTiming {
    /// Ticks per SCLK half period.
    pub half_period: u32,
    /// Ticks between nCS falling and the first SCLK phase.
    pub select_setup: u32,
    /// Ticks the bus is left idle after nCS returns high.
    pub settle: u32,
}

impl DriverTiming {
    /// Tightest timing the synchronizer can still follow.
    pub const FAST: DriverTiming = DriverTiming {
        half_period: 1,
        select_setup: 1,
        settle: 4,
    };

    pub fn validate(&self) -> Result<(), DriverError> {
        if self.half_period == 0 {
            return Err(DriverError::InvalidTiming("half_period must be at least 1"));
        }
        if self.select_setup == 0 {
            return Err(DriverError::InvalidTiming("select_setup must be at least 1"));
        }
        // The closing edge needs two ticks to reach the dispatcher.
        if self.settle < 2 {
            return Err(DriverError::InvalidTiming("settle must be at least 2"));
        }
        Ok(())
    }

    /// Ticks taken by a transaction of `bits` bits, settle included.
    pub fn transaction_len(&self, bits: usize) -> usize {
        self.select_setup as usize + bits * 2 * self.half_period as usize + self.settle as usize
    }

    /// Load timing from a JSON file. Missing fields keep their defaults.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self, DriverError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DriverError::Io(e.to_string()))?;
        let timing: DriverTiming = serde_json::from_str(&text)
            .map_err(|e| DriverError::Config(e.to_string()))?;
        timing.validate()?;
        Ok(timing)
    }
}

impl Default for DriverTiming {
    /// 10 MHz peripheral clock, 10 kHz SCLK.
    fn default() -> Self {
        Self {
            half_period: 50,
            select_setup: 1,
            settle: 600,
        }
    }
}

/// One bus transaction as the controller sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub write: bool,
    pub address: u8,
    pub data: u8,
}

impl Transaction {
    pub fn new(write: bool, address: u8, data: u8) -> Result<Self, DriverError> {
        if address > MAX_ADDRESS {
            return Err(DriverError::AddressOutOfRange(address));
        }
        Ok(Self { write, address, data })
    }

    pub fn write(address: u8, data: u8) -> Result<Self, DriverError> {
        Self::new(true, address, data)
    }

    /// A frame with the write flag clear. The peripheral ignores these.
    pub fn read(address: u8, data: u8) -> Result<Self, DriverError> {
        Self::new(false, address, data)
    }

    pub fn frame(&self) -> Frame {
        Frame::new(self.write, self.address, self.data)
    }
}

/// A growing sequence of per-tick pin levels.
#[derive(Debug, Clone, Default)]
pub struct Stimulus {
    timing: DriverTiming,
    steps: Vec<PinInputs>,
}

impl Stimulus {
    pub fn new(timing: DriverTiming) -> Result<Self, DriverError> {
        timing.validate()?;
        Ok(Self { timing, steps: Vec::new() })
    }

    pub fn timing(&self) -> &DriverTiming {
        &self.timing
    }

    /// Hold the bus idle (nCS high).
    pub fn idle(&mut self, ticks: usize) -> &mut Self {
        self.hold(PinInputs::IDLE, ticks)
    }

    /// Hold reset with the bus idle.
    pub fn reset(&mut self, ticks: usize) -> &mut Self {
        self.hold(PinInputs::RESET, ticks)
    }

    /// Drive a full 16-bit transaction.
    pub fn transaction(&mut self, txn: &Transaction) -> &mut Self {
        let bits: Vec<bool> = txn.frame().bits().collect();
        self.bits(&bits)
    }

    /// Drive a transaction carrying an arbitrary number of bits.
    ///
    /// Anything other than 16 bits is a malformed frame as far as the
    /// peripheral is concerned; useful for exercising rejection paths.
    pub fn bits(&mut self, bits: &[bool]) -> &mut Self {
        let half = self.timing.half_period as usize;

        self.hold(PinInputs::selected(false, false), self.timing.select_setup as usize);
        for &bit in bits {
            self.hold(PinInputs::selected(bit, false), half);
            self.hold(PinInputs::selected(bit, true), half);
        }
        self.idle(self.timing.settle as usize)
    }

    fn hold(&mut self, pins: PinInputs, ticks: usize) -> &mut Self {
        self.steps.extend(std::iter::repeat(pins).take(ticks));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn as_slice(&self) -> &[PinInputs] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<PinInputs> {
        self.steps
    }
}

/// Errors raised while building bus activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("address 0x{0:02X} does not fit in 7 bits")]
    AddressOutOfRange(u8),

    #[error("invalid timing: {0}")]
    InvalidTiming(&'static str),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("bad timing config: {0}")]
    Config(String),
}
