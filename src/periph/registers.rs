//! Peripheral register file.
//!
//! Five independent 8-bit cells, addressed 0x00-0x04:
//! - 0x00: output-enable, low byte (drives `uo_out`)
//! - 0x01: output-enable, high byte (drives `uio_out`)
//! - 0x02: pwm-enable, low byte
//! - 0x03: pwm-enable, high byte
//! - 0x04: pwm duty cycle
//!
//! Every other 7-bit address is reserved and never maps to a cell.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Number of mapped registers.
pub const REGISTER_COUNT: usize = 5;

/// A mapped register address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegAddr {
    OutputEnableLo = 0x00,
    OutputEnableHi = 0x01,
    PwmEnableLo = 0x02,
    PwmEnableHi = 0x03,
    PwmDutyCycle = 0x04,
}

impl RegAddr {
    /// All mapped registers in address order.
    pub const ALL: [RegAddr; REGISTER_COUNT] = [
        RegAddr::OutputEnableLo,
        RegAddr::OutputEnableHi,
        RegAddr::PwmEnableLo,
        RegAddr::PwmEnableHi,
        RegAddr::PwmDutyCycle,
    ];

    /// Wire address of this register.
    pub const fn address(self) -> u8 {
        self as u8
    }

    /// Short letter label (A-E) used by scripts and the debugger.
    pub const fn label(self) -> char {
        match self {
            RegAddr::OutputEnableLo => 'A',
            RegAddr::OutputEnableHi => 'B',
            RegAddr::PwmEnableLo => 'C',
            RegAddr::PwmEnableHi => 'D',
            RegAddr::PwmDutyCycle => 'E',
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            RegAddr::OutputEnableLo => "output-enable[7:0]",
            RegAddr::OutputEnableHi => "output-enable[15:8]",
            RegAddr::PwmEnableLo => "pwm-enable[7:0]",
            RegAddr::PwmEnableHi => "pwm-enable[15:8]",
            RegAddr::PwmDutyCycle => "pwm-duty-cycle",
        }
    }

    /// Look a register up by its letter label, case-insensitive.
    pub fn from_label(label: char) -> Option<Self> {
        let upper = label.to_ascii_uppercase();
        Self::ALL.into_iter().find(|reg| reg.label() == upper)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for RegAddr {
    type Error = UnmappedAddress;

    fn try_from(address: u8) -> Result<Self, Self::Error> {
        match address {
            0x00 => Ok(RegAddr::OutputEnableLo),
            0x01 => Ok(RegAddr::OutputEnableHi),
            0x02 => Ok(RegAddr::PwmEnableLo),
            0x03 => Ok(RegAddr::PwmEnableHi),
            0x04 => Ok(RegAddr::PwmDutyCycle),
            other => Err(UnmappedAddress(other)),
        }
    }
}

impl std::fmt::Display for RegAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label(), self.name())
    }
}

/// An address with no register behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("address 0x{0:02X} is not mapped to a register")]
pub struct UnmappedAddress(pub u8);

/// The peripheral's five output registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    cells: [u8; REGISTER_COUNT],
}

impl Registers {
    /// Create a register file with all cells zeroed.
    pub const fn new() -> Self {
        Self { cells: [0; REGISTER_COUNT] }
    }

    #[inline]
    pub const fn read(&self, reg: RegAddr) -> u8 {
        self.cells[reg.index()]
    }

    /// Overwrite one cell. Only frame dispatch calls this.
    #[inline]
    pub(crate) fn write(&mut self, reg: RegAddr, value: u8) {
        self.cells[reg.index()] = value;
    }

    pub const fn output_enable_lo(&self) -> u8 {
        self.read(RegAddr::OutputEnableLo)
    }

    pub const fn output_enable_hi(&self) -> u8 {
        self.read(RegAddr::OutputEnableHi)
    }

    pub const fn pwm_enable_lo(&self) -> u8 {
        self.read(RegAddr::PwmEnableLo)
    }

    pub const fn pwm_enable_hi(&self) -> u8 {
        self.read(RegAddr::PwmEnableHi)
    }

    pub const fn pwm_duty_cycle(&self) -> u8 {
        self.read(RegAddr::PwmDutyCycle)
    }

    /// Values presented on the two output ports: `(uo_out, uio_out)`.
    pub const fn output_ports(&self) -> (u8, u8) {
        (self.output_enable_lo(), self.output_enable_hi())
    }

    /// Cell values in address order.
    pub const fn as_array(&self) -> [u8; REGISTER_COUNT] {
        self.cells
    }

    /// Iterate `(register, value)` pairs in address order.
    pub fn iter(&self) -> impl Iterator<Item = (RegAddr, u8)> + '_ {
        RegAddr::ALL.into_iter().map(move |reg| (reg, self.read(reg)))
    }

    pub fn is_zero(&self) -> bool {
        self.cells.iter().all(|&cell| cell == 0)
    }
}
