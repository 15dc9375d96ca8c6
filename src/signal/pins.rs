//! Raw pin levels driven into the peripheral for one step.

use serde::{Serialize, Deserialize};

/// Bit position of SCLK on the dedicated input port.
pub const PORT_SCLK: u8 = 0;
/// Bit position of COPI on the dedicated input port.
pub const PORT_COPI: u8 = 1;
/// Bit position of nCS on the dedicated input port.
pub const PORT_NCS: u8 = 2;

/// Raw, unsynchronized input levels for a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinInputs {
    /// Serial data line (COPI).
    pub data: bool,
    /// Chip-select level; the line is active low, so `false` selects.
    pub select: bool,
    /// Serial clock (SCLK).
    pub clock: bool,
    /// Global reset asserted.
    pub reset: bool,
}

impl PinInputs {
    /// Bus idle: chip-select deasserted (high), clock and data low.
    pub const IDLE: PinInputs = PinInputs {
        data: false,
        select: true,
        clock: false,
        reset: false,
    };

    /// Idle bus with reset held.
    pub const RESET: PinInputs = PinInputs {
        data: false,
        select: true,
        clock: false,
        reset: true,
    };

    /// Levels for an active (selected) bus.
    pub const fn selected(data: bool, clock: bool) -> Self {
        Self { data, select: false, clock, reset: false }
    }

    /// Decode the dedicated 8-bit input port and the active-low reset pin.
    ///
    /// Only bits 0..=2 are wired; the rest are ignored.
    pub const fn from_port(ui_in: u8, rst_n: bool) -> Self {
        Self {
            data: ui_in & (1 << PORT_COPI) != 0,
            select: ui_in & (1 << PORT_NCS) != 0,
            clock: ui_in & (1 << PORT_SCLK) != 0,
            reset: !rst_n,
        }
    }

    /// Encode the three serial lines back into port bits.
    pub const fn to_port(self) -> u8 {
        ((self.select as u8) << PORT_NCS)
            | ((self.data as u8) << PORT_COPI)
            | ((self.clock as u8) << PORT_SCLK)
    }
}

impl Default for PinInputs {
    fn default() -> Self {
        Self::IDLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_decoding() {
        let pins = PinInputs::from_port(0b0000_0101, true);
        assert!(pins.clock);
        assert!(!pins.data);
        assert!(pins.select);
        assert!(!pins.reset);

        let pins = PinInputs::from_port(0b1111_1010, false);
        assert!(!pins.clock);
        assert!(pins.data);
        assert!(!pins.select);
        assert!(pins.reset);
    }

    #[test]
    fn test_port_ignores_upper_bits() {
        let pins = PinInputs::from_port(0b1111_1011, true);
        assert_eq!(pins.to_port(), 0b011);
        assert_eq!(PinInputs::IDLE.to_port(), 0b100);
    }
}
