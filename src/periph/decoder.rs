//! Serial command decoder.
//!
//! One call to [`SpiPeripheral::step`] is one tick of the peripheral's own
//! clock. Each tick samples the raw pins into the synchronizer, runs the
//! transaction framer and bit sampler on the synchronized histories, and
//! independently checks whether a completed write frame is closing on this
//! tick. All of it is computed from the state as it stood at the start of
//! the tick and committed together at the end.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::periph::frame::{Frame, FrameError, RegisterWrite, FRAME_BITS};
use crate::periph::registers::Registers;
use crate::signal::{PinInputs, Synchronizer};

/// Framer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Between transactions.
    #[default]
    Idle,
    /// Chip-select asserted; bits are being collected.
    Active,
}

/// Bit counter and shift buffer for the frame in flight.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionState {
    bit_count: u8,
    shift: u16,
}

impl TransactionState {
    pub const fn new() -> Self {
        Self { bit_count: 0, shift: 0 }
    }

    /// Bits collected so far (0-16).
    #[inline]
    pub const fn bit_count(self) -> u8 {
        self.bit_count
    }

    /// Raw shift buffer, most recent bit in bit 0.
    #[inline]
    pub const fn shift_buffer(self) -> u16 {
        self.shift
    }

    pub const fn is_full(self) -> bool {
        self.bit_count >= FRAME_BITS
    }

    /// Shift one bit in, or `None` once the frame is full.
    pub const fn shifted(self, bit: bool) -> Option<Self> {
        if self.is_full() {
            return None;
        }
        Some(Self {
            bit_count: self.bit_count + 1,
            shift: (self.shift << 1) | bit as u16,
        })
    }

    /// The assembled frame, once exactly 16 bits are in.
    pub const fn frame(self) -> Option<Frame> {
        if self.bit_count == FRAME_BITS {
            Some(Frame::from_raw(self.shift))
        } else {
            None
        }
    }
}

impl std::fmt::Debug for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:2} bits {:016b}", self.bit_count, self.shift)
    }
}

/// Everything the peripheral remembers between ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecoderState {
    pub sync: Synchronizer,
    pub phase: Phase,
    pub txn: TransactionState,
    pub regs: Registers,
}

impl DecoderState {
    /// The all-zero state reset forces.
    pub const fn new() -> Self {
        Self {
            sync: Synchronizer::new(),
            phase: Phase::Idle,
            txn: TransactionState::new(),
            regs: Registers::new(),
        }
    }
}

/// Why a closing chip-select edge did not produce a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Rejection {
    #[error("short frame: {bits} of 16 bits")]
    ShortFrame { bits: u8 },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// The notable thing that happened on a tick, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeEvent {
    /// Reset was asserted on this tick.
    Reset,
    /// Chip-select fell and the frame buffer was cleared.
    TransactionStarted,
    /// A bit was shifted into the frame.
    BitSampled { bit: bool, count: u8 },
    /// Chip-select rose on a complete write frame.
    Dispatched(RegisterWrite),
    /// Chip-select rose and the frame was dropped.
    Rejected(Rejection),
}

impl std::fmt::Display for DecodeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeEvent::Reset => write!(f, "reset"),
            DecodeEvent::TransactionStarted => write!(f, "select"),
            DecodeEvent::BitSampled { bit, count } => write!(f, "bit {:2} = {}", count, *bit as u8),
            DecodeEvent::Dispatched(w) => write!(f, "write {} <- 0x{:02X}", w.reg, w.value),
            DecodeEvent::Rejected(r) => write!(f, "rejected: {}", r),
        }
    }
}

/// Compute the next state from `old` and this tick's raw pins.
///
/// Pure: nothing here reads anything but `old` and `pins`.
pub fn transition(old: &DecoderState, pins: PinInputs) -> (DecoderState, Option<DecodeEvent>) {
    if pins.reset {
        return (DecoderState::new(), Some(DecodeEvent::Reset));
    }

    let mut next = *old;
    let mut event = None;

    next.sync = old.sync.sampled(pins.data, pins.select, pins.clock);

    // Framer and sampler. A falling select edge wins over a clock edge.
    if old.sync.select.is_falling() {
        next.phase = Phase::Active;
        next.txn = TransactionState::new();
        event = Some(DecodeEvent::TransactionStarted);
    } else if old.phase == Phase::Active {
        if old.sync.select.is_rising() {
            next.phase = Phase::Idle;
        }
        if old.sync.clock.is_rising() {
            let bit = old.sync.data.previous();
            if let Some(txn) = old.txn.shifted(bit) {
                next.txn = txn;
                event = Some(DecodeEvent::BitSampled { bit, count: txn.bit_count() });
            }
        }
    }

    // Dispatch. Evaluated on every tick, not only inside the framer branch.
    if old.sync.select.is_rising() {
        let outcome = old
            .txn
            .frame()
            .ok_or(Rejection::ShortFrame { bits: old.txn.bit_count() })
            .and_then(|frame| frame.decode().map_err(Rejection::from));

        match outcome {
            Ok(w) => {
                next.regs.write(w.reg, w.value);
                event = Some(DecodeEvent::Dispatched(w));
            }
            Err(rejection) if old.phase == Phase::Active => {
                event = Some(DecodeEvent::Rejected(rejection));
            }
            Err(_) => {}
        }
    }

    (next, event)
}

/// The SPI register peripheral.
#[derive(Clone, Serialize, Deserialize)]
pub struct SpiPeripheral {
    state: DecoderState,
    /// Ticks evaluated since construction or the last [`reset`](Self::reset).
    cycles: u64,
    /// Register writes dispatched since construction or the last reset.
    writes: u64,
    last_event: Option<DecodeEvent>,
}

impl SpiPeripheral {
    /// Create a peripheral in its reset state.
    pub fn new() -> Self {
        Self {
            state: DecoderState::new(),
            cycles: 0,
            writes: 0,
            last_event: None,
        }
    }

    /// Force every state element to zero.
    pub fn reset(&mut self) {
        self.state = DecoderState::new();
        self.cycles = 0;
        self.writes = 0;
        self.last_event = Some(DecodeEvent::Reset);
    }

    /// The state one tick from now, without committing it.
    pub fn next_state(&self, pins: PinInputs) -> DecoderState {
        transition(&self.state, pins).0
    }

    /// Advance one tick.
    pub fn step(&mut self, pins: PinInputs) {
        let (next, event) = transition(&self.state, pins);
        self.state = next;
        self.cycles += 1;
        self.last_event = event;

        match event {
            Some(DecodeEvent::BitSampled { bit, count }) => {
                trace!(cycle = self.cycles, bit, count, "bit sampled");
            }
            Some(DecodeEvent::Dispatched(w)) => {
                self.writes += 1;
                debug!(cycle = self.cycles, register = %w.reg, value = w.value, "register written");
            }
            Some(DecodeEvent::Rejected(r)) => {
                debug!(cycle = self.cycles, reason = %r, "frame rejected");
            }
            Some(DecodeEvent::TransactionStarted) => {
                trace!(cycle = self.cycles, "transaction started");
            }
            _ => {}
        }
    }

    /// Step through a whole stimulus.
    ///
    /// Returns the number of register writes dispatched along the way.
    pub fn run(&mut self, stimulus: &[PinInputs]) -> u64 {
        let start = self.writes;
        for &pins in stimulus {
            self.step(pins);
        }
        self.writes - start
    }

    pub fn registers(&self) -> &Registers {
        &self.state.regs
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    pub fn sync(&self) -> &Synchronizer {
        &self.state.sync
    }

    pub fn transaction(&self) -> TransactionState {
        self.state.txn
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// What happened on the most recent tick.
    pub fn last_event(&self) -> Option<DecodeEvent> {
        self.last_event
    }
}

impl Default for SpiPeripheral {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpiPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpiPeripheral")
            .field("phase", &self.state.phase)
            .field("cycles", &self.cycles)
            .field("txn", &self.state.txn)
            .field("regs", &self.state.regs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::periph::registers::{RegAddr, UnmappedAddress};
    use proptest::prelude::*;

    const IDLE: PinInputs = PinInputs::IDLE;

    fn frame_bits(write: bool, address: u8, data: u8) -> Vec<bool> {
        Frame::new(write, address, data).bits().collect()
    }

    fn idle(p: &mut SpiPeripheral, steps: usize) {
        for _ in 0..steps {
            p.step(IDLE);
        }
    }

    /// Select, clock `bits` out with a two-tick half period, deselect.
    fn send_bits(p: &mut SpiPeripheral, bits: &[bool]) {
        idle(p, 3);
        p.step(PinInputs::selected(false, false));
        p.step(PinInputs::selected(false, false));
        for &bit in bits {
            p.step(PinInputs::selected(bit, false));
            p.step(PinInputs::selected(bit, false));
            p.step(PinInputs::selected(bit, true));
            p.step(PinInputs::selected(bit, true));
        }
        idle(p, 4);
    }

    fn send(p: &mut SpiPeripheral, write: bool, address: u8, data: u8) {
        send_bits(p, &frame_bits(write, address, data));
    }

    #[test]
    fn test_write_register_a() {
        let mut p = SpiPeripheral::new();
        p.reset();
        send_bits(&mut p, &[
            true, false, false, false, false, false, false, false,
            false, false, true, false, true, false, true, false,
        ]);

        assert_eq!(p.registers().as_array(), [0x2A, 0, 0, 0, 0]);
        assert_eq!(p.writes(), 1);
    }

    #[test]
    fn test_write_register_e() {
        let mut p = SpiPeripheral::new();
        send(&mut p, true, 0x04, 0xFF);

        assert_eq!(p.registers().pwm_duty_cycle(), 0xFF);
        assert_eq!(p.registers().as_array(), [0, 0, 0, 0, 0xFF]);
    }

    #[test]
    fn test_interrupted_transaction() {
        let mut p = SpiPeripheral::new();
        let bits = frame_bits(true, 0x00, 0x2A);
        send_bits(&mut p, &bits[..10]);

        assert!(p.registers().is_zero());
        assert_eq!(p.transaction().bit_count(), 10);
        assert_eq!(p.writes(), 0);
    }

    #[test]
    fn test_read_frame_does_not_overwrite() {
        let mut p = SpiPeripheral::new();
        send(&mut p, true, 0x02, 0x11);
        send(&mut p, false, 0x02, 0x22);

        assert_eq!(p.registers().pwm_enable_lo(), 0x11);
        assert_eq!(p.registers().as_array(), [0, 0, 0x11, 0, 0]);
    }

    #[test]
    fn test_unmapped_address_ignored() {
        let mut p = SpiPeripheral::new();
        send(&mut p, true, 0x30, 0xAA);
        assert!(p.registers().is_zero());
    }

    #[test]
    fn test_dispatch_fires_once_on_closing_edge() {
        let mut p = SpiPeripheral::new();
        idle(&mut p, 3);
        p.step(PinInputs::selected(false, false));
        p.step(PinInputs::selected(false, false));
        for bit in frame_bits(true, 0x01, 0xCC) {
            p.step(PinInputs::selected(bit, false));
            p.step(PinInputs::selected(bit, true));
        }
        p.step(PinInputs::selected(false, false));
        assert_eq!(p.transaction().bit_count(), 16);
        assert!(p.registers().is_zero());

        // Raw rise lands in the history this tick, is acted on the next.
        p.step(IDLE);
        assert!(p.registers().is_zero());
        p.step(IDLE);
        assert_eq!(p.registers().output_enable_hi(), 0xCC);
        assert_eq!(
            p.last_event(),
            Some(DecodeEvent::Dispatched(RegisterWrite { reg: RegAddr::OutputEnableHi, value: 0xCC }))
        );

        idle(&mut p, 10);
        assert_eq!(p.writes(), 1);
        assert_eq!(p.phase(), Phase::Idle);
    }

    #[test]
    fn test_sixteenth_edge_on_closing_edge_does_not_dispatch() {
        let mut p = SpiPeripheral::new();
        idle(&mut p, 3);
        p.step(PinInputs::selected(false, false));
        p.step(PinInputs::selected(false, false));
        let bits = frame_bits(true, 0x04, 0xFF);
        for &bit in &bits[..15] {
            p.step(PinInputs::selected(bit, false));
            p.step(PinInputs::selected(bit, true));
        }
        // Last SCLK rise and nCS rise land on the same raw tick.
        p.step(PinInputs::selected(bits[15], false));
        p.step(PinInputs { data: bits[15], select: true, clock: true, reset: false });
        p.step(IDLE);

        // The bit is still sampled, but dispatch saw only 15.
        assert_eq!(p.transaction().bit_count(), 16);
        assert_eq!(
            p.last_event(),
            Some(DecodeEvent::Rejected(Rejection::ShortFrame { bits: 15 }))
        );

        idle(&mut p, 6);
        assert!(p.registers().is_zero());
        assert_eq!(p.writes(), 0);
    }

    #[test]
    fn test_select_held_through_reset_release_is_ignored() {
        let mut p = SpiPeripheral::new();
        p.step(PinInputs { reset: true, ..PinInputs::selected(false, false) });
        p.step(PinInputs::selected(false, false));
        p.step(PinInputs::selected(false, false));
        for bit in frame_bits(true, 0x00, 0x2A) {
            p.step(PinInputs::selected(bit, false));
            p.step(PinInputs::selected(bit, true));
        }
        p.step(PinInputs::selected(false, false));

        assert_eq!(p.phase(), Phase::Idle);
        assert_eq!(p.transaction().bit_count(), 0);

        idle(&mut p, 4);
        assert!(p.registers().is_zero());
        assert_eq!(p.last_event(), None);
    }

    #[test]
    fn test_extra_clock_edges_saturate() {
        let mut p = SpiPeripheral::new();
        let mut bits = frame_bits(true, 0x03, 0x5A);
        bits.extend([true, true, true, true]);
        send_bits(&mut p, &bits);

        assert_eq!(p.transaction().bit_count(), 16);
        assert_eq!(p.transaction().shift_buffer(), 0x835A);
        assert_eq!(p.registers().pwm_enable_hi(), 0x5A);
    }

    #[test]
    fn test_restart_discards_partial_frame() {
        let mut p = SpiPeripheral::new();
        idle(&mut p, 3);
        p.step(PinInputs::selected(false, false));
        p.step(PinInputs::selected(false, false));
        for bit in frame_bits(true, 0x00, 0xFF).into_iter().take(7) {
            p.step(PinInputs::selected(bit, false));
            p.step(PinInputs::selected(bit, true));
        }
        // nCS high for a single tick closes the short frame; then start over.
        p.step(PinInputs::selected(false, false));
        p.step(IDLE);
        p.step(PinInputs::selected(false, false));
        p.step(PinInputs::selected(false, false));
        p.step(PinInputs::selected(false, false));
        assert_eq!(p.transaction().bit_count(), 0);
        assert_eq!(p.phase(), Phase::Active);

        for bit in frame_bits(true, 0x01, 0x42) {
            p.step(PinInputs::selected(bit, false));
            p.step(PinInputs::selected(bit, true));
        }
        p.step(PinInputs::selected(false, false));
        idle(&mut p, 4);

        assert_eq!(p.registers().as_array(), [0, 0x42, 0, 0, 0]);
    }

    #[test]
    fn test_falling_select_wins_over_clock_edge() {
        let mut p = SpiPeripheral::new();
        idle(&mut p, 3);
        // nCS and SCLK move on the same tick: both edges land together.
        p.step(PinInputs::selected(true, true));
        p.step(PinInputs::selected(true, true));
        assert_eq!(p.transaction().bit_count(), 0);
        assert_eq!(p.last_event(), Some(DecodeEvent::TransactionStarted));
    }

    #[test]
    fn test_clock_ignored_while_idle() {
        let mut p = SpiPeripheral::new();
        idle(&mut p, 3);
        for _ in 0..20 {
            p.step(PinInputs { clock: true, data: true, ..IDLE });
            p.step(IDLE);
        }
        assert_eq!(p.transaction().bit_count(), 0);
        assert_eq!(p.phase(), Phase::Idle);
    }

    #[test]
    fn test_rejection_reasons() {
        let mut p = SpiPeripheral::new();
        send(&mut p, true, 0x41, 0xEF);
        assert!(p.registers().is_zero());

        let mut p = SpiPeripheral::new();
        idle(&mut p, 3);
        p.step(PinInputs::selected(false, false));
        p.step(PinInputs::selected(false, false));
        for bit in frame_bits(true, 0x41, 0xEF) {
            p.step(PinInputs::selected(bit, false));
            p.step(PinInputs::selected(bit, true));
        }
        p.step(IDLE);
        p.step(IDLE);
        assert_eq!(
            p.last_event(),
            Some(DecodeEvent::Rejected(Rejection::Frame(FrameError::Unmapped(UnmappedAddress(0x41)))))
        );
    }

    #[test]
    fn test_reset_mid_transaction() {
        let mut p = SpiPeripheral::new();
        send(&mut p, true, 0x00, 0xF0);
        send(&mut p, true, 0x04, 0x80);
        assert_eq!(p.registers().as_array(), [0xF0, 0, 0, 0, 0x80]);

        p.step(PinInputs::selected(false, false));
        p.step(PinInputs::selected(false, false));
        for bit in frame_bits(true, 0x01, 0x99).into_iter().take(5) {
            p.step(PinInputs::selected(bit, false));
            p.step(PinInputs::selected(bit, true));
        }
        p.step(PinInputs { reset: true, ..PinInputs::selected(true, true) });

        assert_eq!(*p.state(), DecoderState::new());
        assert_eq!(p.last_event(), Some(DecodeEvent::Reset));
    }

    #[test]
    fn test_reset_overrides_while_held() {
        let mut p = SpiPeripheral::new();
        for i in 0..40 {
            let pins = PinInputs { reset: true, ..PinInputs::selected(i % 2 == 0, i % 3 == 0) };
            p.step(pins);
            assert_eq!(*p.state(), DecoderState::new());
        }
    }

    #[test]
    fn test_next_state_does_not_commit() {
        let mut p = SpiPeripheral::new();
        idle(&mut p, 2);
        let before = *p.state();
        let preview = p.next_state(PinInputs::selected(true, true));
        assert_eq!(*p.state(), before);
        assert_ne!(preview.sync, before.sync);
    }

    #[test]
    fn test_run_counts_writes() {
        let mut p = SpiPeripheral::new();
        let mut stimulus = vec![IDLE; 3];
        for (address, data) in [(0x00u8, 0x01u8), (0x30, 0x02), (0x02, 0x03)] {
            stimulus.push(PinInputs::selected(false, false));
            for bit in frame_bits(true, address, data) {
                stimulus.push(PinInputs::selected(bit, false));
                stimulus.push(PinInputs::selected(bit, true));
            }
            stimulus.push(PinInputs::selected(false, false));
            stimulus.extend([IDLE; 4]);
        }

        assert_eq!(p.run(&stimulus), 2);
        assert_eq!(p.registers().as_array(), [0x01, 0, 0x03, 0, 0]);
        assert_eq!(p.cycles(), stimulus.len() as u64);
    }

    proptest! {
        #[test]
        fn prop_mapped_write_sets_only_target(address in 0u8..5, data: u8, seed: [u8; 5]) {
            let mut p = SpiPeripheral::new();
            for (i, value) in seed.iter().enumerate() {
                send(&mut p, true, i as u8, *value);
            }
            let before = p.registers().as_array();

            send(&mut p, true, address, data);

            let after = p.registers().as_array();
            for i in 0..5 {
                if i == address as usize {
                    prop_assert_eq!(after[i], data);
                } else {
                    prop_assert_eq!(after[i], before[i]);
                }
            }
        }

        #[test]
        fn prop_unmapped_or_read_frames_change_nothing(
            write: bool,
            address in 0u8..0x80,
            data: u8,
        ) {
            prop_assume!(!write || address > 4);
            let mut p = SpiPeripheral::new();
            send(&mut p, true, 0x01, 0x5A);
            let before = *p.registers();

            send(&mut p, write, address, data);

            prop_assert_eq!(*p.registers(), before);
        }

        #[test]
        fn prop_short_frames_change_nothing(bits in proptest::collection::vec(any::<bool>(), 0..16)) {
            let mut p = SpiPeripheral::new();
            send_bits(&mut p, &bits);
            prop_assert!(p.registers().is_zero());
            prop_assert!(p.transaction().bit_count() <= 16);
        }

        #[test]
        fn prop_repeated_write_is_idempotent(address in 0u8..0x80, data: u8) {
            let mut once = SpiPeripheral::new();
            send(&mut once, true, address, data);

            let mut twice = SpiPeripheral::new();
            send(&mut twice, true, address, data);
            send(&mut twice, true, address, data);

            prop_assert_eq!(once.registers(), twice.registers());
        }

        #[test]
        fn prop_reset_clears_everything(
            stimulus in proptest::collection::vec((any::<bool>(), any::<bool>(), any::<bool>()), 0..200),
        ) {
            let mut p = SpiPeripheral::new();
            send(&mut p, true, 0x04, 0xCF);
            for (data, select, clock) in stimulus {
                p.step(PinInputs { data, select, clock, reset: false });
                prop_assert!(p.transaction().bit_count() <= 16);
            }
            p.step(PinInputs::RESET);
            prop_assert_eq!(*p.state(), DecoderState::new());
        }
    }
}
