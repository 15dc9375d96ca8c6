//! Running scripts against a peripheral.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::host::driver::{DriverError, DriverTiming};
use crate::host::script::{Checkpoint, Script, ScriptError};
use crate::periph::{RegAddr, Registers, SpiPeripheral};
use crate::signal::PinInputs;

/// An `expect` line that did not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationFailed {
    pub line: usize,
    pub reg: RegAddr,
    pub expected: u8,
    pub actual: u8,
}

impl std::fmt::Display for ExpectationFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: expected {} = 0x{:02X}, got 0x{:02X}",
            self.line, self.reg, self.expected, self.actual
        )
    }
}

/// Outcome of a script run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub steps: u64,
    pub writes: u64,
    pub registers: Registers,
    pub failures: Vec<ExpectationFailed>,
}

impl SessionReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A rendered script ready to be stepped.
#[derive(Debug, Clone)]
pub struct Session {
    steps: Vec<PinInputs>,
    checkpoints: Vec<Checkpoint>,
}

impl Session {
    pub fn new(script: &Script, timing: DriverTiming) -> Result<Self, SessionError> {
        let (stimulus, checkpoints) = script.render(timing)?;
        Ok(Self {
            steps: stimulus.into_steps(),
            checkpoints,
        })
    }

    pub fn steps(&self) -> &[PinInputs] {
        &self.steps
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Run the whole session.
    pub fn run(&self, periph: &mut SpiPeripheral) -> SessionReport {
        self.run_with(periph, |_, _| {})
    }

    /// Run the whole session, calling `observe` after every tick.
    pub fn run_with<F>(&self, periph: &mut SpiPeripheral, mut observe: F) -> SessionReport
    where
        F: FnMut(usize, &SpiPeripheral),
    {
        let start_cycles = periph.cycles();
        let start_writes = periph.writes();
        let mut failures = Vec::new();
        let mut pending = self.checkpoints.iter().peekable();

        for (index, &pins) in self.steps.iter().enumerate() {
            // Expectations placed before any activity check the initial state.
            while let Some(cp) = pending.next_if(|cp| cp.step == index) {
                check(periph, cp, &mut failures);
            }
            periph.step(pins);
            observe(index, periph);
        }
        for cp in pending {
            check(periph, cp, &mut failures);
        }

        let report = SessionReport {
            steps: periph.cycles() - start_cycles,
            writes: periph.writes() - start_writes,
            registers: *periph.registers(),
            failures,
        };
        info!(
            steps = report.steps,
            writes = report.writes,
            failures = report.failures.len(),
            "session finished"
        );
        report
    }
}

fn check(periph: &SpiPeripheral, cp: &Checkpoint, failures: &mut Vec<ExpectationFailed>) {
    let actual = periph.registers().read(cp.reg);
    if actual != cp.value {
        let failure = ExpectationFailed {
            line: cp.line,
            reg: cp.reg,
            expected: cp.value,
            actual,
        };
        warn!(%failure, "expectation failed");
        failures.push(failure);
    }
}

/// Load, render and run a script file on a fresh peripheral.
pub fn run_script_file<P: AsRef<std::path::Path>>(
    path: P,
    timing: DriverTiming,
) -> Result<(SpiPeripheral, SessionReport), SessionError> {
    let script = crate::host::script::load_script(path)?;
    let session = Session::new(&script, timing)?;
    let mut periph = SpiPeripheral::new();
    let report = session.run(&mut periph);
    Ok((periph, report))
}

/// Errors that can occur while preparing a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::script::parse_script;

    const BENCH: &str = "\
        reset 5\n\
        idle 5\n\
        write 0x00 0xF0\n\
        expect A 0xF0\n\
        write 0x01 0xCC\n\
        expect B 0xCC\n\
        write 0x30 0xAA\n\
        read 0x30 0xBE\n\
        expect A 0xF0\n\
        read 0x41 0xEF\n\
        write 0x02 0xFF\n\
        write 0x04 0xCF\n\
        expect E 0xCF\n\
        write 0x04 0x00\n\
        expect E 0x00\n\
        expect C 0xFF\n";

    #[test]
    fn test_bench_script_passes() {
        let script = parse_script(BENCH).unwrap();
        let session = Session::new(&script, DriverTiming::default()).unwrap();
        let mut periph = SpiPeripheral::new();

        let report = session.run(&mut periph);

        assert!(report.passed(), "{:?}", report.failures);
        assert_eq!(report.writes, 5);
        assert_eq!(report.registers.as_array(), [0xF0, 0xCC, 0xFF, 0, 0]);
        assert_eq!(report.steps, session.steps().len() as u64);
    }

    #[test]
    fn test_bundled_script_passes_at_any_speed() {
        let script = parse_script(include_str!("../../scripts/bench.spi")).unwrap();
        for timing in [DriverTiming::FAST, DriverTiming::default()] {
            let session = Session::new(&script, timing).unwrap();
            let report = session.run(&mut SpiPeripheral::new());
            assert!(report.passed(), "{:?}", report.failures);
            assert!(report.registers.is_zero());
        }
    }

    #[test]
    fn test_failed_expectation_is_reported() {
        let script = parse_script("idle 2\nwrite 0x02 0x11\nread 0x02 0x22\nexpect C 0x22\n").unwrap();
        let session = Session::new(&script, DriverTiming::FAST).unwrap();
        let mut periph = SpiPeripheral::new();

        let report = session.run(&mut periph);

        assert_eq!(
            report.failures,
            vec![ExpectationFailed { line: 4, reg: RegAddr::PwmEnableLo, expected: 0x22, actual: 0x11 }]
        );
    }

    #[test]
    fn test_leading_expectation_checks_initial_state() {
        let script = parse_script("expect A 0x01\nidle 1\n").unwrap();
        let session = Session::new(&script, DriverTiming::FAST).unwrap();
        let report = session.run(&mut SpiPeripheral::new());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].actual, 0);
    }

    #[test]
    fn test_observer_sees_every_tick() {
        let script = parse_script("idle 2\nwrite 0x03 0x7E\n").unwrap();
        let session = Session::new(&script, DriverTiming::FAST).unwrap();
        let mut ticks = 0;
        session.run_with(&mut SpiPeripheral::new(), |i, _| {
            assert_eq!(i, ticks);
            ticks += 1;
        });
        assert_eq!(ticks, session.steps().len());
    }
}
