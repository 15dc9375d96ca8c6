//! Bus session scripts.
//!
//! A small line-oriented format describing what the controller does:
//!
//! ```text
//! ; reset, then configure the output enables
//! reset 5
//! idle 5
//! write 0x00 0xF0
//! write 0x01 0xCC
//! read 0x30 0xBE           ; ignored by the peripheral
//! bits 1000000000101010    ; raw bits, MSB first, any length
//! expect A 0xF0
//! ```
//!
//! - Numbers are decimal, `0x` hex or `0b` binary
//! - `;` and `#` start a comment
//! - Blank lines are ignored
//! - `expect` takes a register label (A-E) or its address (0-4)

use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::host::driver::{DriverError, DriverTiming, Stimulus, Transaction};
use crate::periph::registers::RegAddr;

/// Longest `reset` or `idle` hold a script may ask for.
pub const MAX_HOLD_TICKS: u32 = 10_000_000;

/// One script line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Hold reset for n ticks.
    Reset(usize),
    /// Leave the bus idle for n ticks.
    Idle(usize),
    /// A full 16-bit transaction.
    Transaction(Transaction),
    /// A raw bit sequence framed by nCS.
    Bits(Vec<bool>),
    /// The register must hold `value` at this point.
    Expect { reg: RegAddr, value: u8 },
}

/// A parsed script with source line numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub commands: Vec<(usize, Command)>,
}

/// An `expect` pinned to the tick where it must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Number of ticks that must have run before checking.
    pub step: usize,
    /// Script line of the `expect`.
    pub line: usize,
    pub reg: RegAddr,
    pub value: u8,
}

impl Script {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Render to pin levels, recording where each expectation applies.
    pub fn render(&self, timing: DriverTiming) -> Result<(Stimulus, Vec<Checkpoint>), DriverError> {
        let mut stim = Stimulus::new(timing)?;
        let mut checkpoints = Vec::new();

        for (line, command) in &self.commands {
            match command {
                Command::Reset(ticks) => {
                    stim.reset(*ticks);
                }
                Command::Idle(ticks) => {
                    stim.idle(*ticks);
                }
                Command::Transaction(txn) => {
                    stim.transaction(txn);
                }
                Command::Bits(bits) => {
                    stim.bits(bits);
                }
                Command::Expect { reg, value } => checkpoints.push(Checkpoint {
                    step: stim.len(),
                    line: *line,
                    reg: *reg,
                    value: *value,
                }),
            }
        }

        Ok((stim, checkpoints))
    }
}

/// Parse script source.
pub fn parse_script(source: &str) -> Result<Script, ScriptError> {
    let mut script = Script::default();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = raw
            .split(|c: char| c == ';' || c == '#')
            .next()
            .unwrap_or("")
            .trim();
        if text.is_empty() {
            continue;
        }

        let command = parse_line(text).map_err(|message| ScriptError::Parse { line, message })?;
        script.commands.push((line, command));
    }

    Ok(script)
}

/// Load and parse a script file.
pub fn load_script<P: AsRef<Path>>(path: P) -> Result<Script, ScriptError> {
    let source = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ScriptError::Io(e.to_string()))?;
    parse_script(&source)
}

fn parse_line(text: &str) -> Result<Command, String> {
    let mut parts = text.split_whitespace();
    let keyword = parts.next().unwrap_or("").to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    let expect_args = |n: usize| -> Result<(), String> {
        if args.len() != n {
            return Err(format!("'{}' takes {} argument(s), found {}", keyword, n, args.len()));
        }
        Ok(())
    };

    match keyword.as_str() {
        "reset" | "idle" => {
            expect_args(1)?;
            let ticks = parse_number(args[0])?;
            if ticks > MAX_HOLD_TICKS {
                return Err(format!("'{}' of {} ticks exceeds the limit of {}", keyword, ticks, MAX_HOLD_TICKS));
            }
            let ticks = ticks as usize;
            Ok(if keyword == "reset" { Command::Reset(ticks) } else { Command::Idle(ticks) })
        }
        "write" | "read" => {
            expect_args(2)?;
            let address = parse_byte(args[0])?;
            let data = parse_byte(args[1])?;
            Transaction::new(keyword == "write", address, data)
                .map(Command::Transaction)
                .map_err(|e| e.to_string())
        }
        "bits" => {
            if args.is_empty() {
                return Err("'bits' needs at least one bit".to_string());
            }
            let mut bits = Vec::new();
            for c in args.concat().chars() {
                match c {
                    '0' => bits.push(false),
                    '1' => bits.push(true),
                    '_' => {}
                    other => return Err(format!("invalid bit '{}'", other)),
                }
            }
            Ok(Command::Bits(bits))
        }
        "expect" => {
            expect_args(2)?;
            let reg = parse_register(args[0])?;
            let value = parse_byte(args[1])?;
            Ok(Command::Expect { reg, value })
        }
        other => Err(format!("unknown command '{}'", other)),
    }
}

fn parse_number(text: &str) -> Result<u32, String> {
    let lower = text.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u32::from_str_radix(&bin.replace('_', ""), 2)
    } else {
        lower.parse()
    };
    parsed.map_err(|_| format!("invalid number '{}'", text))
}

fn parse_byte(text: &str) -> Result<u8, String> {
    let value = parse_number(text)?;
    u8::try_from(value).map_err(|_| format!("value {} does not fit in a byte", value))
}

fn parse_register(text: &str) -> Result<RegAddr, String> {
    let mut chars = text.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(reg) = RegAddr::from_label(c) {
            return Ok(reg);
        }
    }
    let address = parse_byte(text)?;
    RegAddr::try_from(address).map_err(|e| e.to_string())
}

/// Errors that can occur while loading a script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}
