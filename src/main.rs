//! SPI peripheral emulator - CLI entry point
//!
//! Commands:
//! - `spi-periph run <script>` - Run a bus script and report the registers
//! - `spi-periph send --addr A --data D` - Drive one transaction from reset
//! - `spi-periph debug <script>` - Interactive tick-level debugger
//! - `spi-periph test` - Built-in self-test

use clap::{Args, Parser, Subcommand};
use spi_periph::host::{DriverError, DriverTiming};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spi-periph")]
#[command(version = "0.1.0")]
#[command(about = "A tick-accurate emulator of an SPI register-write peripheral")]
struct Cli {
    /// Log decoder activity (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a bus script to completion
    Run {
        /// Path to the script file
        script: String,
        /// Print every decoder event with its tick
        #[arg(short, long)]
        trace: bool,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        timing: TimingArgs,
    },
    /// Send a single transaction to a freshly reset peripheral
    Send {
        /// 7-bit register address
        #[arg(short, long, value_parser = parse_byte)]
        addr: u8,
        /// Data byte
        #[arg(short, long, value_parser = parse_byte)]
        data: u8,
        /// Clear the write flag (the peripheral ignores such frames)
        #[arg(long)]
        read: bool,
        #[command(flatten)]
        timing: TimingArgs,
    },
    /// Step through a script in the interactive debugger
    Debug {
        /// Path to the script file
        script: String,
        #[command(flatten)]
        timing: TimingArgs,
    },
    /// Run the built-in self-test
    Test,
}

#[derive(Args)]
struct TimingArgs {
    /// JSON file with driver timing (half_period, select_setup, settle)
    #[arg(long)]
    timing: Option<String>,
    /// Ticks per SCLK half period
    #[arg(long)]
    half_period: Option<u32>,
    /// Idle ticks after each transaction
    #[arg(long)]
    settle: Option<u32>,
}

impl TimingArgs {
    fn resolve(&self) -> Result<DriverTiming, DriverError> {
        let mut timing = match &self.timing {
            Some(path) => DriverTiming::load(path)?,
            None => DriverTiming::default(),
        };
        if let Some(half_period) = self.half_period {
            timing.half_period = half_period;
        }
        if let Some(settle) = self.settle {
            timing.settle = settle;
        }
        timing.validate()?;
        Ok(timing)
    }
}

fn parse_byte(text: &str) -> Result<u8, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("'{}': {}", text, e))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Run { script, trace, json, timing }) => {
            run_script(&script, trace, json, resolve_timing(&timing));
        }
        Some(Commands::Send { addr, data, read, timing }) => {
            send_transaction(addr, data, read, resolve_timing(&timing));
        }
        Some(Commands::Debug { script, timing }) => {
            debug_script(&script, resolve_timing(&timing));
        }
        Some(Commands::Test) => {
            run_self_test();
        }
        None => {
            println!("SPI peripheral emulator v0.1.0");
            println!();
            println!("Use --help for available commands");
            println!();
            demo_transaction();
        }
    }
}

fn resolve_timing(args: &TimingArgs) -> DriverTiming {
    match args.resolve() {
        Ok(timing) => timing,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}

fn print_registers(regs: &spi_periph::Registers) {
    for (reg, value) in regs.iter() {
        println!("  {} 0x{:02X} = {:3}  {:08b}  {}", reg.label(), value, value, value, reg.name());
    }
}

fn run_script(path: &str, trace: bool, json: bool, timing: DriverTiming) {
    use spi_periph::{load_script, Session, SpiPeripheral};
    use spi_periph::periph::DecodeEvent;

    let script = match load_script(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to load script: {}", e);
            std::process::exit(1);
        }
    };

    let session = match Session::new(&script, timing) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    if !json {
        println!("🔧 Running: {} ({} commands, {} ticks)", path, script.len(), session.steps().len());
        println!();
    }

    let mut periph = SpiPeripheral::new();
    let report = session.run_with(&mut periph, |_, p| {
        if !trace {
            return;
        }
        match p.last_event() {
            Some(event @ DecodeEvent::BitSampled { .. }) => {
                println!("{:>8}:   {}  [{:?}]", p.cycles(), event, p.transaction());
            }
            Some(event) => println!("{:>8}: {}", p.cycles(), event),
            None => {}
        }
    });

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("❌ Failed to encode report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        println!("━━━ Result ━━━");
        println!("Ticks:  {}", report.steps);
        println!("Writes: {}", report.writes);
        print_registers(&report.registers);
        for failure in &report.failures {
            println!("✗ {}", failure);
        }
    }

    if !report.passed() {
        std::process::exit(1);
    }
}

fn send_transaction(addr: u8, data: u8, read: bool, timing: DriverTiming) {
    use spi_periph::{SpiPeripheral, Stimulus, Transaction};

    let txn = match Transaction::new(!read, addr, data) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let mut stim = match Stimulus::new(timing) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    stim.reset(5).idle(5).transaction(&txn);

    let mut periph = SpiPeripheral::new();
    let writes = periph.run(stim.as_slice());

    println!("📤 {}  ({:016b})", txn.frame(), txn.frame().raw());
    println!("Ticks: {}  Writes: {}", periph.cycles(), writes);
    print_registers(periph.registers());
}

fn debug_script(path: &str, timing: DriverTiming) {
    #[cfg(feature = "tui")]
    {
        use spi_periph::{load_script, run_debugger, Session};

        let session = match load_script(path)
            .map_err(spi_periph::host::SessionError::from)
            .and_then(|script| Session::new(&script, timing))
        {
            Ok(s) => s,
            Err(e) => {
                eprintln!("❌ {}", e);
                std::process::exit(1);
            }
        };

        if let Err(e) = run_debugger(session) {
            eprintln!("❌ Debugger error: {}", e);
            std::process::exit(1);
        }
    }

    #[cfg(not(feature = "tui"))]
    {
        let _ = (path, timing);
        eprintln!("❌ Built without the `tui` feature");
        std::process::exit(1);
    }
}

fn demo_transaction() {
    use spi_periph::{Frame, RegAddr, SpiPeripheral, Stimulus};

    println!("━━━ Frame Demo ━━━");
    println!();

    let frame = Frame::write(RegAddr::PwmDutyCycle, 0x80);
    println!("Frame {} on the wire (MSB first):", frame);
    let bits: String = frame.bits().map(|b| if b { '1' } else { '0' }).collect();
    println!("  {} {} {}", &bits[..1], &bits[1..8], &bits[8..]);
    println!("  W address data");
    println!();

    let mut stim = match Stimulus::new(DriverTiming::FAST) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    let bits: Vec<bool> = frame.bits().collect();
    stim.idle(2).bits(&bits);

    let mut periph = SpiPeripheral::new();
    for &pins in stim.as_slice() {
        periph.step(pins);
        if let Some(event) = periph.last_event() {
            println!("  tick {:3}: {}", periph.cycles(), event);
        }
    }
    println!();
    print_registers(periph.registers());
}

fn run_self_test() {
    use spi_periph::{Frame, RegAddr, SpiPeripheral, Stimulus, Transaction};

    println!("━━━ SPI Peripheral Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;

    let fresh = |build: &dyn Fn(&mut Stimulus)| -> Option<SpiPeripheral> {
        let mut stim = Stimulus::new(DriverTiming::FAST).ok()?;
        stim.reset(2).idle(2);
        build(&mut stim);
        let mut periph = SpiPeripheral::new();
        periph.run(stim.as_slice());
        Some(periph)
    };
    let write = |address: u8, data: u8| Transaction::write(address, data).ok();
    let read = |address: u8, data: u8| Transaction::read(address, data).ok();

    let mut report = |name: &str, ok: bool| {
        println!("{} {}", if ok { "✓" } else { "✗" }, name);
        if ok { passed += 1; } else { failed += 1; }
    };

    // Test 1: write to register A
    let ok = write(0x00, 0x2A)
        .and_then(|t| fresh(&|s: &mut Stimulus| { s.transaction(&t); }))
        .map_or(false, |p| p.registers().as_array() == [0x2A, 0, 0, 0, 0]);
    report("write 0x2A to A", ok);

    // Test 2: write to register E
    let ok = write(0x04, 0xFF)
        .and_then(|t| fresh(&|s: &mut Stimulus| { s.transaction(&t); }))
        .map_or(false, |p| p.registers().as_array() == [0, 0, 0, 0, 0xFF]);
    report("write 0xFF to E", ok);

    // Test 3: interrupted frame
    let bits: Vec<bool> = Frame::write(RegAddr::OutputEnableLo, 0x2A).bits().take(10).collect();
    let ok = fresh(&|s: &mut Stimulus| { s.bits(&bits); }).map_or(false, |p| p.registers().is_zero());
    report("10-bit frame is dropped", ok);

    // Test 4: read frame after a write
    let ok = match (write(0x02, 0x11), read(0x02, 0x22)) {
        (Some(w), Some(r)) => fresh(&|s: &mut Stimulus| { s.transaction(&w).transaction(&r); })
            .map_or(false, |p| p.registers().as_array() == [0, 0, 0x11, 0, 0]),
        _ => false,
    };
    report("read frame leaves C = 0x11", ok);

    // Test 5: unmapped address
    let ok = write(0x30, 0xAA)
        .and_then(|t| fresh(&|s: &mut Stimulus| { s.transaction(&t); }))
        .map_or(false, |p| p.registers().is_zero());
    report("unmapped address ignored", ok);

    // Test 6: reset clears registers
    let ok = write(0x01, 0xCC)
        .and_then(|t| fresh(&|s: &mut Stimulus| { s.transaction(&t).reset(1); }))
        .map_or(false, |p| p.registers().is_zero() && p.transaction().bit_count() == 0);
    report("reset clears everything", ok);

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}
