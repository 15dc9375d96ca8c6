//! Debugger application state and logic.

use std::collections::VecDeque;

use crate::host::Session;
use crate::periph::{DecodeEvent, SpiPeripheral};
use crate::signal::PinInputs;

/// Events kept in the log panel.
const LOG_CAPACITY: usize = 200;

/// Ticks executed per frame while running.
const TICKS_PER_FRAME: usize = 500;

/// Debugger application state.
pub struct DebuggerApp {
    /// The peripheral being debugged.
    pub periph: SpiPeripheral,
    /// Rendered script driving the pins.
    pub session: Session,
    /// Index of the next tick to apply.
    pub pos: usize,
    /// Recent events, newest last, with the tick they happened on.
    pub log: VecDeque<(u64, DecodeEvent)>,
    /// Stop running when a register is written.
    pub break_on_write: bool,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
}

impl DebuggerApp {
    pub fn new(session: Session) -> Self {
        Self {
            periph: SpiPeripheral::new(),
            session,
            pos: 0,
            log: VecDeque::new(),
            break_on_write: true,
            running: false,
            should_quit: false,
            status: "Ready. 's' step, 'n' next event, 'r' run, 'q' quit.".into(),
        }
    }

    /// Pins for the next tick, if any remain.
    pub fn next_pins(&self) -> Option<PinInputs> {
        self.session.steps().get(self.pos).copied()
    }

    pub fn finished(&self) -> bool {
        self.pos >= self.session.steps().len()
    }

    /// Apply one tick. Returns the event it produced.
    pub fn step(&mut self) -> Option<DecodeEvent> {
        let Some(pins) = self.next_pins() else {
            self.running = false;
            self.status = format!("End of script after {} ticks", self.periph.cycles());
            return None;
        };

        self.periph.step(pins);
        self.pos += 1;

        let event = self.periph.last_event();
        if let Some(event) = event {
            if self.log.len() == LOG_CAPACITY {
                self.log.pop_front();
            }
            self.log.push_back((self.periph.cycles(), event));
            self.status = format!("tick {}: {}", self.periph.cycles(), event);
        }
        self.check_expectations();
        event
    }

    /// Step until the decoder reports something.
    pub fn next_event(&mut self) {
        self.running = false;
        while !self.finished() {
            if self.step().is_some() {
                return;
            }
        }
    }

    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// One frame's worth of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        for _ in 0..TICKS_PER_FRAME {
            if self.finished() {
                self.step();
                return;
            }
            if let Some(DecodeEvent::Dispatched(w)) = self.step() {
                if self.break_on_write {
                    self.running = false;
                    self.status = format!("Break: {} <- 0x{:02X}", w.reg, w.value);
                    return;
                }
            }
        }
    }

    pub fn toggle_break_on_write(&mut self) {
        self.break_on_write = !self.break_on_write;
        self.status = format!(
            "Break on register write {}",
            if self.break_on_write { "on" } else { "off" }
        );
    }

    /// Start the script over on a fresh peripheral.
    pub fn reset(&mut self) {
        self.periph = SpiPeripheral::new();
        self.pos = 0;
        self.log.clear();
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    fn check_expectations(&mut self) {
        for cp in self.session.checkpoints().iter().filter(|cp| cp.step == self.pos) {
            let actual = self.periph.registers().read(cp.reg);
            if actual != cp.value {
                self.running = false;
                self.status = format!(
                    "line {}: expected {} = 0x{:02X}, got 0x{:02X}",
                    cp.line,
                    cp.reg.label(),
                    cp.value,
                    actual
                );
            }
        }
    }
}

/// Run the debugger on a rendered session.
pub fn run_debugger(session: Session) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(session);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(30))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('n') => app.next_event(),
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_break_on_write(),
                        KeyCode::Char('x') => app.reset(),
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{parse_script, DriverTiming};

    fn app(source: &str) -> DebuggerApp {
        let script = parse_script(source).unwrap();
        DebuggerApp::new(Session::new(&script, DriverTiming::FAST).unwrap())
    }

    #[test]
    fn test_run_breaks_on_write() {
        let mut app = app("idle 2\nwrite 0x00 0x01\nwrite 0x01 0x02\n");
        app.run();
        app.tick();

        assert!(!app.running);
        assert_eq!(app.periph.registers().as_array(), [0x01, 0, 0, 0, 0]);
        assert!(app.status.starts_with("Break"));
    }

    #[test]
    fn test_next_event_and_reset() {
        let mut app = app("idle 2\nwrite 0x00 0x01\n");
        app.next_event();
        assert_eq!(app.log.back().map(|(_, e)| *e), Some(DecodeEvent::TransactionStarted));

        app.reset();
        assert_eq!(app.pos, 0);
        assert!(app.log.is_empty());
        assert_eq!(app.periph.cycles(), 0);
    }

    #[test]
    fn test_step_past_end() {
        let mut app = app("idle 1\n");
        assert!(app.step().is_none());
        assert!(app.finished());
        assert!(app.step().is_none());
        assert!(app.status.starts_with("End of script"));
    }
}
