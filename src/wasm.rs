//! WebAssembly bindings for the SPI peripheral emulator.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.

use wasm_bindgen::prelude::*;
use crate::host::{parse_script, DriverTiming, Session};
use crate::periph::{RegAddr, SpiPeripheral};
use crate::signal::PinInputs;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly peripheral wrapper.
#[wasm_bindgen]
pub struct WasmPeripheral {
    periph: SpiPeripheral,
    steps: Vec<PinInputs>,
    pos: usize,
}

#[wasm_bindgen]
impl WasmPeripheral {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            periph: SpiPeripheral::new(),
            steps: Vec::new(),
            pos: 0,
        }
    }

    /// Load a bus script. Returns the number of ticks it renders to.
    #[wasm_bindgen]
    pub fn load_script(&mut self, source: &str, half_period: u32) -> Result<usize, JsError> {
        let script = parse_script(source)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        let timing = DriverTiming { half_period, ..DriverTiming::default() };
        let session = Session::new(&script, timing)
            .map_err(|e| JsError::new(&format!("{}", e)))?;

        self.steps = session.steps().to_vec();
        self.pos = 0;
        self.periph = SpiPeripheral::new();
        Ok(self.steps.len())
    }

    /// Apply the next scripted tick. Returns the decoder event, if any.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<Option<String>, JsError> {
        let pins = self.steps.get(self.pos).copied()
            .ok_or_else(|| JsError::new("end of script"))?;
        self.periph.step(pins);
        self.pos += 1;
        Ok(self.periph.last_event().map(|e| e.to_string()))
    }

    /// Drive raw port bits for one tick (bit 0 SCLK, bit 1 COPI, bit 2 nCS).
    #[wasm_bindgen]
    pub fn step_port(&mut self, ui_in: u8, rst_n: bool) {
        self.periph.step(PinInputs::from_port(ui_in, rst_n));
    }

    /// Run up to `max_ticks` scripted ticks. Returns register writes made.
    #[wasm_bindgen]
    pub fn run(&mut self, max_ticks: u32) -> u64 {
        let end = (self.pos + max_ticks as usize).min(self.steps.len());
        let writes = self.periph.run(&self.steps[self.pos..end]);
        self.pos = end;
        writes
    }

    /// Start the script over on a fresh peripheral.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.periph = SpiPeripheral::new();
        self.pos = 0;
    }

    #[wasm_bindgen]
    pub fn finished(&self) -> bool {
        self.pos >= self.steps.len()
    }

    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.periph.cycles()
    }

    /// Register value by address (0-4); unmapped addresses read 0.
    #[wasm_bindgen]
    pub fn register(&self, address: u8) -> u8 {
        RegAddr::try_from(address)
            .map(|reg| self.periph.registers().read(reg))
            .unwrap_or(0)
    }

    /// All five registers in address order.
    #[wasm_bindgen]
    pub fn registers(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(&self.periph.registers().as_array()[..])
    }

    /// `uo_out` port value.
    #[wasm_bindgen]
    pub fn uo_out(&self) -> u8 {
        self.periph.registers().output_ports().0
    }

    /// `uio_out` port value.
    #[wasm_bindgen]
    pub fn uio_out(&self) -> u8 {
        self.periph.registers().output_ports().1
    }

    /// Full decoder state as JSON.
    #[wasm_bindgen]
    pub fn state_json(&self) -> Result<String, JsError> {
        serde_json::to_string(self.periph.state())
            .map_err(|e| JsError::new(&format!("{}", e)))
    }
}

impl Default for WasmPeripheral {
    fn default() -> Self {
        Self::new()
    }
}
