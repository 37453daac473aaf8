//! Simulator: owns target memory, the store buffer and the HTIF controller.
//!
//! The cycle-stepped hardware model lives outside this crate and is driven
//! through the [`CoreModel`] trait. One [`Simulator::step`] is one clock phase:
//! 1. **Clock/Reset:** Advance time, toggle the clock, hold reset for the first steps.
//! 2. **Fetch:** Every phase after reset delivers a fetch line at `icache_addr`.
//! 3. **Data Port:** On the phase that drives the clock high, commit retired stores,
//!    flush on recovery, then buffer the new store or forward the load.
//! 4. **Evaluate:** Let the model settle.
//! 5. **Host I/O:** Service HTIF and check the termination conditions.

use std::fmt;

use tracing::{info, trace, warn};

use crate::common::constants::{FAULT_SENTINEL, FETCH_BYTES, LOAD_BYTES};
use crate::common::data::{SizeClass, StoreRequest};
use crate::common::error::Result;
use crate::config::Config;
use crate::htif::Htif;
use crate::mem::{CommitOutcome, MemoryPort, SparseMemory, StoreBuffer};

/// Signals the model drives toward memory, sampled once per phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoreOutputs {
    /// Instruction fetch address.
    pub icache_addr: u32,
    /// The data access is a store.
    pub dcache_we: bool,
    /// Data access address.
    pub dcache_addr: u32,
    /// Store data.
    pub dcache_data: u64,
    /// Store size class (0..=3 for 1, 2, 4, 8 bytes).
    pub dcache_size: u8,
    /// One bit per store retired this cycle.
    pub store_retire: u8,
    /// Mispredict recovery: discard every pending store.
    pub recover: bool,
}

/// Signals the harness drives back into the model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoreInputs {
    /// Fetch line at `icache_addr`.
    pub fetch_data: [u8; FETCH_BYTES],
    /// `fetch_data` is valid.
    pub fetch_valid: bool,
    /// Load window at `dcache_addr`, with pending stores forwarded.
    pub load_data: [u8; LOAD_BYTES],
    /// `load_data` is valid.
    pub load_valid: bool,
}

/// Boundary to an external cycle-stepped hardware model.
pub trait CoreModel {
    /// Drives the clock input.
    fn set_clock(&mut self, high: bool);

    /// Drives the reset input.
    fn set_reset(&mut self, asserted: bool);

    /// Samples the model's memory-side outputs.
    fn outputs(&self) -> CoreOutputs;

    /// Drives the memory-side inputs.
    fn drive(&mut self, inputs: &CoreInputs);

    /// Evaluates the model for the current phase.
    fn eval(&mut self);

    /// Returns true once the model has finished on its own (e.g. `$finish`).
    fn finished(&self) -> bool {
        false
    }
}

/// Lifecycle of a simulation run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimState {
    /// Still stepping.
    Running,
    /// A non-zero store reached the halt address.
    Halted,
    /// The target exited through HTIF with this code.
    Exited(u64),
    /// The model finished on its own.
    Finished,
    /// The step budget ran out.
    Timeout,
}

impl fmt::Display for SimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Halted => write!(f, "halted"),
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Finished => write!(f, "finished"),
            Self::Timeout => write!(f, "timed out"),
        }
    }
}

/// Returns `N` bytes of the little-endian fault sentinel pattern.
fn sentinel<const N: usize>() -> [u8; N] {
    let pattern = FAULT_SENTINEL.to_le_bytes();
    std::array::from_fn(|i| pattern[i % pattern.len()])
}

/// Top-level simulation context.
#[derive(Debug)]
pub struct Simulator {
    memory: SparseMemory,
    store_buffer: StoreBuffer,
    htif: Htif,
    max_steps: u64,
    reset_cycles: u64,
    fetch_bytes: usize,
    time: u64,
    clock: bool,
    state: SimState,
    inputs: CoreInputs,
}

impl Simulator {
    /// Creates a simulator with empty memory and the given components.
    pub fn new(config: &Config, store_buffer: StoreBuffer, htif: Htif) -> Self {
        Self {
            memory: SparseMemory::new(),
            store_buffer,
            htif,
            max_steps: config.general.max_steps,
            reset_cycles: config.general.reset_cycles,
            fetch_bytes: config.memory.fetch_bytes.min(FETCH_BYTES),
            time: 0,
            clock: false,
            state: SimState::Running,
            inputs: CoreInputs::default(),
        }
    }

    /// Creates a simulator from `config` and loads the configured images.
    ///
    /// # Errors
    ///
    /// Any error from [`Simulator::load`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut sim = Self::new(
            config,
            StoreBuffer::from_config(&config.store_buffer),
            Htif::new(),
        );
        sim.load(config)?;
        Ok(sim)
    }

    /// Loads the raw memory image (if any), then the program and payloads.
    ///
    /// # Errors
    ///
    /// Image I/O and parse errors, missing HTIF symbols, and range errors.
    pub fn load(&mut self, config: &Config) -> Result<()> {
        if let Some(image) = &config.memory.image {
            let _ = self.memory.load_image(image, config.memory.image_base)?;
        }
        self.htif.load_program(&config.htif, &mut self.memory)
    }

    /// Target memory.
    pub const fn memory(&self) -> &SparseMemory {
        &self.memory
    }

    /// Mutable target memory.
    pub const fn memory_mut(&mut self) -> &mut SparseMemory {
        &mut self.memory
    }

    /// Pending stores.
    pub const fn store_buffer(&self) -> &StoreBuffer {
        &self.store_buffer
    }

    /// HTIF controller.
    pub const fn htif(&self) -> &Htif {
        &self.htif
    }

    /// Mutable HTIF controller, e.g. to register devices.
    pub const fn htif_mut(&mut self) -> &mut Htif {
        &mut self.htif
    }

    /// Steps taken so far.
    pub const fn time(&self) -> u64 {
        self.time
    }

    /// Current run state.
    pub const fn state(&self) -> SimState {
        self.state
    }

    fn fetch(&self, addr: u32) -> [u8; FETCH_BYTES] {
        let mut line = [0u8; FETCH_BYTES];
        match self.memory.read_bytes(addr, &mut line[..self.fetch_bytes]) {
            Ok(()) => line,
            Err(e) => {
                warn!("[{}] fetch at {addr:#010x} failed: {e}", self.time);
                sentinel()
            }
        }
    }

    fn load_window(&self, addr: u32) -> [u8; LOAD_BYTES] {
        match self.store_buffer.load(&self.memory, addr) {
            Ok(window) => window,
            Err(e) => {
                warn!("[{}] load at {addr:#010x} failed: {e}", self.time);
                sentinel()
            }
        }
    }

    fn service_htif(&mut self) -> Result<()> {
        match self.htif.service_step(&mut self.memory) {
            Err(e) if e.is_recoverable() => {
                warn!("[{}] htif: {e}", self.time);
                Ok(())
            }
            other => other,
        }
    }

    /// Flushes on recovery, then buffers the store or forwards the load.
    fn data_access(&mut self, out: &CoreOutputs) -> Result<()> {
        if out.recover {
            let dropped = self.store_buffer.flush();
            trace!("[{}] recover: flushed {dropped} stores", self.time);
        }
        if out.dcache_we {
            let size = SizeClass::from_bits(out.dcache_size)?;
            self.store_buffer.add_store_request(StoreRequest::new(
                out.dcache_addr,
                out.dcache_data,
                size,
            ))?;
        } else {
            self.inputs.load_data = self.load_window(out.dcache_addr);
        }
        Ok(())
    }

    /// Advances the simulation by one clock phase.
    ///
    /// # Returns
    ///
    /// The state after the phase; anything but [`SimState::Running`] is final.
    ///
    /// # Errors
    ///
    /// Store-buffer overflow or exhaustion, an invalid size class from the
    /// model, and non-recoverable HTIF errors.
    pub fn step(&mut self, core: &mut dyn CoreModel) -> Result<SimState> {
        if self.state != SimState::Running {
            return Ok(self.state);
        }

        self.time += 1;
        self.clock = !self.clock;
        core.set_clock(self.clock);
        let in_reset = self.time < self.reset_cycles;
        core.set_reset(in_reset);

        let mut halted = false;
        if !in_reset {
            let out = core.outputs();
            self.inputs.fetch_data = self.fetch(out.icache_addr);
            self.inputs.fetch_valid = true;

            if self.clock {
                let retired = out.store_retire.count_ones() as usize;
                halted =
                    self.store_buffer.commit(&mut self.memory, retired)? == CommitOutcome::Halt;
                if halted {
                    trace!("[{}] halt: data port idle for the rest of the phase", self.time);
                } else {
                    self.data_access(&out)?;
                }
            }
            self.inputs.load_valid = true;
            core.drive(&self.inputs);
        }

        core.eval();
        self.service_htif()?;

        self.state = if halted {
            SimState::Halted
        } else if self.htif.is_done() {
            SimState::Exited(self.htif.exit_code())
        } else if core.finished() {
            SimState::Finished
        } else if self.time >= self.max_steps {
            SimState::Timeout
        } else {
            SimState::Running
        };
        if self.state != SimState::Running {
            info!("[{}] simulation {}", self.time, self.state);
        }
        Ok(self.state)
    }

    /// Steps `core` until the run ends.
    ///
    /// # Errors
    ///
    /// The first fatal error from [`Simulator::step`].
    pub fn run(&mut self, core: &mut dyn CoreModel) -> Result<SimState> {
        while self.step(core)? == SimState::Running {}
        Ok(self.state)
    }

    /// Services HTIF without a hardware model until the target exits or the
    /// step budget runs out.
    ///
    /// Useful when memory is driven by another agent (or pre-seeded) and only
    /// the host side of the protocol is under test.
    ///
    /// # Errors
    ///
    /// Non-recoverable HTIF errors.
    pub fn run_host_only(&mut self) -> Result<SimState> {
        while self.state == SimState::Running {
            self.time += 1;
            self.service_htif()?;
            if self.htif.is_done() {
                self.state = SimState::Exited(self.htif.exit_code());
            } else if self.time >= self.max_steps {
                self.state = SimState::Timeout;
            }
        }
        info!("[{}] simulation {}", self.time, self.state);
        Ok(self.state)
    }

    /// Ends the run: writes the signature file if one is configured.
    ///
    /// # Errors
    ///
    /// I/O errors writing the signature.
    pub fn finish(&mut self) -> Result<()> {
        self.htif.stop(&self.memory)
    }
}
