//! Host-Target Interface (HTIF) controller.
//!
//! The target talks to the host through two 64-bit words in its own memory,
//! located by the `tohost` and `fromhost` ELF symbols. Once per simulated step
//! the controller:
//! 1. **Polls:** Reads `tohost`; a non-zero value is a command.
//! 2. **Acknowledges:** Clears `tohost` before the command is dispatched.
//! 3. **Dispatches:** Routes the command to a [`Device`] by id and queues any reply.
//! 4. **Ticks:** Advances every device.
//! 5. **Responds:** Moves the oldest queued reply into `fromhost` once the target
//!    has consumed the previous one (`fromhost == 0`).
//!
//! The controller also owns program loading (entry point, symbols, payloads,
//! reset vector) and writes the signature region when the run stops.

/// `tohost` value decoding.
pub mod command;

/// Device trait and registry.
pub mod device;

/// Symbol table.
pub mod symbols;

/// Syscall proxy (device 0).
pub mod syscall;

pub use command::Command;
pub use device::{Device, DeviceList};
pub use symbols::SymbolTable;
pub use syscall::SyscallProxy;

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, trace};

use crate::common::constants::DEFAULT_ENTRY;
use crate::common::error::{Result, SimError};
use crate::config::HtifConfig;
use crate::mem::{MemoryPort, target_addr};
use crate::sim::loader;
use syscall::NO_EXIT;

/// Target addresses of the two handshake words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostRegisters {
    /// Written by the target with a command, cleared by the host.
    pub tohost: u32,
    /// Written by the host with a reply, cleared by the target.
    pub fromhost: u32,
}

/// The `begin_signature..end_signature` region of a compliance-test image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureRegion {
    /// First byte of the region.
    pub addr: u64,
    /// Length in bytes.
    pub len: u64,
}

/// HTIF controller.
#[derive(Debug)]
pub struct Htif {
    registers: Option<HostRegisters>,
    entry: u64,
    symbols: SymbolTable,
    signature: Option<SignatureRegion>,
    signature_file: Option<PathBuf>,
    signature_granularity: usize,
    fromhost_queue: VecDeque<u64>,
    devices: DeviceList,
    exit_signal: Arc<AtomicU64>,
}

impl Default for Htif {
    fn default() -> Self {
        Self::new()
    }
}

impl Htif {
    /// Creates a controller with the syscall proxy registered as device 0.
    ///
    /// Console output from the target goes to stdout.
    pub fn new() -> Self {
        let exit_signal = Arc::new(AtomicU64::new(NO_EXIT));
        let proxy = SyscallProxy::new(Arc::clone(&exit_signal));
        Self::with_proxy(proxy, exit_signal)
    }

    /// Creates a controller whose syscall proxy prints to `console`.
    pub fn with_console(console: Box<dyn Write + Send>) -> Self {
        let exit_signal = Arc::new(AtomicU64::new(NO_EXIT));
        let proxy = SyscallProxy::new(Arc::clone(&exit_signal)).with_console(console);
        Self::with_proxy(proxy, exit_signal)
    }

    fn with_proxy(proxy: SyscallProxy, exit_signal: Arc<AtomicU64>) -> Self {
        let mut devices = DeviceList::new();
        let _ = devices.register(Box::new(proxy));
        Self {
            registers: None,
            entry: DEFAULT_ENTRY,
            symbols: SymbolTable::new(),
            signature: None,
            signature_file: None,
            signature_granularity: 16,
            fromhost_queue: VecDeque::new(),
            devices,
            exit_signal,
        }
    }

    /// Registers an additional device and returns its id (1, 2, ...).
    ///
    /// # Errors
    ///
    /// [`SimError::DeviceTableFull`] once all 256 ids are taken.
    pub fn register_device(&mut self, device: Box<dyn Device>) -> Result<u8> {
        self.devices.register(device)
    }

    /// Uses fixed `tohost`/`fromhost` addresses instead of ELF symbols.
    pub fn attach(&mut self, registers: HostRegisters) {
        self.registers = Some(registers);
    }

    /// The handshake addresses, once known.
    pub const fn registers(&self) -> Option<HostRegisters> {
        self.registers
    }

    /// Program entry point (`0x1000_0000` until a program is loaded).
    pub const fn entry(&self) -> u64 {
        self.entry
    }

    /// Signature region of the loaded program, if it defines one.
    pub const fn signature(&self) -> Option<SignatureRegion> {
        self.signature
    }

    /// Symbols of every loaded image.
    pub const fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Name of the symbol at `addr`, for diagnostics.
    pub fn symbol_at(&self, addr: u64) -> Option<&str> {
        self.symbols.symbol_at(addr)
    }

    /// Address of the symbol `name`.
    pub fn address_of(&self, name: &str) -> Option<u64> {
        self.symbols.address_of(name)
    }

    /// Replies waiting for the target to clear `fromhost`.
    pub fn pending_responses(&self) -> usize {
        self.fromhost_queue.len()
    }

    /// Shared exit word; holds `u64::MAX` until the target exits.
    pub fn exit_signal(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.exit_signal)
    }

    /// Returns true once the target has requested exit.
    pub fn is_done(&self) -> bool {
        self.exit_signal.load(Ordering::Relaxed) != NO_EXIT
    }

    /// The target's exit code (`tohost >> 1`); zero while still running.
    pub fn exit_code(&self) -> u64 {
        match self.exit_signal.load(Ordering::Relaxed) {
            NO_EXIT => 0,
            raw => raw >> 1,
        }
    }

    /// Loads the program and payloads named in `config` and installs the reset vector.
    ///
    /// # Errors
    ///
    /// * [`SimError::Io`] if an image cannot be read.
    /// * [`SimError::Image`] if an image is not a valid ELF file.
    /// * [`SimError::Protocol`] if the program lacks `tohost` or `fromhost`.
    /// * [`SimError::Range`] if a segment or symbol lies outside the 32-bit space.
    pub fn load_program(&mut self, config: &HtifConfig, mem: &mut dyn MemoryPort) -> Result<()> {
        self.signature_file.clone_from(&config.signature_file);
        self.signature_granularity = config.signature_granularity.max(1);

        if let Some(program) = &config.program {
            let image = loader::load_elf(program, mem, &config.preloaded)?;
            info!("load prog: {}", program.display());
            for (name, addr) in &image.symbols {
                debug!("symbol: {name:>20}  | addr: {addr:#010x}");
            }

            let (Some(&tohost), Some(&fromhost)) =
                (image.symbols.get("tohost"), image.symbols.get("fromhost"))
            else {
                return Err(SimError::Protocol(format!(
                    "tohost and fromhost symbols not in '{}'; can't communicate with target",
                    program.display()
                )));
            };
            self.registers = Some(HostRegisters {
                tohost: target_addr(tohost, 8)?,
                fromhost: target_addr(fromhost, 8)?,
            });
            self.entry = image.entry;

            if let (Some(&begin), Some(&end)) = (
                image.symbols.get("begin_signature"),
                image.symbols.get("end_signature"),
            ) {
                self.signature = Some(SignatureRegion {
                    addr: begin,
                    len: end.saturating_sub(begin),
                });
            }

            self.symbols.merge(&image.symbols);

            for payload in &config.payloads {
                let extra = loader::load_elf(payload, mem, &config.preloaded)?;
                info!("load payload: {}", payload.display());
                self.symbols.merge(&extra.symbols);
            }
        } else {
            info!("no program configured; entry stays at {:#x}", self.entry);
        }

        if let Some(base) = config.reset_vector {
            loader::install_reset_vector(mem, base, self.entry)?;
        }
        Ok(())
    }

    /// Performs one poll/dispatch/respond round.
    ///
    /// Does nothing until the handshake addresses are known.
    ///
    /// # Errors
    ///
    /// Memory errors on the handshake words or from a device.
    pub fn service_step(&mut self, mem: &mut dyn MemoryPort) -> Result<()> {
        let Some(regs) = self.registers else {
            return Ok(());
        };

        let tohost = mem.read_u64(regs.tohost)?;
        if tohost != 0 {
            mem.write_u64(regs.tohost, 0)?;
            let cmd = Command::decode(tohost);
            trace!("[htif] tohost {tohost:#018x} ({cmd})");
            if let Some(reply) = self.devices.handle_command(&cmd, mem)? {
                self.fromhost_queue.push_back(cmd.respond(reply));
            }
        }

        self.devices.tick();

        if let Some(&reply) = self.fromhost_queue.front()
            && mem.read_u64(regs.fromhost)? == 0
        {
            mem.write_u64(regs.fromhost, reply)?;
            let _ = self.fromhost_queue.pop_front();
            trace!("[htif] fromhost <- {reply:#018x}");
        }
        Ok(())
    }

    /// Writes the signature file, if one is configured and the region is non-empty.
    ///
    /// Each line covers `granularity` bytes printed most-significant first as
    /// two hex digits; bytes past the end of the region print as `00`.
    ///
    /// # Errors
    ///
    /// [`SimError::Io`] if the file cannot be written, [`SimError::Range`] if the
    /// region lies outside the address space.
    pub fn stop(&self, mem: &dyn MemoryPort) -> Result<()> {
        let (Some(path), Some(region)) = (&self.signature_file, self.signature) else {
            return Ok(());
        };
        if region.len == 0 {
            return Ok(());
        }

        let addr = target_addr(region.addr, region.len)?;
        let mut buf = vec![0u8; region.len as usize];
        mem.read_bytes(addr, &mut buf)?;

        let file = File::create(path).map_err(|e| SimError::io(path, e))?;
        let mut out = BufWriter::new(file);
        let line = self.signature_granularity;
        for chunk_start in (0..buf.len()).step_by(line) {
            for j in (1..=line).rev() {
                let byte = buf.get(chunk_start + j - 1).copied().unwrap_or(0);
                write!(out, "{byte:02x}").map_err(|e| SimError::io(path, e))?;
            }
            writeln!(out).map_err(|e| SimError::io(path, e))?;
        }
        out.flush().map_err(|e| SimError::io(path, e))?;
        info!("signature written to '{}'", path.display());
        Ok(())
    }
}
