//! Configuration system for the co-simulation harness.
//!
//! This module defines the configuration consumed from the external driver. It provides:
//! 1. **Defaults:** Baseline constants (step budget, reset length, buffer capacity, special addresses).
//! 2. **Structures:** Hierarchical config for general, memory, store-buffer, and HTIF settings.
//! 3. **Loading:** JSON deserialization from a string or a file.
//!
//! Every section and field is optional in JSON; missing values fall back to [`Config::default`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::common::error::{Result, SimError};

/// Default configuration constants for the harness.
mod defaults {
    use crate::common::constants;

    /// Simulation step budget (clock phases) before the driver gives up.
    pub const MAX_STEPS: u64 = 4000;

    /// Number of initial steps during which the core is held in reset.
    pub const RESET_CYCLES: u64 = 4;

    /// Bytes returned per instruction fetch.
    pub const FETCH_BYTES: usize = constants::FETCH_BYTES;

    /// Pending stores the buffer may hold before it reports `StoreBufferFull`.
    ///
    /// Far above any realistic reorder window; reaching it means the model
    /// stopped retiring stores.
    pub const STORE_BUFFER_CAPACITY: usize = 4096;

    /// Halt register address.
    pub const HALT_ADDR: u32 = constants::HALT_ADDR;

    /// Console register address.
    pub const CONSOLE_ADDR: u32 = constants::CONSOLE_ADDR;

    /// Bytes per line of the signature file.
    pub const SIGNATURE_GRANULARITY: usize = 16;

    /// Base address of the reset-vector trampoline.
    pub const RESET_VECTOR: u64 = 0x1000;
}

/// Root configuration structure.
///
/// # Examples
///
/// ```
/// use cosim_harness::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.general.max_steps, 4000);
/// assert_eq!(config.store_buffer.halt_addr, Some(0xFFFF_FFFC));
/// ```
///
/// Deserializing from JSON:
///
/// ```
/// use cosim_harness::config::Config;
///
/// let json = r#"{
///     "general": { "max_steps": 100000 },
///     "store_buffer": { "console_addr": null },
///     "htif": {
///         "program": "build/sobel.elf",
///         "payloads": ["build/image.elf"],
///         "signature_file": "out/sobel.sig",
///         "signature_granularity": 4,
///         "preloaded": [{ "base": 2147483648, "len": 4096 }]
///     }
/// }"#;
///
/// let config = Config::from_json_str(json).unwrap();
/// assert_eq!(config.general.max_steps, 100000);
/// assert_eq!(config.store_buffer.console_addr, None);
/// assert_eq!(config.htif.signature_granularity, 4);
/// assert!(config.htif.preloaded[0].overlaps(0x8000_0ff8, 16));
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General simulation settings
    pub general: GeneralConfig,
    /// Memory port settings
    pub memory: MemoryConfig,
    /// Store buffer bound and special addresses
    pub store_buffer: StoreBufferConfig,
    /// Program loading and host interface settings
    pub htif: HtifConfig,
}

impl Config {
    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if the JSON does not match the schema.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SimError::Config {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Io`] if the file cannot be read and [`SimError::Config`]
    /// if its contents do not parse.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| SimError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// General simulation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Step budget (clock phases); the run ends with a timeout once exceeded.
    #[serde(default = "GeneralConfig::default_max_steps")]
    pub max_steps: u64,

    /// Steps during which the core's reset input is asserted.
    #[serde(default = "GeneralConfig::default_reset_cycles")]
    pub reset_cycles: u64,

    /// Print all non-zero memory lines when the run ends.
    #[serde(default)]
    pub print_memory_on_exit: bool,
}

impl GeneralConfig {
    fn default_max_steps() -> u64 {
        defaults::MAX_STEPS
    }

    fn default_reset_cycles() -> u64 {
        defaults::RESET_CYCLES
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_steps: defaults::MAX_STEPS,
            reset_cycles: defaults::RESET_CYCLES,
            print_memory_on_exit: false,
        }
    }
}

/// Memory port configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Bytes delivered per instruction fetch (at most 16).
    #[serde(default = "MemoryConfig::default_fetch_bytes")]
    pub fetch_bytes: usize,

    /// Raw binary copied into memory before the program is loaded.
    #[serde(default)]
    pub image: Option<PathBuf>,

    /// Target address of the first byte of `image`.
    #[serde(default)]
    pub image_base: u32,
}

impl MemoryConfig {
    fn default_fetch_bytes() -> usize {
        defaults::FETCH_BYTES
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            fetch_bytes: defaults::FETCH_BYTES,
            image: None,
            image_base: 0,
        }
    }
}

/// Store buffer configuration.
///
/// Setting either special address to `null` disables that side channel, so
/// stores to it reach memory like any other.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreBufferConfig {
    /// Maximum number of pending stores.
    #[serde(default = "StoreBufferConfig::default_capacity")]
    pub capacity: usize,

    /// A non-zero store here ends the simulation.
    #[serde(default = "StoreBufferConfig::default_halt_addr")]
    pub halt_addr: Option<u32>,

    /// The low byte of a store here goes to the console.
    #[serde(default = "StoreBufferConfig::default_console_addr")]
    pub console_addr: Option<u32>,
}

impl StoreBufferConfig {
    fn default_capacity() -> usize {
        defaults::STORE_BUFFER_CAPACITY
    }

    #[allow(clippy::unnecessary_wraps)]
    fn default_halt_addr() -> Option<u32> {
        Some(defaults::HALT_ADDR)
    }

    #[allow(clippy::unnecessary_wraps)]
    fn default_console_addr() -> Option<u32> {
        Some(defaults::CONSOLE_ADDR)
    }
}

impl Default for StoreBufferConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::STORE_BUFFER_CAPACITY,
            halt_addr: Some(defaults::HALT_ADDR),
            console_addr: Some(defaults::CONSOLE_ADDR),
        }
    }
}

/// An address range already populated through a side channel.
///
/// Program loading leaves every chunk that overlaps such a range untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PreloadRange {
    /// First preloaded address.
    pub base: u64,
    /// Length of the range in bytes.
    pub len: u64,
}

impl PreloadRange {
    /// Returns `true` if `[addr, addr + len)` shares at least one byte with this range.
    pub const fn overlaps(&self, addr: u64, len: u64) -> bool {
        len != 0
            && self.len != 0
            && addr < self.base.saturating_add(self.len)
            && self.base < addr.saturating_add(len)
    }
}

/// Program loading and host interface configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HtifConfig {
    /// Target program (ELF) to load.
    #[serde(default)]
    pub program: Option<PathBuf>,

    /// Additional ELF payloads loaded after the program.
    #[serde(default)]
    pub payloads: Vec<PathBuf>,

    /// File receiving the `begin_signature..end_signature` region at the end of the run.
    #[serde(default)]
    pub signature_file: Option<PathBuf>,

    /// Bytes per signature line.
    #[serde(default = "HtifConfig::default_signature_granularity")]
    pub signature_granularity: usize,

    /// Ranges that program loading must not overwrite.
    #[serde(default)]
    pub preloaded: Vec<PreloadRange>,

    /// Where to install the reset-vector trampoline; `null` skips it.
    #[serde(default = "HtifConfig::default_reset_vector")]
    pub reset_vector: Option<u64>,
}

impl HtifConfig {
    fn default_signature_granularity() -> usize {
        defaults::SIGNATURE_GRANULARITY
    }

    #[allow(clippy::unnecessary_wraps)]
    fn default_reset_vector() -> Option<u64> {
        Some(defaults::RESET_VECTOR)
    }
}

impl Default for HtifConfig {
    fn default() -> Self {
        Self {
            program: None,
            payloads: Vec::new(),
            signature_file: None,
            signature_granularity: defaults::SIGNATURE_GRANULARITY,
            preloaded: Vec::new(),
            reset_vector: Some(defaults::RESET_VECTOR),
        }
    }
}
