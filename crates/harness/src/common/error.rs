//! Harness error taxonomy.
//!
//! Every fallible operation in the harness reports a [`SimError`]. The variants split into:
//! 1. **Recoverable:** [`SimError::Range`] during steady-state fetch/load; the driver logs it
//!    and substitutes a sentinel value.
//! 2. **Fatal at setup:** I/O, image, configuration, and protocol errors abort the run.
//! 3. **Fatal in flight:** store-buffer overflow or capacity exhaustion means the hardware
//!    model and the harness disagree about in-flight stores; the run must stop.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the harness.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors raised by the memory model, store buffer, HTIF controller, and loader.
#[derive(Debug, Error)]
pub enum SimError {
    /// A byte range does not fit inside the 32-bit target address space.
    ///
    /// Raised for ranges that would wrap past `0xFFFF_FFFF` and for 64-bit target
    /// pointers (e.g. from an HTIF command block) that exceed 32 bits.
    #[error("address range {addr:#x}+{len:#x} exceeds the 32-bit address space")]
    Range {
        /// First address of the rejected range.
        addr: u64,
        /// Length of the rejected range in bytes.
        len: u64,
    },

    /// A host file (image, dump, signature, configuration) could not be read or written.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// Path of the host file.
        path: PathBuf,
        /// Underlying host error.
        #[source]
        source: io::Error,
    },

    /// The target program cannot talk to the host (missing `tohost`/`fromhost`).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The hardware model retired more stores than the buffer holds.
    ///
    /// The buffer has already been flushed when this error is returned.
    #[error("store buffer commit of {requested} entries exceeds {available} pending")]
    CommitOverflow {
        /// Number of stores the model asked to commit.
        requested: usize,
        /// Number of stores that were pending.
        available: usize,
    },

    /// A store was issued while the buffer was at its configured capacity.
    #[error("store buffer full ({capacity} pending stores)")]
    StoreBufferFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// A store carried a size-class encoding outside `0..=3`.
    #[error("invalid store size class {0}")]
    InvalidSizeClass(u8),

    /// Every 8-bit HTIF device id is already taken.
    #[error("cannot register device '{name}': all 256 device ids are in use")]
    DeviceTableFull {
        /// Name of the rejected device.
        name: &'static str,
    },

    /// The program image could not be parsed.
    #[error("malformed program image '{}': {reason}", path.display())]
    Image {
        /// Path of the image.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// The configuration file could not be parsed.
    #[error("invalid configuration '{}': {reason}", path.display())]
    Config {
        /// Path of the configuration file.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },
}

impl SimError {
    /// Builds an [`SimError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for errors the driver may log and continue past.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Range { .. })
    }
}
