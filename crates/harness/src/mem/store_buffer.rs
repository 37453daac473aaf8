//! Store Buffer for retired-but-uncommitted writes.
//!
//! The hardware model issues stores before it knows they will retire. The harness
//! holds them here until the model signals retirement and provides:
//! 1. **Buffering:** In-order queue of pending [`StoreRequest`]s, bounded by a capacity.
//! 2. **Commit:** Write the oldest `n` stores to memory, applying the halt and console
//!    side channels.
//! 3. **Flush:** Discard everything pending (mispredict recovery).
//! 4. **Forwarding:** Byte-precise store-to-load forwarding over an 8-byte load window.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};

use tracing::{debug, trace, warn};

use super::MemoryPort;
use crate::common::constants::{CONSOLE_ADDR, HALT_ADDR, LOAD_BYTES};
use crate::common::data::StoreRequest;
use crate::common::error::{Result, SimError};
use crate::config::StoreBufferConfig;

/// Data addresses that bypass memory when a store commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecialAddresses {
    /// A non-zero store here discards the buffer and halts the simulation.
    pub halt: Option<u32>,
    /// The low byte of a store here is written to the console sink.
    pub console: Option<u32>,
}

impl SpecialAddresses {
    /// No side channels; every store reaches memory.
    pub const NONE: Self = Self {
        halt: None,
        console: None,
    };
}

impl Default for SpecialAddresses {
    fn default() -> Self {
        Self {
            halt: Some(HALT_ADDR),
            console: Some(CONSOLE_ADDR),
        }
    }
}

/// What the driver should do after a commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All requested stores were committed.
    Continue,
    /// A non-zero store hit the halt address; the buffer has been discarded.
    Halt,
}

/// In-order buffer of pending stores.
pub struct StoreBuffer {
    entries: VecDeque<StoreRequest>,
    capacity: usize,
    special: SpecialAddresses,
    console: Box<dyn Write + Send>,
}

impl fmt::Debug for StoreBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuffer")
            .field("entries", &self.entries)
            .field("capacity", &self.capacity)
            .field("special", &self.special)
            .finish_non_exhaustive()
    }
}

impl StoreBuffer {
    /// Creates an empty buffer that prints console bytes to stderr.
    pub fn new(capacity: usize, special: SpecialAddresses) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            special,
            console: Box::new(io::stderr()),
        }
    }

    /// Creates a buffer from the `store_buffer` configuration section.
    pub fn from_config(config: &StoreBufferConfig) -> Self {
        Self::new(
            config.capacity,
            SpecialAddresses {
                halt: config.halt_addr,
                console: config.console_addr,
            },
        )
    }

    /// Replaces the console sink.
    #[must_use]
    pub fn with_console(mut self, console: Box<dyn Write + Send>) -> Self {
        self.console = console;
        self
    }

    /// Returns the capacity.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of pending stores.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no store is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the active side-channel addresses.
    #[inline]
    pub const fn special(&self) -> SpecialAddresses {
        self.special
    }

    /// Pending stores, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &StoreRequest> {
        self.entries.iter()
    }

    /// Appends a store at the tail.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::StoreBufferFull`] if `capacity` stores are already pending.
    pub fn add_store_request(&mut self, req: StoreRequest) -> Result<()> {
        if self.entries.len() >= self.capacity {
            return Err(SimError::StoreBufferFull {
                capacity: self.capacity,
            });
        }
        trace!("[store buffer] incoming {req}");
        self.entries.push_back(req);
        Ok(())
    }

    /// Commits the `count` oldest stores to `mem` in order.
    ///
    /// # Arguments
    ///
    /// * `mem` - Backing memory.
    /// * `count` - Number of stores the model retired this cycle.
    ///
    /// # Returns
    ///
    /// [`CommitOutcome::Halt`] if a committed store hit the halt address.
    ///
    /// # Errors
    ///
    /// [`SimError::CommitOverflow`] if `count` exceeds the pending stores; the
    /// buffer is flushed before returning. A store whose bytes run past the
    /// top of the address space is logged and dropped; the rest of the batch
    /// still commits. Other memory errors are propagated and the failing store
    /// is consumed.
    pub fn commit(&mut self, mem: &mut dyn MemoryPort, count: usize) -> Result<CommitOutcome> {
        if count > self.entries.len() {
            let available = self.entries.len();
            let _ = self.flush();
            return Err(SimError::CommitOverflow {
                requested: count,
                available,
            });
        }
        if count > 0 {
            trace!("[store buffer] committing {count}");
        }

        for _ in 0..count {
            let Some(req) = self.entries.pop_front() else {
                break;
            };
            let bytes = req.le_bytes();
            let data = &bytes[..req.size.bytes()];

            if self.special.halt == Some(req.addr) {
                if data.iter().any(|&b| b != 0) {
                    let dropped = self.flush();
                    debug!("[store buffer] halt requested, discarded {dropped} pending stores");
                    return Ok(CommitOutcome::Halt);
                }
                continue;
            }

            if self.special.console == Some(req.addr) {
                if let Err(e) = self.console.write_all(&bytes[..1]) {
                    warn!("[store buffer] console write failed: {e}");
                }
                continue;
            }

            match mem.write_bytes(req.addr, data) {
                Err(e) if e.is_recoverable() => {
                    warn!("[store buffer] dropped {req}: {e}");
                }
                other => other?,
            }
        }

        if let Err(e) = self.console.flush() {
            warn!("[store buffer] console flush failed: {e}");
        }
        Ok(CommitOutcome::Continue)
    }

    /// Discards every pending store, returning how many were dropped.
    pub fn flush(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// Reads the 8-byte window at `addr` as the core would see it.
    ///
    /// Memory is read first, then every pending store is applied oldest to
    /// newest over the bytes where it overlaps the window, so the newest store
    /// to each byte wins.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Range`] if the window runs past the address space.
    pub fn load(&self, mem: &dyn MemoryPort, addr: u32) -> Result<[u8; LOAD_BYTES]> {
        let mut window = [0u8; LOAD_BYTES];
        mem.read_bytes(addr, &mut window)?;

        let load_start = u64::from(addr);
        let load_end = load_start + LOAD_BYTES as u64;
        for req in &self.entries {
            let store_start = u64::from(req.addr);
            let lo = store_start.max(load_start);
            let hi = req.end().min(load_end);
            if lo >= hi {
                continue;
            }
            let bytes = req.le_bytes();
            let src = (lo - store_start) as usize..(hi - store_start) as usize;
            let dst = (lo - load_start) as usize..(hi - load_start) as usize;
            window[dst].copy_from_slice(&bytes[src]);
        }
        Ok(window)
    }
}
