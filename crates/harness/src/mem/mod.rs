//! Target memory subsystem.
//!
//! This module holds everything that stores target bytes. It provides:
//! 1. **Port Trait:** [`MemoryPort`], the byte-range capability shared by the store buffer
//!    and the HTIF controller.
//! 2. **Backing Store:** [`SparseMemory`], a lazily allocated 4 GiB address space.
//! 3. **Store Buffer:** [`StoreBuffer`], pending writes with store-to-load forwarding.

/// Lazily allocated bucket memory.
pub mod sparse;

/// Store buffer with byte-precise forwarding.
pub mod store_buffer;

pub use sparse::SparseMemory;
pub use store_buffer::{CommitOutcome, SpecialAddresses, StoreBuffer};

use crate::common::constants::ADDRESS_SPACE;
use crate::common::error::{Result, SimError};

/// Byte-range access to the 32-bit target address space.
///
/// Implementations must reject any range that would run past `0xFFFF_FFFF`
/// with [`SimError::Range`] and leave memory untouched in that case.
pub trait MemoryPort {
    /// Copies `dst.len()` bytes starting at `addr` into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Range`] if the range leaves the address space.
    fn read_bytes(&self, addr: u32, dst: &mut [u8]) -> Result<()>;

    /// Copies `src` into memory starting at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Range`] if the range leaves the address space.
    fn write_bytes(&mut self, addr: u32, src: &[u8]) -> Result<()>;

    /// Reads a little-endian 64-bit word.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Range`] if the word leaves the address space.
    fn read_u64(&self, addr: u32) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Writes a little-endian 64-bit word.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Range`] if the word leaves the address space.
    fn write_u64(&mut self, addr: u32, val: u64) -> Result<()> {
        self.write_bytes(addr, &val.to_le_bytes())
    }
}

/// Checks that `[addr, addr + len)` fits the 32-bit target space and narrows `addr`.
///
/// Target-side pointers (ELF symbols, command-block arguments) are 64-bit values;
/// this is the single place they are converted to memory addresses.
///
/// # Errors
///
/// Returns [`SimError::Range`] if the range does not fit.
pub fn target_addr(addr: u64, len: u64) -> Result<u32> {
    match addr.checked_add(len) {
        Some(end) if end <= ADDRESS_SPACE => {
            u32::try_from(addr).map_err(|_| SimError::Range { addr, len })
        }
        _ => Err(SimError::Range { addr, len }),
    }
}

/// Checks a range given as a 32-bit base and a host length.
///
/// # Errors
///
/// Returns [`SimError::Range`] if the range ends past `2^32`.
pub(crate) fn check_range(addr: u32, len: usize) -> Result<()> {
    let end = u64::from(addr) + len as u64;
    if end > ADDRESS_SPACE {
        return Err(SimError::Range {
            addr: u64::from(addr),
            len: len as u64,
        });
    }
    Ok(())
}
