//! Memory Access Types.
//!
//! This module defines the value types exchanged across the core's data port:
//! 1. **Size Classes:** The 2-bit size encoding driven by the core for stores.
//! 2. **Store Requests:** A retired-but-uncommitted store held by the store buffer.

use std::fmt;

use super::error::{Result, SimError};

/// Width of a data-port access, as encoded by the core's 2-bit size signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SizeClass {
    /// 8-bit byte access (encoding 0).
    Byte,

    /// 16-bit half-word access (encoding 1).
    Half,

    /// 32-bit word access (encoding 2).
    Word,

    /// 64-bit double-word access (encoding 3).
    #[default]
    Double,
}

impl SizeClass {
    /// Decodes the core's size signal.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidSizeClass`] for encodings above 3.
    pub const fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(Self::Byte),
            1 => Ok(Self::Half),
            2 => Ok(Self::Word),
            3 => Ok(Self::Double),
            other => Err(SimError::InvalidSizeClass(other)),
        }
    }

    /// Number of bytes moved by an access of this class.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Half => 2,
            Self::Word => 4,
            Self::Double => 8,
        }
    }
}

/// A store that has executed but not yet been written to memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreRequest {
    /// Target byte address.
    pub addr: u32,
    /// Store data; only the low `size.bytes()` bytes are significant.
    pub data: u64,
    /// Access width.
    pub size: SizeClass,
}

impl StoreRequest {
    /// Creates a new store request.
    pub const fn new(addr: u32, data: u64, size: SizeClass) -> Self {
        Self { addr, data, size }
    }

    /// The store data as little-endian bytes; the first `size.bytes()` are significant.
    #[inline]
    pub const fn le_bytes(&self) -> [u8; 8] {
        self.data.to_le_bytes()
    }

    /// One past the last byte written, in the 64-bit domain so it cannot wrap.
    #[inline]
    pub const fn end(&self) -> u64 {
        self.addr as u64 + self.size.bytes() as u64
    }
}

impl fmt::Display for StoreRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "store[{}B] {:#010x} <- {:#018x}",
            self.size.bytes(),
            self.addr,
            self.data
        )
    }
}
