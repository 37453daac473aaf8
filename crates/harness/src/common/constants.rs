//! Global Harness Constants.
//!
//! This module defines constants shared across the harness. It includes:
//! 1. **Memory Constants:** Bucket geometry and the extent of the target address space.
//! 2. **Port Constants:** Widths of the instruction and data ports of the core.
//! 3. **Special Addresses:** Store-buffer side channels for halt and console output.
//! 4. **HTIF Constants:** Register encoding and command block layout.

/// Number of address bits covered by one sparse-memory bucket.
pub const BUCKET_BITS: u32 = 10;

/// Size of one sparse-memory bucket in bytes (1 KiB).
pub const BUCKET_SIZE: usize = 1 << BUCKET_BITS;

/// Total size of the target address space in bytes (4 GiB).
pub const ADDRESS_SPACE: u64 = 1 << 32;

/// Width of one line of non-zero memory output in bytes.
pub const LINE_BYTES: usize = 32;

/// Bytes grouped together when printing a memory line.
pub const BYTE_GROUP: usize = 4;

/// Bytes delivered to the core per instruction fetch.
pub const FETCH_BYTES: usize = 16;

/// Bytes delivered to the core per data load.
pub const LOAD_BYTES: usize = 8;

/// Writing a non-zero value here halts the simulation.
pub const HALT_ADDR: u32 = 0xFFFF_FFFC;

/// The low byte of a store here is printed instead of written.
pub const CONSOLE_ADDR: u32 = 0xFFFF_FFF8;

/// Little-endian word pattern returned for fetches and loads that fault.
pub const FAULT_SENTINEL: u32 = 0xdead_beef;

/// Number of 64-bit words in an HTIF command block.
pub const COMMAND_WORDS: usize = 8;

/// Bit position of the device id in a `tohost` value.
pub const DEVICE_SHIFT: u32 = 56;

/// Bit position of the command id in a `tohost` value.
pub const COMMAND_SHIFT: u32 = 48;

/// Mask of the payload field in a `tohost`/`fromhost` value.
pub const PAYLOAD_MASK: u64 = (1 << COMMAND_SHIFT) - 1;

/// Maximum chunk written per call while loading program segments.
pub const LOAD_CHUNK: usize = 64;

/// Entry point reported when no program has been loaded.
pub const DEFAULT_ENTRY: u64 = 0x1000_0000;
