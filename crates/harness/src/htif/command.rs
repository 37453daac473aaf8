//! HTIF command encoding.
//!
//! A non-zero `tohost` value packs three fields:
//!
//! ```text
//!  63      56 55      48 47                                0
//! +----------+----------+-----------------------------------+
//! |  device  |   cmd    |              payload              |
//! +----------+----------+-----------------------------------+
//! ```
//!
//! Responses written to `fromhost` use the same layout with the device's reply
//! in the payload field.

use std::fmt;

use crate::common::constants::{COMMAND_SHIFT, DEVICE_SHIFT, PAYLOAD_MASK};

/// A decoded `tohost` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    raw: u64,
}

impl Command {
    /// Decodes a raw `tohost` value.
    #[inline]
    pub const fn decode(raw: u64) -> Self {
        Self { raw }
    }

    /// Builds a command from its fields; `payload` is truncated to 48 bits.
    pub const fn new(device: u8, cmd: u8, payload: u64) -> Self {
        Self {
            raw: ((device as u64) << DEVICE_SHIFT)
                | ((cmd as u64) << COMMAND_SHIFT)
                | (payload & PAYLOAD_MASK),
        }
    }

    /// The value exactly as read from `tohost`.
    #[inline]
    pub const fn raw(&self) -> u64 {
        self.raw
    }

    /// Target device id.
    #[inline]
    pub const fn device(&self) -> u8 {
        (self.raw >> DEVICE_SHIFT) as u8
    }

    /// Device-specific command id.
    #[inline]
    pub const fn cmd(&self) -> u8 {
        (self.raw >> COMMAND_SHIFT) as u8
    }

    /// Low 48 bits: the exit value or the command-block address.
    #[inline]
    pub const fn payload(&self) -> u64 {
        self.raw & PAYLOAD_MASK
    }

    /// Returns `true` for the exit request `(code << 1) | 1` on device 0.
    #[inline]
    pub const fn is_exit(&self) -> bool {
        self.device() == 0 && self.cmd() == 0 && self.payload() & 1 == 1
    }

    /// Encodes a device reply for `fromhost`.
    #[inline]
    pub const fn respond(&self, value: u64) -> u64 {
        Self::new(self.device(), self.cmd(), value).raw
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dev={} cmd={} payload={:#x}",
            self.device(),
            self.cmd(),
            self.payload()
        )
    }
}
