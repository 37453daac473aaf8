//! Co-simulation harness library.
//!
//! This crate is the software half of a hardware/software co-simulation of a
//! custom processor core. It provides:
//! 1. **Memory:** A sparse 4 GiB byte space with image load/dump and introspection.
//! 2. **Store Buffer:** Pending stores with byte-precise store-to-load forwarding.
//! 3. **HTIF:** The `tohost`/`fromhost` handshake, pluggable devices, and a syscall proxy.
//! 4. **Simulation:** ELF loading, the reset vector, and the step loop around a hardware model.

/// Common types and constants (size classes, store requests, errors).
pub mod common;
/// Harness configuration (defaults and hierarchical config structures).
pub mod config;
/// Host-target interface (commands, devices, syscall proxy).
pub mod htif;
/// Target memory and store buffer.
pub mod mem;
/// Program loader and simulation driver.
pub mod sim;

/// Crate error and result types.
pub use crate::common::{Result, SimError};
/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// HTIF controller.
pub use crate::htif::Htif;
/// Sparse memory, the byte-range port trait, and the store buffer.
pub use crate::mem::{MemoryPort, SparseMemory, StoreBuffer};
/// Top-level simulator and the hardware-model boundary.
pub use crate::sim::{CoreModel, SimState, Simulator};
