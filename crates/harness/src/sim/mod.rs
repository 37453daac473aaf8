//! Simulation driver and program loading.
//!
//! Provides the ELF loader and the step loop that connects an external
//! hardware model to memory, the store buffer and HTIF.

/// ELF loading and reset-vector setup.
pub mod loader;

/// Step loop and hardware-model boundary.
pub mod simulator;

pub use simulator::{CoreInputs, CoreModel, CoreOutputs, SimState, Simulator};
