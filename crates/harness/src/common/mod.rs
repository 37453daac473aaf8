//! Common utilities and types used throughout the co-simulation harness.
//!
//! This module provides the building blocks shared by the memory model, store buffer,
//! and HTIF controller. It includes:
//! 1. **Constants:** Bucket geometry, port widths, special addresses, and HTIF encoding.
//! 2. **Data Types:** Store size classes and store requests.
//! 3. **Error Handling:** The [`SimError`] taxonomy and crate `Result` alias.

/// Common constants used throughout the harness.
pub mod constants;

/// Data-port value types.
pub mod data;

/// Error types.
pub mod error;

pub use data::{SizeClass, StoreRequest};
pub use error::{Result, SimError};
