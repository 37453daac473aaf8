/// Unit tests for size classes and store requests.
pub mod data;

/// Unit tests for the error taxonomy.
pub mod error;
