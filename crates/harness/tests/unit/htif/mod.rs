

/// Unit tests for device registration and dispatch.
pub mod device;

/// Unit tests for the syscall proxy.
pub mod syscall;
