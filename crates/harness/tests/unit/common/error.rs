//! # Error Taxonomy Tests
//!
//! Display output and recoverability classification of [`SimError`].

use std::io;

use cosim_harness::SimError;

#[test]
fn test_only_range_errors_are_recoverable() {
    assert!(SimError::Range { addr: 0, len: 8 }.is_recoverable());
    assert!(!SimError::Protocol("x".into()).is_recoverable());
    assert!(
        !SimError::CommitOverflow {
            requested: 2,
            available: 1
        }
        .is_recoverable()
    );
    assert!(!SimError::StoreBufferFull { capacity: 4 }.is_recoverable());
    assert!(!SimError::InvalidSizeClass(5).is_recoverable());
    assert!(!SimError::DeviceTableFull { name: "uart" }.is_recoverable());
    assert!(!SimError::io("a.bin", io::Error::other("boom")).is_recoverable());
}

#[test]
fn test_range_error_message() {
    let err = SimError::Range {
        addr: 0xFFFF_FFFC,
        len: 8,
    };
    assert_eq!(
        err.to_string(),
        "address range 0xfffffffc+0x8 exceeds the 32-bit address space"
    );
}

#[test]
fn test_io_error_keeps_path_and_source() {
    let err = SimError::io("missing.elf", io::Error::new(io::ErrorKind::NotFound, "gone"));
    let msg = err.to_string();
    assert!(msg.contains("missing.elf"));
    assert!(msg.contains("gone"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_commit_overflow_message() {
    let err = SimError::CommitOverflow {
        requested: 3,
        available: 1,
    };
    assert_eq!(
        err.to_string(),
        "store buffer commit of 3 entries exceeds 1 pending"
    );
}
