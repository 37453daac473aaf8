//! # Configuration Tests
//!
//! Defaults, partial JSON documents, and parse failures.

use std::io::Write;
use std::path::PathBuf;

use cosim_harness::SimError;
use cosim_harness::config::{Config, PreloadRange};
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.general.max_steps, 4000);
    assert_eq!(config.general.reset_cycles, 4);
    assert!(!config.general.print_memory_on_exit);
    assert_eq!(config.memory.fetch_bytes, 16);
    assert_eq!(config.memory.image, None);
    assert_eq!(config.store_buffer.capacity, 4096);
    assert_eq!(config.store_buffer.halt_addr, Some(0xFFFF_FFFC));
    assert_eq!(config.store_buffer.console_addr, Some(0xFFFF_FFF8));
    assert_eq!(config.htif.program, None);
    assert_eq!(config.htif.signature_granularity, 16);
    assert_eq!(config.htif.reset_vector, Some(0x1000));
    assert!(config.htif.preloaded.is_empty());
}

#[test]
fn test_empty_document_matches_defaults() {
    let parsed = Config::from_json_str("{}").unwrap();
    let default = Config::default();
    assert_eq!(parsed.general.max_steps, default.general.max_steps);
    assert_eq!(parsed.store_buffer.capacity, default.store_buffer.capacity);
    assert_eq!(parsed.store_buffer.halt_addr, default.store_buffer.halt_addr);
    assert_eq!(parsed.htif.reset_vector, default.htif.reset_vector);
}

#[test]
fn test_partial_section_keeps_other_defaults() {
    let config = Config::from_json_str(r#"{ "general": { "max_steps": 10 } }"#).unwrap();
    assert_eq!(config.general.max_steps, 10);
    assert_eq!(config.general.reset_cycles, 4);
    assert_eq!(config.store_buffer.console_addr, Some(0xFFFF_FFF8));
}

#[test]
fn test_null_disables_special_addresses_and_reset_vector() {
    let config = Config::from_json_str(
        r#"{
            "store_buffer": { "halt_addr": null, "console_addr": null },
            "htif": { "reset_vector": null }
        }"#,
    )
    .unwrap();
    assert_eq!(config.store_buffer.halt_addr, None);
    assert_eq!(config.store_buffer.console_addr, None);
    assert_eq!(config.htif.reset_vector, None);
}

#[test]
fn test_htif_section() {
    let config = Config::from_json_str(
        r#"{
            "htif": {
                "program": "prog.elf",
                "payloads": ["a.elf", "b.elf"],
                "signature_file": "out.sig",
                "signature_granularity": 4,
                "preloaded": [{ "base": 2147483648, "len": 4096 }]
            }
        }"#,
    )
    .unwrap();
    assert_eq!(config.htif.program, Some(PathBuf::from("prog.elf")));
    assert_eq!(
        config.htif.payloads,
        vec![PathBuf::from("a.elf"), PathBuf::from("b.elf")]
    );
    assert_eq!(config.htif.signature_file, Some(PathBuf::from("out.sig")));
    assert_eq!(config.htif.signature_granularity, 4);
    assert_eq!(
        config.htif.preloaded,
        vec![PreloadRange {
            base: 0x8000_0000,
            len: 0x1000
        }]
    );
}

#[test]
fn test_malformed_json_is_config_error() {
    let err = Config::from_json_str(r#"{ "general": { "max_steps": "many" } }"#).unwrap_err();
    assert!(matches!(err, SimError::Config { .. }));
}

#[test]
fn test_from_json_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(br#"{ "memory": { "fetch_bytes": 8, "image_base": 4096 } }"#)
        .unwrap();
    let config = Config::from_json_file(file.path()).unwrap();
    assert_eq!(config.memory.fetch_bytes, 8);
    assert_eq!(config.memory.image_base, 0x1000);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_json_file(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, SimError::Io { .. }));
}

#[test]
fn test_preload_range_overlap_edges() {
    let range = PreloadRange {
        base: 0x1000,
        len: 0x100,
    };
    assert!(range.overlaps(0x1000, 1));
    assert!(range.overlaps(0x10ff, 1));
    assert!(range.overlaps(0x0fc0, 0x41));
    assert!(!range.overlaps(0x1100, 0x40));
    assert!(!range.overlaps(0x0fc0, 0x40));
    assert!(!range.overlaps(0x1010, 0));

    let empty = PreloadRange { base: 0x1000, len: 0 };
    assert!(!empty.overlaps(0x1000, 8));
}
