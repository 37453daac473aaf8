//! # Syscall Proxy Tests
//!
//! Drives device 0 through the controller with command blocks in target memory
//! and checks the host-side effects and the return value written back.

use std::fs;

use cosim_harness::htif::syscall::{flags, nr};
use cosim_harness::htif::{Command, HostRegisters, Htif};
use cosim_harness::mem::{MemoryPort, SparseMemory};
use pretty_assertions::assert_eq;

use crate::common::mocks::console::SharedSink;
use crate::common::{init_logging, write_c_string, write_command_block};

const TOHOST: u32 = 0x100;
const FROMHOST: u32 = 0x108;
const BLOCK: u32 = 0x200;
const BUF: u32 = 0x400;
const PATH: u32 = 0x800;
const AT_FDCWD: u64 = -100i64 as u64;

struct Target {
    htif: Htif,
    mem: SparseMemory,
    console: SharedSink,
}

impl Target {
    fn new() -> Self {
        init_logging();
        let console = SharedSink::new();
        let mut htif = Htif::with_console(console.boxed());
        htif.attach(HostRegisters {
            tohost: TOHOST,
            fromhost: FROMHOST,
        });
        Self {
            htif,
            mem: SparseMemory::new(),
            console,
        }
    }

    /// Issues one syscall and returns word 0 of the command block.
    fn syscall(&mut self, num: u64, args: &[u64]) -> u64 {
        write_command_block(&mut self.mem, BLOCK, num, args);
        self.mem.write_u64(FROMHOST, 0).unwrap();
        self.mem.write_u64(TOHOST, u64::from(BLOCK)).unwrap();
        self.htif.service_step(&mut self.mem).unwrap();
        assert_eq!(self.mem.read_u64(TOHOST).unwrap(), 0);
        self.mem.read_u64(BLOCK).unwrap()
    }
}

fn errno(e: i32) -> u64 {
    (-i64::from(e)) as u64
}

#[test]
fn test_write_to_stdout_goes_to_console() {
    let mut t = Target::new();
    t.mem.write_bytes(BUF, b"hello").unwrap();

    assert_eq!(t.syscall(nr::WRITE, &[1, u64::from(BUF), 5]), 5);
    assert_eq!(t.console.text(), "hello");
    assert_eq!(t.mem.read_u64(FROMHOST).unwrap(), Command::new(0, 0, 1).raw());
}

#[test]
fn test_printstr() {
    let mut t = Target::new();
    write_c_string(&mut t.mem, BUF, "value: 42\n");

    assert_eq!(t.syscall(nr::PRINTSTR, &[u64::from(BUF)]), 10);
    assert_eq!(t.console.text(), "value: 42\n");
}

#[test]
fn test_exit_syscall() {
    let mut t = Target::new();
    assert_eq!(t.syscall(nr::EXIT, &[3]), 0);
    assert!(t.htif.is_done());
    assert_eq!(t.htif.exit_code(), 3);
}

#[test]
fn test_unknown_syscall_returns_enosys() {
    let mut t = Target::new();
    assert_eq!(t.syscall(999, &[]), errno(libc::ENOSYS));
    assert!(!t.htif.is_done());
}

#[test]
fn test_bad_descriptors() {
    let mut t = Target::new();
    assert_eq!(t.syscall(nr::CLOSE, &[17]), errno(libc::EBADF));
    assert_eq!(
        t.syscall(nr::WRITE, &[0, u64::from(BUF), 1]),
        errno(libc::EBADF)
    );
    assert_eq!(
        t.syscall(nr::READ, &[1, u64::from(BUF), 1]),
        errno(libc::EBADF)
    );
}

#[test]
fn test_openat_requires_cwd_dirfd() {
    let mut t = Target::new();
    write_c_string(&mut t.mem, PATH, "whatever");
    assert_eq!(
        t.syscall(nr::OPENAT, &[5, u64::from(PATH), 9, 0, 0]),
        errno(libc::EBADF)
    );
}

#[test]
fn test_openat_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.txt");
    let path = path.to_str().unwrap();

    let mut t = Target::new();
    write_c_string(&mut t.mem, PATH, path);
    let len = path.len() as u64 + 1;
    assert_eq!(
        t.syscall(nr::OPENAT, &[AT_FDCWD, u64::from(PATH), len, 0, 0]),
        errno(libc::ENOENT)
    );
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("out.txt");
    let path = file.to_str().unwrap();
    let len = path.len() as u64 + 1;

    let mut t = Target::new();
    write_c_string(&mut t.mem, PATH, path);

    let create = flags::O_WRONLY | flags::O_CREAT | flags::O_TRUNC;
    let fd = t.syscall(nr::OPENAT, &[AT_FDCWD, u64::from(PATH), len, create, 0o644]);
    assert_eq!(fd, 3);

    t.mem.write_bytes(BUF, b"from target").unwrap();
    assert_eq!(t.syscall(nr::WRITE, &[fd, u64::from(BUF), 11]), 11);
    assert_eq!(t.syscall(nr::CLOSE, &[fd]), 0);
    assert_eq!(fs::read_to_string(&file).unwrap(), "from target");

    // The freed slot is reused.
    let fd = t.syscall(nr::OPENAT, &[AT_FDCWD, u64::from(PATH), len, 0, 0]);
    assert_eq!(fd, 3);
    assert_eq!(t.syscall(nr::READ, &[fd, 0x1000, 64]), 11);
    let mut back = [0u8; 11];
    t.mem.read_bytes(0x1000, &mut back).unwrap();
    assert_eq!(&back, b"from target");
    assert_eq!(t.syscall(nr::READ, &[fd, 0x1000, 64]), 0);
}

#[test]
fn test_exclusive_create_fails_on_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("exists.txt");
    fs::write(&file, b"x").unwrap();
    let path = file.to_str().unwrap();

    let mut t = Target::new();
    write_c_string(&mut t.mem, PATH, path);
    let excl = flags::O_WRONLY | flags::O_CREAT | flags::O_EXCL;
    assert_eq!(
        t.syscall(
            nr::OPENAT,
            &[AT_FDCWD, u64::from(PATH), path.len() as u64 + 1, excl, 0o644]
        ),
        errno(libc::EEXIST)
    );
}

#[test]
fn test_non_syscall_command_is_ignored() {
    let mut t = Target::new();
    write_command_block(&mut t.mem, BLOCK, nr::WRITE, &[1, u64::from(BUF), 1]);
    t.mem
        .write_u64(TOHOST, Command::new(0, 1, u64::from(BLOCK)).raw())
        .unwrap();
    t.htif.service_step(&mut t.mem).unwrap();

    assert_eq!(t.mem.read_u64(BLOCK).unwrap(), nr::WRITE);
    assert_eq!(t.mem.read_u64(FROMHOST).unwrap(), 0);
    assert!(t.console.text().is_empty());
}

#[test]
fn test_command_block_out_of_range_is_reported() {
    let mut t = Target::new();
    t.mem.write_u64(TOHOST, 0xFFFF_FFF0).unwrap();
    let err = t.htif.service_step(&mut t.mem).unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(t.mem.read_u64(TOHOST).unwrap(), 0);
}
