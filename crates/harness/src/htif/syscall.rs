//! Syscall proxy (HTIF device 0).
//!
//! The target library cannot perform I/O on its own. It fills an 8-word command
//! block, writes the block address to `tohost`, and spins on `fromhost`. The proxy:
//! 1. **Exit:** Records odd payloads `(code << 1) | 1` as the exit request.
//! 2. **Decode:** Reads the syscall number and six arguments from the block.
//! 3. **Execute:** Performs the call against host files and console streams.
//! 4. **Reply:** Writes the result (or `-errno`) into word 0 and answers `1`.
//!
//! Target file descriptors are indices into a private table; 0, 1 and 2 are
//! pre-opened to the host console streams.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, trace, warn};

use super::command::Command;
use super::device::Device;
use crate::common::constants::COMMAND_WORDS;
use crate::common::error::Result;
use crate::mem::{MemoryPort, target_addr};

/// Value of the exit signal while the target is still running.
pub const NO_EXIT: u64 = u64::MAX;

/// Syscall numbers understood by the proxy.
pub mod nr {
    /// `openat(dirfd, path, path_len, flags, mode)`
    pub const OPENAT: u64 = 56;
    /// `close(fd)`
    pub const CLOSE: u64 = 57;
    /// `read(fd, buf, len)`
    pub const READ: u64 = 63;
    /// `write(fd, buf, len)`
    pub const WRITE: u64 = 64;
    /// `exit(code)`
    pub const EXIT: u64 = 93;
    /// `printstr(str)`: prints a NUL-terminated string.
    pub const PRINTSTR: u64 = 2012;
}

/// Open flags as encoded by the target C library.
pub mod flags {
    /// Access mode mask.
    pub const O_ACCMODE: u64 = 0o3;
    /// Write only.
    pub const O_WRONLY: u64 = 0o1;
    /// Read and write.
    pub const O_RDWR: u64 = 0o2;
    /// Create if missing.
    pub const O_CREAT: u64 = 0o100;
    /// Fail if the file exists (with `O_CREAT`).
    pub const O_EXCL: u64 = 0o200;
    /// Truncate to zero length.
    pub const O_TRUNC: u64 = 0o1000;
    /// Append on each write.
    pub const O_APPEND: u64 = 0o2000;
}

/// `dirfd` meaning "relative to the current directory".
const AT_FDCWD: i64 = -100;

/// Longest path accepted by `openat`.
const PATH_MAX: u64 = 4096;

/// Longest string printed by `printstr` before it gives up looking for the NUL.
const PRINTSTR_MAX: usize = 1 << 16;

/// Largest single `read`/`write` transfer.
const IO_MAX: u64 = 1 << 24;

type SysResult = std::result::Result<u64, i32>;

enum HostFd {
    Stdin,
    Stdout,
    Stderr,
    File(File),
}

/// Maps a host I/O error to the errno reported to the target.
fn host_errno(e: &io::Error) -> i32 {
    e.raw_os_error().unwrap_or(match e.kind() {
        ErrorKind::NotFound => libc::ENOENT,
        ErrorKind::PermissionDenied => libc::EACCES,
        ErrorKind::AlreadyExists => libc::EEXIST,
        ErrorKind::InvalidInput => libc::EINVAL,
        _ => libc::EIO,
    })
}

/// Proxies target syscalls to the host.
pub struct SyscallProxy {
    exit_signal: Arc<AtomicU64>,
    fds: Vec<Option<HostFd>>,
    console: Box<dyn Write + Send>,
}

impl std::fmt::Debug for SyscallProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyscallProxy")
            .field("exit_signal", &self.exit_signal.load(Ordering::Relaxed))
            .field("open_fds", &self.fds.iter().filter(|fd| fd.is_some()).count())
            .finish_non_exhaustive()
    }
}

impl SyscallProxy {
    /// Creates a proxy that reports exits through `exit_signal` and prints to stdout.
    pub fn new(exit_signal: Arc<AtomicU64>) -> Self {
        Self {
            exit_signal,
            fds: vec![
                Some(HostFd::Stdin),
                Some(HostFd::Stdout),
                Some(HostFd::Stderr),
            ],
            console: Box::new(io::stdout()),
        }
    }

    /// Replaces the sink used for fd 1 and `printstr`.
    #[must_use]
    pub fn with_console(mut self, console: Box<dyn Write + Send>) -> Self {
        self.console = console;
        self
    }

    fn record_exit(&self, raw: u64) {
        let code = raw >> 1;
        if code == 0 {
            info!("[htif] target exited successfully");
        } else {
            warn!("[htif] *** FAILED *** (tohost = {code})");
        }
        self.exit_signal.store(raw, Ordering::Relaxed);
    }

    fn alloc_fd(&mut self, fd: HostFd) -> u64 {
        if let Some(slot) = self.fds.iter().position(Option::is_none) {
            self.fds[slot] = Some(fd);
            slot as u64
        } else {
            self.fds.push(Some(fd));
            (self.fds.len() - 1) as u64
        }
    }

    fn fd_mut(fds: &mut [Option<HostFd>], fd: u64) -> std::result::Result<&mut HostFd, i32> {
        usize::try_from(fd)
            .ok()
            .and_then(|i| fds.get_mut(i))
            .and_then(Option::as_mut)
            .ok_or(libc::EBADF)
    }

    fn dispatch(&mut self, num: u64, args: &[u64; 6], mem: &mut dyn MemoryPort) -> SysResult {
        match num {
            nr::OPENAT => self.sys_openat(args, mem),
            nr::CLOSE => self.sys_close(args[0]),
            nr::READ => self.sys_read(args[0], args[1], args[2], mem),
            nr::WRITE => self.sys_write(args[0], args[1], args[2], mem),
            nr::EXIT => {
                self.record_exit((args[0] << 1) | 1);
                Ok(0)
            }
            nr::PRINTSTR => self.sys_printstr(args[0], mem),
            other => {
                warn!("[htif] unsupported syscall {other}");
                Err(libc::ENOSYS)
            }
        }
    }

    fn sys_openat(&mut self, args: &[u64; 6], mem: &mut dyn MemoryPort) -> SysResult {
        let [dirfd, path_ptr, path_len, oflags, mode, _] = *args;
        if dirfd as i64 != AT_FDCWD {
            return Err(libc::EBADF);
        }
        if path_len == 0 {
            return Err(libc::ENOENT);
        }
        if path_len > PATH_MAX {
            return Err(libc::ENAMETOOLONG);
        }

        let mut raw = vec![0u8; path_len as usize];
        let addr = target_addr(path_ptr, path_len).map_err(|_| libc::EFAULT)?;
        mem.read_bytes(addr, &mut raw).map_err(|_| libc::EFAULT)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let path = std::str::from_utf8(&raw[..end]).map_err(|_| libc::EINVAL)?;

        let access = oflags & flags::O_ACCMODE;
        let mut opts = OpenOptions::new();
        let _ = opts
            .read(access != flags::O_WRONLY)
            .write(access == flags::O_WRONLY || access == flags::O_RDWR)
            .append(oflags & flags::O_APPEND != 0)
            .truncate(oflags & flags::O_TRUNC != 0);
        if oflags & flags::O_CREAT != 0 {
            if oflags & flags::O_EXCL != 0 {
                let _ = opts.create_new(true);
            } else {
                let _ = opts.create(true);
            }
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let _ = opts.mode((mode & 0o777) as u32);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let file = opts.open(path).map_err(|e| host_errno(&e))?;
        let fd = self.alloc_fd(HostFd::File(file));
        trace!("[htif] openat '{path}' flags={oflags:#o} -> fd {fd}");
        Ok(fd)
    }

    fn sys_close(&mut self, fd: u64) -> SysResult {
        let _ = Self::fd_mut(&mut self.fds, fd)?;
        self.fds[fd as usize] = None;
        Ok(0)
    }

    fn sys_read(&mut self, fd: u64, buf: u64, len: u64, mem: &mut dyn MemoryPort) -> SysResult {
        let len = len.min(IO_MAX);
        let addr = target_addr(buf, len).map_err(|_| libc::EFAULT)?;
        let mut data = vec![0u8; len as usize];
        let n = match Self::fd_mut(&mut self.fds, fd)? {
            HostFd::Stdin => io::stdin().read(&mut data),
            HostFd::File(file) => file.read(&mut data),
            HostFd::Stdout | HostFd::Stderr => return Err(libc::EBADF),
        }
        .map_err(|e| host_errno(&e))?;
        mem.write_bytes(addr, &data[..n]).map_err(|_| libc::EFAULT)?;
        Ok(n as u64)
    }

    fn sys_write(&mut self, fd: u64, buf: u64, len: u64, mem: &mut dyn MemoryPort) -> SysResult {
        let len = len.min(IO_MAX);
        let addr = target_addr(buf, len).map_err(|_| libc::EFAULT)?;
        let mut data = vec![0u8; len as usize];
        mem.read_bytes(addr, &mut data).map_err(|_| libc::EFAULT)?;
        let console = &mut self.console;
        let result = match Self::fd_mut(&mut self.fds, fd)? {
            HostFd::Stdin => return Err(libc::EBADF),
            HostFd::Stdout => console.write_all(&data).and_then(|()| console.flush()),
            HostFd::Stderr => io::stderr().write_all(&data),
            HostFd::File(file) => file.write_all(&data),
        };
        result.map_err(|e| host_errno(&e))?;
        Ok(len)
    }

    fn sys_printstr(&mut self, ptr: u64, mem: &mut dyn MemoryPort) -> SysResult {
        let mut text = Vec::new();
        let mut byte = [0u8; 1];
        let mut cur = ptr;
        loop {
            let addr = target_addr(cur, 1).map_err(|_| libc::EFAULT)?;
            mem.read_bytes(addr, &mut byte).map_err(|_| libc::EFAULT)?;
            if byte[0] == 0 || text.len() == PRINTSTR_MAX {
                break;
            }
            text.push(byte[0]);
            cur += 1;
        }
        self.console
            .write_all(&text)
            .and_then(|()| self.console.flush())
            .map_err(|e| host_errno(&e))?;
        Ok(text.len() as u64)
    }
}

impl Device for SyscallProxy {
    fn name(&self) -> &'static str {
        "syscall_proxy"
    }

    fn handle(&mut self, cmd: &Command, mem: &mut dyn MemoryPort) -> Result<Option<u64>> {
        if cmd.cmd() != 0 {
            warn!("[htif] syscall proxy ignores command {cmd}");
            return Ok(None);
        }
        if cmd.is_exit() {
            self.record_exit(cmd.payload());
            return Ok(None);
        }

        let block = target_addr(cmd.payload(), (COMMAND_WORDS * 8) as u64)?;
        let mut words = [0u64; COMMAND_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            *word = mem.read_u64(block + (i * 8) as u32)?;
        }
        let num = words[0];
        let args = [words[1], words[2], words[3], words[4], words[5], words[6]];

        let ret = match self.dispatch(num, &args, mem) {
            Ok(v) => v,
            Err(errno) => (-i64::from(errno)) as u64,
        };
        trace!("[htif] syscall {num} args={args:x?} -> {:#x}", ret);
        mem.write_u64(block, ret)?;
        Ok(Some(1))
    }
}
