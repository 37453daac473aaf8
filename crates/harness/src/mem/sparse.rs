//! Sparse Bucket Memory.
//!
//! The target sees a flat 4 GiB byte space, but only the parts it actually writes are backed
//! by host memory. This module provides:
//! 1. **Lazy Allocation:** 1 KiB zeroed buckets created on first write and kept for the run.
//! 2. **Range Access:** Byte-range read/write spanning any number of buckets.
//! 3. **File Transfer:** Raw image load and dump.
//! 4. **Introspection:** Iteration and printing of non-zero 32-byte lines.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use super::{MemoryPort, check_range};
use crate::common::constants::{BUCKET_BITS, BUCKET_SIZE, BYTE_GROUP, LINE_BYTES};
use crate::common::error::{Result, SimError};

/// Stand-in for buckets that were never written.
static ZERO_BUCKET: [u8; BUCKET_SIZE] = [0; BUCKET_SIZE];

/// One allocated 1 KiB chunk of target memory.
#[derive(Debug)]
struct Bucket {
    /// Bucket number (`addr >> BUCKET_BITS`).
    id: u32,
    data: Box<[u8; BUCKET_SIZE]>,
}

impl Bucket {
    fn new(id: u32) -> Self {
        Self {
            id,
            data: Box::new([0; BUCKET_SIZE]),
        }
    }

    /// Address of the first byte held by this bucket.
    const fn base(&self) -> u32 {
        self.id << BUCKET_BITS
    }
}

/// Sparse 4 GiB memory backed by lazily allocated buckets.
///
/// Untouched addresses read as zero. Buckets are kept in allocation order so
/// introspection output is stable for a given access sequence.
#[derive(Debug, Default)]
pub struct SparseMemory {
    /// Bucket number to position in `buckets`.
    index: HashMap<u32, usize>,
    buckets: Vec<Bucket>,
}

/// Splits `[addr, addr + len)` into per-bucket pieces.
///
/// Yields `(bucket id, offset in bucket, offset in range, piece length)`. The
/// walk is done in 64-bit arithmetic so a range ending exactly at `2^32` is fine.
fn pieces(addr: u32, len: usize) -> impl Iterator<Item = (u32, usize, usize, usize)> {
    let mut cur = u64::from(addr);
    let mut done = 0usize;
    std::iter::from_fn(move || {
        if done == len {
            return None;
        }
        let id = (cur >> BUCKET_BITS) as u32;
        let inner = (cur as usize) & (BUCKET_SIZE - 1);
        let n = (BUCKET_SIZE - inner).min(len - done);
        let piece = (id, inner, done, n);
        cur += n as u64;
        done += n;
        Some(piece)
    })
}

impl SparseMemory {
    /// Creates an empty memory; every address reads as zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buckets allocated so far.
    #[inline]
    pub fn allocated_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Drops every bucket, returning memory to the all-zero state.
    pub fn reset(&mut self) {
        self.index.clear();
        self.buckets.clear();
    }

    fn bucket(&self, id: u32) -> Option<&Bucket> {
        self.index.get(&id).map(|&slot| &self.buckets[slot])
    }

    fn bucket_mut(&mut self, id: u32) -> &mut Bucket {
        let buckets = &mut self.buckets;
        let slot = *self.index.entry(id).or_insert_with(|| {
            buckets.push(Bucket::new(id));
            buckets.len() - 1
        });
        &mut self.buckets[slot]
    }

    /// Copies a host file into memory starting at `base`.
    ///
    /// # Arguments
    ///
    /// * `path` - Raw image file.
    /// * `base` - Target address of the first byte.
    ///
    /// # Returns
    ///
    /// The number of bytes loaded.
    ///
    /// # Errors
    ///
    /// [`SimError::Io`] if the file cannot be read, [`SimError::Range`] if the
    /// image would run past the top of the address space (nothing is written).
    pub fn load_image(&mut self, path: &Path, base: u32) -> Result<usize> {
        let bytes = fs::read(path).map_err(|e| SimError::io(path, e))?;
        self.write_bytes(base, &bytes)?;
        info!(
            "loaded {} bytes from '{}' at {base:#010x}",
            bytes.len(),
            path.display()
        );
        Ok(bytes.len())
    }

    /// Writes `len` bytes starting at `addr` to a host file.
    ///
    /// Untouched bytes are written as zero and no bucket is allocated.
    ///
    /// # Errors
    ///
    /// [`SimError::Range`] on wrap (checked before the file is created),
    /// [`SimError::Io`] if the file cannot be created or written.
    pub fn dump(&self, path: &Path, addr: u32, len: usize) -> Result<()> {
        check_range(addr, len)?;
        let file = File::create(path).map_err(|e| SimError::io(path, e))?;
        let mut out = BufWriter::new(file);
        for (id, inner, _, n) in pieces(addr, len) {
            let src = self
                .bucket(id)
                .map_or(&ZERO_BUCKET[..n], |b| &b.data[inner..inner + n]);
            out.write_all(src).map_err(|e| SimError::io(path, e))?;
        }
        out.flush().map_err(|e| SimError::io(path, e))?;
        debug!("dumped {len} bytes at {addr:#010x} to '{}'", path.display());
        Ok(())
    }

    /// Iterates over every 32-byte line that holds at least one non-zero byte.
    ///
    /// Lines are produced bucket by bucket in allocation order, ascending
    /// within a bucket. Each item is the line address and its bytes.
    pub fn non_zero_lines(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        self.buckets.iter().flat_map(|bucket| {
            let base = bucket.base();
            bucket
                .data
                .chunks_exact(LINE_BYTES)
                .enumerate()
                .filter(|(_, line)| line.iter().any(|&b| b != 0))
                .map(move |(i, line)| (base + (i * LINE_BYTES) as u32, line))
        })
    }

    /// Prints every non-zero line as `0xAAAAAAAA     :  ` followed by the bytes
    /// in hex, with a space after each group of four.
    ///
    /// # Errors
    ///
    /// Propagates write errors from `out`.
    pub fn print_non_zero(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(
            out,
            "The memory holds: 1        2        3        4        5        6        7        8"
        )?;
        writeln!(out, "{}", "-".repeat(82))?;
        for (addr, line) in self.non_zero_lines() {
            write!(out, "{addr:#010x}     :  ")?;
            for (i, byte) in line.iter().enumerate() {
                write!(out, "{byte:02x}")?;
                if (i + 1) % BYTE_GROUP == 0 {
                    write!(out, " ")?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

impl MemoryPort for SparseMemory {
    fn read_bytes(&self, addr: u32, dst: &mut [u8]) -> Result<()> {
        check_range(addr, dst.len())?;
        for (id, inner, off, n) in pieces(addr, dst.len()) {
            let out = &mut dst[off..off + n];
            match self.bucket(id) {
                Some(b) => out.copy_from_slice(&b.data[inner..inner + n]),
                None => out.fill(0),
            }
        }
        Ok(())
    }

    fn write_bytes(&mut self, addr: u32, src: &[u8]) -> Result<()> {
        check_range(addr, src.len())?;
        for (id, inner, off, n) in pieces(addr, src.len()) {
            self.bucket_mut(id).data[inner..inner + n].copy_from_slice(&src[off..off + n]);
        }
        Ok(())
    }
}
