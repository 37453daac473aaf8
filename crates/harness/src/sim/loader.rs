//! Program Image Loader.
//!
//! This module places target programs into simulated memory. It performs:
//! 1. **Symbol extraction:** Reads the entry point and every named symbol from an ELF image.
//! 2. **Segment loading:** Copies `PT_LOAD` segments in 64-byte chunks, zero-filling up to
//!    the in-memory size and skipping chunks that overlap preloaded ranges.
//! 3. **Reset vector:** Writes the trampoline ROM that jumps to the entry point.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use object::{Object, ObjectSegment, ObjectSymbol, SymbolKind};
use tracing::debug;

use crate::common::constants::LOAD_CHUNK;
use crate::common::error::{Result, SimError};
use crate::config::PreloadRange;
use crate::mem::{MemoryPort, target_addr};

/// `auipc t0, 0`
const AUIPC_T0: u32 = 0x0000_0297;
/// `lw t0, 24(t0)`
const LW_T0_24: u32 = 0x0182_a283;
/// `jr t0`
const JR_T0: u32 = 0x0002_8067;

/// Entry point and symbols of a loaded image.
#[derive(Clone, Debug, Default)]
pub struct ElfImage {
    /// ELF entry point.
    pub entry: u64,
    /// Every named symbol, by name.
    pub symbols: BTreeMap<String, u64>,
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| SimError::io(path, e))
}

fn parse<'a>(path: &Path, data: &'a [u8]) -> Result<object::File<'a>> {
    object::File::parse(data).map_err(|e| SimError::Image {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn image_err(path: &Path, e: &object::Error) -> SimError {
    SimError::Image {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn collect_symbols(path: &Path, file: &object::File<'_>) -> Result<BTreeMap<String, u64>> {
    let mut symbols = BTreeMap::new();
    for symbol in file.symbols() {
        if matches!(symbol.kind(), SymbolKind::File | SymbolKind::Section) {
            continue;
        }
        let name = symbol.name().map_err(|e| image_err(path, &e))?;
        if name.is_empty() {
            continue;
        }
        let _ = symbols.entry(name.to_owned()).or_insert(symbol.address());
    }
    Ok(symbols)
}

/// Reads the entry point and symbol table of an ELF image.
///
/// # Arguments
///
/// * `path` - ELF file (32- or 64-bit).
///
/// # Returns
///
/// The entry point and a name-to-address map of every named symbol.
///
/// # Errors
///
/// [`SimError::Io`] if the file cannot be read, [`SimError::Image`] if it does not parse.
pub fn load_symbols(path: &Path) -> Result<(u64, BTreeMap<String, u64>)> {
    let data = read_file(path)?;
    let file = parse(path, &data)?;
    Ok((file.entry(), collect_symbols(path, &file)?))
}

/// Walks the loadable segments of an ELF image.
///
/// `write` is called with a target address and at most 64 bytes, in ascending
/// address order per segment. Bytes between the file size and the memory size
/// of a segment are delivered as zeros.
///
/// # Errors
///
/// I/O and parse errors for the image, or whatever `write` returns.
pub fn load_segments(
    path: &Path,
    mut write: impl FnMut(u64, &[u8]) -> Result<()>,
) -> Result<()> {
    let data = read_file(path)?;
    let file = parse(path, &data)?;
    for_each_chunk(path, &file, &mut write)
}

fn for_each_chunk(
    path: &Path,
    file: &object::File<'_>,
    write: &mut dyn FnMut(u64, &[u8]) -> Result<()>,
) -> Result<()> {
    const ZEROS: [u8; LOAD_CHUNK] = [0; LOAD_CHUNK];

    for segment in file.segments() {
        let base = segment.address();
        let bytes = segment.data().map_err(|e| image_err(path, &e))?;
        let mem_size = segment.size().max(bytes.len() as u64);
        debug!(
            "segment {base:#010x}: {} file bytes, {mem_size} memory bytes",
            bytes.len()
        );

        let mut offset = 0u64;
        for chunk in bytes.chunks(LOAD_CHUNK) {
            write(base + offset, chunk)?;
            offset += chunk.len() as u64;
        }
        while offset < mem_size {
            let n = (mem_size - offset).min(LOAD_CHUNK as u64) as usize;
            write(base + offset, &ZEROS[..n])?;
            offset += n as u64;
        }
    }
    Ok(())
}

/// Loads an ELF image into `mem`, leaving preloaded ranges untouched.
///
/// # Arguments
///
/// * `path` - ELF file.
/// * `mem` - Target memory.
/// * `preloaded` - Ranges already populated through a side channel; any chunk
///   overlapping one of them is skipped.
///
/// # Returns
///
/// The image's entry point and symbols.
///
/// # Errors
///
/// I/O and parse errors for the image; [`SimError::Range`] for a segment
/// outside the 32-bit address space.
pub fn load_elf(
    path: &Path,
    mem: &mut dyn MemoryPort,
    preloaded: &[PreloadRange],
) -> Result<ElfImage> {
    let data = read_file(path)?;
    let file = parse(path, &data)?;

    let mut skipped = 0usize;
    for_each_chunk(path, &file, &mut |addr, chunk| {
        let len = chunk.len() as u64;
        if preloaded.iter().any(|r| r.overlaps(addr, len)) {
            skipped += 1;
            return Ok(());
        }
        mem.write_bytes(target_addr(addr, len)?, chunk)
    })?;
    if skipped > 0 {
        debug!("skipped {skipped} preloaded chunks of '{}'", path.display());
    }

    Ok(ElfImage {
        entry: file.entry(),
        symbols: collect_symbols(path, &file)?,
    })
}

/// Writes the reset-vector trampoline at `base`.
///
/// The ROM loads the low 32 bits of `entry` from its own seventh word and jumps there:
///
/// ```text
/// base + 0x00: auipc t0, 0
/// base + 0x04: lw    t0, 24(t0)
/// base + 0x08: jr    t0
/// base + 0x0c: 0, 0, 0
/// base + 0x18: entry[31:0]
/// ```
///
/// # Errors
///
/// [`SimError::Range`] if the ROM does not fit below `2^32`.
pub fn install_reset_vector(mem: &mut dyn MemoryPort, base: u64, entry: u64) -> Result<()> {
    let words = [AUIPC_T0, LW_T0_24, JR_T0, 0, 0, 0, entry as u32];
    let mut rom = [0u8; 28];
    for (dst, word) in rom.chunks_exact_mut(4).zip(words) {
        dst.copy_from_slice(&word.to_le_bytes());
    }
    mem.write_bytes(target_addr(base, rom.len() as u64)?, &rom)?;
    debug!("reset vector at {base:#x} -> {entry:#x}");
    Ok(())
}
