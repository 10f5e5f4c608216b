//! Stream copying, checksums and backup-file handling.

use crate::error::{Error, Result};
use crate::progress::Progress;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const COPY_BUFFER_SIZE: usize = 0x2000;

/// Copies `size` bytes from the current position of `input` to `output`.
///
/// The abort flag of `progress` is polled between buffer-sized chunks.
pub fn copy_range<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    size: u64,
    progress: &Progress,
) -> Result<()> {
    let mut buf = [0u8; COPY_BUFFER_SIZE];
    let mut remaining = size;
    while remaining > 0 {
        progress.check()?;
        let chunk = remaining.min(COPY_BUFFER_SIZE as u64) as usize;
        input.read_exact(&mut buf[..chunk])?;
        output.write_all(&buf[..chunk])?;
        remaining -= chunk as u64;
    }
    Ok(())
}

/// Reads `size` bytes starting at `offset` of `input`.
pub fn read_buffer<R: Read + Seek>(input: &mut R, offset: u64, size: u64) -> Result<Vec<u8>> {
    input.seek(SeekFrom::Start(offset))?;
    let cap = size.min(0x1000) as usize;
    let mut buf = Vec::with_capacity(cap);
    let n = std::io::copy(&mut input.take(size), &mut buf)?;
    if n != size {
        return Err(Error::Truncated);
    }
    Ok(buf)
}

fn ieee_table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = i as u32;
            for _ in 0..8 {
                crc = if crc & 1 != 0 { 0xEDB8_8320 ^ (crc >> 1) } else { crc >> 1 };
            }
            *entry = crc;
        }
        table
    })
}

/// Incremental CRC-32 (IEEE, reflected) as used by EBML CRC-32 elements.
#[derive(Debug, Clone, Copy)]
pub struct Crc32Ieee(u32);

impl Default for Crc32Ieee {
    fn default() -> Self {
        Self(0xFFFF_FFFF)
    }
}

impl Crc32Ieee {
    /// Starts a new computation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `data` into the checksum.
    pub fn update(&mut self, data: &[u8]) {
        let table = ieee_table();
        for &byte in data {
            self.0 = table[((self.0 ^ byte as u32) & 0xFF) as usize] ^ (self.0 >> 8);
        }
    }

    /// Finishes the computation.
    pub fn finish(self) -> u32 {
        self.0 ^ 0xFFFF_FFFF
    }
}

/// Computes the IEEE CRC-32 over `size` bytes read from the current
/// position of `input`.
pub fn read_crc32<R: Read>(input: &mut R, size: u64) -> Result<u32> {
    let mut crc = Crc32Ieee::new();
    let mut buf = [0u8; COPY_BUFFER_SIZE];
    let mut remaining = size;
    while remaining > 0 {
        let chunk = remaining.min(COPY_BUFFER_SIZE as u64) as usize;
        input.read_exact(&mut buf[..chunk])?;
        crc.update(&buf[..chunk]);
        remaining -= chunk as u64;
    }
    Ok(crc.finish())
}

fn ogg_table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = (i as u32) << 24;
            for _ in 0..8 {
                crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ 0x04C1_1DB7 } else { crc << 1 };
            }
            *entry = crc;
        }
        table
    })
}

/// Advances the Ogg page checksum (polynomial 0x04C11DB7, direct form,
/// seed 0, no reflection, no final XOR) over `data`.
pub fn ogg_crc_update(mut crc: u32, data: &[u8]) -> u32 {
    let table = ogg_table();
    for &byte in data {
        crc = (crc << 8) ^ table[(((crc >> 24) as u8) ^ byte) as usize];
    }
    crc
}

/// Derives a backup path next to `path` that does not collide with an
/// existing file, then moves the original there.
///
/// Returns the backup path and the backup file opened for reading. The
/// caller recreates `path` as the output file.
pub fn create_backup_file(path: &Path) -> Result<(PathBuf, File)> {
    let mut backup_path = PathBuf::from(path);
    backup_path.set_extension(join_extension(path, "bak"));
    let mut attempt = 0u32;
    while backup_path.exists() {
        attempt += 1;
        backup_path.set_extension(join_extension(path, &format!("bak{attempt}")));
    }
    fs::rename(path, &backup_path)?;
    let stream = File::open(&backup_path)?;
    Ok((backup_path, stream))
}

fn join_extension(path: &Path, suffix: &str) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.{suffix}"),
        None => suffix.to_string(),
    }
}

/// Discards a partially written output file at `path` and moves the backup
/// back into place. The output stream must be closed before calling this.
pub fn restore_original_file_from_backup(path: &Path, backup_path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    fs::rename(backup_path, path)?;
    Ok(())
}

/// Opens `path` for reading and writing without truncation, as needed by
/// the checksum patch pass after a rewrite.
pub fn open_read_write(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().read(true).write(true).open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn ieee_crc32_known_value() {
        // "123456789" is the standard check input for CRC-32/ISO-HDLC.
        let mut crc = Crc32Ieee::new();
        crc.update(b"123456789");
        assert_eq!(crc.finish(), 0xCBF4_3926);
    }

    #[test]
    fn ieee_crc32_incremental_matches_oneshot() {
        let mut a = Crc32Ieee::new();
        a.update(b"hello ");
        a.update(b"world");
        let mut b = Crc32Ieee::new();
        b.update(b"hello world");
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn ogg_crc_known_value() {
        // Poly 0x04C11DB7, init 0, no reflection, no final XOR; the
        // CRC-32/POSIX check value 0x765E7680 before its output inversion.
        assert_eq!(ogg_crc_update(0, b"123456789"), 0x89A1_897F);
    }

    #[test]
    fn copy_range_moves_exact_bytes() {
        let data: Vec<u8> = (0..=255).collect();
        let mut input = Cursor::new(data.clone());
        input.set_position(10);
        let mut out = Vec::new();
        copy_range(&mut input, &mut out, 20, &Progress::new()).unwrap();
        assert_eq!(out, &data[10..30]);
    }
}
