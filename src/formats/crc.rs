//! CRC-64-ISO checksums and the shared store framing
//!
//! Every binary store is laid out as
//!
//! ```text
//! Header (24 bytes, little-endian):
//!   magic:        u32
//!   version:      u16
//!   reserved:     u16
//!   entry_size:   u32
//!   reserved:     u32
//!   entry_count:  u64
//! Body (store specific)
//! Footer (8 bytes):
//!   crc64:        u64   // over header + body
//! ```

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crc::{Crc, CRC_64_GO_ISO};

use butterfly_common::{Error, Result};

/// CRC-64-ISO algorithm
pub static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

pub const HEADER_SIZE: usize = 24;

/// Compute CRC-64 checksum for a byte slice
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Incremental CRC-64 digest
pub struct Digest {
    digest: crc::Digest<'static, u64>,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            digest: CRC64.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed store header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub magic: u32,
    pub version: u16,
    pub entry_size: u32,
    pub entry_count: u64,
}

impl StoreHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.entry_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.entry_count.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            version: u16::from_le_bytes([buf[4], buf[5]]),
            entry_size: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            entry_count: u64::from_le_bytes([
                buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
            ]),
        }
    }

    /// Check magic, version and entry size against what the reader expects
    pub fn expect(&self, path: &Path, magic: u32, version: u16, entry_size: u32) -> Result<()> {
        if self.magic != magic {
            return Err(Error::invalid_format(
                path,
                format!("expected magic 0x{:08X}, got 0x{:08X}", magic, self.magic),
            ));
        }
        if self.version != version {
            return Err(Error::invalid_format(
                path,
                format!("unsupported version {} (expected {})", self.version, version),
            ));
        }
        if self.entry_size != entry_size {
            return Err(Error::invalid_format(
                path,
                format!("entry size {} (expected {})", self.entry_size, entry_size),
            ));
        }
        Ok(())
    }
}

/// Writer that checksums everything passing through it
pub struct ChecksumWriter<W: Write> {
    inner: W,
    digest: Digest,
}

impl<W: Write> ChecksumWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: Digest::new(),
        }
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.digest.update(data);
        self.inner.write_all(data)
    }

    pub fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.write_bytes(&[v])
    }

    pub fn write_u32(&mut self, v: u32) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_f64(&mut self, v: f64) -> io::Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Length-prefixed UTF-8 string
    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.write_u32(s.len() as u32)?;
        self.write_bytes(s.as_bytes())
    }

    /// Append the CRC-64 footer and flush
    pub fn finish(mut self) -> io::Result<W> {
        let crc = self.digest.finalize();
        self.inner.write_all(&crc.to_le_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Reader that checksums everything read through it.
///
/// Truncation is reported as `InvalidFormat`, never as a bare I/O error.
pub struct ChecksumReader<R: Read> {
    inner: R,
    digest: Digest,
    path: PathBuf,
}

impl<R: Read> ChecksumReader<R> {
    pub fn new(inner: R, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            digest: Digest::new(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::invalid_format(&self.path, "truncated file")
            } else {
                Error::Io(e)
            }
        })
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.fill(buf)?;
        self.digest.update(buf);
        Ok(())
    }

    pub fn read_header(&mut self) -> Result<StoreHeader> {
        let mut buf = [0u8; HEADER_SIZE];
        self.read_bytes(&mut buf)?;
        Ok(StoreHeader::from_bytes(&buf))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    pub fn read_str(&mut self, max_len: usize) -> Result<String> {
        let len = self.read_u32()? as usize;
        if len > max_len {
            return Err(Error::invalid_format(
                &self.path,
                format!("string length {len} exceeds {max_len}"),
            ));
        }
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf).map_err(|_| Error::invalid_format(&self.path, "invalid UTF-8"))
    }

    /// Read the footer and compare it with the running checksum.
    ///
    /// Trailing bytes after the footer are rejected.
    pub fn verify(mut self) -> Result<()> {
        let computed = std::mem::take(&mut self.digest).finalize();
        let mut footer = [0u8; 8];
        self.fill(&mut footer)?;
        let stored = u64::from_le_bytes(footer);
        if computed != stored {
            return Err(Error::ChecksumMismatch {
                path: self.path,
                expected: stored,
                actual: computed,
            });
        }
        let mut extra = [0u8; 1];
        if self.inner.read(&mut extra)? != 0 {
            return Err(Error::invalid_format(&self.path, "trailing bytes after footer"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc64_incremental() {
        let data = b"hello world";
        let mut digest = Digest::new();
        digest.update(&data[..5]);
        digest.update(&data[5..]);
        assert_eq!(digest.finalize(), checksum(data));
    }

    #[test]
    fn test_header_layout() {
        let header = StoreHeader {
            magic: 0x4543_4331,
            version: 3,
            entry_size: 13,
            entry_count: 7,
        };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], &0x4543_4331u32.to_le_bytes());
        assert_eq!(StoreHeader::from_bytes(&bytes), header);

        let path = Path::new("x.bin");
        assert!(header.expect(path, 0x4543_4331, 3, 13).is_ok());
        assert!(header.expect(path, 0x1111_1111, 3, 13).unwrap_err().is_corruption());
        assert!(header.expect(path, 0x4543_4331, 4, 13).unwrap_err().is_corruption());
    }

    #[test]
    fn test_writer_reader_agree() {
        let mut w = ChecksumWriter::new(Vec::new());
        w.write_u32(42).unwrap();
        w.write_f64(1.5).unwrap();
        w.write_str("fastest").unwrap();
        let bytes = w.finish().unwrap();

        let mut r = ChecksumReader::new(bytes.as_slice(), "mem");
        assert_eq!(r.read_u32().unwrap(), 42);
        assert_eq!(r.read_f64().unwrap(), 1.5);
        assert_eq!(r.read_str(64).unwrap(), "fastest");
        r.verify().unwrap();
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let mut w = ChecksumWriter::new(Vec::new());
        w.write_u64(0xDEAD_BEEF).unwrap();
        let mut bytes = w.finish().unwrap();
        bytes[2] ^= 0xFF;

        let mut r = ChecksumReader::new(bytes.as_slice(), "mem");
        r.read_u64().unwrap();
        assert!(matches!(r.verify(), Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_truncation_is_invalid_format() {
        let bytes = [1u8, 2];
        let mut r = ChecksumReader::new(&bytes[..], "mem");
        assert!(r.read_u32().unwrap_err().is_corruption());
    }
}
