//! Eccentricity store - `eccentricity.<weighting>.bin`
//!
//! ```text
//! Header (24 bytes):   magic "ECC1", version 1, entry_size 13, entry_count
//! Weighting name:      u32 length + UTF-8 bytes
//! Entries (13 bytes):  node u32, eccentricity f64, fully_reachable u8
//! Footer:              crc64 u64
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use butterfly_common::{Error, Result};

use super::crc::{ChecksumReader, ChecksumWriter, StoreHeader};
use super::write_atomically;
use crate::eccentricity::EccentricityStorage;

const MAGIC: u32 = 0x4543_4331; // "ECC1"
const VERSION: u16 = 1;
const ENTRY_SIZE: u32 = 13;
const MAX_NAME_LEN: usize = 256;

pub struct EccentricityFile;

impl EccentricityFile {
    pub fn file_name(weighting: &str) -> String {
        format!("eccentricity.{weighting}.bin")
    }

    pub fn path(dir: &Path, weighting: &str) -> PathBuf {
        dir.join(Self::file_name(weighting))
    }

    pub fn write(path: &Path, storage: &EccentricityStorage) -> Result<()> {
        write_atomically(path, |file| {
            let mut w = ChecksumWriter::new(BufWriter::new(file));
            let header = StoreHeader {
                magic: MAGIC,
                version: VERSION,
                entry_size: ENTRY_SIZE,
                entry_count: storage.len() as u64,
            };
            w.write_bytes(&header.to_bytes())?;
            w.write_str(storage.weighting())?;
            for (node, eccentricity, fully_reachable) in storage.iter() {
                w.write_u32(node)?;
                w.write_f64(eccentricity)?;
                w.write_u8(fully_reachable as u8)?;
            }
            w.finish()?;
            Ok(())
        })
    }

    pub fn read(path: &Path) -> Result<EccentricityStorage> {
        let file = File::open(path)?;
        let mut r = ChecksumReader::new(BufReader::new(file), path);

        let header = r.read_header()?;
        header.expect(path, MAGIC, VERSION, ENTRY_SIZE)?;
        let weighting = r.read_str(MAX_NAME_LEN)?;

        let mut entries = Vec::new();
        for _ in 0..header.entry_count {
            let node = r.read_u32()?;
            let eccentricity = r.read_f64()?;
            let flag = r.read_u8()?;
            if flag > 1 {
                return Err(Error::invalid_format(
                    path,
                    format!("fully_reachable flag {flag} for node {node}"),
                ));
            }
            entries.push((node, eccentricity, flag == 1));
        }
        r.verify()?;

        EccentricityStorage::from_entries(weighting, entries)
            .map_err(|e| Error::invalid_format(path, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EccentricityStorage {
        let mut storage = EccentricityStorage::create("shortest", vec![3, 8, 11]);
        storage.set(3, 2.0, true).unwrap();
        storage.set(8, 17.25, false).unwrap();
        storage.set(11, 0.0, true).unwrap();
        storage
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = EccentricityFile::path(dir.path(), "shortest");
        assert!(path.ends_with("eccentricity.shortest.bin"));

        let storage = sample();
        EccentricityFile::write(&path, &storage).unwrap();
        let loaded = EccentricityFile::read(&path).unwrap();

        assert_eq!(loaded.weighting(), "shortest");
        assert_eq!(
            loaded.iter().collect::<Vec<_>>(),
            storage.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = EccentricityFile::path(dir.path(), "shortest");
        EccentricityFile::write(&path, &sample()).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last_entry = bytes.len() - 8 - 5;
        bytes[last_entry] ^= 0x40;
        std::fs::write(&path, &bytes).unwrap();

        let err = EccentricityFile::read(&path).unwrap_err();
        assert!(err.is_corruption(), "unexpected error: {err}");
    }

    #[test]
    fn test_bad_magic_and_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = EccentricityFile::path(dir.path(), "shortest");
        EccentricityFile::write(&path, &sample()).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        std::fs::write(&path, &bad_magic).unwrap();
        assert!(EccentricityFile::read(&path).unwrap_err().is_corruption());

        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(EccentricityFile::read(&path).unwrap_err().is_corruption());
    }
}
