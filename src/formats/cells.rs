//! Partition store - `cells.bin`
//!
//! ```text
//! Header (24 bytes):   magic "CEL1", version 1, entry_size 5, entry_count = nodes
//! Entries (5 bytes):   cell_id u32 (u32::MAX = no cell), border u8
//! Footer:              crc64 u64
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use butterfly_common::{Error, Result};

use super::crc::{ChecksumReader, ChecksumWriter, StoreHeader};
use super::write_atomically;
use crate::partition::CellStorage;

const MAGIC: u32 = 0x4345_4C31; // "CEL1"
const VERSION: u16 = 1;
const ENTRY_SIZE: u32 = 5;

pub const FILE_NAME: &str = "cells.bin";

pub struct CellsFile;

impl CellsFile {
    pub fn write(path: &Path, cells: &CellStorage) -> Result<()> {
        write_atomically(path, |file| {
            let mut w = ChecksumWriter::new(BufWriter::new(file));
            let header = StoreHeader {
                magic: MAGIC,
                version: VERSION,
                entry_size: ENTRY_SIZE,
                entry_count: cells.cell_array().len() as u64,
            };
            w.write_bytes(&header.to_bytes())?;
            for (&cell, &border) in cells.cell_array().iter().zip(cells.border_array()) {
                w.write_u32(cell)?;
                w.write_u8(border as u8)?;
            }
            w.finish()?;
            Ok(())
        })
    }

    pub fn read(path: &Path) -> Result<CellStorage> {
        let file = File::open(path)?;
        let mut r = ChecksumReader::new(BufReader::new(file), path);

        let header = r.read_header()?;
        header.expect(path, MAGIC, VERSION, ENTRY_SIZE)?;
        if header.entry_count > u32::MAX as u64 {
            return Err(Error::invalid_format(path, "node count exceeds u32"));
        }

        let n = header.entry_count as usize;
        let mut cell_of = Vec::with_capacity(n.min(1 << 24));
        let mut border = Vec::with_capacity(n.min(1 << 24));
        for _ in 0..n {
            cell_of.push(r.read_u32()?);
            border.push(r.read_u8()? != 0);
        }
        r.verify()?;

        CellStorage::with_borders(cell_of, border)
    }
}
