//! Core CH store - `core.<weighting>.bin`
//!
//! ```text
//! Header (24 bytes):   magic "CCH1", version 1, entry_size 4, entry_count = nodes
//! Weighting name:      u32 length + UTF-8 bytes
//! n_base_edges:        u32
//! core_node_count:     u32
//! Levels:              entry_count × u32
//! Shortcuts:           u64 count, then (from u32, to u32, weight f64,
//!                      skipped u32 × 2, original_edges u32)
//! Arcs per node:       u32 out count, out arcs, u32 in count, in arcs;
//!                      arc = (id u32, node u32, weight f64, original_edges u32)
//! Footer:              crc64 u64
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use butterfly_common::{Error, Result};

use super::crc::{ChecksumReader, ChecksumWriter, StoreHeader};
use super::write_atomically;
use crate::core_ch::{ChArc, CoreChGraph, Shortcut};

const MAGIC: u32 = 0x4343_4831; // "CCH1"
const VERSION: u16 = 1;
const ENTRY_SIZE: u32 = 4;
const MAX_NAME_LEN: usize = 256;

pub struct CoreLevelsFile;

impl CoreLevelsFile {
    pub fn file_name(weighting: &str) -> String {
        format!("core.{weighting}.bin")
    }

    pub fn path(dir: &Path, weighting: &str) -> PathBuf {
        dir.join(Self::file_name(weighting))
    }

    pub fn write(path: &Path, ch: &CoreChGraph) -> Result<()> {
        if !ch.is_prepared() {
            return Err(Error::InvalidInput(
                "refusing to persist an unprepared core graph".to_string(),
            ));
        }
        write_atomically(path, |file| {
            let mut w = ChecksumWriter::new(BufWriter::new(file));
            let header = StoreHeader {
                magic: MAGIC,
                version: VERSION,
                entry_size: ENTRY_SIZE,
                entry_count: ch.n_nodes() as u64,
            };
            w.write_bytes(&header.to_bytes())?;
            w.write_str(ch.weighting())?;
            w.write_u32(ch.n_base_edges())?;
            w.write_u32(ch.core_node_count())?;

            for &level in ch.levels() {
                w.write_u32(level)?;
            }

            w.write_u64(ch.shortcuts().len() as u64)?;
            for s in ch.shortcuts() {
                w.write_u32(s.from)?;
                w.write_u32(s.to)?;
                w.write_f64(s.weight)?;
                w.write_u32(s.skipped[0])?;
                w.write_u32(s.skipped[1])?;
                w.write_u32(s.original_edges)?;
            }

            for node in 0..ch.n_nodes() {
                write_arcs(&mut w, ch.out_arcs(node))?;
                write_arcs(&mut w, ch.in_arcs(node))?;
            }
            w.finish()?;
            Ok(())
        })
    }

    pub fn read(path: &Path) -> Result<CoreChGraph> {
        let file = File::open(path)?;
        let mut r = ChecksumReader::new(BufReader::new(file), path);

        let header = r.read_header()?;
        header.expect(path, MAGIC, VERSION, ENTRY_SIZE)?;
        if header.entry_count >= u32::MAX as u64 {
            return Err(Error::invalid_format(path, "node count exceeds u32"));
        }
        let n = header.entry_count as usize;

        let weighting = r.read_str(MAX_NAME_LEN)?;
        let n_base_edges = r.read_u32()?;
        let core_node_count = r.read_u32()?;
        if core_node_count as usize > n {
            return Err(Error::invalid_format(
                path,
                format!("core node count {core_node_count} exceeds {n} nodes"),
            ));
        }

        let max_level = n as u32 + 1;
        let mut levels = Vec::with_capacity(n.min(1 << 24));
        for _ in 0..n {
            let level = r.read_u32()?;
            if level == 0 || level > max_level {
                return Err(Error::invalid_format(path, format!("level {level} out of range")));
            }
            levels.push(level);
        }

        let n_shortcuts = r.read_u64()?;
        if n_base_edges as u64 + n_shortcuts > u32::MAX as u64 {
            return Err(Error::invalid_format(path, "arc id space exceeds u32"));
        }
        let mut shortcuts = Vec::with_capacity((n_shortcuts as usize).min(1 << 20));
        for _ in 0..n_shortcuts {
            let from = r.read_u32()?;
            let to = r.read_u32()?;
            let weight = r.read_f64()?;
            let skipped = [r.read_u32()?, r.read_u32()?];
            let original_edges = r.read_u32()?;
            if from as usize >= n || to as usize >= n {
                return Err(Error::invalid_format(path, "shortcut endpoint out of range"));
            }
            shortcuts.push(Shortcut {
                from,
                to,
                weight,
                skipped,
                original_edges,
            });
        }

        let n_arcs = n_base_edges + shortcuts.len() as u32;
        let mut out_arcs = Vec::with_capacity(levels.len());
        let mut in_arcs = Vec::with_capacity(levels.len());
        for _ in 0..n {
            out_arcs.push(read_arcs(&mut r, n, n_arcs)?);
            in_arcs.push(read_arcs(&mut r, n, n_arcs)?);
        }
        r.verify()?;

        Ok(CoreChGraph::from_parts(
            weighting,
            n_base_edges,
            levels,
            core_node_count,
            shortcuts,
            out_arcs,
            in_arcs,
        ))
    }
}

fn write_arcs<W: Write>(w: &mut ChecksumWriter<W>, arcs: &[ChArc]) -> std::io::Result<()> {
    w.write_u32(arcs.len() as u32)?;
    for a in arcs {
        w.write_u32(a.id)?;
        w.write_u32(a.node)?;
        w.write_f64(a.weight)?;
        w.write_u32(a.original_edges)?;
    }
    Ok(())
}

fn read_arcs<R: std::io::Read>(
    r: &mut ChecksumReader<R>,
    n_nodes: usize,
    n_arcs: u32,
) -> Result<Vec<ChArc>> {
    let count = r.read_u32()? as usize;
    let mut arcs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let id = r.read_u32()?;
        let node = r.read_u32()?;
        let weight = r.read_f64()?;
        let original_edges = r.read_u32()?;
        if id >= n_arcs || node as usize >= n_nodes {
            let path = r.path().to_path_buf();
            return Err(Error::invalid_format(path, format!("arc {id} -> {node} out of range")));
        }
        arcs.push(ChArc {
            id,
            node,
            weight,
            original_edges,
        });
    }
    Ok(arcs)
}
