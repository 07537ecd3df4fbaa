//! On-disk formats
//!
//! Binary stores share the framing in [`crc`]: a 24-byte header, a store
//! specific body and a CRC-64 footer. Stores are written to a temporary file
//! and renamed into place, so readers never observe a half-written store.

use std::fs::File;
use std::path::{Path, PathBuf};

use butterfly_common::Result;
use tracing::debug;

pub mod cells;
pub mod core_levels;
pub mod crc;
pub mod eccentricity;
pub mod graph_json;

pub use cells::CellsFile;
pub use core_levels::CoreLevelsFile;
pub use eccentricity::EccentricityFile;
pub use graph_json::{FixtureEdge, GraphFixture};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Create `path` through a temporary sibling file and an atomic rename
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(File) -> Result<()>,
{
    let tmp = temp_path(path);
    let file = File::create(&tmp)?;
    if let Err(e) = write(file) {
        if let Err(cleanup) = std::fs::remove_file(&tmp) {
            debug!(path = %tmp.display(), error = %cleanup, "failed to remove temporary store");
        }
        return Err(e);
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");

        let result = write_atomically(&path, |_| {
            Err(butterfly_common::Error::InvalidInput("boom".into()))
        });
        assert!(result.is_err());
        assert!(!path.exists());
        assert!(!temp_path(&path).exists());

        write_atomically(&path, |mut f| {
            f.write_all(b"ok")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"ok");
    }

    #[test]
    fn test_write_error_survives_failed_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        let tmp = temp_path(&path);

        let result = write_atomically(&path, |file| {
            drop(file);
            std::fs::remove_file(&tmp)?;
            Err(butterfly_common::Error::InvalidInput("boom".into()))
        });
        assert!(matches!(result, Err(butterfly_common::Error::InvalidInput(_))));
        assert!(!path.exists());
    }
}
