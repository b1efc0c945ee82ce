//! Read-only file mapping
//!
//! Thin wrapper over `memmap2` so the loader never touches OS types. The
//! file handle is held together with the mapping and both are released by
//! `Drop`, which also makes teardown idempotent and covers every early
//! error path in the loaders.

use std::fs::File;
use std::path::Path;

use crate::error::{Result, TensoresError};

/// A read-only memory-mapped file.
#[derive(Debug)]
pub(crate) struct MmapFile {
    map: memmap2::Mmap,
    // Kept open until unmap. Some platforms tolerate closing the fd while
    // mapped; holding it is the conservative policy.
    _file: File,
}

impl MmapFile {
    /// Open `path` and map the whole file read-only.
    ///
    /// # Safety contract
    ///
    /// `memmap2` requires that the file is not truncated or modified while
    /// mapped (SIGBUS on Unix otherwise). The file is opened read-only and
    /// the single-writer assumption is the caller's.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|_| TensoresError::FileNotFound {
            path: path.to_path_buf(),
        })?;

        // SAFETY: read-only mapping of a file we just opened read-only.
        let map = unsafe {
            memmap2::MmapOptions::new()
                .map(&file)
                .map_err(|e| TensoresError::MmapFailed {
                    message: format!("Failed to mmap '{}': {e}", path.display()),
                })?
        };

        Ok(Self { map, _file: file })
    }

    /// The mapped bytes.
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.map
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_open_missing_file() {
        let err = MmapFile::open(Path::new("/nonexistent/tensores.safetensors")).unwrap_err();
        assert!(matches!(err, TensoresError::FileNotFound { .. }));
    }

    #[test]
    fn test_map_reads_file_contents() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"tensores mmap test").expect("write");
        file.flush().expect("flush");

        let map = MmapFile::open(file.path()).expect("map");
        assert_eq!(map.as_slice(), b"tensores mmap test");
    }
}
