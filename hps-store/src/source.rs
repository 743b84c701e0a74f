//! Local filesystem data source.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use hps_core::errors::{HpsResult, LoadError};
use hps_core::traits::DataSource;

fn io_err(path: &Path, e: std::io::Error) -> LoadError {
    LoadError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Reads table files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSource;

impl DataSource for LocalFileSource {
    fn name(&self) -> &str {
        "local"
    }

    fn file_size(&self, path: &Path) -> HpsResult<u64> {
        let meta = std::fs::metadata(path).map_err(|e| io_err(path, e))?;
        if !meta.is_file() {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            }
            .into());
        }
        Ok(meta.len())
    }

    fn read_at(&self, path: &Path, offset: u64, buf: &mut [u8]) -> HpsResult<usize> {
        let mut file = File::open(path).map_err(|e| io_err(path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| io_err(path, e))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_err(path, e).into()),
            }
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_at_offset_and_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, [1u8, 2, 3, 4, 5]).unwrap();

        let source = LocalFileSource;
        assert_eq!(source.file_size(&path).unwrap(), 5);

        let mut buf = [0u8; 4];
        assert_eq!(source.read_at(&path, 3, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(source.read_all(&path).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn missing_file_names_path() {
        let err = LocalFileSource
            .file_size(Path::new("/nonexistent/key"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/key"));
    }

    #[test]
    fn directory_is_not_a_table_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalFileSource.file_size(dir.path()).is_err());
    }
}
