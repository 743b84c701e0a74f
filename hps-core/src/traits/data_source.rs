use std::path::Path;

use crate::errors::{HpsResult, LoadError};

/// Byte-level access to wherever sparse table files live.
pub trait DataSource: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Size of the file at `path` in bytes.
    fn file_size(&self, path: &Path) -> HpsResult<u64>;

    /// Fill `buf` from `path` starting at `offset`. Returns bytes read,
    /// which is short only at end of file.
    fn read_at(&self, path: &Path, offset: u64, buf: &mut [u8]) -> HpsResult<usize>;

    /// Read a whole file.
    fn read_all(&self, path: &Path) -> HpsResult<Vec<u8>> {
        let size = self.file_size(path)?;
        let len = usize::try_from(size).map_err(|_| LoadError::Io {
            path: path.to_path_buf(),
            reason: format!("{size} bytes does not fit in memory"),
        })?;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.read_at(path, filled as u64, &mut buf[filled..])?;
            if n == 0 {
                return Err(LoadError::Io {
                    path: path.to_path_buf(),
                    reason: format!("file shrank while reading: got {filled} of {len} bytes"),
                }
                .into());
            }
            filled += n;
        }
        Ok(buf)
    }
}
