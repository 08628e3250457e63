//! # Host File Binding
//!
//! [`PagedFile`] wraps the blocking file handle behind the store. It
//! validates that the file length is a whole number of pages at open
//! time and transfers pages only as complete units: short reads and
//! writes are retried until the full page has moved, and a zero-length
//! transfer on a non-empty request is reported as
//! [`Error::UnexpectedIo`]. No partial page ever reaches the file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::page::Addr;

#[derive(Debug)]
pub struct PagedFile {
    file: File,
    page_size: usize,
}

impl PagedFile {
    /// Opens (or creates) the store file and returns it together with
    /// the number of whole pages it currently holds.
    pub fn open(path: &Path, page_size: usize, create: bool) -> Result<(Self, u32)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(path)?;

        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(Error::corrupt(format!(
                "file length {} is not a multiple of page size {}",
                len, page_size
            )));
        }

        let page_count = (len / page_size as u64) as u32;
        debug!(path = %path.display(), page_count, page_size, "opened store file");

        Ok((PagedFile { file, page_size }, page_count))
    }

    /// Reads the full page at `addr` into `buf`.
    pub fn read_page(&mut self, addr: Addr, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        self.file
            .seek(SeekFrom::Start(addr as u64 * self.page_size as u64))?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => return Err(Error::UnexpectedIo { addr }),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Writes the full page at `addr`. Writing past the current end of
    /// file extends it; skipped pages read back as zeroes.
    pub fn write_page(&mut self, addr: Addr, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        self.file
            .seek(SeekFrom::Start(addr as u64 * self.page_size as u64))?;

        let mut written = 0;
        while written < buf.len() {
            match self.file.write(&buf[written..]) {
                Ok(0) => return Err(Error::UnexpectedIo { addr }),
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Flushes the host file's buffers to the device.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pgs");

        let (_file, page_count) = PagedFile::open(&path, 256, true).unwrap();

        assert_eq!(page_count, 0);
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn open_missing_without_create_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.pgs");

        let result = PagedFile::open(&path, 256, false);

        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn open_rejects_torn_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("torn.pgs");
        std::fs::write(&path, vec![0u8; 300]).unwrap();

        let result = PagedFile::open(&path, 256, false);

        assert!(matches!(result, Err(Error::CorruptFile { .. })));
    }

    #[test]
    fn page_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pgs");
        let (mut file, _) = PagedFile::open(&path, 256, true).unwrap();

        let mut page = vec![0u8; 256];
        page[0] = 3;
        page[255] = 0xAB;
        file.write_page(2, &page).unwrap();

        // Pages 0 and 1 were skipped over and exist as zeroes.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * 256);

        let mut buf = vec![0u8; 256];
        file.read_page(2, &mut buf).unwrap();
        assert_eq!(buf, page);

        file.read_page(0, &mut buf).unwrap();
        assert_eq!(buf, vec![0u8; 256]);
    }

    #[test]
    fn read_past_end_reports_unexpected_io() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pgs");
        let (mut file, _) = PagedFile::open(&path, 256, true).unwrap();

        let mut buf = vec![0u8; 256];
        let result = file.read_page(0, &mut buf);

        assert!(matches!(result, Err(Error::UnexpectedIo { addr: 0 })));
    }
}
