//! Swap file naming and page I/O.
//!
//! Every evicted page gets its own file in the root directory, named from
//! the owning pid and the page's virtual address, holding exactly one page
//! of raw bytes.

use alloc::format;
use alloc::string::String;

use super::SwapError;
use crate::config::{PAGE_SIZE, ROOT_PATH, SWAP_FILE_SUFFIX};
use crate::process::Pid;
use crate::vfs::{FileSystem, OpenFlags, Transaction};

/// Backing file name for page `va` of process `pid`.
///
/// Both numbers are written in decimal around a separator that is not a
/// digit, so distinct `(pid, va)` pairs never share a name.
pub fn swap_file_name(pid: Pid, va: usize) -> String {
    format!("{}{}_{}{}", ROOT_PATH, pid, va, SWAP_FILE_SUFFIX)
}

/// Page-sized reads and writes against the filesystem.
pub struct SwapStore<'a, F: FileSystem> {
    fs: &'a F,
}

impl<'a, F: FileSystem> SwapStore<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        SwapStore { fs }
    }

    /// Open `name` for writing, creating it if needed.
    pub fn create(&self, name: &str) -> Result<F::File, SwapError> {
        let _op = Transaction::begin(self.fs);
        self.fs
            .open(name, OpenFlags::RDWR | OpenFlags::CREATE)
            .map_err(SwapError::Fs)
    }

    /// Open an existing swap file for reading.
    pub fn open(&self, name: &str) -> Result<F::File, SwapError> {
        self.fs.open(name, OpenFlags::RDONLY).map_err(SwapError::Fs)
    }

    /// Write one page.
    pub fn write_page(&self, file: &mut F::File, page: &[u8]) -> Result<(), SwapError> {
        let written = self.fs.write(file, &page[..PAGE_SIZE]).map_err(SwapError::Fs)?;
        if written != PAGE_SIZE {
            return Err(SwapError::ShortTransfer {
                expected: PAGE_SIZE,
                actual: written,
            });
        }
        Ok(())
    }

    /// Read one page.
    pub fn read_page(&self, file: &mut F::File, page: &mut [u8]) -> Result<(), SwapError> {
        let read = self.fs.read(file, &mut page[..PAGE_SIZE]).map_err(SwapError::Fs)?;
        if read != PAGE_SIZE {
            return Err(SwapError::ShortTransfer {
                expected: PAGE_SIZE,
                actual: read,
            });
        }
        Ok(())
    }

    pub fn close(&self, file: F::File) {
        self.fs.close(file);
    }
}
