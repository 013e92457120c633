//! Filesystem collaborator contract.
//!
//! The swap workers persist pages through ordinary files, and processes hold
//! open files and a working directory. Everything below the file handle is
//! the filesystem's business; the process core only needs the narrow
//! interface in [`FileSystem`].

use core::fmt;

use bitflags::bitflags;

bitflags! {
    /// File open flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Write only.
        const WRONLY = 0x001;
        /// Read and write.
        const RDWR = 0x002;
        /// Create the file if it does not exist.
        const CREATE = 0x200;
    }
}

impl OpenFlags {
    /// Read only; the absence of both access bits.
    pub const RDONLY: OpenFlags = OpenFlags::empty();

    pub fn readable(self) -> bool {
        !self.contains(OpenFlags::WRONLY)
    }

    pub fn writable(self) -> bool {
        self.intersects(OpenFlags::WRONLY | OpenFlags::RDWR)
    }

    pub fn create(self) -> bool {
        self.contains(OpenFlags::CREATE)
    }
}

/// Filesystem error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No such file.
    NotFound,
    /// The file was not opened for this kind of access.
    BadMode,
    /// The device failed.
    Io,
    /// Out of inodes or blocks.
    NoSpace,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotFound => write!(f, "no such file"),
            FsError::BadMode => write!(f, "file not open for this access"),
            FsError::Io => write!(f, "i/o error"),
            FsError::NoSpace => write!(f, "no space left"),
        }
    }
}

/// File and inode operations supplied by the platform.
pub trait FileSystem: Send + Sync {
    /// Open file; shared between descriptors by [`FileSystem::dup`].
    type File: Send;
    /// Counted reference to an inode.
    type Inode: Send;

    /// Deferred initialisation that needs a process context. Runs once, in
    /// the first process to be scheduled.
    fn init(&self) {}

    /// Start a filesystem transaction.
    fn begin_op(&self);

    /// Finish a filesystem transaction.
    fn end_op(&self);

    /// Open `path`. Creating a file must happen inside a transaction.
    fn open(&self, path: &str, flags: OpenFlags) -> Result<Self::File, FsError>;

    /// Read at the file offset, advancing it. Returns the bytes read.
    fn read(&self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, FsError>;

    /// Write at the file offset, advancing it. Returns the bytes written.
    fn write(&self, file: &mut Self::File, buf: &[u8]) -> Result<usize, FsError>;

    /// Another reference to the same open file.
    fn dup(&self, file: &Self::File) -> Self::File;

    /// Drop one reference to an open file.
    fn close(&self, file: Self::File);

    /// Resolve `path` to an inode.
    fn namei(&self, path: &str) -> Option<Self::Inode>;

    /// Another reference to the same inode.
    fn idup(&self, inode: &Self::Inode) -> Self::Inode;

    /// Drop one inode reference. Must run inside a transaction.
    fn iput(&self, inode: Self::Inode);
}

/// An open filesystem transaction; ends when dropped.
pub struct Transaction<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
}

impl<'a, F: FileSystem + ?Sized> Transaction<'a, F> {
    /// Start a transaction on `fs`.
    pub fn begin(fs: &'a F) -> Self {
        fs.begin_op();
        Transaction { fs }
    }
}

impl<F: FileSystem + ?Sized> Drop for Transaction<'_, F> {
    fn drop(&mut self) {
        self.fs.end_op();
    }
}
