//! Interface to the card filesystem collaborator.
//!
//! The FAT-like filesystem that turns paths into directory entries and
//! clusters lives outside this crate; the history engine only needs the small
//! contract below. [`MemCardFs`] is an in-memory implementation for tests and
//! host-side simulation.

pub mod mem;

pub use mem::MemCardFs;

use crate::error::Result;
use bitflags::bitflags;

bitflags! {
    /// Open-mode attribute flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttr: u32 {
        const READABLE = 0x01;
        const WRITABLE = 0x02;
        const CREATE   = 0x04;
    }
}

/// Opaque open-file handle issued by the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fd(pub u32);

/// Card filesystem operations consumed by the history engine.
///
/// Absence of a file or directory is reported as [`crate::Error::NotFound`];
/// the callers treat it as a bootstrap trigger, never as a failure.
pub trait CardFs {
    fn open(&mut self, path: &str, attr: FileAttr) -> Result<Fd>;

    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize>;

    fn close(&mut self, fd: Fd) -> Result<()>;

    fn mkdir(&mut self, path: &str) -> Result<()>;

    fn dir_exists(&mut self, path: &str) -> bool;

    /// Backing-store cluster of an open file's first extent.
    fn cluster_of(&mut self, fd: Fd) -> Result<u32>;

    /// Probe for a file by opening it readable and closing it again.
    fn file_exists(&mut self, path: &str) -> bool {
        match self.open(path, FileAttr::READABLE) {
            Ok(fd) => {
                let _ = self.close(fd);
                true
            }
            Err(_) => false,
        }
    }
}
