//! Destination file: open without truncation, preallocate, map the region
//! still to be written, flush and truncate.

use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("no space for {size} bytes in {}: {source}", path.display())]
    NoSpace {
        path: PathBuf,
        size: u64,
        source: io::Error,
    },
    #[error("cannot map {len} bytes at offset {offset}: {source}")]
    Map { offset: u64, len: u64, source: io::Error },
    #[error("flushing {} failed: {source}", path.display())]
    Flush { path: PathBuf, source: io::Error },
    #[error("cannot truncate {} to {size} bytes: {source}", path.display())]
    Truncate {
        path: PathBuf,
        size: u64,
        source: io::Error,
    },
}

/// System page size; mapping offsets must be multiples of it.
pub fn page_size() -> u64 {
    #[cfg(unix)]
    {
        let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if n > 0 {
            return n as u64;
        }
    }
    4096
}

pub fn align_down(offset: u64, page: u64) -> u64 {
    offset - offset % page
}

/// The local copy of the file being downloaded.
#[derive(Debug)]
pub struct Destination {
    file: File,
    path: PathBuf,
    local_size: u64,
}

impl Destination {
    /// Opens or creates `path` read-write, keeping existing content. Its
    /// current length is the resume offset.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let open_err = |source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(open_err)?;
        let local_size = file.metadata().map_err(open_err)?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            local_size,
        })
    }

    /// Opens `path` without read access, so mapping it fails.
    #[cfg(test)]
    pub(crate) fn open_unmappable(path: &Path) -> io::Result<Self> {
        let file = File::options().write(true).create(true).truncate(false).open(path)?;
        let local_size = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            local_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn local_size(&self) -> u64 {
        self.local_size
    }

    /// Reserves blocks for the whole file. Tries `posix_fallocate` first,
    /// then plain `set_len`.
    pub fn preallocate(&self, total: u64) -> Result<(), StorageError> {
        #[cfg(unix)]
        {
            let r = unsafe { libc::posix_fallocate(self.file.as_raw_fd(), 0, total as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            if r == libc::ENOSPC || r == libc::EFBIG {
                return Err(StorageError::NoSpace {
                    path: self.path.clone(),
                    size: total,
                    source: io::Error::from_raw_os_error(r),
                });
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        if self.file.metadata().map(|m| m.len() >= total).unwrap_or(false) {
            return Ok(());
        }
        self.file.set_len(total).map_err(|source| StorageError::NoSpace {
            path: self.path.clone(),
            size: total,
            source,
        })
    }

    /// Maps `[align_down(offset), total)` read-write.
    pub fn map_from(&self, offset: u64, total: u64) -> Result<MappedRegion, StorageError> {
        let base = align_down(offset, page_size());
        let len = total.saturating_sub(base);
        let map_err = |source| StorageError::Map {
            offset: base,
            len,
            source,
        };
        let len_usize = usize::try_from(len)
            .map_err(|_| map_err(io::Error::new(io::ErrorKind::InvalidInput, "region too large")))?;
        // The file is owned by this process for the duration of the download.
        let map = unsafe {
            MmapOptions::new()
                .offset(base)
                .len(len_usize)
                .map_mut(&self.file)
        }
        .map_err(map_err)?;
        tracing::debug!(base, len, "destination mapped");
        Ok(MappedRegion {
            map,
            base,
            path: self.path.clone(),
        })
    }

    pub fn truncate(&self, size: u64) -> Result<(), StorageError> {
        self.file.set_len(size).map_err(|source| StorageError::Truncate {
            path: self.path.clone(),
            size,
            source,
        })
    }
}

/// Writable view of the destination starting at a page-aligned file offset.
pub struct MappedRegion {
    map: MmapMut,
    base: u64,
    path: PathBuf,
}

impl MappedRegion {
    /// File offset of the first mapped byte.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Bytes from file offset `offset` to the end of the mapping.
    pub fn tail_mut(&mut self, offset: u64) -> &mut [u8] {
        let start = (offset.saturating_sub(self.base) as usize).min(self.map.len());
        &mut self.map[start..]
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.map.flush().map_err(|source| StorageError::Flush {
            path: self.path.clone(),
            source,
        })
    }
}
