//! Zip archives, read through a shared memory map.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::zip::result::ZipError;
use ::zip::{CompressionMethod, ZipArchive};
use memmap2::Mmap;

use super::{Container, ContainerOpener, OpenError};
use crate::stream::EntryRead;

/// A reference-counted memory map, shared by the archive and every stream
/// handed out from it.
#[derive(Clone)]
struct SharedMap(Arc<Mmap>);

impl AsRef<[u8]> for SharedMap {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A byte range of the mapped archive, holding the stored bytes of one entry.
#[derive(Clone)]
struct EntryWindow {
    map: SharedMap,
    start: usize,
    end: usize,
}

impl AsRef<[u8]> for EntryWindow {
    fn as_ref(&self) -> &[u8] {
        &self.map.as_ref()[self.start..self.end]
    }
}

pub struct ZipContainer {
    path: PathBuf,
    map: SharedMap,
    archive: ZipArchive<Cursor<SharedMap>>,
    names: HashSet<String>,
}

impl ZipContainer {
    /// Maps the file at `path` and reads its central directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ZipContainer, OpenError> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // Safety: the mapping is read-only. Archives are expected to stay
        // unmodified while they are registered.
        let map = SharedMap(Arc::new(unsafe { Mmap::map(&file)? }));

        let archive = ZipArchive::new(Cursor::new(map.clone())).map_err(|e| match e {
            ZipError::Io(e) => OpenError::Io(e),
            e => OpenError::Corrupt(e),
        })?;
        let names = archive.file_names().map(str::to_string).collect();

        Ok(ZipContainer {
            path: path.to_path_buf(),
            map,
            archive,
            names,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl fmt::Debug for ZipContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipContainer")
            .field("path", &self.path)
            .field("entries", &self.names.len())
            .field("mapped_bytes", &self.map.as_ref().len())
            .finish()
    }
}

/// Upper bound on memory reserved up front from an entry's declared size.
const MAX_PREALLOC: u64 = 1 << 20;

/// The declared size comes from the archive and is not trusted.
fn capacity_hint(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

fn into_io_error(err: ZipError) -> std::io::Error {
    match err {
        ZipError::Io(e) => e,
        ZipError::FileNotFound => {
            std::io::Error::new(std::io::ErrorKind::NotFound, "entry not found in archive")
        }
        e => std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    }
}

impl Container for ZipContainer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entry_names(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.names.iter().map(String::as_str))
    }

    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn read(&self, name: &str) -> std::io::Result<Vec<u8>> {
        // Clones share the central directory and the mapping, so every read
        // gets its own cursor and no lock is needed.
        let mut archive = self.archive.clone();
        let mut file = archive.by_name(name).map_err(into_io_error)?;
        let mut buf = Vec::with_capacity(capacity_hint(file.size()));
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn open_stream(&self, name: &str) -> Option<std::io::Result<Box<dyn EntryRead>>> {
        let mut archive = self.archive.clone();
        let (start, len, crc) = match archive.by_name(name) {
            Ok(file) => {
                if file.compression() != CompressionMethod::Stored || file.encrypted() {
                    return None;
                }
                (file.data_start(), file.size(), file.crc32())
            }
            Err(e) => return Some(Err(into_io_error(e))),
        };

        let total = self.map.as_ref().len() as u64;
        let end = match start.checked_add(len) {
            Some(end) if end <= total => end,
            _ => {
                return Some(Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "entry data extends past the end of the archive",
                )))
            }
        };

        let window = EntryWindow {
            map: self.map.clone(),
            start: start as usize,
            end: end as usize,
        };

        // The window bypasses the zip reader, so its checksum is verified here.
        if crc32fast::hash(window.as_ref()) != crc {
            return Some(Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("checksum mismatch for entry `{}`", name),
            )));
        }

        Some(Ok(Box::new(Cursor::new(window))))
    }
}

/// Opens archives as [`ZipContainer`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipOpener;

impl ContainerOpener for ZipOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn Container>, OpenError> {
        Ok(Arc::new(ZipContainer::open(path)?))
    }
}
