//! Archive containers: the read side of a packaged file format.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::stream::EntryRead;

pub mod zip;

pub use self::zip::{ZipContainer, ZipOpener};

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("Failed to read archive file")]
    Io(#[from] std::io::Error),

    #[error("Invalid zip archive. Is this a valid .zip file?")]
    Corrupt(#[source] ::zip::result::ZipError),
}

/// An opened archive container.
///
/// Implementations must allow concurrent calls through a shared reference.
pub trait Container: fmt::Debug + Send + Sync {
    /// The path the container was opened from.
    fn path(&self) -> &Path;

    /// All entry names, using `/` as the separator.
    fn entry_names(&self) -> Box<dyn Iterator<Item = &str> + '_>;

    /// Exact, case-sensitive lookup of an entry name.
    fn contains(&self, name: &str) -> bool {
        self.entry_names().any(|x| x == name)
    }

    /// Reads the whole entry into memory.
    fn read(&self, name: &str) -> std::io::Result<Vec<u8>>;

    /// Opens a stream over the entry without reading it eagerly.
    ///
    /// Returns `None` when the container cannot stream this entry natively;
    /// callers then fall back to [`Container::read`].
    fn open_stream(&self, _name: &str) -> Option<std::io::Result<Box<dyn EntryRead>>> {
        None
    }
}

/// Opens containers on behalf of the registry.
pub trait ContainerOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn Container>, OpenError>;
}

impl<F> ContainerOpener for F
where
    F: Fn(&Path) -> Result<Arc<dyn Container>, OpenError> + Send + Sync,
{
    fn open(&self, path: &Path) -> Result<Arc<dyn Container>, OpenError> {
        self(path)
    }
}
