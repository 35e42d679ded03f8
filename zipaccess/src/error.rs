use std::path::PathBuf;
use std::sync::Arc;

use crate::container::OpenError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Path is expected to have a .zip extension: `{}`", .path.display())]
    InvalidPath { path: PathBuf },

    #[error("Archive is not registered: `{}`", .path.display())]
    NotRegistered { path: PathBuf },

    #[error("Path does not point inside an archive: `{}`", .path.display())]
    NotArchivePath { path: PathBuf },

    #[error("No file name specified inside archive `{}`", .archive.display())]
    MissingEntryName { archive: PathBuf },

    #[error("Access to archive `{}` is not enabled", .archive.display())]
    ArchiveRefused { archive: PathBuf },

    #[error("Cannot open archive `{}`", .archive.display())]
    ArchiveOpenFailure {
        archive: PathBuf,
        #[source]
        source: Arc<OpenError>,
    },

    #[error("Entry `{entry}` not found in archive `{}`", .archive.display())]
    EntryNotFound { archive: PathBuf, entry: String },

    #[error("Archive entries require mode 'r' or 'rb', not '{mode}'")]
    UnsupportedMode { mode: String },

    #[error("Cannot read entry `{entry}` from archive `{}`", .archive.display())]
    ReadFailure {
        archive: PathBuf,
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for failures that mean "this path is not an archive
    /// entry". Callers fall back to the real filesystem on these.
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            Error::NotArchivePath { .. }
                | Error::MissingEntryName { .. }
                | Error::ArchiveRefused { .. }
                | Error::ArchiveOpenFailure { .. }
                | Error::EntryNotFound { .. }
        )
    }
}
