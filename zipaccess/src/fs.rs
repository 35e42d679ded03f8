//! The real filesystem, used whenever a path is not an archive entry.

use std::io;
use std::path::Path;

use crate::stream::{Access, OpenMode, Stream};

/// Extra settings passed through to [`Filesystem::open`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Permission bits for files created by the open (Unix only).
    pub create_mode: Option<u32>,
}

/// The filesystem calls that archive access falls back to.
///
/// Hosts that redirect their own `exists`/`is_file`/`open` entry points
/// implement this with their unredirected functions.
pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    fn open(&self, path: &Path, mode: OpenMode, options: &OpenOptions) -> io::Result<Stream>;
}

/// [`Filesystem`] backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn open(&self, path: &Path, mode: OpenMode, options: &OpenOptions) -> io::Result<Stream> {
        let mut opts = std::fs::OpenOptions::new();

        match mode.access {
            Access::Read => opts.read(true),
            Access::Write => opts.write(true).create(true).truncate(true),
            Access::Append => opts.append(true).create(true),
            Access::CreateNew => opts.write(true).create_new(true),
        };
        if mode.update {
            opts.read(true).write(true);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            if let Some(create_mode) = options.create_mode {
                opts.mode(create_mode);
            }
        }
        #[cfg(not(unix))]
        let _ = options;

        let file = opts.open(path)?;
        Ok(Stream::Filesystem(Box::new(file)))
    }
}
