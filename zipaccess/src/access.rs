use std::path::Path;
use std::sync::Arc;

use crate::fs::{Filesystem, OpenOptions, StdFilesystem};
use crate::registry::ArchiveRegistry;
use crate::resolve::EntryResolver;
use crate::stream::{OpenMode, Stream, StreamFactory};
use crate::Result;

/// `exists`, `is_file` and `open` that see through zip archives.
///
/// Each call first tries to resolve the path as an archive entry. Paths that
/// do not resolve, for whatever reason, are handed to the [`Filesystem`]
/// unchanged. Once an entry has resolved it is authoritative: a failure to
/// open it is returned to the caller rather than retried on the real
/// filesystem.
#[derive(Debug)]
pub struct ZipAccess<F = StdFilesystem> {
    registry: Arc<ArchiveRegistry>,
    fs: F,
}

impl ZipAccess<StdFilesystem> {
    pub fn new(registry: Arc<ArchiveRegistry>) -> Self {
        Self::with_filesystem(registry, StdFilesystem)
    }
}

impl<F: Filesystem> ZipAccess<F> {
    pub fn with_filesystem(registry: Arc<ArchiveRegistry>, fs: F) -> Self {
        ZipAccess { registry, fs }
    }

    #[inline(always)]
    pub fn registry(&self) -> &Arc<ArchiveRegistry> {
        &self.registry
    }

    #[inline(always)]
    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    pub fn register_archive<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.registry.register(path)
    }

    pub fn unregister_archive<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.registry.unregister(path)
    }

    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        self.resolver().locate(path).is_some() || self.fs.exists(path)
    }

    /// Archive entries are always regular files.
    pub fn is_file<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        self.resolver().locate(path).is_some() || self.fs.is_file(path)
    }

    pub fn open<P: AsRef<Path>>(
        &self,
        path: P,
        mode: OpenMode,
        options: &OpenOptions,
    ) -> Result<Stream> {
        let path = path.as_ref();

        match self.resolver().locate(path) {
            Some(resolved) => StreamFactory::new(&self.registry.options().logger)
                .open_entry(&resolved, mode)
                .map(Stream::Archive),
            None => Ok(self.fs.open(path, mode, options)?),
        }
    }

    fn resolver(&self) -> EntryResolver<'_> {
        EntryResolver::new(&self.registry)
    }
}
