use std::path::Path;
use std::sync::Arc;

use relative_path::RelativePathBuf;

use crate::container::Container;
use crate::path::{self, Split};
use crate::registry::{ArchiveAccess, ArchiveRef, ArchiveRegistry, Refusal};
use crate::{Error, Result};

/// An entry known to exist in an opened archive.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    archive: ArchiveRef,
    entry: String,
    container: Arc<dyn Container>,
}

impl ResolvedEntry {
    pub(crate) fn new(
        archive: ArchiveRef,
        entry: String,
        container: Arc<dyn Container>,
    ) -> ResolvedEntry {
        ResolvedEntry {
            archive,
            entry,
            container,
        }
    }

    #[inline(always)]
    pub fn archive(&self) -> &ArchiveRef {
        &self.archive
    }

    /// The entry name, `/`-separated.
    #[inline(always)]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    #[inline(always)]
    pub fn container(&self) -> &dyn Container {
        &*self.container
    }
}

/// Decides whether a path names a readable archive entry.
pub struct EntryResolver<'a> {
    registry: &'a ArchiveRegistry,
}

impl<'a> EntryResolver<'a> {
    pub fn new(registry: &'a ArchiveRegistry) -> EntryResolver<'a> {
        EntryResolver { registry }
    }

    /// Resolves `path`, or `None` if it does not name an archive entry.
    #[inline(always)]
    pub fn locate<P: AsRef<Path>>(&self, path: P) -> Option<ResolvedEntry> {
        self.resolve(path).ok()
    }

    /// Resolves `path`, reporting why it is not an archive entry on failure.
    ///
    /// Every error returned here satisfies [`Error::is_unresolved`].
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> Result<ResolvedEntry> {
        let path = path.as_ref();
        let logger = &self.registry.options().logger;

        let (archive, entry) = match path::classify(path) {
            Split::Entry { archive, entry } => (ArchiveRef::from_canonical(archive), entry),
            Split::NoMarker => {
                return Err(Error::NotArchivePath {
                    path: path.to_path_buf(),
                })
            }
            Split::EmptyEntry { archive } => {
                logger.emit(|| {
                    tracing::warn!(
                        archive = %archive.display(),
                        "zip access fail: no file name specified"
                    )
                });
                return Err(Error::MissingEntryName { archive });
            }
        };

        let container = match self.registry.resolve_or_open(&archive) {
            ArchiveAccess::Opened(container) => container,
            ArchiveAccess::Refused(reason) => {
                logger.emit(|| {
                    tracing::warn!(archive = %archive, entry = %entry, %reason, "zip access fail")
                });
                let archive = archive.path().to_path_buf();
                return Err(match reason {
                    Refusal::NotRegistered => Error::ArchiveRefused { archive },
                    Refusal::Disabled(source) => Error::ArchiveOpenFailure { archive, source },
                });
            }
        };

        // Zip entry names always use `/`, whatever the host separator is.
        let name = match RelativePathBuf::from_path(&entry) {
            Ok(name) => name.as_str().to_string(),
            Err(_) => {
                logger.emit(|| {
                    tracing::warn!(archive = %archive, entry = %entry, "zip access miss")
                });
                return Err(Error::EntryNotFound {
                    archive: archive.path().to_path_buf(),
                    entry,
                });
            }
        };

        if name.is_empty() {
            logger.emit(|| {
                tracing::warn!(archive = %archive, "zip access fail: no file name specified")
            });
            return Err(Error::MissingEntryName {
                archive: archive.path().to_path_buf(),
            });
        }

        if !container.contains(&name) {
            logger.emit(|| tracing::warn!(archive = %archive, entry = %name, "zip access miss"));
            return Err(Error::EntryNotFound {
                archive: archive.path().to_path_buf(),
                entry: name,
            });
        }

        logger.emit(|| tracing::trace!(archive = %archive, entry = %name, "zip access test"));

        Ok(ResolvedEntry::new(archive, name, container))
    }
}
