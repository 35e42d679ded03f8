//! The table of archives that may be read through, and their open handles.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::container::{Container, ContainerOpener, OpenError, ZipOpener};
use crate::options::AccessOptions;
use crate::path;
use crate::{Error, Result};

/// An archive, identified by its canonical path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveRef(PathBuf);

impl ArchiveRef {
    pub fn new<P: AsRef<Path>>(path: P) -> ArchiveRef {
        ArchiveRef(path::canonicalize(path))
    }

    pub(crate) fn from_canonical(path: PathBuf) -> ArchiveRef {
        ArchiveRef(path)
    }

    #[inline(always)]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ArchiveRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A snapshot of one archive's registration.
#[derive(Debug, Clone)]
pub enum ArchiveState {
    Unregistered,
    /// Registered, not opened yet.
    PendingOpen,
    Opened(Arc<dyn Container>),
    /// Opening failed; the failure is kept until the archive is unregistered.
    Disabled(Arc<OpenError>),
}

impl ArchiveState {
    pub fn is_registered(&self) -> bool {
        !matches!(self, ArchiveState::Unregistered)
    }
}

/// Why an archive may not be read through.
#[derive(Debug, Clone)]
pub enum Refusal {
    NotRegistered,
    Disabled(Arc<OpenError>),
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::NotRegistered => f.write_str("archive access not enabled"),
            Refusal::Disabled(e) => write!(f, "archive failed to open: {}", e),
        }
    }
}

/// The outcome of [`ArchiveRegistry::resolve_or_open`].
#[derive(Debug, Clone)]
pub enum ArchiveAccess {
    Opened(Arc<dyn Container>),
    Refused(Refusal),
}

type OpenResult = std::result::Result<Arc<dyn Container>, Arc<OpenError>>;

/// One registration. The cell is filled exactly once, by the first probe.
#[derive(Default)]
struct Slot {
    opened: OnceLock<OpenResult>,
}

/// Archives enabled for access, opened lazily and cached.
///
/// The table is guarded by a single lock that is held only for lookups and
/// updates. Opening an archive happens outside of it, once per registration:
/// concurrent first probes of the same archive wait for the one open in
/// progress instead of repeating it.
///
/// Handles stay valid for streams that were opened from them even after
/// [`unregister`](Self::unregister) or [`shutdown`](Self::shutdown).
pub struct ArchiveRegistry {
    options: AccessOptions,
    opener: Box<dyn ContainerOpener>,
    slots: Mutex<HashMap<ArchiveRef, Arc<Slot>>>,
}

impl ArchiveRegistry {
    /// Creates an empty registry that opens archives as zip files.
    pub fn new(options: AccessOptions) -> ArchiveRegistry {
        Self::with_opener(options, ZipOpener)
    }

    pub fn with_opener<O>(options: AccessOptions, opener: O) -> ArchiveRegistry
    where
        O: ContainerOpener + 'static,
    {
        ArchiveRegistry {
            options,
            opener: Box::new(opener),
            slots: Mutex::new(HashMap::new()),
        }
    }

    #[inline(always)]
    pub fn options(&self) -> &AccessOptions {
        &self.options
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ArchiveRef, Arc<Slot>>> {
        // Every update is a single map operation, so a poisoned table is
        // still consistent.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enables access to the archive at `path`.
    ///
    /// Registering an archive that is already known, whether pending,
    /// opened or disabled, changes nothing.
    pub fn register<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path::has_archive_extension(path) {
            return Err(Error::InvalidPath {
                path: path.to_path_buf(),
            });
        }

        let archive = ArchiveRef::new(path);
        {
            let mut slots = self.slots();
            if slots.contains_key(&archive) {
                return Ok(());
            }
            slots.insert(archive.clone(), Arc::default());
        }

        self.options
            .logger
            .emit(|| tracing::info!(archive = %archive, "zip access enable"));
        Ok(())
    }

    /// Removes the archive at `path`, dropping its handle and any cached
    /// failure.
    pub fn unregister<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let archive = ArchiveRef::new(path);

        let removed = self.slots().remove(&archive);
        match removed {
            Some(_) => {
                self.options
                    .logger
                    .emit(|| tracing::info!(archive = %archive, "zip access disable"));
                Ok(())
            }
            None => Err(Error::NotRegistered {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Forgets every archive and drops every handle.
    pub fn shutdown(&self) {
        let released = std::mem::take(&mut *self.slots());
        self.options.logger.emit(|| {
            tracing::debug!(archives = released.len(), "zip access shutdown")
        });
    }

    /// The current state of the archive at `path`.
    pub fn state<P: AsRef<Path>>(&self, path: P) -> ArchiveState {
        let archive = ArchiveRef::new(path);
        let slot = match self.slots().get(&archive) {
            Some(slot) => slot.clone(),
            None => return ArchiveState::Unregistered,
        };

        match slot.opened.get() {
            None => ArchiveState::PendingOpen,
            Some(Ok(container)) => ArchiveState::Opened(container.clone()),
            Some(Err(e)) => ArchiveState::Disabled(e.clone()),
        }
    }

    /// All known archives, sorted by path.
    pub fn archives(&self) -> Vec<ArchiveRef> {
        let mut out: Vec<_> = self.slots().keys().cloned().collect();
        out.sort();
        out
    }

    /// Returns the handle for `archive`, opening it first if needed.
    ///
    /// Unregistered archives are refused unless
    /// [`AccessOptions::allow_any_archive`] is set and the archive is a
    /// regular file, in which case it is adopted as if it were registered.
    pub fn resolve_or_open(&self, archive: &ArchiveRef) -> ArchiveAccess {
        let slot = match self.slot(archive) {
            Some(slot) => slot,
            None => return ArchiveAccess::Refused(Refusal::NotRegistered),
        };

        match slot.opened.get_or_init(|| self.open(archive)) {
            Ok(container) => ArchiveAccess::Opened(container.clone()),
            Err(e) => ArchiveAccess::Refused(Refusal::Disabled(e.clone())),
        }
    }

    fn slot(&self, archive: &ArchiveRef) -> Option<Arc<Slot>> {
        if let Some(slot) = self.slots().get(archive) {
            return Some(slot.clone());
        }

        if !self.options.allow_any_archive || !archive.path().is_file() {
            return None;
        }

        Some(self.slots().entry(archive.clone()).or_default().clone())
    }

    fn open(&self, archive: &ArchiveRef) -> OpenResult {
        self.options
            .logger
            .emit(|| tracing::info!(archive = %archive, "zip access init"));

        match self.opener.open(archive.path()) {
            Ok(container) => Ok(container),
            Err(e) => {
                self.options
                    .logger
                    .emit(|| tracing::error!(archive = %archive, error = %e, "zip access fail"));
                Err(Arc::new(e))
            }
        }
    }
}

impl fmt::Debug for ArchiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveRegistry")
            .field("options", &self.options)
            .field("archives", &self.archives())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Logger;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Weak;

    fn quiet() -> AccessOptions {
        AccessOptions::default().logger(Logger::Disabled)
    }

    fn counting_opener(count: Arc<AtomicUsize>) -> impl ContainerOpener {
        move |path: &Path| -> std::result::Result<Arc<dyn Container>, OpenError> {
            count.fetch_add(1, Ordering::SeqCst);
            Err(OpenError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )))
        }
    }

    #[test]
    fn register_requires_zip_extension() {
        let registry = ArchiveRegistry::new(quiet());
        let err = registry.register("/nowhere/data.tar").unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
        assert!(registry.archives().is_empty());
    }

    #[test]
    fn register_is_idempotent() {
        let registry = ArchiveRegistry::new(quiet());
        registry.register("/nowhere/data.zip").unwrap();
        registry.register("/nowhere/./other/../data.zip").unwrap();
        registry.register("/nowhere/data.zip").unwrap();

        assert_eq!(registry.archives(), vec![ArchiveRef::new("/nowhere/data.zip")]);
        assert!(matches!(
            registry.state("/nowhere/data.zip"),
            ArchiveState::PendingOpen
        ));
    }

    #[test]
    fn unregister_unknown_is_an_error() {
        let registry = ArchiveRegistry::new(quiet());
        let err = registry.unregister("/nowhere/data.zip").unwrap_err();
        assert!(matches!(err, Error::NotRegistered { .. }));

        registry.register("/nowhere/data.zip").unwrap();
        registry.unregister("/nowhere/data.zip").unwrap();
        assert!(!registry.state("/nowhere/data.zip").is_registered());
    }

    #[test]
    fn unregistered_archive_is_refused() {
        let count = Arc::new(AtomicUsize::new(0));
        let registry = ArchiveRegistry::with_opener(quiet(), counting_opener(count.clone()));

        let access = registry.resolve_or_open(&ArchiveRef::new("/nowhere/data.zip"));
        assert!(matches!(
            access,
            ArchiveAccess::Refused(Refusal::NotRegistered)
        ));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_open_is_cached() {
        let count = Arc::new(AtomicUsize::new(0));
        let registry = ArchiveRegistry::with_opener(quiet(), counting_opener(count.clone()));
        registry.register("/nowhere/data.zip").unwrap();
        let archive = ArchiveRef::new("/nowhere/data.zip");

        for _ in 0..3 {
            let access = registry.resolve_or_open(&archive);
            assert!(matches!(
                access,
                ArchiveAccess::Refused(Refusal::Disabled(_))
            ));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(matches!(
            registry.state("/nowhere/data.zip"),
            ArchiveState::Disabled(_)
        ));

        // Registering again keeps the cached failure.
        registry.register("/nowhere/data.zip").unwrap();
        registry.resolve_or_open(&archive);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // A full unregister/register cycle allows another attempt.
        registry.unregister("/nowhere/data.zip").unwrap();
        registry.register("/nowhere/data.zip").unwrap();
        registry.resolve_or_open(&archive);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn allow_any_ignores_missing_files() {
        let count = Arc::new(AtomicUsize::new(0));
        let registry = ArchiveRegistry::with_opener(
            quiet().allow_any_archive(true),
            counting_opener(count.clone()),
        );

        let access = registry.resolve_or_open(&ArchiveRef::new("/nowhere/data.zip"));
        assert!(matches!(
            access,
            ArchiveAccess::Refused(Refusal::NotRegistered)
        ));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(registry.archives().is_empty());
    }

    /// Reads the registry back from inside every event it emits.
    struct Reentrant {
        registry: Arc<OnceLock<Weak<ArchiveRegistry>>>,
        seen: Arc<AtomicUsize>,
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Reentrant {
        fn on_event(
            &self,
            _event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if let Some(registry) = self.registry.get().and_then(Weak::upgrade) {
                self.seen
                    .fetch_add(registry.archives().len(), Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn events_are_emitted_outside_the_table_lock() {
        use tracing_subscriber::layer::SubscriberExt;

        let cell = Arc::new(OnceLock::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(Reentrant {
            registry: cell.clone(),
            seen: seen.clone(),
        });
        let options = AccessOptions::default().logger(Logger::dispatch(subscriber));
        let registry = Arc::new(ArchiveRegistry::new(options));
        cell.set(Arc::downgrade(&registry)).unwrap();

        registry.register("/nowhere/a.zip").unwrap();
        registry.register("/nowhere/b.zip").unwrap();
        registry.unregister("/nowhere/a.zip").unwrap();
        registry.shutdown();

        // 1 + 2 after each registration, 1 after unregistering, 0 after shutdown.
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn shutdown_forgets_everything() {
        let registry = ArchiveRegistry::new(quiet());
        registry.register("/nowhere/a.zip").unwrap();
        registry.register("/nowhere/b.zip").unwrap();
        registry.shutdown();
        assert!(registry.archives().is_empty());
    }
}
