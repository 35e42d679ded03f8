use std::fmt;

/// Where diagnostic events are sent.
#[derive(Clone, Default)]
pub enum Logger {
    /// The current default `tracing` dispatcher.
    #[default]
    Global,
    /// A specific subscriber, regardless of the thread's default.
    Dispatch(tracing::Dispatch),
    /// No events are emitted.
    Disabled,
}

impl Logger {
    pub fn dispatch<S>(subscriber: S) -> Logger
    where
        S: tracing::Subscriber + Send + Sync + 'static,
    {
        Logger::Dispatch(tracing::Dispatch::new(subscriber))
    }

    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Logger::Disabled)
    }

    /// Runs `event`, which emits `tracing` events, against this sink.
    pub(crate) fn emit<F: FnOnce()>(&self, event: F) {
        match self {
            Logger::Global => event(),
            Logger::Dispatch(dispatch) => tracing::dispatcher::with_default(dispatch, event),
            Logger::Disabled => {}
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Logger::Global => f.write_str("Global"),
            Logger::Dispatch(_) => f.write_str("Dispatch"),
            Logger::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Options shared by a registry and everything resolving through it.
#[derive(Debug, Clone, Default)]
pub struct AccessOptions {
    /// Allow access to any `.zip` file on disk without registering it first.
    pub allow_any_archive: bool,
    /// Sink for diagnostic events.
    pub logger: Logger,
}

impl AccessOptions {
    pub fn allow_any_archive(mut self, allow: bool) -> Self {
        self.allow_any_archive = allow;
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }
}
