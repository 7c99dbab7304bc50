use std::error;
use std::fmt;
use std::sync::Arc;

use thiserror::Error as ThisError;

/// Programming errors raised by the reactor API surface.
///
/// Every variant corresponds to a misuse of the framework detected at the
/// call site (double triggers, capability violations, scheduling against a
/// stopped reactor, and so on). Recoverable task failures do not use this
/// type directly; they travel along deferred error legs as [`Fault`] values,
/// which may wrap an `Error` (the timeout path does exactly that).
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[non_exhaustive]
pub enum Error {
    /// A deferred timeout fired before the producer triggered the deferred.
    #[error("deferred timed out")]
    TimedOut,

    /// `callback` or `errback` was invoked on a deferred that already holds
    /// a terminal outcome.
    #[error("deferred already triggered")]
    AlreadyTriggered,

    /// A handler was appended, or termination requested, on a callback chain
    /// that is already terminated.
    #[error("callback chain already terminated")]
    ChainTerminated,

    /// An input deferred was attached to a splitter that already has one.
    #[error("splitter already has an input")]
    AlreadyAttached,

    /// A privileged operation was invoked through a restricted handle.
    #[error("operation not available through a restricted handle")]
    Restricted,

    /// A scheduling operation was requested while the reactor is not in the
    /// running state.
    #[error("reactor is not running")]
    NotRunning,

    /// `start` was called while the reactor thread is already alive.
    #[error("reactor already running")]
    AlreadyRunning,

    /// The subscriber list of a signal was mutated from within a signal
    /// delivery callback.
    #[error("subscriber list cannot be changed during signal delivery")]
    SignalContext,

    /// A blocking wait on a deferred was attempted from the reactor thread.
    #[error("cannot wait on a deferred from the reactor thread")]
    ReactorContext,

    /// A task instance was submitted while a previous submission of the same
    /// instance is still in flight.
    #[error("task already running")]
    TaskRunning,

    /// A worker task was cancelled and observed the interruption at a
    /// blocking point.
    #[error("task interrupted")]
    Interrupted,

    /// A chain payload did not match the type expected by a handler. Only
    /// reachable by appending to the same chain through aliased typed
    /// handles.
    #[error("chain payload type mismatch")]
    TypeMismatch,

    /// The reactor thread died abnormally; surfaced by `join`.
    #[error("reactor thread panicked: {0}")]
    Panicked(String),
}

/// Convenience alias for fallible reactor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error value propagated along deferred error legs.
///
/// A `Fault` wraps an arbitrary error object behind an `Arc` so that fan-out
/// and fan-in components can duplicate it cheaply: a splitter hands the same
/// failure to every output, a concentrator latches the first failure it sees.
/// Handlers recover from a fault by returning a value, or pass it on by
/// returning it (possibly replaced) as `Err`.
#[derive(Clone)]
pub struct Fault {
    inner: Arc<dyn error::Error + Send + Sync + 'static>,
}

impl Fault {
    /// Wraps an error value in a shareable fault.
    pub fn new<E>(error: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        Fault {
            inner: Arc::new(error),
        }
    }

    /// Builds an ad-hoc fault from a plain message.
    pub fn message(text: impl Into<String>) -> Self {
        Fault {
            inner: Arc::new(MessageError(text.into())),
        }
    }

    /// Returns a reference to the wrapped error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: error::Error + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// Tests whether this fault carries the deferred-timeout error.
    pub fn is_timed_out(&self) -> bool {
        matches!(self.downcast_ref::<Error>(), Some(Error::TimedOut))
    }

    /// Converts a caught panic payload into a fault.
    pub(crate) fn from_panic(cause: &(dyn std::any::Any + Send)) -> Self {
        let text = if let Some(text) = cause.downcast_ref::<&str>() {
            (*text).to_owned()
        } else if let Some(text) = cause.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Fault::message(format!("panicked: {text}"))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl error::Error for Fault {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<Error> for Fault {
    fn from(error: Error) -> Self {
        Fault::new(error)
    }
}

/// Ad-hoc error carrying only a message, used by [`Fault::message`].
#[derive(Debug)]
struct MessageError(String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl error::Error for MessageError {}
