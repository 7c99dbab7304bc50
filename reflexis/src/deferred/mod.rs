//! One-shot futures with ordered callback chains.
//!
//! A [`Deferred`] carries either a success value or a [`Fault`] through an
//! ordered chain of handlers. The producer side triggers it exactly once
//! with [`callback`](Deferred::callback) or [`errback`](Deferred::errback);
//! the consumer side appends handlers and closes the chain with
//! [`terminate`](Deferred::terminate). The chain runs on the reactor thread
//! once both a trigger and the termination are in place.
//!
//! [`DeferredSplitter`] fans one deferred out to many outputs;
//! [`DeferredConcentrator`] gathers many deferreds into one list-valued
//! output.

mod concentrator;
mod splitter;

pub(crate) mod core;

pub use concentrator::DeferredConcentrator;
pub use splitter::DeferredSplitter;

use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::{Error, Fault};

use self::core::{DeferredCore, Handler, Payload};

/// A one-shot future with an ordered chain of success/error handlers.
///
/// `Deferred<T>` is a typed handle onto a shared chain core. Appending a
/// handler consumes the handle and returns a handle typed to the handler's
/// output, so the chain's types line up by construction. The producer keeps
/// its own handle for triggering and gives consumers a
/// [`restricted`](Self::restricted) view, which forwards everything except
/// the trigger operations.
pub struct Deferred<T> {
    core: Arc<DeferredCore>,
    restricted: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Deferred<T> {
    pub(crate) fn from_core(core: Arc<DeferredCore>, restricted: bool) -> Self {
        Deferred {
            core,
            restricted,
            _marker: PhantomData,
        }
    }

    /// Triggers the deferred with a success value.
    ///
    /// Fails with [`Error::AlreadyTriggered`] on a second trigger, except
    /// that one late trigger arriving after a timeout has fired is silently
    /// absorbed. Fails with [`Error::Restricted`] on a restricted handle.
    pub fn callback(&self, value: T) -> Result<(), Error> {
        if self.restricted {
            return Err(Error::Restricted);
        }
        self.core.trigger_value(Box::new(value))
    }

    /// Triggers the deferred with a failure.
    ///
    /// Same trigger rules as [`callback`](Self::callback).
    pub fn errback(&self, fault: Fault) -> Result<(), Error> {
        if self.restricted {
            return Err(Error::Restricted);
        }
        self.core.trigger_error(fault)
    }

    /// Appends a value handler; faults pass through it untouched.
    pub fn add_callback<U, F>(self, handler: F) -> Result<Deferred<U>, Error>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, Fault> + Send + 'static,
    {
        self.core
            .add_handler(Handler::Value(value_leg(handler)), false)?;
        Ok(self.retyped())
    }

    /// Appends an error handler; values pass through it untouched.
    ///
    /// The handler may recover by returning a replacement value, or pass the
    /// fault (possibly replaced) on to the next error leg.
    pub fn add_errback<F>(self, handler: F) -> Result<Deferred<T>, Error>
    where
        F: FnOnce(Fault) -> Result<T, Fault> + Send + 'static,
    {
        self.core
            .add_handler(Handler::Error(error_leg(handler)), false)?;
        Ok(self.retyped())
    }

    /// Appends a handler pair covering both streams.
    pub fn add_callbacks<U, F, G>(self, on_value: F, on_error: G) -> Result<Deferred<U>, Error>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, Fault> + Send + 'static,
        G: FnOnce(Fault) -> Result<U, Fault> + Send + 'static,
    {
        self.core.add_handler(
            Handler::Pair {
                on_value: value_leg(on_value),
                on_error: error_leg(on_error),
            },
            false,
        )?;
        Ok(self.retyped())
    }

    /// Closes the chain to further handlers.
    ///
    /// Processing starts as soon as the deferred has also been triggered.
    /// Fails with [`Error::ChainTerminated`] if already terminated.
    pub fn terminate(self) -> Result<(), Error> {
        self.core.terminate()
    }

    /// Terminates the chain, leaving any unhandled error to be reported by
    /// the chain close. Use when the outcome itself is of no interest.
    pub fn discard(self) -> Result<(), Error> {
        self.core.terminate()
    }

    /// Arms a timeout for this deferred.
    ///
    /// When the timeout fires before the producer triggers, the chain sees a
    /// [`Error::TimedOut`] fault and the producer's eventual (single) late
    /// trigger is absorbed. Re-arming replaces the previous timeout; a zero
    /// duration fires on the next reactor iteration.
    pub fn set_timeout(&self, timeout: Duration) -> Result<(), Error> {
        self.core.set_timeout(timeout)
    }

    /// Cancels any armed timeout. A no-op when none is armed.
    pub fn cancel_timeout(&self) {
        self.core.cancel_timeout()
    }

    /// Returns a restricted view of this deferred that forbids the producer
    /// operations `callback` and `errback`. Restricting a restricted handle
    /// is a no-op.
    pub fn restricted(&self) -> Deferred<T> {
        Deferred::from_core(self.core.clone(), true)
    }

    /// Blocks the calling thread until the terminal outcome is available,
    /// terminating the chain with an internal wake-up handler.
    ///
    /// Must not be called from the reactor thread, where blocking would
    /// deadlock the loop; doing so fails immediately with
    /// [`Error::ReactorContext`].
    pub fn defer(self) -> Result<T, Fault> {
        if let Some(reactor) = self.core.reactor().upgrade() {
            reactor.check_wait_context().map_err(Fault::from)?;
        }

        let slot: Arc<WakeupSlot> = Arc::new((Mutex::new(None), Condvar::new()));
        let value_slot = slot.clone();
        let error_slot = slot.clone();
        self.core
            .add_handler(
                Handler::Pair {
                    on_value: Box::new(move |payload| {
                        store_wakeup(&value_slot, Ok(payload));
                        Ok(Box::new(()) as Payload)
                    }),
                    on_error: Box::new(move |fault| {
                        store_wakeup(&error_slot, Err(fault));
                        Ok(Box::new(()) as Payload)
                    }),
                },
                true,
            )
            .map_err(Fault::from)?;

        let (lock, ready) = &*slot;
        let mut waiting = lock.lock().unwrap();
        while waiting.is_none() {
            waiting = ready.wait(waiting).unwrap();
        }
        match waiting.take().unwrap() {
            Ok(payload) => match payload.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(_) => Err(Fault::from(Error::TypeMismatch)),
            },
            Err(fault) => Err(fault),
        }
    }

    fn retyped<U: Send + 'static>(self) -> Deferred<U> {
        Deferred {
            core: self.core,
            restricted: self.restricted,
            _marker: PhantomData,
        }
    }
}

type WakeupSlot = (Mutex<Option<Result<Payload, Fault>>>, Condvar);

fn store_wakeup(slot: &WakeupSlot, outcome: Result<Payload, Fault>) {
    let (lock, ready) = slot;
    *lock.lock().unwrap() = Some(outcome);
    ready.notify_all();
}

/// Wraps a typed value handler into a type-erased chain leg.
///
/// The downcast can only fail when the chain was extended through aliased
/// typed handles; the mismatch then surfaces as a chain fault, recoverable
/// like any other.
fn value_leg<T, U, F>(handler: F) -> core::ValueFn
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(T) -> Result<U, Fault> + Send + 'static,
{
    Box::new(move |payload: Payload| match payload.downcast::<T>() {
        Ok(value) => handler(*value).map(|next| Box::new(next) as Payload),
        Err(_) => Err(Fault::from(Error::TypeMismatch)),
    })
}

fn error_leg<U, F>(handler: F) -> core::ErrorFn
where
    U: Send + 'static,
    F: FnOnce(Fault) -> Result<U, Fault> + Send + 'static,
{
    Box::new(move |fault: Fault| handler(fault).map(|next| Box::new(next) as Payload))
}
