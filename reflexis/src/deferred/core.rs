use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use crate::error::{Error, Fault};
use crate::logging::Severity;
use crate::reactor::core::ReactorCore;

/// The payload carried along a callback chain between handlers.
///
/// Chains are heterogeneously typed: each handler may map its input type to
/// a new output type. The payload is therefore type-erased here and cast
/// back at each handler's own boundary by the typed wrappers in the parent
/// module.
pub(crate) type Payload = Box<dyn Any + Send>;

/// A type-erased value leg: consumes the current payload, produces the next
/// payload or a fault.
pub(crate) type ValueFn = Box<dyn FnOnce(Payload) -> Result<Payload, Fault> + Send>;

/// A type-erased error leg: consumes the current fault, recovers to a
/// payload or passes a fault on.
pub(crate) type ErrorFn = Box<dyn FnOnce(Fault) -> Result<Payload, Fault> + Send>;

/// One node of a callback chain.
///
/// `Value` and `Error` nodes act on one side of the stream and pass the
/// other side through unchanged; a `Pair` handles both.
pub(crate) enum Handler {
    Value(ValueFn),
    Error(ErrorFn),
    Pair { on_value: ValueFn, on_error: ErrorFn },
}

/// The latched terminal outcome of a deferred.
pub(crate) enum Outcome {
    Value(Payload),
    Error(Fault),
}

struct ChainState {
    /// Latched at the first trigger and never cleared; the walking loop
    /// below temporarily takes `outcome` out, so trigger detection cannot
    /// rely on it.
    triggered: bool,
    outcome: Option<Outcome>,
    terminated: bool,
    ignore_next: bool,
    completed: bool,
    chain: VecDeque<Handler>,
}

/// Core state machine shared by every handle onto one deferred.
///
/// The typed `Deferred<T>` wrappers perform all type checking on the public
/// surface; within this core the payload is opaque. The invariants are:
/// a single terminal outcome latches exactly once (modulo one absorbed
/// trigger after a timeout), handlers can only be appended before
/// termination, and the chain is processed exactly once, after both the
/// outcome and termination are in place.
pub(crate) struct DeferredCore {
    weak_self: Weak<DeferredCore>,
    reactor: Weak<ReactorCore>,
    origin: &'static Location<'static>,
    created: Instant,
    state: Mutex<ChainState>,
}

impl DeferredCore {
    pub(crate) fn new(
        reactor: Weak<ReactorCore>,
        origin: &'static Location<'static>,
    ) -> Arc<DeferredCore> {
        Arc::new_cyclic(|weak_self| DeferredCore {
            weak_self: weak_self.clone(),
            reactor,
            origin,
            created: Instant::now(),
            state: Mutex::new(ChainState {
                triggered: false,
                outcome: None,
                terminated: false,
                ignore_next: false,
                completed: false,
                chain: VecDeque::new(),
            }),
        })
    }

    pub(crate) fn reactor(&self) -> Weak<ReactorCore> {
        self.reactor.clone()
    }

    /// Appends a handler, optionally terminating the chain in the same step.
    pub(crate) fn add_handler(&self, handler: Handler, terminal: bool) -> Result<(), Error> {
        let ready = {
            let mut state = self.state.lock().unwrap();
            if state.terminated {
                return Err(Error::ChainTerminated);
            }
            state.chain.push_back(handler);
            if terminal {
                state.terminated = true;
                state.triggered
            } else {
                false
            }
        };
        if ready {
            self.schedule();
        }
        Ok(())
    }

    /// Closes the chain to further appends; queues processing if an outcome
    /// is already latched.
    pub(crate) fn terminate(&self) -> Result<(), Error> {
        let ready = {
            let mut state = self.state.lock().unwrap();
            if state.terminated {
                return Err(Error::ChainTerminated);
            }
            state.terminated = true;
            state.triggered
        };
        if ready {
            self.schedule();
        }
        Ok(())
    }

    /// Latches a success value from the producer side.
    pub(crate) fn trigger_value(&self, payload: Payload) -> Result<(), Error> {
        self.trigger(Outcome::Value(payload))
    }

    /// Latches a failure from the producer side.
    pub(crate) fn trigger_error(&self, fault: Fault) -> Result<(), Error> {
        self.trigger(Outcome::Error(fault))
    }

    fn trigger(&self, outcome: Outcome) -> Result<(), Error> {
        let ready = {
            let mut state = self.state.lock().unwrap();
            if state.ignore_next {
                // A timeout has displaced this trigger; absorb it once.
                state.ignore_next = false;
                return Ok(());
            }
            if state.triggered {
                return Err(Error::AlreadyTriggered);
            }
            state.triggered = true;
            state.outcome = Some(outcome);
            state.terminated
        };
        self.cancel_timeout();
        if ready {
            self.schedule();
        }
        Ok(())
    }

    /// Timeout tick: latches a timed-out fault and arranges for the next
    /// (late) producer trigger to be silently absorbed.
    pub(crate) fn timed_out(&self) {
        let ready = {
            let mut state = self.state.lock().unwrap();
            if state.triggered {
                return;
            }
            state.triggered = true;
            state.ignore_next = true;
            state.outcome = Some(Outcome::Error(Fault::from(Error::TimedOut)));
            state.terminated
        };
        if ready {
            self.schedule();
        }
    }

    /// Arms (or re-arms) the timeout timer for this deferred. The deferred's
    /// own allocation is the timer identity, so rescheduling replaces any
    /// earlier timeout.
    pub(crate) fn set_timeout(&self, timeout: Duration) -> Result<(), Error> {
        let reactor = self.reactor.upgrade().ok_or(Error::NotRunning)?;
        let weak = self.weak_self.clone();
        reactor.schedule_timer(
            self.timer_key(),
            timeout,
            Duration::ZERO,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.timed_out();
                }
            }),
        )
    }

    /// Cancels any armed timeout; a no-op when none is armed.
    pub(crate) fn cancel_timeout(&self) {
        if let Some(reactor) = self.reactor.upgrade() {
            reactor.cancel_timer_key(self.timer_key());
        }
    }

    fn timer_key(&self) -> usize {
        self.weak_self.as_ptr() as usize
    }

    /// Hands this deferred to the reactor for chain processing. When the
    /// reactor is not running the chain is processed inline on the calling
    /// thread with a forced not-running error.
    ///
    /// The reactor is given a strong reference: once a chain is ready to
    /// run it must run even if the caller drops its last handle right after
    /// this call (the fire-and-forget `discard` pattern).
    fn schedule(&self) {
        match (self.reactor.upgrade(), self.weak_self.upgrade()) {
            (Some(reactor), Some(strong)) => reactor.enqueue_deferred(strong),
            _ => self.process_chain(false),
        }
    }

    /// Walks the chain, feeding each handler the current value or fault.
    ///
    /// Runs on the reactor thread, except for the not-running path. Handler
    /// results become the next payload; handler faults (and handler panics)
    /// become the next fault, recoverable by any later error leg. Anything
    /// left on the error side after the last handler is reported unhandled.
    pub(crate) fn process_chain(&self, reactor_running: bool) {
        let mut state = self.state.lock().unwrap();
        if state.completed {
            return;
        }
        if !reactor_running {
            state.triggered = true;
            state.outcome = Some(Outcome::Error(Fault::from(Error::NotRunning)));
        }

        loop {
            let handler = match state.chain.pop_front() {
                Some(handler) => handler,
                None => break,
            };
            let outcome = state
                .outcome
                .take()
                .expect("deferred chain processed without an outcome");
            drop(state);

            let next = Self::apply(handler, outcome);

            state = self.state.lock().unwrap();
            state.outcome = Some(next);
        }

        state.completed = true;
        let residual = match &state.outcome {
            Some(Outcome::Error(fault)) => Some(fault.clone()),
            _ => None,
        };
        drop(state);

        // Values returned by the terminal handler are discarded; a residual
        // error means nothing in the chain recovered from it.
        if let Some(fault) = residual {
            self.report_unhandled(&fault);
        }
    }

    fn apply(handler: Handler, outcome: Outcome) -> Outcome {
        match (handler, outcome) {
            // A one-sided handler passes the other stream through unchanged.
            (Handler::Error(_), Outcome::Value(payload)) => Outcome::Value(payload),
            (Handler::Value(_), Outcome::Error(fault)) => Outcome::Error(fault),
            (Handler::Value(leg), Outcome::Value(payload))
            | (Handler::Pair { on_value: leg, .. }, Outcome::Value(payload)) => {
                match panic::catch_unwind(AssertUnwindSafe(move || leg(payload))) {
                    Ok(Ok(next)) => Outcome::Value(next),
                    Ok(Err(fault)) => Outcome::Error(fault),
                    Err(cause) => Outcome::Error(Fault::from_panic(&*cause)),
                }
            }
            (Handler::Error(leg), Outcome::Error(fault))
            | (Handler::Pair { on_error: leg, .. }, Outcome::Error(fault)) => {
                match panic::catch_unwind(AssertUnwindSafe(move || leg(fault))) {
                    Ok(Ok(next)) => Outcome::Value(next),
                    Ok(Err(fault)) => Outcome::Error(fault),
                    Err(cause) => Outcome::Error(Fault::from_panic(&*cause)),
                }
            }
        }
    }

    fn report_unhandled(&self, fault: &Fault) {
        match self.reactor.upgrade() {
            Some(reactor) => reactor.report_unhandled_chain_error(fault),
            None => log::warn!(
                target: "reflexis.deferred",
                "unhandled error closing deferred callback chain: {fault}"
            ),
        }
    }
}

impl Drop for DeferredCore {
    /// Reports deferreds released in a non-terminal state.
    ///
    /// A deferred dropped before any trigger, or triggered but never
    /// terminated, indicates the holder lost track of it; the warning
    /// carries the creation site captured at construction.
    fn drop(&mut self) {
        let Ok(state) = self.state.get_mut() else {
            return;
        };
        let diagnosis = if !state.triggered {
            Some("dropped untriggered")
        } else if !state.terminated {
            Some("dropped unterminated")
        } else if !state.completed {
            // Triggered and terminated, yet the chain never ran: the queue
            // entry that should have kept this deferred alive went missing.
            Some("dropped before its chain ran")
        } else {
            None
        };
        if let Some(what) = diagnosis {
            let message = format!(
                "deferred created at {} ({:?} ago): {what}",
                self.origin,
                self.created.elapsed()
            );
            match self.reactor.upgrade() {
                Some(reactor) => reactor.log(Severity::Warning, &message),
                None => log::warn!(target: "reflexis.deferred", "{message}"),
            }
        }
    }
}

