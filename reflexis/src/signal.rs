//! Named broadcast events with prioritised, identity-keyed subscribers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, Weak};

use crate::error::Error;
use crate::logging::{Logger, Severity};
use crate::reactor::core::ReactorCore;

/// Receiver of signal broadcasts.
///
/// Subscribers are compared by reference identity (the `Arc` allocation),
/// never by structural equality: subscribing the same `Arc` twice moves it,
/// subscribing a second allocation of equal content adds a second
/// subscriber.
pub trait Signalable<T>: Send + Sync {
    /// Called on the reactor thread for every broadcast of a signal this
    /// subscriber is subscribed to. `signal` is a restricted handle
    /// identifying the source; `data` should be treated as immutable.
    fn on_signal(&self, signal: &Signal<T>, data: &T);
}

/// A broadcast event channel.
///
/// Broadcasts are delivered on the reactor thread to all subscribers in
/// descending priority order (ties keep subscription order). A finalizing
/// broadcast additionally clears the subscriber list. The
/// [`restricted`](Self::restricted) view forbids broadcasting but forwards
/// subscription management.
pub struct Signal<T> {
    core: Arc<SignalCore<T>>,
    restricted: bool,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal {
            core: self.core.clone(),
            restricted: self.restricted,
        }
    }
}

impl<T: Send + 'static> Signal<T> {
    pub(crate) fn from_core(core: Arc<SignalCore<T>>, restricted: bool) -> Self {
        Signal { core, restricted }
    }

    /// Subscribes a receiver at the default priority 0.
    pub fn subscribe(&self, subscriber: &Arc<dyn Signalable<T>>) -> Result<(), Error> {
        self.subscribe_with_priority(subscriber, 0)
    }

    /// Subscribes a receiver at the given priority; higher priorities are
    /// delivered first. Re-subscribing an already subscribed receiver moves
    /// it to the new priority.
    ///
    /// Fails with [`Error::SignalContext`] when called from within a
    /// delivery callback of this signal.
    pub fn subscribe_with_priority(
        &self,
        subscriber: &Arc<dyn Signalable<T>>,
        priority: i32,
    ) -> Result<(), Error> {
        self.core.subscribe(subscriber, priority)
    }

    /// Removes a receiver; a no-op when it is not subscribed.
    ///
    /// Fails with [`Error::SignalContext`] when called from within a
    /// delivery callback of this signal.
    pub fn unsubscribe(&self, subscriber: &Arc<dyn Signalable<T>>) -> Result<(), Error> {
        self.core.unsubscribe(subscriber)
    }

    /// Queues a broadcast of `data` to all current subscribers.
    ///
    /// May be called from within a delivery callback; the new broadcast is
    /// queued behind the current one. Fails with [`Error::Restricted`] on a
    /// restricted handle and [`Error::NotRunning`] when the reactor is
    /// stopped.
    pub fn signal(&self, data: T) -> Result<(), Error> {
        self.broadcast(data, false)
    }

    /// Queues a finalizing broadcast: after delivery the subscriber list is
    /// cleared, and later broadcasts are delivered to nobody.
    pub fn signal_final(&self, data: T) -> Result<(), Error> {
        self.broadcast(data, true)
    }

    /// Returns a view of this signal that forbids `signal` and
    /// `signal_final`. Restricting a restricted handle is a no-op.
    pub fn restricted(&self) -> Signal<T> {
        Signal {
            core: self.core.clone(),
            restricted: true,
        }
    }

    fn broadcast(&self, data: T, is_final: bool) -> Result<(), Error> {
        if self.restricted {
            return Err(Error::Restricted);
        }
        let reactor = self.core.reactor.upgrade().ok_or(Error::NotRunning)?;
        reactor.enqueue_signal(SignalCore::broadcast_job(&self.core, data, is_final))
    }
}

/// A queued broadcast, ready to run on the reactor thread.
pub(crate) type SignalJob = Box<dyn FnOnce(&dyn Logger) + Send>;

struct Subscriber<T> {
    handler: Arc<dyn Signalable<T>>,
    priority: i32,
}

struct SubscriberList<T> {
    entries: Vec<Subscriber<T>>,
    broadcasting: bool,
}

/// Shared state of one signal.
pub(crate) struct SignalCore<T> {
    reactor: Weak<ReactorCore>,
    state: Mutex<SubscriberList<T>>,
    idle: Condvar,
}

impl<T: Send + 'static> SignalCore<T> {
    pub(crate) fn new(reactor: Weak<ReactorCore>) -> Arc<SignalCore<T>> {
        Arc::new(SignalCore {
            reactor,
            state: Mutex::new(SubscriberList {
                entries: Vec::new(),
                broadcasting: false,
            }),
            idle: Condvar::new(),
        })
    }

    /// Builds the queue entry for one broadcast of this signal.
    pub(crate) fn broadcast_job(this: &Arc<Self>, data: T, is_final: bool) -> SignalJob {
        let core = this.clone();
        Box::new(move |logger| SignalCore::deliver(&core, &data, is_final, logger))
    }

    fn subscribe(&self, subscriber: &Arc<dyn Signalable<T>>, priority: i32) -> Result<(), Error> {
        let mut state = self.lock_for_mutation()?;
        let key = identity(subscriber);
        state.entries.retain(|entry| identity(&entry.handler) != key);

        // Descending priority order; equal priorities keep subscription
        // order, so the new entry goes after every peer.
        let position = state
            .entries
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(state.entries.len());
        state.entries.insert(
            position,
            Subscriber {
                handler: subscriber.clone(),
                priority,
            },
        );
        Ok(())
    }

    fn unsubscribe(&self, subscriber: &Arc<dyn Signalable<T>>) -> Result<(), Error> {
        let mut state = self.lock_for_mutation()?;
        let key = identity(subscriber);
        state.entries.retain(|entry| identity(&entry.handler) != key);
        Ok(())
    }

    /// Acquires the subscriber list for mutation.
    ///
    /// During a broadcast the list is frozen: mutation from the delivery
    /// context is a programming error, while mutation from any other thread
    /// simply waits for the delivery to finish (the behavior a single
    /// monitor would give).
    fn lock_for_mutation(&self) -> Result<std::sync::MutexGuard<'_, SubscriberList<T>>, Error> {
        let mut state = self.state.lock().unwrap();
        while state.broadcasting {
            let on_reactor_thread = self
                .reactor
                .upgrade()
                .map(|reactor| reactor.is_reactor_thread())
                .unwrap_or(false);
            if on_reactor_thread {
                return Err(Error::SignalContext);
            }
            state = self.idle.wait(state).unwrap();
        }
        Ok(state)
    }

    /// Delivers one broadcast on the reactor thread.
    fn deliver(this: &Arc<Self>, data: &T, is_final: bool, logger: &dyn Logger) {
        let snapshot: Vec<Arc<dyn Signalable<T>>> = {
            let mut state = this.state.lock().unwrap();
            state.broadcasting = true;
            state
                .entries
                .iter()
                .map(|entry| entry.handler.clone())
                .collect()
        };

        let handle = Signal::from_core(this.clone(), true);
        for subscriber in snapshot {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_signal(&handle, data)));
            if outcome.is_err() {
                logger.log(Severity::Warning, "unhandled panic in signal subscriber");
            }
        }

        let mut state = this.state.lock().unwrap();
        if is_final {
            state.entries.clear();
        }
        state.broadcasting = false;
        drop(state);
        this.idle.notify_all();
    }
}

fn identity<T>(subscriber: &Arc<dyn Signalable<T>>) -> usize {
    Arc::as_ptr(subscriber) as *const () as usize
}
