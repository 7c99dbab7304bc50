use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::deferred::core::{DeferredCore, Payload};
use crate::error::{Error, Fault};
use crate::reactor::core::ReactorCore;

/// A blocking task runnable on a pool worker thread.
///
/// Task instances are compared by reference identity: one instance may only
/// be in flight once, and [`cancel_thread`](crate::Reactor::cancel_thread)
/// addresses the worker currently carrying the instance.
pub trait Threadable<T, U>: Send + Sync {
    /// Runs the task on a worker thread.
    ///
    /// `interrupt` is this run's cancellation token; a cooperative task
    /// checks it at its blocking points ([`Interrupt::checkpoint`],
    /// [`Interrupt::sleep`]) and unwinds with an error when it is set.
    fn run(&self, input: T, interrupt: &Interrupt) -> Result<U, Fault>;
}

/// Cooperative cancellation token handed to a worker task.
///
/// Cancellation only takes effect when the task observes it; a task that
/// never checks runs to completion regardless.
pub struct Interrupt {
    flag: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl Interrupt {
    pub(crate) fn new() -> Arc<Interrupt> {
        Arc::new(Interrupt {
            flag: AtomicBool::new(false),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        })
    }

    /// Returns whether cancellation has been requested.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Fails with [`Error::Interrupted`] once cancellation is requested.
    pub fn checkpoint(&self) -> Result<(), Fault> {
        if self.is_set() {
            Err(Fault::from(Error::Interrupted))
        } else {
            Ok(())
        }
    }

    /// Sleeps for `duration`, waking early with [`Error::Interrupted`] when
    /// cancellation is requested.
    pub fn sleep(&self, duration: Duration) -> Result<(), Fault> {
        let deadline = Instant::now() + duration;
        let mut guard = self.lock.lock().unwrap();
        loop {
            if self.is_set() {
                return Err(Fault::from(Error::Interrupted));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let (next, _) = self.wake.wait_timeout(guard, deadline - now).unwrap();
            guard = next;
        }
    }

    pub(crate) fn set(&self) {
        self.flag.store(true, Ordering::Release);
        let _guard = self.lock.lock().unwrap();
        self.wake.notify_all();
    }
}

/// A submitted task, type-erased down to the worker's calling convention.
pub(crate) type Job = Box<dyn FnOnce(&Interrupt) -> Result<Payload, Fault> + Send>;

struct SlotState {
    job: Option<Job>,
    interrupt: Option<Arc<Interrupt>>,
    task_key: usize,
    deferred: Option<Arc<DeferredCore>>,
    outcome: Option<Result<Payload, Fault>>,
}

/// One recycled worker thread of the pool.
///
/// The slot is a small state machine driven by two flags: a run request
/// (the pending job) and a kill request. The owning reactor moves slots
/// between its idle queue, running map and completed map; the thread itself
/// only waits for work, runs it, and reports completion.
pub(crate) struct WorkerSlot {
    reactor: Weak<ReactorCore>,
    state: Mutex<SlotState>,
    work: Condvar,
    kill: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerSlot {
    /// Spawns a new worker thread and returns its slot.
    pub(crate) fn spawn(name: String, reactor: Weak<ReactorCore>) -> Arc<WorkerSlot> {
        let slot = Arc::new(WorkerSlot {
            reactor,
            state: Mutex::new(SlotState {
                job: None,
                interrupt: None,
                task_key: 0,
                deferred: None,
                outcome: None,
            }),
            work: Condvar::new(),
            kill: AtomicBool::new(false),
            thread: Mutex::new(None),
        });

        let runner = slot.clone();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || runner.run_loop())
            .expect("failed to spawn worker thread");
        *slot.thread.lock().unwrap() = Some(handle);
        slot
    }

    /// Hands a task to the worker and wakes it.
    pub(crate) fn submit(
        &self,
        task_key: usize,
        job: Job,
        interrupt: Arc<Interrupt>,
        deferred: Arc<DeferredCore>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.job = Some(job);
        state.interrupt = Some(interrupt);
        state.task_key = task_key;
        state.deferred = Some(deferred);
        state.outcome = None;
        drop(state);
        self.work.notify_all();
    }

    /// Requests cancellation of the task this worker is carrying.
    pub(crate) fn cancel(&self) {
        let interrupt = self.state.lock().unwrap().interrupt.clone();
        if let Some(interrupt) = interrupt {
            interrupt.set();
        }
    }

    /// Requests termination of the worker thread itself.
    pub(crate) fn kill(&self) {
        self.kill.store(true, Ordering::Release);
        self.cancel();
        self.work.notify_all();
    }

    /// Whether the worker thread has exited.
    pub(crate) fn is_finished(&self) -> bool {
        self.thread
            .lock()
            .unwrap()
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }

    /// Joins the worker thread once it has exited.
    pub(crate) fn join(&self) {
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Fires the deferred of the drained completion. Runs on the reactor
    /// thread.
    pub(crate) fn fire_deferred(&self) -> Result<(), Error> {
        let (deferred, outcome) = {
            let mut state = self.state.lock().unwrap();
            state.interrupt = None;
            (state.deferred.take(), state.outcome.take())
        };
        let deferred = deferred.expect("completed worker slot without a deferred");
        match outcome.expect("completed worker slot without an outcome") {
            Ok(payload) => deferred.trigger_value(payload),
            Err(fault) => deferred.trigger_error(fault),
        }
    }

    fn run_loop(self: Arc<Self>) {
        loop {
            // Wait for a run request, or leave on a kill request.
            let (job, interrupt) = {
                let mut state = self.state.lock().unwrap();
                loop {
                    if self.kill.load(Ordering::Acquire) {
                        return;
                    }
                    if let Some(job) = state.job.take() {
                        let interrupt = state
                            .interrupt
                            .clone()
                            .expect("worker job submitted without an interrupt");
                        break (job, interrupt);
                    }
                    state = self.work.wait(state).unwrap();
                }
            };

            let result = panic::catch_unwind(AssertUnwindSafe(|| job(&interrupt)))
                .unwrap_or_else(|cause| Err(Fault::from_panic(&*cause)));

            // A kill that arrived while the task ran means the reactor has
            // given up on this worker; exit without reporting.
            if self.kill.load(Ordering::Acquire) {
                return;
            }

            let task_key = {
                let mut state = self.state.lock().unwrap();
                state.outcome = Some(result);
                state.task_key
            };

            match self.reactor.upgrade() {
                Some(reactor) => reactor.worker_completed(task_key, self.clone()),
                None => return,
            }
        }
    }
}
