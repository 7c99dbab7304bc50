use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::clock::{MonotonicClock, SystemClock};
use crate::deferred::core::{DeferredCore, Payload};
use crate::deferred::{Deferred, DeferredConcentrator, DeferredSplitter};
use crate::error::{Error, Fault};
use crate::logging::{FacadeLogTarget, LogTarget, Logger, Severity};
use crate::signal::{Signal, SignalCore, SignalJob};

use super::timer::{Timeable, TimerRegistry};
use super::worker::{Interrupt, Job, Threadable, WorkerSlot};

/// Number of idle worker threads kept for reuse by default.
const DEFAULT_MAX_IDLE_WORKERS: usize = 5;

/// Interval of the bounded polls used while shutting worker threads down.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Configures and builds a [`Reactor`].
///
/// ```rust,ignore
/// let reactor = Reactor::builder()
///     .max_idle_workers(2)
///     .build();
/// reactor.start()?;
/// ```
pub struct ReactorBuilder {
    clock: Option<Arc<dyn MonotonicClock>>,
    log_target: Option<Arc<dyn LogTarget>>,
    max_idle_workers: usize,
}

impl ReactorBuilder {
    pub fn new() -> Self {
        ReactorBuilder {
            clock: None,
            log_target: None,
            max_idle_workers: DEFAULT_MAX_IDLE_WORKERS,
        }
    }

    /// Sets the timebase; defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn MonotonicClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the log sink; defaults to [`FacadeLogTarget`].
    pub fn log_target(mut self, target: Arc<dyn LogTarget>) -> Self {
        self.log_target = Some(target);
        self
    }

    /// Sets how many idle worker threads are kept for reuse.
    pub fn max_idle_workers(mut self, count: usize) -> Self {
        self.max_idle_workers = count;
        self
    }

    pub fn build(self) -> Reactor {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn MonotonicClock>);
        let log_target = self
            .log_target
            .unwrap_or_else(|| Arc::new(FacadeLogTarget::new()) as Arc<dyn LogTarget>);
        let logger = log_target.get_logger("reflexis.reactor", None);

        let core = Arc::new_cyclic(|weak_self| ReactorCore {
            weak_self: weak_self.clone(),
            monitor: Mutex::new(ReactorState {
                phase: Phase::Stopped,
                signal_queue: VecDeque::new(),
                deferred_queue: VecDeque::new(),
                timers: TimerRegistry::new(),
                idle: VecDeque::new(),
                running: FxHashMap::default(),
                completed: FxHashMap::default(),
                worker_seq: 0,
                shutdown_signal: None,
            }),
            wakeup: Condvar::new(),
            clock,
            log_target,
            logger,
            max_idle_workers: self.max_idle_workers,
            thread: Mutex::new(None),
            reactor_thread: Mutex::new(None),
            exit_failure: Mutex::new(None),
        });
        Reactor { core }
    }
}

impl Default for ReactorBuilder {
    fn default() -> Self {
        ReactorBuilder::new()
    }
}

/// Handle onto one reactor instance.
///
/// The reactor owns a dedicated event thread and all the queues it drains:
/// pending signal broadcasts, deferreds ready for chain processing,
/// completed worker threads, and the timer registry. Handles are cheap to
/// clone and share; all operations are safe from any thread.
///
/// Lifecycle: [`start`](Self::start) spawns the reactor thread,
/// [`stop`](Self::stop) requests shutdown, [`join`](Self::join) waits for
/// the thread to exit and surfaces any failure that took the loop down.
#[derive(Clone)]
pub struct Reactor {
    core: Arc<ReactorCore>,
}

impl Reactor {
    pub fn builder() -> ReactorBuilder {
        ReactorBuilder::new()
    }

    /// Builds a reactor with default configuration.
    pub fn new() -> Reactor {
        ReactorBuilder::new().build()
    }

    /// Starts the reactor thread.
    ///
    /// Initialises the clock origin and transitions Stopped → Running.
    /// Fails with [`Error::AlreadyRunning`] when the reactor thread is
    /// already alive.
    pub fn start(&self) -> Result<(), Error> {
        let core = &self.core;
        {
            let mut state = core.monitor.lock().unwrap();
            if state.phase != Phase::Stopped {
                return Err(Error::AlreadyRunning);
            }
            let thread = core.thread.lock().unwrap();
            if thread.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
                return Err(Error::AlreadyRunning);
            }
            drop(thread);
            state.phase = Phase::Running;
        }

        core.clock.init();
        *core.exit_failure.lock().unwrap() = None;

        let runner = core.clone();
        let handle = thread::Builder::new()
            .name("reflexis-reactor".into())
            .spawn(move || runner.reactor_main())
            .expect("failed to spawn reactor thread");
        *core.thread.lock().unwrap() = Some(handle);
        core.logger.log(Severity::Info, "started reactor");
        Ok(())
    }

    /// Requests shutdown: Running → Stopping, waking the loop. The loop
    /// drains once more and then runs the shutdown sequence. A no-op unless
    /// running.
    pub fn stop(&self) {
        let mut state = self.core.monitor.lock().unwrap();
        if state.phase == Phase::Running {
            self.core.logger.log(Severity::Info, "halting reactor");
            state.phase = Phase::Stopping;
            drop(state);
            self.core.wakeup.notify_all();
        }
    }

    /// Waits for the reactor thread to exit.
    ///
    /// Returns the latched failure if the loop died abnormally. Calling
    /// `join` from the reactor thread returns immediately.
    pub fn join(&self) -> Result<(), Error> {
        if self.core.is_reactor_thread() {
            return Ok(());
        }
        let handle = self.core.thread.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(cause) = handle.join() {
                return Err(Error::Panicked(Fault::from_panic(&*cause).to_string()));
            }
            self.core.logger.log(Severity::Info, "reactor stopped");
        }
        if let Some(message) = self.core.exit_failure.lock().unwrap().clone() {
            return Err(Error::Panicked(message));
        }
        Ok(())
    }

    /// Elapsed time since the reactor started, per its clock.
    pub fn uptime(&self) -> Duration {
        Duration::from_millis(self.core.clock.now_ms())
    }

    /// Returns the named logger from the reactor's log sink.
    pub fn logger(&self, id: &str) -> Arc<dyn Logger> {
        self.core.log_target.get_logger(id, None)
    }

    /// Creates a new untriggered, unterminated deferred.
    #[track_caller]
    pub fn new_deferred<T: Send + 'static>(&self) -> Deferred<T> {
        let core = DeferredCore::new(Arc::downgrade(&self.core), Location::caller());
        Deferred::from_core(core, false)
    }

    /// Creates a deferred already triggered with `value`, returned
    /// restricted. The consumer only needs to attach its chain.
    #[track_caller]
    pub fn call_deferred<T: Send + 'static>(&self, value: T) -> Deferred<T> {
        let core = DeferredCore::new(Arc::downgrade(&self.core), Location::caller());
        let _ = core.trigger_value(Box::new(value));
        Deferred::from_core(core, true)
    }

    /// Creates a deferred already failed with `fault`, returned restricted.
    #[track_caller]
    pub fn fail_deferred<T: Send + 'static>(&self, fault: Fault) -> Deferred<T> {
        let core = DeferredCore::new(Arc::downgrade(&self.core), Location::caller());
        let _ = core.trigger_error(fault);
        Deferred::from_core(core, true)
    }

    /// Creates a deferred splitter.
    pub fn new_splitter<T: Clone + Send + 'static>(&self) -> DeferredSplitter<T> {
        DeferredSplitter::new(Arc::downgrade(&self.core))
    }

    /// Creates a deferred concentrator.
    pub fn new_concentrator<T: Send + 'static>(&self) -> DeferredConcentrator<T> {
        DeferredConcentrator::new(Arc::downgrade(&self.core))
    }

    /// Creates a broadcast signal.
    pub fn new_signal<T: Send + 'static>(&self) -> Signal<T> {
        Signal::from_core(SignalCore::new(Arc::downgrade(&self.core)), false)
    }

    /// Returns the reactor shutdown signal (restricted).
    ///
    /// On a normal shutdown it receives a finalizing broadcast with payload
    /// 0 as the last signal before the loop exits.
    pub fn shutdown_signal(&self) -> Signal<i32> {
        let mut state = self.core.monitor.lock().unwrap();
        let signal = match &state.shutdown_signal {
            Some(existing) => existing.clone(),
            None => {
                let fresh = SignalCore::new(self.core.weak_self.clone());
                state.shutdown_signal = Some(fresh.clone());
                fresh
            }
        };
        drop(state);
        Signal::from_core(signal, true)
    }

    /// Schedules a one-shot timer: equivalent to a repeating timer with a
    /// zero interval.
    pub fn run_timer_one_shot<T: Send + 'static>(
        &self,
        timeable: &Arc<dyn Timeable<T>>,
        delay: Duration,
        data: T,
    ) -> Result<(), Error> {
        self.run_timer_repeating(timeable, delay, Duration::ZERO, data)
    }

    /// Schedules a repeating timer for `timeable`, replacing any timer it
    /// already owns.
    ///
    /// The first tick fires `delay` after now, later ticks every `interval`.
    /// A repeating timer that falls behind the clock skips missed firings
    /// in whole intervals (logging the merge) rather than bursting.
    pub fn run_timer_repeating<T: Send + 'static>(
        &self,
        timeable: &Arc<dyn Timeable<T>>,
        delay: Duration,
        interval: Duration,
        data: T,
    ) -> Result<(), Error> {
        let handler = timeable.clone();
        self.core.schedule_timer(
            timeable_key(timeable),
            delay,
            interval,
            Box::new(move || handler.on_tick(&data)),
        )
    }

    /// Cancels the timer owned by `timeable`; a no-op when there is none,
    /// or when the reactor is no longer running.
    pub fn cancel_timer<T: Send + 'static>(&self, timeable: &Arc<dyn Timeable<T>>) {
        self.core.cancel_timer_key(timeable_key(timeable));
    }

    /// Runs a blocking task on a pool worker thread.
    ///
    /// Returns immediately with a restricted deferred that fires on the
    /// reactor thread with the task's result, error, or panic. A task
    /// instance can only be in flight once ([`Error::TaskRunning`]).
    #[track_caller]
    pub fn run_thread<T, U>(
        &self,
        task: Arc<dyn Threadable<T, U>>,
        input: T,
    ) -> Result<Deferred<U>, Error>
    where
        T: Send + 'static,
        U: Send + 'static,
    {
        let key = threadable_key(&task);
        let job: Job =
            Box::new(move |interrupt| task.run(input, interrupt).map(|v| Box::new(v) as Payload));
        let core = self.core.submit_task(key, job, Location::caller())?;
        Ok(Deferred::from_core(core, true))
    }

    /// Runs a blocking task with a deadline.
    ///
    /// Behaves like [`run_thread`](Self::run_thread) with a timeout armed on
    /// the returned deferred, plus an interceptor that cancels the task when
    /// the timeout fires and passes the timed-out fault on.
    #[track_caller]
    pub fn run_thread_with_timeout<T, U>(
        &self,
        task: Arc<dyn Threadable<T, U>>,
        input: T,
        timeout: Duration,
    ) -> Result<Deferred<U>, Error>
    where
        T: Send + 'static,
        U: Send + 'static,
    {
        let key = threadable_key(&task);
        let deferred = self.run_thread(task, input)?;
        deferred.set_timeout(timeout)?;
        let reactor = self.clone();
        deferred.add_errback(move |fault| {
            if fault.is_timed_out() {
                reactor.core.cancel_task(key);
            }
            Err(fault)
        })
    }

    /// Requests cancellation of the worker currently carrying `task`.
    ///
    /// Cancellation is cooperative: the task observes its [`Interrupt`] at
    /// its next blocking point and the interruption surfaces through the
    /// deferred error leg. A no-op when the task is not running.
    pub fn cancel_thread<T, U>(&self, task: &Arc<dyn Threadable<T, U>>)
    where
        T: Send + 'static,
        U: Send + 'static,
    {
        self.core.cancel_task(threadable_key(task));
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Reactor::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stopped,
    Running,
    Stopping,
}

/// All reactor-owned queues, guarded together by the single monitor.
struct ReactorState {
    phase: Phase,
    signal_queue: VecDeque<SignalJob>,
    deferred_queue: VecDeque<Arc<DeferredCore>>,
    timers: TimerRegistry,
    idle: VecDeque<Arc<WorkerSlot>>,
    running: FxHashMap<usize, Arc<WorkerSlot>>,
    completed: FxHashMap<usize, Arc<WorkerSlot>>,
    worker_seq: u32,
    shutdown_signal: Option<Arc<SignalCore<i32>>>,
}

pub(crate) struct ReactorCore {
    pub(crate) weak_self: Weak<ReactorCore>,
    monitor: Mutex<ReactorState>,
    wakeup: Condvar,
    clock: Arc<dyn MonotonicClock>,
    log_target: Arc<dyn LogTarget>,
    logger: Arc<dyn Logger>,
    max_idle_workers: usize,
    thread: Mutex<Option<JoinHandle<()>>>,
    reactor_thread: Mutex<Option<ThreadId>>,
    exit_failure: Mutex<Option<String>>,
}

impl ReactorCore {
    // ---- entry points used by the primitive modules ----------------------

    /// Queues a signal broadcast. Only legal while running.
    pub(crate) fn enqueue_signal(&self, job: SignalJob) -> Result<(), Error> {
        let mut state = self.monitor.lock().unwrap();
        if state.phase != Phase::Running {
            return Err(Error::NotRunning);
        }
        state.signal_queue.push_back(job);
        drop(state);
        self.wakeup.notify_all();
        Ok(())
    }

    /// Queues a deferred whose chain is ready for processing. When the
    /// reactor is not running the chain is processed inline with a forced
    /// not-running error, on the calling thread.
    ///
    /// The queue keeps the deferred alive until its chain has run, so a
    /// producer or consumer may drop its last handle immediately after
    /// triggering or terminating without losing the chain.
    pub(crate) fn enqueue_deferred(&self, deferred: Arc<DeferredCore>) {
        let mut state = self.monitor.lock().unwrap();
        if state.phase == Phase::Running {
            state.deferred_queue.push_back(deferred);
            drop(state);
            self.wakeup.notify_all();
        } else {
            drop(state);
            deferred.process_chain(false);
        }
    }

    /// Schedules (or replaces) the timer owned by `key`.
    pub(crate) fn schedule_timer(
        &self,
        key: usize,
        delay: Duration,
        interval: Duration,
        tick: Box<dyn FnMut() + Send>,
    ) -> Result<(), Error> {
        let mut state = self.monitor.lock().unwrap();
        if state.phase != Phase::Running {
            return Err(Error::NotRunning);
        }
        let trigger = self.clock.now_ms() + delay.as_millis() as u64;
        state
            .timers
            .schedule(key, trigger, interval.as_millis() as u64, tick);
        drop(state);
        self.wakeup.notify_all();
        Ok(())
    }

    pub(crate) fn cancel_timer_key(&self, key: usize) {
        let mut state = self.monitor.lock().unwrap();
        if state.phase == Phase::Running {
            state.timers.cancel(key);
        }
    }

    /// Dispatches a task onto an idle (or newly spawned) worker.
    pub(crate) fn submit_task(
        &self,
        key: usize,
        job: Job,
        origin: &'static Location<'static>,
    ) -> Result<Arc<DeferredCore>, Error> {
        let mut state = self.monitor.lock().unwrap();
        if state.phase != Phase::Running {
            return Err(Error::NotRunning);
        }
        // One in-flight submission per task instance, counting completions
        // the loop has not drained yet.
        if state.running.contains_key(&key) || state.completed.contains_key(&key) {
            return Err(Error::TaskRunning);
        }

        let slot = match state.idle.pop_front() {
            Some(slot) => slot,
            None => {
                let id = state.worker_seq;
                state.worker_seq += 1;
                self.logger
                    .log(Severity::Fine, &format!("starting worker {id}"));
                WorkerSlot::spawn(format!("reflexis-worker-{id}"), self.weak_self.clone())
            }
        };

        let deferred = DeferredCore::new(self.weak_self.clone(), origin);
        state.running.insert(key, slot.clone());
        // Submit under the monitor so a concurrent stop or cancel observes
        // the slot fully armed.
        slot.submit(key, job, Interrupt::new(), deferred.clone());
        drop(state);

        Ok(deferred)
    }

    /// Requests cancellation of the worker carrying `key`.
    ///
    /// Runs under the monitor so the interrupt lands on the submission it
    /// was aimed at, never on a later task recycled onto the same worker.
    pub(crate) fn cancel_task(&self, key: usize) {
        let state = self.monitor.lock().unwrap();
        if state.phase != Phase::Running {
            return;
        }
        if let Some(slot) = state.running.get(&key) {
            self.logger.log(Severity::Fine, "cancelling worker task");
            slot.cancel();
        }
    }

    /// Worker-thread callback: moves the slot from running to completed and
    /// wakes the loop.
    pub(crate) fn worker_completed(&self, key: usize, slot: Arc<WorkerSlot>) {
        let mut state = self.monitor.lock().unwrap();
        state.running.remove(&key);
        state.completed.insert(key, slot);
        drop(state);
        self.wakeup.notify_all();
    }

    pub(crate) fn is_reactor_thread(&self) -> bool {
        *self.reactor_thread.lock().unwrap() == Some(thread::current().id())
    }

    /// Guards blocking waits on deferreds: never from the reactor thread,
    /// and not before the reactor has ever run.
    pub(crate) fn check_wait_context(&self) -> Result<(), Error> {
        match *self.reactor_thread.lock().unwrap() {
            Some(id) if id == thread::current().id() => Err(Error::ReactorContext),
            Some(_) => Ok(()),
            None => Err(Error::ReactorContext),
        }
    }

    pub(crate) fn report_unhandled_chain_error(&self, fault: &Fault) {
        self.logger.log(
            Severity::Warning,
            &format!("unhandled error closing deferred callback chain: {fault}"),
        );
    }

    pub(crate) fn log(&self, severity: Severity, message: &str) {
        self.logger.log(severity, message);
    }

    // ---- the reactor thread ---------------------------------------------

    fn reactor_main(self: Arc<Self>) {
        *self.reactor_thread.lock().unwrap() = Some(thread::current().id());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_loop();
            self.shutdown_sequence();
        }));
        if let Err(cause) = outcome {
            let failure = Fault::from_panic(&*cause).to_string();
            self.logger
                .log(Severity::Severe, &format!("reactor loop failed: {failure}"));
            *self.exit_failure.lock().unwrap() = Some(failure);
        }

        let mut state = self.monitor.lock().unwrap();
        state.phase = Phase::Stopped;
        drop(state);
        self.wakeup.notify_all();
    }

    /// One iteration: sleep until the next event, then drain signals,
    /// deferreds, completed threads and expired timers, in that order.
    fn run_loop(&self) {
        loop {
            {
                let mut state = self.monitor.lock().unwrap();
                if state.phase != Phase::Running {
                    return;
                }
                if state.signal_queue.is_empty()
                    && state.deferred_queue.is_empty()
                    && state.completed.is_empty()
                {
                    state = match state.timers.next_trigger() {
                        Some(trigger) => {
                            let now = self.clock.now_ms();
                            if trigger > now {
                                self.wakeup
                                    .wait_timeout(state, Duration::from_millis(trigger - now))
                                    .unwrap()
                                    .0
                            } else {
                                state
                            }
                        }
                        None => self.wakeup.wait(state).unwrap(),
                    };
                }
                drop(state);
            }

            self.drain_signal_queue();
            self.drain_deferred_queue();
            self.drain_completed_workers();
            self.drain_expired_timers();
        }
    }

    fn drain_signal_queue(&self) {
        loop {
            let job = self.monitor.lock().unwrap().signal_queue.pop_front();
            let Some(job) = job else { break };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(self.logger.as_ref())));
            if outcome.is_err() {
                self.logger
                    .log(Severity::Warning, "unhandled panic in signal delivery");
            }
        }
    }

    fn drain_deferred_queue(&self) {
        loop {
            let entry = self.monitor.lock().unwrap().deferred_queue.pop_front();
            let Some(deferred) = entry else { break };
            deferred.process_chain(true);
        }
    }

    fn drain_completed_workers(&self) {
        loop {
            let slot = {
                let mut state = self.monitor.lock().unwrap();
                match state.completed.keys().next().copied() {
                    Some(key) => state.completed.remove(&key),
                    None => None,
                }
            };
            let Some(slot) = slot else { break };

            if let Err(error) = slot.fire_deferred() {
                self.logger.log_cause(
                    Severity::Warning,
                    "unhandled error in thread completion",
                    &error,
                );
            }

            let mut state = self.monitor.lock().unwrap();
            if state.idle.len() < self.max_idle_workers {
                state.idle.push_back(slot);
            } else {
                drop(state);
                self.logger.log(Severity::Fine, "terminating surplus worker");
                slot.kill();
            }
        }
    }

    fn drain_expired_timers(&self) {
        loop {
            let tick = {
                let mut state = self.monitor.lock().unwrap();
                let now = self.clock.now_ms();
                match state.timers.pop_expired(now) {
                    None => None,
                    Some((position, entry)) => {
                        let tick = entry.tick.clone();
                        if entry.interval_ms > 0 {
                            // Re-arm before the tick runs so the handler
                            // observes itself as scheduled. An overloaded
                            // timer skips whole intervals instead of
                            // bursting.
                            let mut trigger = position.0 + entry.interval_ms;
                            while trigger <= self.clock.now_ms() {
                                self.logger.log(
                                    Severity::Warning,
                                    &format!(
                                        "forced to merge {} ms interval callbacks",
                                        entry.interval_ms
                                    ),
                                );
                                trigger += entry.interval_ms;
                            }
                            state.timers.rearm((trigger, position.1), entry);
                        }
                        Some(tick)
                    }
                }
            };
            let Some(tick) = tick else { break };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut tick_fn = match tick.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                (*tick_fn)();
            }));
            if outcome.is_err() {
                self.logger
                    .log(Severity::Warning, "unhandled panic in timer callback");
            }
        }
    }

    /// Shuts the reactor down once the loop has observed the stop request:
    /// cancel and drain the running workers, terminate the idle ones, flush
    /// the deferred queue, deliver the final shutdown broadcast, clear the
    /// timers.
    fn shutdown_sequence(&self) {
        let running: Vec<Arc<WorkerSlot>> = {
            let state = self.monitor.lock().unwrap();
            state.running.values().cloned().collect()
        };
        for slot in &running {
            self.logger.log(Severity::Fine, "cancelling running worker");
            slot.cancel();
        }

        {
            let mut state = self.monitor.lock().unwrap();
            while !state.running.is_empty() {
                state = self.wakeup.wait_timeout(state, SHUTDOWN_POLL).unwrap().0;
            }
            drop(state);
        }

        self.drain_completed_workers();

        let idle: Vec<Arc<WorkerSlot>> = {
            let mut state = self.monitor.lock().unwrap();
            state.idle.drain(..).collect()
        };
        for slot in &idle {
            self.logger.log(Severity::Fine, "terminating idle worker");
            slot.kill();
        }
        if !idle.is_empty() {
            // Poll at least once before concluding every worker has left.
            loop {
                let state = self.monitor.lock().unwrap();
                drop(self.wakeup.wait_timeout(state, SHUTDOWN_POLL).unwrap());
                if idle.iter().all(|slot| slot.is_finished()) {
                    break;
                }
            }
            for slot in &idle {
                slot.join();
            }
        }

        self.drain_deferred_queue();

        {
            let mut state = self.monitor.lock().unwrap();
            if let Some(signal) = state.shutdown_signal.take() {
                state
                    .signal_queue
                    .push_back(SignalCore::broadcast_job(&signal, 0, true));
            }
            drop(state);
        }
        self.drain_signal_queue();

        self.monitor.lock().unwrap().timers.clear();
    }
}

fn timeable_key<T>(timeable: &Arc<dyn Timeable<T>>) -> usize {
    Arc::as_ptr(timeable) as *const () as usize
}

fn threadable_key<T, U>(task: &Arc<dyn Threadable<T, U>>) -> usize {
    Arc::as_ptr(task) as *const () as usize
}
