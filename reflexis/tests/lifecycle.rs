use reflexis::logging::{LogTarget, Logger, Severity};
use reflexis::{Error, Fault, Interrupt, Reactor, Signal, Signalable, Threadable};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Log target that keeps every line for inspection.
struct CapturingTarget {
    lines: Arc<Mutex<Vec<(Severity, String)>>>,
}

struct CapturingLogger {
    id: String,
    lines: Arc<Mutex<Vec<(Severity, String)>>>,
}

impl LogTarget for CapturingTarget {
    fn get_logger(&self, id: &str, _resources: Option<&str>) -> Arc<dyn Logger> {
        Arc::new(CapturingLogger {
            id: id.to_owned(),
            lines: self.lines.clone(),
        })
    }
}

impl Logger for CapturingLogger {
    fn id(&self) -> &str {
        &self.id
    }

    fn level(&self) -> Severity {
        Severity::Finest
    }

    fn set_level(&self, _level: Severity) {}

    fn log(&self, severity: Severity, message: &str) {
        self.lines.lock().unwrap().push((severity, message.to_owned()));
    }

    fn log_cause(&self, severity: Severity, message: &str, cause: &dyn std::error::Error) {
        self.lines
            .lock()
            .unwrap()
            .push((severity, format!("{message}: {cause}")));
    }
}

fn capturing_reactor() -> (Reactor, Arc<Mutex<Vec<(Severity, String)>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let reactor = Reactor::builder()
        .log_target(Arc::new(CapturingTarget {
            lines: lines.clone(),
        }))
        .build();
    (reactor, lines)
}

#[test]
fn test_double_start_is_rejected() {
    let reactor = Reactor::new();
    reactor.start().unwrap();
    assert_eq!(reactor.start(), Err(Error::AlreadyRunning));
    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_reactor_restarts_after_shutdown() {
    let reactor = Reactor::new();
    reactor.start().unwrap();
    reactor.stop();
    reactor.join().unwrap();

    reactor.start().unwrap();
    let deferred = reactor.call_deferred(5);
    assert_eq!(deferred.defer().unwrap(), 5);
    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_scheduling_requires_a_running_reactor() {
    let reactor = Reactor::new();

    let signal = reactor.new_signal::<i32>();
    assert_eq!(signal.signal(1), Err(Error::NotRunning));

    let deferred = reactor.new_deferred::<u32>();
    assert_eq!(
        deferred.set_timeout(Duration::from_millis(10)),
        Err(Error::NotRunning)
    );
    deferred.callback(0).unwrap();
    deferred.restricted().discard().unwrap();

    struct Nop;
    impl Threadable<(), ()> for Nop {
        fn run(&self, _input: (), _interrupt: &Interrupt) -> Result<(), Fault> {
            Ok(())
        }
    }
    let task: Arc<dyn Threadable<(), ()>> = Arc::new(Nop);
    assert!(matches!(
        reactor.run_thread(task, ()),
        Err(Error::NotRunning)
    ));
}

#[test]
fn test_uptime_tracks_the_clock() {
    let reactor = Reactor::new();
    assert_eq!(reactor.uptime(), Duration::ZERO);
    reactor.start().unwrap();
    thread::sleep(Duration::from_millis(150));
    assert!(reactor.uptime() >= Duration::from_millis(100));
    reactor.stop();
    reactor.join().unwrap();
}

struct ShutdownObserver {
    payloads: Mutex<Vec<i32>>,
}

impl Signalable<i32> for ShutdownObserver {
    fn on_signal(&self, _signal: &Signal<i32>, data: &i32) {
        self.payloads.lock().unwrap().push(*data);
    }
}

#[test]
fn test_shutdown_signal_delivers_zero_as_final_broadcast() {
    let reactor = Reactor::new();
    reactor.start().unwrap();

    let shutdown = reactor.shutdown_signal();
    assert_eq!(shutdown.signal(1), Err(Error::Restricted));

    let observer = Arc::new(ShutdownObserver {
        payloads: Mutex::new(Vec::new()),
    });
    let handle: Arc<dyn Signalable<i32>> = observer.clone();
    shutdown.subscribe(&handle).unwrap();

    reactor.stop();
    reactor.join().unwrap();
    assert_eq!(*observer.payloads.lock().unwrap(), vec![0]);
}

/// Task that sleeps far beyond the test budget unless interrupted.
struct LongSleeper {
    interrupted: AtomicBool,
}

impl Threadable<(), ()> for LongSleeper {
    fn run(&self, _input: (), interrupt: &Interrupt) -> Result<(), Fault> {
        let outcome = interrupt.sleep(Duration::from_secs(60));
        if outcome.is_err() {
            self.interrupted.store(true, Ordering::Release);
        }
        outcome
    }
}

#[test]
fn test_shutdown_interrupts_running_workers() {
    let reactor = Reactor::new();
    reactor.start().unwrap();

    let sleeper = Arc::new(LongSleeper {
        interrupted: AtomicBool::new(false),
    });
    let task: Arc<dyn Threadable<(), ()>> = sleeper.clone();
    let deferred = reactor.run_thread(task, ()).unwrap();
    deferred.discard().unwrap();
    thread::sleep(Duration::from_millis(100));

    let begun = Instant::now();
    reactor.stop();
    reactor.join().unwrap();

    assert!(
        begun.elapsed() < Duration::from_secs(10),
        "shutdown must not wait out the full sleep"
    );
    assert!(sleeper.interrupted.load(Ordering::Acquire));
}

#[test]
fn test_dropped_untriggered_deferred_is_reported() {
    let (reactor, lines) = capturing_reactor();
    reactor.start().unwrap();

    {
        let _forgotten = reactor.new_deferred::<u32>();
    }

    let warned = lines
        .lock()
        .unwrap()
        .iter()
        .any(|(severity, line)| *severity == Severity::Warning && line.contains("untriggered"));
    assert!(warned, "expected an untriggered-drop warning");

    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_unhandled_chain_error_is_reported() {
    let (reactor, lines) = capturing_reactor();
    reactor.start().unwrap();

    let deferred = reactor.fail_deferred::<u32>(Fault::message("nobody recovers"));
    deferred.discard().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let seen = lines.lock().unwrap().iter().any(|(severity, line)| {
            *severity == Severity::Warning && line.contains("nobody recovers")
        });
        if seen {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "expected an unhandled-error warning, saw {:?}",
            lines.lock().unwrap()
        );
        thread::sleep(Duration::from_millis(10));
    }

    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_join_from_reactor_thread_returns_immediately() {
    let reactor = Reactor::new();
    reactor.start().unwrap();

    // A deferred chain handler runs on the reactor thread; joining from
    // there must not deadlock.
    let reactor_handle = reactor.clone();
    let deferred = reactor.call_deferred(());
    let probe = deferred
        .add_callback(move |_| {
            reactor_handle.join().map_err(Fault::from)?;
            Ok(true)
        })
        .unwrap();
    assert!(probe.defer().unwrap());

    reactor.stop();
    reactor.join().unwrap();
}

/// Timeable that tries a blocking wait from the reactor thread.
struct BadWaiter {
    victim: Mutex<Option<reflexis::Deferred<u32>>>,
    outcome: Mutex<Option<Result<u32, Fault>>>,
}

impl reflexis::Timeable<()> for BadWaiter {
    fn on_tick(&self, _data: &()) {
        if let Some(deferred) = self.victim.lock().unwrap().take() {
            *self.outcome.lock().unwrap() = Some(deferred.defer());
        }
    }
}

#[test]
fn test_defer_on_the_reactor_thread_is_rejected() {
    let reactor = Reactor::new();
    reactor.start().unwrap();

    let waiter = Arc::new(BadWaiter {
        victim: Mutex::new(Some(reactor.new_deferred::<u32>())),
        outcome: Mutex::new(None),
    });
    let handle: Arc<dyn reflexis::Timeable<()>> = waiter.clone();
    reactor
        .run_timer_one_shot(&handle, Duration::from_millis(50), ())
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while waiter.outcome.lock().unwrap().is_none() {
        assert!(Instant::now() < deadline, "timer handler never ran");
        thread::sleep(Duration::from_millis(10));
    }
    let outcome = waiter.outcome.lock().unwrap().take().unwrap();
    let fault = outcome.unwrap_err();
    assert!(
        matches!(fault.downcast_ref::<Error>(), Some(Error::ReactorContext)),
        "unexpected fault: {fault}"
    );

    reactor.stop();
    reactor.join().unwrap();
}
