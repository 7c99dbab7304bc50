use reflexis::{Error, Reactor, Signal, Signalable};

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn started() -> Reactor {
    let reactor = Reactor::new();
    reactor.start().expect("reactor should start");
    reactor
}

type DeliveryLog = Arc<Mutex<Vec<(&'static str, i32)>>>;

struct Tagged {
    name: &'static str,
    log: DeliveryLog,
}

impl Tagged {
    fn subscriber(name: &'static str, log: &DeliveryLog) -> Arc<dyn Signalable<i32>> {
        Arc::new(Tagged {
            name,
            log: log.clone(),
        })
    }
}

impl Signalable<i32> for Tagged {
    fn on_signal(&self, _signal: &Signal<i32>, data: &i32) {
        self.log.lock().unwrap().push((self.name, *data));
    }
}

fn wait_for_deliveries(log: &DeliveryLog, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while log.lock().unwrap().len() < count {
        assert!(
            Instant::now() < deadline,
            "expected {count} deliveries, saw {:?}",
            log.lock().unwrap()
        );
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_delivery_follows_priority_then_subscription_order() {
    let reactor = started();
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));

    let signal = reactor.new_signal::<i32>();
    let a = Tagged::subscriber("a", &log);
    let b = Tagged::subscriber("b", &log);
    let c = Tagged::subscriber("c", &log);
    signal.subscribe_with_priority(&a, 5).unwrap();
    signal.subscribe_with_priority(&b, 10).unwrap();
    signal.subscribe(&c).unwrap();

    signal.signal(1).unwrap();
    wait_for_deliveries(&log, 3);
    assert_eq!(*log.lock().unwrap(), vec![("b", 1), ("a", 1), ("c", 1)]);

    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_equal_priorities_keep_subscription_order() {
    let reactor = started();
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));

    let signal = reactor.new_signal::<i32>();
    for name in ["first", "second", "third"] {
        let subscriber = Tagged::subscriber(name, &log);
        signal.subscribe_with_priority(&subscriber, 3).unwrap();
    }

    signal.signal(2).unwrap();
    wait_for_deliveries(&log, 3);
    assert_eq!(
        *log.lock().unwrap(),
        vec![("first", 2), ("second", 2), ("third", 2)]
    );

    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_final_broadcast_clears_subscribers() {
    let reactor = started();
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));

    let signal = reactor.new_signal::<i32>();
    let a = Tagged::subscriber("a", &log);
    signal.subscribe(&a).unwrap();

    signal.signal_final(9).unwrap();
    wait_for_deliveries(&log, 1);

    // The list is now empty; later broadcasts deliver to nobody.
    signal.signal(10).unwrap();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(*log.lock().unwrap(), vec![("a", 9)]);

    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let reactor = started();
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));

    let signal = reactor.new_signal::<i32>();
    let a = Tagged::subscriber("a", &log);
    let b = Tagged::subscriber("b", &log);
    signal.subscribe(&a).unwrap();
    signal.subscribe(&b).unwrap();
    signal.unsubscribe(&a).unwrap();

    signal.signal(4).unwrap();
    wait_for_deliveries(&log, 1);
    assert_eq!(*log.lock().unwrap(), vec![("b", 4)]);

    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_resubscription_moves_the_priority() {
    let reactor = started();
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));

    let signal = reactor.new_signal::<i32>();
    let a = Tagged::subscriber("a", &log);
    let b = Tagged::subscriber("b", &log);
    signal.subscribe_with_priority(&a, 10).unwrap();
    signal.subscribe_with_priority(&b, 5).unwrap();
    // Drop "a" to the back by re-subscribing it lower.
    signal.subscribe_with_priority(&a, 0).unwrap();

    signal.signal(6).unwrap();
    wait_for_deliveries(&log, 2);
    assert_eq!(*log.lock().unwrap(), vec![("b", 6), ("a", 6)]);

    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_restricted_signal_forbids_broadcasting() {
    let reactor = started();
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));

    let signal = reactor.new_signal::<i32>();
    let restricted = signal.restricted();
    assert_eq!(restricted.signal(1), Err(Error::Restricted));
    assert_eq!(restricted.signal_final(1), Err(Error::Restricted));

    // Subscription management passes through the restricted handle.
    let a = Tagged::subscriber("a", &log);
    restricted.subscribe(&a).unwrap();
    signal.signal(2).unwrap();
    wait_for_deliveries(&log, 1);

    reactor.stop();
    reactor.join().unwrap();
}

/// Subscriber that tries to mutate the subscriber list mid-delivery and
/// records the outcome.
struct Meddler {
    outcome: Mutex<Option<Result<(), Error>>>,
    accomplice: Arc<dyn Signalable<i32>>,
}

impl Signalable<i32> for Meddler {
    fn on_signal(&self, signal: &Signal<i32>, _data: &i32) {
        *self.outcome.lock().unwrap() = Some(signal.subscribe(&self.accomplice));
    }
}

#[test]
fn test_subscribing_from_delivery_context_is_rejected() {
    let reactor = started();
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));

    let signal = reactor.new_signal::<i32>();
    let meddler = Arc::new(Meddler {
        outcome: Mutex::new(None),
        accomplice: Tagged::subscriber("x", &log),
    });
    let handle: Arc<dyn Signalable<i32>> = meddler.clone();
    signal.subscribe(&handle).unwrap();

    signal.signal(1).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while meddler.outcome.lock().unwrap().is_none() {
        assert!(Instant::now() < deadline, "meddler never ran");
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(
        *meddler.outcome.lock().unwrap(),
        Some(Err(Error::SignalContext))
    );

    reactor.stop();
    reactor.join().unwrap();
}

/// Subscriber that re-broadcasts from inside delivery; the nested broadcast
/// must be queued, not delivered recursively.
struct Echo {
    log: DeliveryLog,
}

impl Signalable<i32> for Echo {
    fn on_signal(&self, signal: &Signal<i32>, data: &i32) {
        self.log.lock().unwrap().push(("echo", *data));
        if *data == 0 {
            // Restricted handles cannot broadcast; the delivery handle is
            // restricted by design.
            assert_eq!(signal.signal(1), Err(Error::Restricted));
        }
    }
}

/// Subscriber holding its own unrestricted handle; broadcasting from inside
/// a delivery callback is allowed and queues behind the current broadcast.
struct Chain {
    log: DeliveryLog,
    signal: Mutex<Option<Signal<i32>>>,
}

impl Signalable<i32> for Chain {
    fn on_signal(&self, _signal: &Signal<i32>, data: &i32) {
        self.log.lock().unwrap().push(("chain", *data));
        if *data < 2 {
            let guard = self.signal.lock().unwrap();
            guard.as_ref().unwrap().signal(*data + 1).unwrap();
        }
    }
}

#[test]
fn test_broadcasting_from_a_handler_enqueues() {
    let reactor = started();
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));

    let signal = reactor.new_signal::<i32>();
    let chain = Arc::new(Chain {
        log: log.clone(),
        signal: Mutex::new(Some(signal.clone())),
    });
    let handle: Arc<dyn Signalable<i32>> = chain.clone();
    signal.subscribe(&handle).unwrap();

    signal.signal(0).unwrap();
    wait_for_deliveries(&log, 3);
    assert_eq!(
        *log.lock().unwrap(),
        vec![("chain", 0), ("chain", 1), ("chain", 2)]
    );

    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_delivery_handle_is_restricted() {
    let reactor = started();
    let log: DeliveryLog = Arc::new(Mutex::new(Vec::new()));

    let signal = reactor.new_signal::<i32>();
    let echo: Arc<dyn Signalable<i32>> = Arc::new(Echo { log: log.clone() });
    signal.subscribe(&echo).unwrap();

    signal.signal(0).unwrap();
    wait_for_deliveries(&log, 1);

    // Re-broadcasting is still possible through the unrestricted handle,
    // queued behind the current delivery.
    signal.signal(1).unwrap();
    wait_for_deliveries(&log, 2);
    assert_eq!(*log.lock().unwrap(), vec![("echo", 0), ("echo", 1)]);

    reactor.stop();
    reactor.join().unwrap();
}
