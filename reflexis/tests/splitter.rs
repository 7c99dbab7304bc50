use reflexis::{Error, Fault, Reactor};

use std::sync::mpsc;
use std::time::Duration;

fn started() -> Reactor {
    let reactor = Reactor::new();
    reactor.start().expect("reactor should start");
    reactor
}

#[test]
fn test_outputs_fire_in_creation_order_with_the_input_value() {
    let reactor = started();
    let (tx, rx) = mpsc::channel();

    let splitter = reactor.new_splitter::<u32>();
    let input = reactor.new_deferred::<u32>();
    splitter.attach_input(input.restricted()).unwrap();

    for tag in 0..3u32 {
        let tx = tx.clone();
        splitter
            .new_output()
            .add_callback(move |value: u32| {
                tx.send((tag, value)).unwrap();
                Ok(())
            })
            .unwrap()
            .terminate()
            .unwrap();
    }

    input.callback(99).unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(rx.recv_timeout(Duration::from_secs(2)).unwrap());
    }
    assert_eq!(seen, vec![(0, 99), (1, 99), (2, 99)]);

    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_late_outputs_inherit_the_cached_outcome() {
    let reactor = started();

    let splitter = reactor.new_splitter::<String>();
    let input = reactor.new_deferred::<String>();
    splitter.attach_input(input.restricted()).unwrap();
    input.callback("cached".to_string()).unwrap();

    // Give the input chain time to reach the splitter.
    let early = splitter.new_output().defer().unwrap();
    assert_eq!(early, "cached");

    let late = splitter.new_output().defer().unwrap();
    assert_eq!(late, "cached");

    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_faults_fan_out_to_every_output() {
    let reactor = started();

    let splitter = reactor.new_splitter::<u32>();
    let input = reactor.new_deferred::<u32>();
    splitter.attach_input(input.restricted()).unwrap();

    let first = splitter.new_output();
    let second = splitter.new_output();
    input.errback(Fault::message("shared failure")).unwrap();

    assert_eq!(first.defer().unwrap_err().to_string(), "shared failure");
    assert_eq!(second.defer().unwrap_err().to_string(), "shared failure");

    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_second_input_is_rejected() {
    let reactor = started();

    let splitter = reactor.new_splitter::<u32>();
    let input = reactor.new_deferred::<u32>();
    splitter.attach_input(input.restricted()).unwrap();

    let another = reactor.new_deferred::<u32>();
    assert_eq!(
        splitter.attach_input(another.restricted()),
        Err(Error::AlreadyAttached)
    );

    input.callback(1).unwrap();
    another.callback(1).unwrap();
    another.restricted().discard().unwrap();
    reactor.stop();
    reactor.join().unwrap();
}

#[test]
fn test_attaching_a_terminated_input_is_rejected() {
    let reactor = started();

    let splitter = reactor.new_splitter::<u32>();
    let input = reactor.new_deferred::<u32>();
    let chain = input.restricted();
    chain.terminate().unwrap();

    assert_eq!(
        splitter.attach_input(input.restricted()),
        Err(Error::ChainTerminated)
    );

    // The splitter is still unattached and usable.
    let replacement = reactor.new_deferred::<u32>();
    splitter.attach_input(replacement.restricted()).unwrap();
    replacement.callback(5).unwrap();
    assert_eq!(splitter.new_output().defer().unwrap(), 5);

    input.callback(0).unwrap();
    reactor.stop();
    reactor.join().unwrap();
}
