//! Builds a deferred chain, triggers it late, and prints the carried value.

use reflexis::Reactor;

fn main() {
    let reactor = Reactor::new();
    reactor.start().expect("reactor should start");

    let deferred = reactor.new_deferred::<u32>();
    deferred
        .restricted()
        .add_callback(|n| Ok(n + 1))
        .unwrap()
        .add_callback(|n: u32| Ok(n * 10))
        .unwrap()
        .add_callback(|n: u32| {
            println!("chain carried {n}");
            Ok(())
        })
        .unwrap()
        .terminate()
        .unwrap();

    deferred.callback(3).unwrap();

    reactor.stop();
    reactor.join().unwrap();
}
