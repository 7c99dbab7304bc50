//! Offloads blocking work to the pool and collects the results through a
//! concentrator.

use reflexis::{Fault, Interrupt, Reactor, Threadable};

use std::sync::Arc;
use std::time::Duration;

struct SlowSquare;

impl Threadable<u64, u64> for SlowSquare {
    fn run(&self, input: u64, interrupt: &Interrupt) -> Result<u64, Fault> {
        // Simulated blocking work, interruptible at its sleep.
        interrupt.sleep(Duration::from_millis(50 * input))?;
        Ok(input * input)
    }
}

fn main() {
    let reactor = Reactor::new();
    reactor.start().expect("reactor should start");

    let concentrator = reactor.new_concentrator::<u64>();
    for n in 1..=5 {
        let task: Arc<dyn Threadable<u64, u64>> = Arc::new(SlowSquare);
        let deferred = reactor.run_thread(task, n).unwrap();
        concentrator.add_input(deferred).unwrap();
    }

    let squares = concentrator.output().defer().unwrap();
    println!("squares: {squares:?}");

    reactor.stop();
    reactor.join().unwrap();
}
