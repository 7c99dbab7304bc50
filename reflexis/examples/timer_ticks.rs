//! Schedules a repeating timer, lets it tick a few times, then cancels it.

use reflexis::{Reactor, Timeable};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Metronome;

impl Timeable<&'static str> for Metronome {
    fn on_tick(&self, data: &&'static str) {
        println!("tick: {data}");
    }
}

fn main() {
    let reactor = Reactor::new();
    reactor.start().expect("reactor should start");

    let metronome: Arc<dyn Timeable<&'static str>> = Arc::new(Metronome);
    reactor
        .run_timer_repeating(
            &metronome,
            Duration::from_millis(100),
            Duration::from_millis(250),
            "beat",
        )
        .unwrap();

    thread::sleep(Duration::from_millis(1200));
    reactor.cancel_timer(&metronome);

    reactor.stop();
    reactor.join().unwrap();
}
