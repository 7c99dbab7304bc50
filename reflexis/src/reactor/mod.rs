//! The event-processing core: a single reactor thread draining signal,
//! deferred, thread-completion and timer queues, plus the worker pool it
//! dispatches blocking tasks to.

pub(crate) mod core;
pub(crate) mod timer;
pub(crate) mod worker;

pub use self::core::{Reactor, ReactorBuilder};
pub use self::timer::Timeable;
pub use self::worker::{Interrupt, Threadable};
