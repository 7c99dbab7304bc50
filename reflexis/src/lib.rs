//! # Reflexis
//!
//! **Reflexis** is an event-driven reaction framework built around a
//! single-threaded event-processing core. One dedicated reactor thread
//! serialises every user callback, while a small pool of recycled worker
//! threads carries blocking work off the loop.
//!
//! The reactor drives four cooperating primitives:
//!
//! - **Deferreds** — one-shot futures with an ordered chain of
//!   success/error handlers, optional timeouts, and a blocking escape hatch
//!   for non-reactor threads
//! - **Timers** — one-shot and repeating callbacks ordered on a monotonic
//!   millisecond timebase, with deterministic FIFO tie-breaking
//! - **Signals** — broadcast events delivered to prioritised,
//!   identity-keyed subscribers
//! - **Worker threads** — blocking tasks dispatched to pool workers, their
//!   results fed back through deferreds on the reactor thread
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use reflexis::Reactor;
//!
//! let reactor = Reactor::new();
//! reactor.start()?;
//!
//! let deferred = reactor.new_deferred::<u32>();
//! deferred
//!     .restricted()
//!     .add_callback(|n| Ok(n + 1))?
//!     .add_callback(|n: u32| {
//!         println!("got {n}");
//!         Ok(())
//!     })?
//!     .terminate()?;
//! deferred.callback(41)?;
//!
//! reactor.stop();
//! reactor.join()?;
//! ```
//!
//! ## Modules
//!
//! - [`deferred`] — deferreds, splitters and concentrators
//! - [`signal`] — broadcast signals
//! - [`reactor`] — the reactor itself, timers and the worker pool
//! - [`clock`] — monotonic clock sources
//! - [`logging`] — the log-sink seam and its `log`-facade default

mod error;

pub mod clock;
pub mod deferred;
pub mod logging;
pub mod reactor;
pub mod signal;

pub use error::{Error, Fault, Result};

pub use deferred::{Deferred, DeferredConcentrator, DeferredSplitter};
pub use reactor::{Interrupt, Reactor, ReactorBuilder, Threadable, Timeable};
pub use signal::{Signal, Signalable};
