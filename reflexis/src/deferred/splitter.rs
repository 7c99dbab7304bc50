use std::panic::Location;
use std::sync::{Arc, Mutex, Weak};

use crate::error::{Error, Fault};
use crate::reactor::core::ReactorCore;

use super::core::DeferredCore;
use super::Deferred;

/// Fans one deferred out to any number of output deferreds.
///
/// The splitter terminates the chain of its single input. Once the input
/// fires, every output — existing or requested later — receives the same
/// outcome, in the order the outputs were created. Values are duplicated
/// with `Clone`; faults are shared.
pub struct DeferredSplitter<T> {
    inner: Arc<SplitterCore<T>>,
}

struct SplitterCore<T> {
    reactor: Weak<ReactorCore>,
    state: Mutex<SplitterState<T>>,
}

struct SplitterState<T> {
    attached: bool,
    outcome: Option<Result<T, Fault>>,
    outputs: Vec<Arc<DeferredCore>>,
}

impl<T: Clone + Send + 'static> DeferredSplitter<T> {
    pub(crate) fn new(reactor: Weak<ReactorCore>) -> Self {
        DeferredSplitter {
            inner: Arc::new(SplitterCore {
                reactor,
                state: Mutex::new(SplitterState {
                    attached: false,
                    outcome: None,
                    outputs: Vec::new(),
                }),
            }),
        }
    }

    /// Attaches the single input deferred, terminating its chain at this
    /// splitter.
    ///
    /// Fails with [`Error::AlreadyAttached`] when an input is already
    /// attached, and with [`Error::ChainTerminated`] when the input's chain
    /// is already closed (in which case the splitter stays unattached).
    pub fn attach_input(&self, input: Deferred<T>) -> Result<(), Error> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.attached {
                return Err(Error::AlreadyAttached);
            }
            state.attached = true;
        }

        let on_value = {
            let inner = self.inner.clone();
            move |value: T| {
                inner.fire(Ok(value));
                Ok(())
            }
        };
        let on_error = {
            let inner = self.inner.clone();
            move |fault: Fault| {
                inner.fire(Err(fault));
                Ok(())
            }
        };

        let terminated = input
            .add_callbacks(on_value, on_error)
            .and_then(|chain| chain.terminate());
        if let Err(error) = terminated {
            self.inner.state.lock().unwrap().attached = false;
            return Err(error);
        }
        Ok(())
    }

    /// Creates a new output deferred.
    ///
    /// Outputs created before the input fires are triggered in creation
    /// order when it does; outputs created afterwards inherit the cached
    /// outcome immediately. The returned handle is restricted.
    #[track_caller]
    pub fn new_output(&self) -> Deferred<T> {
        let core = DeferredCore::new(self.inner.reactor.clone(), Location::caller());

        let mut state = self.inner.state.lock().unwrap();
        match &state.outcome {
            Some(Ok(value)) => {
                let _ = core.trigger_value(Box::new(value.clone()));
            }
            Some(Err(fault)) => {
                let _ = core.trigger_error(fault.clone());
            }
            None => state.outputs.push(core.clone()),
        }
        drop(state);

        Deferred::from_core(core, true)
    }
}

impl<T: Clone + Send + 'static> SplitterCore<T> {
    /// Latches the input outcome and forwards it to every pending output.
    fn fire(&self, outcome: Result<T, Fault>) {
        let outputs = {
            let mut state = self.state.lock().unwrap();
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.outputs)
        };

        for output in outputs {
            let _ = match &outcome {
                Ok(value) => output.trigger_value(Box::new(value.clone())),
                Err(fault) => output.trigger_error(fault.clone()),
            };
        }
    }
}
