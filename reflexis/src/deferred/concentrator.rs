use std::panic::Location;
use std::sync::{Arc, Mutex, Weak};

use crate::error::{Error, Fault};
use crate::reactor::core::ReactorCore;

use super::core::DeferredCore;
use super::Deferred;

/// Gathers any number of input deferreds into one list-valued output.
///
/// Each input is assigned the next 0-based position in the result list as it
/// is added. When every input has completed successfully, the output fires
/// with the full ordered list. When any input fails, the first fault is
/// latched, later results are discarded, and the output fires with that
/// fault as soon as it has been requested.
pub struct DeferredConcentrator<T> {
    inner: Arc<ConcentratorCore<T>>,
}

struct ConcentratorCore<T> {
    reactor: Weak<ReactorCore>,
    state: Mutex<ConcentratorState<T>>,
}

struct ConcentratorState<T> {
    results: Vec<Option<T>>,
    inputs: usize,
    remaining: usize,
    fault: Option<Fault>,
    output: Option<Arc<DeferredCore>>,
}

impl<T: Send + 'static> DeferredConcentrator<T> {
    pub(crate) fn new(reactor: Weak<ReactorCore>) -> Self {
        DeferredConcentrator {
            inner: Arc::new(ConcentratorCore {
                reactor,
                state: Mutex::new(ConcentratorState {
                    results: Vec::new(),
                    inputs: 0,
                    remaining: 0,
                    fault: None,
                    output: None,
                }),
            }),
        }
    }

    /// Adds an input deferred, terminating its chain at this concentrator.
    ///
    /// Fails with [`Error::ChainTerminated`] once the output has been
    /// requested, or when the input's own chain is already closed.
    pub fn add_input(&self, input: Deferred<T>) -> Result<(), Error> {
        let index = {
            let mut state = self.inner.state.lock().unwrap();
            if state.output.is_some() {
                return Err(Error::ChainTerminated);
            }
            let index = state.inputs;
            state.inputs += 1;
            state.remaining += 1;
            index
        };

        let on_value = {
            let inner = self.inner.clone();
            move |value: T| {
                inner.input_value(index, value);
                Ok(())
            }
        };
        let on_error = {
            let inner = self.inner.clone();
            move |fault: Fault| {
                inner.input_error(fault);
                Ok(())
            }
        };

        let terminated = input
            .add_callbacks(on_value, on_error)
            .and_then(|chain| chain.terminate());
        if let Err(error) = terminated {
            let mut state = self.inner.state.lock().unwrap();
            state.inputs -= 1;
            state.remaining -= 1;
            return Err(error);
        }
        Ok(())
    }

    /// Requests the output deferred; no further inputs can be added.
    ///
    /// If the inputs have already resolved — all successfully, or any with a
    /// fault — the output is triggered immediately. The returned handle is
    /// restricted.
    #[track_caller]
    pub fn output(&self) -> Deferred<Vec<T>> {
        let origin = Location::caller();
        let mut state = self.inner.state.lock().unwrap();
        if state.output.is_none() {
            let core = DeferredCore::new(self.inner.reactor.clone(), origin);
            state.output = Some(core.clone());
            if let Some(fault) = &state.fault {
                let fault = fault.clone();
                drop(state);
                let _ = core.trigger_error(fault);
                return Deferred::from_core(core, true);
            }
            if state.remaining == 0 {
                let results = collect_results(&mut state);
                drop(state);
                let _ = core.trigger_value(Box::new(results));
                return Deferred::from_core(core, true);
            }
            drop(state);
            return Deferred::from_core(core, true);
        }

        let core = state
            .output
            .clone()
            .expect("concentrator output requested but missing");
        drop(state);
        Deferred::from_core(core, true)
    }
}

impl<T: Send + 'static> ConcentratorCore<T> {
    fn input_value(&self, index: usize, value: T) {
        let fire = {
            let mut state = self.state.lock().unwrap();
            if state.fault.is_some() {
                // A fault has been latched; later results are discarded.
                return;
            }
            while state.results.len() <= index {
                state.results.push(None);
            }
            state.results[index] = Some(value);
            state.remaining -= 1;
            if state.remaining == 0 && state.output.is_some() {
                let results = collect_results(&mut state);
                let output = state
                    .output
                    .clone()
                    .expect("concentrator completion lost its output");
                Some((output, results))
            } else {
                None
            }
        };
        if let Some((output, results)) = fire {
            let _ = output.trigger_value(Box::new(results));
        }
    }

    fn input_error(&self, fault: Fault) {
        let fire = {
            let mut state = self.state.lock().unwrap();
            if state.fault.is_some() {
                // Only the first fault is reported.
                return;
            }
            state.fault = Some(fault.clone());
            state.output.clone()
        };
        if let Some(output) = fire {
            let _ = output.trigger_error(fault);
        }
    }
}

fn collect_results<T>(state: &mut ConcentratorState<T>) -> Vec<T> {
    state
        .results
        .drain(..)
        .map(|slot| slot.expect("concentrator completed with a missing result"))
        .collect()
}
