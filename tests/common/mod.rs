//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use rpc_resolver::error::Error;
use rpc_resolver::resolver::ClientConn;
use rpc_resolver::state::State;

pub use rpc_resolver::logging::init_logging;

//------------ RecordingConn -------------------------------------------------

/// A consumer remembering everything pushed to it.
#[derive(Debug, Default)]
pub struct RecordingConn {
    states: Mutex<Vec<State>>,
    errors: Mutex<Vec<Error>>,
}

impl RecordingConn {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn states(&self) -> Vec<State> {
        self.states.lock().clone()
    }

    pub fn errors(&self) -> Vec<Error> {
        self.errors.lock().clone()
    }
}

impl ClientConn for RecordingConn {
    fn update_state(&self, state: State) -> Result<(), Error> {
        self.states.lock().push(state);
        Ok(())
    }

    fn report_error(&self, error: Error) {
        self.errors.lock().push(error)
    }
}
