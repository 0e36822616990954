//! Helpers shared by the unit tests.
#![cfg(test)]

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Error;
use crate::resolver::ClientConn;
use crate::state::State;

//------------ RecordingConn -------------------------------------------------

/// A consumer that records everything pushed to it.
#[derive(Debug, Default)]
pub struct RecordingConn {
    states: Mutex<Vec<State>>,
    errors: Mutex<Vec<Error>>,
    reject: Mutex<Option<Arc<str>>>,
}

impl RecordingConn {
    /// Rejects all further states with the given reason.
    pub fn reject_with(&self, reason: &str) {
        *self.reject.lock() = Some(reason.into());
    }

    /// Returns all states pushed so far.
    pub fn states(&self) -> Vec<State> {
        self.states.lock().clone()
    }

    /// Returns all errors reported so far.
    pub fn errors(&self) -> Vec<Error> {
        self.errors.lock().clone()
    }
}

impl ClientConn for RecordingConn {
    fn update_state(&self, state: State) -> Result<(), Error> {
        if let Some(reason) = self.reject.lock().clone() {
            return Err(Error::ConsumerRejected(reason));
        }
        self.states.lock().push(state);
        Ok(())
    }

    fn report_error(&self, error: Error) {
        self.errors.lock().push(error);
    }
}
