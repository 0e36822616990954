//! Serialized delivery of resolver updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::trace;

use super::ClientConn;
use crate::error::Error;
use crate::state::State;

//------------ StateSink -----------------------------------------------------

/// The push side of a resolver.
///
/// A sink wraps the consumer handed to a builder and enforces the rules a
/// resolver has to follow when pushing to it:
///
/// * pushes are serialized, the consumer never sees two calls from the
///   same sink at the same time, and
/// * once [`close`][Self::close] has returned, the consumer isn’t called
///   anymore.
///
/// Closing waits for a push running on another thread to finish. The lock
/// is reentrant, so the consumer may close the sink from within its
/// callback. It must not hand the close off to another thread and wait
/// for it there, and it must not push through the same sink from within
/// its callback.
pub struct StateSink {
    /// The consumer.
    cc: Arc<dyn ClientConn>,

    /// Held while calling into the consumer and while closing.
    push: ReentrantMutex<()>,

    /// Whether the sink has been closed.
    closed: AtomicBool,
}

impl StateSink {
    /// Creates a new sink for the given consumer.
    pub fn new(cc: Arc<dyn ClientConn>) -> Self {
        StateSink {
            cc,
            push: ReentrantMutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Pushes a new state to the consumer.
    ///
    /// Returns [`Error::Closed`] without calling the consumer if the sink
    /// has been closed. Otherwise returns what the consumer returned.
    pub fn update_state(&self, state: State) -> Result<(), Error> {
        let _guard = self.push.lock();
        if self.is_closed() {
            trace!("dropping state update after close");
            return Err(Error::Closed);
        }
        self.cc.update_state(state)
    }

    /// Reports a resolution error to the consumer.
    ///
    /// Returns [`Error::Closed`] without calling the consumer if the sink
    /// has been closed.
    pub fn report_error(&self, error: Error) -> Result<(), Error> {
        let _guard = self.push.lock();
        if self.is_closed() {
            trace!("dropping error report after close: {error}");
            return Err(Error::Closed);
        }
        self.cc.report_error(error);
        Ok(())
    }

    /// Lets the consumer parse raw service config text.
    pub fn parse_service_config(
        &self,
        raw: &str,
    ) -> Result<crate::state::ServiceConfig, Error> {
        self.cc.parse_service_config(raw)
    }

    /// Closes the sink.
    ///
    /// Returns `true` if this call closed the sink and `false` if it had
    /// been closed before. Waits for a push currently running on another
    /// thread.
    pub fn close(&self) -> bool {
        let _guard = self.push.lock();
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Returns whether the sink has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for StateSink {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("StateSink")
            .field("closed", &self.is_closed())
            .finish()
    }
}

//============ Testing =======================================================
