//! A resolver fed by hand.
//!
//! [`ManualResolver`] is both a builder and a handle to the resolvers it
//! built. Whoever owns the handle decides what the resolver reports by
//! calling [`ManualResolver::update_state`] and
//! [`ManualResolver::report_error`]. This is mostly useful for testing
//! consumers and for clients that learn their addresses out of band.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::{
    BuildOptions, Builder, ClientConn, ResolveNowOptions, Resolver, StateSink,
};
use crate::error::Error;
use crate::state::{ServiceConfig, State};
use crate::target::Target;

//------------ ManualResolver ------------------------------------------------

/// A builder producing resolvers whose updates are pushed by hand.
///
/// Values can be cloned cheaply. All clones refer to the same builder.
/// Updates always go to the most recently built resolver.
#[derive(Clone, Debug)]
pub struct ManualResolver {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    /// The scheme to register under.
    scheme: String,

    /// The state pushed by every newly built resolver.
    initial_state: Mutex<Option<State>>,

    /// An error to fail the next build with.
    build_error: Mutex<Option<Error>>,

    /// The most recently built resolver while it is open.
    current: Mutex<Option<Arc<ManualInstance>>>,

    /// The target the most recent resolver was built for.
    last_target: Mutex<Option<Target>>,

    builds: AtomicUsize,

    /// Counters shared with the built resolvers.
    stats: Arc<Stats>,
}

#[derive(Debug, Default)]
struct Stats {
    resolve_now_calls: AtomicUsize,
    closes: AtomicUsize,
}

impl ManualResolver {
    /// Creates a new manual resolver for the given scheme.
    pub fn new(scheme: impl Into<String>) -> Self {
        ManualResolver {
            inner: Arc::new(Inner {
                scheme: scheme.into(),
                initial_state: Mutex::new(None),
                build_error: Mutex::new(None),
                current: Mutex::new(None),
                last_target: Mutex::new(None),
                builds: AtomicUsize::new(0),
                stats: Arc::default(),
            }),
        }
    }

    /// Sets the state every newly built resolver pushes right away.
    #[must_use]
    pub fn with_initial_state(self, state: State) -> Self {
        *self.inner.initial_state.lock() = Some(state);
        self
    }

    /// Makes the next build fail with the given error.
    pub fn fail_next_build(&self, error: Error) {
        *self.inner.build_error.lock() = Some(error);
    }

    /// Pushes a state through the most recently built resolver.
    ///
    /// Returns [`Error::Closed`] if no resolver has been built yet or the
    /// resolver has been closed. Otherwise returns what the consumer
    /// returned.
    pub fn update_state(&self, state: State) -> Result<(), Error> {
        self.current()?.sink.update_state(state)
    }

    /// Reports an error through the most recently built resolver.
    pub fn report_error(&self, error: Error) -> Result<(), Error> {
        self.current()?.sink.report_error(error)
    }

    /// Lets the consumer of the most recently built resolver parse raw
    /// service config.
    pub fn parse_service_config(
        &self,
        raw: &str,
    ) -> Result<ServiceConfig, Error> {
        self.current()?.sink.parse_service_config(raw)
    }

    /// Returns how many resolvers have been built successfully.
    pub fn build_count(&self) -> usize {
        self.inner.builds.load(Ordering::SeqCst)
    }

    /// Returns how often an active resolver was asked to resolve again.
    pub fn resolve_now_count(&self) -> usize {
        self.inner.stats.resolve_now_calls.load(Ordering::SeqCst)
    }

    /// Returns how many resolvers have been closed.
    pub fn close_count(&self) -> usize {
        self.inner.stats.closes.load(Ordering::SeqCst)
    }

    /// Returns the target of the most recently built resolver.
    pub fn last_target(&self) -> Option<Target> {
        self.inner.last_target.lock().clone()
    }

    fn current(&self) -> Result<Arc<ManualInstance>, Error> {
        self.inner.current.lock().clone().ok_or(Error::Closed)
    }
}

impl Builder for ManualResolver {
    fn build(
        &self,
        target: &Target,
        cc: Arc<dyn ClientConn>,
        _options: BuildOptions,
    ) -> Result<Box<dyn Resolver>, Error> {
        if let Some(err) = self.inner.build_error.lock().take() {
            return Err(err);
        }
        let instance = Arc::new(ManualInstance {
            sink: StateSink::new(cc),
            stats: self.inner.stats.clone(),
            builder: Arc::downgrade(&self.inner),
        });
        *self.inner.current.lock() = Some(instance.clone());
        *self.inner.last_target.lock() = Some(target.clone());
        self.inner.builds.fetch_add(1, Ordering::SeqCst);
        trace!(%target, "built manual resolver");

        let initial = self.inner.initial_state.lock().clone();
        if let Some(state) = initial {
            if let Err(err) = instance.sink.update_state(state) {
                trace!(%target, "initial state not accepted: {err}");
            }
        }
        Ok(Box::new(instance))
    }

    fn scheme(&self) -> &str {
        &self.inner.scheme
    }
}

//------------ ManualInstance ------------------------------------------------

#[derive(Debug)]
struct ManualInstance {
    sink: StateSink,
    stats: Arc<Stats>,

    /// The builder, so a closed instance can stop being current.
    builder: Weak<Inner>,
}

impl Resolver for ManualInstance {
    fn resolve_now(&self, _options: ResolveNowOptions) {
        if !self.sink.is_closed() {
            self.stats.resolve_now_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn close(&self) {
        if !self.sink.close() {
            return;
        }
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(inner) = self.builder.upgrade() {
            let mut current = inner.current.lock();
            let is_self = current
                .as_ref()
                .is_some_and(|item| std::ptr::eq(Arc::as_ptr(item), self));
            if is_self {
                *current = None;
            }
        }
    }
}

//============ Testing =======================================================
