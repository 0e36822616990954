//! The consumer side of name resolution.
//!
//! [`ResolverWrapper`] is what a client uses to turn its target string into
//! a running resolver and to follow the states the resolver pushes. It
//! implements [`ClientConn`] on the client’s behalf and publishes every
//! change as a [`Resolved`] snapshot on a Tokio watch channel that the
//! connection management can wait on.
//!
//! The wrapper takes care of the consumer’s duties in the resolver
//! protocol. Pushes that arrive after it was closed are accepted and
//! dropped, pushes repeating the current state don’t wake up watchers, and
//! service config is removed or validated as configured.
//!
//! Closing the wrapper closes the watch channel, too. Watchers waiting for
//! a change then receive an error instead of waiting forever.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::envconfig::{self, FeatureFlags};
use crate::error::Error;
use crate::registry::Registry;
use crate::resolver::{
    BuildOptions, Builder, ClientConn, DialCredentials, ResolveNowOptions,
    Resolver,
};
use crate::state::{ServiceConfig, State};
use crate::target::Target;

/// A function deciding whether a service config is acceptable.
pub type ServiceConfigValidator =
    Arc<dyn Fn(&ServiceConfig) -> Result<(), String> + Send + Sync>;

//------------ ClientOptions -------------------------------------------------

/// Options for creating a [`ResolverWrapper`].
#[derive(Clone)]
pub struct ClientOptions {
    /// The scheme to use for targets without a registered scheme.
    default_scheme: Option<String>,

    /// Ignore service config provided by resolvers.
    disable_service_config: bool,

    /// Credentials handed to the resolver.
    dial_creds: Option<Arc<dyn DialCredentials>>,

    /// The feature flags handed to the resolver.
    flags: Arc<FeatureFlags>,

    /// Checks service config before a state is accepted.
    validator: Option<ServiceConfigValidator>,
}

impl ClientOptions {
    /// Returns the default scheme.
    pub fn default_scheme(&self) -> Option<&str> {
        self.default_scheme.as_deref()
    }

    /// Sets the default scheme.
    ///
    /// Without a default scheme, a target without a registered scheme is
    /// an error.
    pub fn set_default_scheme(&mut self, scheme: Option<String>) {
        self.default_scheme = scheme
    }

    /// Returns whether service config is ignored.
    pub fn disable_service_config(&self) -> bool {
        self.disable_service_config
    }

    /// Sets whether service config is ignored.
    pub fn set_disable_service_config(&mut self, value: bool) {
        self.disable_service_config = value
    }

    /// Sets the credentials handed to the resolver.
    pub fn set_dial_creds(&mut self, creds: Option<Arc<dyn DialCredentials>>) {
        self.dial_creds = creds
    }

    /// Returns the feature flags.
    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    /// Sets the feature flags.
    pub fn set_flags(&mut self, flags: Arc<FeatureFlags>) {
        self.flags = flags
    }

    /// Sets the service config validator.
    ///
    /// States whose service config fails validation are rejected with
    /// [`Error::ConsumerRejected`].
    pub fn set_service_config_validator(
        &mut self,
        validator: Option<ServiceConfigValidator>,
    ) {
        self.validator = validator
    }

    fn build_options(&self) -> BuildOptions {
        let mut res = BuildOptions::default();
        res.set_disable_service_config(self.disable_service_config);
        res.set_dial_creds(self.dial_creds.clone());
        res.set_flags(self.flags.clone());
        res
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            default_scheme: None,
            disable_service_config: false,
            dial_creds: None,
            flags: envconfig::shared(),
            validator: None,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("default_scheme", &self.default_scheme)
            .field("disable_service_config", &self.disable_service_config)
            .field("dial_creds", &self.dial_creds)
            .field("flags", &self.flags)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

//------------ Resolved ------------------------------------------------------

/// What the client currently knows about its target.
#[derive(Clone, Debug, Default)]
pub struct Resolved {
    state: Option<State>,
    error: Option<Error>,
    updates: u64,
}

impl Resolved {
    /// Returns the most recent state, if any has been received.
    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    /// Returns the error reported since the last state, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Returns how many changes have been applied so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

//------------ ResolverWrapper -----------------------------------------------

/// A running resolver together with the consumer receiving its updates.
///
/// Dropping the wrapper closes the resolver.
pub struct ResolverWrapper {
    target: Target,
    conn: Arc<WatchConn>,
    resolver: Box<dyn Resolver>,
    rx: watch::Receiver<Resolved>,
}

impl ResolverWrapper {
    /// Starts resolving `target` with a builder from `registry`.
    ///
    /// Fails with [`Error::InvalidTarget`] or [`Error::SchemeNotFound`] if
    /// no builder can be found and no usable default scheme is configured,
    /// and with [`Error::BuildFailed`] if the builder fails.
    pub fn new(
        registry: &Registry,
        target: &str,
        options: ClientOptions,
    ) -> Result<Self, Error> {
        let (target, builder) =
            select_builder(registry, target, options.default_scheme())?;
        let (tx, rx) = watch::channel(Resolved::default());
        let conn = Arc::new(WatchConn {
            tx: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
            disable_service_config: options.disable_service_config,
            validator: options.validator.clone(),
        });
        let cc: Arc<dyn ClientConn> = conn.clone();
        let resolver = builder
            .build(&target, cc, options.build_options())
            .map_err(|err| {
                warn!(%target, "failed to build resolver: {err}");
                match err {
                    Error::BuildFailed(_) => err,
                    err => Error::build_failed(err),
                }
            })?;
        debug!(%target, "resolver started");
        Ok(ResolverWrapper {
            target,
            conn,
            resolver,
            rx,
        })
    }

    /// Returns the target being resolved.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns a receiver following the resolved snapshots.
    ///
    /// Once the wrapper is closed, waiting for changes on the receiver
    /// fails.
    pub fn watch(&self) -> watch::Receiver<Resolved> {
        self.rx.clone()
    }

    /// Returns the current snapshot.
    pub fn current(&self) -> Resolved {
        self.rx.borrow().clone()
    }

    /// Asks the resolver to resolve again.
    pub fn resolve_now(&self) {
        if !self.is_closed() {
            self.resolver.resolve_now(ResolveNowOptions::default())
        }
    }

    /// Closes the resolver.
    ///
    /// Updates arriving afterwards are ignored and watchers are released.
    /// Calling this again does nothing.
    pub fn close(&self) {
        if self.conn.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        drop(self.conn.tx.lock().take());
        self.resolver.close();
        debug!(target = %self.target, "resolver closed");
    }

    /// Returns whether the wrapper has been closed.
    pub fn is_closed(&self) -> bool {
        self.conn.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ResolverWrapper {
    fn drop(&mut self) {
        self.close()
    }
}

impl fmt::Debug for ResolverWrapper {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResolverWrapper")
            .field("target", &self.target)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Finds the target and builder for a target string.
fn select_builder(
    registry: &Registry,
    raw: &str,
    default_scheme: Option<&str>,
) -> Result<(Target, Arc<dyn Builder>), Error> {
    let parsed = Target::parse(raw);
    if let Ok(target) = &parsed {
        if let Some(builder) = registry.get(target.scheme()) {
            return Ok((target.clone(), builder));
        }
    }
    let Some(default_scheme) = default_scheme else {
        return Err(match parsed {
            Ok(target) => Error::SchemeNotFound(target.scheme().into()),
            Err(err) => err.into(),
        });
    };
    let target = Target::with_scheme(default_scheme, raw)?;
    let builder = registry.lookup(&target)?;
    trace!(%target, "using default scheme");
    Ok((target, builder))
}

//------------ WatchConn -----------------------------------------------------

/// The consumer handed to the resolver.
struct WatchConn {
    /// Taken when the wrapper is closed.
    tx: Mutex<Option<watch::Sender<Resolved>>>,
    closed: AtomicBool,
    disable_service_config: bool,
    validator: Option<ServiceConfigValidator>,
}

impl WatchConn {
    fn validate(&self, config: &ServiceConfig) -> Result<(), Error> {
        match &self.validator {
            Some(validator) => validator(config).map_err(|reason| {
                warn!("rejecting service config: {reason}");
                Error::consumer_rejected(reason)
            }),
            None => Ok(()),
        }
    }
}

impl ClientConn for WatchConn {
    fn update_state(&self, state: State) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            trace!("ignoring state pushed after close");
            return Ok(());
        }
        let state = if self.disable_service_config {
            state.without_service_config()
        } else {
            state
        };
        if let Some(config) = state.service_config() {
            self.validate(config)?;
        }
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            trace!("ignoring state pushed after close");
            return Ok(());
        };
        tx.send_if_modified(|current| {
            if current.error.is_none() && current.state.as_ref() == Some(&state)
            {
                trace!("ignoring redundant state");
                return false;
            }
            current.state = Some(state);
            current.error = None;
            current.updates += 1;
            true
        });
        Ok(())
    }

    fn report_error(&self, error: Error) {
        if self.closed.load(Ordering::SeqCst) {
            trace!("ignoring error reported after close: {error}");
            return;
        }
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            trace!("ignoring error reported after close: {error}");
            return;
        };
        debug!("resolver reported error: {error}");
        tx.send_modify(|current| {
            current.error = Some(error);
            current.updates += 1;
        });
    }

    fn parse_service_config(&self, raw: &str) -> Result<ServiceConfig, Error> {
        let config = ServiceConfig::new(raw);
        self.validate(&config)?;
        Ok(config)
    }
}

//============ Testing =======================================================
