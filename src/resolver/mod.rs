//! The resolver plugin protocol.
//!
//! Name resolution is split into three roles:
//!
//! * a [`Builder`] is registered for a URI scheme and produces resolvers
//!   for targets with that scheme,
//! * a [`Resolver`] is the long-lived object discovering the addresses
//!   for a single target, and
//! * a [`ClientConn`] is the consumer the resolver pushes its findings to.
//!
//! A resolver pushes a complete [`State`] every time its view of the
//! target changes. It may do so synchronously while being built, later
//! from a background task, or both. Consumers must never assume that
//! addresses are available when [`Builder::build`] returns.
//!
//! A resolver is active from the moment it was built until
//! [`Resolver::close`] is called. Once `close` returns, the resolver must
//! not start any new push to its consumer, though a push that was already
//! under way may still complete. Closing is idempotent. Resolution
//! failures are not fatal: they are reported via
//! [`ClientConn::report_error`] and the resolver stays active.
//!
//! The [`StateSink`] type implements the push side of this contract and is
//! used by all resolvers in this crate. The sub-modules contain the bundled
//! resolver implementations.

use std::fmt;
use std::sync::Arc;

use crate::envconfig::{self, FeatureFlags};
use crate::error::Error;
use crate::state::{ServiceConfig, State};
use crate::target::Target;

pub use self::sink::StateSink;

//------------ Sub-modules ---------------------------------------------------

pub mod manual;
pub mod passthrough;
#[cfg(feature = "runtime")]
pub mod poll;
pub mod sink;
pub mod unix;

//------------ Builder -------------------------------------------------------

/// A factory for resolvers of a single URI scheme.
pub trait Builder: Send + Sync {
    /// Builds a resolver for `target` reporting to `cc`.
    ///
    /// On success, the resolver has either already pushed its first state
    /// or will do so later. On failure, no resolver exists and nothing
    /// will ever be pushed to `cc` for this attempt.
    ///
    /// Failing to find any addresses is not a reason to fail here. Such
    /// problems are reported through [`ClientConn::report_error`] instead.
    fn build(
        &self,
        target: &Target,
        cc: Arc<dyn ClientConn>,
        options: BuildOptions,
    ) -> Result<Box<dyn Resolver>, Error>;

    /// Returns the scheme handled by this builder.
    fn scheme(&self) -> &str;
}

//------------ Resolver ------------------------------------------------------

/// A resolver watching a single target.
///
/// Both methods may be called concurrently from any thread and must never
/// block.
pub trait Resolver: Send + Sync {
    /// Asks the resolver to resolve again as soon as possible.
    ///
    /// This is only a hint. Resolvers are free to ignore it, e.g., if they
    /// don’t poll for changes or if a resolution is already under way.
    /// Calling it after [`close`][Self::close] does nothing.
    fn resolve_now(&self, options: ResolveNowOptions);

    /// Closes the resolver.
    ///
    /// No new push to the consumer is started after this method returns
    /// and all background work is released. Calling it again does nothing.
    fn close(&self);
}

impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    fn resolve_now(&self, options: ResolveNowOptions) {
        (**self).resolve_now(options)
    }

    fn close(&self) {
        (**self).close()
    }
}

impl<R: Resolver + ?Sized> Resolver for Box<R> {
    fn resolve_now(&self, options: ResolveNowOptions) {
        (**self).resolve_now(options)
    }

    fn close(&self) {
        (**self).close()
    }
}

//------------ ClientConn ----------------------------------------------------

/// The consumer of resolver updates.
///
/// Implemented by the connection management of a client. A resolver never
/// calls these methods concurrently, but the consumer has to cope with a
/// call arriving just before or after it started shutting down.
pub trait ClientConn: Send + Sync {
    /// Replaces the consumer’s view of the target with `state`.
    ///
    /// An error means that the consumer rejected the state. The resolver
    /// should log this but need not retry.
    fn update_state(&self, state: State) -> Result<(), Error>;

    /// Reports that resolution failed without changing the state.
    fn report_error(&self, error: Error);

    /// Parses raw service config text into a service config.
    ///
    /// The default implementation accepts any text.
    fn parse_service_config(&self, raw: &str) -> Result<ServiceConfig, Error> {
        Ok(ServiceConfig::new(raw))
    }
}

//------------ DialCredentials -----------------------------------------------

/// Credentials a resolver may use to talk to its naming service securely.
pub trait DialCredentials: fmt::Debug + Send + Sync {
    /// Returns the name of the security protocol, e.g., `"tls"`.
    fn security_protocol(&self) -> &str;

    /// Returns the server name to authenticate, if overridden.
    fn server_name(&self) -> Option<&str> {
        None
    }
}

//------------ BuildOptions --------------------------------------------------

/// Options handed to [`Builder::build`].
#[derive(Clone, Debug)]
pub struct BuildOptions {
    /// Don’t look up service config.
    disable_service_config: bool,

    /// Credentials for fetching metadata from the naming service.
    dial_creds: Option<Arc<dyn DialCredentials>>,

    /// The feature flags in effect for this client.
    flags: Arc<FeatureFlags>,
}

impl BuildOptions {
    /// Returns whether service config lookup is disabled.
    pub fn disable_service_config(&self) -> bool {
        self.disable_service_config
    }

    /// Sets whether service config lookup is disabled.
    pub fn set_disable_service_config(&mut self, value: bool) {
        self.disable_service_config = value
    }

    /// Returns the dial credentials if there are any.
    pub fn dial_creds(&self) -> Option<&Arc<dyn DialCredentials>> {
        self.dial_creds.as_ref()
    }

    /// Sets the dial credentials.
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
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            disable_service_config: false,
            dial_creds: None,
            flags: envconfig::shared(),
        }
    }
}

//------------ ResolveNowOptions ---------------------------------------------

/// Options for [`Resolver::resolve_now`].
///
/// There are no options yet.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct ResolveNowOptions;
