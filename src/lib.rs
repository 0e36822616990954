//! Pluggable name resolution for RPC clients.
//!
//! This crate provides the layer between an RPC client and the mechanisms
//! it uses to find the addresses of its servers. A client names its server
//! with a target URI such as `passthrough:///10.0.0.1:443` or
//! `unix:///run/app.sock`. The URI’s scheme selects a resolver builder from
//! a [registry], the builder creates a long-lived resolver for the target,
//! and the resolver keeps pushing the addresses it discovers to the client.
//!
//! The crate consists of the following parts:
//!
//! * [target] parses target URIs,
//! * [state] contains the addresses and configuration a resolver pushes,
//! * [resolver] defines the protocol between builders, resolvers, and
//!   clients and contains the bundled resolvers,
//! * [registry] maps schemes to builders, and
//! * [envconfig] reads feature flags from the process environment.
#![cfg_attr(feature = "runtime", doc = "* [client]")]
#![cfg_attr(not(feature = "runtime"), doc = "* client")]
//!   runs a resolver on behalf of a client and follows its updates.
//!
//! # Feature Flags
//!
//! * `runtime` (enabled by default) adds everything that needs a
//!   [Tokio](https://tokio.rs/) runtime: the [client] module and the
//!   polling resolver in `resolver::poll`.
//! * `logging` (enabled by default) adds a helper for setting up a
//!   `tracing` subscriber. All parts of the crate report what they do via
//!   `tracing` regardless of this feature.

#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "runtime")]
#[cfg_attr(docsrs, doc(cfg(feature = "runtime")))]
pub mod client;
pub mod envconfig;
pub mod error;
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;
pub mod registry;
pub mod resolver;
pub mod state;
pub mod target;

#[cfg(feature = "runtime")]
mod utils;

#[cfg(test)]
mod test;

pub use self::error::Error;
pub use self::registry::Registry;
pub use self::resolver::{Builder, ClientConn, Resolver};
pub use self::state::{Address, State};
pub use self::target::Target;
