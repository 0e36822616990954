//! Resolver for Unix domain socket targets.
//!
//! Targets have the form `unix:///absolute/path`. The resolver produces a
//! single address containing the socket path tagged with
//! [`NetworkType::Unix`] and never updates it.

use std::sync::Arc;

use tracing::debug;

use super::{
    BuildOptions, Builder, ClientConn, ResolveNowOptions, Resolver, StateSink,
};
use crate::error::Error;
use crate::state::{Address, Attributes, NetworkType, State, NETWORK_TYPE_KEY};
use crate::target::Target;

/// The scheme of the Unix resolver.
pub const SCHEME: &str = "unix";

//------------ UnixBuilder ---------------------------------------------------

/// Builds resolvers for Unix domain socket paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnixBuilder;

impl Builder for UnixBuilder {
    fn build(
        &self,
        target: &Target,
        cc: Arc<dyn ClientConn>,
        _options: BuildOptions,
    ) -> Result<Box<dyn Resolver>, Error> {
        if !target.authority().is_empty() {
            return Err(Error::build_failed(format!(
                "invalid (non-empty) authority: {}",
                target.authority()
            )));
        }
        if target.endpoint().is_empty() {
            return Err(Error::build_failed("missing socket path"));
        }
        let addr = Address::new(format!("/{}", target.endpoint()))
            .with_attributes(
                Attributes::new()
                    .with_value(NETWORK_TYPE_KEY, NetworkType::Unix),
            );
        let sink = StateSink::new(cc);
        if let Err(err) = sink.update_state(State::new(vec![addr])) {
            debug!(%target, "unix socket state not accepted: {err}");
        }
        Ok(Box::new(UnixResolver { sink }))
    }

    fn scheme(&self) -> &str {
        SCHEME
    }
}

//------------ UnixResolver --------------------------------------------------

#[derive(Debug)]
struct UnixResolver {
    sink: StateSink,
}

impl Resolver for UnixResolver {
    fn resolve_now(&self, _options: ResolveNowOptions) {}

    fn close(&self) {
        self.sink.close();
    }
}

//============ Testing =======================================================
