//! The pass-through resolver.
//!
//! This resolver doesn’t resolve anything. It hands the target’s endpoint
//! back to the consumer as the one and only address, once, while being
//! built. It never updates its state afterwards.

use std::sync::Arc;

use tracing::debug;

use super::{
    BuildOptions, Builder, ClientConn, ResolveNowOptions, Resolver, StateSink,
};
use crate::error::Error;
use crate::state::{Address, State};
use crate::target::Target;

/// The scheme of the pass-through resolver.
pub const SCHEME: &str = "passthrough";

//------------ PassthroughBuilder --------------------------------------------

/// Builds pass-through resolvers.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughBuilder;

impl Builder for PassthroughBuilder {
    fn build(
        &self,
        target: &Target,
        cc: Arc<dyn ClientConn>,
        _options: BuildOptions,
    ) -> Result<Box<dyn Resolver>, Error> {
        let resolver = PassthroughResolver {
            sink: StateSink::new(cc),
        };
        resolver.start(target);
        Ok(Box::new(resolver))
    }

    fn scheme(&self) -> &str {
        SCHEME
    }
}

//------------ PassthroughResolver -------------------------------------------

#[derive(Debug)]
struct PassthroughResolver {
    sink: StateSink,
}

impl PassthroughResolver {
    fn start(&self, target: &Target) {
        let state = State::new(vec![Address::new(target.endpoint())]);
        if let Err(err) = self.sink.update_state(state) {
            debug!(%target, "pass-through state not accepted: {err}");
        }
    }
}

impl Resolver for PassthroughResolver {
    fn resolve_now(&self, _options: ResolveNowOptions) {}

    fn close(&self) {
        self.sink.close();
    }
}

//============ Testing =======================================================
