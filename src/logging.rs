//! Setting up log output.

use tracing_subscriber::EnvFilter;

/// Sets up logging of the events reported by this crate.
///
/// Use the RUST_LOG environment variable to select what is logged.
///
/// E.g. To enable debug level logging:
///   RUST_LOG=DEBUG
///
/// Or to only see what the resolvers are doing:
///   RUST_LOG=rpc_resolver::resolver=DEBUG
///
/// Or to enable trace level logging but not for the client wrapper:
///   RUST_LOG=TRACE,rpc_resolver::client=OFF
///
/// Calling this more than once, or after another subscriber was set up,
/// does nothing.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_ids(true)
        .without_time()
        .try_init()
        .ok();
}
