//! Resolvers that poll a discovery function.
//!
//! Many naming systems have no way to notify clients about changes and
//! have to be asked again from time to time. [`PollBuilder`] turns any
//! [`Discover`] implementation into a resolver for a scheme. The resolver
//! runs a background task on the Tokio runtime that was current when it
//! was built. The task resolves the target right away and then again
//!
//! * whenever [`Resolver::resolve_now`] is called while no resolution is
//!   pending, and
//! * after the refresh interval has passed, if one is configured.
//!
//! Two resolutions are always at least the minimum interval apart so that
//! a consumer calling `resolve_now` after every failed connection attempt
//! doesn’t hammer the naming service.
//!
//! Discovery errors are reported to the consumer and the resolver keeps
//! going. If the consumer rejects a state, the rejection is logged and the
//! state is not retried until the next resolution.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, trace, warn};

use super::{
    BuildOptions, Builder, ClientConn, ResolveNowOptions, Resolver, StateSink,
};
use crate::error::Error;
use crate::state::State;
use crate::target::Target;
use crate::utils::config::DefMinMax;

//------------ Configuration Constants ---------------------------------------

/// Minimum time between two resolutions.
const MIN_INTERVAL: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(30),
    Duration::ZERO,
    Duration::from_secs(3600),
);

/// Interval for re-resolving without being asked.
const REFRESH_INTERVAL: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(30 * 60),
    Duration::from_millis(1),
    Duration::from_secs(24 * 3600),
);

//------------ Discover ------------------------------------------------------

/// The future returned by [`Discover::discover`].
pub type DiscoverFuture<'a> =
    Pin<Box<dyn Future<Output = Result<State, Error>> + Send + 'a>>;

/// A source of addresses for a target.
pub trait Discover: Send + Sync + 'static {
    /// Looks up the current state of `target`.
    fn discover<'a>(&'a self, target: &'a Target) -> DiscoverFuture<'a>;
}

/// Creates a [`Discover`] from a closure.
///
/// The closure receives the target and returns a future resolving into
/// the new state.
pub fn discover_fn<F, Fut>(op: F) -> DiscoverFn<F>
where
    F: Fn(&Target) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<State, Error>> + Send + 'static,
{
    DiscoverFn { op }
}

/// A [`Discover`] wrapping a closure.
///
/// Values are created via [`discover_fn`].
#[derive(Clone, Debug)]
pub struct DiscoverFn<F> {
    op: F,
}

impl<F, Fut> Discover for DiscoverFn<F>
where
    F: Fn(&Target) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<State, Error>> + Send + 'static,
{
    fn discover<'a>(&'a self, target: &'a Target) -> DiscoverFuture<'a> {
        Box::pin((self.op)(target))
    }
}

//------------ Config --------------------------------------------------------

/// Configuration of a polling resolver.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Minimum time between the start of two resolutions.
    min_interval: Duration,

    /// Re-resolve after this long even if nobody asked.
    refresh_interval: Option<Duration>,
}

impl Config {
    /// Returns the minimum interval between resolutions.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Sets the minimum interval between resolutions.
    ///
    /// Values above one hour are capped.
    pub fn set_min_interval(&mut self, value: Duration) {
        self.min_interval = MIN_INTERVAL.limit(value)
    }

    /// Returns the refresh interval.
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval
    }

    /// Sets the refresh interval.
    ///
    /// With `None`, the resolver only resolves again when asked to.
    pub fn set_refresh_interval(&mut self, value: Option<Duration>) {
        self.refresh_interval = value.map(|value| REFRESH_INTERVAL.limit(value))
    }

    /// Enables refreshing with the default interval of thirty minutes.
    pub fn set_default_refresh(&mut self) {
        self.refresh_interval = Some(REFRESH_INTERVAL.default())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_interval: MIN_INTERVAL.default(),
            refresh_interval: None,
        }
    }
}

//------------ PollBuilder ---------------------------------------------------

/// Builds polling resolvers for a scheme.
#[derive(Debug)]
pub struct PollBuilder<D> {
    scheme: String,
    discover: Arc<D>,
    config: Config,
}

impl<D: Discover> PollBuilder<D> {
    /// Creates a builder with the default configuration.
    pub fn new(scheme: impl Into<String>, discover: D) -> Self {
        Self::with_config(scheme, discover, Config::default())
    }

    /// Creates a builder with the given configuration.
    pub fn with_config(
        scheme: impl Into<String>,
        discover: D,
        config: Config,
    ) -> Self {
        PollBuilder {
            scheme: scheme.into(),
            discover: Arc::new(discover),
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<D: Discover> Builder for PollBuilder<D> {
    /// Builds a resolver and starts its background task.
    ///
    /// Fails if called outside of a Tokio runtime.
    fn build(
        &self,
        target: &Target,
        cc: Arc<dyn ClientConn>,
        options: BuildOptions,
    ) -> Result<Box<dyn Resolver>, Error> {
        let handle = Handle::try_current().map_err(Error::build_failed)?;
        let shared = Arc::new(Shared {
            sink: StateSink::new(cc),
            trigger: Notify::new(),
            pending: AtomicBool::new(true),
        });
        let task = handle.spawn(run(
            target.clone(),
            self.discover.clone(),
            self.config,
            options.disable_service_config(),
            shared.clone(),
        ));
        debug!(%target, "started polling resolver");
        Ok(Box::new(PollResolver {
            shared,
            task: Mutex::new(Some(task)),
        }))
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }
}

//------------ PollResolver --------------------------------------------------

/// State shared between the resolver and its task.
#[derive(Debug)]
struct Shared {
    sink: StateSink,

    /// Wakes up the task for an early resolution.
    trigger: Notify,

    /// A resolution is waiting to start or running.
    pending: AtomicBool,
}

#[derive(Debug)]
struct PollResolver {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Resolver for PollResolver {
    fn resolve_now(&self, _options: ResolveNowOptions) {
        if self.shared.sink.is_closed() {
            return;
        }
        // Only the call that flips `pending` may wake the task. Otherwise a
        // second call before the task runs leaves a permit for another
        // round.
        if self
            .shared
            .pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.shared.trigger.notify_one();
        }
    }

    fn close(&self) {
        if !self.shared.sink.close() {
            return;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        debug!("closed polling resolver");
    }
}

impl Drop for PollResolver {
    fn drop(&mut self) {
        self.close()
    }
}

/// The background task of a polling resolver.
async fn run<D: Discover>(
    target: Target,
    discover: Arc<D>,
    config: Config,
    disable_service_config: bool,
    shared: Arc<Shared>,
) {
    let mut last_start: Option<Instant> = None;
    loop {
        shared.pending.store(true, Ordering::SeqCst);
        if let Some(last_start) = last_start {
            sleep_until(last_start + config.min_interval).await;
        }
        last_start = Some(Instant::now());
        trace!(%target, "resolving");
        let res = discover.discover(&target).await;
        shared.pending.store(false, Ordering::SeqCst);

        match res {
            Ok(mut state) => {
                if disable_service_config {
                    state = state.without_service_config();
                }
                match shared.sink.update_state(state) {
                    Ok(()) => {}
                    Err(Error::Closed) => return,
                    Err(err) => warn!(%target, "state rejected: {err}"),
                }
            }
            Err(err) => {
                debug!(%target, "resolution failed: {err}");
                if shared.sink.report_error(err).is_err() {
                    return;
                }
            }
        }

        match config.refresh_interval {
            Some(interval) => {
                tokio::select! {
                    _ = shared.trigger.notified() => {}
                    _ = sleep(interval) => {}
                }
            }
            None => shared.trigger.notified().await,
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::{Address, ServiceConfig};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    #[derive(Debug)]
    enum Event {
        State(State),
        Error(Error),
    }

    struct ChannelConn(mpsc::UnboundedSender<Event>);

    impl ClientConn for ChannelConn {
        fn update_state(&self, state: State) -> Result<(), Error> {
            let _ = self.0.send(Event::State(state));
            Ok(())
        }

        fn report_error(&self, error: Error) {
            let _ = self.0.send(Event::Error(error));
        }
    }

    /// Returns a discover that fails on the given rounds and otherwise
    /// returns the round number as the port.
    fn counting(
        fail_on: &'static [usize],
    ) -> (Arc<AtomicUsize>, impl Discover) {
        let rounds = Arc::new(AtomicUsize::new(0));
        let counter = rounds.clone();
        let discover = discover_fn(move |target: &Target| {
            let round = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let host = target.endpoint().to_string();
            async move {
                if fail_on.contains(&round) {
                    Err(Error::resolution("unreachable"))
                } else {
                    Ok(State::new(vec![Address::new(format!("{host}:{round}"))])
                        .with_service_config(ServiceConfig::new("{}")))
                }
            }
        });
        (rounds, discover)
    }

    fn build(
        builder: &impl Builder,
        options: BuildOptions,
    ) -> (Box<dyn Resolver>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let target = Target::parse("poll:///svc").unwrap();
        let resolver = builder
            .build(&target, Arc::new(ChannelConn(tx)), options)
            .unwrap();
        (resolver, rx)
    }

    fn addr(event: Event) -> String {
        match event {
            Event::State(state) => state.addresses()[0].addr().to_string(),
            Event::Error(err) => panic!("unexpected error {err}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_initially_and_on_request() {
        let (rounds, discover) = counting(&[]);
        let builder = PollBuilder::new("poll", discover);
        let (resolver, mut rx) = build(&builder, BuildOptions::default());

        assert_eq!(addr(rx.recv().await.unwrap()), "svc:1");
        resolver.resolve_now(ResolveNowOptions::default());
        assert_eq!(addr(rx.recv().await.unwrap()), "svc:2");
        assert_eq!(rounds.load(Ordering::SeqCst), 2);
        resolver.close();
    }

    #[tokio::test(start_paused = true)]
    async fn respects_min_interval() {
        let (_, discover) = counting(&[]);
        let builder = PollBuilder::new("poll", discover);
        let (resolver, mut rx) = build(&builder, BuildOptions::default());

        rx.recv().await.unwrap();
        let start = Instant::now();
        resolver.resolve_now(ResolveNowOptions::default());
        rx.recv().await.unwrap();
        assert!(start.elapsed() >= builder.config().min_interval());
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_periodically() {
        let (_, discover) = counting(&[]);
        let mut config = Config::default();
        config.set_min_interval(Duration::ZERO);
        config.set_refresh_interval(Some(Duration::from_secs(60)));
        let builder = PollBuilder::with_config("poll", discover, config);
        let (_resolver, mut rx) = build(&builder, BuildOptions::default());

        assert_eq!(addr(rx.recv().await.unwrap()), "svc:1");
        assert_eq!(addr(rx.recv().await.unwrap()), "svc:2");
        assert_eq!(addr(rx.recv().await.unwrap()), "svc:3");
    }

    #[tokio::test(start_paused = true)]
    async fn errors_do_not_close() {
        let (_, discover) = counting(&[1]);
        let mut config = Config::default();
        config.set_min_interval(Duration::ZERO);
        let builder = PollBuilder::with_config("poll", discover, config);
        let (resolver, mut rx) = build(&builder, BuildOptions::default());

        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::Error(Error::Resolution(_))
        ));
        resolver.resolve_now(ResolveNowOptions::default());
        assert_eq!(addr(rx.recv().await.unwrap()), "svc:2");
    }

    #[tokio::test(start_paused = true)]
    async fn service_config_can_be_disabled() {
        let (_, discover) = counting(&[]);
        let builder = PollBuilder::new("poll", discover);
        let mut options = BuildOptions::default();
        options.set_disable_service_config(true);
        let (_resolver, mut rx) = build(&builder, options);

        match rx.recv().await.unwrap() {
            Event::State(state) => assert!(state.service_config().is_none()),
            Event::Error(err) => panic!("unexpected error {err}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_after_close() {
        let (rounds, discover) = counting(&[]);
        let mut config = Config::default();
        config.set_min_interval(Duration::ZERO);
        config.set_refresh_interval(Some(Duration::from_secs(1)));
        let builder = PollBuilder::with_config("poll", discover, config);
        let (resolver, mut rx) = build(&builder, BuildOptions::default());

        rx.recv().await.unwrap();
        resolver.close();
        resolver.close();
        resolver.resolve_now(ResolveNowOptions::default());
        sleep(Duration::from_secs(10)).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(rounds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ignores_request_while_resolving() {
        let gate = Arc::new(Notify::new());
        let rounds = Arc::new(AtomicUsize::new(0));
        let discover = {
            let gate = gate.clone();
            let rounds = rounds.clone();
            discover_fn(move |_: &Target| {
                rounds.fetch_add(1, Ordering::SeqCst);
                let gate = gate.clone();
                async move {
                    gate.notified().await;
                    Ok::<_, Error>(State::new(vec![Address::new("svc:1")]))
                }
            })
        };
        let builder = PollBuilder::new("poll", discover);
        let (resolver, mut rx) = build(&builder, BuildOptions::default());

        // Let the task start the first resolution and block in it.
        sleep(Duration::from_millis(1)).await;
        assert_eq!(rounds.load(Ordering::SeqCst), 1);
        resolver.resolve_now(ResolveNowOptions::default());
        resolver.resolve_now(ResolveNowOptions::default());

        gate.notify_one();
        assert_eq!(addr(rx.recv().await.unwrap()), "svc:1");
        sleep(Duration::from_secs(3600)).await;
        assert_eq!(rounds.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_requests_resolve_once() {
        let (rounds, discover) = counting(&[]);
        let builder = PollBuilder::new("poll", discover);
        let (resolver, mut rx) = build(&builder, BuildOptions::default());

        assert_eq!(addr(rx.recv().await.unwrap()), "svc:1");
        // Make sure the task is waiting for a trigger.
        sleep(Duration::from_millis(1)).await;
        resolver.resolve_now(ResolveNowOptions::default());
        resolver.resolve_now(ResolveNowOptions::default());
        assert_eq!(addr(rx.recv().await.unwrap()), "svc:2");

        sleep(Duration::from_secs(3600)).await;
        assert_eq!(rounds.load(Ordering::SeqCst), 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn build_needs_runtime() {
        let (_, discover) = counting(&[]);
        let builder = PollBuilder::new("poll", discover);
        let (tx, _rx) = mpsc::unbounded_channel();
        let target = Target::parse("poll:///svc").unwrap();
        let res = builder.build(
            &target,
            Arc::new(ChannelConn(tx)),
            BuildOptions::default(),
        );
        assert!(matches!(res, Err(Error::BuildFailed(_))));
    }
}
