//! The mapping from URI schemes to resolver builders.
//!
//! A [`Registry`] knows which [`Builder`] is responsible for which scheme.
//! Clients look up the scheme of their target in it to find the builder
//! for their resolver.
//!
//! Registries are meant to be filled while a process starts up and only
//! read afterwards. Reading is lock-free. Registering later is allowed and
//! safe, it is merely more expensive since the whole map is copied.
//!
//! Clients should receive the registry they use explicitly. For the
//! common case of a single registry per process, [`global`] provides one
//! that starts out with the builders bundled with this crate and that
//! plugins can add themselves to via [`register`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::error::Error;
use crate::resolver::passthrough::PassthroughBuilder;
use crate::resolver::unix::UnixBuilder;
use crate::resolver::Builder;
use crate::target::Target;

//------------ Registry ------------------------------------------------------

/// A map from schemes to resolver builders.
pub struct Registry {
    builders: ArcSwap<HashMap<String, Arc<dyn Builder>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Registry {
            builders: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Creates a registry containing the bundled builders.
    ///
    /// These are the builders for the `passthrough` and `unix` schemes.
    pub fn with_defaults() -> Self {
        let res = Self::new();
        res.register(PassthroughBuilder);
        res.register(UnixBuilder);
        res
    }

    /// Registers a builder for its scheme.
    ///
    /// A builder registered earlier for the same scheme is replaced.
    pub fn register(&self, builder: impl Builder + 'static) {
        self.register_arc(Arc::new(builder))
    }

    /// Registers a shared builder for its scheme.
    pub fn register_arc(&self, builder: Arc<dyn Builder>) {
        let scheme = builder.scheme().to_string();
        let prev = self.builders.rcu(|builders| {
            let mut builders = HashMap::clone(builders);
            builders.insert(scheme.clone(), builder.clone());
            builders
        });
        if prev.contains_key(&scheme) {
            debug!(%scheme, "replaced resolver builder");
        } else {
            debug!(%scheme, "registered resolver builder");
        }
    }

    /// Removes the builder for a scheme.
    ///
    /// Returns the removed builder if there was one.
    pub fn unregister(&self, scheme: &str) -> Option<Arc<dyn Builder>> {
        let prev = self.builders.rcu(|builders| {
            let mut builders = HashMap::clone(builders);
            builders.remove(scheme);
            builders
        });
        let res = prev.get(scheme).cloned();
        if res.is_some() {
            debug!(%scheme, "unregistered resolver builder");
        }
        res
    }

    /// Returns the builder for a scheme.
    ///
    /// The scheme must match exactly, including case.
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Builder>> {
        self.builders.load().get(scheme).cloned()
    }

    /// Returns the builder for the target’s scheme.
    pub fn lookup(&self, target: &Target) -> Result<Arc<dyn Builder>, Error> {
        self.get(target.scheme())
            .ok_or_else(|| Error::SchemeNotFound(target.scheme().into()))
    }

    /// Returns the registered schemes in alphabetical order.
    pub fn schemes(&self) -> Vec<String> {
        let mut res: Vec<_> = self.builders.load().keys().cloned().collect();
        res.sort();
        res
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Registry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

//------------ Process Wide Registry -----------------------------------------

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Returns the process wide registry.
///
/// It is created with [`Registry::with_defaults`] on first access.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(Registry::with_defaults)
}

/// Registers a builder with the process wide registry.
pub fn register(builder: impl Builder + 'static) {
    global().register(builder)
}

/// Looks up a builder in the process wide registry.
pub fn get(scheme: &str) -> Option<Arc<dyn Builder>> {
    global().get(scheme)
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolver::manual::ManualResolver;
    use crate::resolver::passthrough;
    use std::thread;

    #[test]
    fn last_registration_wins() {
        let registry = Registry::new();
        let first = ManualResolver::new("test");
        let second = ManualResolver::new("test");
        registry.register(first);
        registry.register(second.clone());

        let target = Target::parse("test:///svc").unwrap();
        let builder = registry.lookup(&target).unwrap();
        let conn = Arc::new(crate::test::RecordingConn::default());
        builder
            .build(&target, conn, Default::default())
            .unwrap();
        assert_eq!(second.build_count(), 1);
        assert_eq!(registry.schemes(), ["test"]);
    }

    #[test]
    fn unknown_scheme() {
        let registry = Registry::with_defaults();
        assert!(registry.get("dns").is_none());
        assert!(registry.get("Passthrough").is_none());
        let target = Target::parse("dns:///example.com").unwrap();
        assert!(matches!(
            registry.lookup(&target),
            Err(Error::SchemeNotFound(scheme)) if scheme == "dns"
        ));
    }

    #[test]
    fn defaults() {
        let registry = Registry::with_defaults();
        assert_eq!(registry.schemes(), ["passthrough", "unix"]);
        assert_eq!(
            registry.get(passthrough::SCHEME).unwrap().scheme(),
            "passthrough"
        );
    }

    #[test]
    fn unregister() {
        let registry = Registry::with_defaults();
        assert!(registry.unregister("unix").is_some());
        assert!(registry.unregister("unix").is_none());
        assert!(registry.get("unix").is_none());
    }

    #[test]
    fn concurrent_lookups() {
        let registry = Arc::new(Registry::with_defaults());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    if i == 0 {
                        registry.register(ManualResolver::new("late"));
                    }
                    for _ in 0..100 {
                        assert!(registry.get("passthrough").is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.get("late").is_some());
    }

    #[test]
    fn global_has_defaults() {
        assert!(get(passthrough::SCHEME).is_some());
        assert!(global().get("unix").is_some());
    }
}
