//! Feature flags read from the environment.
//!
//! A number of experimental features can be switched on or off through
//! environment variables. The variables are read once and the result is
//! kept in a [`FeatureFlags`] value that doesn’t change afterwards.
//!
//! Boolean flags come in two flavours, see [`Polarity`]: flags for
//! features that have matured are enabled unless their variable is set to
//! `"false"`, flags for features still under test are disabled unless their
//! variable is set to `"true"`. The comparison ignores ASCII case. Any other
//! value is treated like an unset variable.
//!
//! String flags are taken literally. An empty value means the flag is
//! unset. Their content is not checked here.
//!
//! The process wide flags are available through [`global`]. They are read
//! on first access. Components that need flags should receive them
//! explicitly, e.g., via [`BuildOptions`], so that tests can use their own
//! values created with [`FeatureFlags::from_lookup`].
//!
//! [`BuildOptions`]: crate::resolver::BuildOptions

use std::env;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tracing::debug;

//------------ Variable Names ------------------------------------------------

/// The variable holding the path of the xDS bootstrap file.
///
/// If both this and [`XDS_BOOTSTRAP_FILE_CONTENT_ENV`] are set, the file
/// wins.
pub const XDS_BOOTSTRAP_FILE_NAME_ENV: &str = "GRPC_XDS_BOOTSTRAP";

/// The variable holding the content of the xDS bootstrap configuration.
pub const XDS_BOOTSTRAP_FILE_CONTENT_ENV: &str = "GRPC_XDS_BOOTSTRAP_CONFIG";

const RING_HASH_SUPPORT_ENV: &str = "GRPC_XDS_EXPERIMENTAL_ENABLE_RING_HASH";
const CLIENT_SIDE_SECURITY_SUPPORT_ENV: &str =
    "GRPC_XDS_EXPERIMENTAL_SECURITY_SUPPORT";
const AGGREGATE_AND_DNS_SUPPORT_ENV: &str =
    "GRPC_XDS_EXPERIMENTAL_ENABLE_AGGREGATE_AND_LOGICAL_DNS_CLUSTER";
const RBAC_SUPPORT_ENV: &str = "GRPC_XDS_EXPERIMENTAL_RBAC";
const FEDERATION_ENV: &str = "GRPC_EXPERIMENTAL_XDS_FEDERATION";
const C2P_RESOLVER_SUPPORT_ENV: &str = "GRPC_EXPERIMENTAL_GOOGLE_C2P_RESOLVER";

/// The variable overriding the traffic director URI of the C2P resolver.
///
/// Only meant for testing.
pub const C2P_RESOLVER_TEST_ONLY_TRAFFIC_DIRECTOR_URI_ENV: &str =
    "GRPC_TEST_ONLY_GOOGLE_C2P_RESOLVER_TRAFFIC_DIRECTOR_URI";

//------------ Boolean Flags -------------------------------------------------

/// Ring hash load balancing for xDS clusters.
pub const XDS_RING_HASH: BoolFlag =
    BoolFlag::new(RING_HASH_SUPPORT_ENV, Polarity::EnabledUnlessFalse);

/// Processing of security configuration on the client side.
///
/// There is no such flag for servers since they have to opt in through
/// their API anyway.
pub const XDS_CLIENT_SIDE_SECURITY: BoolFlag = BoolFlag::new(
    CLIENT_SIDE_SECURITY_SUPPORT_ENV,
    Polarity::EnabledUnlessFalse,
);

/// Aggregate and logical DNS clusters.
pub const XDS_AGGREGATE_AND_DNS: BoolFlag = BoolFlag::new(
    AGGREGATE_AND_DNS_SUPPORT_ENV,
    Polarity::DisabledUnlessTrue,
);

/// The RBAC HTTP filter configured via xDS.
pub const XDS_RBAC: BoolFlag =
    BoolFlag::new(RBAC_SUPPORT_ENV, Polarity::EnabledUnlessFalse);

/// Support for xDS federation.
pub const XDS_FEDERATION: BoolFlag =
    BoolFlag::new(FEDERATION_ENV, Polarity::DisabledUnlessTrue);

/// The C2P resolver.
pub const C2P_RESOLVER: BoolFlag =
    BoolFlag::new(C2P_RESOLVER_SUPPORT_ENV, Polarity::DisabledUnlessTrue);

//------------ Polarity ------------------------------------------------------

/// How a boolean flag interprets its variable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Polarity {
    /// The flag is on unless the variable is `"false"`.
    EnabledUnlessFalse,

    /// The flag is off unless the variable is `"true"`.
    DisabledUnlessTrue,
}

//------------ BoolFlag ------------------------------------------------------

/// A boolean flag controlled by an environment variable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BoolFlag {
    env: &'static str,
    polarity: Polarity,
}

impl BoolFlag {
    /// Creates a new flag.
    pub const fn new(env: &'static str, polarity: Polarity) -> Self {
        BoolFlag { env, polarity }
    }

    /// Returns the name of the environment variable.
    pub fn env(self) -> &'static str {
        self.env
    }

    /// Returns the polarity of the flag.
    pub fn polarity(self) -> Polarity {
        self.polarity
    }

    /// Returns the flag’s value given the variable’s value.
    ///
    /// `None` stands for an unset variable.
    pub fn eval(self, value: Option<&str>) -> bool {
        let value = value.unwrap_or_default();
        match self.polarity {
            Polarity::EnabledUnlessFalse => !value.eq_ignore_ascii_case("false"),
            Polarity::DisabledUnlessTrue => value.eq_ignore_ascii_case("true"),
        }
    }
}

//------------ FeatureFlags --------------------------------------------------

/// The feature flags of a process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeatureFlags {
    xds_bootstrap_file_name: String,
    xds_bootstrap_file_content: String,
    xds_ring_hash: bool,
    xds_client_side_security: bool,
    xds_aggregate_and_dns: bool,
    xds_rbac: bool,
    xds_federation: bool,
    c2p_resolver: bool,
    c2p_resolver_test_only_traffic_director_uri: String,
}

impl FeatureFlags {
    /// Reads the flags from the process environment.
    ///
    /// Each call reads the environment anew. Use [`global`] for the value
    /// frozen at first access.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| {
            env::var_os(name).map(|value| value.to_string_lossy().into_owned())
        })
    }

    /// Creates the flags using `lookup` to get variable values.
    ///
    /// The closure is called exactly once for each variable and should
    /// return `None` if the variable is not set.
    pub fn from_lookup<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut flag = |f: BoolFlag| f.eval(lookup(f.env).as_deref());
        let xds_ring_hash = flag(XDS_RING_HASH);
        let xds_client_side_security = flag(XDS_CLIENT_SIDE_SECURITY);
        let xds_aggregate_and_dns = flag(XDS_AGGREGATE_AND_DNS);
        let xds_rbac = flag(XDS_RBAC);
        let xds_federation = flag(XDS_FEDERATION);
        let c2p_resolver = flag(C2P_RESOLVER);
        FeatureFlags {
            xds_bootstrap_file_name: lookup(XDS_BOOTSTRAP_FILE_NAME_ENV)
                .unwrap_or_default(),
            xds_bootstrap_file_content: lookup(XDS_BOOTSTRAP_FILE_CONTENT_ENV)
                .unwrap_or_default(),
            xds_ring_hash,
            xds_client_side_security,
            xds_aggregate_and_dns,
            xds_rbac,
            xds_federation,
            c2p_resolver,
            c2p_resolver_test_only_traffic_director_uri: lookup(
                C2P_RESOLVER_TEST_ONLY_TRAFFIC_DIRECTOR_URI_ENV,
            )
            .unwrap_or_default(),
        }
    }

    /// The path of the xDS bootstrap file, empty if unset.
    pub fn xds_bootstrap_file_name(&self) -> &str {
        &self.xds_bootstrap_file_name
    }

    /// The content of the xDS bootstrap config, empty if unset.
    pub fn xds_bootstrap_file_content(&self) -> &str {
        &self.xds_bootstrap_file_content
    }

    /// Returns where to get the xDS bootstrap configuration from.
    ///
    /// The file takes precedence if both variables are set.
    pub fn bootstrap(&self) -> Option<Bootstrap> {
        if !self.xds_bootstrap_file_name.is_empty() {
            Some(Bootstrap::File(self.xds_bootstrap_file_name.as_str().into()))
        } else if !self.xds_bootstrap_file_content.is_empty() {
            Some(Bootstrap::Content(self.xds_bootstrap_file_content.clone()))
        } else {
            None
        }
    }

    /// Whether ring hash support is enabled.
    pub fn xds_ring_hash(&self) -> bool {
        self.xds_ring_hash
    }

    /// Whether client side security configuration is processed.
    pub fn xds_client_side_security(&self) -> bool {
        self.xds_client_side_security
    }

    /// Whether aggregate and logical DNS clusters are processed.
    pub fn xds_aggregate_and_dns(&self) -> bool {
        self.xds_aggregate_and_dns
    }

    /// Whether the RBAC HTTP filter is enabled.
    pub fn xds_rbac(&self) -> bool {
        self.xds_rbac
    }

    /// Whether xDS federation is enabled.
    pub fn xds_federation(&self) -> bool {
        self.xds_federation
    }

    /// Whether the C2P resolver is enabled.
    pub fn c2p_resolver(&self) -> bool {
        self.c2p_resolver
    }

    /// The traffic director URI override for the C2P resolver.
    pub fn c2p_resolver_test_only_traffic_director_uri(&self) -> &str {
        &self.c2p_resolver_test_only_traffic_director_uri
    }
}

impl Default for FeatureFlags {
    /// Returns the flags of an empty environment.
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

//------------ Bootstrap -----------------------------------------------------

/// Where the xDS bootstrap configuration comes from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Bootstrap {
    /// Read the configuration from this file.
    File(PathBuf),

    /// The configuration itself.
    Content(String),
}

//------------ Process Wide Flags --------------------------------------------

static GLOBAL: OnceLock<Arc<FeatureFlags>> = OnceLock::new();

fn global_arc() -> &'static Arc<FeatureFlags> {
    GLOBAL.get_or_init(|| {
        let flags = FeatureFlags::from_env();
        debug!(?flags, "read feature flags from environment");
        Arc::new(flags)
    })
}

/// Returns the process wide feature flags.
///
/// The environment is read on the first call. Later changes to the
/// environment are never observed.
pub fn global() -> &'static FeatureFlags {
    global_arc()
}

/// Returns a shared handle to the process wide feature flags.
pub fn shared() -> Arc<FeatureFlags> {
    global_arc().clone()
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn flags(vars: &[(&str, &str)]) -> FeatureFlags {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        FeatureFlags::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[rstest]
    #[case(None, true)]
    #[case(Some("false"), false)]
    #[case(Some("FALSE"), false)]
    #[case(Some("False"), false)]
    #[case(Some("true"), true)]
    #[case(Some("maybe"), true)]
    #[case(Some(""), true)]
    fn enabled_unless_false(#[case] value: Option<&str>, #[case] expected: bool) {
        assert_eq!(XDS_RING_HASH.eval(value), expected);
        assert_eq!(XDS_CLIENT_SIDE_SECURITY.eval(value), expected);
        assert_eq!(XDS_RBAC.eval(value), expected);
    }

    #[rstest]
    #[case(None, false)]
    #[case(Some("true"), true)]
    #[case(Some("TRUE"), true)]
    #[case(Some("tRuE"), true)]
    #[case(Some("false"), false)]
    #[case(Some("yes"), false)]
    #[case(Some("1"), false)]
    fn disabled_unless_true(#[case] value: Option<&str>, #[case] expected: bool) {
        assert_eq!(XDS_AGGREGATE_AND_DNS.eval(value), expected);
        assert_eq!(XDS_FEDERATION.eval(value), expected);
        assert_eq!(C2P_RESOLVER.eval(value), expected);
    }

    #[test]
    fn defaults() {
        let flags = FeatureFlags::default();
        assert!(flags.xds_ring_hash());
        assert!(flags.xds_client_side_security());
        assert!(flags.xds_rbac());
        assert!(!flags.xds_aggregate_and_dns());
        assert!(!flags.xds_federation());
        assert!(!flags.c2p_resolver());
        assert_eq!(flags.bootstrap(), None);
        assert_eq!(flags.c2p_resolver_test_only_traffic_director_uri(), "");
    }

    #[test]
    fn from_lookup() {
        let flags = flags(&[
            ("GRPC_XDS_EXPERIMENTAL_ENABLE_RING_HASH", "False"),
            ("GRPC_EXPERIMENTAL_XDS_FEDERATION", "True"),
            (
                "GRPC_TEST_ONLY_GOOGLE_C2P_RESOLVER_TRAFFIC_DIRECTOR_URI",
                "xds.test:443",
            ),
        ]);
        assert!(!flags.xds_ring_hash());
        assert!(flags.xds_federation());
        assert!(flags.xds_rbac());
        assert_eq!(
            flags.c2p_resolver_test_only_traffic_director_uri(),
            "xds.test:443"
        );
    }

    #[test]
    fn bootstrap_file_wins() {
        let both = flags(&[
            ("GRPC_XDS_BOOTSTRAP", "/etc/xds.json"),
            ("GRPC_XDS_BOOTSTRAP_CONFIG", "{}"),
        ]);
        assert_eq!(
            both.bootstrap(),
            Some(Bootstrap::File("/etc/xds.json".into()))
        );

        let content = flags(&[
            ("GRPC_XDS_BOOTSTRAP", ""),
            ("GRPC_XDS_BOOTSTRAP_CONFIG", "{}"),
        ]);
        assert_eq!(content.bootstrap(), Some(Bootstrap::Content("{}".into())));
        assert_eq!(content.xds_bootstrap_file_name(), "");
    }

    #[test]
    fn lookup_once_per_variable() {
        let mut seen = Vec::new();
        FeatureFlags::from_lookup(|name| {
            seen.push(name.to_string());
            None
        });
        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(seen.len(), 9);
        assert_eq!(unique.len(), 9);
    }
}
