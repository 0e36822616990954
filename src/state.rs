//! Resolver state pushed to the consumer.
//!
//! A resolver reports what it found as a [`State`]: an ordered list of
//! [`Address`]es plus optional service configuration. Every state replaces
//! the previous one completely. All types in this module are immutable once
//! built and cheap to clone.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Error;

//------------ Attributes ----------------------------------------------------

/// An immutable map from string keys to arbitrary typed values.
///
/// Adding a value creates a new map and leaves the original untouched.
/// Two maps are equal if they contain the same keys and the values for
/// each key compare equal using the value type’s own `PartialEq`.
#[derive(Clone, Default)]
pub struct Attributes {
    values: Arc<BTreeMap<String, Arc<dyn AttributeValue>>>,
}

impl Attributes {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new map with `value` stored under `key`.
    ///
    /// A value already present under `key` is replaced in the new map.
    #[must_use]
    pub fn with_value<T>(&self, key: impl Into<String>, value: T) -> Self
    where
        T: Any + fmt::Debug + PartialEq + Send + Sync,
    {
        let mut values = BTreeMap::clone(&self.values);
        values.insert(key.into(), Arc::new(value));
        Attributes {
            values: Arc::new(values),
        }
    }

    /// Returns the value for `key` if present and of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key)?.as_any().downcast_ref()
    }

    /// Returns whether the map contains `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.values, &other.values) {
            return true;
        }
        self.values.len() == other.values.len()
            && self.values.iter().zip(other.values.iter()).all(
                |((lkey, lvalue), (rkey, rvalue))| {
                    lkey == rkey && lvalue.dyn_eq(rvalue.as_ref())
                },
            )
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

//------------ AttributeValue ------------------------------------------------

/// A value that can be stored in [`Attributes`].
///
/// This is implemented for all suitable types and only exists so that
/// values of different types can be compared.
trait AttributeValue: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn dyn_eq(&self, other: &dyn AttributeValue) -> bool;
}

impl<T> AttributeValue for T
where
    T: Any + fmt::Debug + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn AttributeValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }
}

//------------ NetworkType ---------------------------------------------------

/// The attribute key under which an address’ network type is stored.
pub const NETWORK_TYPE_KEY: &str = "network-type";

/// The network type to use when dialing an address.
///
/// Addresses without this attribute are TCP addresses.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NetworkType {
    /// A TCP/IP address of the form `host:port`.
    Tcp,

    /// The path of a Unix domain socket.
    Unix,
}

impl NetworkType {
    /// Returns the conventional name of the network type.
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkType::Tcp => "tcp",
            NetworkType::Unix => "unix",
        }
    }
}

//------------ Address -------------------------------------------------------

/// A single address the client can connect to.
#[derive(Clone, Debug, PartialEq)]
pub struct Address {
    addr: String,
    server_name: Option<String>,
    attributes: Attributes,
}

impl Address {
    /// Creates an address without a server name or attributes.
    pub fn new(addr: impl Into<String>) -> Self {
        Address {
            addr: addr.into(),
            server_name: None,
            attributes: Attributes::default(),
        }
    }

    /// Returns the address with a human-readable server name.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Returns the address with the given attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Returns the network address string.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Returns the server name if there is one.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Returns the attributes of the address.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns the network type of the address.
    pub fn network_type(&self) -> NetworkType {
        self.attributes
            .get::<NetworkType>(NETWORK_TYPE_KEY)
            .copied()
            .unwrap_or(NetworkType::Tcp)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.network_type().as_str(), self.addr)
    }
}

//------------ ServiceConfig -------------------------------------------------

/// Opaque service configuration.
///
/// The text is passed on to the consumer as is. Validating and
/// interpreting it is the consumer’s business.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ServiceConfig {
    raw: Arc<str>,
}

impl ServiceConfig {
    /// Creates a service config from its raw text.
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        ServiceConfig { raw: raw.into() }
    }

    /// Returns the raw text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

//------------ State ---------------------------------------------------------

/// A snapshot of everything a resolver knows about its target.
#[derive(Clone, Debug, Default)]
pub struct State {
    addresses: Vec<Address>,
    service_config: Option<ServiceConfig>,
    attributes: Attributes,
    error: Option<Error>,
}

impl State {
    /// Creates a state with the given addresses.
    pub fn new(addresses: Vec<Address>) -> Self {
        State {
            addresses,
            ..Default::default()
        }
    }

    /// Returns the state with a service config.
    #[must_use]
    pub fn with_service_config(mut self, config: ServiceConfig) -> Self {
        self.service_config = Some(config);
        self
    }

    /// Returns the state with the given state level attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Returns the state with an error attached.
    ///
    /// This is used when a resolver has partial results, e.g., addresses
    /// but a broken service config.
    #[must_use]
    pub fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    /// Returns the state without its service config.
    #[must_use]
    pub fn without_service_config(mut self) -> Self {
        self.service_config = None;
        self
    }

    /// Returns the addresses in resolver order.
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Returns the service config if there is one.
    pub fn service_config(&self) -> Option<&ServiceConfig> {
        self.service_config.as_ref()
    }

    /// Returns the state level attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns the attached error if there is one.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Errors carry no identity of their own, their messages will do.
        self.addresses == other.addresses
            && self.service_config == other.service_config
            && self.attributes == other.attributes
            && self.error.as_ref().map(ToString::to_string)
                == other.error.as_ref().map(ToString::to_string)
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Weight(u32);

    #[test]
    fn attributes_are_immutable() {
        let empty = Attributes::new();
        let one = empty.with_value("weight", Weight(10));
        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(one.get::<Weight>("weight"), Some(&Weight(10)));
        assert_eq!(one.get::<u32>("weight"), None);
        assert_eq!(one.get::<Weight>("other"), None);
    }

    #[test]
    fn attributes_compare_by_value() {
        let left = Attributes::new().with_value("weight", Weight(10));
        let right = Attributes::new().with_value("weight", Weight(10));
        assert_eq!(left, right);
        assert_ne!(left, Attributes::new().with_value("weight", Weight(11)));
        assert_ne!(left, Attributes::new().with_value("weight", 10u32));
        assert_ne!(left, Attributes::new().with_value("load", Weight(10)));
    }

    #[test]
    fn address_equality() {
        let attrs = Attributes::new().with_value("zone", "a".to_string());
        let left = Address::new("10.0.0.1:80").with_attributes(attrs.clone());
        let right = Address::new("10.0.0.1:80").with_attributes(attrs);
        assert_eq!(left, right);
        assert_ne!(left, Address::new("10.0.0.1:80"));
        assert_ne!(
            Address::new("10.0.0.1:80"),
            Address::new("10.0.0.1:80").with_server_name("a")
        );
    }

    #[test]
    fn network_type() {
        let addr = Address::new("/tmp/sock").with_attributes(
            Attributes::new().with_value(NETWORK_TYPE_KEY, NetworkType::Unix),
        );
        assert_eq!(addr.network_type(), NetworkType::Unix);
        assert_eq!(addr.to_string(), "unix:/tmp/sock");
        assert_eq!(Address::new("a:1").network_type(), NetworkType::Tcp);
    }

    #[test]
    fn state_equality() {
        let state = State::new(vec![Address::new("a:1")])
            .with_service_config(ServiceConfig::new("{}"));
        assert_eq!(state, state.clone());
        assert_ne!(state, state.clone().without_service_config());
        assert_ne!(
            state,
            state.clone().with_error(Error::consumer_rejected("no"))
        );
    }
}
