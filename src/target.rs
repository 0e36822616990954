//! Parsed resolution targets.
//!
//! A target is the string a user hands to the client to name the service
//! to connect to. It has the form `scheme://[authority]/endpoint`. The
//! scheme selects the resolver builder, the authority optionally names the
//! naming service to ask, and the endpoint is whatever remains and is only
//! meaningful to the resolver for the scheme.

use std::error;
use std::fmt;
use std::str::FromStr;

//------------ Target --------------------------------------------------------

/// A parsed target.
///
/// Values are created once by parsing and never change afterwards.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Target {
    scheme: String,
    authority: String,
    endpoint: String,
}

impl Target {
    /// Parses a target string of the form `scheme://[authority]/endpoint`.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let (scheme, rest) =
            s.split_once("://").ok_or(ParseError::MissingScheme)?;
        check_scheme(scheme)?;
        let (authority, endpoint) =
            rest.split_once('/').ok_or(ParseError::MissingEndpoint)?;
        Ok(Target {
            scheme: scheme.into(),
            authority: authority.into(),
            endpoint: endpoint.into(),
        })
    }

    /// Creates a target for a default scheme.
    ///
    /// The complete `raw` string becomes the endpoint and the authority is
    /// left empty. This is how a client interprets a target string that
    /// has no usable scheme when it has been configured with a default
    /// scheme.
    pub fn with_scheme(scheme: &str, raw: &str) -> Result<Self, ParseError> {
        check_scheme(scheme)?;
        Ok(Target {
            scheme: scheme.into(),
            authority: String::new(),
            endpoint: raw.into(),
        })
    }

    /// Returns the scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the authority.
    ///
    /// The authority is empty if the target didn’t have one.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Returns the endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl FromStr for Target {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.authority, self.endpoint)
    }
}

/// Checks that a scheme only uses the characters allowed by RFC 3986.
fn check_scheme(scheme: &str) -> Result<(), ParseError> {
    let mut chars = scheme.chars();
    match chars.next() {
        None => return Err(ParseError::EmptyScheme),
        Some(ch) if !ch.is_ascii_alphabetic() => {
            return Err(ParseError::InvalidScheme)
        }
        _ => {}
    }
    if chars.all(|ch| ch.is_ascii_alphanumeric() || "+-.".contains(ch)) {
        Ok(())
    } else {
        Err(ParseError::InvalidScheme)
    }
}

//------------ ParseError ----------------------------------------------------

/// A target string could not be parsed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The string doesn’t contain a `://` separator.
    MissingScheme,

    /// The scheme before `://` is empty.
    EmptyScheme,

    /// The scheme contains characters not allowed in a scheme.
    InvalidScheme,

    /// There is no `/` between authority and endpoint.
    MissingEndpoint,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ParseError::MissingScheme => "missing scheme",
            ParseError::EmptyScheme => "empty scheme",
            ParseError::InvalidScheme => "invalid character in scheme",
            ParseError::MissingEndpoint => "missing endpoint",
        })
    }
}

impl error::Error for ParseError {}

//============ Testing =======================================================
