//! Error type for name resolution.

#![warn(missing_docs)]

use std::error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::target::ParseError;

/// A boxed error as produced by resolver implementations.
pub type BoxError = Box<dyn error::Error + Send + Sync>;

//------------ Error ---------------------------------------------------------

/// Error type for name resolution.
///
/// The type is cheap to clone so that a single error can be handed to the
/// consumer and kept around by the resolver at the same time.
#[derive(Clone, Debug)]
pub enum Error {
    /// No builder is registered for the target’s scheme.
    SchemeNotFound(String),

    /// The target string could not be parsed.
    InvalidTarget(ParseError),

    /// The builder could not construct a resolver.
    BuildFailed(Arc<dyn error::Error + Send + Sync>),

    /// Resolution failed, the resolver stays active.
    Resolution(Arc<dyn error::Error + Send + Sync>),

    /// The consumer refused a pushed state.
    ConsumerRejected(Arc<str>),

    /// The resolver or its consumer has already been closed.
    Closed,
}

impl Error {
    /// Creates a build error from any error value.
    pub fn build_failed(err: impl Into<BoxError>) -> Self {
        Error::BuildFailed(Arc::from(err.into()))
    }

    /// Creates a resolution error from any error value.
    pub fn resolution(err: impl Into<BoxError>) -> Self {
        Error::Resolution(Arc::from(err.into()))
    }

    /// Creates a rejection error with the given reason.
    pub fn consumer_rejected(reason: impl Into<Arc<str>>) -> Self {
        Error::ConsumerRejected(reason.into())
    }

    /// Returns whether the error is transient.
    ///
    /// Transient errors are reported through the consumer and do not end
    /// the life of a resolver.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Resolution(_) | Error::ConsumerRejected(_))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::SchemeNotFound(scheme) => {
                write!(f, "no resolver registered for scheme '{scheme}'")
            }
            Error::InvalidTarget(err) => write!(f, "invalid target: {err}"),
            Error::BuildFailed(err) => {
                write!(f, "failed to build resolver: {err}")
            }
            Error::Resolution(err) => write!(f, "resolution failed: {err}"),
            Error::ConsumerRejected(reason) => {
                write!(f, "state rejected by consumer: {reason}")
            }
            Error::Closed => write!(f, "resolver closed"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::SchemeNotFound(_) => None,
            Error::InvalidTarget(err) => Some(err),
            Error::BuildFailed(err) => Some(err.as_ref()),
            Error::Resolution(err) => Some(err.as_ref()),
            Error::ConsumerRejected(_) => None,
            Error::Closed => None,
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidTarget(err)
    }
}

//============ Testing =======================================================
