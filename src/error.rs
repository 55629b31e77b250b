//! ==============================================================================
//! error.rs - error taxonomy for the hub
//! ==============================================================================
//!
//! purpose:
//!     typed errors for every failure the hub can see. the http layer maps
//!     them to status codes; the coordinator logs store errors and carries on.
//!
//! ```text
//!     - ValidationError: bad device payload, surfaced as a client error
//!     - StoreError:      hosted store unreachable / slow / garbled (transient)
//!     - CommandError:    operator sent something we cannot queue
//!     - ConfigError:     bootstrap only
//!
//!     "no reading yet" is not an error anywhere: it is an Option::None.
//! ```
//!
//! ==============================================================================

use std::time::Duration;
use thiserror::Error;

/// A device payload we refuse to ingest.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// One or more mandatory channels were absent (or null).
    #[error("missing sensor data, required: {}", .0.join(", "))]
    MissingChannels(Vec<&'static str>),

    /// A channel was present but is not a number.
    #[error("channel `{field}` is not numeric")]
    NonNumeric { field: String },

    /// The body parsed as JSON but is not an object.
    #[error("reading payload must be a JSON object")]
    NotAnObject,

    #[error("malformed JSON body: {0}")]
    Malformed(String),
}

/// Failures talking to the persistent store. All of them are transient from
/// the hub's point of view.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// Used by the in-memory store to simulate outages.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("store returned an unreadable row: {0}")]
    Decode(String),

    #[error("store is not configured: {0} is missing")]
    NotConfigured(&'static str),
}

impl StoreError {
    /// short class name for logs and dashboard flags
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Timeout(_) => "timeout",
            StoreError::Unavailable(_) | StoreError::Http(_) => "network",
            StoreError::Status { .. } => "status",
            StoreError::Decode(_) => "decode",
            StoreError::NotConfigured(_) => "config",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("unknown actuator action `{0}`, expected on, off, blink or toggle")]
    UnknownAction(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
