//! Error taxonomy for transports and deferred results.
//!
//! [`ApiError`] is the classified failure a PNCP endpoint reports. Its
//! `retriable` flag decides which [`TransportError`] variant carries it, and
//! the variant alone decides whether the poll loop re-issues a request.

use std::time::Duration;

use thiserror::Error;

/// A failure reported by the API, tagged with an error reference code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (eref {eref})")]
pub struct ApiError {
    message: String,
    eref: u64,
    retriable: bool,
}

impl ApiError {
    pub fn new(eref: u64, message: impl Into<String>, retriable: bool) -> Self {
        Self {
            message: message.into(),
            eref,
            retriable,
        }
    }

    pub fn fatal(eref: u64, message: impl Into<String>) -> Self {
        Self::new(eref, message, false)
    }

    pub fn transient(eref: u64, message: impl Into<String>) -> Self {
        Self::new(eref, message, true)
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub const fn eref(&self) -> u64 {
        self.eref
    }

    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        self.retriable
    }
}

/// Failure of a single transport call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Safe to re-issue without caller intervention.
    #[error("transient API error: {0}")]
    Transient(ApiError),
    #[error("API error: {0}")]
    Fatal(ApiError),
    /// The transport failed in a way it could not classify.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransportError {
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Transient(err) | Self::Fatal(err) => Some(err),
            Self::Other(_) => None,
        }
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<ApiError> for TransportError {
    fn from(err: ApiError) -> Self {
        if err.is_retriable() {
            Self::Transient(err)
        } else {
            Self::Fatal(err)
        }
    }
}

/// Why a `get` on a deferred result did not produce a value.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("client transport is unset")]
    MissingTransport,
    #[error("the resource to poll is unset")]
    MissingResourceUrl,
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("task closed successfully without a result")]
    MissingResult,
    #[error(transparent)]
    Transport(TransportError),
    #[error("task failed: {0}")]
    TaskFailed(ApiError),
    #[error("no terminal task state within {0:?}")]
    Timeout(Duration),
}

impl ResolveError {
    /// Returns the API error behind this failure, if there is one.
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::TaskFailed(err) => Some(err),
            Self::Transport(err) => err.api_error(),
            _ => None,
        }
    }

    /// Precondition failures caused by how the resolution was built.
    #[must_use]
    pub const fn is_invalid_usage(&self) -> bool {
        matches!(self, Self::MissingTransport | Self::MissingResourceUrl)
    }
}

impl From<TransportError> for ResolveError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}
