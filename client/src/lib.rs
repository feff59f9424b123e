//! PNCP API client with unified deferred results.
//!
//! # Architecture
//!
//! Every API operation yields a value that is either already available or has
//! to be obtained by polling a task status endpoint. Both cases implement
//! [`Resolvable`]:
//!
//! - [`ImmediateResolution`] - an already-fetched body, decoded on demand
//! - [`PolledResolution`] - a status URL polled until the task closes
//! - [`Deferred`] - either of the above, as returned by [`Client::submit`]
//!
//! The poll loop talks to the network only through the [`Transport`] trait.
//! [`Client`] is the `reqwest` implementation; tests substitute scripted stubs.
//!
//! # Error Handling
//!
//! A transport failure is a [`TransportError`]: `Transient` failures are
//! re-issued by the poll loop without delay, `Fatal` and `Other` failures end
//! it. A [`Transport`] therefore paces its own transient failures; [`Client`]
//! waits one retry delay before reporting one. A task that closes in `CLOSED_FAILED` surfaces as
//! [`ResolveError::TaskFailed`] carrying the remote error code and message.
//!
//! # Configuration
//!
//! [`ClientConfig`] holds the base URL, credentials, timeouts, the fixed poll
//! interval and the transport retry budget. It can be loaded from
//! `~/.pncp/config.toml` with environment overrides.

pub mod config;
pub mod error;
pub mod retry;

mod client;
mod deferred;
mod immediate;
mod polled;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub use client::{Client, ClientBuildError};
pub use config::{ClientConfig, ConfigError};
pub use deferred::Deferred;
pub use error::{ApiError, ResolveError, TransportError};
pub use immediate::ImmediateResolution;
pub use pncp_types::{Resource, TaskState, TaskStatus};
pub use polled::PolledResolution;
pub use reqwest::Method;

pub use pncp_types;

/// Boxed future returned by [`Resolvable`] operations.
pub type ResolveFut<'a> = Pin<Box<dyn Future<Output = Result<(), ResolveError>> + Send + 'a>>;

/// Boxed future returned by [`Transport::call`].
pub type TransportFut<'a> =
    Pin<Box<dyn Future<Output = Result<ImmediateResolution, TransportError>> + Send + 'a>>;

/// A value that may already be available or may need further work to obtain.
///
/// `T` is the type the value is written into. Implementations decide which
/// targets they accept by which `Resolvable<T>` impls they provide.
pub trait Resolvable<T> {
    /// Resolve into `target`, waiting as long as the value needs.
    fn get<'a>(&'a self, target: &'a mut T) -> ResolveFut<'a>;

    /// Resolve into `target`, giving up after `ttl` where the implementation
    /// has anything to wait for.
    fn timed_get<'a>(&'a self, target: &'a mut T, ttl: Duration) -> ResolveFut<'a>;
}

/// The network collaborator a [`PolledResolution`] polls through.
///
/// Implementations perform their own low-level retries and classify whatever
/// failure remains into a [`TransportError`].
pub trait Transport: Send + Sync {
    /// Issue a request. An empty `body` or `content_type` sends none.
    fn call<'a>(
        &'a self,
        method: Method,
        url: &'a str,
        body: &'a [u8],
        content_type: &'a str,
    ) -> TransportFut<'a>;

    /// Fixed wait between consecutive status polls.
    fn poll_interval(&self) -> Duration;
}
