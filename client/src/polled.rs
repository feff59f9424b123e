use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep, sleep_until, timeout_at};

use crate::{
    ApiError, Method, ResolveError, ResolveFut, Resolvable, Resource, TaskState, TaskStatus,
    Transport, TransportError,
};

/// A long-running operation, resolved by polling its task status URL.
///
/// Only a [`Resource`] can be resolved from a task, so this type implements
/// `Resolvable<Resource>` and nothing else:
///
/// ```compile_fail
/// use pncp_client::{Client, PolledResolution, Resolvable};
///
/// async fn resolve_name(polled: &PolledResolution<Client>) {
///     let mut name = String::new();
///     let _ = polled.get(&mut name).await;
/// }
/// ```
///
/// On the wire this is `{"resourceURL": "..."}`. A deserialized value has no
/// transport and must be [bound](Self::bind) before it can be polled.
///
/// The first successfully resolved Resource is memoized. Later `get` calls
/// copy its URL into the target up front and still poll the task again.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PolledResolution<C> {
    #[serde(rename = "resourceURL")]
    resource_url: String,
    #[serde(skip)]
    cached: OnceLock<Resource>,
    #[serde(skip)]
    transport: Option<Arc<C>>,
}

impl<C> PolledResolution<C> {
    pub fn new(resource_url: impl Into<String>, transport: Arc<C>) -> Self {
        Self {
            resource_url: resource_url.into(),
            cached: OnceLock::new(),
            transport: Some(transport),
        }
    }

    /// A resolution with no transport yet, as produced by deserialization.
    pub fn detached(resource_url: impl Into<String>) -> Self {
        Self {
            resource_url: resource_url.into(),
            cached: OnceLock::new(),
            transport: None,
        }
    }

    #[must_use]
    pub fn bind(mut self, transport: Arc<C>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn resource_url(&self) -> &str {
        &self.resource_url
    }

    #[must_use]
    pub fn cached(&self) -> Option<&Resource> {
        self.cached.get()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.transport.is_some()
    }
}

impl<C> fmt::Debug for PolledResolution<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolledResolution")
            .field("resource_url", &self.resource_url)
            .field("cached", &self.cached.get())
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl<C: Transport> PolledResolution<C> {
    async fn resolve(&self, target: &mut Resource, deadline: Deadline) -> Result<(), ResolveError> {
        let Some(transport) = self.transport.as_deref() else {
            return Err(ResolveError::MissingTransport);
        };
        if self.resource_url.is_empty() {
            return Err(ResolveError::MissingResourceUrl);
        }
        if let Some(cached) = self.cached.get() {
            target.url.clone_from(&cached.url);
        }

        let mut attempt = 0u64;
        loop {
            deadline.check()?;
            attempt += 1;
            tracing::trace!(url = %self.resource_url, attempt, "Polling task status");

            let reply = deadline
                .bound(transport.call(Method::GET, &self.resource_url, &[], ""))
                .await?;
            let response = match reply {
                Ok(response) => response,
                Err(TransportError::Transient(err)) => {
                    tracing::debug!(
                        url = %self.resource_url,
                        attempt,
                        error = %err,
                        "Re-issuing poll after transient error"
                    );
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let status: TaskStatus = response.decode()?;
            tracing::debug!(
                url = %self.resource_url,
                attempt,
                state = %status.state,
                percent = status.percentage_complete,
                "Task status"
            );

            match status.state {
                TaskState::ClosedSuccessful => {
                    let resource = status.result.ok_or(ResolveError::MissingResult)?;
                    target.url.clone_from(&resource.url);
                    // First success wins; the slot never changes afterwards.
                    let _ = self.cached.set(resource);
                    return Ok(());
                }
                TaskState::ClosedFailed => {
                    return Err(ResolveError::TaskFailed(ApiError::fatal(
                        status.error_code,
                        status.error_message,
                    )));
                }
                TaskState::Pending | TaskState::Running | TaskState::Unknown => {}
            }

            deadline.sleep(transport.poll_interval()).await;
        }
    }
}

impl<C: Transport> Resolvable<Resource> for PolledResolution<C> {
    fn get<'a>(&'a self, target: &'a mut Resource) -> ResolveFut<'a> {
        Box::pin(self.resolve(target, Deadline::none()))
    }

    fn timed_get<'a>(&'a self, target: &'a mut Resource, ttl: Duration) -> ResolveFut<'a> {
        Box::pin(self.resolve(target, Deadline::after(ttl)))
    }
}

/// Optional cut-off for a poll loop. Without one every wait is unbounded.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Option<Instant>,
    ttl: Duration,
}

impl Deadline {
    const fn none() -> Self {
        Self {
            at: None,
            ttl: Duration::ZERO,
        }
    }

    /// A ttl too large to represent as an instant behaves like no deadline.
    fn after(ttl: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(ttl),
            ttl,
        }
    }

    fn check(self) -> Result<(), ResolveError> {
        match self.at {
            Some(at) if Instant::now() >= at => Err(ResolveError::Timeout(self.ttl)),
            _ => Ok(()),
        }
    }

    async fn bound<F: Future>(self, fut: F) -> Result<F::Output, ResolveError> {
        match self.at {
            Some(at) => timeout_at(at, fut)
                .await
                .map_err(|_| ResolveError::Timeout(self.ttl)),
            None => Ok(fut.await),
        }
    }

    /// Sleeps for `interval`, cut short at the deadline.
    async fn sleep(self, interval: Duration) {
        match self.at {
            Some(at) => {
                let wake = Instant::now().checked_add(interval).unwrap_or(at);
                sleep_until(wake.min(at)).await;
            }
            None => sleep(interval).await,
        }
    }
}
