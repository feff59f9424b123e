use std::time::Duration;

use crate::{ImmediateResolution, PolledResolution, ResolveFut, Resolvable, Resource, Transport};

/// The result of submitting an operation: either the answer itself or a task
/// to poll for it.
///
/// Callers resolve both cases the same way through `Resolvable<Resource>`.
#[derive(Debug)]
pub enum Deferred<C> {
    Immediate(ImmediateResolution),
    Polled(PolledResolution<C>),
}

impl<C> Deferred<C> {
    #[must_use]
    pub const fn is_polled(&self) -> bool {
        matches!(self, Self::Polled(_))
    }

    /// The task status URL when the operation runs asynchronously.
    #[must_use]
    pub fn resource_url(&self) -> Option<&str> {
        match self {
            Self::Immediate(_) => None,
            Self::Polled(polled) => Some(polled.resource_url()),
        }
    }
}

impl<C: Transport> Resolvable<Resource> for Deferred<C> {
    fn get<'a>(&'a self, target: &'a mut Resource) -> ResolveFut<'a> {
        match self {
            Self::Immediate(immediate) => immediate.get(target),
            Self::Polled(polled) => polled.get(target),
        }
    }

    fn timed_get<'a>(&'a self, target: &'a mut Resource, ttl: Duration) -> ResolveFut<'a> {
        match self {
            Self::Immediate(immediate) => immediate.timed_get(target, ttl),
            Self::Polled(polled) => polled.timed_get(target, ttl),
        }
    }
}

impl<C> From<ImmediateResolution> for Deferred<C> {
    fn from(immediate: ImmediateResolution) -> Self {
        Self::Immediate(immediate)
    }
}

impl<C> From<PolledResolution<C>> for Deferred<C> {
    fn from(polled: PolledResolution<C>) -> Self {
        Self::Polled(polled)
    }
}
