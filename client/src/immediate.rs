use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::{ResolveError, ResolveFut, Resolvable};

/// A response body that is already in memory.
///
/// Decoding replaces the whole target on success. A body that fails to decode
/// leaves the target untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImmediateResolution {
    body: Vec<u8>,
}

impl ImmediateResolution {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into() }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ResolveError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }
}

impl<T> Resolvable<T> for ImmediateResolution
where
    T: DeserializeOwned + Send,
{
    fn get<'a>(&'a self, target: &'a mut T) -> ResolveFut<'a> {
        Box::pin(async move {
            *target = self.decode()?;
            Ok(())
        })
    }

    /// The body is already here, so `ttl` is ignored.
    fn timed_get<'a>(&'a self, target: &'a mut T, _ttl: Duration) -> ResolveFut<'a> {
        self.get(target)
    }
}
