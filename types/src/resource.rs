use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The domain object a remote operation resolves to.
///
/// Only the `URL` identifier is interpreted. Any other field the server sends
/// is kept verbatim in [`Resource::extra`] so callers can inspect it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Looks up a server-provided field other than `URL`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}
