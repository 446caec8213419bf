//! Stream identity.
//!
//! A [`StreamIdentity`] names one logical data stream within a sync and is
//! the lookup key for everything the state store holds about that stream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `(namespace, name)` pair uniquely identifying a stream within a sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamIdentity {
    /// Stream name (e.g. a table or endpoint name).
    pub name: String,
    /// Optional namespace (e.g. a schema or database).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl StreamIdentity {
    /// Create an identity with no namespace.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// Attach a namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Namespace or the empty string, as stored in state tables.
    #[must_use]
    pub fn namespace_or_empty(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}
