use std::fmt;

use super::ConfigId;
use crate::constants::API_PATH_PREFIX;

/// Predicate selecting which ids a subscriber cares about
///
/// Attached to a connection at subscribe time and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigFilter {
    All,
    Namespace(String),
    Exact(ConfigId),
}

impl ConfigFilter {
    /// Build the filter selected by the optional `{namespace}/{name}` path segments.
    /// Without a namespace the name is ignored.
    pub fn from_segments(
        namespace: Option<String>,
        name: Option<String>,
    ) -> Self {
        match (namespace, name) {
            (Some(ns), Some(name)) => ConfigFilter::Exact(ConfigId::new(ns, name)),
            (Some(ns), None) => ConfigFilter::Namespace(ns),
            (None, _) => ConfigFilter::All,
        }
    }

    pub fn matches(
        &self,
        id: &ConfigId,
    ) -> bool {
        match self {
            ConfigFilter::All => true,
            ConfigFilter::Namespace(ns) => &id.namespace == ns,
            ConfigFilter::Exact(exact) => exact == id,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, ConfigFilter::Exact(_))
    }

    /// Decoded path segments of the endpoint serving this filter.
    /// Callers percent-encode each segment when building a URL.
    pub fn path_segments(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = API_PATH_PREFIX.split('/').filter(|s| !s.is_empty()).collect();
        match self {
            ConfigFilter::All => {}
            ConfigFilter::Namespace(ns) => segments.push(ns),
            ConfigFilter::Exact(id) => {
                segments.push(&id.namespace);
                segments.push(&id.name);
            }
        }
        segments
    }
}

impl fmt::Display for ConfigFilter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ConfigFilter::All => write!(f, "all"),
            ConfigFilter::Namespace(ns) => write!(f, "namespace:{ns}"),
            ConfigFilter::Exact(id) => write!(f, "id:{id}"),
        }
    }
}
