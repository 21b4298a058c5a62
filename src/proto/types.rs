use std::fmt;
use std::fmt::Debug;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::constants::API_VERSION;
use crate::ClientError;

/// Opaque configuration payload
///
/// `PartialEq` is the value-equality predicate used to suppress notifications
/// for resubmitted, unchanged content; `Clone` is a deep copy.
pub trait ConfigObject:
    Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + Sync + 'static
{
}

impl<T> ConfigObject for T where
    T: Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + Sync + 'static
{
}

/// Two-part configuration key, rendered as `namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigId {
    pub namespace: String,
    pub name: String,
}

impl ConfigId {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ConfigId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ConfigId {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(ConfigId::new(namespace, name))
            }
            _ => Err(ClientError::InvalidConfigId(s.to_string())),
        }
    }
}

impl Serialize for ConfigId {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConfigId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A configuration as stored, and the unit of every stream frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "C: ConfigObject")]
pub struct ConfigEntry<C> {
    pub id: ConfigId,
    pub config: C,
}

impl<C: ConfigObject> ConfigEntry<C> {
    pub fn new(
        id: ConfigId,
        config: C,
    ) -> Self {
        Self { id, config }
    }
}

/// Payload of one-shot list requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "C: ConfigObject")]
pub struct ConfigList<C> {
    /// Schema version of the list
    pub version: String,
    pub items: Vec<ConfigEntry<C>>,
}

impl<C: ConfigObject> ConfigList<C> {
    pub fn new(items: Vec<ConfigEntry<C>>) -> Self {
        Self {
            version: API_VERSION.to_string(),
            items,
        }
    }
}

/// Error payload returned with every non-2xx status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiError {
    pub fn new(
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

/// Added, updated and removed ids of one bulk store update
#[derive(Debug, Clone, PartialEq)]
pub struct Delta<C> {
    pub added: Vec<ConfigEntry<C>>,
    pub updated: Vec<ConfigEntry<C>>,
    pub removed: Vec<ConfigId>,
}

impl<C> Default for Delta<C> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<C: ConfigObject> Delta<C> {
    /// Entries that produce a notification: `added ∪ updated`
    pub fn changed(&self) -> impl Iterator<Item = &ConfigEntry<C>> {
        self.added.iter().chain(self.updated.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}
