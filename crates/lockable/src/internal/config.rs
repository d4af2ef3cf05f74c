use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::internal::common::error::{LockError, validation_error};
use crate::internal::common::utils::{fix_empty_and_trim, split_tokens};
use crate::internal::index::LabelAlias;
use crate::internal::resource::{Resource, ResourceProperty};
use crate::{Result, Set};

/// How long a queue ticket stays valid when the catalog does not say otherwise.
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_secs(60);

/// Labels written either as one whitespace separated string or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelList {
    Text(String),
    List(Vec<String>),
}

impl Default for LabelList {
    fn default() -> Self {
        LabelList::List(Vec::new())
    }
}

impl LabelList {
    pub fn tokens(&self) -> Vec<&str> {
        match self {
            LabelList::Text(text) => split_tokens(text).collect(),
            LabelList::List(items) => items.iter().flat_map(|i| split_tokens(i)).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.tokens().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_by: Option<String>,
    #[serde(default, skip_serializing_if = "LabelList::is_empty")]
    pub labels: LabelList,
    #[serde(default, rename = "property", skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<ResourceProperty>,
}

impl ResourceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        ResourceConfig {
            name: name.into(),
            description: None,
            reserved_by: None,
            labels: LabelList::default(),
            properties: Vec::new(),
        }
    }

    pub fn with_labels(mut self, labels: &str) -> Self {
        self.labels = LabelList::Text(labels.to_string());
        self
    }

    pub(crate) fn to_resource(&self) -> Result<Resource> {
        let resource = Resource::new(&self.name)?
            .with_description(self.description.as_deref())
            .with_reserved_by(self.reserved_by.as_deref())
            .with_properties(
                self.properties
                    .iter()
                    .map(|p| ResourceProperty::new(p.name.trim(), p.value.clone()))
                    .collect(),
            );
        Ok(self
            .labels
            .tokens()
            .into_iter()
            .fold(resource, |r, label| r.with_labels(label)))
    }
}

impl From<&Resource> for ResourceConfig {
    fn from(resource: &Resource) -> Self {
        ResourceConfig {
            name: resource.name().to_string(),
            description: resource.description().map(|d| d.to_string()),
            reserved_by: resource.reserved_by().map(|r| r.to_string()),
            labels: resource
                .labels_string()
                .map(LabelList::Text)
                .unwrap_or_default(),
            properties: resource.properties().to_vec(),
        }
    }
}

fn deserialize_human_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = String::deserialize(deserializer)?;
    humantime::parse_duration(&buf).map_err(serde::de::Error::custom)
}

fn serialize_human_duration<S>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

fn default_queue_timeout() -> Duration {
    DEFAULT_QUEUE_TIMEOUT
}

/// Persisted form of the pool: the catalog plus the global selection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    #[serde(default)]
    pub load_balancing_labels: LabelList,
    #[serde(default)]
    pub use_resources_evenly: bool,
    #[serde(default)]
    pub use_percent_matching_default: bool,
    #[serde(
        default = "default_queue_timeout",
        deserialize_with = "deserialize_human_duration",
        serialize_with = "serialize_human_duration"
    )]
    pub queue_timeout: Duration,
    /// Seeds the random choice used with `use_resources_evenly`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceConfig>,
    #[serde(default, rename = "alias")]
    pub aliases: Vec<LabelAlias>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            load_balancing_labels: LabelList::default(),
            use_resources_evenly: false,
            use_percent_matching_default: false,
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
            seed: None,
            resources: Vec::new(),
            aliases: Vec::new(),
        }
    }
}

impl PoolConfig {
    pub fn parse(text: &str) -> Result<PoolConfig> {
        let config: PoolConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| LockError::Persistence(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = Set::default();
        for resource in &self.resources {
            let resource = resource.to_resource()?;
            if !names.insert(resource.name().to_string()) {
                return validation_error(format!(
                    "Resource {} is defined more than once",
                    resource.name()
                ));
            }
        }
        for alias in &self.aliases {
            if fix_empty_and_trim(Some(&alias.name)).is_none()
                || fix_empty_and_trim(Some(&alias.label)).is_none()
            {
                return validation_error("Label alias needs both a name and a label");
            }
        }
        Ok(())
    }

    /// Builds the resources in catalog order. Fails on the first invalid entry.
    pub(crate) fn build_resources(&self) -> Result<Vec<Resource>> {
        self.validate()?;
        self.resources.iter().map(|r| r.to_resource()).collect()
    }

    pub(crate) fn load_balancing_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for label in self.load_balancing_labels.tokens() {
            if !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
        }
        labels
    }

    pub(crate) fn trimmed_aliases(&self) -> Vec<LabelAlias> {
        self.aliases
            .iter()
            .map(|a| LabelAlias::new(a.name.trim(), a.label.trim()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let config = PoolConfig::parse("").unwrap();
        assert_eq!(config, PoolConfig::default());
        assert_eq!(config.queue_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_full() {
        let config = PoolConfig::parse(
            r#"
            load_balancing_labels = "rack-a rack-b"
            use_resources_evenly = true
            queue_timeout = "2m 30s"
            seed = 42

            [[resource]]
            name = "r1"
            description = "First"
            labels = "l1 l2"

            [[resource]]
            name = "r2"
            labels = ["l1", "rack-a"]
            reserved_by = "alice"
            property = [{ name = "IP", value = "10.0.0.2" }, { name = "EMPTY", value = "" }]

            [[alias]]
            name = "any"
            label = "l1"
            "#,
        )
        .unwrap();
        assert!(config.use_resources_evenly);
        assert!(!config.use_percent_matching_default);
        assert_eq!(config.queue_timeout, Duration::from_secs(150));
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.load_balancing_labels(), ["rack-a", "rack-b"]);
        assert_eq!(config.aliases, [LabelAlias::new("any", "l1")]);

        let resources = config.build_resources().unwrap();
        assert_eq!(resources[0].labels(), ["l1", "l2"]);
        assert_eq!(resources[0].description(), Some("First"));
        assert_eq!(resources[1].reserved_by(), Some("alice"));
        assert_eq!(resources[1].labels(), ["l1", "rack-a"]);
        assert_eq!(resources[1].property_value("EMPTY"), Some(" "));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            PoolConfig::parse("[[resource]]\nname = 'a b'"),
            Err(LockError::Validation(_))
        ));
        assert!(matches!(
            PoolConfig::parse("[[resource]]\nname = 'a'\n[[resource]]\nname = ' a '"),
            Err(LockError::Validation(_))
        ));
        assert!(matches!(
            PoolConfig::parse("[[alias]]\nname = 'x'\nlabel = ' '"),
            Err(LockError::Validation(_))
        ));
        assert!(matches!(
            PoolConfig::parse("queue_timeout = 'soon'"),
            Err(LockError::Deserialization(_))
        ));
        assert!(matches!(
            PoolConfig::parse("unknown = 1"),
            Err(LockError::Deserialization(_))
        ));
    }

    #[test]
    fn test_toml_roundtrip_of_catalog() {
        let mut config = PoolConfig::default();
        config.resources.push(ResourceConfig::new("r1").with_labels("a b"));
        config.aliases.push(LabelAlias::new("x", "a"));
        let text = config.to_toml().unwrap();
        assert_eq!(PoolConfig::parse(&text).unwrap(), config);
    }
}
