//! Logic for loading configuration in to an object model
use std::time::Duration;

use displaydoc::Display;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
}

/// The configuration of a [`Compiler`](crate::Compiler).
///
/// Can be created through `serde::Deserialize` from various formats,
/// through [`Configuration::from_yaml`], or inline in Rust code with the builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Scheduling of asynchronous resolvers.
    #[serde(default)]
    pub jit: Jit,

    /// Compile cache configuration.
    #[serde(default)]
    pub cache: Cache,

    /// Limits protecting the compiler against adversarial operations.
    #[serde(default)]
    pub limits: Limits,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder]
    pub fn new(jit: Option<Jit>, cache: Option<Cache>, limits: Option<Limits>) -> Self {
        Self {
            jit: jit.unwrap_or_default(),
            cache: cache.unwrap_or_default(),
            limits: limits.unwrap_or_default(),
        }
    }
}

impl Configuration {
    /// Parses a YAML document into a configuration. An empty document yields
    /// the default configuration.
    pub fn from_yaml(raw_yaml: &str) -> Result<Self, ConfigurationError> {
        if raw_yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw_yaml).map_err(|e| ConfigurationError::InvalidConfiguration {
            message: "failed to parse yaml",
            error: e.to_string(),
        })
    }

    /// The JSON schema of the configuration file.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Configuration)
    }
}

/// Scheduling of asynchronous resolvers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Jit {
    /// Start asynchronous sibling resolvers together before awaiting them.
    /// When disabled, asynchronous fields are awaited one after the other.
    /// default: true
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Selection depth after which asynchronous siblings are awaited one
    /// after the other even when `parallel` is enabled.
    /// default: 4
    #[serde(default = "default_max_parallel_depth")]
    pub max_parallel_depth: usize,
}

#[buildstructor::buildstructor]
impl Jit {
    #[builder]
    pub fn new(parallel: Option<bool>, max_parallel_depth: Option<usize>) -> Self {
        Self {
            parallel: parallel.unwrap_or_else(default_parallel),
            max_parallel_depth: max_parallel_depth.unwrap_or_else(default_max_parallel_depth),
        }
    }
}

impl Default for Jit {
    fn default() -> Self {
        Jit::builder().build()
    }
}

/// Compile cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Cache {
    /// Maximum number of compiled operations kept in memory, least recently
    /// used entries are evicted first. `0` disables the cache.
    /// default: 128
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Time after which a compiled operation is compiled again, in time
    /// units (`30s`, `10m`). Entries never expire when unset.
    #[serde(with = "humantime_serde", default)]
    #[schemars(with = "Option<String>", default)]
    pub ttl: Option<Duration>,
}

#[buildstructor::buildstructor]
impl Cache {
    #[builder]
    pub fn new(capacity: Option<usize>, ttl: Option<Duration>) -> Self {
        Self {
            capacity: capacity.unwrap_or_else(default_cache_capacity),
            ttl,
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Cache::builder().build()
    }
}

/// Limits protecting the compiler against adversarial operations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    /// Maximum nesting of selections, fragment expansions included.
    /// default: 512
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum number of field plans in one compiled operation. Abstract type
    /// dispatch counts the selections once per possible type.
    /// default: 100000
    #[serde(default = "default_max_plan_nodes")]
    pub max_plan_nodes: usize,
}

#[buildstructor::buildstructor]
impl Limits {
    #[builder]
    pub fn new(max_depth: Option<usize>, max_plan_nodes: Option<usize>) -> Self {
        Self {
            max_depth: max_depth.unwrap_or_else(default_max_depth),
            max_plan_nodes: max_plan_nodes.unwrap_or_else(default_max_plan_nodes),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits::builder().build()
    }
}

fn default_parallel() -> bool {
    true
}

fn default_max_parallel_depth() -> usize {
    4
}

fn default_cache_capacity() -> usize {
    128
}

fn default_max_depth() -> usize {
    // < # expected to cause stack overflow &&
    // > # expected in a legitimate query
    512
}

fn default_max_plan_nodes() -> usize {
    100_000
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;

    #[test]
    fn empty_yaml_is_default() {
        let configuration = Configuration::from_yaml("").unwrap();
        assert_eq!(configuration, Configuration::default());
        assert!(configuration.jit.parallel);
        assert_eq!(configuration.cache.capacity, 128);
        assert_eq!(configuration.limits.max_depth, 512);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let configuration = Configuration::from_yaml(
            r#"
jit:
  parallel: false
cache:
  capacity: 0
"#,
        )
        .unwrap();
        assert_eq!(
            configuration,
            Configuration::builder()
                .jit(Jit::builder().parallel(false).build())
                .cache(Cache::builder().capacity(0).build())
                .build()
        );
        assert_eq!(configuration.jit.max_parallel_depth, 4);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = Configuration::from_yaml("cache:\n  size: 12\n").unwrap_err();
        assert!(error.to_string().starts_with("failed to parse yaml"));
    }

    #[test]
    fn schema_lists_sections() {
        let schema = serde_json::to_value(Configuration::json_schema()).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("jit"));
        assert!(properties.contains_key("cache"));
        assert!(properties.contains_key("limits"));
    }

    #[test]
    fn cache_ttl_in_time_units() {
        let configuration = Configuration::from_yaml("cache:\n  ttl: 90s\n").unwrap();
        assert_eq!(configuration.cache.ttl, Some(Duration::from_secs(90)));
        assert_eq!(configuration.cache.capacity, 128);
        assert_eq!(Configuration::default().cache.ttl, None);

        let error = Configuration::from_yaml("cache:\n  ttl: soon\n").unwrap_err();
        assert!(error.to_string().starts_with("failed to parse yaml"));
    }
}
