//! Middleware configuration.
//!
//! Three ways in: struct literal / [`Config::new`], the [`ConfigBuilder`],
//! or [`Config::from_env`]. Hand the result to
//! [`LatencyMiddleware::from_config`](crate::LatencyMiddleware::from_config).
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `LATENCYWATCH_REGION` | `region` | `us-east-1` |
//! | `LATENCYWATCH_NAMESPACE` | `namespace` | `latencywatch` |
//! | `LATENCYWATCH_METRIC_NAME` | `latency_metric_name` | `Latency` |
//! | `LATENCYWATCH_ENDPOINT` | `endpoint` | regional endpoint |
//! | `LATENCYWATCH_MAX_RETRIES` | `max_retries` | `5` |
//! | `LATENCYWATCH_TIMEOUT_MS` | `timeout` | `10000` |
//! | `LATENCYWATCH_EXCLUDE` | `excluded_urls` (comma-separated) | none |

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const ENV_PREFIX: &str = "LATENCYWATCH_";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_latency_metric_name")]
    pub latency_metric_name: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-attempt backend timeout, in milliseconds on the wire.
    #[serde(
        default = "default_timeout",
        rename = "timeout_ms",
        serialize_with = "serialize_millis",
        deserialize_with = "deserialize_millis"
    )]
    pub timeout: Duration,
    #[serde(default)]
    pub excluded_urls: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            namespace: default_namespace(),
            latency_metric_name: default_latency_metric_name(),
            endpoint: None,
            max_retries: default_max_retries(),
            timeout: default_timeout(),
            excluded_urls: Vec::new(),
        }
    }
}

impl Config {
    pub fn new(region: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { region: region.into(), namespace: namespace.into(), ..Self::default() }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Loads configuration from `LATENCYWATCH_*` environment variables.
    ///
    /// Numbers that fail to parse keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(region) = get("REGION") {
            config.region = region;
        }
        if let Some(namespace) = get("NAMESPACE") {
            config.namespace = namespace;
        }
        if let Some(name) = get("METRIC_NAME") {
            config.latency_metric_name = name;
        }
        if let Some(endpoint) = get("ENDPOINT").filter(|e| !e.is_empty()) {
            config.endpoint = Some(endpoint);
        }
        if let Some(retries) = get("MAX_RETRIES") {
            config.max_retries = retries.parse().unwrap_or(config.max_retries);
        }
        if let Some(ms) = get("TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(exclude) = get("EXCLUDE") {
            config.excluded_urls = exclude
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }

        config
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_namespace() -> String {
    "latencywatch".to_string()
}

fn default_latency_metric_name() -> String {
    "Latency".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn deserialize_millis<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
}

/// Builder for [`Config`].
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self { config: Config::default() }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn latency_metric_name(mut self, name: impl Into<String>) -> Self {
        self.config.latency_metric_name = name.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn exclude(mut self, url: impl Into<String>) -> Self {
        self.config.excluded_urls.push(url.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
