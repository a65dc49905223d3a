//! Persistor configuration via `docbus.toml`
//!
//! Every key is optional. The same structure is accepted as TOML (the file
//! format) or as a JSON object (the message-bus module config format).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use docbus_core::{
    BucketDescriptor, ClientTuning, Credentials, Endpoint, ViewDefinition, ViewMode,
};

/// Config file name used by the CLI when none is given.
pub const CONFIG_FILE_NAME: &str = "docbus.toml";

/// Default bus address the persistor listens on.
pub const DEFAULT_ADDRESS: &str = "vertx.couchbasepersistor";

// ============================================================================
// Errors
// ============================================================================

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("config file '{path}': {reason}")]
    Io {
        /// File path
        path: String,
        /// OS error text
        reason: String,
    },

    /// TOML or JSON did not match the config structure
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value parsed but is not usable
    #[error("invalid config value for '{key}': {reason}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Result alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// Action set
// ============================================================================

/// Which actions the dispatcher accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionSet {
    /// Document and find actions only
    Baseline,
    /// Baseline plus `cas`, `counter`, `unlock` and `touch`
    #[default]
    Extended,
}

// ============================================================================
// Views
// ============================================================================

/// One entry of the `views` list.
///
/// Fields are optional so that an incomplete entry can be reported and
/// skipped instead of failing the whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// View name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Unprefixed design document name
    #[serde(
        default,
        rename = "designDoc",
        alias = "design_doc",
        skip_serializing_if = "Option::is_none"
    )]
    pub design_doc: Option<String>,
    /// Map function source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Reduce function source; empty means none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
    /// `production` or anything else for development
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl ViewConfig {
    /// Convert to a view definition, or `None` when a required field is missing.
    pub fn to_definition(&self) -> Option<ViewDefinition> {
        let name = self.name.as_deref().filter(|s| !s.is_empty())?;
        let design_document = self.design_doc.as_deref().filter(|s| !s.is_empty())?;
        let map = self.function.as_deref().filter(|s| !s.is_empty())?;
        Some(ViewDefinition {
            name: name.to_string(),
            design_document: design_document.to_string(),
            map: map.to_string(),
            reduce: self
                .reduce
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            mode: ViewMode::from_config(self.mode.as_deref()),
        })
    }
}

// ============================================================================
// PersistorConfig
// ============================================================================

/// Persistor configuration loaded from `docbus.toml` or a JSON object.
///
/// # Example
///
/// ```toml
/// address = "vertx.couchbasepersistor"
/// host = "localhost"
/// bucket_name = "default"
/// init = true
///
/// [[views]]
/// name = "by_name"
/// designDoc = "users"
/// function = "function (doc) { emit(doc.name, null); }"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistorConfig {
    /// Bus address to register on
    #[serde(default = "default_address")]
    pub address: String,
    /// Cluster admin host
    #[serde(default = "default_host")]
    pub host: String,
    /// Cluster admin port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Admin user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Admin password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Bucket to provision and open
    #[serde(default = "default_bucket_name")]
    pub bucket_name: String,
    /// Bucket SASL password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_password: Option<String>,
    /// Bucket RAM quota in MB
    #[serde(default = "default_bucket_memory_size")]
    pub bucket_memory_size: u32,
    /// Basic operation timeout (ms)
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout: u64,
    /// View query timeout (ms)
    #[serde(default = "default_view_timeout")]
    pub view_timeout: u64,
    /// Durability observe timeout (ms)
    #[serde(default = "default_observer_timeout")]
    pub observer_timeout: u64,
    /// Concurrent view connections per node
    #[serde(default = "default_view_conns_per_node")]
    pub view_conns_per_node: u32,
    /// Provision the bucket and views at start-up
    #[serde(default)]
    pub init: bool,
    /// View definitions pushed during provisioning
    #[serde(default)]
    pub views: Vec<ViewConfig>,
    /// Enabled action set
    #[serde(default)]
    pub actions: ActionSet,
    /// How long to wait for a new bucket to become ready (ms)
    #[serde(default = "default_bucket_ready_timeout")]
    pub bucket_ready_timeout: u64,
    /// Delay between readiness checks (ms)
    #[serde(default = "default_bucket_ready_poll_interval")]
    pub bucket_ready_poll_interval: u64,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8091
}

fn default_bucket_name() -> String {
    "default".to_string()
}

fn default_bucket_memory_size() -> u32 {
    512
}

fn default_operation_timeout() -> u64 {
    5000
}

fn default_view_timeout() -> u64 {
    75000
}

fn default_observer_timeout() -> u64 {
    5000
}

fn default_view_conns_per_node() -> u32 {
    10
}

fn default_bucket_ready_timeout() -> u64 {
    30000
}

fn default_bucket_ready_poll_interval() -> u64 {
    250
}

impl Default for PersistorConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            bucket_name: default_bucket_name(),
            bucket_password: None,
            bucket_memory_size: default_bucket_memory_size(),
            operation_timeout: default_operation_timeout(),
            view_timeout: default_view_timeout(),
            observer_timeout: default_observer_timeout(),
            view_conns_per_node: default_view_conns_per_node(),
            init: false,
            views: Vec::new(),
            actions: ActionSet::default(),
            bucket_ready_timeout: default_bucket_ready_timeout(),
            bucket_ready_poll_interval: default_bucket_ready_poll_interval(),
        }
    }
}

impl PersistorConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# docbus persistor configuration

# Bus address the persistor registers on
address = "vertx.couchbasepersistor"

# Cluster admin endpoint and credentials
host = "localhost"
port = 8091
# username = "Administrator"
# password = "password"

# Bucket opened by the persistor
bucket_name = "default"
# bucket_password = "secret"
bucket_memory_size = 512

# Timeouts in milliseconds
operation_timeout = 5000
view_timeout = 75000
observer_timeout = 5000
view_conns_per_node = 10

# Create or update the bucket and publish views at start-up
init = false

# "extended" (default) also enables cas, counter, unlock and touch
actions = "extended"

# Readiness poll after creating a bucket, in milliseconds
bucket_ready_timeout = 30000
bucket_ready_poll_interval = 250

# Views published when init = true. Mode "production" drops the dev_ prefix.
# [[views]]
# name = "by_name"
# designDoc = "users"
# function = "function (doc) { emit(doc.name, null); }"
# reduce = "_count"
# mode = "development"
"#
    }

    /// Read, parse and validate config from a TOML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: PersistorConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON module config.
    pub fn from_json(value: &serde_json::Value) -> ConfigResult<Self> {
        let config: PersistorConfig = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> ConfigResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Reject values that would make the persistor unusable.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("operation_timeout", self.operation_timeout),
            ("view_timeout", self.view_timeout),
            ("observer_timeout", self.observer_timeout),
            ("bucket_ready_timeout", self.bucket_ready_timeout),
            ("bucket_ready_poll_interval", self.bucket_ready_poll_interval),
        ];
        if let Some(&(key, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid {
                key,
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.address.is_empty() {
            return Err(ConfigError::Invalid {
                key: "address",
                reason: "must not be empty".to_string(),
            });
        }
        if self.bucket_name.is_empty() {
            return Err(ConfigError::Invalid {
                key: "bucket_name",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Cluster admin endpoint.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// Admin credentials.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// Bucket parameters ensured by provisioning.
    pub fn bucket_descriptor(&self) -> BucketDescriptor {
        BucketDescriptor::new(
            self.bucket_name.clone(),
            self.bucket_memory_size,
            self.bucket_password.clone(),
        )
    }

    /// Client tuning passed when the bucket is opened.
    pub fn client_tuning(&self) -> ClientTuning {
        ClientTuning {
            operation_timeout: Duration::from_millis(self.operation_timeout),
            view_timeout: Duration::from_millis(self.view_timeout),
            observer_timeout: Duration::from_millis(self.observer_timeout),
            view_conns_per_node: self.view_conns_per_node,
            ..ClientTuning::default()
        }
    }

    /// Complete view definitions. Incomplete entries are skipped with a warning.
    pub fn view_definitions(&self) -> Vec<ViewDefinition> {
        self.views
            .iter()
            .enumerate()
            .filter_map(|(i, view)| {
                let def = view.to_definition();
                if def.is_none() {
                    warn!(
                        target: "docbus::provision",
                        index = i,
                        "Skipping view without name, designDoc or function"
                    );
                }
                def
            })
            .collect()
    }
}
