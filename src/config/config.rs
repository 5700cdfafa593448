use crate::common::constants::{ERROR_CHANNEL_SIZE, ITEM_DEFAULT_CHANNEL_SIZE};
use crate::common::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the optional configuration file in the working directory.
pub const RUSTY_QL_CONFIG_FILE: &str = "rustyql.toml";
/// Prefix of environment variables overriding the configuration file.
pub const RUSTY_QL_ENV_PREFIX: &str = "RUSTYQL";
/// Schema used by sessions that don't name one.
pub const RUSTY_QL_DEFAULT_SCHEMA: &str = "default";

static GLOBAL: Lazy<EngineConfig> = Lazy::new(|| {
    EngineConfig::load().unwrap_or_else(|err| {
        log::warn!("could not load engine config, using defaults: {err}");
        EngineConfig::default()
    })
});

/// Engine level settings shared by the planner and every task it builds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of each task's output message channel.
    pub channel_size: usize,
    /// Capacity of each task's error channel.
    pub error_channel_size: usize,
    /// Schema reported by `SELECT database()`-style queries.
    pub default_schema: String,
    /// Field delimiter for CSV sources.
    pub csv_delimiter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_size: ITEM_DEFAULT_CHANNEL_SIZE,
            error_channel_size: ERROR_CHANNEL_SIZE,
            default_schema: RUSTY_QL_DEFAULT_SCHEMA.to_string(),
            csv_delimiter: ",".to_string(),
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from defaults, an optional `rustyql.toml`
    /// file in the working directory and `RUSTYQL_*` environment variables, in
    /// increasing order of precedence.
    pub fn load() -> Result<Self> {
        let settings = ::config::Config::builder()
            .set_default("channel_size", ITEM_DEFAULT_CHANNEL_SIZE as i64)?
            .set_default("error_channel_size", ERROR_CHANNEL_SIZE as i64)?
            .set_default("default_schema", RUSTY_QL_DEFAULT_SCHEMA)?
            .set_default("csv_delimiter", ",")?
            .add_source(::config::File::with_name(RUSTY_QL_CONFIG_FILE).required(false))
            .add_source(::config::Environment::with_prefix(RUSTY_QL_ENV_PREFIX))
            .build()?;
        let conf: EngineConfig = settings.try_deserialize()?;
        conf.validate()?;
        Ok(conf)
    }

    /// The lazily loaded process-wide default.
    pub fn global() -> &'static EngineConfig {
        &GLOBAL
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_size == 0 {
            return Err(Error::Config("channel_size must be positive".to_string()));
        }
        if self.error_channel_size == 0 {
            return Err(Error::Config(
                "error_channel_size must be positive".to_string(),
            ));
        }
        self.delimiter().map(|_| ())
    }

    /// The CSV delimiter as a single byte.
    pub fn delimiter(&self) -> Result<u8> {
        match self.csv_delimiter.as_bytes() {
            [b] => Ok(*b),
            _ if self.csv_delimiter == "\\t" => Ok(b'\t'),
            _ => Err(Error::Config(format!(
                "csv_delimiter must be a single byte, got {:?}",
                self.csv_delimiter
            ))),
        }
    }
}

/// Structured configuration of a named source, handed to a source
/// implementation's setup hook when the source is registered.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// The logical name of the source.
    #[serde(default)]
    pub name: String,
    /// The registered implementation type, e.g. "csv" or "memory".
    #[serde(rename = "type", alias = "source_type")]
    pub source_type: String,
    #[serde(default)]
    pub partitions: usize,
    /// Implementation specific settings.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl SourceConfig {
    pub fn new(name: &str, source_type: &str) -> Self {
        Self {
            name: name.to_string(),
            source_type: source_type.to_string(),
            partitions: 0,
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.settings.insert(key.to_string(), value.to_string());
        self
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}
