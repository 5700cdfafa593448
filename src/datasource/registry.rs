use crate::common::Result;
use crate::config::SourceConfig;
use crate::datasource::DataSource;
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// A registered named source: its configuration and the implementation
/// serving it.
#[derive(Clone)]
pub struct SourceFeatures {
    pub conf: SourceConfig,
    pub data_source: Arc<dyn DataSource>,
}

/// A named group of sources.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    name: String,
    sources: BTreeMap<String, SourceConfig>,
}

impl Schema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sources: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_source(&mut self, conf: SourceConfig) {
        self.sources.insert(conf.name.to_lowercase(), conf);
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.get(&name.to_lowercase())
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }
}

/// Process-local registry of source types, named sources and schemas. Names
/// are case-insensitive.
#[derive(Default)]
pub struct Registry {
    source_types: RwLock<HashMap<String, Arc<dyn DataSource>>>,
    sources: RwLock<HashMap<String, SourceFeatures>>,
    schemas: RwLock<HashMap<String, Schema>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source implementation under a type name, e.g. "csv".
    pub fn register_type(&self, source_type: &str, data_source: Arc<dyn DataSource>) -> Result<()> {
        debug!("registering source type {source_type}");
        self.source_types
            .write()?
            .insert(source_type.to_lowercase(), data_source);
        Ok(())
    }

    pub fn source_type(&self, source_type: &str) -> Result<Option<Arc<dyn DataSource>>> {
        Ok(self
            .source_types
            .read()?
            .get(&source_type.to_lowercase())
            .cloned())
    }

    /// Registers a named source served by the given implementation.
    pub fn add_source(&self, conf: SourceConfig, data_source: Arc<dyn DataSource>) -> Result<()> {
        info!("adding source {} of type {}", conf.name, conf.source_type);
        let features = SourceFeatures { conf, data_source };
        self.sources
            .write()?
            .insert(features.conf.name.to_lowercase(), features);
        Ok(())
    }

    /// Looks up a named source.
    pub fn get(&self, name: &str) -> Result<Option<SourceFeatures>> {
        Ok(self.sources.read()?.get(&name.to_lowercase()).cloned())
    }

    pub fn schema_add(&self, schema: Schema) -> Result<()> {
        let mut schemas = self.schemas.write()?;
        schemas
            .entry(schema.name().to_lowercase())
            .or_insert(schema);
        Ok(())
    }

    pub fn schema(&self, name: &str) -> Result<Option<Schema>> {
        Ok(self.schemas.read()?.get(&name.to_lowercase()).cloned())
    }

    /// Adds a source to a schema (created on demand) and registers it by name.
    pub fn source_schema_add(
        &self,
        schema_name: &str,
        conf: SourceConfig,
        data_source: Arc<dyn DataSource>,
    ) -> Result<()> {
        {
            let mut schemas = self.schemas.write()?;
            schemas
                .entry(schema_name.to_lowercase())
                .or_insert_with(|| Schema::new(schema_name))
                .add_source(conf.clone());
        }
        self.add_source(conf, data_source)
    }

    /// Closes every registered source type.
    pub fn close(&self) -> Result<()> {
        for (name, data_source) in self.source_types.read()?.iter() {
            if let Err(err) = data_source.close() {
                log::warn!("could not close source type {name}: {err}");
            }
        }
        Ok(())
    }
}
