use crate::error::{Error, Result};
use crate::store::EntityType;
use std::fs;
use std::path::Path;
use yaml_rust::{Yaml, YamlLoader};

/// File names looked up, in order, when no configuration is given explicitly.
pub const ORMCONFIG_FILES: [&str; 2] = ["ormconfig.yml", "ormconfig.yaml"];

/// Connection settings handed to a [Connector](crate::store::Connector).
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub url: String,
    pub entities: Vec<EntityRef>,
}

/// An entity as listed in a configuration. Only resolved descriptors are
/// usable; path references are rejected when the configuration is validated.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRef {
    Resolved(EntityType),
    Path(String),
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        ConnectionConfig {
            url: url.into(),
            entities: vec![],
        }
    }

    pub fn entity(mut self, entity: EntityType) -> Self {
        self.entities.push(EntityRef::Resolved(entity));
        self
    }

    /// The resolved entity descriptors, once [validate](Self::validate) passed.
    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.iter().filter_map(|entity| match entity {
            EntityRef::Resolved(entity) => Some(entity),
            EntityRef::Path(_) => None,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.entities.is_empty() {
            return Err(Error::Configuration(
                "entities must be listed explicitly in the connection config".to_string(),
            ));
        }
        if let Some(EntityRef::Path(path)) = self
            .entities
            .iter()
            .find(|entity| matches!(entity, EntityRef::Path(_)))
        {
            return Err(Error::Configuration(format!(
                "entity {} is a path reference; entities must be resolved descriptors",
                path
            )));
        }
        Ok(())
    }

    /// Loads the first `ormconfig` file found in `dir`.
    pub fn discover(dir: &Path) -> Result<Option<ConnectionConfig>> {
        for file_name in ORMCONFIG_FILES.iter() {
            let path = dir.join(file_name);
            if path.is_file() {
                let contents = fs::read_to_string(&path)?;
                return Self::from_yaml_str(&contents).map(Some);
            }
        }
        Ok(None)
    }

    pub fn from_yaml_str(contents: &str) -> Result<ConnectionConfig> {
        let docs = YamlLoader::load_from_str(contents)?;
        let doc = match docs.first() {
            Some(doc @ Yaml::Hash(_)) => doc,
            _ => {
                return Err(Error::Configuration(
                    "ormconfig must be a mapping".to_string(),
                ))
            }
        };
        let url = doc["url"]
            .as_str()
            .ok_or_else(|| Error::Configuration("ormconfig is missing url".to_string()))?;

        let mut config = ConnectionConfig::new(url);
        if let Some(entities) = doc["entities"].as_vec() {
            for entity in entities {
                config.entities.push(entity_from_yaml(entity)?);
            }
        }
        Ok(config)
    }
}

fn entity_from_yaml(entity: &Yaml) -> Result<EntityRef> {
    if let Some(path) = entity.as_str() {
        return Ok(EntityRef::Path(path.to_string()));
    }
    let name = entity["name"]
        .as_str()
        .ok_or_else(|| Error::Configuration("ormconfig entity is missing name".to_string()))?;
    let table = entity["table"].as_str().unwrap_or(name);
    let mut descriptor = EntityType::new(name, table);
    if let Some(primary_key) = entity["primary_key"].as_str() {
        descriptor = descriptor.primary_key(primary_key);
    }
    Ok(EntityRef::Resolved(descriptor))
}
