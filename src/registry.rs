use crate::config::ConnectionConfig;
use crate::error::{Error, Phase, Result};
use crate::fixture::{FindSpec, FixtureSpec, LoadedFixtures};
use crate::memory::MemoryConnector;
use crate::store::{Condition, Connection, Connector, DeleteResult, EntityType};
use crate::value::{Record, Value};
use anyhow::anyhow;
use std::env;
use std::path::PathBuf;
use tracing::{error, info};

/// A registry over the in-process store.
pub type MemoryFixtures = FixtureRegistry<MemoryConnector>;

/// Hands out a connection the caller already opened and keeps ownership of.
pub type AmbientConnection = Box<dyn Fn() -> Option<Box<dyn Connection>> + Send + Sync>;

struct OpenConnection {
    inner: Box<dyn Connection>,
    owned: bool,
}

/// Named fixture groups and the `load` / `drop` pair that creates and removes
/// them.
///
/// Find fixtures are resolved first, then generated fixtures, each in
/// registration order; every generator sees all groups resolved before it.
/// `drop` deletes generated groups in reverse order so rows referencing
/// earlier groups go first.
pub struct FixtureRegistry<C: Connector> {
    connector: C,
    config: Option<ConnectionConfig>,
    config_dir: Option<PathBuf>,
    ambient: Option<AmbientConnection>,
    hold_connection: bool,
    debug: bool,
    fixtures: Vec<FixtureSpec>,
    find_fixtures: Vec<FindSpec>,
    entities: LoadedFixtures,
    connection: Option<OpenConnection>,
    phase: Phase,
}

impl<C> FixtureRegistry<C>
where
    C: Connector + Default,
{
    pub fn new<F>(options: F) -> FixtureRegistry<C>
    where
        F: FnOnce(&mut FixtureRegistry<C>),
    {
        let mut registry = Self::with_connector(C::default());
        options(&mut registry);
        registry
    }
}

impl<C> FixtureRegistry<C>
where
    C: Connector,
{
    pub fn with_connector(connector: C) -> FixtureRegistry<C> {
        FixtureRegistry {
            connector,
            config: None,
            config_dir: None,
            ambient: None,
            hold_connection: true,
            debug: false,
            fixtures: vec![],
            find_fixtures: vec![],
            entities: LoadedFixtures::new(),
            connection: None,
            phase: Phase::Registering,
        }
    }

    /// Use this configuration instead of looking for an `ormconfig` file.
    pub fn config(&mut self, config: ConnectionConfig) {
        self.config = Some(config);
    }

    /// Where to look for `ormconfig.yml` / `ormconfig.yaml`. Defaults to the
    /// working directory.
    pub fn config_dir(&mut self, dir: impl Into<PathBuf>) {
        self.config_dir = Some(dir.into());
    }

    /// Fallback used when no configuration can be found. Connections it
    /// returns are never closed by the registry.
    pub fn ambient<F>(&mut self, ambient: F)
    where
        F: Fn() -> Option<Box<dyn Connection>> + Send + Sync + 'static,
    {
        self.ambient = Some(Box::new(ambient));
    }

    pub fn connector(&mut self, connector: C) {
        self.connector = connector;
    }

    /// Keep the connection open between `load` and `drop` (the default), or
    /// close it after `load` and reconnect for `drop`.
    pub fn hold_connection(&mut self, hold: bool) {
        self.hold_connection = hold;
    }

    pub fn debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn loaded(&self) -> &LoadedFixtures {
        &self.entities
    }

    /// Registers a group of existing rows selected by `condition`.
    pub fn register_find(
        &mut self,
        name: impl Into<String>,
        entity: EntityType,
        condition: Condition,
    ) -> &mut Self {
        let name = name.into();
        self.fixtures.retain(|spec| spec.name != name);
        if self.debug {
            info!(fixture = %name, entity = %entity.name, "registered find fixture");
        }
        let spec = FindSpec {
            name,
            entity,
            condition,
        };
        match self.find_fixtures.iter_mut().find(|s| s.name == spec.name) {
            Some(slot) => *slot = spec,
            None => self.find_fixtures.push(spec),
        }
        self
    }

    /// [register_find](Self::register_find) under the entity's name.
    pub fn find_entities(&mut self, entity: EntityType, condition: Condition) -> &mut Self {
        self.register_find(entity.name.clone(), entity, condition)
    }

    pub fn register_generator<F>(
        &mut self,
        name: impl Into<String>,
        entity: EntityType,
        generator: F,
    ) -> &mut Self
    where
        F: Fn(&LoadedFixtures) -> Result<Vec<Record>> + Send + Sync + 'static,
    {
        self.add_fixture(FixtureSpec::new(name, entity, generator))
    }

    /// Registers a generated group, typically built by a
    /// [FixtureCreator](crate::FixtureCreator).
    pub fn add_fixture(&mut self, spec: FixtureSpec) -> &mut Self {
        self.find_fixtures.retain(|s| s.name != spec.name);
        if self.debug {
            info!(fixture = %spec.name, entity = %spec.entity.name, "registered fixture");
        }
        match self.fixtures.iter_mut().find(|s| s.name == spec.name) {
            Some(slot) => *slot = spec,
            None => self.fixtures.push(spec),
        }
        self
    }

    /// Registers `specs`, then [load](Self::load)s.
    pub async fn load_fixtures(&mut self, specs: Vec<FixtureSpec>) -> Result<&LoadedFixtures> {
        for spec in specs {
            self.add_fixture(spec);
        }
        self.load().await
    }

    /// Finds and creates every registered group.
    ///
    /// Groups saved before a failure are not rolled back.
    pub async fn load(&mut self) -> Result<&LoadedFixtures> {
        self.expect_phase("load", Phase::Registering)?;
        self.entities.clear();

        let result = self.load_all().await;
        if result.is_err() || !self.hold_connection {
            if let Err(err) = self.close_connection().await {
                self.show_error(&err);
            }
        }

        match result {
            Ok(()) => {
                self.phase = Phase::Loaded;
                Ok(&self.entities)
            }
            Err(err) => {
                self.phase = Phase::Failed;
                self.show_error(&err);
                Err(err)
            }
        }
    }

    async fn load_all(&mut self) -> Result<()> {
        self.connect().await?;
        let connection = match &self.connection {
            Some(connection) => connection.inner.as_ref(),
            None => return Err(self.not_connected("load")),
        };

        for spec in &self.find_fixtures {
            let repository = connection
                .repository(&spec.entity)
                .map_err(|source| Error::persistence(&spec.name, "find", source))?;
            let found = repository
                .find(&spec.condition)
                .await
                .map_err(|source| Error::persistence(&spec.name, "find", source))?;
            if self.debug {
                info!(fixture = %spec.name, rows = found.len(), "found fixture");
            }
            self.entities.insert(spec.name.clone(), found);
        }

        for spec in &self.fixtures {
            let repository = connection
                .repository(&spec.entity)
                .map_err(|source| Error::persistence(&spec.name, "save", source))?;
            let drafts = spec
                .generate(&self.entities)
                .map_err(|source| Error::Generator {
                    fixture: spec.name.clone(),
                    source: Box::new(source),
                })?;
            let prepared: Vec<Record> = drafts
                .into_iter()
                .map(|draft| repository.create(draft))
                .collect();
            let saved = repository
                .save(prepared)
                .await
                .map_err(|source| Error::persistence(&spec.name, "save", source))?;
            if self.debug {
                info!(fixture = %spec.name, rows = saved.len(), "loaded fixture");
            }
            self.entities.insert(spec.name.clone(), saved);
        }
        Ok(())
    }

    /// Deletes the rows created by [load](Self::load), last group first, then
    /// closes the connection whether or not every delete succeeded.
    pub async fn drop(&mut self) -> Result<()> {
        self.expect_phase("drop", Phase::Loaded)?;
        self.phase = Phase::Dropped;

        let result = self.drop_all().await;
        let closed = self.close_connection().await;
        self.entities.clear();

        let result = match (result, closed) {
            (Err(err), Err(close_err)) => {
                self.show_error(&close_err);
                Err(err)
            }
            (result, closed) => result.and(closed),
        };
        if let Err(err) = &result {
            self.show_error(err);
        }
        result
    }

    async fn drop_all(&mut self) -> Result<()> {
        self.connect().await?;
        let connection = match &self.connection {
            Some(connection) => connection.inner.as_ref(),
            None => return Err(self.not_connected("drop")),
        };

        for spec in self.fixtures.iter().rev() {
            let primary_key = &spec.entity.primary_key;
            let ids: Vec<Value> = match self.entities.get(&spec.name) {
                Some(records) => records
                    .iter()
                    .map(|record| match record.get(primary_key) {
                        None | Some(Value::Null) => Err(Error::persistence(
                            &spec.name,
                            "delete",
                            anyhow!("a loaded record has no {} to delete by", primary_key),
                        )),
                        Some(id) => Ok(id.clone()),
                    })
                    .collect::<Result<_>>()?,
                None => return Err(Error::FixtureNotLoaded(spec.name.clone())),
            };
            let repository = connection
                .repository(&spec.entity)
                .map_err(|source| Error::persistence(&spec.name, "delete", source))?;
            let deleted = repository
                .delete(&Condition::new().is_in(primary_key.clone(), ids))
                .await
                .map_err(|source| Error::persistence(&spec.name, "delete", source))?;
            self.entities.remove(&spec.name);
            if self.debug {
                info!(fixture = %spec.name, rows = deleted.affected, "dropped fixture");
            }
        }
        Ok(())
    }

    /// Deletes rows of `entity` matching `condition`.
    pub async fn remove_created(
        &mut self,
        entity: &EntityType,
        condition: &Condition,
    ) -> Result<DeleteResult> {
        let connection = self.open("remove_created").await?;
        let repository = connection
            .repository(entity)
            .map_err(|source| Error::persistence(&entity.name, "delete", source))?;
        repository
            .delete(condition)
            .await
            .map_err(|source| Error::persistence(&entity.name, "delete", source))
    }

    pub async fn find_one_existing(
        &mut self,
        entity: &EntityType,
        condition: &Condition,
    ) -> Result<Option<Record>> {
        let connection = self.open("find_one_existing").await?;
        let repository = connection
            .repository(entity)
            .map_err(|source| Error::persistence(&entity.name, "find", source))?;
        repository
            .find_one(condition)
            .await
            .map_err(|source| Error::persistence(&entity.name, "find", source))
    }

    pub async fn find_many_existing(
        &mut self,
        entity: &EntityType,
        condition: &Condition,
    ) -> Result<Vec<Record>> {
        let connection = self.open("find_many_existing").await?;
        let repository = connection
            .repository(entity)
            .map_err(|source| Error::persistence(&entity.name, "find", source))?;
        repository
            .find(condition)
            .await
            .map_err(|source| Error::persistence(&entity.name, "find", source))
    }

    /// Closes the connection and forgets every registration and loaded group.
    pub async fn close(&mut self) -> Result<()> {
        let result = self.close_connection().await;
        self.entities.clear();
        self.fixtures.clear();
        self.find_fixtures.clear();
        self.phase = Phase::Closed;
        if let Err(err) = &result {
            self.show_error(err);
        }
        result
    }

    async fn open(&mut self, operation: &'static str) -> Result<&dyn Connection> {
        if self.phase == Phase::Closed {
            return Err(Error::InvalidCallSequence {
                operation,
                phase: self.phase,
            });
        }
        self.connect().await?;
        match &self.connection {
            Some(connection) => Ok(connection.inner.as_ref()),
            None => Err(self.not_connected(operation)),
        }
    }

    /// Resolves a connection: explicit config, then an `ormconfig` file, then
    /// the ambient connection.
    async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        let config = match &self.config {
            Some(config) => Some(config.clone()),
            None => {
                let dir = match &self.config_dir {
                    Some(dir) => dir.clone(),
                    None => env::current_dir()?,
                };
                ConnectionConfig::discover(&dir)?
            }
        };

        let connection = match config {
            Some(config) => {
                config.validate()?;
                let inner = self
                    .connector
                    .connect(&config)
                    .await
                    .map_err(|source| Error::Connection {
                        source: source.into(),
                    })?;
                OpenConnection { inner, owned: true }
            }
            None => match self.ambient.as_ref().and_then(|ambient| ambient()) {
                Some(inner) => OpenConnection {
                    inner,
                    owned: false,
                },
                None => {
                    return Err(Error::Configuration(
                        "connection could not be established: no config was provided, \
                         no ormconfig.yml/ormconfig.yaml file was found and no ambient \
                         connection is available"
                            .to_string(),
                    ))
                }
            },
        };

        if self.debug {
            info!(owned = connection.owned, "opened fixture connection");
        }
        self.connection = Some(connection);
        Ok(())
    }

    async fn close_connection(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(OpenConnection {
                mut inner,
                owned: true,
            }) => {
                inner.close().await.map_err(|source| Error::Connection {
                    source: source.into(),
                })?;
                if self.debug {
                    info!("closed fixture connection");
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn expect_phase(&self, operation: &'static str, expected: Phase) -> Result<()> {
        if self.phase != expected {
            let err = Error::InvalidCallSequence {
                operation,
                phase: self.phase,
            };
            self.show_error(&err);
            return Err(err);
        }
        Ok(())
    }

    fn not_connected(&self, operation: &'static str) -> Error {
        Error::Configuration(format!("{}: connection could not be established", operation))
    }

    fn show_error(&self, err: &Error) {
        if self.debug {
            error!(error = %err, "fixture registry error");
        }
    }
}
