use crate::error::{Error, Result};
use crate::fixture::{FixtureSpec, LoadedFixtures};
use crate::store::EntityType;
use crate::value::Record;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use yaml_rust::{Yaml, YamlLoader};

type Mapper = dyn Fn(Record, usize, &LoadedFixtures) -> Result<Record> + Send + Sync;

/// What a generator starts from: `n` blank drafts or explicit partial ones.
#[derive(Debug, Clone, PartialEq)]
pub enum Drafts {
    Count(usize),
    Records(Vec<Record>),
}

impl From<usize> for Drafts {
    fn from(count: usize) -> Self {
        Drafts::Count(count)
    }
}

impl From<Vec<Record>> for Drafts {
    fn from(records: Vec<Record>) -> Self {
        Drafts::Records(records)
    }
}

impl Drafts {
    fn into_records(self) -> Vec<Record> {
        match self {
            Drafts::Count(count) => vec![Record::new(); count],
            Drafts::Records(records) => records,
        }
    }
}

/// Builds [FixtureSpec]s for one entity, passing every draft through a mapper
/// that fills in the remaining fields.
///
/// ```
/// use ormfixtures::{record, EntityType, FixtureCreator, LoadedFixtures};
///
/// let users = FixtureCreator::new(EntityType::new("User", "users"), |draft, i, _| {
///     Ok(draft.with("name", format!("user-{}", i)))
/// });
/// let spec = users.create(2usize);
/// let drafts = spec.generate(&LoadedFixtures::new()).unwrap();
/// assert_eq!(drafts, vec![record! { "name" => "user-0" }, record! { "name" => "user-1" }]);
/// ```
#[derive(Clone)]
pub struct FixtureCreator {
    entity: EntityType,
    mapper: Arc<Mapper>,
}

impl FixtureCreator {
    pub fn new<F>(entity: EntityType, mapper: F) -> Self
    where
        F: Fn(Record, usize, &LoadedFixtures) -> Result<Record> + Send + Sync + 'static,
    {
        FixtureCreator {
            entity,
            mapper: Arc::new(mapper),
        }
    }

    pub fn entity(&self) -> &EntityType {
        &self.entity
    }

    /// A fixture named after the entity.
    pub fn create(&self, drafts: impl Into<Drafts>) -> FixtureSpec {
        let drafts = drafts.into().into_records();
        let mapper = Arc::clone(&self.mapper);
        FixtureSpec::new(
            self.entity.name.clone(),
            self.entity.clone(),
            move |loaded: &LoadedFixtures| {
                drafts
                    .iter()
                    .cloned()
                    .enumerate()
                    .map(|(index, draft)| mapper(draft, index, loaded))
                    .collect()
            },
        )
    }

    /// Like [create](Self::create), with drafts read from a YAML list.
    pub fn from_file(&self, path: impl AsRef<Path>) -> Result<FixtureSpec> {
        let file = File::open(path.as_ref())?;
        let mut buf_reader = BufReader::new(file);
        let mut contents = String::new();
        buf_reader.read_to_string(&mut contents)?;
        let docs = YamlLoader::load_from_str(contents.as_str())?;

        let mut drafts = vec![];
        match docs.first() {
            Some(Yaml::Array(records)) => {
                for record in records {
                    let draft = Record::from_yaml(record).ok_or_else(|| {
                        Error::Configuration(format!(
                            "{}: every fixture entry must be a mapping",
                            path.as_ref().display()
                        ))
                    })?;
                    drafts.push(draft);
                }
            }
            None | Some(Yaml::Null) => (),
            Some(_) => {
                return Err(Error::Configuration(format!(
                    "{}: fixture file must contain a list",
                    path.as_ref().display()
                )))
            }
        }
        Ok(self.create(drafts))
    }
}
