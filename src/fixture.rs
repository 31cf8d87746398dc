use crate::error::Result;
use crate::store::{Condition, EntityType};
use crate::value::Record;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

/// Produces the drafts of one fixture from the groups resolved before it.
pub type Generator = Arc<dyn Fn(&LoadedFixtures) -> Result<Vec<Record>> + Send + Sync>;

/// A named group of rows created by `load` and deleted by `drop`.
#[derive(Clone)]
pub struct FixtureSpec {
    pub name: String,
    pub entity: EntityType,
    pub generator: Generator,
}

impl FixtureSpec {
    pub fn new<F>(name: impl Into<String>, entity: EntityType, generator: F) -> Self
    where
        F: Fn(&LoadedFixtures) -> Result<Vec<Record>> + Send + Sync + 'static,
    {
        FixtureSpec {
            name: name.into(),
            entity,
            generator: Arc::new(generator),
        }
    }

    pub fn generate(&self, loaded: &LoadedFixtures) -> Result<Vec<Record>> {
        (self.generator)(loaded)
    }
}

impl fmt::Debug for FixtureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureSpec")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .finish()
    }
}

/// A named group of pre-existing rows fetched by `load` and never deleted.
#[derive(Debug, Clone)]
pub struct FindSpec {
    pub name: String,
    pub entity: EntityType,
    pub condition: Condition,
}

/// Resolved fixture groups, in the order they were resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedFixtures {
    groups: Vec<(String, Vec<Record>)>,
}

impl LoadedFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[Record]> {
        self.groups
            .iter()
            .find(|(group, _)| group == name)
            .map(|(_, records)| records.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Stores a group; an existing group of the same name keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, records: Vec<Record>) {
        let name = name.into();
        match self.groups.iter_mut().find(|(group, _)| *group == name) {
            Some((_, slot)) => *slot = records,
            None => self.groups.push((name, records)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<Record>> {
        let index = self.groups.iter().position(|(group, _)| group == name)?;
        Some(self.groups.remove(index).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.groups
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}

impl Index<&str> for LoadedFixtures {
    type Output = [Record];

    fn index(&self, name: &str) -> &[Record] {
        match self.get(name) {
            Some(records) => records,
            None => panic!("fixture {} is not loaded", name),
        }
    }
}
