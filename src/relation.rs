//! Lookups between loaded fixture groups, for generators that need to point
//! at rows created or found earlier.

use crate::error::{Error, Result};
use crate::fixture::LoadedFixtures;
use crate::value::{Record, Value};

/// Every record of group `name` matching `criteria`. An absent group yields
/// nothing.
pub fn many<'a>(loaded: &'a LoadedFixtures, name: &str, criteria: &Record) -> Vec<&'a Record> {
    loaded
        .get(name)
        .unwrap_or_default()
        .iter()
        .filter(|record| record.matches(criteria))
        .collect()
}

/// The first record of group `name` matching `criteria`.
pub fn one<'a>(loaded: &'a LoadedFixtures, name: &str, criteria: &Record) -> Result<&'a Record> {
    let group = loaded
        .get(name)
        .ok_or_else(|| Error::FixtureNotLoaded(name.to_string()))?;
    if criteria.is_empty() {
        return Err(Error::CriteriaRequired(name.to_string()));
    }
    group
        .iter()
        .find(|record| record.matches(criteria))
        .ok_or_else(|| Error::NotFound(name.to_string()))
}

/// Records of group `name` referenced by `entity[field]`, which holds one or
/// more partial records. Without such a field the whole group is returned; a
/// plain value in it references nothing.
pub fn relation<'a>(
    loaded: &'a LoadedFixtures,
    name: &str,
    entity: &Record,
    field: &str,
) -> Vec<&'a Record> {
    let group = loaded.get(name).unwrap_or_default();
    let wanted: Vec<&Record> = match entity.get(field) {
        Some(Value::Record(record)) => vec![record],
        Some(Value::List(items)) => items.iter().filter_map(Value::as_record).collect(),
        None | Some(Value::Null) => return group.iter().collect(),
        Some(_) => return vec![],
    };
    group
        .iter()
        .filter(|record| wanted.iter().any(|criteria| record.matches(criteria)))
        .collect()
}
