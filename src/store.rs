use crate::config::ConnectionConfig;
use crate::value::{Record, Value};
use async_trait::async_trait;

/// Describes one persisted entity: the name fixtures are keyed by, the table
/// it lives in and its primary key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    pub name: String,
    pub table: String,
    pub primary_key: String,
}

impl EntityType {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        EntityType {
            name: name.into(),
            table: table.into(),
            primary_key: "id".to_string(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }
}

/// A conjunction of field filters. An empty condition selects every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.into(), value.into()));
        self
    }

    pub fn is_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filters.push(Filter::In(field.into(), values));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|filter| match filter {
            Filter::Eq(field, value) => record.get(field) == Some(value),
            Filter::In(field, values) => record
                .get(field)
                .map_or(false, |actual| values.contains(actual)),
        })
    }
}

impl From<Record> for Condition {
    fn from(record: Record) -> Self {
        record
            .fields()
            .fold(Condition::new(), |condition, (field, value)| {
                condition.eq(field, value)
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub affected: u64,
}

/// Opens connections from a resolved configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> anyhow::Result<Box<dyn Connection>>;
}

#[async_trait]
pub trait Connection: Send + Sync {
    fn repository<'a>(&'a self, entity: &'a EntityType) -> anyhow::Result<Box<dyn Repository + 'a>>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Row access for a single entity type.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Turns a draft into an unsaved entity.
    fn create(&self, draft: Record) -> Record {
        draft
    }

    /// Persists entities and returns them as stored, generated keys included.
    async fn save(&self, entities: Vec<Record>) -> anyhow::Result<Vec<Record>>;

    async fn find(&self, condition: &Condition) -> anyhow::Result<Vec<Record>>;

    async fn find_one(&self, condition: &Condition) -> anyhow::Result<Option<Record>> {
        Ok(self.find(condition).await?.into_iter().next())
    }

    async fn delete(&self, condition: &Condition) -> anyhow::Result<DeleteResult>;
}
