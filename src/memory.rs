//! An in-process store: tables of [Record]s behind a shared handle.
//!
//! Every store call is journaled so tests can assert on the exact sequence of
//! operations a registry performed.

use crate::config::ConnectionConfig;
use crate::store::{Condition, Connection, Connector, DeleteResult, EntityType, Repository};
use crate::value::{Record, Value};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One journaled store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Save { table: String, rows: usize },
    Find { table: String },
    Delete { table: String, affected: u64 },
    Close,
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Record>>,
    sequences: HashMap<String, i64>,
    journal: Vec<Operation>,
    open_connections: usize,
    refuse_connections: bool,
    failing_tables: HashSet<String>,
}

/// Shared handle to the in-memory tables. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts rows directly, bypassing the journal.
    pub fn seed(&self, entity: &EntityType, rows: Vec<Record>) {
        let mut tables = self.lock();
        for row in rows {
            let row = tables.assign_key(entity, row);
            tables.rows.entry(entity.table.clone()).or_default().push(row);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock().rows.get(table).cloned().unwrap_or_default()
    }

    pub fn journal(&self) -> Vec<Operation> {
        self.lock().journal.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open_connections
    }

    /// Makes every following connection attempt fail.
    pub fn refuse_connections(&self) {
        self.lock().refuse_connections = true;
    }

    /// Makes saves and deletes against `table` fail.
    pub fn fail_table(&self, table: &str) {
        self.lock().failing_tables.insert(table.to_string());
    }

    /// An already-open connection, accepting every entity type.
    pub fn connection(&self) -> MemoryConnection {
        self.lock().open_connections += 1;
        MemoryConnection {
            database: self.clone(),
            entities: None,
            closed: false,
        }
    }
}

impl Tables {
    fn assign_key(&mut self, entity: &EntityType, mut row: Record) -> Record {
        let sequence = self.sequences.entry(entity.table.clone()).or_insert(0);
        match row.get(&entity.primary_key) {
            None | Some(Value::Null) => {
                *sequence += 1;
                row.set(entity.primary_key.clone(), *sequence);
            }
            Some(Value::Integer(id)) => *sequence = (*sequence).max(*id),
            // caller-supplied keys of any other type are stored as given
            Some(_) => (),
        }
        row
    }

    fn check_writable(&self, table: &str) -> anyhow::Result<()> {
        if self.failing_tables.contains(table) {
            return Err(anyhow!("table {} rejected the write", table));
        }
        Ok(())
    }
}

/// Opens [MemoryConnection]s onto a [MemoryDatabase].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    database: MemoryDatabase,
}

impl MemoryConnector {
    pub fn new(database: MemoryDatabase) -> Self {
        MemoryConnector { database }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &ConnectionConfig) -> anyhow::Result<Box<dyn Connection>> {
        let mut tables = self.database.lock();
        if tables.refuse_connections {
            return Err(anyhow!("connection refused by {}", config.url));
        }
        tables.open_connections += 1;
        tables.journal.push(Operation::Connect);
        Ok(Box::new(MemoryConnection {
            database: self.database.clone(),
            entities: Some(config.entity_types().cloned().collect()),
            closed: false,
        }))
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    database: MemoryDatabase,
    entities: Option<Vec<EntityType>>,
    closed: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn repository<'a>(&'a self, entity: &'a EntityType) -> anyhow::Result<Box<dyn Repository + 'a>> {
        if self.closed {
            return Err(anyhow!("connection is closed"));
        }
        if let Some(entities) = &self.entities {
            if !entities.contains(entity) {
                return Err(anyhow!("no metadata for entity {}", entity.name));
            }
        }
        Ok(Box::new(MemoryRepository {
            database: &self.database,
            entity,
        }))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut tables = self.database.lock();
        tables.open_connections -= 1;
        tables.journal.push(Operation::Close);
        Ok(())
    }
}

pub struct MemoryRepository<'a> {
    database: &'a MemoryDatabase,
    entity: &'a EntityType,
}

#[async_trait]
impl Repository for MemoryRepository<'_> {
    async fn save(&self, entities: Vec<Record>) -> anyhow::Result<Vec<Record>> {
        let mut tables = self.database.lock();
        tables.check_writable(&self.entity.table)?;
        let saved: Vec<Record> = entities
            .into_iter()
            .map(|row| tables.assign_key(self.entity, row))
            .collect();
        tables
            .rows
            .entry(self.entity.table.clone())
            .or_default()
            .extend(saved.iter().cloned());
        tables.journal.push(Operation::Save {
            table: self.entity.table.clone(),
            rows: saved.len(),
        });
        Ok(saved)
    }

    async fn find(&self, condition: &Condition) -> anyhow::Result<Vec<Record>> {
        let mut tables = self.database.lock();
        tables.journal.push(Operation::Find {
            table: self.entity.table.clone(),
        });
        Ok(tables
            .rows
            .get(&self.entity.table)
            .map(|rows| rows.iter().filter(|row| condition.matches(row)).cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, condition: &Condition) -> anyhow::Result<DeleteResult> {
        let mut tables = self.database.lock();
        tables.check_writable(&self.entity.table)?;
        let rows = tables.rows.entry(self.entity.table.clone()).or_default();
        let before = rows.len();
        rows.retain(|row| !condition.matches(row));
        let affected = (before - rows.len()) as u64;
        tables.journal.push(Operation::Delete {
            table: self.entity.table.clone(),
            affected,
        });
        Ok(DeleteResult { affected })
    }
}
