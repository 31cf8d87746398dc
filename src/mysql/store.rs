use crate::config::ConnectionConfig;
use crate::mysql::helper;
use crate::registry::FixtureRegistry;
use crate::store::{Condition, Connection, Connector, DeleteResult, EntityType, Repository};
use crate::value::{Record, Value};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use sqlx::MySqlPool;

/// A registry backed by **MySQL**.
pub type MySqlFixtures = FixtureRegistry<MySqlConnector>;

/// Opens a [MySqlStore] from the configured URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, config: &ConnectionConfig) -> anyhow::Result<Box<dyn Connection>> {
        let pool = MySqlPool::connect(&config.url).await?;
        Ok(Box::new(MySqlStore {
            pool,
            entities: Some(config.entity_types().cloned().collect()),
        }))
    }
}

/// A pool plus the entities it was configured with.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    entities: Option<Vec<EntityType>>,
}

impl MySqlStore {
    /// Wraps a pool opened elsewhere; every entity type is accepted.
    pub fn from_pool(pool: MySqlPool) -> Self {
        MySqlStore {
            pool,
            entities: None,
        }
    }
}

#[async_trait]
impl Connection for MySqlStore {
    fn repository<'a>(&'a self, entity: &'a EntityType) -> anyhow::Result<Box<dyn Repository + 'a>> {
        if let Some(entities) = &self.entities {
            if !entities.contains(entity) {
                bail!("no metadata for entity {}", entity.name);
            }
        }
        Ok(Box::new(MySqlRepository {
            pool: &self.pool,
            entity,
        }))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

pub struct MySqlRepository<'a> {
    pool: &'a MySqlPool,
    entity: &'a EntityType,
}

#[async_trait]
impl Repository for MySqlRepository<'_> {
    /// Inserts every entity in one transaction, then reads them back so
    /// column defaults and generated keys are included.
    async fn save(&self, entities: Vec<Record>) -> anyhow::Result<Vec<Record>> {
        let mut tx = self.pool.begin().await?;

        let result: anyhow::Result<Vec<Value>> = async {
            let mut ids = vec![];
            for entity in &entities {
                let (sql, params) = helper::insert_sql(&self.entity.table, entity)?;
                let query = helper::bind_all(sqlx::query(&sql), &params)?;
                let done = query.execute(&mut *tx).await?;
                let id = match entity.get(&self.entity.primary_key) {
                    Some(id) => id.clone(),
                    None => Value::Integer(i64::try_from(done.last_insert_id())?),
                };
                ids.push(id);
            }
            Ok(ids)
        }
        .await;

        let ids = match result {
            Ok(ids) => {
                tx.commit().await?;
                ids
            }
            Err(err) => {
                tx.rollback().await?;
                return Err(anyhow!("could not save into {}: {}", self.entity.table, err));
            }
        };

        let mut saved = vec![];
        for id in ids {
            let condition = Condition::new().eq(self.entity.primary_key.clone(), id.clone());
            match self.find_one(&condition).await? {
                Some(record) => saved.push(record),
                None => bail!("saved row {} of {} could not be read back", id, self.entity.table),
            }
        }
        Ok(saved)
    }

    async fn find(&self, condition: &Condition) -> anyhow::Result<Vec<Record>> {
        let (sql, params) = helper::select_sql(&self.entity.table, condition)?;
        let rows = helper::bind_all(sqlx::query(&sql), &params)?
            .fetch_all(self.pool)
            .await?;
        rows.iter().map(helper::convert_row).collect()
    }

    async fn find_one(&self, condition: &Condition) -> anyhow::Result<Option<Record>> {
        let (sql, params) = helper::select_sql(&self.entity.table, condition)?;
        let sql = format!("{} LIMIT 1", sql);
        let row = helper::bind_all(sqlx::query(&sql), &params)?
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(helper::convert_row).transpose()
    }

    async fn delete(&self, condition: &Condition) -> anyhow::Result<DeleteResult> {
        let (sql, params) = helper::delete_sql(&self.entity.table, condition)?;
        let done = helper::bind_all(sqlx::query(&sql), &params)?
            .execute(self.pool)
            .await?;
        Ok(DeleteResult {
            affected: done.rows_affected(),
        })
    }
}
