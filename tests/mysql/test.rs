use chrono::NaiveDate;
use ormfixtures::mysql::MySqlStore;
use ormfixtures::{
    record, relation, Condition, Connection, ConnectionConfig, EntityType, Error,
    FixtureCreator, MySqlFixtures, Repository, Value,
};
use sqlx::MySqlPool;
use std::env;
use std::fs::File;
use std::io::Write;
use tempfile::tempdir;

fn owners() -> EntityType {
    EntityType::new("Owner", "fixture_owners")
}

fn todos() -> EntityType {
    EntityType::new("Todo", "fixture_todos")
}

async fn prepare(pool: &MySqlPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS fixture_owners (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    name VARCHAR(255) NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE
)"#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS fixture_todos (
    id BIGINT PRIMARY KEY AUTO_INCREMENT,
    owner_id BIGINT NOT NULL,
    description VARCHAR(255) NOT NULL,
    done BOOLEAN NOT NULL DEFAULT FALSE,
    progress DOUBLE NULL,
    created_at DATETIME NULL
)"#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn config(url: &str) -> ConnectionConfig {
    ConnectionConfig::new(url).entity(owners()).entity(todos())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_loads_and_drops() -> anyhow::Result<()> {
    let url = env::var("TEST_DB_URL")?;
    let pool = MySqlPool::connect(&url).await?;
    prepare(&pool).await?;

    let dir = tempdir()?;
    let file_path = dir.path().join("todos.yml");
    let mut file = File::create(&file_path)?;
    writeln!(
        file,
        r#"
        - description: fizz
          progress: 10.5
          created_at: 2020/01/01 01:01:01
        - description: buzz"#
    )?;

    let todo_fixture = FixtureCreator::new(todos(), |draft, _, loaded| {
        let owner = relation::one(loaded, "Owner", &record! { "name" => "fizz" })?;
        Ok(draft.with("owner_id", owner.get("id")))
    });

    let mut fixtures = MySqlFixtures::new(|cfg| {
        cfg.config(config(&url));
        cfg.debug(true);
    });
    fixtures.register_generator("Owner", owners(), |_| Ok(vec![record! { "name" => "fizz" }]));
    fixtures.add_fixture(todo_fixture.from_file(&file_path)?);

    let loaded = fixtures.load().await?.clone();
    let owner_id = loaded["Owner"][0].get("id").cloned();
    assert_eq!(loaded["Owner"][0].get("active"), Some(&Value::Boolean(true)));

    let fizz = &loaded["Todo"][0];
    assert_eq!(fizz.get("owner_id").cloned(), owner_id);
    assert_eq!(fizz.get("done"), Some(&Value::Boolean(false)));
    assert_eq!(fizz.get("progress"), Some(&Value::Float(10.5)));
    assert_eq!(
        fizz.get("created_at"),
        Some(&Value::Datetime(
            NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(1, 1, 1)
                .unwrap()
        ))
    );
    assert_eq!(loaded["Todo"][1].get("progress"), Some(&Value::Null));

    fixtures.drop().await?;

    let ids: Vec<Value> = loaded["Todo"]
        .iter()
        .filter_map(|todo| todo.get("id").cloned())
        .collect();
    let store = MySqlStore::from_pool(pool.clone());
    let todos = todos();
    let remaining = store
        .repository(&todos)?
        .find(&Condition::new().is_in("id", ids))
        .await?;
    assert!(remaining.is_empty());
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_finds_existing_rows_through_an_ambient_pool() -> anyhow::Result<()> {
    let pool = MySqlPool::connect(&env::var("TEST_DB_URL")?).await?;
    prepare(&pool).await?;
    let existing = sqlx::query("INSERT INTO fixture_owners (name, active) VALUES ('buzz', FALSE)")
        .execute(&pool)
        .await?
        .last_insert_id() as i64;

    let dir = tempdir()?;
    let config_dir = dir.path().to_path_buf();
    let ambient = pool.clone();
    let mut fixtures = MySqlFixtures::new(|cfg| {
        cfg.config_dir(config_dir);
        cfg.ambient(move || {
            let connection: Box<dyn Connection> = Box::new(MySqlStore::from_pool(ambient.clone()));
            Some(connection)
        });
    });
    fixtures.register_find("inactive", owners(), Condition::new().eq("id", existing));
    fixtures.register_generator("todos", todos(), |loaded| {
        let owner = relation::one(loaded, "inactive", &record! { "active" => false })?;
        Ok(vec![record! { "owner_id" => owner.get("id"), "description" => "ambient" }])
    });

    let loaded = fixtures.load().await?.clone();
    assert_eq!(loaded["inactive"].len(), 1);
    assert_eq!(loaded["todos"][0].get("owner_id"), Some(&Value::Integer(existing)));
    fixtures.drop().await?;

    let removed = fixtures
        .remove_created(&owners(), &Condition::new().eq("id", existing))
        .await?;
    assert_eq!(removed.affected, 1);
    assert!(!pool.is_closed());
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_returns_persistence_error() -> anyhow::Result<()> {
    let url = env::var("TEST_DB_URL")?;
    let pool = MySqlPool::connect(&url).await?;
    prepare(&pool).await?;

    let mut fixtures = MySqlFixtures::new(|cfg| cfg.config(config(&url)));
    fixtures.register_generator("Todo", todos(), |_| {
        Ok(vec![record! { "description" => "fizz", "updated_at" => "2020/01/01 01:01:01" }])
    });
    let result = fixtures.load().await;
    assert!(matches!(
        result,
        Err(Error::Persistence { fixture, operation: "save", .. }) if fixture == "Todo"
    ));
    Ok(())
}
