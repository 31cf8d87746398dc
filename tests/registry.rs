use ormfixtures::memory::Operation;
use ormfixtures::{
    record, relation, Condition, Connection, ConnectionConfig, EntityType, Error,
    FixtureCreator, LoadedFixtures, MemoryConnector, MemoryDatabase, MemoryFixtures, Phase,
    Record, Value,
};
use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn users() -> EntityType {
    EntityType::new("User", "users")
}

fn orders() -> EntityType {
    EntityType::new("Order", "orders")
}

fn items() -> EntityType {
    EntityType::new("Item", "items")
}

fn config() -> ConnectionConfig {
    ConnectionConfig::new("memory://test")
        .entity(users())
        .entity(orders())
        .entity(items())
}

fn registry(database: &MemoryDatabase) -> MemoryFixtures {
    let database = database.clone();
    MemoryFixtures::new(|cfg| {
        cfg.connector(MemoryConnector::new(database));
        cfg.config(config());
        cfg.debug(true);
    })
}

fn seed_users(database: &MemoryDatabase) {
    database.seed(
        &users(),
        vec![
            record! { "name" => "fizz", "active" => true },
            record! { "name" => "buzz", "active" => false },
            record! { "name" => "fizzbuzz", "active" => true },
        ],
    );
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_links_generated_rows_to_found_rows() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    seed_users(&database);

    let mut fixtures = registry(&database);
    fixtures
        .register_find("users", users(), Condition::new().eq("active", true))
        .register_generator("orders", orders(), |loaded| {
            Ok(vec![record! { "user_id" => loaded["users"][0].get("id") }])
        });

    let loaded = fixtures.load().await?.clone();
    assert_eq!(loaded["users"].len(), 2);
    assert_eq!(
        loaded["orders"][0].get("user_id"),
        loaded["users"][0].get("id")
    );
    assert_eq!(database.rows("orders"), loaded["orders"].to_vec());
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_returns_every_registered_name_in_resolution_order() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    seed_users(&database);

    let mut fixtures = registry(&database);
    fixtures
        .register_generator("orders", orders(), |_| Ok(vec![record! { "total" => 10 }]))
        .register_find("users", users(), Condition::new())
        .register_generator("items", items(), |_| Ok(vec![]));

    let loaded = fixtures.load().await?;
    assert_eq!(
        loaded.names().collect::<Vec<_>>(),
        vec!["users", "orders", "items"]
    );
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_runs_generators_in_registration_order() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    let seen: Arc<Mutex<Vec<(String, Vec<String>)>>> = Arc::new(Mutex::new(vec![]));

    let mut fixtures = registry(&database);
    for (name, entity) in [("users", users()), ("orders", orders()), ("items", items())] {
        let seen = Arc::clone(&seen);
        fixtures.register_generator(name, entity, move |loaded: &LoadedFixtures| {
            let visible = loaded.names().map(str::to_string).collect();
            seen.lock().unwrap().push((name.to_string(), visible));
            Ok(vec![record! { "name" => name }])
        });
    }
    fixtures.load().await?;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("users".to_string(), vec![]),
            ("orders".to_string(), vec!["users".to_string()]),
            (
                "items".to_string(),
                vec!["users".to_string(), "orders".to_string()]
            ),
        ]
    );
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_drops_created_rows_in_reverse_order() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    seed_users(&database);
    database.seed(&orders(), vec![record! { "total" => 1 }]);

    let mut fixtures = registry(&database);
    fixtures
        .register_find("users", users(), Condition::new())
        .register_generator("orders", orders(), |_| {
            Ok(vec![record! { "total" => 2 }, record! { "total" => 3 }])
        })
        .register_generator("items", items(), |loaded| {
            let order = relation::one(loaded, "orders", &record! { "total" => 3 })?;
            Ok(vec![record! { "order_id" => order.get("id") }])
        });
    fixtures.load().await?;
    fixtures.drop().await?;

    assert_eq!(
        database.journal(),
        vec![
            Operation::Connect,
            Operation::Find {
                table: "users".to_string()
            },
            Operation::Save {
                table: "orders".to_string(),
                rows: 2
            },
            Operation::Save {
                table: "items".to_string(),
                rows: 1
            },
            Operation::Delete {
                table: "items".to_string(),
                affected: 1
            },
            Operation::Delete {
                table: "orders".to_string(),
                affected: 2
            },
            Operation::Close,
        ]
    );
    // found and pre-existing rows stay
    assert_eq!(database.rows("users").len(), 3);
    assert_eq!(database.rows("orders"), vec![record! { "total" => 1, "id" => 1 }]);
    assert!(database.rows("items").is_empty());
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_fails_to_drop_a_fixture_that_was_never_loaded() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    let mut fixtures = registry(&database);
    fixtures.register_generator("users", users(), |_| Ok(vec![record! { "name" => "fizz" }]));
    fixtures.load().await?;

    fixtures.register_generator("orders", orders(), |_| Ok(vec![]));
    let result = fixtures.drop().await;
    assert!(matches!(result, Err(Error::FixtureNotLoaded(name)) if name == "orders"));

    // users were not dropped, but the connection was closed
    assert_eq!(database.rows("users").len(), 1);
    assert_eq!(database.open_connections(), 0);
    assert_eq!(database.journal().last(), Some(&Operation::Close));
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_closes_the_connection_when_a_delete_fails() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    let mut fixtures = registry(&database);
    fixtures
        .register_generator("users", users(), |_| Ok(vec![record! { "name" => "fizz" }]))
        .register_generator("orders", orders(), |_| Ok(vec![record! { "total" => 1 }]));
    fixtures.load().await?;

    database.fail_table("orders");
    let err = fixtures.drop().await.unwrap_err();
    assert!(matches!(
        &err,
        Error::Persistence { fixture, operation: "delete", .. } if fixture == "orders"
    ));
    assert!(err.to_string().contains("orders"));
    assert_eq!(database.rows("users").len(), 1);
    assert_eq!(database.open_connections(), 0);
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_keeps_earlier_groups_when_a_save_fails() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    database.fail_table("orders");
    let mut fixtures = registry(&database);
    fixtures
        .register_generator("users", users(), |_| Ok(vec![record! { "name" => "fizz" }]))
        .register_generator("orders", orders(), |_| Ok(vec![record! { "total" => 1 }]));

    let err = fixtures.load().await.unwrap_err();
    assert!(matches!(
        &err,
        Error::Persistence { fixture, operation: "save", .. } if fixture == "orders"
    ));
    assert_eq!(database.rows("users").len(), 1);
    assert_eq!(database.open_connections(), 0);
    assert_eq!(fixtures.phase(), Phase::Failed);
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_names_the_fixture_whose_generator_failed() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    let mut fixtures = registry(&database);
    fixtures.register_generator("orders", orders(), |loaded| {
        let user = relation::one(loaded, "users", &record! { "id" => 1 })?;
        Ok(vec![record! { "user_id" => user.get("id") }])
    });

    let err = fixtures.load().await.unwrap_err();
    match err {
        Error::Generator { fixture, source } => {
            assert_eq!(fixture, "orders");
            assert!(matches!(source.as_ref(), Error::FixtureNotLoaded(name) if name == "users"));
        }
        other => panic!("unexpected error: {}", other),
    }
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_rejects_invalid_call_sequences() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    let mut fixtures = registry(&database);
    fixtures.register_generator("users", users(), |_| Ok(vec![]));

    assert!(matches!(
        fixtures.drop().await,
        Err(Error::InvalidCallSequence {
            operation: "drop",
            phase: Phase::Registering
        })
    ));

    fixtures.load().await?;
    assert!(matches!(
        fixtures.load().await,
        Err(Error::InvalidCallSequence {
            operation: "load",
            phase: Phase::Loaded
        })
    ));

    fixtures.drop().await?;
    assert!(matches!(
        fixtures.drop().await,
        Err(Error::InvalidCallSequence {
            operation: "drop",
            phase: Phase::Dropped
        })
    ));
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_loads_fixtures_built_by_a_creator() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    seed_users(&database);

    let order_fixture = FixtureCreator::new(orders(), |draft: Record, index, loaded| {
        let buyers = relation::many(loaded, "User", &record! { "active" => true });
        let buyer = buyers[index % buyers.len()];
        Ok(draft
            .with("user_id", buyer.get("id"))
            .with("position", index as i64))
    });

    let mut fixtures = registry(&database);
    fixtures.find_entities(users(), Condition::new());
    let loaded = fixtures
        .load_fixtures(vec![order_fixture.create(3usize)])
        .await?
        .clone();

    let user_ids: Vec<Option<&Value>> = loaded["Order"]
        .iter()
        .map(|order| order.get("user_id"))
        .collect();
    assert_eq!(
        user_ids,
        vec![Some(&Value::Integer(1)), Some(&Value::Integer(3)), Some(&Value::Integer(1))]
    );
    assert_eq!(database.rows("orders").len(), 3);

    fixtures.drop().await?;
    assert!(database.rows("orders").is_empty());
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_finds_and_removes_existing_rows() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    seed_users(&database);
    let mut fixtures = registry(&database);

    let active = Condition::new().eq("active", true);
    let found = fixtures.find_many_existing(&users(), &active).await?;
    assert_eq!(found.len(), 2);

    let first = fixtures.find_one_existing(&users(), &active).await?;
    assert_eq!(first.and_then(|user| user.get("name").cloned()), Some(Value::from("fizz")));

    let removed = fixtures.remove_created(&users(), &active).await?;
    assert_eq!(removed.affected, 2);
    assert_eq!(database.rows("users").len(), 1);

    fixtures.close().await?;
    assert_eq!(database.open_connections(), 0);
    assert!(matches!(
        fixtures.find_many_existing(&users(), &active).await,
        Err(Error::InvalidCallSequence { .. })
    ));
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_reads_ormconfig_from_the_config_dir() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut file = File::create(dir.path().join("ormconfig.yml"))?;
    writeln!(
        file,
        r#"
url: memory://from-file
entities:
  - name: User
    table: users"#
    )?;

    let database = MemoryDatabase::new();
    let connector = MemoryConnector::new(database.clone());
    let config_dir = dir.path().to_path_buf();
    let mut fixtures = MemoryFixtures::new(|cfg| {
        cfg.connector(connector);
        cfg.config_dir(config_dir);
    });
    fixtures.register_generator("users", users(), |_| Ok(vec![record! { "name" => "fizz" }]));

    fixtures.load().await?;
    assert_eq!(database.rows("users").len(), 1);
    fixtures.drop().await?;
    assert!(database.rows("users").is_empty());
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_falls_back_to_the_ambient_connection() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let database = MemoryDatabase::new();
    let ambient = database.clone();
    let config_dir = dir.path().to_path_buf();
    let mut fixtures = MemoryFixtures::new(|cfg| {
        cfg.config_dir(config_dir);
        cfg.ambient(move || {
            let connection: Box<dyn Connection> = Box::new(ambient.connection());
            Some(connection)
        });
    });
    fixtures.register_generator("users", users(), |_| Ok(vec![record! { "name" => "fizz" }]));

    fixtures.load().await?;
    fixtures.drop().await?;
    assert!(database.rows("users").is_empty());
    // the caller still owns the ambient connection
    assert_eq!(database.open_connections(), 1);
    assert!(!database.journal().contains(&Operation::Close));
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_returns_configuration_errors() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config_dir = dir.path().to_path_buf();
    let mut fixtures = MemoryFixtures::new(|cfg| cfg.config_dir(config_dir));
    fixtures.register_generator("users", users(), |_| Ok(vec![]));
    let err = fixtures.load().await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("connection could not be established"));

    let mut fixtures = MemoryFixtures::new(|cfg| cfg.config(ConnectionConfig::new("memory://")));
    assert!(matches!(fixtures.load().await, Err(Error::Configuration(_))));
    Ok(())
}

#[cfg_attr(feature = "runtime-async-std", async_std::test)]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
async fn it_returns_connection_errors() -> anyhow::Result<()> {
    let database = MemoryDatabase::new();
    database.refuse_connections();
    let mut fixtures = registry(&database);
    fixtures.register_generator("users", users(), |_| Ok(vec![]));

    assert!(matches!(fixtures.load().await, Err(Error::Connection { .. })));
    Ok(())
}
