//! Named test fixtures on top of an ORM-style store.
//!
//! Register groups of rows to find or create, `load` them before a test and
//! `drop` them afterwards:
//!
//! ```no_run
//! use ormfixtures::{record, relation, Condition, ConnectionConfig, EntityType, MySqlFixtures};
//!
//! # async fn run() -> ormfixtures::Result<()> {
//! let users = EntityType::new("User", "users");
//! let orders = EntityType::new("Order", "orders");
//!
//! let mut fixtures = MySqlFixtures::new(|cfg| {
//!     cfg.config(
//!         ConnectionConfig::new("mysql://root@localhost/test")
//!             .entity(users.clone())
//!             .entity(orders.clone()),
//!     );
//! });
//! fixtures
//!     .register_find("users", users, Condition::new().eq("active", true))
//!     .register_generator("orders", orders, |loaded| {
//!         let user = relation::one(loaded, "users", &record! { "active" => true })?;
//!         Ok(vec![record! { "user_id" => user.get("id") }])
//!     });
//!
//! let loaded = fixtures.load().await?;
//! assert_eq!(loaded["orders"].len(), 1);
//! fixtures.drop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod creator;
pub mod error;
pub mod fixture;
pub mod memory;
pub mod mysql;
pub mod registry;
pub mod relation;
pub mod store;
pub mod value;

// reexport key APIs
pub use config::ConnectionConfig;
pub use creator::{Drafts, FixtureCreator};
pub use error::{Error, Phase, Result};
pub use fixture::{FindSpec, FixtureSpec, LoadedFixtures};
pub use memory::{MemoryConnector, MemoryDatabase};
pub use mysql::{MySqlConnector, MySqlFixtures};
pub use registry::{FixtureRegistry, MemoryFixtures};
pub use store::{Condition, Connection, Connector, DeleteResult, EntityType, Repository};
pub use value::{Record, Value};
