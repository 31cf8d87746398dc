//! **MySQL** store built on sqlx.

mod helper;
mod store;

pub use store::{MySqlConnector, MySqlFixtures, MySqlRepository, MySqlStore};
