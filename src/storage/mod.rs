pub mod database;

pub use database::{OrderStatistics, OrderStore, SqliteStore};
