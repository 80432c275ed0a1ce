//! Connection backends for the [`Connection`](crate::interface::Connection) trait.

pub mod config;
pub mod memory;
pub mod postgres;

pub use config::ConnectionConfig;
pub use memory::{MemoryConnection, MemoryDatabase};
pub use postgres::PgConnection;
