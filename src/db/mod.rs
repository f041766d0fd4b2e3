//! Database layer - target table resolution, value binding and the PostgreSQL sink

pub mod loader;
pub mod postgres;
pub mod schema;
pub mod target;
pub mod values;

pub use loader::{BatchSink, Loader};
pub use postgres::PgSink;
pub use target::DatabaseTarget;
