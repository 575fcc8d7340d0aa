//! Connection-resilient database gateway
//!
//! Owns a single shared connection handle, translates positional `?`
//! placeholders into PostgreSQL's `$n` syntax, classifies failures into
//! structured error kinds and transparently reconnects-and-retries a
//! connection-class failure exactly once.

pub mod driver;
pub mod error;
pub mod gateway;
pub mod value;

pub use driver::{Driver, DriverConnection, PgDriver};
pub use error::{DbError, DbErrorKind};
pub use gateway::DbGateway;
pub use value::{Row, SqlValue};
