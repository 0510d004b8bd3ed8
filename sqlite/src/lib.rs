//! SQLite support for joinery.
//!
//! [`SqliteDialect`] renders queries for SQLite; with the `rusqlite` feature
//! [`SqliteDriver`] runs them.

mod dialect;

#[cfg(feature = "rusqlite")]
mod connection;

pub use dialect::SqliteDialect;

#[cfg(feature = "rusqlite")]
pub use connection::SqliteDriver;
