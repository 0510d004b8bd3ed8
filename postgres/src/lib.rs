//! PostgreSQL support for joinery.
//!
//! [`PostgresDialect`] renders queries with numbered placeholders and
//! `RETURNING`; with the `postgres-sync` feature [`PostgresDriver`] runs
//! them over a blocking [`postgres`] client.

mod dialect;

#[cfg(feature = "postgres-sync")]
mod client;

pub use dialect::PostgresDialect;

#[cfg(feature = "postgres-sync")]
pub use client::PostgresDriver;
