//! Shared type definitions for joinery
//!
//! The vocabulary every joinery crate shares:
//!
//! - [`Dialect`] - Database dialect enum (SQLite, PostgreSQL, MySQL)
//! - [`ReceiverType`] - the Rust-side type a column's raw driver value decodes into
//! - [`SchemaType`] - the semantic role of a column (plain, enum, lock, ...)
//!
//! # Features
//!
//! - `serde` - Enable serde serialization/deserialization

mod dialect;
mod receiver;

pub use dialect::{Dialect, DialectParseError};
pub use receiver::{ReceiverType, SchemaType};

