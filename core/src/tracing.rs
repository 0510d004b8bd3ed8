//! Tracing utilities for query, transaction and locking observability.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site. The feature is checked in the calling crate, so every
//! crate that uses them declares its own `tracing` feature.

/// Emit a debug-level tracing event with the SQL text and parameter count.
///
/// ```ignore
/// joinery_trace_query!(&statement.sql, statement.args.len());
/// ```
#[macro_export]
macro_rules! joinery_trace_query {
    ($sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(sql = %$sql, params = $param_count, "joinery.query");
    };
}

/// Emit an info-level tracing event for transaction lifecycle (begin, commit, rollback).
///
/// ```ignore
/// joinery_trace_tx!("begin", "sqlite.rusqlite");
/// joinery_trace_tx!("commit", "postgres.sync");
/// ```
#[macro_export]
macro_rules! joinery_trace_tx {
    ($event:literal, $driver:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::info!(event = $event, driver = %$driver, "joinery.transaction");
    };
}

/// Emit a debug-level event when a versioned write loses an optimistic-lock race.
#[macro_export]
macro_rules! joinery_trace_conflict {
    ($table:expr, $key:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(table = %$table, key = %$key, "joinery.lock_conflict");
    };
}
