use thiserror::Error;

use crate::value::Value;

/// Boxed driver error carried as the source of a classified error.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum JoineryError {
    /// A versioned update or delete matched no row: the record was changed
    /// or removed since it was loaded.
    #[error("optimistic lock conflict on {table} (key {key})")]
    OptimisticLock { table: String, key: String },

    /// A unique or primary-key constraint rejected the write
    #[error("unique constraint violated on {table}")]
    UniqueValue {
        table: String,
        #[source]
        source: Option<BoxedError>,
    },

    /// An expected row is absent
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Anything the driver reported that is not otherwise classified
    #[error("{operation} failed: {source} (sql: {sql})")]
    Query {
        operation: &'static str,
        sql: String,
        args: Vec<Value>,
        #[source]
        source: BoxedError,
    },

    /// Malformed query construction, caught before any SQL is generated
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Inconsistent schema metadata
    #[error("schema error: {0}")]
    Schema(String),

    /// A raw driver value could not be coerced into the column's receiver type
    #[error("cannot decode column {column} as {receiver}: {reason}")]
    Decode {
        column: String,
        receiver: joinery_types::ReceiverType,
        reason: String,
    },

    /// Misuse of a record (unknown column, changing a saved key, ...)
    #[error("record error: {0}")]
    Record(String),

    /// Error with transaction
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Node or query (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Opening a connection failed
    #[error("connection error: {0}")]
    Connection(String),

    /// An operation failed and the cleanup that followed it failed too
    #[error("{primary} (additionally: {secondary})")]
    Aggregate {
        primary: Box<JoineryError>,
        secondary: Box<JoineryError>,
    },
}

impl JoineryError {
    /// Wraps a driver error with the statement that produced it.
    pub fn query(
        operation: &'static str,
        sql: impl Into<String>,
        args: &[Value],
        source: impl Into<BoxedError>,
    ) -> Self {
        Self::Query {
            operation,
            sql: sql.into(),
            args: args.to_vec(),
            source: source.into(),
        }
    }

    /// Combines a primary failure with a failure from the cleanup that ran after it.
    ///
    /// Either side may be absent; both present yields [`JoineryError::Aggregate`].
    pub fn aggregate(primary: Result<()>, secondary: Result<()>) -> Result<()> {
        match primary {
            Ok(()) => secondary,
            Err(e) => Err(e.with_cleanup(secondary)),
        }
    }

    /// Attaches the outcome of a cleanup step that ran after this error.
    #[must_use]
    pub fn with_cleanup(self, cleanup: Result<()>) -> Self {
        match cleanup {
            Ok(()) => self,
            Err(secondary) => Self::Aggregate {
                primary: Box::new(self),
                secondary: Box::new(secondary),
            },
        }
    }

    #[must_use]
    pub fn is_optimistic_lock(&self) -> bool {
        match self {
            Self::OptimisticLock { .. } => true,
            Self::Aggregate { primary, .. } => primary.is_optimistic_lock(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::UniqueValue { .. } => true,
            Self::Aggregate { primary, .. } => primary.is_unique_violation(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::RecordNotFound(_) => true,
            Self::Aggregate { primary, .. } => primary.is_not_found(),
            _ => false,
        }
    }
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, JoineryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_keeps_both_errors() {
        let err = JoineryError::aggregate(
            Err(JoineryError::RecordNotFound("users".into())),
            Err(JoineryError::Transaction("close failed".into())),
        )
        .unwrap_err();
        assert!(err.is_not_found());
        let text = err.to_string();
        assert!(text.contains("users"));
        assert!(text.contains("close failed"));
    }

    #[test]
    fn aggregate_passes_single_error_through() {
        let err = JoineryError::aggregate(Ok(()), Err(JoineryError::Record("x".into())))
            .unwrap_err();
        assert!(matches!(err, JoineryError::Record(_)));
        assert!(JoineryError::aggregate(Ok(()), Ok(())).is_ok());
    }

    #[test]
    fn query_error_carries_context() {
        let err = JoineryError::query(
            "load",
            "SELECT 1",
            &[Value::Int(7)],
            "boom",
        );
        match err {
            JoineryError::Query { operation, sql, args, .. } => {
                assert_eq!(operation, "load");
                assert_eq!(sql, "SELECT 1");
                assert_eq!(args, vec![Value::Int(7)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
