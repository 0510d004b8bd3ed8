//! Backend identification.
//!
//! Rendering differences live in the per-dialect strategy objects
//! (`joinery-sqlite`, `joinery-postgres`, `joinery-mysql`); this enum only
//! names them, for configuration and for placeholder style.

/// Which SQL backend a statement is rendered for.
///
/// ```
/// use joinery_types::Dialect;
///
/// assert!(Dialect::PostgreSQL.uses_numbered_placeholders());
/// assert_eq!("pg".parse::<Dialect>(), Ok(Dialect::PostgreSQL));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Dialect {
    #[default]
    SQLite,
    #[cfg_attr(feature = "serde", serde(alias = "postgres"))]
    PostgreSQL,
    MySQL,
}

impl Dialect {
    /// `$1, $2, ...` rather than `?`
    #[inline]
    #[must_use]
    pub const fn uses_numbered_placeholders(&self) -> bool {
        matches!(self, Self::PostgreSQL)
    }

    /// Case-insensitive name lookup; accepts `sqlite3`, `postgres`, `pg`
    /// and `mariadb` as aliases.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::SQLite),
            "postgresql" | "postgres" | "pg" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SQLite => "sqlite",
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
        }
    }
}

impl core::fmt::Display for Dialect {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Dialect {
    type Err = DialectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| DialectParseError(s.to_owned()))
    }
}

/// A name [`Dialect::parse`] does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectParseError(pub String);

impl core::fmt::Display for DialectParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown dialect {:?}", self.0)
    }
}

impl std::error::Error for DialectParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases() {
        for (name, dialect) in [
            ("SQLite3", Dialect::SQLite),
            ("postgres", Dialect::PostgreSQL),
            ("PG", Dialect::PostgreSQL),
            ("MariaDB", Dialect::MySQL),
        ] {
            assert_eq!(Dialect::parse(name), Some(dialect), "{name}");
        }
        assert_eq!(Dialect::parse(""), None);
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for dialect in [Dialect::SQLite, Dialect::PostgreSQL, Dialect::MySQL] {
            assert_eq!(dialect.to_string().parse::<Dialect>(), Ok(dialect));
        }
        let err = "oracle".parse::<Dialect>().unwrap_err();
        assert_eq!(err.to_string(), "unknown dialect \"oracle\"");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_accepts_postgres_alias() {
        let dialect: Dialect = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(dialect, Dialect::PostgreSQL);
        assert_eq!(serde_json::to_string(&Dialect::MySQL).unwrap(), "\"mysql\"");
    }
}
