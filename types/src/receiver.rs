//! Column receiver and schema types.

/// The type a column's raw driver value is decoded into.
///
/// Drivers hand back whatever their wire format produces (SQLite has five
/// storage classes, PostgreSQL has its own OIDs); the receiver type is what
/// the cursor coerces that raw value into before anything else sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ReceiverType {
    #[default]
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Time,
    Float32,
    Float64,
    Bool,
    Uuid,
    Ulid,
    Bytes,
    /// Database-assigned integer primary key.
    AutoPrimaryKey,
}

impl ReceiverType {
    /// Bit width of integer receivers, `None` for everything else.
    #[must_use]
    pub const fn int_bits(&self) -> Option<u32> {
        match self {
            Self::Int8 | Self::Uint8 => Some(8),
            Self::Int16 | Self::Uint16 => Some(16),
            Self::Int32 | Self::Uint32 => Some(32),
            Self::Int64 | Self::Uint64 | Self::AutoPrimaryKey => Some(64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Time => "time",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Uuid => "uuid",
            Self::Ulid => "ulid",
            Self::Bytes => "bytes",
            Self::AutoPrimaryKey => "auto_primary_key",
        }
    }
}

impl core::fmt::Display for ReceiverType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic role of a column, independent of how it is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SchemaType {
    /// Ordinary data column.
    #[default]
    Column,
    /// Integer key into an enum (type) table.
    Enum,
    /// Optimistic-lock version column.
    Lock,
    /// Arbitrary-precision number carried as a string.
    NumericString,
    /// JSON document stored as text.
    Json,
}

impl SchemaType {
    #[inline]
    #[must_use]
    pub const fn is_lock(&self) -> bool {
        matches!(self, Self::Lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_widths() {
        assert_eq!(ReceiverType::Int8.int_bits(), Some(8));
        assert_eq!(ReceiverType::Uint32.int_bits(), Some(32));
        assert_eq!(ReceiverType::AutoPrimaryKey.int_bits(), Some(64));
        assert_eq!(ReceiverType::Float64.int_bits(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_names() {
        let json = serde_json::to_string(&ReceiverType::AutoPrimaryKey).unwrap();
        assert_eq!(json, "\"auto_primary_key\"");
        let back: SchemaType = serde_json::from_str("\"numeric_string\"").unwrap();
        assert_eq!(back, SchemaType::NumericString);
    }
}
