//! Dynamic column values and receiver-type decoding.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use joinery_types::ReceiverType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{JoineryError, Result};

/// A single column value, either raw from a driver or decoded by a receiver type.
///
/// ULIDs, JSON documents and numeric strings are carried as [`Value::Text`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
    Uuid(Uuid),
}

impl Value {
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Uint(u) => i64::try_from(*u).ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Uint(u) => Some(*u as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Identity key for this value, `None` for NULL.
    #[must_use]
    pub fn key(&self) -> Option<KeyValue> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(b) => KeyValue::Bool(*b),
            Value::Int(i) => KeyValue::Int(*i),
            Value::Uint(u) => match i64::try_from(*u) {
                Ok(i) => KeyValue::Int(i),
                Err(_) => KeyValue::Uint(*u),
            },
            Value::Float(f) => KeyValue::Float(f.to_bits()),
            Value::Text(s) => KeyValue::Text(s.clone()),
            Value::Bytes(b) => KeyValue::Bytes(b.clone()),
            Value::Time(t) => KeyValue::Time(t.timestamp_micros()),
            Value::Uuid(u) => KeyValue::Uuid(*u),
        })
    }

    /// Renders the value as JSON, times in RFC 3339.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => (*b).into(),
            Value::Int(i) => (*i).into(),
            Value::Uint(u) => (*u).into(),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => s.clone().into(),
            Value::Bytes(b) => b.clone().into(),
            Value::Time(t) => format_time(t).into(),
            Value::Uuid(u) => u.to_string().into(),
        }
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Time(t) => f.write_str(&format_time(t)),
            Value::Uuid(u) => write!(f, "{u}"),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(value: $ty) -> Self {
                    Value::$variant(value $(as $cast)?)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int,
    u8 => Uint as u64,
    u16 => Uint as u64,
    u32 => Uint as u64,
    u64 => Uint,
    f32 => Float as f64,
    f64 => Float,
    String => Text,
    Vec<u8> => Bytes,
    DateTime<Utc> => Time,
    Uuid => Uuid,
}

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<&[u8]> for Value {
    #[inline]
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    #[inline]
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Hashable projection of a [`Value`] used for object identity.
///
/// Unsigned values that fit in `i64` collapse onto [`KeyValue::Int`] so a key
/// read back from a driver matches the key a record was created with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(u64),
    Text(String),
    Bytes(Vec<u8>),
    Time(i64),
    Uuid(Uuid),
}

/// Canonical text form for stored times: RFC 3339, microseconds, `Z` suffix.
///
/// Fixed width, so lexicographic order matches chronological order.
#[must_use]
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses the time formats drivers hand back as text.
pub fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Coerces a raw driver value into the shape its receiver type promises.
///
/// NULL always decodes to NULL; nullability is enforced by the database.
pub fn decode(receiver: ReceiverType, column: &str, raw: Value) -> Result<Value> {
    let fail = |reason: String| JoineryError::Decode {
        column: column.to_owned(),
        receiver,
        reason,
    };
    if raw.is_null() {
        return Ok(Value::Null);
    }

    match receiver {
        ReceiverType::String => Ok(match raw {
            Value::Text(s) => Value::Text(s),
            Value::Bytes(b) => {
                Value::Text(String::from_utf8(b).map_err(|e| fail(e.to_string()))?)
            }
            Value::Time(t) => Value::Text(format_time(&t)),
            Value::Uuid(u) => Value::Text(u.to_string()),
            other => Value::Text(other.to_string()),
        }),
        ReceiverType::Int8
        | ReceiverType::Int16
        | ReceiverType::Int32
        | ReceiverType::Int64
        | ReceiverType::AutoPrimaryKey => {
            let value = match raw {
                Value::Int(i) => i,
                Value::Uint(u) => i64::try_from(u).map_err(|e| fail(e.to_string()))?,
                Value::Bool(b) => i64::from(b),
                Value::Float(f) if f.fract() == 0.0 => f as i64,
                Value::Text(s) => s.trim().parse().map_err(|_| fail(format!("{s:?} is not an integer")))?,
                other => return Err(fail(format!("unexpected {other}"))),
            };
            let bits = receiver.int_bits().unwrap_or(64);
            if bits < 64 {
                let limit = 1i64 << (bits - 1);
                if value < -limit || value >= limit {
                    return Err(fail(format!("{value} does not fit in {bits} bits")));
                }
            }
            Ok(Value::Int(value))
        }
        ReceiverType::Uint8 | ReceiverType::Uint16 | ReceiverType::Uint32 | ReceiverType::Uint64 => {
            let value = match raw {
                Value::Uint(u) => u,
                Value::Int(i) => u64::try_from(i).map_err(|e| fail(e.to_string()))?,
                Value::Bool(b) => u64::from(b),
                Value::Float(f) if f.fract() == 0.0 && f >= 0.0 => f as u64,
                Value::Text(s) => s.trim().parse().map_err(|_| fail(format!("{s:?} is not an unsigned integer")))?,
                other => return Err(fail(format!("unexpected {other}"))),
            };
            let bits = receiver.int_bits().unwrap_or(64);
            if bits < 64 && value >= (1u64 << bits) {
                return Err(fail(format!("{value} does not fit in {bits} bits")));
            }
            Ok(Value::Uint(value))
        }
        ReceiverType::Float32 | ReceiverType::Float64 => {
            let value = match raw {
                Value::Float(f) => f,
                Value::Int(i) => i as f64,
                Value::Uint(u) => u as f64,
                Value::Text(s) => s.trim().parse().map_err(|_| fail(format!("{s:?} is not a number")))?,
                other => return Err(fail(format!("unexpected {other}"))),
            };
            if receiver == ReceiverType::Float32 {
                Ok(Value::Float(f64::from(value as f32)))
            } else {
                Ok(Value::Float(value))
            }
        }
        ReceiverType::Bool => match raw {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Int(i) => Ok(Value::Bool(i != 0)),
            Value::Uint(u) => Ok(Value::Bool(u != 0)),
            Value::Text(s) => match s.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" => Ok(Value::Bool(true)),
                "0" | "f" | "false" | "n" | "no" => Ok(Value::Bool(false)),
                _ => Err(fail(format!("{s:?} is not a boolean"))),
            },
            other => Err(fail(format!("unexpected {other}"))),
        },
        ReceiverType::Time => match raw {
            Value::Time(t) => Ok(Value::Time(t)),
            Value::Text(s) => parse_time(&s)
                .map(Value::Time)
                .ok_or_else(|| fail(format!("{s:?} is not a timestamp"))),
            Value::Int(secs) => DateTime::from_timestamp(secs, 0)
                .map(Value::Time)
                .ok_or_else(|| fail(format!("{secs} is out of range"))),
            other => Err(fail(format!("unexpected {other}"))),
        },
        ReceiverType::Uuid => match raw {
            Value::Uuid(u) => Ok(Value::Uuid(u)),
            Value::Text(s) => Uuid::parse_str(&s)
                .map(Value::Uuid)
                .map_err(|e| fail(e.to_string())),
            Value::Bytes(b) => Uuid::from_slice(&b)
                .map(Value::Uuid)
                .map_err(|e| fail(e.to_string())),
            other => Err(fail(format!("unexpected {other}"))),
        },
        ReceiverType::Ulid => match raw {
            Value::Text(s) if is_ulid(&s) => Ok(Value::Text(s.to_ascii_uppercase())),
            Value::Bytes(b) if b.len() == 16 => {
                let mut buf = [0u8; 16];
                buf.copy_from_slice(&b);
                Ok(Value::Text(encode_ulid(u128::from_be_bytes(buf))))
            }
            other => Err(fail(format!("{other} is not a ULID"))),
        },
        ReceiverType::Bytes => match raw {
            Value::Bytes(b) => Ok(Value::Bytes(b)),
            Value::Text(s) => Ok(Value::Bytes(s.into_bytes())),
            other => Err(fail(format!("unexpected {other}"))),
        },
    }
}

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Generates a new ULID: 48 bits of millisecond time, 80 random bits.
#[must_use]
pub fn new_ulid() -> String {
    let millis = u128::from(Utc::now().timestamp_millis().max(0) as u64) & ((1 << 48) - 1);
    let random = rand::random::<u128>() & ((1 << 80) - 1);
    encode_ulid((millis << 80) | random)
}

fn encode_ulid(value: u128) -> String {
    (0..26)
        .rev()
        .map(|i| CROCKFORD[((value >> (i * 5)) & 0x1f) as usize] as char)
        .collect()
}

fn is_ulid(text: &str) -> bool {
    text.len() == 26
        && text.as_bytes()[0] <= b'7'
        && text
            .bytes()
            .all(|b| CROCKFORD.contains(&b.to_ascii_uppercase()))
}
