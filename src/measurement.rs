use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::SystemTime};

/// The value of a single field.
///
/// Each variant maps to one of the line-protocol field types.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    UInteger(u64),
    Float(f64),
    String(String),
}

macro_rules! field_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

field_value_from! {
    bool => Boolean,
    i8 => Integer,
    i16 => Integer,
    i32 => Integer,
    i64 => Integer,
    u8 => UInteger,
    u16 => UInteger,
    u32 => UInteger,
    u64 => UInteger,
    f32 => Float,
    f64 => Float,
    String => String,
    &str => String,
}

/// One metric observation: a measurement name, a tag set, a field set and an
/// optional timestamp.
///
/// Tags and fields are kept sorted by key so a measurement always encodes to
/// the same line.
///
/// ```rust
/// use influx_line_client::Measurement;
/// let m = Measurement::new("cpu")
///     .tag("host", "server01")
///     .field("usage_idle", 92.5)
///     .field("processes", 312)
///     .timestamp(1_700_000_000_000_000_000);
/// assert_eq!(m.name(), "cpu");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    name: String,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
}

impl Measurement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Adds a tag, replacing any previous value for the same key.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds a field, replacing any previous value for the same key.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets the timestamp. It is interpreted in the precision the client was
    /// configured with, nanoseconds unless stated otherwise.
    #[must_use]
    pub const fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Stamps the measurement with the current wall clock in nanoseconds.
    #[must_use]
    pub fn timestamp_now(self) -> Self {
        let nanos = match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
            Ok(since) => i64::try_from(since.as_nanos()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_nanos()).map_or(i64::MIN, |n| -n),
        };
        self.timestamp(nanos)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub const fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub const fn get_timestamp(&self) -> Option<i64> {
        self.timestamp
    }
}
