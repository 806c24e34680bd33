//! Wire shapes for records and the REST envelope types around them.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One field value of a record.
///
/// Values stay as the provider typed them instead of flattening to strings.
/// Compound fields (addresses, lookups with nested attributes) arrive as
/// [`FieldValue::Object`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// JSON boolean.
    Boolean(bool),
    /// JSON number. Integers are carried as `f64` like the wire does.
    Number(f64),
    /// JSON string, including dates and datetimes as the provider sends
    /// them.
    Text(String),
    /// JSON array.
    Array(Vec<FieldValue>),
    /// JSON object, such as a compound address field.
    Object(HashMap<String, FieldValue>),
    /// JSON null. Kept last so untagged decoding tries the typed variants
    /// first.
    Null,
}

impl FieldValue {
    /// The value as text, when it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// The value as a number, when it is one.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as a boolean, when it is one.
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether the provider sent an explicit null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Boolean(value),
            serde_json::Value::Number(value) => {
                Self::Number(value.as_f64().unwrap_or_default())
            }
            serde_json::Value::String(value) => Self::Text(value),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(entries) => Self::Object(
                entries
                    .into_iter()
                    .map(|(name, value)| (name, value.into()))
                    .collect(),
            ),
        }
    }
}

/// A generic record, when no concrete type is worth defining.
///
/// The wire shape puts record metadata under an `attributes` object and
/// every field beside it; decoding lifts `attributes` out so `fields` holds
/// only the record's own data.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The object type from `attributes.type`, such as `Account`.
    pub object_type: Option<String>,

    /// The record's server-relative URL from `attributes.url`.
    pub url: Option<String>,

    /// Field name to value, `attributes` excluded.
    pub fields: HashMap<String, FieldValue>,
}

impl Record {
    /// The raw value of `name`, if present.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// The text value of `name`.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(FieldValue::as_text)
    }

    /// The numeric value of `name`.
    #[must_use]
    pub fn double(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(FieldValue::as_number)
    }

    /// The numeric value of `name`, truncated to an integer.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.double(name).filter(|n| n.is_finite()).map(|n| n as i64)
    }

    /// The boolean value of `name`.
    #[must_use]
    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(FieldValue::as_boolean)
    }

    /// The value of `name` parsed as a provider date or datetime.
    #[must_use]
    pub fn date(&self, name: &str) -> Option<DateTime<Utc>> {
        self.string(name).and_then(parse_salesforce_datetime)
    }

    /// The record id, when the query selected `Id`.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.string("Id")
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut entries = serde_json::Map::deserialize(deserializer)?;
        let (object_type, url) = match entries.remove("attributes") {
            Some(serde_json::Value::Object(attributes)) => (
                attributes
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string),
                attributes
                    .get("url")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string),
            ),
            _ => (None, None),
        };
        let fields = entries
            .into_iter()
            .map(|(name, value)| (name, FieldValue::from(value)))
            .collect();
        Ok(Self { object_type, url, fields })
    }
}

/// Parse the datetime formats the provider uses.
///
/// Datetimes come as RFC 3339 or with a colon-less offset
/// (`2015-08-21T10:00:00.000+0000`); date fields come bare (`2015-08-21`)
/// and map to midnight UTC.
#[must_use]
pub fn parse_salesforce_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.3f%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Envelope of a SOQL query answer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult<T = Record> {
    /// Total matching records, beyond this batch.
    pub total_size: u32,

    /// Whether this batch completes the result set.
    pub done: bool,

    /// Server-relative URL of the next batch, when `done` is false.
    #[serde(default)]
    pub next_records_url: Option<String>,

    /// This batch's records.
    pub records: Vec<T>,
}

/// Envelope of a SOSL search answer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult<T = Record> {
    /// The matching records across objects.
    pub search_records: Vec<T>,
}

/// The authenticated user, from the identity URL.
#[derive(Debug, Clone, Deserialize)]
pub struct Identity {
    /// 18-character user id.
    pub user_id: String,

    /// 18-character organization id.
    #[serde(rename = "organization_id")]
    pub org_id: String,

    /// Login username.
    pub username: String,

    /// Display name, when set.
    #[serde(default)]
    pub display_name: Option<String>,

    /// Profile photo URLs, when set.
    #[serde(default)]
    pub photos: Option<Photos>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub locale: Option<String>,
}

/// Profile photo URLs of an identity.
#[derive(Debug, Clone, Deserialize)]
pub struct Photos {
    #[serde(default)]
    pub picture: Option<String>,

    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// One org limit, keyed by limit name in the limits answer.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Limit {
    /// The allowance.
    #[serde(rename = "Max")]
    pub max: i64,

    /// What is left of the allowance.
    #[serde(rename = "Remaining")]
    pub remaining: i64,
}

/// Answer of a record insert.
#[derive(Debug, Clone, Deserialize)]
pub struct InsertResult {
    /// Id of the created record.
    pub id: String,

    /// Whether the insert went through.
    pub success: bool,

    /// Provider errors, normally empty on success.
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}
