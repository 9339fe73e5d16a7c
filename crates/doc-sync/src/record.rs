//! Record: a single addressable document with sync metadata.
//!
//! Every record carries three reserved fields alongside user data:
//! - `_id`: the document identifier (always present)
//! - `_modified`: last-modified time in milliseconds since epoch
//! - `_deleted`: soft-delete tombstone flag
//!
//! Records serialize as a flat JSON object, exactly the shape stored in the
//! document collection.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier field, populated from the document id on every read.
pub const ID_FIELD: &str = "_id";
/// Last-modified timestamp field.
pub const MODIFIED_FIELD: &str = "_modified";
/// Soft-delete flag field.
pub const DELETED_FIELD: &str = "_deleted";

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Field name to value mapping.
pub type Fields = Map<String, Value>;

/// A document from a collection, with its identifier resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Fields", try_from = "Fields")]
pub struct Record {
    id: String,
    fields: Fields,
}

impl Record {
    /// Build a record for `id`. The `_id` field is overwritten with `id`.
    pub fn new(id: impl Into<String>, mut fields: Fields) -> Self {
        let id = id.into();
        fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        Self { id, fields }
    }

    /// Build a tombstone: only `_modified` and `_deleted` survive.
    pub fn tombstone(id: impl Into<String>, modified: Timestamp) -> Self {
        Self::new(id, tombstone_fields(modified))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Last-modified time, if the record has been stamped.
    pub fn modified(&self) -> Option<Timestamp> {
        self.fields.get(MODIFIED_FIELD).and_then(Value::as_i64)
    }

    /// Whether this record is a soft-delete tombstone.
    pub fn is_deleted(&self) -> bool {
        self.fields
            .get(DELETED_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Decode the record into a typed model.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }

    /// Ordering key used by collection caches: oldest first, ties by id.
    ///
    /// Unstamped records sort before every stamped one.
    pub(crate) fn order_key(&self) -> (Timestamp, &str) {
        (self.modified().unwrap_or(Timestamp::MIN), self.id.as_str())
    }
}

impl From<Record> for Fields {
    fn from(record: Record) -> Self {
        record.fields
    }
}

impl TryFrom<Fields> for Record {
    type Error = String;

    fn try_from(fields: Fields) -> Result<Self, Self::Error> {
        let id = fields
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("record is missing a string `{ID_FIELD}` field"))?
            .to_string();
        Ok(Self { id, fields })
    }
}

/// Fields written when soft-deleting a document.
pub fn tombstone_fields(modified: Timestamp) -> Fields {
    let mut fields = Fields::new();
    fields.insert(MODIFIED_FIELD.to_string(), Value::from(modified));
    fields.insert(DELETED_FIELD.to_string(), Value::Bool(true));
    fields
}

/// Convert any serializable value into a field map.
///
/// Fails unless the value serializes to a JSON object.
pub fn to_fields<T: Serialize>(value: &T) -> serde_json::Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(serde::ser::Error::custom(format!(
            "expected a JSON object, got `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_new_populates_id_field() {
        let record = Record::new("abc", fields(json!({"_id": "stale", "title": "x"})));
        assert_eq!(record.id(), "abc");
        assert_eq!(record.get(ID_FIELD), Some(&json!("abc")));
    }

    #[test]
    fn test_tombstone_clears_fields() {
        let record = Record::tombstone("abc", 42);
        assert!(record.is_deleted());
        assert_eq!(record.modified(), Some(42));
        assert_eq!(record.fields().len(), 3);
        assert!(record.get("title").is_none());
    }

    #[test]
    fn test_serializes_flat() {
        let record = Record::new("abc", fields(json!({"_modified": 5, "title": "Hi"})));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, json!({"_id": "abc", "_modified": 5, "title": "Hi"}));

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_deserialize_requires_id() {
        let result: Result<Record, _> = serde_json::from_value(json!({"title": "Hi"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_unstamped_records_sort_first() {
        let stamped = Record::new("a", fields(json!({"_modified": 1})));
        let unstamped = Record::new("b", Fields::new());
        assert!(unstamped.order_key() < stamped.order_key());
    }

    #[test]
    fn test_to_fields_rejects_non_objects() {
        assert!(to_fields(&"plain string").is_err());
        assert_eq!(to_fields(&json!({"a": 1})).unwrap().len(), 1);
    }
}
