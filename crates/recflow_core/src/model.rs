//! Remote resource types.
//!
//! These are thin stand-ins for the remote service's own types. The stream
//! layer never looks inside them beyond the [`Resource`] key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use uuid::Uuid;

/// Something stored remotely and addressed by a key.
pub trait Resource: Clone + Send + Sync + 'static {
    /// Key type.
    type Id: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Returns the key.
    fn id(&self) -> &Self::Id;
}

/// Identifier of a record zone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneId(String);

impl ZoneId {
    /// Name of the zone every database starts with.
    pub const DEFAULT_NAME: &'static str = "_defaultZone";

    /// Creates a zone id.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the zone name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a record.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a new random record id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a record id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the UUID.
    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A remote record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record id.
    pub id: RecordId,
    /// Record type, used by queries.
    pub record_type: String,
    /// Zone the record lives in.
    pub zone: ZoneId,
    /// Field values.
    pub fields: BTreeMap<String, String>,
}

impl Record {
    /// Creates an empty record of the given type in the default zone.
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            record_type: record_type.into(),
            zone: ZoneId::default(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Moves the record to another zone.
    pub fn in_zone(mut self, zone: ZoneId) -> Self {
        self.zone = zone;
        self
    }

    /// Returns a field value.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl Resource for Record {
    type Id = RecordId;

    fn id(&self) -> &RecordId {
        &self.id
    }
}

/// A remote record zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Zone id.
    pub id: ZoneId,
}

impl Zone {
    /// Creates a zone.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ZoneId::new(name),
        }
    }
}

impl Resource for Zone {
    type Id = ZoneId;

    fn id(&self) -> &ZoneId {
        &self.id
    }
}

/// A record query, forwarded to the remote service untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Record type to match.
    pub record_type: String,
    /// Zone to search, or every zone when `None`.
    pub zone: Option<ZoneId>,
}

impl Query {
    /// Creates a query matching every record of a type.
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            zone: None,
        }
    }

    /// Restricts the query to one zone.
    pub fn in_zone(mut self, zone: ZoneId) -> Self {
        self.zone = Some(zone);
        self
    }

    /// Returns true if the record satisfies the query.
    pub fn matches(&self, record: &Record) -> bool {
        record.record_type == self.record_type
            && self.zone.as_ref().is_none_or(|zone| *zone == record.zone)
    }
}

/// Opaque continuation token returned by a page operation.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(Vec<u8>);

impl Cursor {
    /// Creates a cursor from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_unique() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn record_builder() {
        let zone = ZoneId::new("notes");
        let record = Record::new("Note")
            .with_field("title", "groceries")
            .in_zone(zone.clone());

        assert_eq!(record.field("title"), Some("groceries"));
        assert_eq!(record.field("body"), None);
        assert_eq!(record.zone, zone);
        assert_eq!(record.id(), &record.id);
    }

    #[test]
    fn query_matching() {
        let notes = ZoneId::new("notes");
        let note = Record::new("Note").in_zone(notes.clone());
        let task = Record::new("Task");

        assert!(Query::new("Note").matches(&note));
        assert!(!Query::new("Note").matches(&task));
        assert!(Query::new("Note").in_zone(notes).matches(&note));
        assert!(!Query::new("Note").in_zone(ZoneId::default()).matches(&note));
    }

    #[test]
    fn cursor_debug_is_hex() {
        let cursor = Cursor::from_bytes(vec![0x00, 0xab]);
        assert_eq!(format!("{cursor:?}"), "Cursor(00ab)");
        assert_eq!(cursor.as_bytes(), &[0x00, 0xab]);
    }
}
