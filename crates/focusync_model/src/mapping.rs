//! Field-by-field mapping between typed records and untyped remote rows.
//!
//! The transport layer speaks JSON objects. Every record type converts to
//! and from a [`RemoteRow`] explicitly, so a malformed payload is rejected
//! at the boundary instead of leaking into the engine.

use crate::ids::{OwnerId, RecordId};
use crate::kind::EntityKind;
use serde_json::Value;
use thiserror::Error;

/// An untyped row as exchanged with the remote store.
pub type RemoteRow = serde_json::Map<String, Value>;

/// Result type for row mapping.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors raised while converting a remote row into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// A required column is absent.
    #[error("{kind}: missing field `{field}`")]
    MissingField {
        /// Collection being decoded.
        kind: EntityKind,
        /// Column name.
        field: &'static str,
    },

    /// A column has the wrong type or an out-of-range value.
    #[error("{kind}: invalid field `{field}`: {reason}")]
    InvalidField {
        /// Collection being decoded.
        kind: EntityKind,
        /// Column name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Conversion between a record and its remote row representation.
pub trait RemoteMapping: Sized {
    /// Encodes the record as a row.
    fn to_row(&self) -> RemoteRow;

    /// Decodes and validates a row.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or malformed.
    fn from_row(row: &RemoteRow) -> MappingResult<Self>;
}

/// Typed accessors over a [`RemoteRow`].
pub struct RowReader<'a> {
    kind: EntityKind,
    row: &'a RemoteRow,
}

impl<'a> RowReader<'a> {
    /// Creates a reader for a row of the given collection.
    pub fn new(kind: EntityKind, row: &'a RemoteRow) -> Self {
        Self { kind, row }
    }

    fn invalid(&self, field: &'static str, reason: impl Into<String>) -> MappingError {
        MappingError::InvalidField {
            kind: self.kind,
            field,
            reason: reason.into(),
        }
    }

    /// Returns the raw value, treating JSON `null` as absent.
    fn present(&self, field: &'static str) -> Option<&'a Value> {
        self.row.get(field).filter(|v| !v.is_null())
    }

    fn required(&self, field: &'static str) -> MappingResult<&'a Value> {
        self.present(field).ok_or(MappingError::MissingField {
            kind: self.kind,
            field,
        })
    }

    /// Reads a required string column.
    pub fn string(&self, field: &'static str) -> MappingResult<String> {
        self.required(field)?
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| self.invalid(field, "expected string"))
    }

    /// Reads an optional string column.
    pub fn opt_string(&self, field: &'static str) -> MappingResult<Option<String>> {
        match self.present(field) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(|s| Some(s.to_owned()))
                .ok_or_else(|| self.invalid(field, "expected string")),
        }
    }

    /// Reads the required `id` column.
    pub fn record_id(&self) -> MappingResult<RecordId> {
        let id = self.string("id")?;
        if id.is_empty() {
            return Err(self.invalid("id", "must not be empty"));
        }
        Ok(RecordId::new(id))
    }

    /// Reads the optional `owner_id` column.
    pub fn owner_id(&self) -> MappingResult<Option<OwnerId>> {
        Ok(self.opt_string("owner_id")?.map(OwnerId::new))
    }

    /// Reads a required signed integer column.
    pub fn i64(&self, field: &'static str) -> MappingResult<i64> {
        self.required(field)?
            .as_i64()
            .ok_or_else(|| self.invalid(field, "expected integer"))
    }

    /// Reads a required unsigned integer constrained to `min..=max`.
    pub fn u32_in(&self, field: &'static str, min: u32, max: u32) -> MappingResult<u32> {
        let raw = self
            .required(field)?
            .as_u64()
            .ok_or_else(|| self.invalid(field, "expected non-negative integer"))?;
        match u32::try_from(raw) {
            Ok(v) if (min..=max).contains(&v) => Ok(v),
            _ => Err(self.invalid(field, format!("{raw} outside {min}..={max}"))),
        }
    }

    /// Reads a required boolean column.
    pub fn bool(&self, field: &'static str) -> MappingResult<bool> {
        self.required(field)?
            .as_bool()
            .ok_or_else(|| self.invalid(field, "expected boolean"))
    }

    /// Reads a boolean column, falling back to `default` when absent.
    pub fn bool_or(&self, field: &'static str, default: bool) -> MappingResult<bool> {
        match self.present(field) {
            None => Ok(default),
            Some(_) => self.bool(field),
        }
    }
}

/// Inserts an optional string column, writing JSON `null` for `None`.
pub(crate) fn put_opt(row: &mut RemoteRow, field: &str, value: Option<&str>) {
    let value = value.map_or(Value::Null, Value::from);
    row.insert(field.to_owned(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RemoteRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn missing_and_null_are_absent() {
        let r = row(json!({ "id": "a", "label": null }));
        let reader = RowReader::new(EntityKind::Sessions, &r);
        assert_eq!(reader.opt_string("label").unwrap(), None);
        assert_eq!(reader.opt_string("other").unwrap(), None);
        assert!(matches!(
            reader.string("label"),
            Err(MappingError::MissingField { field: "label", .. })
        ));
    }

    #[test]
    fn wrong_types_are_rejected() {
        let r = row(json!({ "id": 7, "n": "x", "flag": 1 }));
        let reader = RowReader::new(EntityKind::Presets, &r);
        assert!(matches!(reader.record_id(), Err(MappingError::InvalidField { field: "id", .. })));
        assert!(reader.i64("n").is_err());
        assert!(reader.bool("flag").is_err());
    }

    #[test]
    fn ranges_are_enforced() {
        let r = row(json!({ "minutes": 0, "big": 5_000_000_000u64, "ok": 25 }));
        let reader = RowReader::new(EntityKind::Presets, &r);
        assert!(reader.u32_in("minutes", 1, 600).is_err());
        assert!(reader.u32_in("big", 0, u32::MAX).is_err());
        assert_eq!(reader.u32_in("ok", 1, 600).unwrap(), 25);
    }

    #[test]
    fn error_mentions_collection_and_field() {
        let err = MappingError::MissingField {
            kind: EntityKind::Settings,
            field: "theme",
        };
        assert_eq!(err.to_string(), "settings: missing field `theme`");
    }
}
