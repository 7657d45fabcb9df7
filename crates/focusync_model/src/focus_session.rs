//! Historical focus sessions.

use crate::ids::{OwnerId, RecordId};
use crate::kind::EntityKind;
use crate::mapping::{put_opt, MappingResult, RemoteMapping, RemoteRow, RowReader};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One completed or abandoned focus block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSession {
    /// Record ID.
    pub id: RecordId,
    /// Owning account, `None` for guest data.
    pub owner_id: Option<OwnerId>,
    /// Preset the session was started from, if any.
    pub preset_id: Option<RecordId>,
    /// Free-form label.
    pub label: Option<String>,
    /// Start time (unix millis).
    pub started_at_ms: i64,
    /// Focused time actually spent.
    pub duration_seconds: u32,
    /// Whether the timer ran to completion.
    pub completed: bool,
}

impl FocusSession {
    /// Creates a completed guest session.
    pub fn new(started_at_ms: i64, duration_seconds: u32) -> Self {
        Self {
            id: RecordId::generate(),
            owner_id: None,
            preset_id: None,
            label: None,
            started_at_ms,
            duration_seconds,
            completed: true,
        }
    }

    /// Sets the record ID.
    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl Record for FocusSession {
    type SortKey = (i64, RecordId);

    const KIND: EntityKind = EntityKind::Sessions;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner_id(&self) -> Option<&OwnerId> {
        self.owner_id.as_ref()
    }

    fn assign_owner(&mut self, owner: &OwnerId) {
        self.owner_id = Some(owner.clone());
    }

    fn sort_key(&self) -> Self::SortKey {
        (self.started_at_ms, self.id.clone())
    }
}

impl RemoteMapping for FocusSession {
    fn to_row(&self) -> RemoteRow {
        let mut row = RemoteRow::new();
        row.insert("id".into(), Value::from(self.id.as_str()));
        put_opt(&mut row, "owner_id", self.owner_id.as_ref().map(OwnerId::as_str));
        put_opt(&mut row, "preset_id", self.preset_id.as_ref().map(RecordId::as_str));
        put_opt(&mut row, "label", self.label.as_deref());
        row.insert("started_at_ms".into(), Value::from(self.started_at_ms));
        row.insert("duration_seconds".into(), Value::from(self.duration_seconds));
        row.insert("completed".into(), Value::from(self.completed));
        row
    }

    fn from_row(row: &RemoteRow) -> MappingResult<Self> {
        let r = RowReader::new(EntityKind::Sessions, row);
        Ok(Self {
            id: r.record_id()?,
            owner_id: r.owner_id()?,
            preset_id: r.opt_string("preset_id")?.map(RecordId::new),
            label: r.opt_string("label")?,
            started_at_ms: r.i64("started_at_ms")?,
            // A day is the longest focus block the timer can produce.
            duration_seconds: r.u32_in("duration_seconds", 0, 86_400)?,
            completed: r.bool_or("completed", false)?,
        })
    }
}
