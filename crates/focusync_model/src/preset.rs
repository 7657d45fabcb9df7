//! Focus timer presets.

use crate::ids::{OwnerId, RecordId};
use crate::kind::EntityKind;
use crate::mapping::{put_opt, MappingResult, RemoteMapping, RemoteRow, RowReader};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound for any preset duration, in minutes.
const MAX_MINUTES: u32 = 600;

/// A named timer configuration (focus length, break lengths, rounds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusPreset {
    /// Record ID.
    pub id: RecordId,
    /// Owning account, `None` while the preset is guest data.
    pub owner_id: Option<OwnerId>,
    /// Display name.
    pub name: String,
    /// Focus block length.
    pub focus_minutes: u32,
    /// Short break length.
    pub short_break_minutes: u32,
    /// Long break length.
    pub long_break_minutes: u32,
    /// Focus rounds before a long break.
    pub rounds_before_long_break: u32,
    /// Position in the preset list.
    pub sort_order: i64,
    /// Last local modification time (unix millis).
    pub updated_at_ms: i64,
}

impl FocusPreset {
    /// Creates a guest preset with a fresh ID and default break lengths.
    pub fn new(name: impl Into<String>, focus_minutes: u32, short_break_minutes: u32) -> Self {
        Self {
            id: RecordId::generate(),
            owner_id: None,
            name: name.into(),
            focus_minutes,
            short_break_minutes,
            long_break_minutes: short_break_minutes * 3,
            rounds_before_long_break: 4,
            sort_order: 0,
            updated_at_ms: 0,
        }
    }

    /// Sets the list position.
    pub fn with_sort_order(mut self, sort_order: i64) -> Self {
        self.sort_order = sort_order;
        self
    }

    /// Sets the record ID.
    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = id.into();
        self
    }
}

impl Record for FocusPreset {
    type SortKey = (i64, RecordId);

    const KIND: EntityKind = EntityKind::Presets;

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
        (self.sort_order, self.id.clone())
    }

    fn seed(owner: &OwnerId) -> Vec<Self> {
        [("Classic", 25, 5), ("Deep Work", 50, 10), ("Quick Sprint", 15, 3)]
            .into_iter()
            .enumerate()
            .map(|(i, (name, focus, short))| {
                let mut preset = FocusPreset::new(name, focus, short).with_sort_order(i as i64);
                preset.assign_owner(owner);
                preset
            })
            .collect()
    }
}

impl RemoteMapping for FocusPreset {
    fn to_row(&self) -> RemoteRow {
        let mut row = RemoteRow::new();
        row.insert("id".into(), Value::from(self.id.as_str()));
        put_opt(&mut row, "owner_id", self.owner_id.as_ref().map(OwnerId::as_str));
        row.insert("name".into(), Value::from(self.name.as_str()));
        row.insert("focus_minutes".into(), Value::from(self.focus_minutes));
        row.insert("short_break_minutes".into(), Value::from(self.short_break_minutes));
        row.insert("long_break_minutes".into(), Value::from(self.long_break_minutes));
        row.insert(
            "rounds_before_long_break".into(),
            Value::from(self.rounds_before_long_break),
        );
        row.insert("sort_order".into(), Value::from(self.sort_order));
        row.insert("updated_at_ms".into(), Value::from(self.updated_at_ms));
        row
    }

    fn from_row(row: &RemoteRow) -> MappingResult<Self> {
        let r = RowReader::new(EntityKind::Presets, row);
        Ok(Self {
            id: r.record_id()?,
            owner_id: r.owner_id()?,
            name: r.string("name")?,
            focus_minutes: r.u32_in("focus_minutes", 1, MAX_MINUTES)?,
            short_break_minutes: r.u32_in("short_break_minutes", 0, MAX_MINUTES)?,
            long_break_minutes: r.u32_in("long_break_minutes", 0, MAX_MINUTES)?,
            rounds_before_long_break: r.u32_in("rounds_before_long_break", 1, 100)?,
            sort_order: r.i64("sort_order")?,
            updated_at_ms: r.i64("updated_at_ms")?,
        })
    }
}
