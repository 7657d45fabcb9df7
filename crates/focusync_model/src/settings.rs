//! Per-user settings singleton.

use crate::ids::{OwnerId, RecordId};
use crate::kind::EntityKind;
use crate::mapping::{put_opt, MappingResult, RemoteMapping, RemoteRow, RowReader};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// App settings. Exactly one record exists per owner and its ID is the
/// owner's ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Record ID (equal to the owner ID once owned).
    pub id: RecordId,
    /// Owning account, `None` for guest data.
    pub owner_id: Option<OwnerId>,
    /// Start breaks automatically when a focus block ends.
    pub auto_start_breaks: bool,
    /// Start the next focus block automatically after a break.
    pub auto_start_focus: bool,
    /// Play sounds.
    pub sound_enabled: bool,
    /// Daily focus goal.
    pub daily_goal_minutes: u32,
    /// UI theme name.
    pub theme: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            id: RecordId::new("local"),
            owner_id: None,
            auto_start_breaks: false,
            auto_start_focus: false,
            sound_enabled: true,
            daily_goal_minutes: 120,
            theme: "system".into(),
        }
    }
}

impl UserSettings {
    /// Default settings owned by `owner`.
    pub fn for_owner(owner: &OwnerId) -> Self {
        let mut settings = Self::default();
        settings.assign_owner(owner);
        settings
    }
}

impl Record for UserSettings {
    type SortKey = RecordId;

    const KIND: EntityKind = EntityKind::Settings;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner_id(&self) -> Option<&OwnerId> {
        self.owner_id.as_ref()
    }

    fn assign_owner(&mut self, owner: &OwnerId) {
        self.owner_id = Some(owner.clone());
        self.id = RecordId::from(owner);
    }

    fn sort_key(&self) -> Self::SortKey {
        self.id.clone()
    }

    fn seed(owner: &OwnerId) -> Vec<Self> {
        vec![UserSettings::for_owner(owner)]
    }
}

impl RemoteMapping for UserSettings {
    fn to_row(&self) -> RemoteRow {
        let mut row = RemoteRow::new();
        row.insert("id".into(), Value::from(self.id.as_str()));
        put_opt(&mut row, "owner_id", self.owner_id.as_ref().map(OwnerId::as_str));
        row.insert("auto_start_breaks".into(), Value::from(self.auto_start_breaks));
        row.insert("auto_start_focus".into(), Value::from(self.auto_start_focus));
        row.insert("sound_enabled".into(), Value::from(self.sound_enabled));
        row.insert("daily_goal_minutes".into(), Value::from(self.daily_goal_minutes));
        row.insert("theme".into(), Value::from(self.theme.as_str()));
        row
    }

    fn from_row(row: &RemoteRow) -> MappingResult<Self> {
        let r = RowReader::new(EntityKind::Settings, row);
        let defaults = UserSettings::default();
        Ok(Self {
            id: r.record_id()?,
            owner_id: r.owner_id()?,
            auto_start_breaks: r.bool_or("auto_start_breaks", defaults.auto_start_breaks)?,
            auto_start_focus: r.bool_or("auto_start_focus", defaults.auto_start_focus)?,
            sound_enabled: r.bool_or("sound_enabled", defaults.sound_enabled)?,
            daily_goal_minutes: r.u32_in("daily_goal_minutes", 0, 24 * 60)?,
            theme: r.opt_string("theme")?.unwrap_or(defaults.theme),
        })
    }
}
