//! Synchronized entity kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The entity collections that are mirrored to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Focus timer presets.
    Presets,
    /// Historical focus sessions.
    Sessions,
    /// Per-user settings (exactly one record per owner).
    Settings,
}

impl EntityKind {
    /// All kinds, in the order the coordinator starts them.
    pub const ALL: [EntityKind; 3] = [EntityKind::Presets, EntityKind::Sessions, EntityKind::Settings];

    /// Returns the collection name used for remote tables and persistence keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Presets => "presets",
            EntityKind::Sessions => "sessions",
            EntityKind::Settings => "settings",
        }
    }

    /// Parses a collection name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "presets" => Some(EntityKind::Presets),
            "sessions" => Some(EntityKind::Sessions),
            "settings" => Some(EntityKind::Settings),
            _ => None,
        }
    }

    /// Returns true if the collection always holds exactly one record per owner.
    ///
    /// Singleton collections have no delete or tombstone concept.
    pub fn is_singleton(&self) -> bool {
        matches!(self, EntityKind::Settings)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
