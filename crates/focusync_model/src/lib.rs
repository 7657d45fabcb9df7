//! # focusync model
//!
//! Record types and identifiers shared by the focusync crates.
//!
//! This crate provides:
//! - Identifier newtypes (`RecordId`, `OwnerId`, `Credential`)
//! - `EntityKind` for the synchronized collections
//! - `SessionState` as published by the host's authentication layer
//! - The `Record` trait the sync engine is generic over
//! - Concrete records: `FocusPreset`, `FocusSession`, `UserSettings`
//! - Field-by-field mapping between records and untyped remote rows
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod focus_session;
mod ids;
mod kind;
mod mapping;
mod preset;
mod record;
mod session;
mod settings;

pub use focus_session::FocusSession;
pub use ids::{Credential, OwnerId, RecordId};
pub use kind::EntityKind;
pub use mapping::{MappingError, MappingResult, RemoteMapping, RemoteRow, RowReader};
pub use preset::FocusPreset;
pub use record::{id_set, Record};
pub use session::SessionState;
pub use settings::UserSettings;
