use crate::models::{SlotId, StreamId};

/// A run configuration value outside its allowed range. Fatal: no run is attempted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid run configuration: `{field}` {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// The catalogue scope is empty or cannot be read. Fatal: no run is attempted.
#[derive(Debug, thiserror::Error)]
pub enum DataUnavailable {
    #[error("no active classes for stream {stream_id}")]
    NoClasses { stream_id: StreamId },
    #[error("no eligible time slots for stream {stream_id}")]
    NoTimeSlots { stream_id: StreamId },
    #[error("no active session for semester {semester} of {academic_year}")]
    NoSession { semester: u8, academic_year: String },
    #[error("no active rooms in the catalogue")]
    NoRooms,
    #[error("no class-course pairings in scope")]
    NoPairings,
    #[error("time slot {slot_id} has an unreadable time {value:?}")]
    BadTime { slot_id: SlotId, value: String },
    #[error("catalogue query failed: {0}")]
    Catalogue(#[from] rusqlite::Error),
}

/// The schedule commit transaction failed and was rolled back.
#[derive(Debug, thiserror::Error)]
#[error("schedule commit failed: {0}")]
pub struct PersistenceError(#[from] pub rusqlite::Error);

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("invalid run token {0:?}")]
    InvalidToken(String),
    #[error("progress io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("progress serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataUnavailable),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}
