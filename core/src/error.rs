use crate::store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error kind surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidPattern,
    EmptyInput,
    MissingReplacement,
    SchemaFetchFailure,
    RecordFetchFailure,
    SerializationFailure,
    UpdateRejected,
    StoreUnavailable,
    EmptySelection,
    InvalidState,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidPattern => "invalid_pattern",
            ErrorKind::EmptyInput => "empty_input",
            ErrorKind::MissingReplacement => "missing_replacement",
            ErrorKind::SchemaFetchFailure => "schema_fetch_failure",
            ErrorKind::RecordFetchFailure => "record_fetch_failure",
            ErrorKind::SerializationFailure => "serialization_failure",
            ErrorKind::UpdateRejected => "update_rejected",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::EmptySelection => "empty_selection",
            ErrorKind::InvalidState => "invalid_state",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid regular expression: {0}")]
    InvalidPattern(String),
    #[error("please enter a search string or pattern")]
    EmptyInput,
    #[error("no replacement text given; use an empty one to delete the matches")]
    MissingReplacement,
    #[error("could not load schema of record type {record_type}: {source}")]
    SchemaFetchFailure {
        record_type: String,
        #[source]
        source: StoreError,
    },
    #[error("could not read record {record_id}: {source}")]
    RecordFetchFailure {
        record_id: String,
        #[source]
        source: StoreError,
    },
    #[error("field {field_key} of record {record_id} is no longer valid JSON after substitution: {message}")]
    SerializationFailure {
        record_id: String,
        field_key: String,
        message: String,
    },
    #[error("store rejected update of record {record_id}: {source}")]
    UpdateRejected {
        record_id: String,
        #[source]
        source: StoreError,
    },
    #[error("record store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    #[error("no records selected for replacement")]
    EmptySelection,
    #[error("{0}")]
    InvalidState(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidPattern(_) => ErrorKind::InvalidPattern,
            EngineError::EmptyInput => ErrorKind::EmptyInput,
            EngineError::MissingReplacement => ErrorKind::MissingReplacement,
            EngineError::SchemaFetchFailure { .. } => ErrorKind::SchemaFetchFailure,
            EngineError::RecordFetchFailure { .. } => ErrorKind::RecordFetchFailure,
            EngineError::SerializationFailure { .. } => ErrorKind::SerializationFailure,
            EngineError::UpdateRejected { .. } => ErrorKind::UpdateRejected,
            EngineError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            EngineError::EmptySelection => ErrorKind::EmptySelection,
            EngineError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }
}

/// Error event as handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EngineError> for ErrorEvent {
    fn from(error: &EngineError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
