use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::DiveId;

/// Failure to read a dive-computer export. Aborts the whole import.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("import source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("missing table: {0}")]
    MissingTable(String),

    #[error("missing column {column} in table {table}")]
    MissingColumn { table: String, column: String },

    #[error("malformed import data: {0}")]
    Malformed(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("import rejected by store: {0}")]
    Store(#[from] StoreError),
}

/// A single dive that cannot be turned into a record. The dive is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidDiveData {
    #[error("dive {dive}: missing required field {field}")]
    MissingField { dive: String, field: &'static str },

    #[error("dive {dive}: non-positive duration of {duration_sec}s")]
    NonPositiveDuration { dive: String, duration_sec: i64 },

    #[error("dive {dive}: duration of {duration_sec}s is out of range")]
    DurationOutOfRange { dive: String, duration_sec: i64 },

    #[error("dive {dive}: unreadable timestamp '{value}'")]
    BadTimestamp { dive: String, value: String },

    #[error("dive {dive}: duplicate dive id")]
    DuplicateId { dive: String },
}

/// Error type for timestamp parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimestampError {
    #[error("empty timestamp")]
    Empty,

    #[error("unrecognized timestamp at position {position}: '{input}'")]
    Unrecognized { input: String, position: usize },

    #[error("timestamp out of range: '{0}'")]
    OutOfRange(String),
}

/// A managed photo whose file cannot be read. Never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("photo unavailable at {}: {reason}", .path.display())]
pub struct PhotoAccessError {
    pub path: PathBuf,
    pub reason: String,
}

/// Failure to save or restore a project file. A failed load leaves the
/// current project untouched.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported project schema version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("invalid background image data: {0}")]
    Background(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("inconsistent project: {0}")]
    Inconsistent(String),
}

/// A user edit the store refuses to apply.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("location name must not be empty")]
    EmptyLocationName,

    #[error("unknown trip: {0}")]
    UnknownTrip(String),

    #[error("trip already exists: {0}")]
    TripExists(String),

    #[error("unknown dive: {0}")]
    UnknownDive(DiveId),

    #[error("duplicate dive: {0}")]
    DuplicateDive(DiveId),

    #[error("unknown photo: {}", .0.display())]
    UnknownPhoto(PathBuf),

    #[error("photo already managed: {}", .0.display())]
    DuplicatePhoto(PathBuf),

    #[error("trip start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

/// Failure inside the background RAW conversion worker.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("failed to convert {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("conversion worker panicked")]
    WorkerPanicked,
}

/// Failure reading or writing the core configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Umbrella error handed across the foreign-function boundary.
#[derive(Error, Debug, uniffi::Error)]
#[uniffi(flat_error)]
pub enum CoreError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    InvalidDive(#[from] InvalidDiveData),

    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error(transparent)]
    PhotoAccess(#[from] PhotoAccessError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ImportError::MissingColumn {
            table: "dive_details".to_string(),
            column: "Depth".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "missing column Depth in table dive_details"
        );

        let err = InvalidDiveData::NonPositiveDuration {
            dive: "#12".to_string(),
            duration_sec: 0,
        };
        assert_eq!(err.to_string(), "dive #12: non-positive duration of 0s");

        let err = PhotoAccessError {
            path: PathBuf::from("/trips/bonaire/P1010001.jpg"),
            reason: "file missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "photo unavailable at /trips/bonaire/P1010001.jpg: file missing"
        );

        let err = StoreError::UnknownDive(DiveId(7));
        assert_eq!(err.to_string(), "unknown dive: #7");

        let err = PersistenceError::UnsupportedVersion {
            found: 9,
            supported: 1,
        };
        assert_eq!(
            err.to_string(),
            "unsupported project schema version 9 (newest supported is 1)"
        );
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: CoreError = StoreError::EmptyLocationName.into();
        assert_eq!(err.to_string(), "location name must not be empty");
    }
}
