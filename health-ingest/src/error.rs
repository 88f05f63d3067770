use thiserror::Error;

/// Failure to deliver a point to the time-series store.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("influxdb request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("influxdb rejected write with status {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Why a date string was refused.
#[derive(Debug, Error)]
pub enum DateError {
    #[error("expected layout YYYY-MM-DD HH:MM:SS ±ZZZZ")]
    Layout,
    #[error(transparent)]
    Parse(#[from] chrono::ParseError),
}

/// Failure to turn a data record into a written point.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("field '{field}' must be a string")]
    DateNotString { field: String },
    #[error("field '{field}' has invalid date '{value}': {source}")]
    InvalidDate {
        field: String,
        value: String,
        #[source]
        source: DateError,
    },
    #[error("record dated {date} has no storable fields")]
    NoFields { date: String },
    #[error(transparent)]
    Write(#[from] WriteError),
}

impl TranscodeError {
    /// True for errors caused by the record's content rather than the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TranscodeError::DateNotString { .. }
                | TranscodeError::InvalidDate { .. }
                | TranscodeError::NoFields { .. }
        )
    }
}
