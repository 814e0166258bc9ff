//! Error types for the conversation engine.
//!
//! Application edges (CLI, config, snapshot I/O) use `anyhow`; the engine
//! itself returns [`TalkieError`] so callers can tell "bad request" from
//! "nothing yet" from "not found".

use chrono::NaiveDate;
use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, TalkieError>;

/// Typed engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TalkieError {
    /// Entity not found (user, question, conversation).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Start and end of a weekly query fall in different calendar weeks.
    #[error("start and end date must be in the same year, month, and week ({start} .. {end})")]
    RangeNotAligned { start: NaiveDate, end: NaiveDate },

    /// Valid weekly query with no aggregate recorded yet.
    #[error("no weekly conversation statistics for {year}-{month:02} week {week}")]
    NoWeeklyData { year: i32, month: u32, week: u32 },

    /// Remote call failed before a response was read.
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote call answered with something we cannot use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    NoContent,
    Transport,
}

impl TalkieError {
    /// Creates a NotFound error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates an InvalidResponse error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RangeNotAligned { .. } => ErrorKind::Validation,
            Self::NoWeeklyData { .. } => ErrorKind::NoContent,
            Self::Transport(_) | Self::InvalidResponse(_) => ErrorKind::Transport,
        }
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a legitimately empty result
    pub fn is_no_content(&self) -> bool {
        self.kind() == ErrorKind::NoContent
    }

    /// Errors caused by the request itself; never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound | ErrorKind::Validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let d = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let misaligned = TalkieError::RangeNotAligned { start: d, end: d };
        assert_eq!(misaligned.kind(), ErrorKind::Validation);
        assert!(misaligned.is_client_error());
        assert!(!misaligned.is_no_content());

        let empty = TalkieError::NoWeeklyData {
            year: 2024,
            month: 6,
            week: 2,
        };
        assert!(empty.is_no_content());
        assert!(!empty.is_client_error());

        let missing = TalkieError::not_found("user", 7);
        assert!(missing.is_not_found());
        assert!(missing.is_client_error());
        assert_eq!(missing.to_string(), "user not found: 7");

        assert_eq!(
            TalkieError::transport("boom").kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn test_range_message_is_client_facing() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let msg = TalkieError::RangeNotAligned { start, end }.to_string();
        assert!(msg.starts_with("start and end date must be in the same year, month, and week"));
    }
}
