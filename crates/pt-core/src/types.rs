//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// Invalid timer status value.
    #[error("invalid timer status: {value}")]
    InvalidTimerStatus { value: String },

    /// Invalid task status value.
    #[error("invalid task status: {value}")]
    InvalidTaskStatus { value: String },

    /// Period length outside `1..=MAX_PERIOD_DAYS`.
    #[error("period length must be between 1 and 36500 days, got {days}")]
    InvalidPeriodLength { days: i64 },

    /// Retention horizon outside `1..=MAX_RETENTION_DAYS`.
    #[error("retention horizon must be between 1 and 36500 days, got {days}")]
    InvalidRetentionHorizon { days: i64 },

    /// UTC offset outside of what `chrono::FixedOffset` accepts.
    #[error("UTC offset out of range: {minutes} minutes")]
    InvalidUtcOffset { minutes: i32 },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated user identifier.
    ///
    /// Users are owned by the user-management collaborator; the pipeline only
    /// needs a stable, non-empty key to partition every row by owner.
    UserId, "user ID"
);

define_string_id!(
    /// A validated timer identifier (UUID v4 text for timers created here).
    TimerId, "timer ID"
);

define_string_id!(
    /// A validated task identifier, assigned by the task collaborator.
    TaskId, "task ID"
);

impl TimerId {
    /// Generates a fresh random timer ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Status of a task as reported by the task collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "done" | "completed" => Ok(Self::Done),
            _ => Err(ValidationError::InvalidTaskStatus {
                value: s.to_string(),
            }),
        }
    }
}
