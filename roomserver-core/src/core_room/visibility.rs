//! History visibility policy
//!
//! A room may be observed by non-members only when its history visibility
//! record says `world_readable`. Three outcomes are kept apart:
//!
//! 1. The record is absent: closed.
//! 2. The record exists but has no `history_visibility` key: closed.
//! 3. The record carries a value: open only for `world_readable`.
//!
//! A record that cannot be decoded is an error, never a default.

use super::errors::{StoreError, StoreResult};
use super::traits::StateEvent;
use serde::Deserialize;
use std::fmt;

/// Known history visibility values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryVisibility {
    WorldReadable,
    Shared,
    Invited,
    Joined,
    /// Any value this server does not know
    Unrecognized(String),
}

impl HistoryVisibility {
    pub fn parse(value: &str) -> Self {
        match value {
            "world_readable" => HistoryVisibility::WorldReadable,
            "shared" => HistoryVisibility::Shared,
            "invited" => HistoryVisibility::Invited,
            "joined" => HistoryVisibility::Joined,
            other => HistoryVisibility::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HistoryVisibility::WorldReadable => "world_readable",
            HistoryVisibility::Shared => "shared",
            HistoryVisibility::Invited => "invited",
            HistoryVisibility::Joined => "joined",
            HistoryVisibility::Unrecognized(other) => other,
        }
    }
}

impl fmt::Display for HistoryVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content schema of the `m.room.history_visibility` record.
///
/// Unknown keys are ignored. A non-string value for `history_visibility`
/// fails to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HistoryVisibilityContent {
    #[serde(default)]
    pub history_visibility: Option<String>,
}

/// Result of evaluating a room's visibility record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityCheck {
    RecordAbsent,
    KeyAbsent,
    Value(HistoryVisibility),
}

impl VisibilityCheck {
    /// Evaluate an optional state record.
    pub fn evaluate(record: Option<&StateEvent>) -> StoreResult<Self> {
        let Some(record) = record else {
            return Ok(VisibilityCheck::RecordAbsent);
        };
        let content: HistoryVisibilityContent = serde_json::from_slice(&record.content)
            .map_err(|e| StoreError::Decode(format!("history visibility content: {}", e)))?;
        Ok(match content.history_visibility {
            Some(value) => VisibilityCheck::Value(HistoryVisibility::parse(&value)),
            None => VisibilityCheck::KeyAbsent,
        })
    }

    /// Whether a non-member may peek
    pub fn permits_peek(&self) -> bool {
        matches!(self, VisibilityCheck::Value(HistoryVisibility::WorldReadable))
    }
}
