use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry on the log timeline of a (tenant, task, turn).
///
/// Indices are assigned by the server: dense, starting at 1, never reused.
/// The field names are PascalCase on the wire; camelCase is accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct TurnLog {
    #[serde(default, alias = "index")]
    pub index: u64,
    #[serde(default, alias = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, alias = "message")]
    pub message: String,
}

impl TurnLog {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            index: 0,
            timestamp: Utc::now(),
            message: message.into(),
        }
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }
}

/// Highest log index accepted for a turn; `index` is absent when the turn has no logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LastTurnLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LastTurnLog {
    /// Index the next uploaded log must carry.
    pub fn next_index(&self) -> u64 {
        self.index.map(|index| index + 1).unwrap_or(1)
    }
}
