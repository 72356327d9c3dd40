use serde::{Deserialize, Serialize};

use eventhorizon_types::TurnLog;

/// Body of `POST …/turns/{turn}/logs`.
///
/// `logs[i].index` must equal `start_index + i`; `version` is the token the
/// previous upload (or the turn read) returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTurnLogsRequest {
    pub task_id: String,
    pub turn_index: u64,
    pub start_index: u64,
    #[serde(default)]
    pub logs: Vec<TurnLog>,
    pub version: i64,
}

impl UploadTurnLogsRequest {
    /// Half-open index range covered by this batch.
    pub fn index_range(&self) -> std::ops::Range<u64> {
        self.start_index..self.start_index + self.logs.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UploadTurnLogsResponse {
    pub version: i64,
}

/// Bytes `log` occupies inside the `logs` array of an upload body.
pub fn encoded_log_len(log: &TurnLog) -> serde_json::Result<usize> {
    serde_json::to_vec(log).map(|encoded| encoded.len())
}

/// Byte length of a JSON array whose elements have the given encoded lengths.
pub fn encoded_array_len(element_lens: impl IntoIterator<Item = usize>) -> usize {
    let (count, total) = element_lens
        .into_iter()
        .fold((0usize, 0usize), |(count, total), len| (count + 1, total + len));
    2 + total + count.saturating_sub(1)
}
