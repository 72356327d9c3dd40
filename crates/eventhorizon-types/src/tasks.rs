use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::patch::Patch;
use crate::resource::{tenant_scoped, Resource, ResourceMeta, TaskRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Succeeded,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub tenant_id: String,
    pub id: String,
    #[serde(default)]
    pub turn_count: u64,
    #[serde(flatten)]
    pub spec: TaskSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workstream_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub title: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub prompt: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub workstream_id: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub environment_id: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub status: Patch<TaskStatus>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub labels: Patch<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for Task {
    const KIND: &'static str = "task";
    type Parent = str;
    type Spec = TaskSpec;
    type Update = TaskUpdate;

    fn collection_path(tenant_id: &str) -> Vec<String> {
        tenant_scoped(tenant_id, "tasks")
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

/// One execution attempt of a task. Logs are scoped to a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub tenant_id: String,
    pub task_id: String,
    pub turn_index: u64,
    #[serde(flatten)]
    pub spec: TurnSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TurnSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_id: Option<String>,
    #[serde(default)]
    pub status: TurnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TurnUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub runner_id: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub status: Patch<TurnStatus>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub started_at: Patch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub finished_at: Patch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub exit_code: Patch<i32>,
}

impl Resource for Turn {
    const KIND: &'static str = "turn";
    type Parent = TaskRef;
    type Spec = TurnSpec;
    type Update = TurnUpdate;

    fn collection_path(task: &TaskRef) -> Vec<String> {
        let mut path = tenant_scoped(&task.tenant_id, "tasks");
        path.push(task.task_id.clone());
        path.push("turns".to_string());
        path
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    #[default]
    Offline,
    Idle,
    Busy,
    Draining,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runner {
    pub tenant_id: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub spec: RunnerSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    #[serde(default)]
    pub state: RunnerState,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunnerUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub display_name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub environment_id: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub state: Patch<RunnerState>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub labels: Patch<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for Runner {
    const KIND: &'static str = "runner";
    type Parent = str;
    type Spec = RunnerSpec;
    type Update = RunnerUpdate;

    fn collection_path(tenant_id: &str) -> Vec<String> {
        tenant_scoped(tenant_id, "runners")
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}
