use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Bookkeeping the server stamps on every versioned resource.
///
/// `version` is chosen by the server and only ever echoed back as an
/// `If-Match` precondition; the client never computes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

/// Locates the turns of one task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskRef {
    pub tenant_id: String,
    pub task_id: String,
}

impl TaskRef {
    pub fn new(tenant_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            task_id: task_id.into(),
        }
    }
}

/// Locates one turn, and with it that turn's log timeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TurnRef {
    pub tenant_id: String,
    pub task_id: String,
    pub turn_index: u64,
}

impl TurnRef {
    pub fn new(tenant_id: impl Into<String>, task_id: impl Into<String>, turn_index: u64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            task_id: task_id.into(),
            turn_index,
        }
    }

    pub fn task(&self) -> TaskRef {
        TaskRef::new(self.tenant_id.clone(), self.task_id.clone())
    }

    /// Path segments of the turn's `logs` collection below `/v1`.
    pub fn logs_path(&self) -> Vec<String> {
        vec![
            "tenants".to_string(),
            self.tenant_id.clone(),
            "tasks".to_string(),
            self.task_id.clone(),
            "turns".to_string(),
            self.turn_index.to_string(),
            "logs".to_string(),
        ]
    }
}

/// A server resource that follows the read-then-write version protocol.
///
/// Paths are returned as raw segments below `/v1`; the transport escapes
/// each segment on its own.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: &'static str;

    /// What locates the collection: `()` for top-level resources, a tenant id, or a [`TaskRef`].
    type Parent: ?Sized + Sync;
    /// Body accepted by create.
    type Spec: Serialize + DeserializeOwned + Send + Sync;
    /// Body accepted by update; absent fields are left untouched.
    type Update: Serialize + DeserializeOwned + Default + Clone + Send + Sync;

    fn collection_path(parent: &Self::Parent) -> Vec<String>;

    fn meta(&self) -> &ResourceMeta;

    fn item_path(parent: &Self::Parent, id: &str) -> Vec<String> {
        let mut path = Self::collection_path(parent);
        path.push(id.to_string());
        path
    }

    fn version(&self) -> i64 {
        self.meta().version
    }

    fn is_deleted(&self) -> bool {
        self.meta().deleted
    }
}

pub(crate) fn tenant_scoped(tenant_id: &str, collection: &str) -> Vec<String> {
    vec![
        "tenants".to_string(),
        tenant_id.to_string(),
        collection.to_string(),
    ]
}
