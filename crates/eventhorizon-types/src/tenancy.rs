use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::patch::Patch;
use crate::policy::Policy;
use crate::resource::{tenant_scoped, Resource, ResourceMeta};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    #[serde(flatten)]
    pub spec: TenantSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TenantUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub display_name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub labels: Patch<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for Tenant {
    const KIND: &'static str = "tenant";
    type Parent = ();
    type Spec = TenantSpec;
    type Update = TenantUpdate;

    fn collection_path(_: &()) -> Vec<String> {
        vec!["tenants".to_string()]
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub tenant_id: String,
    pub id: String,
    #[serde(flatten)]
    pub spec: EnvironmentSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_pool: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<Policy>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub display_name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub runner_pool: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub policies: Patch<Vec<Policy>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub variables: Patch<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for Environment {
    const KIND: &'static str = "environment";
    type Parent = str;
    type Spec = EnvironmentSpec;
    type Update = EnvironmentUpdate;

    fn collection_path(tenant_id: &str) -> Vec<String> {
        tenant_scoped(tenant_id, "environments")
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workstream {
    pub tenant_id: String,
    pub id: String,
    #[serde(flatten)]
    pub spec: WorkstreamSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkstreamSpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_environment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkstreamUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub display_name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub short_name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub default_environment_id: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for Workstream {
    const KIND: &'static str = "workstream";
    type Parent = str;
    type Spec = WorkstreamSpec;
    type Update = WorkstreamUpdate;

    fn collection_path(tenant_id: &str) -> Vec<String> {
        tenant_scoped(tenant_id, "workstreams")
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}

/// Reservation of a tenant-unique workstream short name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkstreamShortName {
    pub tenant_id: String,
    pub short_name: String,
    #[serde(flatten)]
    pub spec: WorkstreamShortNameSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkstreamShortNameSpec {
    pub workstream_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkstreamShortNameUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub workstream_id: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for WorkstreamShortName {
    const KIND: &'static str = "workstream short name";
    type Parent = str;
    type Spec = WorkstreamShortNameSpec;
    type Update = WorkstreamShortNameUpdate;

    fn collection_path(tenant_id: &str) -> Vec<String> {
        tenant_scoped(tenant_id, "workstream-short-names")
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}
