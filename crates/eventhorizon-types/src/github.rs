use serde::{Deserialize, Serialize};

use crate::patch::Patch;
use crate::resource::{tenant_scoped, Resource, ResourceMeta};

/// A GitHub organization with the app installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubOrg {
    pub org: String,
    #[serde(flatten)]
    pub spec: GithubOrgSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GithubOrgSpec {
    #[serde(default)]
    pub installation_id: i64,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GithubOrgUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub installation_id: Patch<i64>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub display_name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for GithubOrg {
    const KIND: &'static str = "github org";
    type Parent = ();
    type Spec = GithubOrgSpec;
    type Update = GithubOrgUpdate;

    fn collection_path(_: &()) -> Vec<String> {
        vec!["github-orgs".to_string()]
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}

/// Grant of a GitHub organization to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantGithubOrg {
    pub tenant_id: String,
    pub org: String,
    #[serde(flatten)]
    pub spec: TenantGithubOrgSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TenantGithubOrgSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_repositories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TenantGithubOrgUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub allowed_repositories: Patch<Vec<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for TenantGithubOrg {
    const KIND: &'static str = "tenant github org";
    type Parent = str;
    type Spec = TenantGithubOrgSpec;
    type Update = TenantGithubOrgUpdate;

    fn collection_path(tenant_id: &str) -> Vec<String> {
        tenant_scoped(tenant_id, "github-orgs")
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubConnection {
    pub tenant_id: String,
    pub id: String,
    #[serde(flatten)]
    pub spec: GithubConnectionSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GithubConnectionSpec {
    pub org: String,
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GithubConnectionUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub repository: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub default_branch: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for GithubConnection {
    const KIND: &'static str = "github connection";
    type Parent = str;
    type Spec = GithubConnectionSpec;
    type Update = GithubConnectionUpdate;

    fn collection_path(tenant_id: &str) -> Vec<String> {
        tenant_scoped(tenant_id, "github-connections")
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}

/// GitHub App credentials a tenant brings. The server never returns `private_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantGithubCreds {
    pub tenant_id: String,
    pub id: String,
    #[serde(flatten)]
    pub spec: TenantGithubCredsSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TenantGithubCredsSpec {
    #[serde(default)]
    pub app_id: i64,
    #[serde(default)]
    pub installation_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TenantGithubCredsUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub app_id: Patch<i64>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub installation_id: Patch<i64>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub private_key: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for TenantGithubCreds {
    const KIND: &'static str = "tenant github creds";
    type Parent = str;
    type Spec = TenantGithubCredsSpec;
    type Update = TenantGithubCredsUpdate;

    fn collection_path(tenant_id: &str) -> Vec<String> {
        tenant_scoped(tenant_id, "github-creds")
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}
