use serde::{Deserialize, Serialize};

use crate::patch::Patch;
use crate::resource::{Resource, ResourceMeta};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    pub name: String,
    #[serde(flatten)]
    pub spec: FeatureFlagSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub description: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub default_value: Patch<bool>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for FeatureFlag {
    const KIND: &'static str = "feature flag";
    type Parent = ();
    type Spec = FeatureFlagSpec;
    type Update = FeatureFlagUpdate;

    fn collection_path(_: &()) -> Vec<String> {
        vec!["feature-flags".to_string()]
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}

/// Per-tenant value of a feature flag. Keyed by flag name, then tenant id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagOverride {
    pub flag_name: String,
    pub tenant_id: String,
    #[serde(flatten)]
    pub spec: FeatureFlagOverrideSpec,
    #[serde(flatten)]
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagOverrideSpec {
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagOverrideUpdate {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub value: Patch<bool>,
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub deleted: Patch<bool>,
}

impl Resource for FeatureFlagOverride {
    const KIND: &'static str = "feature flag override";
    type Parent = str;
    type Spec = FeatureFlagOverrideSpec;
    type Update = FeatureFlagOverrideUpdate;

    fn collection_path(flag_name: &str) -> Vec<String> {
        vec![
            "feature-flags".to_string(),
            flag_name.to_string(),
            "overrides".to_string(),
        ]
    }

    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }
}
