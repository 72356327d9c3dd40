//! The `409 Conflict` envelope.
//!
//! The server answers a failed `If-Match` precondition with the resource as
//! it currently stands. `currentType` names the shape of `current`; decoding
//! dispatches on it and rejects tags it does not know.

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use eventhorizon_types::{
    Environment, FeatureFlag, FeatureFlagOverride, GithubOrg, Resource, Runner, Task, Tenant,
    TenantGithubOrg, Turn, Workstream, WorkstreamShortName,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Tenant,
    Environment,
    Task,
    Turn,
    Workstream,
    Runner,
    GithubOrg,
    FeatureFlag,
    FeatureFlagOverride,
    WorkstreamShortName,
    TenantGithubOrg,
}

impl ObjectType {
    pub const ALL: [ObjectType; 11] = [
        ObjectType::Tenant,
        ObjectType::Environment,
        ObjectType::Task,
        ObjectType::Turn,
        ObjectType::Workstream,
        ObjectType::Runner,
        ObjectType::GithubOrg,
        ObjectType::FeatureFlag,
        ObjectType::FeatureFlagOverride,
        ObjectType::WorkstreamShortName,
        ObjectType::TenantGithubOrg,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Tenant => "Tenant",
            ObjectType::Environment => "Environment",
            ObjectType::Task => "Task",
            ObjectType::Turn => "Turn",
            ObjectType::Workstream => "Workstream",
            ObjectType::Runner => "Runner",
            ObjectType::GithubOrg => "GithubOrg",
            ObjectType::FeatureFlag => "FeatureFlag",
            ObjectType::FeatureFlagOverride => "FeatureFlagOverride",
            ObjectType::WorkstreamShortName => "WorkstreamShortName",
            ObjectType::TenantGithubOrg => "TenantGithubOrg",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownObjectType(pub String);

impl fmt::Display for UnknownObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown conflict currentType `{}`", self.0)
    }
}

impl std::error::Error for UnknownObjectType {}

impl FromStr for ObjectType {
    type Err = UnknownObjectType;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        ObjectType::ALL
            .into_iter()
            .find(|object_type| object_type.as_str() == tag)
            .ok_or_else(|| UnknownObjectType(tag.to_string()))
    }
}

/// Server-side state carried by a conflict, one variant per object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentState {
    Tenant(Tenant),
    Environment(Environment),
    Task(Task),
    Turn(Turn),
    Workstream(Workstream),
    Runner(Runner),
    GithubOrg(GithubOrg),
    FeatureFlag(FeatureFlag),
    FeatureFlagOverride(FeatureFlagOverride),
    WorkstreamShortName(WorkstreamShortName),
    TenantGithubOrg(TenantGithubOrg),
}

impl CurrentState {
    pub fn object_type(&self) -> ObjectType {
        match self {
            CurrentState::Tenant(_) => ObjectType::Tenant,
            CurrentState::Environment(_) => ObjectType::Environment,
            CurrentState::Task(_) => ObjectType::Task,
            CurrentState::Turn(_) => ObjectType::Turn,
            CurrentState::Workstream(_) => ObjectType::Workstream,
            CurrentState::Runner(_) => ObjectType::Runner,
            CurrentState::GithubOrg(_) => ObjectType::GithubOrg,
            CurrentState::FeatureFlag(_) => ObjectType::FeatureFlag,
            CurrentState::FeatureFlagOverride(_) => ObjectType::FeatureFlagOverride,
            CurrentState::WorkstreamShortName(_) => ObjectType::WorkstreamShortName,
            CurrentState::TenantGithubOrg(_) => ObjectType::TenantGithubOrg,
        }
    }

    /// `Resource::KIND` of the carried value.
    pub fn kind(&self) -> &'static str {
        match self {
            CurrentState::Tenant(_) => Tenant::KIND,
            CurrentState::Environment(_) => Environment::KIND,
            CurrentState::Task(_) => Task::KIND,
            CurrentState::Turn(_) => Turn::KIND,
            CurrentState::Workstream(_) => Workstream::KIND,
            CurrentState::Runner(_) => Runner::KIND,
            CurrentState::GithubOrg(_) => GithubOrg::KIND,
            CurrentState::FeatureFlag(_) => FeatureFlag::KIND,
            CurrentState::FeatureFlagOverride(_) => FeatureFlagOverride::KIND,
            CurrentState::WorkstreamShortName(_) => WorkstreamShortName::KIND,
            CurrentState::TenantGithubOrg(_) => TenantGithubOrg::KIND,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            CurrentState::Tenant(v) => v.version(),
            CurrentState::Environment(v) => v.version(),
            CurrentState::Task(v) => v.version(),
            CurrentState::Turn(v) => v.version(),
            CurrentState::Workstream(v) => v.version(),
            CurrentState::Runner(v) => v.version(),
            CurrentState::GithubOrg(v) => v.version(),
            CurrentState::FeatureFlag(v) => v.version(),
            CurrentState::FeatureFlagOverride(v) => v.version(),
            CurrentState::WorkstreamShortName(v) => v.version(),
            CurrentState::TenantGithubOrg(v) => v.version(),
        }
    }

    pub fn decode(object_type: ObjectType, current: Value) -> serde_json::Result<Self> {
        Ok(match object_type {
            ObjectType::Tenant => CurrentState::Tenant(serde_json::from_value(current)?),
            ObjectType::Environment => CurrentState::Environment(serde_json::from_value(current)?),
            ObjectType::Task => CurrentState::Task(serde_json::from_value(current)?),
            ObjectType::Turn => CurrentState::Turn(serde_json::from_value(current)?),
            ObjectType::Workstream => CurrentState::Workstream(serde_json::from_value(current)?),
            ObjectType::Runner => CurrentState::Runner(serde_json::from_value(current)?),
            ObjectType::GithubOrg => CurrentState::GithubOrg(serde_json::from_value(current)?),
            ObjectType::FeatureFlag => CurrentState::FeatureFlag(serde_json::from_value(current)?),
            ObjectType::FeatureFlagOverride => {
                CurrentState::FeatureFlagOverride(serde_json::from_value(current)?)
            }
            ObjectType::WorkstreamShortName => {
                CurrentState::WorkstreamShortName(serde_json::from_value(current)?)
            }
            ObjectType::TenantGithubOrg => {
                CurrentState::TenantGithubOrg(serde_json::from_value(current)?)
            }
        })
    }

    /// Extracts the payload as `R` when it carries that kind of resource.
    pub fn into_resource<R: Resource>(self) -> Option<R> {
        if self.kind() != R::KIND {
            return None;
        }
        serde_json::to_value(&self)
            .and_then(serde_json::from_value)
            .ok()
    }
}

impl Serialize for CurrentState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CurrentState::Tenant(v) => v.serialize(serializer),
            CurrentState::Environment(v) => v.serialize(serializer),
            CurrentState::Task(v) => v.serialize(serializer),
            CurrentState::Turn(v) => v.serialize(serializer),
            CurrentState::Workstream(v) => v.serialize(serializer),
            CurrentState::Runner(v) => v.serialize(serializer),
            CurrentState::GithubOrg(v) => v.serialize(serializer),
            CurrentState::FeatureFlag(v) => v.serialize(serializer),
            CurrentState::FeatureFlagOverride(v) => v.serialize(serializer),
            CurrentState::WorkstreamShortName(v) => v.serialize(serializer),
            CurrentState::TenantGithubOrg(v) => v.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ConflictEnvelope")]
pub struct ConflictError {
    pub response_code: u16,
    pub message: String,
    pub error_type: String,
    pub current: CurrentState,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictEnvelope {
    #[serde(default)]
    response_code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_type: String,
    current_type: String,
    #[serde(default)]
    current: Value,
}

impl TryFrom<ConflictEnvelope> for ConflictError {
    type Error = serde_json::Error;

    fn try_from(envelope: ConflictEnvelope) -> Result<Self, Self::Error> {
        let object_type = envelope
            .current_type
            .parse::<ObjectType>()
            .map_err(<serde_json::Error as serde::de::Error>::custom)?;
        let current = CurrentState::decode(object_type, envelope.current)?;
        Ok(Self {
            response_code: envelope.response_code,
            message: envelope.message,
            error_type: envelope.error_type,
            current,
        })
    }
}

impl Serialize for ConflictError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut envelope = serializer.serialize_struct("ConflictError", 5)?;
        envelope.serialize_field("responseCode", &self.response_code)?;
        envelope.serialize_field("message", &self.message)?;
        envelope.serialize_field("errorType", &self.error_type)?;
        envelope.serialize_field("currentType", self.current.object_type().as_str())?;
        envelope.serialize_field("current", &self.current)?;
        envelope.end()
    }
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): current {} is at version {}",
            self.message,
            self.response_code,
            self.current.object_type(),
            self.current.version()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use eventhorizon_types::*;
    use serde_json::json;

    fn meta(version: i64) -> ResourceMeta {
        ResourceMeta {
            version,
            deleted: false,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
        }
    }

    fn samples() -> Vec<CurrentState> {
        vec![
            CurrentState::Tenant(Tenant {
                id: "acme".to_string(),
                spec: TenantSpec {
                    display_name: "Acme".to_string(),
                    ..Default::default()
                },
                meta: meta(9),
            }),
            CurrentState::Environment(Environment {
                tenant_id: "acme".to_string(),
                id: "prod".to_string(),
                spec: EnvironmentSpec {
                    display_name: "Production".to_string(),
                    runner_pool: Some("large".to_string()),
                    policies: vec![Policy {
                        name: "runners".to_string(),
                        actions: PolicySet::only([Action::LogsWrite, Action::TurnWrite]),
                        token_types: PolicySet::Any,
                        principals: vec!["runner:*".to_string()],
                    }],
                    variables: Default::default(),
                },
                meta: meta(3),
            }),
            CurrentState::Task(Task {
                tenant_id: "acme".to_string(),
                id: "t-1".to_string(),
                turn_count: 2,
                spec: TaskSpec {
                    title: "Fix build".to_string(),
                    status: TaskStatus::Running,
                    ..Default::default()
                },
                meta: meta(4),
            }),
            CurrentState::Turn(Turn {
                tenant_id: "acme".to_string(),
                task_id: "t-1".to_string(),
                turn_index: 2,
                spec: TurnSpec {
                    runner_id: Some("r-1".to_string()),
                    status: TurnStatus::Running,
                    ..Default::default()
                },
                meta: meta(5),
            }),
            CurrentState::Workstream(Workstream {
                tenant_id: "acme".to_string(),
                id: "ws".to_string(),
                spec: WorkstreamSpec {
                    display_name: "Web".to_string(),
                    short_name: Some("web".to_string()),
                    default_environment_id: None,
                },
                meta: meta(1),
            }),
            CurrentState::Runner(Runner {
                tenant_id: "acme".to_string(),
                id: "r-1".to_string(),
                last_heartbeat_at: None,
                spec: RunnerSpec {
                    display_name: "runner one".to_string(),
                    state: RunnerState::Busy,
                    ..Default::default()
                },
                meta: meta(6),
            }),
            CurrentState::GithubOrg(GithubOrg {
                org: "acme-corp".to_string(),
                spec: GithubOrgSpec {
                    installation_id: 77,
                    display_name: "Acme Corp".to_string(),
                },
                meta: meta(2),
            }),
            CurrentState::FeatureFlag(FeatureFlag {
                name: "fast-logs".to_string(),
                spec: FeatureFlagSpec {
                    description: "stream logs faster".to_string(),
                    default_value: true,
                },
                meta: meta(8),
            }),
            CurrentState::FeatureFlagOverride(FeatureFlagOverride {
                flag_name: "fast-logs".to_string(),
                tenant_id: "acme".to_string(),
                spec: FeatureFlagOverrideSpec { value: false },
                meta: meta(1),
            }),
            CurrentState::WorkstreamShortName(WorkstreamShortName {
                tenant_id: "acme".to_string(),
                short_name: "web".to_string(),
                spec: WorkstreamShortNameSpec {
                    workstream_id: "ws".to_string(),
                },
                meta: meta(1),
            }),
            CurrentState::TenantGithubOrg(TenantGithubOrg {
                tenant_id: "acme".to_string(),
                org: "acme-corp".to_string(),
                spec: TenantGithubOrgSpec {
                    allowed_repositories: vec!["web".to_string()],
                },
                meta: meta(3),
            }),
        ]
    }

    #[test]
    fn every_object_type_round_trips_through_the_envelope() {
        let samples = samples();
        assert_eq!(samples.len(), ObjectType::ALL.len());
        for current in samples {
            let conflict = ConflictError {
                response_code: 409,
                message: "version mismatch".to_string(),
                error_type: "Conflict".to_string(),
                current,
            };
            let encoded = serde_json::to_string(&conflict).expect("encode");
            let decoded: ConflictError = serde_json::from_str(&encoded).expect("decode");
            assert_eq!(decoded, conflict);
        }
    }

    #[test]
    fn dispatches_on_current_type() {
        let conflict: ConflictError = serde_json::from_value(json!({
            "responseCode": 409,
            "message": "version mismatch",
            "errorType": "Conflict",
            "currentType": "Tenant",
            "current": {"id": "acme", "displayName": "Acme", "version": 9},
        }))
        .expect("decode");
        assert_eq!(conflict.current.object_type(), ObjectType::Tenant);
        assert_eq!(conflict.current.version(), 9);
        let tenant: Tenant = conflict.current.into_resource().expect("tenant");
        assert_eq!(tenant.spec.display_name, "Acme");
    }

    #[test]
    fn unknown_current_type_fails() {
        let err = serde_json::from_value::<ConflictError>(json!({
            "responseCode": 409,
            "message": "version mismatch",
            "currentType": "Spaceship",
            "current": {},
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown conflict currentType `Spaceship`"));
    }

    #[test]
    fn missing_current_type_fails() {
        assert!(serde_json::from_value::<ConflictError>(json!({
            "responseCode": 409,
            "current": {"id": "acme"},
        }))
        .is_err());
    }

    #[test]
    fn into_resource_rejects_other_kinds() {
        let current = samples().remove(0);
        assert!(current.into_resource::<Task>().is_none());
    }
}
