use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{debug, Level};

use eventhorizon_client::Client;
use eventhorizon_observability::{
    emit_event, init_process_logging, redact_text, LoggingOptions, ObservabilityEvent, ProcessKind,
};
use eventhorizon_types::{
    Environment, FeatureFlag, FeatureFlagOverride, GithubConnection, GithubOrg, Runner, Task,
    TaskRef, Tenant, TenantGithubCreds, TenantGithubOrg, TurnRef, Workstream, WorkstreamShortName,
};

mod commands;
mod config;
mod help_map;
mod input;

use commands::{
    run_logs, run_policy, run_resource, run_schema, run_turn, LogsAction, PolicyAction,
    ResourceAction, TurnAction,
};
use config::GlobalArgs;

#[derive(Parser, Debug)]
#[command(name = "eventhorizon")]
#[command(about = "Command-line client for the EventHorizon API", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Tenant {
        #[command(subcommand)]
        action: ResourceAction,
    },
    Environment {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: ResourceAction,
    },
    Workstream {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: ResourceAction,
    },
    WorkstreamShortName {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: ResourceAction,
    },
    Task {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: ResourceAction,
    },
    Runner {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: ResourceAction,
    },
    GithubOrg {
        #[command(subcommand)]
        action: ResourceAction,
    },
    TenantGithubOrg {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: ResourceAction,
    },
    GithubConnection {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: ResourceAction,
    },
    GithubCreds {
        #[arg(long)]
        tenant: String,
        #[command(subcommand)]
        action: ResourceAction,
    },
    FeatureFlag {
        #[command(subcommand)]
        action: ResourceAction,
    },
    /// Per-tenant overrides of one flag; the id is the tenant.
    FlagOverride {
        #[arg(long)]
        flag: String,
        #[command(subcommand)]
        action: ResourceAction,
    },
    Turn {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        task: String,
        #[command(subcommand)]
        action: TurnAction,
    },
    Logs {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        task: String,
        #[arg(long)]
        turn: u64,
        #[command(subcommand)]
        action: LogsAction,
    },
    /// Policy bit-vector codec; works offline.
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Prints an example JSON body for a mutating command, e.g. `task.update`.
    Schema { name: Option<String> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::resolve(&cli.global)?;

    let mut logging = LoggingOptions::new(ProcessKind::Cli);
    logging.default_filter = config.log_filter.clone();
    logging.logs_dir = config.logs_dir.clone();
    let (_log_guard, log_info) = init_process_logging(&logging)?;
    emit_event(
        Level::DEBUG,
        ProcessKind::Cli,
        ObservabilityEvent {
            event: "logging.initialized",
            component: "cli.main",
            status: Some("ok"),
            ..ObservabilityEvent::default()
        },
    );
    debug!(
        ?log_info,
        url = ?config.url,
        token = %config.token.as_deref().map(redact_text).unwrap_or_default(),
        feature_flags = ?config.feature_flags,
        "configuration resolved"
    );

    let command = match cli.command {
        Command::Policy { action } => return run_policy(action),
        Command::Schema { name } => return run_schema(name.as_deref()),
        command => command,
    };
    let client = Client::new(config.client_config()?)?;

    match command {
        Command::Tenant { action } => run_resource::<Tenant>(&client, &(), action).await,
        Command::Environment { tenant, action } => {
            run_resource::<Environment>(&client, &tenant, action).await
        }
        Command::Workstream { tenant, action } => {
            run_resource::<Workstream>(&client, &tenant, action).await
        }
        Command::WorkstreamShortName { tenant, action } => {
            run_resource::<WorkstreamShortName>(&client, &tenant, action).await
        }
        Command::Task { tenant, action } => run_resource::<Task>(&client, &tenant, action).await,
        Command::Runner { tenant, action } => {
            run_resource::<Runner>(&client, &tenant, action).await
        }
        Command::GithubOrg { action } => run_resource::<GithubOrg>(&client, &(), action).await,
        Command::TenantGithubOrg { tenant, action } => {
            run_resource::<TenantGithubOrg>(&client, &tenant, action).await
        }
        Command::GithubConnection { tenant, action } => {
            run_resource::<GithubConnection>(&client, &tenant, action).await
        }
        Command::GithubCreds { tenant, action } => {
            run_resource::<TenantGithubCreds>(&client, &tenant, action).await
        }
        Command::FeatureFlag { action } => {
            run_resource::<FeatureFlag>(&client, &(), action).await
        }
        Command::FlagOverride { flag, action } => {
            run_resource::<FeatureFlagOverride>(&client, &flag, action).await
        }
        Command::Turn {
            tenant,
            task,
            action,
        } => run_turn(&client, &TaskRef::new(tenant, task), action).await,
        Command::Logs {
            tenant,
            task,
            turn,
            action,
        } => run_logs(&client, TurnRef::new(tenant, task, turn), action).await,
        Command::Policy { .. } | Command::Schema { .. } => Ok(()),
    }
}

/// One `ERROR:` line; a version conflict also prints the server's current state.
fn report(err: &anyhow::Error) {
    eprintln!("ERROR: {err:#}");
    let conflict = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<eventhorizon_client::Error>())
        .and_then(eventhorizon_client::Error::conflict);
    if let Some(conflict) = conflict {
        if let Ok(current) = serde_json::to_string_pretty(&conflict.current) {
            eprintln!("{current}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_scoped_resource_commands() {
        let cli = Cli::try_parse_from([
            "eventhorizon",
            "--url",
            "https://api.example",
            "--feature-flag",
            "fast-logs=true",
            "environment",
            "--tenant",
            "acme",
            "update",
            "prod",
            "-",
            "--attempts",
            "3",
        ])
        .expect("parse");
        assert_eq!(cli.global.url.as_deref(), Some("https://api.example"));
        assert_eq!(
            cli.global.feature_flags,
            vec![("fast-logs".to_string(), true)]
        );
        match cli.command {
            Command::Environment {
                tenant,
                action:
                    ResourceAction::Update {
                        id,
                        input,
                        version,
                        attempts,
                    },
            } => {
                assert_eq!(tenant, "acme");
                assert_eq!(id, "prod");
                assert_eq!(input, "-");
                assert_eq!(version, None);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn delegated_auth_flags_come_in_pairs() {
        let err = Cli::try_parse_from([
            "eventhorizon",
            "--delegated-auth-type",
            "github",
            "tenant",
            "list",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn logs_upload_defaults_to_stdin() {
        let cli = Cli::try_parse_from([
            "eventhorizon",
            "logs",
            "--tenant",
            "acme",
            "--task",
            "t-1",
            "--turn",
            "2",
            "upload",
        ])
        .expect("parse");
        match cli.command {
            Command::Logs {
                turn,
                action: LogsAction::Upload { input, max_batch_len, .. },
                ..
            } => {
                assert_eq!(turn, 2);
                assert_eq!(input, "-");
                assert_eq!(max_batch_len, 500);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn policy_decode_accepts_the_wildcard() {
        let cli = Cli::try_parse_from(["eventhorizon", "policy", "decode", "token-types", "-1"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Policy {
                action: PolicyAction::Decode { bits: -1, .. }
            }
        ));
    }
}
