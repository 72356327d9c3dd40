use std::time::Duration;

use anyhow::Context;
use clap::{Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use eventhorizon_client::{
    Client, ListOptions, LogStream, LogStreamOptions, LogUploader, UploaderOptions,
};
use eventhorizon_types::{
    Action, PolicyEnum, PolicySet, Resource, TaskRef, TokenType, Turn, TurnLog, TurnRef,
    TurnSpec,
};

use crate::help_map;
use crate::input::{open_lines, read_json, STDIN};

#[derive(Subcommand, Debug)]
pub enum ResourceAction {
    Get {
        id: String,
        #[arg(long, default_value_t = false)]
        include_deleted: bool,
    },
    List {
        #[arg(long, default_value_t = false)]
        include_deleted: bool,
        #[arg(long)]
        limit: Option<u32>,
        /// `nextToken` of a previous page.
        #[arg(long)]
        page_token: Option<String>,
        /// Follow `nextToken` and print every item.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Creates the resource from a JSON body (path, or `-` for stdin).
    Create { id: String, input: String },
    /// Applies a partial JSON update under the version precondition.
    Update {
        id: String,
        input: String,
        /// Expected version; read from the server when omitted.
        #[arg(long)]
        version: Option<i64>,
        /// Writes to attempt when the version moves underneath us.
        #[arg(long, default_value_t = 1)]
        attempts: usize,
    },
    Delete {
        id: String,
        #[arg(long)]
        version: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TurnAction {
    Get {
        index: u64,
        #[arg(long, default_value_t = false)]
        include_deleted: bool,
    },
    List {
        #[arg(long, default_value_t = false)]
        include_deleted: bool,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        page_token: Option<String>,
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Starts the next turn; the server assigns its index.
    Create {
        input: String,
        /// Version of the task the turn must be created against.
        #[arg(long)]
        task_version: Option<i64>,
    },
    Update {
        index: u64,
        input: String,
        #[arg(long)]
        version: Option<i64>,
        #[arg(long, default_value_t = 1)]
        attempts: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum LogsAction {
    List {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        page_token: Option<String>,
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Highest index the server holds for the turn.
    Last,
    /// Follows the turn's logs, one JSON object per line, until the server
    /// has nothing more to send or the process is interrupted.
    Stream {
        /// Resume after this event id.
        #[arg(long, default_value_t = 0)]
        last_id: i64,
        #[arg(long, default_value_t = false)]
        include_deleted: bool,
        /// Drop entries a reconnect replays.
        #[arg(long, default_value_t = false)]
        skip_replayed: bool,
    },
    /// Uploads newline-delimited messages (path, or `-` for stdin).
    Upload {
        #[arg(default_value = STDIN)]
        input: String,
        /// Turn version to upload against; read from the server when omitted.
        #[arg(long)]
        version: Option<i64>,
        /// First index to assign; continues after the last stored log when omitted.
        #[arg(long)]
        start_index: Option<u64>,
        #[arg(long, default_value_t = eventhorizon_client::log_uploader::DEFAULT_MAX_BATCH_LEN)]
        max_batch_len: usize,
        #[arg(long, default_value_t = 1000)]
        max_batch_age_ms: u64,
        #[arg(long, default_value_t = eventhorizon_client::log_uploader::DEFAULT_MAX_BATCH_BYTES)]
        max_batch_bytes: usize,
        /// Extra attempts for batches that fail at the network level.
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
}

#[derive(Subcommand, Debug)]
pub enum PolicyAction {
    /// Prints the bit-vector for a set of names; `*` is the wildcard.
    Encode {
        #[arg(value_enum)]
        kind: PolicyKind,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Prints the names a bit-vector stands for.
    Decode {
        #[arg(value_enum)]
        kind: PolicyKind,
        #[arg(allow_hyphen_values = true)]
        bits: i64,
    },
    /// Lists the known names in bit order.
    Values {
        #[arg(value_enum)]
        kind: PolicyKind,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Actions,
    TokenTypes,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run_resource<R: Resource>(
    client: &Client,
    parent: &R::Parent,
    action: ResourceAction,
) -> anyhow::Result<()> {
    match action {
        ResourceAction::Get {
            id,
            include_deleted,
        } => print_json(&client.get::<R>(parent, &id, include_deleted).await?),
        ResourceAction::List {
            include_deleted,
            limit,
            page_token,
            all,
        } => {
            if all {
                return print_json(&client.list_all::<R>(parent, include_deleted).await?);
            }
            let options = ListOptions {
                include_deleted,
                token: page_token,
                limit,
            };
            print_json(&client.list::<R>(parent, &options).await?)
        }
        ResourceAction::Create { id, input } => {
            let spec: R::Spec = read_json(&input)?;
            print_json(&client.create::<R>(parent, &id, &spec).await?)
        }
        ResourceAction::Update {
            id,
            input,
            version,
            attempts,
        } => {
            let update: R::Update = read_json(&input)?;
            let updated = match version {
                Some(version) => client.update::<R>(parent, &id, version, &update).await?,
                None => {
                    client
                        .update_with::<R, _>(parent, &id, attempts, |_| Some(update.clone()))
                        .await?
                }
            };
            print_json(&updated)
        }
        ResourceAction::Delete { id, version } => {
            let version = match version {
                Some(version) => version,
                None => client.get::<R>(parent, &id, true).await?.version(),
            };
            client.delete::<R>(parent, &id, version).await?;
            info!(kind = R::KIND, id = %id, version, "deleted");
            print_json(&json!({ "kind": R::KIND, "id": id, "deleted": true }))
        }
    }
}

pub async fn run_turn(client: &Client, task: &TaskRef, action: TurnAction) -> anyhow::Result<()> {
    let action = match action {
        TurnAction::Create {
            input,
            task_version,
        } => {
            let spec: TurnSpec = read_json(&input)?;
            return print_json(&client.create_turn(task, &spec, task_version).await?);
        }
        TurnAction::Get {
            index,
            include_deleted,
        } => ResourceAction::Get {
            id: index.to_string(),
            include_deleted,
        },
        TurnAction::List {
            include_deleted,
            limit,
            page_token,
            all,
        } => ResourceAction::List {
            include_deleted,
            limit,
            page_token,
            all,
        },
        TurnAction::Update {
            index,
            input,
            version,
            attempts,
        } => ResourceAction::Update {
            id: index.to_string(),
            input,
            version,
            attempts,
        },
    };
    run_resource::<Turn>(client, task, action).await
}

pub async fn run_logs(client: &Client, turn: TurnRef, action: LogsAction) -> anyhow::Result<()> {
    match action {
        LogsAction::List {
            limit,
            page_token,
            all,
        } => {
            let mut options = ListOptions {
                include_deleted: false,
                token: page_token,
                limit,
            };
            if !all {
                return print_json(&client.list_turn_logs(&turn, &options).await?);
            }
            let mut logs = Vec::new();
            loop {
                let page = client.list_turn_logs(&turn, &options).await?;
                logs.extend(page.items);
                match page.next_token {
                    Some(token) if !token.is_empty() => options.token = Some(token),
                    _ => break,
                }
            }
            print_json(&logs)
        }
        LogsAction::Last => match client.last_turn_log(&turn).await {
            Ok(last) => print_json(&last),
            Err(err) if err.is_not_found() => print_json(&Value::Null),
            Err(err) => Err(err.into()),
        },
        LogsAction::Stream {
            last_id,
            include_deleted,
            skip_replayed,
        } => {
            let options = LogStreamOptions {
                last_id,
                include_deleted,
                skip_replayed,
                ..LogStreamOptions::default()
            };
            stream_logs(client, turn, options).await
        }
        LogsAction::Upload {
            input,
            version,
            start_index,
            max_batch_len,
            max_batch_age_ms,
            max_batch_bytes,
            retries,
        } => {
            let options = UploaderOptions {
                max_batch_len,
                max_batch_age: Duration::from_millis(max_batch_age_ms),
                max_batch_bytes,
                upload_retries: retries,
                ..UploaderOptions::default()
            };
            upload_logs(client, turn, &input, version, start_index, options).await
        }
    }
}

async fn stream_logs(
    client: &Client,
    turn: TurnRef,
    options: LogStreamOptions,
) -> anyhow::Result<()> {
    let mut stream = LogStream::new(client.clone(), turn, options);
    let mut interrupted = false;
    while !interrupted {
        let next = tokio::select! {
            log = stream.recv() => log,
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                None
            }
        };
        match next {
            Some(log) => println!("{}", serde_json::to_string(&log)?),
            None => break,
        }
    }
    let last_id = stream.last_id();
    if interrupted {
        info!(last_id, "interrupted, closing turn log stream");
    }
    stream
        .close()
        .await
        .with_context(|| format!("turn log stream failed after event {last_id}"))
}

async fn upload_logs(
    client: &Client,
    turn: TurnRef,
    input: &str,
    version: Option<i64>,
    start_index: Option<u64>,
    options: UploaderOptions,
) -> anyhow::Result<()> {
    let version = match version {
        Some(version) => version,
        None => client
            .get::<Turn>(&turn.task(), &turn.turn_index.to_string(), false)
            .await?
            .version(),
    };
    let (tx, rx) = mpsc::channel(options.max_batch_len.max(1));
    let mut uploader = match start_index {
        Some(start_index) => {
            LogUploader::new(client.clone(), turn, version, start_index, rx, options)
        }
        None => LogUploader::resume(client.clone(), turn, version, rx, options).await?,
    };

    let mut lines = open_lines(input).await?.lines();
    while let Some(line) = lines.next_line().await.context("failed to read log input")? {
        if line.trim().is_empty() {
            continue;
        }
        if tx.send(TurnLog::new(line)).await.is_err() {
            warn!("uploader stopped before the input was exhausted");
            break;
        }
    }
    drop(tx);

    let summary = uploader.wait().await?;
    print_json(&json!({
        "batches": summary.batches,
        "uploaded": summary.uploaded,
        "nextIndex": summary.next_index,
        "version": summary.version,
    }))
}

pub fn encode_policy(kind: PolicyKind, names: &[String]) -> anyhow::Result<i64> {
    Ok(match kind {
        PolicyKind::Actions => PolicySet::<Action>::from_names(names)?.encode(),
        PolicyKind::TokenTypes => PolicySet::<TokenType>::from_names(names)?.encode(),
    })
}

pub fn decode_policy(kind: PolicyKind, bits: i64) -> Vec<&'static str> {
    match kind {
        PolicyKind::Actions => PolicySet::<Action>::decode(bits).names(),
        PolicyKind::TokenTypes => PolicySet::<TokenType>::decode(bits).names(),
    }
}

fn policy_values(kind: PolicyKind) -> Vec<&'static str> {
    fn names<T: PolicyEnum>() -> Vec<&'static str> {
        T::VALUES.iter().map(|value| value.as_str()).collect()
    }
    match kind {
        PolicyKind::Actions => names::<Action>(),
        PolicyKind::TokenTypes => names::<TokenType>(),
    }
}

pub fn run_policy(action: PolicyAction) -> anyhow::Result<()> {
    match action {
        PolicyAction::Encode { kind, names } => {
            println!("{}", encode_policy(kind, &names)?);
            Ok(())
        }
        PolicyAction::Decode { kind, bits } => print_json(&decode_policy(kind, bits)),
        PolicyAction::Values { kind } => print_json(&policy_values(kind)),
    }
}

pub fn run_schema(name: Option<&str>) -> anyhow::Result<()> {
    let Some(name) = name else {
        for name in help_map::names() {
            println!("{name}");
        }
        return Ok(());
    };
    let entries = help_map::matching(name);
    if entries.is_empty() {
        anyhow::bail!(
            "no JSON input shape for `{name}`; run `schema` without arguments to list them"
        );
    }
    let single = entries.len() == 1;
    for (key, body) in entries {
        let body: Value = serde_json::from_str(body)?;
        if !single {
            println!("{key}:");
        }
        print_json(&body)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn encodes_policy_names_by_declaration_order() {
        assert_eq!(
            encode_policy(PolicyKind::Actions, &names(&["task.read", "logs.read"])).expect("encode"),
            0b10001
        );
        assert_eq!(
            encode_policy(PolicyKind::TokenTypes, &names(&["runner", "*"])).expect("encode"),
            -1
        );
        assert!(encode_policy(PolicyKind::TokenTypes, &names(&["robot"])).is_err());
    }

    #[test]
    fn decodes_bits_to_names() {
        assert_eq!(
            decode_policy(PolicyKind::Actions, 0b10001),
            vec!["task.read", "logs.read"]
        );
        assert_eq!(decode_policy(PolicyKind::TokenTypes, -1), vec!["*"]);
        assert!(decode_policy(PolicyKind::TokenTypes, 0).is_empty());
    }

    #[test]
    fn values_follow_bit_order() {
        let values = policy_values(PolicyKind::TokenTypes);
        assert_eq!(values, vec!["user", "runner", "service", "delegated"]);
        for (position, name) in values.iter().enumerate() {
            assert_eq!(
                encode_policy(PolicyKind::TokenTypes, &names(&[name])).expect("encode"),
                1 << position
            );
        }
    }

    #[test]
    fn unknown_schema_is_an_error() {
        assert!(run_schema(Some("nope")).is_err());
        assert!(run_schema(Some("tenant")).is_ok());
    }
}
