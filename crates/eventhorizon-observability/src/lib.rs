use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const EVENT_TARGET: &str = "eventhorizon.obs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Cli,
}

impl ProcessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Cli => "cli",
        }
    }

    fn file_prefix(self) -> String {
        format!("eventhorizon.{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LoggingOptions {
    pub process: ProcessKind,
    /// Filter used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
    /// JSON-lines files are only written when a directory is given.
    pub logs_dir: Option<PathBuf>,
    pub retention_days: u64,
}

impl LoggingOptions {
    pub fn new(process: ProcessKind) -> Self {
        Self {
            process,
            default_filter: "warn".to_string(),
            logs_dir: None,
            retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub process: String,
    pub logs_dir: Option<String>,
    pub prefix: String,
    pub retention_days: u64,
    pub initialized_at: DateTime<Utc>,
}

/// Fixed-shape lifecycle event for streams and uploaders.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObservabilityEvent<'a> {
    pub event: &'a str,
    pub component: &'a str,
    pub tenant_id: Option<&'a str>,
    pub task_id: Option<&'a str>,
    pub turn_index: Option<u64>,
    pub status: Option<&'a str>,
    pub error_code: Option<&'a str>,
    pub detail: Option<&'a str>,
}

/// Replaces a secret with its length and a short fingerprint.
pub fn redact_text(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!("[redacted len={} fp={}]", trimmed.len(), short_hash(trimmed))
}

/// Redacts the credential of an `Authorization`-style value, keeping its scheme.
pub fn redact_authorization(value: &str) -> String {
    match value.trim().split_once(' ') {
        Some((scheme, credential)) if !credential.trim().is_empty() => {
            format!("{scheme} {}", redact_text(credential))
        }
        _ => redact_text(value),
    }
}

pub fn short_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

pub fn emit_event(level: Level, process: ProcessKind, event: ObservabilityEvent<'_>) {
    let turn_index = event.turn_index.map(|index| index as i64).unwrap_or(-1);
    match level {
        Level::ERROR => tracing::error!(
            target: EVENT_TARGET,
            process = process.as_str(),
            component = event.component,
            event = event.event,
            tenant_id = event.tenant_id.unwrap_or(""),
            task_id = event.task_id.unwrap_or(""),
            turn_index,
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "observability_event"
        ),
        Level::WARN => tracing::warn!(
            target: EVENT_TARGET,
            process = process.as_str(),
            component = event.component,
            event = event.event,
            tenant_id = event.tenant_id.unwrap_or(""),
            task_id = event.task_id.unwrap_or(""),
            turn_index,
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "observability_event"
        ),
        Level::INFO => tracing::info!(
            target: EVENT_TARGET,
            process = process.as_str(),
            component = event.component,
            event = event.event,
            tenant_id = event.tenant_id.unwrap_or(""),
            task_id = event.task_id.unwrap_or(""),
            turn_index,
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "observability_event"
        ),
        _ => tracing::debug!(
            target: EVENT_TARGET,
            process = process.as_str(),
            component = event.component,
            event = event.event,
            tenant_id = event.tenant_id.unwrap_or(""),
            task_id = event.task_id.unwrap_or(""),
            turn_index,
            status = event.status.unwrap_or(""),
            error_code = event.error_code.unwrap_or(""),
            detail = event.detail.unwrap_or(""),
            "observability_event"
        ),
    }
}

/// Installs the global subscriber: compact console output on stderr plus,
/// when `logs_dir` is set, a daily-rotated JSON-lines file.
///
/// The returned guard must be held until exit or buffered file output is lost.
pub fn init_process_logging(
    options: &LoggingOptions,
) -> anyhow::Result<(Option<WorkerGuard>, LoggingInitInfo)> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_writer(std::io::stderr)
        .boxed();

    let prefix = options.process.file_prefix();
    let (file_layer, guard) = match options.logs_dir.as_deref() {
        Some(logs_dir) => {
            fs::create_dir_all(logs_dir)?;
            cleanup_old_jsonl(logs_dir, &prefix, options.retention_days)?;

            let file_appender = tracing_appender::rolling::Builder::new()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix(&prefix)
                .filename_suffix("jsonl")
                .build(logs_dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_current_span(false)
                .with_span_list(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    let info = LoggingInitInfo {
        process: options.process.as_str().to_string(),
        logs_dir: options
            .logs_dir
            .as_ref()
            .map(|dir| dir.display().to_string()),
        prefix,
        retention_days: options.retention_days,
        initialized_at: Utc::now(),
    };

    Ok((guard, info))
}

fn cleanup_old_jsonl(logs_dir: &Path, prefix: &str, retention_days: u64) -> anyhow::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
    let prefix = format!("{prefix}.");

    for entry in fs::read_dir(logs_dir)? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date_part) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".jsonl"))
        else {
            continue;
        };

        // eventhorizon.<proc>.YYYY-MM-DD.jsonl
        let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };
        let Some(dt) = date.and_hms_opt(0, 0, 0) else {
            continue;
        };

        if DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc) < cutoff {
            let _ = fs::remove_file(path);
        }
    }

    Ok(())
}
