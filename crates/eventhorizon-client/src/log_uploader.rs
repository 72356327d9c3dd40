use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Level};

use eventhorizon_observability::{emit_event, ObservabilityEvent, ProcessKind};
use eventhorizon_types::{TurnLog, TurnRef};
use eventhorizon_wire::{
    encoded_array_len, encoded_log_len, UploadTurnLogsRequest, UploadTurnLogsResponse,
};

use crate::backoff::Backoff;
use crate::client::{Client, TurnLogSink};
use crate::error::{Error, Result};
use crate::group::WorkerGroup;

const COMPONENT: &str = "log_uploader";

pub const DEFAULT_MAX_BATCH_LEN: usize = 500;
pub const DEFAULT_MAX_BATCH_AGE: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BATCH_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct UploaderOptions {
    pub max_batch_len: usize,
    pub max_batch_age: Duration,
    /// Limit on the encoded `logs` array of one request. A single log larger
    /// than this is still sent, alone.
    pub max_batch_bytes: usize,
    /// Extra attempts for a batch that failed at the network level. Service
    /// errors and conflicts are never retried.
    pub upload_retries: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub process: ProcessKind,
}

impl Default for UploaderOptions {
    fn default() -> Self {
        Self {
            max_batch_len: DEFAULT_MAX_BATCH_LEN,
            max_batch_age: DEFAULT_MAX_BATCH_AGE,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            upload_retries: 0,
            min_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
            process: ProcessKind::Cli,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadSummary {
    pub batches: u64,
    pub uploaded: u64,
    /// Index the next log would have been given.
    pub next_index: u64,
    /// Version returned by the last successful upload.
    pub version: i64,
    /// Logs received but never uploaded because the uploader was cancelled.
    pub dropped: usize,
}

/// Background batcher that ships a channel of logs to one turn.
///
/// Logs are numbered from `start_index` in arrival order and sent in
/// contiguous batches. A batch goes out when it holds `max_batch_len` logs,
/// when the next log would push it over `max_batch_bytes`, or when its
/// oldest log has waited `max_batch_age`. Each upload carries the version
/// returned by the previous one.
pub struct LogUploader {
    group: WorkerGroup,
    worker: Option<JoinHandle<Result<UploadSummary>>>,
    version: Arc<AtomicI64>,
    next_index: Arc<AtomicU64>,
    summary: Option<UploadSummary>,
}

impl LogUploader {
    /// Spawns the worker; must be called within a tokio runtime.
    pub fn new<S>(
        sink: S,
        turn: TurnRef,
        version: i64,
        start_index: u64,
        input: mpsc::Receiver<TurnLog>,
        options: UploaderOptions,
    ) -> Self
    where
        S: TurnLogSink + 'static,
    {
        let group = WorkerGroup::new();
        let shared_version = Arc::new(AtomicI64::new(version));
        let next_index = Arc::new(AtomicU64::new(start_index));
        let worker = UploadWorker {
            backoff: Backoff::new(options.min_backoff, options.max_backoff),
            sink,
            turn,
            options,
            version,
            next_index: start_index,
            shared_version: shared_version.clone(),
            shared_next_index: next_index.clone(),
            cancel: group.token(),
            summary: UploadSummary {
                next_index: start_index,
                version,
                ..UploadSummary::default()
            },
        };
        let worker = group.spawn(worker.run(input));
        Self {
            group,
            worker: Some(worker),
            version: shared_version,
            next_index,
            summary: None,
        }
    }

    /// Continues a turn's log timeline right after the last log the server holds.
    pub async fn resume(
        client: Client,
        turn: TurnRef,
        version: i64,
        input: mpsc::Receiver<TurnLog>,
        options: UploaderOptions,
    ) -> Result<Self> {
        let start_index = client.next_log_index(&turn).await?;
        debug!(
            tenant_id = %turn.tenant_id,
            task_id = %turn.task_id,
            turn_index = turn.turn_index,
            start_index,
            "resuming turn log upload"
        );
        Ok(Self::new(client, turn, version, start_index, input, options))
    }

    /// Version the next upload will carry.
    pub fn version(&self) -> i64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn next_index(&self) -> u64 {
        self.next_index.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(true, |worker| worker.is_finished())
    }

    /// Waits until the input closes and the last batch is uploaded.
    pub async fn wait(&mut self) -> Result<UploadSummary> {
        self.group.wait().await;
        self.finish().await
    }

    /// Cancels the worker, dropping any batch not yet uploaded. Calling it
    /// again returns the same summary.
    pub async fn close(&mut self) -> Result<UploadSummary> {
        self.group.close().await;
        self.finish().await
    }

    pub async fn shutdown_timeout(&mut self, timeout: Duration) -> Result<UploadSummary> {
        self.group.cancel();
        self.group.wait_timeout(timeout).await?;
        self.finish().await
    }

    async fn finish(&mut self) -> Result<UploadSummary> {
        let Some(worker) = self.worker.take() else {
            return Ok(self.summary.unwrap_or_default());
        };
        let summary = match worker.await {
            Ok(outcome) => outcome?,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => UploadSummary::default(),
        };
        self.summary = Some(summary);
        Ok(summary)
    }
}

impl Drop for LogUploader {
    fn drop(&mut self) {
        self.group.cancel();
    }
}

/// Logs waiting to be uploaded, with their encoded size.
#[derive(Debug, Default)]
struct Batch {
    entries: Vec<TurnLog>,
    entry_lens: Vec<usize>,
    opened_at: Option<Instant>,
}

impl Batch {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the `logs` array if a log of `candidate` bytes were appended.
    fn encoded_len_with(&self, candidate: usize) -> usize {
        encoded_array_len(self.entry_lens.iter().copied().chain([candidate]))
    }

    fn push(&mut self, log: TurnLog, encoded_len: usize) {
        self.opened_at.get_or_insert_with(Instant::now);
        self.entry_lens.push(encoded_len);
        self.entries.push(log);
    }

    fn take(&mut self) -> (Vec<TurnLog>, Vec<usize>) {
        self.opened_at = None;
        (
            std::mem::take(&mut self.entries),
            std::mem::take(&mut self.entry_lens),
        )
    }

    /// Puts an unsent batch back in front of anything queued since.
    fn restore(&mut self, mut logs: Vec<TurnLog>, mut lens: Vec<usize>) {
        self.opened_at.get_or_insert_with(Instant::now);
        logs.append(&mut self.entries);
        lens.append(&mut self.entry_lens);
        self.entries = logs;
        self.entry_lens = lens;
    }
}

struct UploadWorker<S> {
    sink: S,
    turn: TurnRef,
    options: UploaderOptions,
    backoff: Backoff,
    version: i64,
    next_index: u64,
    shared_version: Arc<AtomicI64>,
    shared_next_index: Arc<AtomicU64>,
    cancel: CancellationToken,
    summary: UploadSummary,
}

impl<S: TurnLogSink> UploadWorker<S> {
    async fn run(mut self, mut input: mpsc::Receiver<TurnLog>) -> Result<UploadSummary> {
        self.emit(Level::INFO, "log_uploader.started", None);
        let mut batch = Batch::default();
        let outcome = self.pump(&mut input, &mut batch).await;
        // no sends are accepted once the worker is gone
        input.close();
        match outcome {
            Ok(()) => {
                self.emit(Level::INFO, "log_uploader.finished", None);
                Ok(self.summary)
            }
            Err(Error::Cancelled) => {
                self.summary.dropped = batch.len();
                self.emit(Level::INFO, "log_uploader.cancelled", None);
                Ok(self.summary)
            }
            Err(err) => {
                self.emit(Level::WARN, "log_uploader.failed", Some(&err));
                Err(err)
            }
        }
    }

    async fn pump(&mut self, input: &mut mpsc::Receiver<TurnLog>, batch: &mut Batch) -> Result<()> {
        let cancel = self.cancel.clone();
        loop {
            let deadline = batch
                .opened_at
                .map(|opened_at| opened_at + self.options.max_batch_age);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep_until(deadline), if deadline.is_some() => {
                    self.flush(batch).await?;
                }
                received = input.recv() => match received {
                    Some(log) => self.accept(batch, log).await?,
                    None => return self.flush(batch).await,
                },
            }
        }
    }

    async fn accept(&mut self, batch: &mut Batch, mut log: TurnLog) -> Result<()> {
        log.index = self.next_index;
        self.next_index += 1;
        self.shared_next_index
            .store(self.next_index, Ordering::SeqCst);
        self.summary.next_index = self.next_index;

        let encoded_len = encoded_log_len(&log)?;
        if !batch.is_empty()
            && (batch.len() >= self.options.max_batch_len
                || batch.encoded_len_with(encoded_len) > self.options.max_batch_bytes)
        {
            if let Err(err) = self.flush(batch).await {
                // keeps the indexed log countable as dropped
                batch.push(log, encoded_len);
                return Err(err);
            }
        }
        batch.push(log, encoded_len);
        if batch.len() >= self.options.max_batch_len {
            self.flush(batch).await?;
        }
        Ok(())
    }

    async fn flush(&mut self, batch: &mut Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let (logs, lens) = batch.take();
        let request = UploadTurnLogsRequest {
            task_id: self.turn.task_id.clone(),
            turn_index: self.turn.turn_index,
            start_index: logs[0].index,
            logs,
            version: self.version,
        };
        let response = match self.upload(&request).await {
            Ok(response) => response,
            Err(err) => {
                // still counted as dropped if this was a cancellation
                batch.restore(request.logs, lens);
                return Err(err);
            }
        };

        self.version = response.version;
        self.shared_version.store(response.version, Ordering::SeqCst);
        self.summary.version = response.version;
        self.summary.batches += 1;
        self.summary.uploaded += request.logs.len() as u64;
        debug!(
            tenant_id = %self.turn.tenant_id,
            task_id = %self.turn.task_id,
            turn_index = self.turn.turn_index,
            indices = ?request.index_range(),
            version = response.version,
            "uploaded turn logs"
        );
        Ok(())
    }

    async fn upload(&mut self, request: &UploadTurnLogsRequest) -> Result<UploadTurnLogsResponse> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => Err(Error::Cancelled),
                outcome = self.sink.upload_turn_logs(&self.turn.tenant_id, request) => outcome,
            };
            match outcome {
                Err(err) if err.is_transport() && attempt <= self.options.upload_retries => {
                    self.backoff.backoff();
                    warn!(
                        tenant_id = %self.turn.tenant_id,
                        task_id = %self.turn.task_id,
                        turn_index = self.turn.turn_index,
                        start_index = request.start_index,
                        attempt,
                        delay_ms = self.backoff.current().as_millis() as u64,
                        error = %err,
                        "turn log upload failed, retrying"
                    );
                    self.backoff.wait(&self.cancel).await?;
                }
                Ok(response) => {
                    self.backoff.recover();
                    return Ok(response);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn emit(&self, level: Level, event: &str, err: Option<&Error>) {
        let detail = err.map(|err| err.to_string());
        emit_event(
            level,
            self.options.process,
            ObservabilityEvent {
                event,
                component: COMPONENT,
                tenant_id: Some(&self.turn.tenant_id),
                task_id: Some(&self.turn.task_id),
                turn_index: Some(self.turn.turn_index),
                status: Some(if err.is_some() { "failed" } else { "ok" }),
                error_code: err.map(Error::code),
                detail: detail.as_deref(),
            },
        );
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
