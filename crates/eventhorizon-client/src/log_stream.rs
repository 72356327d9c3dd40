use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};

use eventhorizon_observability::{emit_event, ObservabilityEvent, ProcessKind};
use eventhorizon_types::{TurnLog, TurnRef};

use crate::backoff::Backoff;
use crate::client::Client;
use crate::config::RequestOptions;
use crate::error::{Error, Result};
use crate::group::WorkerGroup;
use crate::sse::SseReader;

const COMPONENT: &str = "log_stream";

#[derive(Debug, Clone)]
pub struct LogStreamOptions {
    /// Capacity of the channel between the worker and the consumer.
    pub buffer: usize,
    pub include_deleted: bool,
    /// Layered over the client's defaults for the stream request.
    pub request: RequestOptions,
    /// Resume point sent as `Last-Event-ID`; `0` starts from the beginning.
    pub last_id: i64,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    /// Drop logs whose index is not above the highest one already delivered.
    pub skip_replayed: bool,
    pub process: ProcessKind,
}

impl Default for LogStreamOptions {
    fn default() -> Self {
        Self {
            buffer: 64,
            include_deleted: false,
            request: RequestOptions::default(),
            last_id: 0,
            min_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(30),
            skip_replayed: false,
            process: ProcessKind::Cli,
        }
    }
}

/// Live, resumable view of one turn's logs.
///
/// A background worker keeps an SSE connection open, reconnecting with
/// backoff after network failures and resuming after the last event id it
/// saw. The sequence ends when the server has nothing more to send, when a
/// non-network error occurs, or when the stream is closed.
pub struct LogStream {
    logs: mpsc::Receiver<TurnLog>,
    group: WorkerGroup,
    worker: Option<JoinHandle<Result<()>>>,
    last_id: Arc<AtomicI64>,
}

impl LogStream {
    /// Spawns the worker; must be called within a tokio runtime.
    pub fn new(client: Client, turn: TurnRef, options: LogStreamOptions) -> Self {
        let (tx, logs) = mpsc::channel(options.buffer.max(1));
        let group = WorkerGroup::new();
        let last_id = Arc::new(AtomicI64::new(options.last_id));
        let worker = StreamWorker {
            client,
            turn,
            options,
            last_id: last_id.clone(),
            tx,
            cancel: group.token(),
        };
        let worker = group.spawn(worker.run());
        Self {
            logs,
            group,
            worker: Some(worker),
            last_id,
        }
    }

    /// Next log in delivery order; `None` once the stream has terminated.
    pub async fn recv(&mut self) -> Option<TurnLog> {
        self.logs.recv().await
    }

    pub fn logs(&mut self) -> impl Stream<Item = TurnLog> + '_ {
        futures::stream::poll_fn(move |cx| self.logs.poll_recv(cx))
    }

    /// Last event id seen; the next reconnect resumes after it.
    pub fn last_id(&self) -> i64 {
        self.last_id.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(true, |worker| worker.is_finished())
    }

    /// Cancels the worker and waits for it to exit. Returns the error that
    /// ended the stream, if any. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        self.group.close().await;
        self.finish().await
    }

    /// Cancels the worker and waits at most `timeout` for it to exit.
    pub async fn shutdown_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.group.cancel();
        self.group.wait_timeout(timeout).await?;
        self.finish().await
    }

    /// Cancels the worker and waits until it exits or `deadline` fires.
    pub async fn shutdown_until(&mut self, deadline: &CancellationToken) -> Result<()> {
        self.group.cancel();
        self.group.wait_until(deadline).await?;
        self.finish().await
    }

    async fn finish(&mut self) -> Result<()> {
        self.logs.close();
        match self.worker.take() {
            Some(worker) => match worker.await {
                Ok(outcome) => outcome,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => Ok(()),
            },
            None => Ok(()),
        }
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.group.cancel();
    }
}

struct StreamWorker {
    client: Client,
    turn: TurnRef,
    options: LogStreamOptions,
    last_id: Arc<AtomicI64>,
    tx: mpsc::Sender<TurnLog>,
    cancel: CancellationToken,
}

impl StreamWorker {
    async fn run(self) -> Result<()> {
        self.emit(Level::INFO, "log_stream.started", None);
        let outcome = match self.stream().await {
            Err(Error::Cancelled) => Ok(()),
            other => other,
        };
        match &outcome {
            Ok(()) => self.emit(Level::INFO, "log_stream.finished", None),
            Err(err) => self.emit(Level::WARN, "log_stream.failed", Some(err)),
        }
        outcome
    }

    async fn stream(&self) -> Result<()> {
        let mut backoff = Backoff::new(self.options.min_backoff, self.options.max_backoff);
        let mut retry_hint = Duration::ZERO;
        let mut delivered = None;
        loop {
            backoff.wait_at_least(&self.cancel, retry_hint).await?;

            let last_id = self.last_id.load(Ordering::SeqCst);
            let opened = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                opened = self.client.open_log_stream(
                    &self.turn,
                    last_id,
                    self.options.include_deleted,
                    &self.options.request,
                ) => opened,
            };
            let response = match opened {
                Ok(Some(response)) => response,
                Ok(None) => {
                    info!(
                        tenant_id = %self.turn.tenant_id,
                        task_id = %self.turn.task_id,
                        turn_index = self.turn.turn_index,
                        last_id,
                        "turn log stream ended"
                    );
                    return Ok(());
                }
                Err(err) if err.is_transport() => {
                    backoff.backoff();
                    self.warn_reconnect(&err, &backoff);
                    continue;
                }
                Err(err) => return Err(err),
            };

            let mut reader = SseReader::new(Box::pin(response.bytes_stream()));
            match self
                .consume(&mut reader, &mut retry_hint, &mut delivered)
                .await
            {
                Ok(()) => backoff.recover(),
                Err(_) if self.cancel.is_cancelled() => return Err(Error::Cancelled),
                Err(err) if err.is_transport() => {
                    backoff.backoff();
                    self.warn_reconnect(&err, &backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Forwards events of one connection until it ends cleanly.
    async fn consume<S, B>(
        &self,
        reader: &mut SseReader<S>,
        retry_hint: &mut Duration,
        delivered: &mut Option<u64>,
    ) -> Result<()>
    where
        S: Stream<Item = reqwest::Result<B>> + Unpin,
        B: AsRef<[u8]>,
    {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                next = reader.next_log() => next?,
            };
            let Some(event) = next else {
                return Ok(());
            };

            let index = event.log.index;
            let replayed = self.options.skip_replayed
                && delivered.is_some_and(|highest| index != 0 && index <= highest);
            if replayed {
                debug!(index, "skipping replayed turn log");
            } else {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                    sent = self.tx.send(event.log) => {
                        if sent.is_err() {
                            // consumer dropped the stream
                            return Err(Error::Cancelled);
                        }
                    }
                }
                if index != 0 {
                    *delivered = Some(delivered.map_or(index, |highest| highest.max(index)));
                }
            }

            if let Some(id) = event.id {
                self.last_id.store(id, Ordering::SeqCst);
            }
            if let Some(retry) = event.retry {
                *retry_hint = retry;
            }
        }
    }

    fn warn_reconnect(&self, err: &Error, backoff: &Backoff) {
        warn!(
            tenant_id = %self.turn.tenant_id,
            task_id = %self.turn.task_id,
            turn_index = self.turn.turn_index,
            last_id = self.last_id.load(Ordering::SeqCst),
            delay_ms = backoff.current().as_millis() as u64,
            error = %err,
            "turn log stream interrupted, reconnecting"
        );
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
