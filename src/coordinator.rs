//! Exchange coordination: one window, at most one in-flight exchange.
//!
//! Synchronous delivery runs the transport call and ingestion on the
//! calling path. Background delivery spawns one named worker thread per
//! exchange and hands the finished outcome back over a single-slot
//! channel, which the foreground polls with coarse sleeps against a wait
//! bound. Because an exchange only starts once the in-flight marker is
//! clear, results are always consumed in submission order.
//!
//! On timeout the coordinator signals the exchange's cancellation token so
//! a blocked transport call does not outlive the abandoned exchange; the
//! timeout itself remains fatal only for the current exchange.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use completion_provider::{
    CancelSignal, CompletionProvider, ExchangeId, ProviderError, RequestDescriptor,
};
use conversation::ConversationWindow;
use stream_ingest::{CapturePlan, IngestError, RenderSink, StreamIngestor, StructuredResult};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How `completion` schedules the transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Block the calling path until the exchange finishes.
    Synchronous,
    /// Run the exchange on a worker thread and poll for the handoff.
    Background,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub delivery: DeliveryMode,
    pub capture: CapturePlan,
    pub max_attempts: u32,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl CoordinatorConfig {
    #[must_use]
    pub fn new(delivery: DeliveryMode, capture: CapturePlan) -> Self {
        Self {
            delivery,
            capture,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Failure of one exchange. Every variant is scoped to the exchange; the
/// window and the process stay usable for subsequent turns.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport failed after {attempts} attempt(s): {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("exchange was cancelled")]
    Cancelled,

    #[error(transparent)]
    MalformedStream(#[from] IngestError),

    #[error("no result within {}s; the pending call was signalled to stop", waited.as_secs())]
    Timeout { waited: Duration },

    #[error("exchange worker could not be started: {0}")]
    WorkerSpawn(String),

    #[error("exchange worker exited without delivering a result")]
    WorkerLost,
}

/// Everything a completed exchange delivered to the foreground.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOutcome {
    pub exchange_id: ExchangeId,
    pub extracted: String,
    pub result: Option<StructuredResult>,
    pub attempts: u32,
}

/// Attempt accounting for one exchange; discarded after success or
/// exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts_made: u32,
    max_attempts: u32,
}

impl RetryState {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts_made: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn record_failure(&mut self) {
        self.attempts_made += 1;
    }

    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }

    #[must_use]
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }
}

type ExchangeResult = Result<ExchangeOutcome, ExchangeError>;

pub struct ExchangeCoordinator {
    provider: Arc<dyn CompletionProvider>,
    config: CoordinatorConfig,
    in_flight: Arc<AtomicBool>,
    next_exchange_id: AtomicU64,
}

impl ExchangeCoordinator {
    #[must_use]
    pub fn new(provider: Arc<dyn CompletionProvider>, config: CoordinatorConfig) -> Self {
        Self {
            provider,
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
            next_exchange_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs one full exchange and, on success, commits it to the window.
    ///
    /// This is the sole mutation point of the window: the entire assembled
    /// result is applied in one step on the calling path, never
    /// incrementally, so no reader observes a half-updated window.
    pub fn completion(
        &self,
        window: &mut ConversationWindow,
        request: &RequestDescriptor,
        user_input: &str,
        sink: Box<dyn RenderSink + Send>,
    ) -> ExchangeResult {
        match self.config.delivery {
            DeliveryMode::Synchronous => self.completion_sync(window, request, user_input, sink),
            DeliveryMode::Background => {
                self.completion_background(window, request, user_input, sink)
            }
        }
    }

    fn completion_sync(
        &self,
        window: &mut ConversationWindow,
        request: &RequestDescriptor,
        user_input: &str,
        mut sink: Box<dyn RenderSink + Send>,
    ) -> ExchangeResult {
        let exchange_id = self.next_exchange_id.fetch_add(1, Ordering::SeqCst);
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));

        let outcome = run_attempts(
            self.provider.as_ref(),
            request,
            &self.config.capture,
            cancel,
            self.config.max_attempts,
            exchange_id,
            Some(sink.as_mut()),
        )?;

        window.commit_exchange(user_input, &outcome.extracted, outcome.result.as_ref());
        Ok(outcome)
    }

    fn completion_background(
        &self,
        window: &mut ConversationWindow,
        request: &RequestDescriptor,
        user_input: &str,
        mut sink: Box<dyn RenderSink + Send>,
    ) -> ExchangeResult {
        self.wait_until_idle()?;

        let exchange_id = self.next_exchange_id.fetch_add(1, Ordering::SeqCst);
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let (result_tx, result_rx) = mpsc::sync_channel::<ExchangeResult>(1);

        self.in_flight.store(true, Ordering::Release);
        let spawned = thread::Builder::new()
            .name(format!("chat-exchange-{exchange_id}"))
            .spawn({
                let provider = Arc::clone(&self.provider);
                let request = request.clone();
                let capture = self.config.capture.clone();
                let cancel = Arc::clone(&cancel);
                let in_flight = Arc::clone(&self.in_flight);
                let max_attempts = self.config.max_attempts;
                move || {
                    let outcome = run_attempts(
                        provider.as_ref(),
                        &request,
                        &capture,
                        cancel,
                        max_attempts,
                        exchange_id,
                        Some(sink.as_mut()),
                    );
                    let _ = result_tx.send(outcome);
                    in_flight.store(false, Ordering::Release);
                }
            });

        let worker = match spawned {
            Ok(worker) => worker,
            Err(error) => {
                self.in_flight.store(false, Ordering::Release);
                return Err(ExchangeError::WorkerSpawn(error.to_string()));
            }
        };

        let started = Instant::now();
        loop {
            match result_rx.try_recv() {
                Ok(outcome) => {
                    let _ = worker.join();
                    let outcome = outcome?;
                    window.commit_exchange(
                        user_input,
                        &outcome.extracted,
                        outcome.result.as_ref(),
                    );
                    return Ok(outcome);
                }
                Err(TryRecvError::Empty) => {
                    let waited = started.elapsed();
                    if waited >= self.config.wait_timeout {
                        cancel.store(true, Ordering::Release);
                        warn!(exchange_id, "exchange timed out; cancellation signalled");
                        return Err(ExchangeError::Timeout { waited });
                    }
                    thread::sleep(self.config.poll_interval);
                }
                Err(TryRecvError::Disconnected) => {
                    let _ = worker.join();
                    return Err(ExchangeError::WorkerLost);
                }
            }
        }
    }

    /// Blocks until the previous exchange clears its in-flight marker, up
    /// to the wait bound. Enforces at most one in-flight exchange per
    /// window before any new task is created.
    fn wait_until_idle(&self) -> Result<(), ExchangeError> {
        let started = Instant::now();
        while self.in_flight.load(Ordering::Acquire) {
            let waited = started.elapsed();
            if waited >= self.config.wait_timeout {
                return Err(ExchangeError::Timeout { waited });
            }
            thread::sleep(self.config.poll_interval);
        }
        Ok(())
    }
}

fn run_attempts<'s>(
    provider: &dyn CompletionProvider,
    request: &RequestDescriptor,
    capture: &CapturePlan,
    cancel: CancelSignal,
    max_attempts: u32,
    exchange_id: ExchangeId,
    mut sink: Option<&mut (dyn RenderSink + 's)>,
) -> ExchangeResult {
    let mut retry = RetryState::new(max_attempts);

    loop {
        let mut ingestor = StreamIngestor::new(capture.clone());
        let mut sink_ref = sink.as_deref_mut();
        let ingestor_ref = &mut ingestor;
        let run = provider.run(request, Arc::clone(&cancel), &mut move |chunk| {
            ingestor_ref.feed(chunk, sink_ref.as_deref_mut());
        });

        match run {
            Ok(raw) => {
                let outcome = ingestor.finish(&raw)?;
                let attempts = retry.attempts_made() + 1;
                debug!(exchange_id, attempts, "exchange completed");
                return Ok(ExchangeOutcome {
                    exchange_id,
                    extracted: outcome.extracted,
                    result: outcome.envelope,
                    attempts,
                });
            }
            Err(ProviderError::Cancelled) => return Err(ExchangeError::Cancelled),
            Err(ProviderError::Transport { message }) => {
                retry.record_failure();
                warn!(
                    exchange_id,
                    attempt = retry.attempts_made(),
                    error = %message,
                    "transport attempt failed"
                );
                if retry.exhausted() {
                    return Err(ExchangeError::RetryExhausted {
                        attempts: retry.attempts_made(),
                        last_error: message,
                    });
                }
            }
        }
    }
}
