//! Consume loop: fetch, handle, commit.
//!
//! One message is in flight at a time. Delivery is at-least-once:
//! - success commits the message
//! - a transient failure rewinds the fetch position and the message is
//!   delivered again, up to `max_redeliveries` times
//! - a permanent failure, or running out of redeliveries, moves the message
//!   to the dead-letter store and commits it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::handler::{HandlerError, JobHandler};
use super::retry::{retry_with_policy, RetryPolicy};
use super::traits::QueueConsumer;
use super::types::Message;
use crate::config::{ConsumerConfig, QueueConfig};
use crate::metrics;

/// Timing and redelivery settings of the consume loop.
#[derive(Debug, Clone)]
pub struct ConsumeSettings {
    /// Wait before polling an empty queue again.
    pub poll_interval: Duration,
    /// Wait after fetch retries are exhausted.
    pub fetch_error_backoff: Duration,
    /// Upper bound for one handler call.
    pub job_timeout: Duration,
    pub max_redeliveries: u32,
}

impl ConsumeSettings {
    pub fn from_config(queue: &QueueConfig, consumer: &ConsumerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(queue.poll_interval_ms),
            fetch_error_backoff: Duration::from_millis(consumer.fetch_error_backoff_ms),
            job_timeout: Duration::from_secs(consumer.job_timeout_secs),
            max_redeliveries: consumer.max_redeliveries,
        }
    }
}

impl Default for ConsumeSettings {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default(), &ConsumerConfig::default())
    }
}

/// What a single loop iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Handler succeeded; commit attempted.
    Processed { offset: i64 },
    /// Nothing to fetch.
    Idle,
    /// Fetch failed on every attempt.
    FetchFailed,
    /// Transient failure; the same message comes next.
    Redelivering { offset: i64, attempt: u32 },
    /// Message parked in the dead-letter store and committed.
    DeadLettered { offset: i64 },
    /// Dead-lettering failed; the message comes next.
    Stalled { offset: i64 },
}

/// State of the consume loop, driven one iteration at a time.
pub struct ConsumeLoop {
    consumer: Arc<dyn QueueConsumer>,
    handler: Arc<dyn JobHandler>,
    policy: RetryPolicy,
    settings: ConsumeSettings,
    /// Offset currently being redelivered and how often it was.
    redelivery: Option<(i64, u32)>,
}

impl ConsumeLoop {
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        handler: Arc<dyn JobHandler>,
        policy: RetryPolicy,
        settings: ConsumeSettings,
    ) -> Self {
        Self {
            consumer,
            handler,
            policy,
            settings,
            redelivery: None,
        }
    }

    /// Run one fetch/handle/commit iteration.
    pub async fn step(&mut self) -> Step {
        let consumer = Arc::clone(&self.consumer);
        let message = match retry_with_policy(&self.policy, "fetch", || consumer.fetch()).await {
            Ok(Some(message)) => message,
            Ok(None) => return Step::Idle,
            Err(e) => {
                metrics::FETCH_FAILURES.inc();
                error!("Fetch failed after retries: {}", e);
                return Step::FetchFailed;
            }
        };

        let span = info_span!("job", offset = message.offset, key = %message.key);
        self.handle_message(message).instrument(span).await
    }

    /// How long to wait before the next iteration.
    pub fn wait_after(&self, step: &Step) -> Option<Duration> {
        match step {
            Step::Processed { .. } | Step::DeadLettered { .. } => None,
            Step::Idle => Some(self.settings.poll_interval),
            Step::FetchFailed | Step::Stalled { .. } => Some(self.settings.fetch_error_backoff),
            Step::Redelivering { attempt, .. } => Some(self.policy.delay_after(*attempt)),
        }
    }

    async fn handle_message(&mut self, message: Message) -> Step {
        let start = Instant::now();
        let result = match tokio::time::timeout(
            self.settings.job_timeout,
            self.handler.handle(&message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(HandlerError::Transient(format!(
                "timed out after {}s",
                self.settings.job_timeout.as_secs()
            ))),
        };
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(()) => {
                metrics::JOBS_PROCESSED.with_label_values(&["success"]).inc();
                metrics::JOB_DURATION
                    .with_label_values(&["success"])
                    .observe(elapsed);
                self.redelivery = None;
                self.commit(&message).await;
                debug!("Job done");
                Step::Processed {
                    offset: message.offset,
                }
            }
            Err(HandlerError::Transient(reason)) => {
                metrics::JOBS_PROCESSED
                    .with_label_values(&["transient"])
                    .inc();
                metrics::JOB_DURATION
                    .with_label_values(&["transient"])
                    .observe(elapsed);

                let attempt = match self.redelivery {
                    Some((offset, n)) if offset == message.offset => n + 1,
                    _ => 1,
                };

                if attempt <= self.settings.max_redeliveries {
                    warn!(attempt, "Job failed, will redeliver: {}", reason);
                    self.redelivery = Some((message.offset, attempt));
                    self.consumer.seek(message.offset);
                    metrics::REDELIVERIES.inc();
                    Step::Redelivering {
                        offset: message.offset,
                        attempt,
                    }
                } else {
                    self.redelivery = None;
                    let reason = format!(
                        "gave up after {} redeliveries: {}",
                        self.settings.max_redeliveries, reason
                    );
                    self.give_up(&message, &reason).await
                }
            }
            Err(HandlerError::Permanent(reason)) => {
                metrics::JOBS_PROCESSED
                    .with_label_values(&["permanent"])
                    .inc();
                metrics::JOB_DURATION
                    .with_label_values(&["permanent"])
                    .observe(elapsed);
                self.redelivery = None;
                self.give_up(&message, &reason).await
            }
        }
    }

    async fn commit(&self, message: &Message) {
        let consumer = &self.consumer;
        if let Err(e) = retry_with_policy(&self.policy, "commit", || consumer.commit(message)).await
        {
            // The message may be redelivered after a restart; processing is idempotent.
            error!("Commit failed after retries: {}", e);
        }
    }

    async fn give_up(&self, message: &Message, reason: &str) -> Step {
        let consumer = &self.consumer;
        match retry_with_policy(&self.policy, "dead_letter", || {
            consumer.dead_letter(message, reason)
        })
        .await
        {
            Ok(()) => {
                metrics::DEAD_LETTERS.inc();
                warn!("Dead-lettered job: {}", reason);
                self.commit(message).await;
                Step::DeadLettered {
                    offset: message.offset,
                }
            }
            Err(e) => {
                error!("Dead-lettering failed, keeping message: {}", e);
                self.consumer.seek(message.offset);
                Step::Stalled {
                    offset: message.offset,
                }
            }
        }
    }
}

/// Background task running the consume loop until stopped.
pub struct JobConsumer {
    consumer: Arc<dyn QueueConsumer>,
    handler: Arc<dyn JobHandler>,
    policy: RetryPolicy,
    settings: ConsumeSettings,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JobConsumer {
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        handler: Arc<dyn JobHandler>,
        policy: RetryPolicy,
        settings: ConsumeSettings,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            consumer,
            handler,
            policy,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the consume loop on its own task.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Job consumer already running");
            return;
        }

        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut consume = ConsumeLoop::new(
            Arc::clone(&self.consumer),
            Arc::clone(&self.handler),
            self.policy.clone(),
            self.settings.clone(),
        );

        let handle = tokio::spawn(async move {
            info!("Consume loop started");
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let step = consume.step().await;

                if let Some(wait) = consume.wait_after(&step) {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!("Consume loop received shutdown signal");
                            break;
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
            info!("Consume loop stopped");
        });

        *self.task.lock().unwrap() = Some(handle);
    }

    /// Stop the loop and wait for the in-flight iteration to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Job consumer not running");
            return;
        }

        info!("Stopping job consumer");
        let _ = self.shutdown_tx.send(());

        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Consume loop task failed: {}", e);
            }
        }
    }
}
