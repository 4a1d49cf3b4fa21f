//! Notification dispatcher: fixed worker pool over a consumer group.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use airalert_core::config::NotificationConfig;
use airalert_core::error::Result;
use airalert_core::traits::{NotificationStream, PushTransport, UserStore};
use airalert_core::types::NotificationMessage;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::text::notification_text;

/// A stop request; the worker answers on the enclosed channel.
type StopSignal = oneshot::Sender<()>;

/// Delivery counters, shared by all workers.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub delivered: AtomicUsize,
    pub failed: AtomicUsize,
    pub skipped: AtomicUsize,
}

impl DispatchStats {
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Everything a worker needs, cloned into each one.
#[derive(Clone)]
struct Worker {
    consumer: String,
    group: String,
    block: Duration,
    stream: Arc<dyn NotificationStream>,
    users: Arc<dyn UserStore>,
    push: Arc<dyn PushTransport>,
    stop: Arc<Mutex<mpsc::UnboundedReceiver<StopSignal>>>,
    stats: Arc<DispatchStats>,
}

/// Fixed-size pool of stream consumers that deliver web push messages.
pub struct NotificationDispatcher {
    threads: usize,
    group: String,
    block: Duration,
    stream: Arc<dyn NotificationStream>,
    users: Arc<dyn UserStore>,
    push: Arc<dyn PushTransport>,
    stop_tx: mpsc::UnboundedSender<StopSignal>,
    stop_rx: Arc<Mutex<mpsc::UnboundedReceiver<StopSignal>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<DispatchStats>,
}

impl NotificationDispatcher {
    pub fn new(
        config: &NotificationConfig,
        stream: Arc<dyn NotificationStream>,
        users: Arc<dyn UserStore>,
        push: Arc<dyn PushTransport>,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        Self {
            threads: config.threads,
            group: config.group.clone(),
            block: Duration::from_millis(config.block_ms),
            stream,
            users,
            push,
            stop_tx,
            stop_rx: Arc::new(Mutex::new(stop_rx)),
            workers: Mutex::new(Vec::new()),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Number of running workers.
    pub fn worker_count(&self) -> usize {
        self.workers.lock().map_or(0, |w| w.len())
    }

    /// Create the consumer group and start the workers.
    pub async fn run(&self) -> Result<()> {
        self.stream.ensure_consumer_group(&self.group).await?;

        let mut workers = match self.workers.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !workers.is_empty() {
            tracing::warn!("⚠️ Dispatcher already running");
            return Ok(());
        }

        for _ in 0..self.threads {
            let worker = Worker {
                consumer: consumer_name(),
                group: self.group.clone(),
                block: self.block,
                stream: self.stream.clone(),
                users: self.users.clone(),
                push: self.push.clone(),
                stop: self.stop_rx.clone(),
                stats: self.stats.clone(),
            };
            workers.push(tokio::spawn(worker.run()));
        }
        tracing::info!(
            "📣 Notification dispatcher started ({} workers, group '{}')",
            workers.len(),
            self.group
        );
        Ok(())
    }

    /// Stop every worker and wait until each has acknowledged.
    ///
    /// Workers finish the delivery they are in before answering. A worker
    /// that has died never answers; waiting on the worker tasks themselves
    /// bounds the wait. Returns the number of acknowledgements received.
    pub async fn shutdown(&self) -> usize {
        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut w) => w.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };

        let mut acks = Vec::with_capacity(handles.len());
        for _ in handles.iter().filter(|h| !h.is_finished()) {
            let (ack_tx, ack_rx) = oneshot::channel();
            if self.stop_tx.send(ack_tx).is_err() {
                break;
            }
            acks.push(ack_rx);
        }

        // Live workers answer before they exit.
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!("⚠️ Dispatcher worker ended abnormally: {e}");
            }
        }
        let acknowledged = acks.iter_mut().filter_map(|ack| ack.try_recv().ok()).count();

        // Signals meant for a dead worker must not stop a later run.
        let mut rx = match self.stop_rx.lock() {
            Ok(rx) => rx,
            Err(poisoned) => poisoned.into_inner(),
        };
        while rx.try_recv().is_ok() {}

        tracing::info!("📣 Notification dispatcher stopped ({acknowledged} workers acknowledged)");
        acknowledged
    }
}

impl Worker {
    async fn run(self) {
        tracing::debug!("📣 Worker '{}' polling", self.consumer);
        loop {
            match self
                .stream
                .read_one(&self.group, &self.consumer, self.block)
                .await
            {
                Ok(Some(message)) => self.deliver(message).await,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("❌ Notification consumer read error: {e}");
                    tokio::time::sleep(self.block).await;
                }
            }

            if let Some(ack) = self.stop_requested() {
                let _ = ack.send(());
                tracing::debug!("📣 Worker '{}' stopped", self.consumer);
                return;
            }
        }
    }

    fn stop_requested(&self) -> Option<StopSignal> {
        let mut rx = match self.stop.lock() {
            Ok(rx) => rx,
            Err(poisoned) => poisoned.into_inner(),
        };
        rx.try_recv().ok()
    }

    /// Deliver one message; acknowledge only on a 2xx answer.
    async fn deliver(&self, message: NotificationMessage) {
        let user = match self.users.get_user(message.user_id).await {
            Ok(user) => user,
            Err(e) => {
                tracing::error!("❌ Could not get user {}: {e}", message.user_id);
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let text = notification_text(message.aqi, message.trend);
        match self.push.deliver_push(&user.subscription, text.as_bytes()).await {
            Ok(status) if (200..300).contains(&status) => {
                if let Err(e) = self
                    .stream
                    .acknowledge(&self.group, &message.message_id)
                    .await
                {
                    tracing::error!("❌ Could not acknowledge {}: {e}", message.message_id);
                }
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("✅ Notified user {} ({})", user.id, message.message_id);
            }
            Ok(status) => {
                tracing::error!("❌ Push service answered {status} for user {}", user.id);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("❌ Push delivery error for user {}: {e}", user.id);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Random 16-character consumer name.
fn consumer_name() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}
