//! In-memory notification stream with consumer groups.
//!
//! Mirrors the subset of stream semantics the dispatcher relies on:
//! - entries get monotonically increasing `<millis>-<seq>` IDs
//! - each group has its own cursor and a pending list of delivered,
//!   unacknowledged entries
//! - a pending entry idle for longer than `redelivery_after` is claimed by
//!   the next reader of the group
//! - acknowledging removes the entry from the pending list; repeated
//!   acknowledgements are no-ops

use std::collections::HashMap;
use std::time::Duration;

use airalert_core::error::{AirAlertError, Result};
use airalert_core::traits::NotificationStream;
use airalert_core::types::{NotificationMessage, StreamEntry};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Pending {
    consumer: String,
    delivered_at: Instant,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct Group {
    /// Index of the next never-delivered entry.
    cursor: usize,
    pending: HashMap<String, Pending>,
    acked: usize,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: Vec<(String, StreamEntry)>,
    groups: HashMap<String, Group>,
    last_millis: i64,
    seq: u64,
}

impl StreamState {
    fn next_id(&mut self) -> String {
        let millis = Utc::now().timestamp_millis().max(self.last_millis);
        if millis == self.last_millis {
            self.seq += 1;
        } else {
            self.last_millis = millis;
            self.seq = 0;
        }
        format!("{}-{}", self.last_millis, self.seq)
    }

    fn group_mut(&mut self, name: &str) -> Result<&mut Group> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| AirAlertError::Store(format!("NOGROUP no consumer group '{name}'")))
    }
}

/// Durable-queue stand-in shared by the forecast job and the dispatcher.
pub struct MemoryNotificationStream {
    redelivery_after: Duration,
    state: Mutex<StreamState>,
    appended: Notify,
}

impl MemoryNotificationStream {
    /// `redelivery_after` is the idle time after which a pending entry may be
    /// claimed by another reader.
    pub fn new(redelivery_after: Duration) -> Self {
        Self {
            redelivery_after,
            state: Mutex::new(StreamState::default()),
            appended: Notify::new(),
        }
    }

    /// Total entries ever appended.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Delivered but unacknowledged entries of a group.
    pub async fn pending_count(&self, group: &str) -> usize {
        self.state
            .lock()
            .await
            .groups
            .get(group)
            .map_or(0, |g| g.pending.len())
    }

    /// Entries acknowledged by a group.
    pub async fn acked_count(&self, group: &str) -> usize {
        self.state.lock().await.groups.get(group).map_or(0, |g| g.acked)
    }

    /// Claim an idle pending entry or deliver the next new one.
    async fn try_read(&self, group: &str, consumer: &str) -> Result<Option<NotificationMessage>> {
        let mut state = self.state.lock().await;
        let redelivery_after = self.redelivery_after;
        let StreamState { entries, groups, .. } = &mut *state;
        let g = groups
            .get_mut(group)
            .ok_or_else(|| AirAlertError::Store(format!("NOGROUP no consumer group '{group}'")))?;
        let now = Instant::now();

        let idle = g
            .pending
            .iter_mut()
            .filter(|(_, p)| now.duration_since(p.delivered_at) >= redelivery_after)
            .min_by(|a, b| a.0.cmp(b.0));
        if let Some((id, pending)) = idle
            && let Some((_, entry)) = entries.iter().find(|(eid, _)| eid == id)
        {
            tracing::debug!(
                "🔁 Redelivering {id} from '{}' to '{consumer}' (delivery {})",
                pending.consumer,
                pending.deliveries + 1
            );
            pending.consumer = consumer.to_string();
            pending.delivered_at = now;
            pending.deliveries += 1;
            return Ok(Some(NotificationMessage::new(id.clone(), *entry)));
        }

        let Some((id, entry)) = entries.get(g.cursor) else {
            return Ok(None);
        };
        g.cursor += 1;
        g.pending.insert(
            id.clone(),
            Pending {
                consumer: consumer.to_string(),
                delivered_at: now,
                deliveries: 1,
            },
        );
        Ok(Some(NotificationMessage::new(id.clone(), *entry)))
    }
}

impl Default for MemoryNotificationStream {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl NotificationStream for MemoryNotificationStream {
    async fn ensure_consumer_group(&self, group: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.groups.contains_key(group) {
            // New groups read from the start of the stream.
            state.groups.insert(group.to_string(), Group::default());
            tracing::info!("📬 Consumer group '{group}' created");
        }
        Ok(())
    }

    async fn read_one(
        &self,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<NotificationMessage>> {
        let deadline = Instant::now() + block;
        loop {
            let appended = self.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(message) = self.try_read(group, consumer).await? {
                return Ok(Some(message));
            }
            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn acknowledge(&self, group: &str, message_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let g = state.group_mut(group)?;
        if g.pending.remove(message_id).is_some() {
            g.acked += 1;
        }
        Ok(())
    }

    async fn enqueue(&self, entry: StreamEntry) -> Result<String> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.entries.push((id.clone(), entry));
        drop(state);

        self.appended.notify_waiters();
        Ok(id)
    }
}
