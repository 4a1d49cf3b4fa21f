//! Scheduler engine: startup pass plus the recurring clock.
//! Each registered task gets its own tokio loop that sleeps until the task is
//! due, then fires a bounded run without waiting for it.

use std::collections::BTreeMap;
use std::time::Duration;

use airalert_core::error::{AirAlertError, Result};
use chrono::Utc;
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::daily;
use crate::tasks::{Schedule, Task};

/// A registered task with its resolved schedule.
#[derive(Debug, Clone)]
struct ScheduledTask {
    task: Task,
    schedule: Schedule,
}

/// The task scheduler: owns the registry and the recurring clock.
pub struct TaskScheduler {
    tz: Tz,
    /// Priority → tasks in registration order.
    registry: BTreeMap<u32, Vec<ScheduledTask>>,
    clock: CancellationToken,
    loops: Vec<JoinHandle<()>>,
}

impl TaskScheduler {
    /// Create a scheduler that evaluates daily tasks in the IANA zone `tz_name`.
    pub fn new(tz_name: &str) -> Result<Self> {
        let tz: Tz = tz_name
            .parse()
            .map_err(|_| AirAlertError::Config(format!("'{tz_name}' is not a valid IANA timezone")))?;
        Ok(Self {
            tz,
            registry: BTreeMap::new(),
            clock: CancellationToken::new(),
            loops: Vec::new(),
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Register a task. The registry is left untouched when the task's
    /// schedule cannot be mapped onto the clock.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        let schedule = task
            .task_type
            .schedule()
            .map_err(|reason| AirAlertError::UnsupportedTaskKind {
                task: task.name.clone(),
                reason,
            })?;

        tracing::info!(
            "📅 Task added: '{}' (priority {}, ttl {:?})",
            task.name,
            task.priority,
            task.ttl
        );
        self.registry
            .entry(task.priority)
            .or_default()
            .push(ScheduledTask { task, schedule });
        Ok(())
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.registry.values().map(Vec::len).sum()
    }

    /// Names of the tasks the startup pass would run, in execution order.
    pub fn startup_order(&self) -> Vec<String> {
        self.ordered()
            .filter(|t| !t.skip_on_startup)
            .map(|t| t.name.clone())
            .collect()
    }

    fn ordered(&self) -> impl Iterator<Item = &Task> {
        self.registry.values().flatten().map(|s| &s.task)
    }

    /// Run the startup pass, then start the recurring clock.
    pub async fn start(&mut self) -> Result<()> {
        self.run_all_in_priority_order().await?;
        self.start_recurring();
        Ok(())
    }

    /// Run every task not marked `skip_on_startup` once, lowest priority
    /// value first. Stops at the first failure.
    pub async fn run_all_in_priority_order(&self) -> Result<()> {
        for task in self.ordered().filter(|t| !t.skip_on_startup) {
            tracing::debug!("▶️ Startup run: '{}'", task.name);
            wrap_timeout(task, true)
                .await
                .map_err(|e| AirAlertError::StartupTaskFailed {
                    task: task.name.clone(),
                    source: Box::new(e),
                })?;
        }
        Ok(())
    }

    /// Start only the recurring clock.
    pub fn start_recurring(&mut self) {
        if !self.loops.is_empty() {
            tracing::warn!("⚠️ Scheduler clock already running");
            return;
        }
        if self.clock.is_cancelled() {
            self.clock = CancellationToken::new();
        }

        let tz = self.tz;
        let scheduled: Vec<ScheduledTask> = self.registry.values().flatten().cloned().collect();
        for entry in scheduled {
            let clock = self.clock.clone();
            self.loops
                .push(tokio::spawn(clock_loop(entry, tz, clock)));
        }
        tracing::info!(
            "⏰ Scheduler started ({} tasks, tz {})",
            self.loops.len(),
            self.tz
        );
    }

    /// Halt the recurring clock. Runs already in flight are left to finish.
    pub async fn stop(&mut self) {
        self.clock.cancel();
        for handle in self.loops.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!("⚠️ Scheduler loop ended abnormally: {e}");
            }
        }
        tracing::info!("⏹️ Scheduler stopped");
    }
}

/// Fire `entry` each time it comes due until `clock` is cancelled.
async fn clock_loop(entry: ScheduledTask, tz: Tz, clock: CancellationToken) {
    let ScheduledTask { task, schedule } = entry;
    match schedule {
        Schedule::Every(period) => {
            let Some(first) = Instant::now().checked_add(period) else {
                tracing::error!("❌ Interval of '{}' is out of range", task.name);
                return;
            };
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = clock.cancelled() => break,
                    _ = interval.tick() => fire(&task),
                }
            }
        }
        Schedule::DailyAt(time) => loop {
            let now = Utc::now();
            let Some(next) = daily::next_daily_run(time, tz, now) else {
                tracing::error!("❌ No next run for '{}' at {time}", task.name);
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!("🕒 '{}' next run at {next}", task.name);
            tokio::select! {
                _ = clock.cancelled() => break,
                _ = tokio::time::sleep(wait) => fire(&task),
            }
        },
    }
}

/// Spawn one bounded run. Overlapping runs of the same task are allowed.
fn fire(task: &Task) {
    tracing::info!("🔔 Task triggered: '{}'", task.name);
    let task = task.clone();
    tokio::spawn(async move {
        // wrap_timeout already logged any failure.
        let _ = wrap_timeout(&task, false).await;
    });
}

/// Run `task` once, bounded by its TTL.
///
/// The action runs on its own tokio task. If the deadline passes first the
/// action's token is cancelled and `Timeout` is returned immediately; an
/// action that ignores its token keeps running until it finishes on its own.
pub async fn wrap_timeout(task: &Task, silent: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(task.run(cancel.clone()));

    let result = match tokio::time::timeout(task.ttl, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(AirAlertError::Other(format!(
            "task '{}' aborted: {join_err}",
            task.name
        ))),
        Err(_) => {
            cancel.cancel();
            Err(AirAlertError::Timeout {
                task: task.name.clone(),
                ttl: task.ttl,
            })
        }
    };

    if let Err(e) = &result
        && !silent
    {
        tracing::error!("❌ Task '{}' failed: {e}", task.name);
    }
    result
}
