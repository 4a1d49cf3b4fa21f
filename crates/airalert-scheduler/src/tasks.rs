//! Task definitions: the unit of scheduled work.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use airalert_core::error::Result;
use chrono::NaiveTime;
use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::daily;

/// Default per-run deadline.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// The work a task performs. Receives a token that is cancelled when the
/// run's deadline passes.
pub type TaskAction =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// How/when the task recurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskType {
    /// Run every N minutes.
    Interval { every_minutes: u64 },
    /// Run once a day at a local time of day (`HH:MM`).
    Daily { time_of_day: String },
}

/// A validated schedule, resolved from a [`TaskType`] at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Schedule {
    Every(Duration),
    DailyAt(NaiveTime),
}

impl TaskType {
    /// Map the variant onto a concrete schedule, or explain why it cannot be.
    pub(crate) fn schedule(&self) -> std::result::Result<Schedule, String> {
        match self {
            TaskType::Interval { every_minutes: 0 } => {
                Err("interval must be at least one minute".into())
            }
            TaskType::Interval { every_minutes } => every_minutes
                .checked_mul(60)
                .map(Duration::from_secs)
                .filter(|period| Instant::now().checked_add(*period).is_some())
                .map(Schedule::Every)
                .ok_or_else(|| format!("interval of {every_minutes} minutes is too long")),
            TaskType::Daily { time_of_day } => daily::parse_time_of_day(time_of_day)
                .map(Schedule::DailyAt)
                .ok_or_else(|| format!("'{time_of_day}' is not a valid HH:MM time of day")),
        }
    }
}

/// A scheduled task.
#[derive(Clone)]
pub struct Task {
    /// Human-readable name, used in logs and errors.
    pub name: String,
    /// Startup order; 0 runs first.
    pub priority: u32,
    /// Maximum wall-clock duration of one run.
    pub ttl: Duration,
    /// Leave this task out of the startup pass.
    pub skip_on_startup: bool,
    pub task_type: TaskType,
    action: TaskAction,
}

impl Task {
    /// Create a task with an explicit type.
    pub fn new<F, Fut>(name: &str, task_type: TaskType, action: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            priority: 0,
            ttl: DEFAULT_TTL,
            skip_on_startup: false,
            task_type,
            action: Arc::new(move |cancel| Box::pin(action(cancel))),
        }
    }

    /// Create a task that recurs every `every_minutes` minutes.
    pub fn interval<F, Fut>(name: &str, every_minutes: u64, action: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(name, TaskType::Interval { every_minutes }, action)
    }

    /// Create a task that recurs daily at `time_of_day` (`HH:MM`).
    pub fn daily<F, Fut>(name: &str, time_of_day: &str, action: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(
            name,
            TaskType::Daily {
                time_of_day: time_of_day.to_string(),
            },
            action,
        )
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn skip_on_startup(mut self) -> Self {
        self.skip_on_startup = true;
        self
    }

    /// Start one run of the action.
    pub fn run(&self, cancel: CancellationToken) -> BoxFuture<'static, Result<()>> {
        (self.action)(cancel)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("ttl", &self.ttl)
            .field("skip_on_startup", &self.skip_on_startup)
            .field("task_type", &self.task_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_cancel: CancellationToken) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_builders() {
        let task = Task::interval("refresh", 5, noop)
            .with_priority(2)
            .with_ttl(Duration::from_secs(120))
            .skip_on_startup();
        assert_eq!(task.name, "refresh");
        assert_eq!(task.priority, 2);
        assert_eq!(task.ttl, Duration::from_secs(120));
        assert!(task.skip_on_startup);
        assert_eq!(task.task_type, TaskType::Interval { every_minutes: 5 });

        let daily = Task::daily("locations", "03:30", noop);
        assert_eq!(daily.ttl, DEFAULT_TTL);
        assert_eq!(daily.priority, 0);
    }

    #[test]
    fn test_schedule_mapping() {
        assert_eq!(
            TaskType::Interval { every_minutes: 5 }.schedule(),
            Ok(Schedule::Every(Duration::from_secs(300)))
        );
        assert!(TaskType::Interval { every_minutes: 0 }.schedule().is_err());
        assert!(TaskType::Interval { every_minutes: u64::MAX }.schedule().is_err());
        assert!(TaskType::Interval { every_minutes: u64::MAX / 60 }.schedule().is_err());
        assert_eq!(
            TaskType::Daily { time_of_day: "03:30".into() }.schedule(),
            Ok(Schedule::DailyAt(NaiveTime::from_hms_opt(3, 30, 0).unwrap()))
        );
        assert!(TaskType::Daily { time_of_day: "3h30".into() }.schedule().is_err());
    }

    #[tokio::test]
    async fn test_run_invokes_action() {
        let task = Task::interval("fails", 1, |_cancel| async {
            Err(airalert_core::AirAlertError::Other("boom".into()))
        });
        let result = task.run(CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
