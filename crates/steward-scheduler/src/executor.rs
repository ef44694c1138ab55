//! Task executor: spacing guard, dispatch with retry, one record per firing.
//!
//! Chat sends inside one plan are paced by the message spacing so the
//! gateway limiter does not drop every target after the first. A send the
//! limiter still refuses is dropped, not retried, and marks the record failed.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Local;

use steward_core::catalog::TaskCatalog;
use steward_core::config::SafetyConfig;
use steward_core::error::{Result, StewardError};
use steward_core::task::ScheduledTask;
use steward_gateway::{Gateway, SendOutcome};

use crate::dispatch::{self, PlannedAction};
use crate::records::{ExecutionRecord, RecordStore};

/// Retry policy for a failed dispatch.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// What a firing did.
#[derive(Debug, Clone)]
pub enum FireOutcome {
    /// Not executed; the reason is logged.
    Skipped(String),
    Completed(ExecutionRecord),
}

pub struct TaskExecutor {
    gateway: Arc<dyn Gateway>,
    catalog: Arc<TaskCatalog>,
    records: RecordStore,
    min_interval: Duration,
    /// Gap between two chat sends of one plan. Zero when throttling is off.
    message_spacing: Duration,
    retry: RetryPolicy,
    last_execution: Mutex<Option<Instant>>,
}

impl TaskExecutor {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        catalog: Arc<TaskCatalog>,
        records: RecordStore,
        safety: &SafetyConfig,
    ) -> Self {
        Self {
            gateway,
            catalog,
            records,
            min_interval: Duration::from_millis(safety.task_min_interval_ms),
            message_spacing: if safety.enable_msg_limit {
                Duration::from_millis(safety.msg_interval_ms)
            } else {
                Duration::ZERO
            },
            retry: RetryPolicy::default(),
            last_execution: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Claim the global execution slot. False inside the spacing window.
    fn try_claim(&self, now: Instant) -> bool {
        let mut last = self.last_execution.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = *last
            && now.saturating_duration_since(prev) < self.min_interval
        {
            return false;
        }
        *last = Some(now);
        true
    }

    /// Entry point for scheduler timers.
    pub async fn on_fire(&self, task_name: &str) -> Result<FireOutcome> {
        let task = self
            .catalog
            .get(task_name)
            .ok_or_else(|| StewardError::NotFound(format!("task '{task_name}'")))?;

        if !task.is_scheduled() {
            return Ok(FireOutcome::Skipped(format!(
                "task '{task_name}' is not a scheduled action"
            )));
        }

        if !self.try_claim(Instant::now()) {
            let reason = format!(
                "task '{task_name}' fired within {}ms of the previous execution",
                self.min_interval.as_millis()
            );
            tracing::warn!("⏭️ Skipped: {reason}");
            return Ok(FireOutcome::Skipped(reason));
        }

        self.execute(task).await.map(FireOutcome::Completed)
    }

    /// Run one task with retries and record the result.
    pub async fn execute(&self, task: Arc<ScheduledTask>) -> Result<ExecutionRecord> {
        tracing::info!("🔔 Task triggered: '{}' ({})", task.name, task.kind());
        let mut record = ExecutionRecord::new(&task, Local::now());
        let actions = dispatch::plan(&task);

        let mut last_error = String::new();
        for attempt in 1..=self.retry.max_attempts {
            match self.dispatch(&actions).await {
                Ok(report) => {
                    record.success = report.throttled == 0;
                    record.detail = if report.lines.is_empty() {
                        "nothing to dispatch".into()
                    } else {
                        report.lines.join("; ")
                    };
                    if attempt > 1 {
                        record.detail.push_str(&format!(" (attempt {attempt})"));
                    }
                    if report.throttled > 0 {
                        record.error = Some(format!(
                            "{} of {} send(s) dropped by the rate limiter",
                            report.throttled,
                            report.lines.len()
                        ));
                    }
                    self.persist(&record);
                    if record.success {
                        tracing::info!("✅ Task '{}' completed: {}", task.name, record.detail);
                    } else {
                        tracing::warn!("⚠️ Task '{}' partially delivered: {}", task.name, record.detail);
                    }
                    return Ok(record);
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        "⚠️ Task '{}' attempt {}/{} failed: {e}",
                        task.name,
                        attempt,
                        self.retry.max_attempts
                    );
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }

        record.success = false;
        record.detail = format!("failed after {} attempts", self.retry.max_attempts);
        record.error = Some(last_error.clone());
        self.persist(&record);
        tracing::error!("❌ Task '{}' failed: {last_error}", task.name);
        Err(StewardError::JobFailed {
            task: task.name.clone(),
            attempts: self.retry.max_attempts,
            reason: last_error,
        })
    }

    async fn dispatch(&self, actions: &[PlannedAction]) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        let mut last_chat: Option<tokio::time::Instant> = None;
        for action in actions {
            let is_chat = action.request.message_target().is_some();
            if is_chat
                && let Some(prev) = last_chat
            {
                tokio::time::sleep_until(prev + self.message_spacing).await;
            }

            let outcome = self
                .gateway
                .send(action.request.clone())
                .await
                .map_err(|e| StewardError::Dispatch(format!("{}: {e}", action.description)))?;
            match outcome {
                SendOutcome::Sent => {
                    if is_chat {
                        last_chat = Some(tokio::time::Instant::now());
                    }
                    report.lines.push(format!("{}: ok", action.description));
                }
                SendOutcome::Throttled(denied) => {
                    report.throttled += 1;
                    report
                        .lines
                        .push(format!("{}: throttled ({denied:?})", action.description));
                }
            }
        }
        Ok(report)
    }

    fn persist(&self, record: &ExecutionRecord) {
        if let Err(e) = self.records.save(record) {
            tracing::error!("❌ Failed to save execution record for '{}': {e}", record.task_name);
        }
    }
}

/// Per-attempt result of sending a plan.
#[derive(Debug, Default)]
struct DispatchReport {
    lines: Vec<String>,
    throttled: usize,
}
