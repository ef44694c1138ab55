//! Scheduler engine: one tokio timer per scheduled task.
//! Each timer sleeps until the next cron fire time, then hands the task name
//! to the executor on its own task so slow executions never delay the timer.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use cron::Schedule;
use tokio::task::JoinHandle;

use steward_core::catalog::TaskCatalog;
use steward_core::task::ScheduledTask;

use crate::cron as cron_expr;
use crate::executor::{FireOutcome, TaskExecutor};

/// A task with a timer installed.
#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    pub name: String,
    pub cron: String,
    pub next_fire: Option<DateTime<Local>>,
}

pub struct Scheduler {
    executor: Arc<TaskExecutor>,
    catalog: Arc<TaskCatalog>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    entries: Mutex<Vec<(ScheduledEntry, Schedule)>>,
}

impl Scheduler {
    pub fn new(executor: Arc<TaskExecutor>, catalog: Arc<TaskCatalog>) -> Self {
        Self {
            executor,
            catalog,
            timers: Mutex::new(Vec::new()),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Replace the whole task set. Tasks with an invalid cron expression are
    /// skipped. Old timers are stopped before the new ones start.
    /// Returns the number of timers installed.
    pub fn load(&self, tasks: Vec<ScheduledTask>) -> usize {
        let mut accepted = Vec::with_capacity(tasks.len());
        let mut entries = Vec::new();
        let now = Local::now();

        for task in tasks {
            if !task.is_scheduled() {
                tracing::info!(
                    "🛡️ Verification task '{}' active for groups {:?}",
                    task.name,
                    task.target_ids
                );
                accepted.push(task);
                continue;
            }
            let Some(expression) = task.cron.clone() else {
                tracing::error!("❌ Task '{}' has no cron expression, skipped", task.name);
                continue;
            };
            match cron_expr::parse(&expression) {
                Ok(schedule) => {
                    let next_fire = cron_expr::next_fire(&schedule, now);
                    entries.push((
                        ScheduledEntry {
                            name: task.name.clone(),
                            cron: expression,
                            next_fire,
                        },
                        schedule,
                    ));
                    accepted.push(task);
                }
                Err(e) => tracing::error!("❌ Task '{}' skipped: {e}", task.name),
            }
        }

        self.stop_timers();
        self.catalog.replace(accepted);

        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        for (entry, schedule) in &entries {
            match entry.next_fire {
                Some(next) => tracing::info!(
                    "📅 Task '{}' ({}) next fire: {}",
                    entry.name,
                    entry.cron,
                    next.format("%Y-%m-%d %H:%M:%S")
                ),
                None => tracing::warn!("⚠️ Task '{}' ({}) never fires", entry.name, entry.cron),
            }
            timers.push(self.spawn_timer(entry.name.clone(), schedule.clone()));
        }
        let installed = timers.len();
        drop(timers);

        *self.entries.lock().unwrap_or_else(|e| e.into_inner()) = entries;
        tracing::info!(
            "⏰ Scheduler loaded {} task(s), {} timer(s)",
            self.catalog.len(),
            installed
        );
        installed
    }

    fn spawn_timer(&self, name: String, schedule: Schedule) -> JoinHandle<()> {
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            loop {
                let now = Local::now();
                let Some(next) = cron_expr::next_fire(&schedule, now) else {
                    tracing::warn!("⚠️ Task '{name}' has no upcoming fire time, timer stopped");
                    return;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                let executor = Arc::clone(&executor);
                let fired = name.clone();
                tokio::spawn(async move {
                    match executor.on_fire(&fired).await {
                        Ok(FireOutcome::Completed(_)) => {}
                        Ok(FireOutcome::Skipped(reason)) => tracing::debug!("{reason}"),
                        Err(e) => tracing::error!("❌ Job '{fired}' failed: {e}"),
                    }
                });

                if let Some(after) = cron_expr::next_fire(&schedule, Local::now()) {
                    tracing::info!(
                        "📅 Task '{name}' next fire: {}",
                        after.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        })
    }

    /// Installed timers with their next fire time.
    pub fn entries(&self) -> Vec<ScheduledEntry> {
        let now = Local::now();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(entry, schedule)| ScheduledEntry {
                next_fire: cron_expr::next_fire(schedule, now),
                ..entry.clone()
            })
            .collect()
    }

    pub fn timer_count(&self) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    fn stop_timers(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        for handle in timers.drain(..) {
            handle.abort();
        }
    }

    pub fn shutdown(&self) {
        self.stop_timers();
        tracing::info!("🛑 Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_timers();
    }
}
