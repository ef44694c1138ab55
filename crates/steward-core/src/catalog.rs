//! Shared, hot-swappable task catalog.
//!
//! Readers take a cheap snapshot (`Arc<Vec<..>>`); a reload replaces the whole
//! set at once, so an execution that already holds an `Arc<ScheduledTask>`
//! keeps seeing the task it started with.

use std::sync::{Arc, RwLock};

use crate::task::ScheduledTask;

#[derive(Debug, Default)]
pub struct TaskCatalog {
    tasks: RwLock<Arc<Vec<Arc<ScheduledTask>>>>,
}

impl TaskCatalog {
    pub fn new(tasks: Vec<ScheduledTask>) -> Self {
        let catalog = Self::default();
        catalog.replace(tasks);
        catalog
    }

    /// Swap in a new task set.
    pub fn replace(&self, tasks: Vec<ScheduledTask>) {
        let next = Arc::new(tasks.into_iter().map(Arc::new).collect::<Vec<_>>());
        let mut guard = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        *guard = next;
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<ScheduledTask>>> {
        self.tasks.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ScheduledTask>> {
        self.snapshot().iter().find(|t| t.name == name).cloned()
    }

    /// First verification task bound to `group_id`.
    pub fn verify_task_for_group(&self, group_id: i64) -> Option<Arc<ScheduledTask>> {
        let snapshot = self.snapshot();
        let mut matches = snapshot.iter().filter(|t| t.verifies_group(group_id));
        let first = matches.next().cloned();
        if first.is_some() && matches.next().is_some() {
            tracing::warn!(
                "⚠️ Several verification tasks cover group {group_id}, using '{}'",
                first.as_ref().map(|t| t.name.as_str()).unwrap_or_default()
            );
        }
        first
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
