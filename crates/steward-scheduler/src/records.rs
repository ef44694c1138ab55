//! File-based execution records.
//! One JSON file per firing under `<dir>/<task>/<id>.json`, human-readable.
//! Each task keeps at most `max_per_task` files; the oldest by modification
//! time are removed after every write.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use steward_core::config::StorageConfig;
use steward_core::error::{Result, StewardError};
use steward_core::task::{ScheduledTask, TargetKind, TaskKind};

/// Outcome of one task firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub task_name: String,
    pub task_kind: TaskKind,
    pub fired_at: DateTime<Local>,
    pub target_type: TargetKind,
    pub target_ids: Vec<i64>,
    #[serde(default)]
    pub member_ids: Vec<i64>,
    pub success: bool,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn new(task: &ScheduledTask, fired_at: DateTime<Local>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_name: task.name.clone(),
            task_kind: task.kind(),
            fired_at,
            target_type: task.target,
            target_ids: task.target_ids.clone(),
            member_ids: task.member_ids().to_vec(),
            success: false,
            detail: String::new(),
            error: None,
        }
    }
}

/// Replace characters that are not allowed in file names.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

pub struct RecordStore {
    dir: PathBuf,
    export_dir: PathBuf,
    max_per_task: usize,
}

impl RecordStore {
    pub fn new(dir: &Path, export_dir: &Path, max_per_task: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            export_dir: export_dir.to_path_buf(),
            max_per_task: max_per_task.max(1),
        }
    }

    pub fn from_config(storage: &StorageConfig) -> Self {
        Self::new(
            &storage.records_path(),
            &storage.export_path(),
            storage.max_records_per_task,
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn task_dir(&self, task_name: &str) -> PathBuf {
        self.dir.join(sanitize(task_name))
    }

    /// Write a record and evict the oldest beyond the cap.
    pub fn save(&self, record: &ExecutionRecord) -> Result<PathBuf> {
        let dir = self.task_dir(&record.task_name);
        std::fs::create_dir_all(&dir)?;
        let file = dir.join(format!("{}.json", record.id));
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&file, json)?;
        tracing::debug!("💾 Saved execution record {}", file.display());
        self.prune(&dir);
        Ok(file)
    }

    fn prune(&self, dir: &Path) {
        let mut files = json_files(dir);
        if files.len() <= self.max_per_task {
            return;
        }
        files.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let excess = files.len() - self.max_per_task;
        for (path, _) in files.into_iter().take(excess) {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("⚠️ Failed to evict {}: {e}", path.display());
            }
        }
    }

    /// Records for one task, newest first. `limit = 0` means all.
    pub fn task_records(&self, task_name: &str, limit: usize) -> Vec<ExecutionRecord> {
        let mut records = read_records(&self.task_dir(task_name));
        records.sort_by(|a, b| b.fired_at.cmp(&a.fired_at));
        truncate(records, limit)
    }

    /// Most recent records across all tasks, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut records: Vec<ExecutionRecord> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .flat_map(|e| read_records(&e.path()))
            .collect();
        records.sort_by(|a, b| b.fired_at.cmp(&a.fired_at));
        truncate(records, limit)
    }

    /// Write a task's records to `<export_dir>/<task>_<yyyyMMdd_HHmmss>.txt`.
    /// `NotFound` without touching the disk when the task has no records.
    pub fn export(&self, task_name: &str, limit: usize) -> Result<PathBuf> {
        let records = self.task_records(task_name, limit);
        if records.is_empty() {
            return Err(StewardError::NotFound(format!(
                "no execution records for task '{task_name}'"
            )));
        }
        std::fs::create_dir_all(&self.export_dir)?;
        let now = Local::now();
        let file = self.export_dir.join(format!(
            "{}_{}.txt",
            sanitize(task_name),
            now.format("%Y%m%d_%H%M%S")
        ));

        let mut out = String::new();
        out.push_str(&format!("Task execution records: {task_name}\n"));
        out.push_str(&format!("Exported at: {}\n", now.format("%Y-%m-%d %H:%M:%S")));
        out.push_str(&format!("{}\n\n", "=".repeat(50)));
        for r in &records {
            out.push_str(&format!("ID: {}\n", r.id));
            out.push_str(&format!("Fired at: {}\n", r.fired_at.format("%Y-%m-%d %H:%M:%S")));
            out.push_str(&format!("Kind: {}\n", r.task_kind));
            out.push_str(&format!("Target: {} {:?}\n", r.target_type, r.target_ids));
            if !r.member_ids.is_empty() {
                out.push_str(&format!("Members: {:?}\n", r.member_ids));
            }
            out.push_str(&format!("Result: {}\n", if r.success { "success" } else { "failed" }));
            out.push_str(&format!("Detail: {}\n", r.detail));
            if let Some(error) = &r.error {
                out.push_str(&format!("Error: {error}\n"));
            }
            out.push_str(&format!("{}\n\n", "-".repeat(50)));
        }
        std::fs::write(&file, out)?;
        tracing::info!("📤 Exported {} record(s) to {}", records.len(), file.display());
        Ok(file)
    }
}

fn truncate(mut records: Vec<ExecutionRecord>, limit: usize) -> Vec<ExecutionRecord> {
    if limit > 0 {
        records.truncate(limit);
    }
    records
}

fn json_files(dir: &Path) -> Vec<(PathBuf, SystemTime)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .map(|p| {
            let modified = std::fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (p, modified)
        })
        .collect()
}

fn read_records(dir: &Path) -> Vec<ExecutionRecord> {
    json_files(dir)
        .into_iter()
        .filter_map(|(path, _)| {
            let text = std::fs::read_to_string(&path).ok()?;
            match serde_json::from_str(&text) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("⚠️ Skipping unreadable record {}: {e}", path.display());
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use steward_core::task::TaskAction;

    fn store(name: &str, max: usize) -> (RecordStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("steward-test-records-{name}"));
        std::fs::remove_dir_all(&root).ok();
        let store = RecordStore::new(&root.join("records"), &root.join("exports"), max);
        (store, root)
    }

    fn task(name: &str) -> ScheduledTask {
        ScheduledTask {
            name: name.into(),
            target: TargetKind::Group,
            target_ids: vec![100],
            cron: Some("0 * * * * ?".into()),
            action: TaskAction::SendMessage {
                content: "hi".into(),
            },
        }
    }

    fn record(name: &str, minutes_ago: i64, success: bool) -> ExecutionRecord {
        let mut r = ExecutionRecord::new(&task(name), Local::now() - Duration::minutes(minutes_ago));
        r.success = success;
        r.detail = format!("{minutes_ago} minutes ago");
        r
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a/b:c*?\"<>|\\d"), "a_b_c_______d");
        assert_eq!(sanitize("morning-greeting"), "morning-greeting");
    }

    #[test]
    fn test_save_and_query_newest_first() {
        let (store, root) = store("query", 100);
        store.save(&record("alpha", 10, true)).unwrap();
        store.save(&record("alpha", 1, false)).unwrap();
        store.save(&record("beta", 5, true)).unwrap();

        let alpha = store.task_records("alpha", 0);
        assert_eq!(alpha.len(), 2);
        assert_eq!(alpha[0].detail, "1 minutes ago");
        assert!(!alpha[0].success);

        let recent = store.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].task_name, "alpha");
        assert_eq!(recent[1].task_name, "beta");

        assert!(store.task_records("missing", 0).is_empty());
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_cap_per_task() {
        let (store, root) = store("cap", 3);
        for i in 0..5 {
            store.save(&record("capped", i, true)).unwrap();
        }
        assert_eq!(store.task_records("capped", 0).len(), 3);
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_export() {
        let (store, root) = store("export", 100);
        let mut failed = record("a/b", 2, false);
        failed.error = Some("gateway down".into());
        store.save(&failed).unwrap();

        let file = store.export("a/b", 0).unwrap();
        let name = file.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("a_b_"));
        assert!(name.ends_with(".txt"));

        let text = std::fs::read_to_string(&file).unwrap();
        assert!(text.contains("Result: failed"));
        assert!(text.contains("Error: gateway down"));
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_export_unknown_task_writes_nothing() {
        let (store, root) = store("export-missing", 100);
        store.save(&record("present", 1, true)).unwrap();

        let err = store.export("absent", 0).unwrap_err();
        assert!(err.is_not_found());
        assert!(!root.join("exports").exists());
        std::fs::remove_dir_all(&root).ok();
    }
}
