//! Steward configuration system.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Result, StewardError};
use crate::task::{ScheduledTask, TargetKind, TaskKind, VerifyMode};

/// Websocket endpoint written into a freshly created config.
pub const DEFAULT_WEBSOCKET: &str = "ws://127.0.0.1:6700";

/// Ids used by the bootstrap catalog; seeing them at startup means the file
/// was never edited.
pub const PLACEHOLDER_IDS: [i64; 3] = [123456789, 987654321, 111222333];

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StewardConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduled_tasks: Vec<TaskConfig>,
}

impl StewardConfig {
    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StewardError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| StewardError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Load config, writing the bootstrap config first when the file is missing.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("⚠️ Config file not found: {}", path.display());
            let config = Self::with_default_tasks();
            config.save_to(path)?;
            tracing::info!(
                "📝 Created default config with {} example tasks: {}",
                config.scheduled_tasks.len(),
                path.display()
            );
            return Ok(config);
        }
        Self::load_from(path)
    }

    /// Save config to a path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| StewardError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Steward home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".steward")
    }

    /// Build validated tasks. Invalid or duplicate entries are logged and skipped.
    pub fn tasks(&self) -> Vec<ScheduledTask> {
        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(self.scheduled_tasks.len());
        for entry in &self.scheduled_tasks {
            match ScheduledTask::try_from(entry) {
                Ok(task) => {
                    if !seen.insert(task.name.clone()) {
                        tracing::warn!("⚠️ Duplicate task name '{}', skipped", task.name);
                        continue;
                    }
                    tracing::debug!(
                        "Loaded task: {} ({}, cron={:?})",
                        task.name,
                        task.kind(),
                        task.cron
                    );
                    tasks.push(task);
                }
                Err(e) => tracing::error!("❌ Skipping task: {e}"),
            }
        }
        tasks
    }

    /// Whether the config still carries bootstrap placeholder values.
    pub fn uses_placeholders(&self) -> bool {
        if self.bot.websocket == DEFAULT_WEBSOCKET {
            return true;
        }
        self.scheduled_tasks.iter().any(|t| {
            t.target_ids
                .iter()
                .chain(t.target_id.iter())
                .chain(t.member_ids.iter())
                .chain(t.member_id.iter())
                .any(|id| PLACEHOLDER_IDS.contains(id))
        })
    }

    /// Config with the example task catalog written on first start.
    pub fn with_default_tasks() -> Self {
        Self {
            scheduled_tasks: default_tasks(),
            ..Self::default()
        }
    }
}

/// Gateway connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_websocket")]
    pub websocket: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_reconnect")]
    pub reconnect_secs: u64,
}

fn default_websocket() -> String { DEFAULT_WEBSOCKET.into() }
fn default_call_timeout() -> u64 { 5 }
fn default_reconnect() -> u64 { 5 }

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            websocket: default_websocket(),
            access_token: String::new(),
            call_timeout_secs: default_call_timeout(),
            reconnect_secs: default_reconnect(),
        }
    }
}

/// Outbound throttling and task spacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "bool_true")]
    pub enable_msg_limit: bool,
    #[serde(default = "default_msg_interval")]
    pub msg_interval_ms: u64,
    #[serde(default = "default_group_limit")]
    pub group_msg_limit: u32,
    #[serde(default = "default_private_limit")]
    pub private_msg_limit: u32,
    #[serde(default = "default_task_interval")]
    pub task_min_interval_ms: u64,
    #[serde(default = "bool_true")]
    pub enable_auto_risk_control: bool,
    #[serde(default = "default_risk_retcode")]
    pub risk_control_retcode: i64,
}

fn bool_true() -> bool { true }
fn default_msg_interval() -> u64 { 1500 }
fn default_group_limit() -> u32 { 20 }
fn default_private_limit() -> u32 { 10 }
fn default_task_interval() -> u64 { 5000 }
fn default_risk_retcode() -> i64 { 1200 }

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enable_msg_limit: true,
            msg_interval_ms: default_msg_interval(),
            group_msg_limit: default_group_limit(),
            private_msg_limit: default_private_limit(),
            task_min_interval_ms: default_task_interval(),
            enable_auto_risk_control: true,
            risk_control_retcode: default_risk_retcode(),
        }
    }
}

/// Logging switches.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    /// Log every inbound chat message at info level.
    #[serde(default)]
    pub message_log: bool,
    #[serde(default)]
    pub debug: bool,
}

/// Where execution records and exports live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_records_dir")]
    pub records_dir: String,
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
    #[serde(default = "default_max_records")]
    pub max_records_per_task: usize,
}

fn default_records_dir() -> String { "~/.steward/records".into() }
fn default_export_dir() -> String { "~/.steward/exports".into() }
fn default_max_records() -> usize { 100 }

impl StorageConfig {
    pub fn records_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.records_dir).to_string())
    }

    pub fn export_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.export_dir).to_string())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            records_dir: default_records_dir(),
            export_dir: default_export_dir(),
            max_records_per_task: default_max_records(),
        }
    }
}

/// One `[[scheduled_tasks]]` entry as written in the config file.
///
/// Fields are flat and kind-specific ones are optional; validation into a
/// [`ScheduledTask`] happens in [`StewardConfig::tasks`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    #[serde(alias = "type")]
    pub kind: TaskKind,
    #[serde(default)]
    pub target_type: TargetKind,
    #[serde(default)]
    pub target_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<i64>,
    #[serde(default, alias = "cron_expression", skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub enable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<i64>,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub send_notice: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verify_answers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_message: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "bool_true")]
    pub ignore_whitespace: bool,
    #[serde(default)]
    pub fuzzy_match: bool,
    #[serde(default)]
    pub min_level: i64,
    #[serde(default)]
    pub max_auto_accept_level: i64,
    #[serde(default)]
    pub verify_mode: VerifyMode,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: TaskKind::SendMessage,
            target_type: TargetKind::Group,
            target_ids: Vec::new(),
            target_id: None,
            cron: None,
            content: None,
            enable: false,
            member_ids: Vec::new(),
            member_id: None,
            duration: 0,
            send_notice: false,
            notice_content: None,
            verify_question: None,
            verify_answer: None,
            verify_answers: Vec::new(),
            reject_message: None,
            case_sensitive: false,
            ignore_whitespace: true,
            fuzzy_match: false,
            min_level: 0,
            max_auto_accept_level: 0,
            verify_mode: VerifyMode::AnswerOnly,
        }
    }
}

fn default_tasks() -> Vec<TaskConfig> {
    vec![
        TaskConfig {
            name: "morning-greeting".into(),
            kind: TaskKind::SendMessage,
            target_ids: vec![123456789, 987654321],
            cron: Some("0 30 7 * * ?".into()),
            content: Some("Good morning, have a great day!".into()),
            ..TaskConfig::default()
        },
        TaskConfig {
            name: "evening-reminder".into(),
            kind: TaskKind::SendMessage,
            target_type: TargetKind::Private,
            target_ids: vec![111222333],
            cron: Some("0 0 22 * * ?".into()),
            content: Some("Time to rest, good night~".into()),
            ..TaskConfig::default()
        },
        TaskConfig {
            name: "weekend-mute".into(),
            kind: TaskKind::GroupBanAll,
            target_ids: vec![123456789],
            cron: Some("0 0 23 ? * FRI".into()),
            enable: true,
            send_notice: true,
            notice_content: Some("Have a nice weekend! Group is muted until Monday.".into()),
            ..TaskConfig::default()
        },
        TaskConfig {
            name: "monday-unmute".into(),
            kind: TaskKind::GroupBanAll,
            target_ids: vec![123456789],
            cron: Some("0 0 8 ? * MON".into()),
            enable: false,
            send_notice: true,
            notice_content: Some("Good morning! A new week begins, mute lifted.".into()),
            ..TaskConfig::default()
        },
        TaskConfig {
            name: "member-mute".into(),
            kind: TaskKind::GroupBanMember,
            target_ids: vec![123456789],
            member_ids: vec![111222333],
            cron: Some("0 0 12 * * ?".into()),
            duration: 3600,
            send_notice: true,
            notice_content: Some("Member {memberId} has been muted for {duration}.".into()),
            ..TaskConfig::default()
        },
        TaskConfig {
            name: "join-verify".into(),
            kind: TaskKind::GroupRequestVerify,
            target_ids: vec![123456789],
            verify_question: Some("Please answer: 1+1=?".into()),
            verify_answers: vec!["2".into(), "二".into(), "两".into()],
            reject_message: Some(
                "Wrong answer, the correct answer is 2. Please apply again.".into(),
            ),
            verify_mode: VerifyMode::AnswerOnly,
            ..TaskConfig::default()
        },
        TaskConfig {
            name: "join-verify-advanced".into(),
            kind: TaskKind::GroupRequestVerify,
            target_ids: vec![987654321],
            verify_question: Some("Which content types do the rules forbid?".into()),
            verify_answers: vec!["illegal".into(), "adult".into(), "ads".into()],
            reject_message: Some("Wrong answer, please read the group rules first.".into()),
            fuzzy_match: true,
            min_level: 10,
            max_auto_accept_level: 50,
            verify_mode: VerifyMode::AnyOnePass,
            ..TaskConfig::default()
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: StewardConfig = toml::from_str("").unwrap();
        assert_eq!(config.bot.websocket, DEFAULT_WEBSOCKET);
        assert_eq!(config.bot.call_timeout_secs, 5);
        assert_eq!(config.safety.msg_interval_ms, 1500);
        assert_eq!(config.safety.group_msg_limit, 20);
        assert_eq!(config.safety.private_msg_limit, 10);
        assert_eq!(config.safety.task_min_interval_ms, 5000);
        assert_eq!(config.storage.max_records_per_task, 100);
        assert!(config.scheduled_tasks.is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [bot]
            websocket = "ws://10.0.0.2:3001"
            access_token = "secret"

            [safety]
            group_msg_limit = 5

            [[scheduled_tasks]]
            name = "hello"
            kind = "SEND_MESSAGE"
            target_type = "GROUP"
            target_ids = [100]
            cron = "0 0 8 * * ?"
            content = "hi"

            [[scheduled_tasks]]
            name = "verify"
            type = "GROUP_REQUEST_VERIFY"
            target_id = 100
            verify_question = "1+1=?"
            verify_answers = ["2"]
            verify_mode = "BOTH_REQUIRED"
            min_level = 10
        "#;

        let config: StewardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bot.access_token, "secret");
        assert_eq!(config.safety.group_msg_limit, 5);
        assert_eq!(config.safety.private_msg_limit, 10);

        let tasks = config.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].kind(), TaskKind::GroupRequestVerify);
        assert_eq!(tasks[1].policy().unwrap().mode, VerifyMode::BothRequired);
        assert!(!config.uses_placeholders());
    }

    #[test]
    fn test_invalid_and_duplicate_tasks_are_skipped() {
        let toml_str = r#"
            [[scheduled_tasks]]
            name = "a"
            kind = "SEND_MESSAGE"
            target_ids = [1]
            cron = "0 * * * * ?"
            content = "x"

            [[scheduled_tasks]]
            name = "a"
            kind = "SEND_MESSAGE"
            target_ids = [2]
            cron = "0 * * * * ?"
            content = "y"

            [[scheduled_tasks]]
            name = "broken"
            kind = "GROUP_BAN_MEMBER"
            target_ids = [1]
            cron = "0 * * * * ?"
        "#;
        let config: StewardConfig = toml::from_str(toml_str).unwrap();
        let tasks = config.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].target_ids, vec![1]);
    }

    #[test]
    fn test_default_catalog_round_trips_through_toml() {
        let config = StewardConfig::with_default_tasks();
        assert!(config.uses_placeholders());

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: StewardConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.tasks().len(), 7);
    }

    #[test]
    fn test_load_or_init_writes_defaults() {
        let dir = std::env::temp_dir().join("steward-test-config-init");
        std::fs::remove_dir_all(&dir).ok();
        let path = dir.join("config.toml");

        let config = StewardConfig::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.scheduled_tasks.len(), 7);

        let reloaded = StewardConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.scheduled_tasks.len(), 7);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_home_dir() {
        let home = StewardConfig::home_dir();
        assert!(home.to_string_lossy().contains("steward"));
    }
}
