//! Scheduled task model: what the scheduler fires and what join-request
//! verification is bound to.
//!
//! Tasks are built from the flat [`TaskConfig`] entries in the config file and
//! are immutable afterwards. A reload builds a fresh set.

use serde::{Deserialize, Serialize};

use crate::config::TaskConfig;
use crate::error::{Result, StewardError};

/// Task kind as written in config and in execution records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    SendMessage,
    GroupBanAll,
    GroupBanMember,
    GroupRequestVerify,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::SendMessage => write!(f, "SEND_MESSAGE"),
            TaskKind::GroupBanAll => write!(f, "GROUP_BAN_ALL"),
            TaskKind::GroupBanMember => write!(f, "GROUP_BAN_MEMBER"),
            TaskKind::GroupRequestVerify => write!(f, "GROUP_REQUEST_VERIFY"),
        }
    }
}

/// Whether target ids are group numbers or user numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetKind {
    #[default]
    Group,
    Private,
}

impl TargetKind {
    pub fn is_group(&self) -> bool {
        matches!(self, TargetKind::Group)
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Group => write!(f, "GROUP"),
            TargetKind::Private => write!(f, "PRIVATE"),
        }
    }
}

/// How answer and level checks combine into a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyMode {
    /// Accept everyone.
    IgnoreAll,
    /// Either the answer or the level is enough.
    AnyOnePass,
    /// Both must pass.
    BothRequired,
    #[default]
    AnswerOnly,
    LevelOnly,
    /// Correct answer with too low a level is held for an operator.
    AnswerPassLevelPending,
    /// Sufficient level with a wrong answer is held for an operator.
    LevelPassAnswerPending,
}

/// Join-request verification rules bound to one or more groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    pub question: String,
    pub answers: Vec<String>,
    pub case_sensitive: bool,
    pub ignore_whitespace: bool,
    pub fuzzy_match: bool,
    /// `<= 0` disables the level check.
    pub min_level: i64,
    /// `<= 0` disables auto-accept.
    pub auto_accept_level: i64,
    pub mode: VerifyMode,
    pub reject_message: Option<String>,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            question: String::new(),
            answers: Vec::new(),
            case_sensitive: false,
            ignore_whitespace: true,
            fuzzy_match: false,
            min_level: 0,
            auto_accept_level: 0,
            mode: VerifyMode::AnswerOnly,
            reject_message: None,
        }
    }
}

/// Kind-specific payload of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskAction {
    SendMessage {
        content: String,
    },
    GroupBanAll {
        enable: bool,
        notice: Option<String>,
    },
    GroupBanMember {
        member_ids: Vec<i64>,
        duration_secs: i64,
        notice: Option<String>,
    },
    GroupRequestVerify(VerificationPolicy),
}

/// A validated, immutable scheduled task.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub name: String,
    pub target: TargetKind,
    pub target_ids: Vec<i64>,
    /// Cron expression; verification tasks are passive and may omit it.
    pub cron: Option<String>,
    pub action: TaskAction,
}

impl ScheduledTask {
    pub fn kind(&self) -> TaskKind {
        match &self.action {
            TaskAction::SendMessage { .. } => TaskKind::SendMessage,
            TaskAction::GroupBanAll { .. } => TaskKind::GroupBanAll,
            TaskAction::GroupBanMember { .. } => TaskKind::GroupBanMember,
            TaskAction::GroupRequestVerify(_) => TaskKind::GroupRequestVerify,
        }
    }

    /// Member ids touched by this task (empty for kinds without members).
    pub fn member_ids(&self) -> &[i64] {
        match &self.action {
            TaskAction::GroupBanMember { member_ids, .. } => member_ids,
            _ => &[],
        }
    }

    /// Verification policy, if this is a join-request verification task.
    pub fn policy(&self) -> Option<&VerificationPolicy> {
        match &self.action {
            TaskAction::GroupRequestVerify(policy) => Some(policy),
            _ => None,
        }
    }

    /// Whether the scheduler should install a timer for this task.
    pub fn is_scheduled(&self) -> bool {
        !matches!(self.action, TaskAction::GroupRequestVerify(_))
    }

    /// Whether this task verifies join requests for `group_id`.
    pub fn verifies_group(&self, group_id: i64) -> bool {
        self.target.is_group()
            && self.policy().is_some()
            && self.target_ids.contains(&group_id)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl TryFrom<&TaskConfig> for ScheduledTask {
    type Error = StewardError;

    fn try_from(cfg: &TaskConfig) -> Result<Self> {
        let name = cfg.name.trim();
        if name.is_empty() {
            return Err(StewardError::Config("task without a name".into()));
        }
        let fail = |msg: &str| StewardError::Config(format!("task '{name}': {msg}"));

        let mut target_ids = cfg.target_ids.clone();
        if let Some(id) = cfg.target_id
            && !target_ids.contains(&id)
        {
            target_ids.push(id);
        }
        if target_ids.is_empty() {
            return Err(fail("no target ids"));
        }

        if cfg.kind != TaskKind::SendMessage && !cfg.target_type.is_group() {
            return Err(fail("this task kind only supports GROUP targets"));
        }

        let notice = if cfg.send_notice {
            non_empty(&cfg.notice_content)
        } else {
            None
        };

        let action = match cfg.kind {
            TaskKind::SendMessage => {
                let content = non_empty(&cfg.content).ok_or_else(|| fail("missing content"))?;
                TaskAction::SendMessage { content }
            }
            TaskKind::GroupBanAll => TaskAction::GroupBanAll {
                enable: cfg.enable,
                notice,
            },
            TaskKind::GroupBanMember => {
                let mut member_ids = cfg.member_ids.clone();
                if let Some(id) = cfg.member_id
                    && !member_ids.contains(&id)
                {
                    member_ids.push(id);
                }
                if member_ids.is_empty() {
                    return Err(fail("no member ids"));
                }
                TaskAction::GroupBanMember {
                    member_ids,
                    duration_secs: cfg.duration,
                    notice,
                }
            }
            TaskKind::GroupRequestVerify => {
                let question = non_empty(&cfg.verify_question)
                    .ok_or_else(|| fail("missing verification policy (verify_question)"))?;
                let mut answers: Vec<String> = Vec::new();
                for answer in cfg.verify_answer.iter().chain(cfg.verify_answers.iter()) {
                    let answer = answer.trim();
                    if !answer.is_empty() && !answers.iter().any(|a| a == answer) {
                        answers.push(answer.to_string());
                    }
                }
                TaskAction::GroupRequestVerify(VerificationPolicy {
                    question,
                    answers,
                    case_sensitive: cfg.case_sensitive,
                    ignore_whitespace: cfg.ignore_whitespace,
                    fuzzy_match: cfg.fuzzy_match,
                    min_level: cfg.min_level,
                    auto_accept_level: cfg.max_auto_accept_level,
                    mode: cfg.verify_mode,
                    reject_message: non_empty(&cfg.reject_message),
                })
            }
        };

        let cron = non_empty(&cfg.cron);
        if cron.is_none() && cfg.kind != TaskKind::GroupRequestVerify {
            return Err(fail("missing cron expression"));
        }

        Ok(Self {
            name: name.to_string(),
            target: cfg.target_type,
            target_ids,
            cron,
            action,
        })
    }
}
