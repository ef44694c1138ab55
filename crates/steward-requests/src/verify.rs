//! Join-request decision logic. Pure: no I/O, no clock.

use steward_core::task::{VerificationPolicy, VerifyMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Reject,
    /// Park the request for an operator.
    Hold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    pub reason: String,
}

impl Decision {
    fn new(outcome: Outcome, reason: impl Into<String>) -> Self {
        Self {
            outcome,
            reason: reason.into(),
        }
    }
}

const ANSWER_MARKERS: [&str; 3] = ["answer:", "答案：", "答案:"];

/// The applicant's answer: the text after an `answer:` marker, or the whole
/// comment. Always trimmed.
pub fn extract_answer(comment: &str) -> String {
    let lower = comment.to_lowercase();
    // Lower-casing can change byte lengths; only trust offsets when it didn't.
    let haystack = if lower.len() == comment.len() {
        lower.as_str()
    } else {
        comment
    };
    let found = ANSWER_MARKERS
        .iter()
        .filter_map(|marker| haystack.find(marker).map(|idx| idx + marker.len()))
        .min();
    match found {
        Some(start) => comment[start..].trim().to_string(),
        None => comment.trim().to_string(),
    }
}

fn normalize(text: &str, policy: &VerificationPolicy) -> String {
    let mut out: String = if policy.ignore_whitespace {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    } else {
        text.trim().to_string()
    };
    if !policy.case_sensitive {
        out = out.to_lowercase();
    }
    out
}

/// Whether `candidate` matches one of the accepted answers.
///
/// An empty accepted set accepts any answer. An empty candidate never
/// fuzzy-matches.
pub fn answer_matches(policy: &VerificationPolicy, candidate: &str) -> bool {
    if policy.answers.is_empty() {
        return true;
    }
    let candidate = normalize(candidate, policy);
    policy.answers.iter().any(|accepted| {
        let accepted = normalize(accepted, policy);
        if policy.fuzzy_match {
            !candidate.is_empty()
                && !accepted.is_empty()
                && (candidate.contains(&accepted) || accepted.contains(&candidate))
        } else {
            candidate == accepted
        }
    })
}

pub fn level_passes(policy: &VerificationPolicy, level: i64) -> bool {
    policy.min_level <= 0 || level >= policy.min_level
}

/// Decide what to do with a join request.
pub fn decide(policy: &VerificationPolicy, answer: &str, level: i64) -> Decision {
    if policy.auto_accept_level > 0 && level >= policy.auto_accept_level {
        return Decision::new(
            Outcome::Accept,
            format!("level {level} reaches auto-accept level {}", policy.auto_accept_level),
        );
    }

    let answer_ok = answer_matches(policy, answer);
    let level_ok = level_passes(policy, level);
    let answer_fail = "answer incorrect";
    let level_fail = format!("level {level} below required {}", policy.min_level);

    match policy.mode {
        VerifyMode::IgnoreAll => Decision::new(Outcome::Accept, "verification disabled"),
        VerifyMode::AnyOnePass => {
            if answer_ok || level_ok {
                let which = if answer_ok { "answer correct" } else { "level sufficient" };
                Decision::new(Outcome::Accept, which)
            } else {
                Decision::new(Outcome::Reject, format!("{answer_fail} and {level_fail}"))
            }
        }
        VerifyMode::BothRequired => match (answer_ok, level_ok) {
            (true, true) => Decision::new(Outcome::Accept, "answer correct and level sufficient"),
            (false, true) => Decision::new(Outcome::Reject, answer_fail),
            (true, false) => Decision::new(Outcome::Reject, level_fail),
            (false, false) => {
                Decision::new(Outcome::Reject, format!("{answer_fail} and {level_fail}"))
            }
        },
        VerifyMode::AnswerOnly => {
            if answer_ok {
                Decision::new(Outcome::Accept, "answer correct")
            } else {
                Decision::new(Outcome::Reject, answer_fail)
            }
        }
        VerifyMode::LevelOnly => {
            if level_ok {
                Decision::new(Outcome::Accept, "level sufficient")
            } else {
                Decision::new(Outcome::Reject, level_fail)
            }
        }
        VerifyMode::AnswerPassLevelPending => match (answer_ok, level_ok) {
            (true, true) => Decision::new(Outcome::Accept, "answer correct and level sufficient"),
            (false, _) => Decision::new(Outcome::Reject, answer_fail),
            (true, false) => Decision::new(
                Outcome::Hold,
                format!("answer correct but {level_fail}, awaiting review"),
            ),
        },
        VerifyMode::LevelPassAnswerPending => match (answer_ok, level_ok) {
            (true, true) => Decision::new(Outcome::Accept, "answer correct and level sufficient"),
            (_, false) => Decision::new(Outcome::Reject, level_fail),
            (false, true) => Decision::new(
                Outcome::Hold,
                "level sufficient but answer incorrect, awaiting review",
            ),
        },
    }
}

/// Message sent with a rejection.
pub fn reject_message(policy: &VerificationPolicy) -> String {
    match &policy.reject_message {
        Some(message) => message.clone(),
        None => format!(
            "Verification failed, please apply again and answer: {}",
            policy.question
        ),
    }
}
