//! Task dispatch planning.
//! Maps a fired task to the ordered list of gateway commands it issues.
//! Planning is pure; the executor sends the plan.

use steward_core::task::{ScheduledTask, TaskAction};
use steward_gateway::ActionRequest;

/// One gateway command plus the line recorded for it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAction {
    pub request: ActionRequest,
    pub description: String,
}

impl PlannedAction {
    fn new(request: ActionRequest, description: String) -> Self {
        Self {
            request,
            description,
        }
    }
}

/// Build the commands for one firing of `task`.
pub fn plan(task: &ScheduledTask) -> Vec<PlannedAction> {
    match &task.action {
        TaskAction::SendMessage { content } => {
            let is_group = task.target.is_group();
            task.target_ids
                .iter()
                .map(|&id| {
                    PlannedAction::new(
                        ActionRequest::send_msg(id, is_group, content),
                        format!("send {} message to {id}", task.target),
                    )
                })
                .collect()
        }
        TaskAction::GroupBanAll { enable, notice } => {
            let verb = if *enable { "mute" } else { "unmute" };
            let mut actions = Vec::new();
            for &group_id in &task.target_ids {
                actions.push(PlannedAction::new(
                    ActionRequest::set_group_whole_ban(group_id, *enable),
                    format!("{verb} all in group {group_id}"),
                ));
                if let Some(notice) = notice {
                    actions.push(PlannedAction::new(
                        ActionRequest::send_group_msg(group_id, notice),
                        format!("send {verb} notice to group {group_id}"),
                    ));
                }
            }
            actions
        }
        TaskAction::GroupBanMember {
            member_ids,
            duration_secs,
            notice,
        } => {
            let mut actions = Vec::new();
            for &group_id in &task.target_ids {
                for &member_id in member_ids {
                    let what = if *duration_secs > 0 {
                        format!("mute member {member_id} for {}", format_duration(*duration_secs))
                    } else {
                        format!("unmute member {member_id}")
                    };
                    actions.push(PlannedAction::new(
                        ActionRequest::set_group_ban(group_id, member_id, *duration_secs),
                        format!("{what} in group {group_id}"),
                    ));
                    if let Some(template) = notice {
                        let text = render_notice(template, member_id, *duration_secs);
                        actions.push(PlannedAction::new(
                            ActionRequest::send_group_msg(group_id, &text),
                            format!("send member notice to group {group_id}"),
                        ));
                    }
                }
            }
            actions
        }
        // Passive: handled when join requests arrive.
        TaskAction::GroupRequestVerify(_) => Vec::new(),
    }
}

/// Fill `{memberId}` and `{duration}` in a notice template.
pub fn render_notice(template: &str, member_id: i64, duration_secs: i64) -> String {
    template
        .replace("{memberId}", &member_id.to_string())
        .replace("{duration}", &format_duration(duration_secs))
}

/// `90061` → `1d1h1m1s`; zero components are skipped; `<= 0` → `lifted`.
pub fn format_duration(secs: i64) -> String {
    if secs <= 0 {
        return "lifted".into();
    }
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;
    let seconds = secs % 60;

    let mut out = String::new();
    for (value, unit) in [(days, "d"), (hours, "h"), (minutes, "m"), (seconds, "s")] {
        if value > 0 {
            out.push_str(&format!("{value}{unit}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steward_core::task::{TargetKind, VerificationPolicy};

    fn task(target: TargetKind, target_ids: Vec<i64>, action: TaskAction) -> ScheduledTask {
        ScheduledTask {
            name: "t".into(),
            target,
            target_ids,
            cron: Some("0 * * * * ?".into()),
            action,
        }
    }

    #[test]
    fn test_send_message_per_target() {
        let t = task(
            TargetKind::Group,
            vec![100, 200],
            TaskAction::SendMessage {
                content: "hi".into(),
            },
        );
        let plan = plan(&t);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].request.action, "send_group_msg");
        assert_eq!(plan[0].request.params, json!({ "group_id": 100, "message": "hi" }));
        assert_eq!(plan[1].request.params["group_id"], 200);

        let t = task(
            TargetKind::Private,
            vec![7],
            TaskAction::SendMessage {
                content: "yo".into(),
            },
        );
        let plan = super::plan(&t);
        assert_eq!(plan[0].request.action, "send_private_msg");
        assert_eq!(plan[0].request.params["user_id"], 7);
    }

    #[test]
    fn test_ban_all_with_notice() {
        let t = task(
            TargetKind::Group,
            vec![1, 2],
            TaskAction::GroupBanAll {
                enable: true,
                notice: Some("muted".into()),
            },
        );
        let actions: Vec<_> = plan(&t).into_iter().map(|a| a.request.action).collect();
        assert_eq!(
            actions,
            vec!["set_group_whole_ban", "send_group_msg", "set_group_whole_ban", "send_group_msg"]
        );
    }

    #[test]
    fn test_ban_member_cross_product_and_notice() {
        let t = task(
            TargetKind::Group,
            vec![1, 2],
            TaskAction::GroupBanMember {
                member_ids: vec![10, 11],
                duration_secs: 3600,
                notice: Some("{memberId} muted for {duration}".into()),
            },
        );
        let plan = plan(&t);
        assert_eq!(plan.len(), 8);
        assert_eq!(
            plan[0].request.params,
            json!({ "group_id": 1, "user_id": 10, "duration": 3600 })
        );
        assert_eq!(plan[1].request.message(), Some("10 muted for 1h"));
        assert_eq!(plan[6].request.params["group_id"], 2);
        assert_eq!(plan[6].request.params["user_id"], 11);
    }

    #[test]
    fn test_verify_task_plans_nothing() {
        let t = task(
            TargetKind::Group,
            vec![1],
            TaskAction::GroupRequestVerify(VerificationPolicy::default()),
        );
        assert!(plan(&t).is_empty());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "lifted");
        assert_eq!(format_duration(-5), "lifted");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(3600), "1h");
        assert_eq!(format_duration(93_784), "1d2h3m4s");
        assert_eq!(render_notice("{memberId}: {duration}", 5, 0), "5: lifted");
    }
}
