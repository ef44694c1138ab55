//! Join-request coordinator against a fake gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;

use steward_core::catalog::TaskCatalog;
use steward_core::error::{Result, StewardError};
use steward_core::task::{ScheduledTask, TargetKind, TaskAction, VerificationPolicy, VerifyMode};
use steward_gateway::{
    ActionRequest, ActionResponse, Gateway, GatewayEvent, JoinRequestEvent, SendOutcome,
};
use steward_requests::{JoinRequestCoordinator, Outcome};

#[derive(Default)]
struct FakeGateway {
    level: Option<i64>,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<ActionRequest>>,
    calls: Mutex<Vec<ActionRequest>>,
}

impl FakeGateway {
    fn with_level(level: i64) -> Arc<Self> {
        Arc::new(Self {
            level: Some(level),
            ..Self::default()
        })
    }

    fn sent(&self) -> Vec<ActionRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn send(&self, request: ActionRequest) -> Result<SendOutcome> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(StewardError::NotConnected);
        }
        self.sent.lock().unwrap().push(request);
        Ok(SendOutcome::Sent)
    }

    async fn call(&self, request: ActionRequest, timeout: Duration) -> Result<ActionResponse> {
        self.calls.lock().unwrap().push(request.clone());
        match self.level {
            Some(level) => Ok(ActionResponse::ok(json!({ "level": level }))),
            None => Err(StewardError::Timeout {
                action: request.action,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn is_connected(&self) -> bool {
        true
    }
}

fn verify_task(group_id: i64, policy: VerificationPolicy) -> ScheduledTask {
    ScheduledTask {
        name: format!("verify-{group_id}"),
        target: TargetKind::Group,
        target_ids: vec![group_id],
        cron: None,
        action: TaskAction::GroupRequestVerify(policy),
    }
}

fn basic_policy(mode: VerifyMode) -> VerificationPolicy {
    VerificationPolicy {
        question: "1+1=?".into(),
        answers: vec!["2".into(), "二".into(), "两".into()],
        mode,
        ..VerificationPolicy::default()
    }
}

fn join(group_id: i64, flag: &str, comment: &str) -> JoinRequestEvent {
    JoinRequestEvent {
        group_id,
        user_id: 42,
        flag: flag.into(),
        comment: comment.into(),
    }
}

fn coordinator(gateway: Arc<FakeGateway>, tasks: Vec<ScheduledTask>) -> JoinRequestCoordinator {
    JoinRequestCoordinator::new(
        gateway,
        Arc::new(TaskCatalog::new(tasks)),
        Duration::from_millis(100),
    )
}

#[tokio::test]
async fn test_correct_answer_is_approved() {
    let gateway = FakeGateway::with_level(1);
    let coord = coordinator(
        Arc::clone(&gateway),
        vec![verify_task(100, basic_policy(VerifyMode::AnswerOnly))],
    );

    let decision = coord
        .handle(&join(100, "f1", "Question: 1+1=?\nanswer: 2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(decision.outcome, Outcome::Accept);

    let sent = gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].action, "set_group_add_request");
    assert_eq!(sent[0].params["flag"], "f1");
    assert_eq!(sent[0].params["approve"], true);
    assert_eq!(sent[0].params["sub_type"], "add");

    let calls = gateway.calls.lock().unwrap();
    assert_eq!(calls[0].action, "get_stranger_info");
    assert_eq!(calls[0].params["user_id"], 42);
}

#[tokio::test]
async fn test_unbound_group_is_ignored() {
    let gateway = FakeGateway::with_level(1);
    let coord = coordinator(
        Arc::clone(&gateway),
        vec![verify_task(100, basic_policy(VerifyMode::AnswerOnly))],
    );
    assert!(coord.handle(&join(999, "f", "2")).await.unwrap().is_none());
    assert!(gateway.sent().is_empty());
    assert!(gateway.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_both_required_rejects_low_level() {
    let gateway = FakeGateway::with_level(5);
    let policy = VerificationPolicy {
        min_level: 10,
        reject_message: Some("Level too low".into()),
        ..basic_policy(VerifyMode::BothRequired)
    };
    let coord = coordinator(Arc::clone(&gateway), vec![verify_task(100, policy)]);

    let decision = coord.handle(&join(100, "f2", "2")).await.unwrap().unwrap();
    assert_eq!(decision.outcome, Outcome::Reject);
    assert!(decision.reason.contains("level"));

    let sent = gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].params["approve"], false);
    assert_eq!(sent[0].params["reason"], "Level too low");
}

#[tokio::test]
async fn test_level_timeout_counts_as_zero() {
    let gateway = Arc::new(FakeGateway::default());
    let policy = VerificationPolicy {
        min_level: 1,
        ..basic_policy(VerifyMode::LevelOnly)
    };
    let coord = coordinator(Arc::clone(&gateway), vec![verify_task(100, policy)]);
    assert_eq!(coord.fetch_level(42).await, 0);

    let decision = coord.handle(&join(100, "f3", "")).await.unwrap().unwrap();
    assert_eq!(decision.outcome, Outcome::Reject);
    assert!(gateway.sent()[0].params["reason"].as_str().unwrap().contains("1+1=?"));
}

#[tokio::test]
async fn test_hold_then_operator_approve() {
    let gateway = FakeGateway::with_level(3);
    let policy = VerificationPolicy {
        min_level: 10,
        ..basic_policy(VerifyMode::AnswerPassLevelPending)
    };
    let coord = coordinator(Arc::clone(&gateway), vec![verify_task(100, policy)]);

    let decision = coord.handle(&join(100, "held", "answer: 2")).await.unwrap().unwrap();
    assert_eq!(decision.outcome, Outcome::Hold);
    assert!(gateway.sent().is_empty());
    assert_eq!(coord.suspended().len(), 1);
    assert_eq!(coord.suspended_for_group(100).len(), 1);
    assert_eq!(coord.stats().total, 1);
    assert_eq!(coord.get("held").unwrap().user_id, 42);

    let resolved = coord.approve("held").await.unwrap();
    assert_eq!(resolved.flag, "held");
    assert!(coord.suspended().is_empty());
    assert_eq!(gateway.sent()[0].params["approve"], true);

    let err = coord.approve("held").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_reject_failure_keeps_entry() {
    let gateway = FakeGateway::with_level(30);
    let policy = VerificationPolicy {
        min_level: 10,
        ..basic_policy(VerifyMode::LevelPassAnswerPending)
    };
    let coord = coordinator(Arc::clone(&gateway), vec![verify_task(100, policy)]);

    let decision = coord.handle(&join(100, "held", "wrong")).await.unwrap().unwrap();
    assert_eq!(decision.outcome, Outcome::Hold);

    gateway.fail_sends.store(true, Ordering::SeqCst);
    assert!(coord.reject("held", None).await.is_err());
    assert!(coord.get("held").is_some());

    gateway.fail_sends.store(false, Ordering::SeqCst);
    coord.reject("held", None).await.unwrap();
    assert_eq!(gateway.sent()[0].params["reason"], "Application rejected");
    assert!(coord.get("held").is_none());
    assert_eq!(coord.cleanup_expired(), 0);
}

#[tokio::test]
async fn test_worker_consumes_broadcast_events() {
    let gateway = FakeGateway::with_level(1);
    let coord = Arc::new(coordinator(
        Arc::clone(&gateway),
        vec![verify_task(100, basic_policy(VerifyMode::IgnoreAll))],
    ));
    let (tx, rx) = broadcast::channel(16);
    let _worker = coord.spawn(rx);

    tx.send(GatewayEvent::Heartbeat).unwrap();
    tx.send(GatewayEvent::JoinRequest(join(100, "bcast", "hi"))).unwrap();

    for _ in 0..100 {
        if !gateway.sent().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let sent = gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].params["flag"], "bcast");
}
