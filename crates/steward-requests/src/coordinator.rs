//! Join-request handling: find the group's verification task, look up the
//! applicant's level, decide, then answer the gateway or park the request.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use steward_core::catalog::TaskCatalog;
use steward_core::error::{Result, StewardError};
use steward_gateway::{ActionRequest, Gateway, GatewayEvent, JoinRequestEvent};

use crate::registry::{PendingGroupRequest, RequestStats, RequestStatus, SuspendedRegistry};
use crate::verify::{self, Decision, Outcome};

/// Reason sent when an operator rejects without giving one.
pub const DEFAULT_REJECT_REASON: &str = "Application rejected";

pub struct JoinRequestCoordinator {
    gateway: Arc<dyn Gateway>,
    catalog: Arc<TaskCatalog>,
    registry: SuspendedRegistry,
    call_timeout: Duration,
}

impl JoinRequestCoordinator {
    pub fn new(gateway: Arc<dyn Gateway>, catalog: Arc<TaskCatalog>, call_timeout: Duration) -> Self {
        Self {
            gateway,
            catalog,
            registry: SuspendedRegistry::new(),
            call_timeout,
        }
    }

    /// Consume join-request events until the event channel closes.
    pub fn spawn(self: &Arc<Self>, mut events: broadcast::Receiver<GatewayEvent>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(GatewayEvent::JoinRequest(request)) => {
                        let coordinator = Arc::clone(&coordinator);
                        tokio::spawn(async move {
                            if let Err(e) = coordinator.handle(&request).await {
                                tracing::error!(
                                    "❌ Join request {} for group {} failed: {e}",
                                    request.flag,
                                    request.group_id
                                );
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("⚠️ Join-request worker lagged, {n} event(s) skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::info!("Join-request worker stopped");
        })
    }

    /// Handle one join request. `None` when no verification task covers the group.
    pub async fn handle(&self, request: &JoinRequestEvent) -> Result<Option<Decision>> {
        let Some(task) = self.catalog.verify_task_for_group(request.group_id) else {
            tracing::debug!(
                "No verification task for group {}, ignoring request from {}",
                request.group_id,
                request.user_id
            );
            return Ok(None);
        };
        let Some(policy) = task.policy() else {
            return Ok(None);
        };

        let answer = verify::extract_answer(&request.comment);
        let level = self.fetch_level(request.user_id).await;
        let decision = verify::decide(policy, &answer, level);
        tracing::info!(
            "🔍 Join request: group={} user={} level={} answer='{}' → {:?} ({})",
            request.group_id,
            request.user_id,
            level,
            answer,
            decision.outcome,
            decision.reason
        );

        match decision.outcome {
            Outcome::Accept => {
                self.answer(&request.flag, true, "").await?;
            }
            Outcome::Reject => {
                let message = verify::reject_message(policy);
                self.answer(&request.flag, false, &message).await?;
            }
            Outcome::Hold => {
                self.registry.insert(PendingGroupRequest {
                    group_id: request.group_id,
                    user_id: request.user_id,
                    flag: request.flag.clone(),
                    comment: request.comment.clone(),
                    reason: decision.reason.clone(),
                    received_at: Local::now(),
                    status: RequestStatus::Suspended,
                });
                tracing::info!(
                    "⏸️ Join request {} suspended, {} awaiting review",
                    request.flag,
                    self.registry.len()
                );
            }
        }
        Ok(Some(decision))
    }

    /// Applicant level; 0 when the lookup fails or times out.
    pub async fn fetch_level(&self, user_id: i64) -> i64 {
        match self
            .gateway
            .call(ActionRequest::get_stranger_info(user_id), self.call_timeout)
            .await
        {
            Ok(response) if response.is_ok() => response.level().unwrap_or(0),
            Ok(response) => {
                tracing::warn!(
                    "⚠️ Level lookup for {user_id} failed: {}",
                    response.error_text()
                );
                0
            }
            Err(e) => {
                tracing::warn!("⚠️ Level lookup for {user_id} failed: {e}");
                0
            }
        }
    }

    async fn answer(&self, flag: &str, approve: bool, reason: &str) -> Result<()> {
        self.gateway
            .send(ActionRequest::set_group_add_request(flag, approve, reason))
            .await?;
        Ok(())
    }

    /// Approve a suspended request.
    pub async fn approve(&self, flag: &str) -> Result<PendingGroupRequest> {
        self.resolve(flag, true, "").await
    }

    /// Reject a suspended request.
    pub async fn reject(&self, flag: &str, reason: Option<&str>) -> Result<PendingGroupRequest> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REJECT_REASON);
        self.resolve(flag, false, reason).await
    }

    async fn resolve(&self, flag: &str, approve: bool, reason: &str) -> Result<PendingGroupRequest> {
        // Take the entry so two operators cannot resolve it twice.
        let mut entry = self
            .registry
            .remove(flag)
            .ok_or_else(|| StewardError::NotFound(format!("suspended request '{flag}'")))?;

        if let Err(e) = self.answer(flag, approve, reason).await {
            self.registry.insert(entry);
            return Err(e);
        }

        entry.status = if approve {
            RequestStatus::Approved
        } else {
            RequestStatus::Rejected
        };
        tracing::info!(
            "✅ Suspended request {} {:?} (group {}, user {})",
            flag,
            entry.status,
            entry.group_id,
            entry.user_id
        );
        Ok(entry)
    }

    /// Drop suspended requests older than seven days.
    pub fn cleanup_expired(&self) -> usize {
        let removed = self.registry.cleanup_expired_at(Local::now());
        if removed > 0 {
            tracing::info!("🧹 Removed {removed} expired suspended request(s)");
        }
        removed
    }

    pub fn suspended(&self) -> Vec<PendingGroupRequest> {
        self.registry.list()
    }

    pub fn suspended_for_group(&self, group_id: i64) -> Vec<PendingGroupRequest> {
        self.registry.for_group(group_id)
    }

    pub fn get(&self, flag: &str) -> Option<PendingGroupRequest> {
        self.registry.get(flag)
    }

    pub fn stats(&self) -> RequestStats {
        self.registry.stats()
    }
}
