//! # Steward Requests
//! Group join-request verification: the decision engine, the registry of
//! requests held for an operator, and the coordinator that ties them to the
//! gateway.

pub mod coordinator;
pub mod registry;
pub mod verify;

pub use coordinator::{DEFAULT_REJECT_REASON, JoinRequestCoordinator};
pub use registry::{PendingGroupRequest, RequestStats, RequestStatus, SuspendedRegistry};
pub use verify::{Decision, Outcome, decide, extract_answer};
