//! # Steward Gateway
//! OneBot WebSocket client: command/response correlation, event fan-out,
//! message markup and outbound throttling.

pub mod client;
pub mod markup;
pub mod protocol;
pub mod rate_limit;

pub use client::{Gateway, GatewayClient, SendOutcome};
pub use protocol::{ActionRequest, ActionResponse, GatewayEvent, JoinRequestEvent};
pub use rate_limit::{Denied, RateLimiter};
