//! OneBot WebSocket client.
//!
//! One long-lived connection, re-established forever after a fixed backoff.
//! Commands carry a uuid `echo`; replies are matched back to the waiting
//! caller through a map of oneshot senders. Events fan out over a broadcast
//! channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use steward_core::config::{BotConfig, SafetyConfig, StewardConfig};
use steward_core::error::{Result, StewardError};

use crate::markup;
use crate::protocol::{ActionRequest, ActionResponse, GatewayEvent, Inbound, classify};
use crate::rate_limit::{Denied, RateLimiter};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CAPACITY: usize = 256;

/// What happened to a fire-and-forget send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Dropped by the rate limiter.
    Throttled(Denied),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

/// The gateway operations the scheduler and join-request handling rely on.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fire-and-forget. Fails fast when disconnected.
    async fn send(&self, request: ActionRequest) -> Result<SendOutcome>;

    /// Send and wait for the correlated response.
    async fn call(&self, request: ActionRequest, timeout: Duration) -> Result<ActionResponse>;

    fn is_connected(&self) -> bool;
}

pub struct GatewayClient {
    bot: BotConfig,
    safety: SafetyConfig,
    message_log: bool,
    limiter: RateLimiter,
    pending: Mutex<HashMap<String, oneshot::Sender<ActionResponse>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    connected: AtomicBool,
    events: broadcast::Sender<GatewayEvent>,
}

impl GatewayClient {
    pub fn new(config: &StewardConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            bot: config.bot.clone(),
            safety: config.safety.clone(),
            message_log: config.log.message_log,
            limiter: RateLimiter::new(&config.safety),
            pending: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
            connected: AtomicBool::new(false),
            events,
        }
    }

    /// Receive every non-heartbeat event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.bot.call_timeout_secs)
    }

    /// Number of callers waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Run the connect/serve/reconnect loop in the background.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let backoff = Duration::from_secs(client.bot.reconnect_secs.max(1));
            loop {
                match client.connect().await {
                    Ok(ws) => client.serve(ws).await,
                    Err(e) => tracing::error!("❌ Gateway connect failed: {e}"),
                }
                client.on_disconnect();
                tracing::info!("🔄 Reconnecting to gateway in {}s", backoff.as_secs());
                tokio::time::sleep(backoff).await;
            }
        })
    }

    /// Open the WebSocket, with a bearer token when one is configured.
    async fn connect(&self) -> Result<WsStream> {
        tracing::info!("🔌 Connecting to gateway: {}", self.bot.websocket);
        let mut request = self
            .bot
            .websocket
            .as_str()
            .into_client_request()
            .map_err(|e| StewardError::Gateway(format!("Invalid websocket url: {e}")))?;
        if !self.bot.access_token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", self.bot.access_token))
                .map_err(|e| StewardError::Gateway(format!("Invalid access token: {e}")))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| StewardError::Gateway(format!("WebSocket connect failed: {e}")))?;
        tracing::info!("✅ Gateway connected");
        Ok(ws)
    }

    /// Pump outbound frames and dispatch inbound ones until the socket closes.
    async fn serve(&self, ws: WsStream) {
        let (mut write, mut read) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.outbound.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        self.connected.store(true, Ordering::SeqCst);

        loop {
            tokio::select! {
                Some(text) = rx.recv() => {
                    if let Err(e) = write.send(WsMessage::Text(text)).await {
                        tracing::error!("❌ Gateway write failed: {e}");
                        break;
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.handle_frame(&text),
                    Some(Ok(WsMessage::Ping(data))) => {
                        tracing::trace!("Gateway ping ({} bytes)", data.len());
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        tracing::info!("Gateway closed the connection: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("❌ Gateway read failed: {e}");
                        break;
                    }
                    None => break,
                },
            }
        }
    }

    /// Mark disconnected and fail every waiting caller.
    fn on_disconnect(&self) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let dropped = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            let n = pending.len();
            // Dropping the senders wakes the receivers with an error.
            pending.clear();
            n
        };
        if dropped > 0 {
            tracing::warn!("⚠️ Gateway disconnected with {dropped} pending call(s)");
        } else if was_connected {
            tracing::warn!("⚠️ Gateway disconnected");
        }
    }

    fn handle_frame(&self, text: &str) {
        match classify(text) {
            Ok(Inbound::Response(response)) => self.resolve(response),
            Ok(Inbound::Event(GatewayEvent::Heartbeat)) => {}
            Ok(Inbound::Event(event)) => {
                if self.message_log
                    && let GatewayEvent::Message {
                        name,
                        group_id,
                        user_id,
                        text,
                    } = &event
                {
                    tracing::info!("💬 [{name}] group={group_id:?} user={user_id}: {text}");
                } else {
                    tracing::debug!("📥 Event: {}", event.name());
                }
                // No subscribers is fine.
                let _ = self.events.send(event);
            }
            Err(e) => tracing::warn!("Failed to parse gateway frame: {e}"),
        }
    }

    /// Hand a response to its waiting caller, if any.
    fn resolve(&self, response: ActionResponse) {
        self.check_risk_control(&response);
        let Some(echo) = response.echo.clone() else {
            return;
        };
        let waiter = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&echo);
        match waiter {
            Some(tx) => {
                if tx.send(response).is_err() {
                    tracing::debug!("Caller for echo {echo} already gone");
                }
            }
            None => {
                if !response.is_ok() {
                    tracing::warn!("⚠️ Gateway command failed: {}", response.error_text());
                }
                tracing::debug!("Discarding response for unknown echo {echo}");
            }
        }
    }

    fn check_risk_control(&self, response: &ActionResponse) {
        if !self.safety.enable_auto_risk_control || response.is_ok() {
            return;
        }
        let text = response.error_text();
        if response.retcode == self.safety.risk_control_retcode
            || text.contains("风控")
            || text.to_lowercase().contains("risk")
        {
            tracing::warn!(
                "🚨 Risk control triggered (retcode {}): {text}",
                response.retcode
            );
        }
    }

    /// Render message markup in chat sends.
    fn render(mut request: ActionRequest) -> ActionRequest {
        if request.message_target().is_some()
            && let Some(message) = request.message()
        {
            let rendered = markup::render(message);
            request.params["message"] = rendered.into();
        }
        request
    }

    /// Queue a frame on the live connection.
    ///
    /// Chat sends claim a limiter slot only after the connection is known to
    /// be up, so a send that fails with `NotConnected` spends no quota.
    fn transmit(&self, request: &ActionRequest) -> Result<SendOutcome> {
        let text = serde_json::to_string(request)?;
        let outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        let tx = match outbound.as_ref() {
            Some(tx) if self.is_connected() && !tx.is_closed() => tx,
            _ => return Err(StewardError::NotConnected),
        };
        if let Some((target_id, is_group)) = request.message_target()
            && let Err(denied) = self.limiter.check_at(target_id, is_group, Instant::now())
        {
            return Ok(SendOutcome::Throttled(denied));
        }
        tx.send(text).map_err(|_| StewardError::NotConnected)?;
        tracing::debug!("📤 {} {}", request.action, request.params);
        Ok(SendOutcome::Sent)
    }
}

#[async_trait]
impl Gateway for GatewayClient {
    async fn send(&self, request: ActionRequest) -> Result<SendOutcome> {
        if !self.is_connected() {
            return Err(StewardError::NotConnected);
        }
        // Untracked echo: the reply is only inspected for failures.
        let request = Self::render(request).with_echo(uuid::Uuid::new_v4().to_string());
        let outcome = self.transmit(&request)?;
        if let SendOutcome::Throttled(denied) = outcome {
            tracing::warn!("⏳ {} throttled ({denied:?}), message dropped", request.action);
        }
        Ok(outcome)
    }

    async fn call(&self, request: ActionRequest, timeout: Duration) -> Result<ActionResponse> {
        if !self.is_connected() {
            return Err(StewardError::NotConnected);
        }
        let action = request.action.clone();
        let echo = uuid::Uuid::new_v4().to_string();
        let request = Self::render(request).with_echo(echo.clone());
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(echo.clone(), tx);

        let queued = match self.transmit(&request) {
            Ok(SendOutcome::Sent) => Ok(()),
            Ok(SendOutcome::Throttled(denied)) => Err(StewardError::Gateway(format!(
                "{action} throttled ({denied:?})"
            ))),
            Err(e) => Err(e),
        };
        if let Err(e) = queued {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&echo);
            return Err(e);
        }

        let outcome = tokio::time::timeout(timeout, rx).await;
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&echo);

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(StewardError::ConnectionClosed(action)),
            Err(_) => Err(StewardError::Timeout {
                action,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
