//! Realtime change feed over the backend's Phoenix-channel WebSocket.
//!
//! Each subscription owns one socket: it joins
//! `realtime:public:{table}` with a `postgres_changes` config, keeps the
//! socket alive with heartbeats, and converts `INSERT`/`UPDATE` records into
//! [`ChangeEvent`]s pushed to the subscriber's queue in arrival order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use taskboard_proto::{ChangeEvent, ChangeKind, Table};

use super::{GatewayError, SubscriptionHandle};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// One Phoenix channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    /// Channel topic, e.g. `realtime:public:tasks`.
    pub topic: String,
    /// Event name, e.g. `phx_join` or `postgres_changes`.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub payload: Value,
    /// Message reference echoed in replies.
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    /// Reference of the join that opened the channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// What an inbound frame means to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A tracked row change.
    Change(ChangeEvent),
    /// Reply to a message we sent.
    Reply {
        /// Reference of the message being answered.
        reference: Option<String>,
        /// `true` when the server answered `"status": "ok"`.
        ok: bool,
    },
    /// The server closed or errored the channel.
    Closed,
    /// Anything else: presence, system notices, untracked changes.
    Ignored,
}

/// Builds the channel topic for a table.
#[must_use]
pub fn topic(table: Table) -> String {
    format!("realtime:public:{table}")
}

/// Builds the `phx_join` message for a table.
#[must_use]
pub fn join_message(table: Table, access_token: &str, reference: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic(table),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "postgres_changes": [
                    { "event": "*", "schema": "public", "table": table.as_str() }
                ]
            },
            "access_token": access_token,
        }),
        reference: Some(reference.to_string()),
        join_ref: Some(reference.to_string()),
    }
}

fn heartbeat_message(reference: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

fn leave_message(table: Table, reference: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic(table),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

/// Decodes one text frame received on a `table` subscription.
///
/// Accepts both the `postgres_changes` envelope (record under
/// `payload.data`) and the legacy per-kind events (`INSERT`/`UPDATE` with the
/// record directly under `payload`). Deletes and list updates are ignored.
///
/// # Errors
///
/// Returns [`GatewayError::DataAccess`] if the frame is not a Phoenix message
/// or a change record does not convert.
pub fn decode_frame(table: Table, text: &str) -> Result<Inbound, GatewayError> {
    let msg: PhoenixMessage = serde_json::from_str(text)
        .map_err(|e| GatewayError::DataAccess(format!("malformed realtime frame: {e}")))?;

    match msg.event.as_str() {
        "phx_reply" => Ok(Inbound::Reply {
            ok: msg.payload.get("status").and_then(Value::as_str) == Some("ok"),
            reference: msg.reference,
        }),
        "phx_close" | "phx_error" => Ok(Inbound::Closed),
        "postgres_changes" => {
            let data = msg.payload.get("data").cloned().unwrap_or(Value::Null);
            decode_change(table, &data)
        }
        "INSERT" | "UPDATE" => decode_change(table, &msg.payload),
        _ => Ok(Inbound::Ignored),
    }
}

fn decode_change(table: Table, data: &Value) -> Result<Inbound, GatewayError> {
    let kind = match data.get("type").and_then(Value::as_str) {
        Some("INSERT") => ChangeKind::Insert,
        Some("UPDATE") => ChangeKind::Update,
        _ => return Ok(Inbound::Ignored),
    };
    let record = data.get("record").cloned().unwrap_or(Value::Null);
    Ok(ChangeEvent::from_record(table, kind, record)?.map_or(Inbound::Ignored, Inbound::Change))
}

/// Connection parameters for the realtime endpoint.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket URL including the `apikey` query parameter.
    pub url: String,
    /// End-user access token sent in `phx_join`.
    pub access_token: String,
    /// Interval between heartbeats.
    pub heartbeat: Duration,
}

struct Running {
    shutdown: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

/// Owns the live realtime subscriptions of one gateway.
pub struct RealtimeHub {
    config: RealtimeConfig,
    running: Mutex<HashMap<u64, Running>>,
    next_id: AtomicU64,
}

impl RealtimeHub {
    /// Creates a hub with no subscriptions.
    #[must_use]
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            running: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Connects, joins the table's channel and spawns the session task.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DataAccess`] if the socket cannot be opened or
    /// the join is not acknowledged in time, and
    /// [`GatewayError::Authorization`] if the server refuses the join.
    pub async fn subscribe(
        &self,
        table: Table,
        events: mpsc::Sender<ChangeEvent>,
    ) -> Result<SubscriptionHandle, GatewayError> {
        let (mut ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.config.url.as_str()))
            .await
            .map_err(|_| {
                tracing::warn!(%table, "realtime connect timed out");
                GatewayError::DataAccess("realtime connect timed out".to_string())
            })?
            .map_err(|e| {
                tracing::warn!(%table, err = %e, "realtime connect failed");
                GatewayError::DataAccess(format!("realtime connect failed: {e}"))
            })?;

        let join = join_message(table, &self.config.access_token, 1);
        send_json(&mut ws, &join).await?;
        tokio::time::timeout(JOIN_TIMEOUT, await_join_reply(&mut ws, table))
            .await
            .map_err(|_| {
                tracing::warn!(%table, "realtime join timed out");
                GatewayError::DataAccess("realtime join timed out".to_string())
            })??;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = SubscriptionHandle::new(id, table);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(session_loop(
            ws,
            table,
            events,
            shutdown_rx,
            self.config.heartbeat,
        ));
        self.running.lock().insert(id, Running { shutdown, task });

        tracing::info!(%handle, "realtime subscription joined");
        Ok(handle)
    }

    /// Leaves the channel and waits for the session task to finish.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let Some(running) = self.running.lock().remove(&handle.id()) else {
            tracing::debug!(%handle, "unsubscribe for unknown handle");
            return;
        };
        let _ = running.shutdown.send(());
        if let Err(e) = running.task.await {
            tracing::warn!(%handle, err = %e, "realtime session task failed");
        }
    }
}

impl Drop for RealtimeHub {
    fn drop(&mut self) {
        for (_, running) in self.running.lock().drain() {
            running.task.abort();
        }
    }
}

async fn send_json(ws: &mut WsStream, msg: &PhoenixMessage) -> Result<(), GatewayError> {
    let text = serde_json::to_string(msg)
        .map_err(|e| GatewayError::DataAccess(format!("encode realtime frame: {e}")))?;
    ws.send(Message::Text(text.into()))
        .await
        .map_err(|e| GatewayError::DataAccess(format!("realtime send failed: {e}")))
}

async fn await_join_reply(ws: &mut WsStream, table: Table) -> Result<(), GatewayError> {
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Text(text)) => match decode_frame(table, &text)? {
                Inbound::Reply { ok: true, .. } => return Ok(()),
                Inbound::Reply { ok: false, .. } | Inbound::Closed => {
                    tracing::warn!(%table, "realtime join rejected");
                    return Err(GatewayError::Authorization(
                        "realtime join rejected".to_string(),
                    ));
                }
                Inbound::Change(_) | Inbound::Ignored => {}
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(GatewayError::DataAccess(format!(
                    "realtime read failed during join: {e}"
                )));
            }
        }
    }
    Err(GatewayError::DataAccess(
        "realtime socket closed during join".to_string(),
    ))
}

/// Heartbeat period actually used; never shorter than [`MIN_HEARTBEAT`].
fn heartbeat_period(configured: Duration) -> Duration {
    configured.max(MIN_HEARTBEAT)
}

/// Reads frames until shutdown, the socket closes, or the subscriber goes away.
async fn session_loop(
    mut ws: WsStream,
    table: Table,
    events: mpsc::Sender<ChangeEvent>,
    mut shutdown: oneshot::Receiver<()>,
    heartbeat: Duration,
) {
    let mut ticker = tokio::time::interval(heartbeat_period(heartbeat));
    ticker.tick().await;
    let mut reference: u64 = 2;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let leave = leave_message(table, reference);
                if let Err(e) = send_json(&mut ws, &leave).await {
                    tracing::debug!(%table, err = %e, "phx_leave not delivered");
                }
                let _ = ws.close(None).await;
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = send_json(&mut ws, &heartbeat_message(reference)).await {
                    tracing::warn!(%table, err = %e, "realtime heartbeat failed");
                    break;
                }
                reference += 1;
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => match decode_frame(table, &text) {
                    Ok(Inbound::Change(event)) => {
                        if events.send(event).await.is_err() {
                            tracing::debug!(%table, "event queue closed, ending session");
                            break;
                        }
                    }
                    Ok(Inbound::Closed) => {
                        tracing::warn!(%table, "realtime channel closed by server");
                        break;
                    }
                    Ok(Inbound::Reply { .. } | Inbound::Ignored) => {}
                    Err(e) => {
                        tracing::warn!(%table, err = %e, "dropping undecodable realtime frame");
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(%table, "realtime socket closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(%table, err = %e, "realtime read error");
                    break;
                }
            }
        }
    }
    tracing::debug!(%table, "realtime session exiting");
}
