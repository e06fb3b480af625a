// src/platforms/bridge.rs - WebSocket JSON bridge to the external messaging session

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;
use uuid::Uuid;

use crate::config::BridgeSettings;
use crate::platforms::{PlatformConnection, Transport};
use crate::types::{
    AddMode, GroupRoster, GuardError, GuardResult, InboundEvent, JoinRequest, MessageRef,
    OutgoingText, ParticipantAction,
};

// Type aliases for cleaner code
type WebSocketWriter = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;
type PendingRequests = Arc<Mutex<HashMap<Uuid, oneshot::Sender<BridgeResponse>>>>;

/// Error codes the session reports when the bot lacks group rights
const CAPABILITY_CODES: [&str; 3] = ["forbidden", "not-authorized", "not-admin"];

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: Uuid,
    op: &'a str,
    params: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct BridgeResponse {
    id: Uuid,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<BridgeFailure>,
}

#[derive(Debug, Clone, Deserialize)]
struct BridgeFailure {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeFrame {
    Response(BridgeResponse),
    Event { event: InboundEvent },
}

/// Connection to the session sidecar; clones share one socket
#[derive(Clone)]
pub struct BridgeConnection {
    settings: BridgeSettings,
    event_sender: Option<broadcast::Sender<InboundEvent>>,
    websocket_writer: Arc<RwLock<Option<WebSocketWriter>>>,
    pending: PendingRequests,
    bot_id: Arc<std::sync::RwLock<String>>,
    is_connected: Arc<RwLock<bool>>,
}

impl BridgeConnection {
    pub fn new(settings: BridgeSettings) -> Self {
        Self {
            settings,
            event_sender: None,
            websocket_writer: Arc::new(RwLock::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            bot_id: Arc::new(std::sync::RwLock::new(String::new())),
            is_connected: Arc::new(RwLock::new(false)),
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout_seconds)
    }

    /// Send one request and wait for its correlated response
    async fn call(&self, op: &str, chat_id: Option<&str>, params: Value) -> GuardResult<Value> {
        let id = Uuid::new_v4();
        let frame = serde_json::to_string(&BridgeRequest { id, op, params })
            .map_err(|e| GuardError::transport(op, e))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        {
            let mut writer = self.websocket_writer.write().await;
            let Some(writer) = writer.as_mut() else {
                self.pending.lock().await.remove(&id);
                return Err(GuardError::transport(op, "not connected to the session bridge"));
            };
            if let Err(e) = writer.send(Message::Text(frame)).await {
                self.pending.lock().await.remove(&id);
                return Err(GuardError::transport(op, e));
            }
        }
        debug!("Bridge request {} ({}) sent", op, id);

        let response = match tokio::time::timeout(self.request_timeout(), rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(GuardError::transport(op, "connection closed")),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(GuardError::transport(op, "timed out"));
            }
        };

        if response.ok {
            Ok(response.result)
        } else {
            Err(failure_to_error(op, chat_id, response.error))
        }
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        op: &str,
        chat_id: Option<&str>,
        params: Value,
    ) -> GuardResult<T> {
        let value = self.call(op, chat_id, params).await?;
        serde_json::from_value(value).map_err(|e| GuardError::transport(op, e))
    }

    async fn call_unit(&self, op: &str, chat_id: &str, params: Value) -> GuardResult<()> {
        self.call(op, Some(chat_id), params).await.map(|_| ())
    }
}

fn failure_to_error(op: &str, chat_id: Option<&str>, failure: Option<BridgeFailure>) -> GuardError {
    match failure {
        Some(f) if CAPABILITY_CODES.contains(&f.code.as_str()) => GuardError::Capability {
            chat: chat_id.unwrap_or_default().to_string(),
            action: op.to_string(),
        },
        Some(f) if f.message.is_empty() => GuardError::transport(op, f.code),
        Some(f) => GuardError::transport(op, format!("{}: {}", f.code, f.message)),
        None => GuardError::transport(op, "request rejected"),
    }
}

fn parse_frame(text: &str) -> Option<BridgeFrame> {
    match serde_json::from_str(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Ignoring malformed bridge frame: {}", e);
            None
        }
    }
}

#[derive(Deserialize)]
struct InviteCode {
    code: String,
}

#[derive(Deserialize)]
struct Identity {
    id: String,
}

#[async_trait]
impl PlatformConnection for BridgeConnection {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to session bridge at {}...", self.settings.url);

        let url = Url::parse(&self.settings.url).context("Failed to parse bridge URL")?;
        let (ws_stream, _) = connect_async(url)
            .await
            .context("Failed to connect to session bridge")?;

        let (write, read) = ws_stream.split();
        *self.websocket_writer.write().await = Some(write);

        let (tx, _) = broadcast::channel(1000);
        self.event_sender = Some(tx.clone());
        *self.is_connected.write().await = true;

        let event_sender = tx;
        let pending = Arc::clone(&self.pending);
        let is_connected = Arc::clone(&self.is_connected);
        let writer_for_pong = Arc::clone(&self.websocket_writer);

        tokio::spawn(async move {
            let mut read = read;
            info!("Bridge reader started");

            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        Some(BridgeFrame::Response(response)) => {
                            match pending.lock().await.remove(&response.id) {
                                Some(waiter) => {
                                    let _ = waiter.send(response);
                                }
                                None => debug!("Response for unknown request {}", response.id),
                            }
                        }
                        Some(BridgeFrame::Event { event }) => {
                            if let Err(e) = event_sender.send(event) {
                                warn!("Failed to broadcast event: {}", e);
                            }
                        }
                        None => {}
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if let Some(writer) = writer_for_pong.write().await.as_mut() {
                            if let Err(e) = writer.send(Message::Pong(payload)).await {
                                error!("Failed to send pong: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(close_frame))) => {
                        info!("Bridge connection closed: {:?}", close_frame);
                        break;
                    }
                    Some(Ok(_)) => debug!("Ignoring non-text bridge frame"),
                    Some(Err(e)) => {
                        error!("Bridge WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        warn!("Bridge stream ended");
                        break;
                    }
                }
            }

            // Dropping the waiters fails every in-flight request
            pending.lock().await.clear();
            *is_connected.write().await = false;
            warn!("Bridge reader exited");
        });

        let me: Identity = self
            .call_typed("me", None, json!({}))
            .await
            .context("Failed to fetch bot identity from bridge")?;
        info!("Connected to session bridge as {}", me.id);
        if let Ok(mut bot_id) = self.bot_id.write() {
            *bot_id = me.id;
        }
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "whatsapp"
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    fn get_event_receiver(&self) -> Option<broadcast::Receiver<InboundEvent>> {
        self.event_sender.as_ref().map(|sender| sender.subscribe())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut writer) = self.websocket_writer.write().await.take() {
            if let Err(e) = writer.send(Message::Close(None)).await {
                debug!("Close frame not delivered: {}", e);
            }
        }
        *self.is_connected.write().await = false;
        self.event_sender = None;
        info!("Disconnected from session bridge");
        Ok(())
    }
}

#[async_trait]
impl Transport for BridgeConnection {
    fn bot_id(&self) -> String {
        self.bot_id.read().map(|id| id.clone()).unwrap_or_default()
    }

    async fn send_text(&self, chat_id: &str, message: OutgoingText) -> GuardResult<()> {
        let params = json!({ "chatId": chat_id, "message": message });
        self.call_unit("send_text", chat_id, params).await
    }

    async fn delete_message(&self, message: &MessageRef) -> GuardResult<()> {
        self.call_unit("delete_message", &message.chat_id, json!({ "key": message }))
            .await
    }

    async fn remove_participant(&self, chat_id: &str, participant: &str) -> GuardResult<()> {
        self.update_participant(chat_id, participant, ParticipantAction::Remove)
            .await
    }

    async fn update_participant(
        &self,
        chat_id: &str,
        participant: &str,
        action: ParticipantAction,
    ) -> GuardResult<()> {
        let params = json!({ "chatId": chat_id, "participants": [participant], "action": action });
        self.call_unit("update_participants", chat_id, params).await
    }

    async fn block_participant(&self, participant: &str) -> GuardResult<()> {
        let params = json!({ "jid": participant, "action": "block" });
        self.call("update_block_status", None, params).await.map(|_| ())
    }

    async fn get_group_roster(&self, chat_id: &str) -> GuardResult<GroupRoster> {
        self.call_typed("group_metadata", Some(chat_id), json!({ "chatId": chat_id }))
            .await
    }

    async fn update_subject(&self, chat_id: &str, subject: &str) -> GuardResult<()> {
        let params = json!({ "chatId": chat_id, "subject": subject });
        self.call_unit("group_update_subject", chat_id, params).await
    }

    async fn update_description(&self, chat_id: &str, description: &str) -> GuardResult<()> {
        let params = json!({ "chatId": chat_id, "description": description });
        self.call_unit("group_update_description", chat_id, params).await
    }

    async fn set_announce_only(&self, chat_id: &str, enabled: bool) -> GuardResult<()> {
        let setting = if enabled { "announcement" } else { "not_announcement" };
        let params = json!({ "chatId": chat_id, "setting": setting });
        self.call_unit("group_setting_update", chat_id, params).await
    }

    async fn set_ephemeral(&self, chat_id: &str, seconds: u32) -> GuardResult<()> {
        let params = json!({ "chatId": chat_id, "expiration": seconds });
        self.call_unit("group_toggle_ephemeral", chat_id, params).await
    }

    async fn set_member_add_mode(&self, chat_id: &str, mode: AddMode) -> GuardResult<()> {
        let params = json!({ "chatId": chat_id, "mode": mode });
        self.call_unit("group_member_add_mode", chat_id, params).await
    }

    async fn invite_code(&self, chat_id: &str) -> GuardResult<String> {
        let invite: InviteCode = self
            .call_typed("group_invite_code", Some(chat_id), json!({ "chatId": chat_id }))
            .await?;
        Ok(invite.code)
    }

    async fn revoke_invite(&self, chat_id: &str) -> GuardResult<String> {
        let invite: InviteCode = self
            .call_typed("group_revoke_invite", Some(chat_id), json!({ "chatId": chat_id }))
            .await?;
        Ok(invite.code)
    }

    async fn leave_group(&self, chat_id: &str) -> GuardResult<()> {
        self.call_unit("group_leave", chat_id, json!({ "chatId": chat_id }))
            .await
    }

    async fn join_requests(&self, chat_id: &str) -> GuardResult<Vec<JoinRequest>> {
        self.call_typed(
            "group_request_participants_list",
            Some(chat_id),
            json!({ "chatId": chat_id }),
        )
        .await
    }

    async fn pin_message(&self, message: &MessageRef, pinned: bool) -> GuardResult<()> {
        // Pins expire after 24 hours
        let params = json!({ "key": message, "pin": pinned, "seconds": 86_400 });
        self.call_unit("pin_message", &message.chat_id, params).await
    }

    async fn set_group_picture(&self, chat_id: &str, source: &MessageRef) -> GuardResult<()> {
        let params = json!({ "chatId": chat_id, "source": source });
        self.call_unit("update_profile_picture", chat_id, params).await
    }

    async fn send_profile_card(
        &self,
        chat_id: &str,
        participant: &str,
        caption: &str,
        mentions: Vec<String>,
    ) -> GuardResult<()> {
        let params = json!({
            "chatId": chat_id,
            "participant": participant,
            "caption": caption,
            "mentions": mentions,
        });
        self.call_unit("send_profile_card", chat_id, params).await
    }
}
