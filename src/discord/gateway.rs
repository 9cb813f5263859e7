//! Discord gateway (websocket) client.
//!
//! One shard, JSON encoding. The session follows the gateway lifecycle:
//! 1. Receive Hello (op 10) with the heartbeat interval
//! 2. Send Identify (op 2), or Resume (op 6) when a session exists
//! 3. Heartbeat (op 1) every interval; a missing ACK (op 11) means the
//!    connection is dead and is reopened
//! 4. Forward dispatches (op 0) as [`GatewayEvent`]s
//!
//! Reconnect (op 7), Invalid Session (op 9) and non-fatal close codes
//! reopen the connection with exponential backoff. The backoff starts over
//! only once a connection has reached READY or RESUMED.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::model::{
    Channel, Guild, GuildMemberUpdate, GuildRole, GuildRoleDelete, GuildUpdate, Message, Ready,
    UnavailableGuild,
};

/// Default gateway endpoint.
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg";
const GATEWAY_QUERY: &str = "/?v=10&encoding=json";

/// Gateway intent: guild lifecycle and channels.
pub const INTENT_GUILDS: u64 = 1 << 0;
/// Gateway intent: messages in guild channels.
pub const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
/// Gateway intent: message content (privileged).
pub const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RESUME: u8 = 6;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Errors that end the gateway client for good.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway closed the connection with fatal code {code}: {reason}")]
    Fatal { code: u16, reason: String },

    #[error("Websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Malformed gateway payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Gateway protocol error: {0}")]
    Protocol(String),
}

/// Events forwarded to the bot.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Ready(Box<Ready>),
    GuildCreate(Box<Guild>),
    GuildDelete(UnavailableGuild),
    GuildUpdate(Box<GuildUpdate>),
    GuildRoleCreate(Box<GuildRole>),
    GuildRoleUpdate(Box<GuildRole>),
    GuildRoleDelete(GuildRoleDelete),
    GuildMemberUpdate(Box<GuildMemberUpdate>),
    ChannelCreate(Box<Channel>),
    ChannelUpdate(Box<Channel>),
    ChannelDelete(Box<Channel>),
    MessageCreate(Box<Message>),
}

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Decodes a dispatch into an event. Unhandled dispatch types yield `None`.
pub fn decode_dispatch(kind: &str, data: Value) -> Result<Option<GatewayEvent>, serde_json::Error> {
    let event = match kind {
        "READY" => GatewayEvent::Ready(Box::new(serde_json::from_value(data)?)),
        "GUILD_CREATE" => GatewayEvent::GuildCreate(Box::new(serde_json::from_value(data)?)),
        "GUILD_DELETE" => GatewayEvent::GuildDelete(serde_json::from_value(data)?),
        "GUILD_UPDATE" => GatewayEvent::GuildUpdate(Box::new(serde_json::from_value(data)?)),
        "GUILD_ROLE_CREATE" => GatewayEvent::GuildRoleCreate(Box::new(serde_json::from_value(data)?)),
        "GUILD_ROLE_UPDATE" => GatewayEvent::GuildRoleUpdate(Box::new(serde_json::from_value(data)?)),
        "GUILD_ROLE_DELETE" => GatewayEvent::GuildRoleDelete(serde_json::from_value(data)?),
        "GUILD_MEMBER_UPDATE" => {
            GatewayEvent::GuildMemberUpdate(Box::new(serde_json::from_value(data)?))
        }
        "CHANNEL_CREATE" | "THREAD_CREATE" => {
            GatewayEvent::ChannelCreate(Box::new(serde_json::from_value(data)?))
        }
        "CHANNEL_UPDATE" | "THREAD_UPDATE" => {
            GatewayEvent::ChannelUpdate(Box::new(serde_json::from_value(data)?))
        }
        "CHANNEL_DELETE" | "THREAD_DELETE" => {
            GatewayEvent::ChannelDelete(Box::new(serde_json::from_value(data)?))
        }
        "MESSAGE_CREATE" => GatewayEvent::MessageCreate(Box::new(serde_json::from_value(data)?)),
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// What to do after a close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Reconnect and resume the session.
    Resume,
    /// Reconnect with a fresh Identify.
    Reidentify,
    /// Stop; retrying cannot succeed.
    Fatal,
}

/// Maps a gateway close code to the action to take.
#[must_use]
pub const fn classify_close(code: u16) -> CloseAction {
    match code {
        // auth failed, invalid shard, sharding required, bad version, bad or disallowed intents
        4004 | 4010 | 4011 | 4012 | 4013 | 4014 => CloseAction::Fatal,
        // invalid seq, session timed out
        4007 | 4009 => CloseAction::Reidentify,
        _ => CloseAction::Resume,
    }
}

/// How a single connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Reconnect { resume: bool },
    Shutdown,
}

/// Resumable session data.
#[derive(Debug, Default, Clone)]
struct Session {
    session_id: Option<String>,
    resume_url: Option<String>,
    sequence: Option<u64>,
}

impl Session {
    fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Gateway client for a single shard.
pub struct Gateway {
    token: String,
    intents: u64,
    url: String,
    session: Session,
    /// Set once the current connection received READY or RESUMED.
    established: bool,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Gateway {
    /// Creates a gateway client with the given intents.
    #[must_use]
    pub fn new(token: String, intents: u64) -> Self {
        Self {
            token,
            intents,
            url: GATEWAY_URL.to_owned(),
            session: Session::default(),
            established: false,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }

    /// Runs until shutdown, the event receiver is dropped, or a fatal close.
    pub async fn run(
        mut self,
        events: mpsc::Sender<GatewayEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), GatewayError> {
        let mut backoff = self.initial_backoff;

        loop {
            let base = if self.session.can_resume() {
                self.session.resume_url.clone().unwrap_or_else(|| self.url.clone())
            } else {
                self.url.clone()
            };
            let url = format!("{}{GATEWAY_QUERY}", base.trim_end_matches('/'));

            self.established = false;
            let result = self.run_session(&url, &events, &mut shutdown).await;
            if self.established {
                backoff = self.initial_backoff;
            }

            match result {
                Ok(SessionEnd::Shutdown) => {
                    info!("Gateway shutting down");
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect { resume }) => {
                    if !resume {
                        self.session.clear();
                    }
                    debug!("Reconnecting to gateway in {:?} (resume: {})", backoff, resume);
                }
                Err(GatewayError::Fatal { code, reason }) => {
                    error!("Gateway closed with fatal code {}: {}", code, reason);
                    return Err(GatewayError::Fatal { code, reason });
                }
                Err(e) => {
                    warn!("Gateway connection failed: {}. Retrying in {:?}", e, backoff);
                }
            }

            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                _ = shutdown.changed() => return Ok(()),
            }
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }

    async fn run_session(
        &mut self,
        url: &str,
        events: &mpsc::Sender<GatewayEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, GatewayError> {
        info!("Connecting to gateway");
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut sink, mut stream) = ws.split();

        let heartbeat_ms = loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    let payload: GatewayPayload = serde_json::from_str(text.as_str())?;
                    if payload.op == OP_HELLO {
                        break payload
                            .d
                            .get("heartbeat_interval")
                            .and_then(Value::as_u64)
                            .ok_or_else(|| {
                                GatewayError::Protocol("Hello without heartbeat_interval".to_owned())
                            })?;
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    return Err(close_error(frame.as_ref().map_or(1000, |f| u16::from(f.code))));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(GatewayError::Protocol("Connection closed before Hello".to_owned())),
            }
        };
        debug!("Gateway hello, heartbeat every {}ms", heartbeat_ms);

        let handshake = if self.session.can_resume() {
            info!("Resuming gateway session");
            self.resume_payload()
        } else {
            self.identify_payload()
        };
        sink.send(WsMessage::Text(handshake.to_string().into())).await?;

        let period = Duration::from_millis(heartbeat_ms.max(1));
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut awaiting_ack = false;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        warn!("No heartbeat ACK received, reconnecting");
                        return Ok(SessionEnd::Reconnect { resume: true });
                    }
                    sink.send(WsMessage::Text(self.heartbeat_payload().to_string().into())).await?;
                    awaiting_ack = true;
                }
                msg = stream.next() => {
                    let text = match msg {
                        Some(Ok(WsMessage::Text(text))) => text,
                        Some(Ok(WsMessage::Close(frame))) => {
                            let code = frame.as_ref().map_or(1000, |f| u16::from(f.code));
                            return match classify_close(code) {
                                CloseAction::Fatal => Err(close_error(code)),
                                CloseAction::Reidentify => Ok(SessionEnd::Reconnect { resume: false }),
                                CloseAction::Resume => {
                                    debug!("Gateway closed with code {}", code);
                                    Ok(SessionEnd::Reconnect { resume: true })
                                }
                            };
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!("Gateway receive error: {}", e);
                            return Ok(SessionEnd::Reconnect { resume: true });
                        }
                        None => return Ok(SessionEnd::Reconnect { resume: true }),
                    };

                    let payload: GatewayPayload = match serde_json::from_str(text.as_str()) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("Skipping malformed gateway payload: {}", e);
                            continue;
                        }
                    };

                    match payload.op {
                        OP_DISPATCH => {
                            if let Some(seq) = payload.s {
                                self.session.sequence = Some(seq);
                            }
                            let Some(kind) = payload.t else { continue };
                            if kind == "RESUMED" {
                                info!("Gateway session resumed");
                                self.established = true;
                                continue;
                            }
                            if kind == "READY" {
                                self.established = true;
                                self.session.session_id = payload
                                    .d
                                    .get("session_id")
                                    .and_then(Value::as_str)
                                    .map(str::to_owned);
                                self.session.resume_url = payload
                                    .d
                                    .get("resume_gateway_url")
                                    .and_then(Value::as_str)
                                    .map(str::to_owned);
                            }
                            match decode_dispatch(&kind, payload.d) {
                                Ok(Some(event)) => {
                                    if events.send(event).await.is_err() {
                                        return Ok(SessionEnd::Shutdown);
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => warn!("Failed to decode {} dispatch: {}", kind, e),
                            }
                        }
                        OP_HEARTBEAT => {
                            sink.send(WsMessage::Text(self.heartbeat_payload().to_string().into())).await?;
                        }
                        OP_HEARTBEAT_ACK => awaiting_ack = false,
                        OP_RECONNECT => {
                            info!("Gateway requested reconnect");
                            return Ok(SessionEnd::Reconnect { resume: true });
                        }
                        OP_INVALID_SESSION => {
                            let resumable = payload.d.as_bool().unwrap_or(false);
                            warn!("Gateway session invalidated (resumable: {})", resumable);
                            tokio::time::sleep(Duration::from_secs(2)).await;
                            return Ok(SessionEnd::Reconnect { resume: resumable });
                        }
                        other => debug!("Ignoring gateway op {}", other),
                    }
                }
            }
        }
    }

    fn identify_payload(&self) -> Value {
        json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.token,
                "intents": self.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": env!("CARGO_PKG_NAME"),
                    "device": env!("CARGO_PKG_NAME"),
                },
            },
        })
    }

    fn resume_payload(&self) -> Value {
        json!({
            "op": OP_RESUME,
            "d": {
                "token": self.token,
                "session_id": self.session.session_id,
                "seq": self.session.sequence,
            },
        })
    }

    fn heartbeat_payload(&self) -> Value {
        json!({ "op": OP_HEARTBEAT, "d": self.session.sequence })
    }
}

fn close_error(code: u16) -> GatewayError {
    let reason = match code {
        4004 => "authentication failed, check DISCORD_BOT_TOKEN",
        4013 => "invalid intents",
        4014 => "disallowed intents, enable the Message Content intent in the developer portal",
        _ => "connection closed",
    };
    if classify_close(code) == CloseAction::Fatal {
        GatewayError::Fatal {
            code,
            reason: reason.to_owned(),
        }
    } else {
        GatewayError::Protocol(format!("closed with code {code}: {reason}"))
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("intents", &self.intents)
            .field("url", &self.url)
            .field("sequence", &self.session.sequence)
            .finish_non_exhaustive()
    }
}
