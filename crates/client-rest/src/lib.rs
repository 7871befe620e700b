//! REST/WebSocket transport adapter for the chatter client.
//!
//! Implements the [`ChatApi`] collaborator against the chat server's HTTP
//! endpoints and the [`LiveFeed`] collaborator against its per-room
//! WebSocket streams. All transport failures are classified into the
//! [`ChatError`] taxonomy; retry decisions stay with the synchronization
//! controller.

use async_trait::async_trait;
use chrono::DateTime;
use client_core::{ChatError, Message, Room, RoomId, Session, UserId, classify_status};
use client_sync::{ChatApi, FeedEvent, FeedSubscription, LiveFeed};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

const FEED_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
struct MessageDto {
    id: u64,
    user_id: u64,
    content: String,
    timestamp: String,
}

impl MessageDto {
    fn into_message(self, room_id: RoomId) -> Result<Message, ChatError> {
        Ok(Message {
            id: Some(self.id),
            room_id,
            author_id: self.user_id,
            body: self.content,
            created_at_ms: parse_timestamp_ms(&self.timestamp)?,
            client_tag: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RoomDto {
    id: u64,
    name: String,
    created_at: String,
}

impl RoomDto {
    fn into_room(self) -> Result<Room, ChatError> {
        Ok(Room {
            id: self.id,
            name: self.name,
            created_at_ms: parse_timestamp_ms(&self.created_at)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LoginDto {
    success: bool,
    user_id: Option<u64>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct CredentialsBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRoomBody<'a> {
    chat_name: &'a str,
}

#[derive(Debug, Serialize)]
struct PostMessageBody<'a> {
    user_id: UserId,
    content: &'a str,
}

/// One frame on a room's WebSocket stream.
#[derive(Debug, Deserialize)]
struct FeedFrame {
    #[serde(rename = "type")]
    kind: String,
    message: Option<MessageDto>,
}

/// The server serializes timestamps as RFC 3339.
fn parse_timestamp_ms(value: &str) -> Result<u64, ChatError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis().max(0) as u64)
        .map_err(|err| ChatError::Network(format!("unparseable timestamp '{value}': {err}")))
}

fn map_request_error(err: reqwest::Error) -> ChatError {
    ChatError::Network(err.to_string())
}

/// Append a trailing slash so `Url::join` treats the base as a directory.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    url
}

/// [`ChatApi`] implementation over the chat server's REST endpoints.
#[derive(Debug, Clone)]
pub struct RestApi {
    http: reqwest::Client,
    base: Url,
}

impl RestApi {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: normalize_base(base),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ChatError> {
        self.base
            .join(path)
            .map_err(|err| ChatError::Network(format!("invalid endpoint '{path}': {err}")))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(classify_status(status.as_u16(), detail))
    }
}

#[async_trait]
impl ChatApi for RestApi {
    async fn history(&self, room_id: RoomId) -> Result<Vec<Message>, ChatError> {
        let url = self.endpoint(&format!("chats/{room_id}/messages"))?;
        let response = self.http.get(url).send().await.map_err(map_request_error)?;
        let dtos: Vec<MessageDto> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(map_request_error)?;

        dtos.into_iter()
            .map(|dto| dto.into_message(room_id))
            .collect()
    }

    async fn post_message(
        &self,
        room_id: RoomId,
        author_id: UserId,
        body: &str,
    ) -> Result<Message, ChatError> {
        let url = self.endpoint(&format!("chats/{room_id}/messages"))?;
        let response = self
            .http
            .post(url)
            .json(&PostMessageBody {
                user_id: author_id,
                content: body,
            })
            .send()
            .await
            .map_err(map_request_error)?;
        let dto: MessageDto = Self::check(response)
            .await?
            .json()
            .await
            .map_err(map_request_error)?;

        dto.into_message(room_id)
    }

    async fn rooms(&self) -> Result<Vec<Room>, ChatError> {
        let url = self.endpoint("chats")?;
        let response = self.http.get(url).send().await.map_err(map_request_error)?;
        let dtos: Vec<RoomDto> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(map_request_error)?;

        dtos.into_iter().map(RoomDto::into_room).collect()
    }

    async fn create_room(&self, name: &str) -> Result<Room, ChatError> {
        let url = self.endpoint("chats")?;
        let response = self
            .http
            .post(url)
            .json(&CreateRoomBody { chat_name: name })
            .send()
            .await
            .map_err(map_request_error)?;
        let dto: RoomDto = Self::check(response)
            .await?
            .json()
            .await
            .map_err(map_request_error)?;

        dto.into_room()
    }

    async fn register(&self, username: &str, password: &str) -> Result<(), ChatError> {
        let url = self.endpoint("register")?;
        let response = self
            .http
            .post(url)
            .json(&CredentialsBody { username, password })
            .send()
            .await
            .map_err(map_request_error)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> Result<Session, ChatError> {
        let url = self.endpoint("login")?;
        let response = self
            .http
            .post(url)
            .json(&CredentialsBody { username, password })
            .send()
            .await
            .map_err(map_request_error)?;
        let dto: LoginDto = Self::check(response)
            .await?
            .json()
            .await
            .map_err(map_request_error)?;

        if !dto.success {
            return Err(ChatError::Unauthorized);
        }
        let user_id = dto.user_id.ok_or_else(|| {
            ChatError::Network(format!(
                "login response missing user id: {}",
                dto.message.unwrap_or_default()
            ))
        })?;

        Ok(Session {
            user_id,
            username: username.to_owned(),
        })
    }
}

/// [`LiveFeed`] implementation over per-room WebSocket streams.
#[derive(Debug, Clone)]
pub struct WsFeed {
    base: Url,
}

impl WsFeed {
    pub fn new(base: Url) -> Self {
        Self {
            base: normalize_base(base),
        }
    }
}

#[async_trait]
impl LiveFeed for WsFeed {
    async fn subscribe(&self, room_id: RoomId) -> Result<FeedSubscription, ChatError> {
        let url = self
            .base
            .join(&format!("chats/{room_id}/stream"))
            .map_err(|err| ChatError::Network(format!("invalid stream url: {err}")))?;

        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| ChatError::Network(err.to_string()))?;
        debug!(room_id, url = %url, "live feed connected");

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let stop = CancellationToken::new();
        tokio::spawn(read_loop(stream, tx, stop.clone(), room_id));

        Ok(FeedSubscription::new(rx, stop))
    }
}

/// Pump one WebSocket connection into the subscription channel.
///
/// Each pushed message is forwarded exactly once for this connection epoch;
/// the loop ends with a single `Disconnected` event unless the subscription
/// was cancelled first.
async fn read_loop(
    mut stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    tx: mpsc::Sender<FeedEvent>,
    stop: CancellationToken,
    room_id: RoomId,
) {
    let reason = loop {
        tokio::select! {
            _ = stop.cancelled() => {
                debug!(room_id, "live feed unsubscribed");
                let _ = stream.close(None).await;
                return;
            }
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<FeedFrame>(text.as_str()) {
                        Ok(frame) if frame.kind == "new_message" => {
                            let Some(dto) = frame.message else {
                                warn!(room_id, "new_message frame without payload");
                                continue;
                            };
                            match dto.into_message(room_id) {
                                Ok(message) => {
                                    if tx.send(FeedEvent::Message(message)).await.is_err() {
                                        // Subscriber went away; stop reading.
                                        return;
                                    }
                                }
                                Err(err) => {
                                    warn!(room_id, error = %err, "dropping malformed feed message");
                                }
                            }
                        }
                        Ok(frame) => debug!(room_id, kind = %frame.kind, "ignoring feed frame"),
                        Err(err) => warn!(room_id, error = %err, "dropping undecodable feed frame"),
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "closed by server".to_owned());
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => break err.to_string(),
                None => break "stream ended".to_owned(),
            }
        }
    };

    let _ = tx.send(FeedEvent::Disconnected { reason }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_dto_with_rfc3339_timestamp() {
        let dto: MessageDto = serde_json::from_str(
            r#"{"id": 7, "user_id": 3, "content": "hi", "timestamp": "2026-08-07T12:00:00+00:00"}"#,
        )
        .expect("dto should parse");

        let message = dto.into_message(1).expect("conversion should work");
        assert_eq!(message.id, Some(7));
        assert_eq!(message.author_id, 3);
        assert_eq!(message.created_at_ms, 1_786_104_000_000);
        assert_eq!(message.client_tag, None);
    }

    #[test]
    fn rejects_unparseable_timestamps() {
        let err = parse_timestamp_ms("yesterday").expect_err("should fail");
        assert!(matches!(err, ChatError::Network(_)));
    }

    #[test]
    fn parses_new_message_feed_frames() {
        let frame: FeedFrame = serde_json::from_str(
            r#"{"type": "new_message", "message": {"id": 1, "user_id": 2, "content": "yo", "timestamp": "2026-08-07T12:00:00Z"}}"#,
        )
        .expect("frame should parse");

        assert_eq!(frame.kind, "new_message");
        assert_eq!(frame.message.map(|m| m.id), Some(1));
    }

    #[test]
    fn builds_endpoints_with_and_without_trailing_slash() {
        let with = RestApi::new(Url::parse("http://localhost:5000/").expect("url"));
        let without = RestApi::new(Url::parse("http://localhost:5000").expect("url"));

        assert_eq!(
            with.endpoint("chats/4/messages").expect("endpoint").as_str(),
            "http://localhost:5000/chats/4/messages"
        );
        assert_eq!(
            without
                .endpoint("chats/4/messages")
                .expect("endpoint")
                .as_str(),
            "http://localhost:5000/chats/4/messages"
        );
    }

    #[test]
    fn login_dto_tolerates_missing_fields() {
        let dto: LoginDto =
            serde_json::from_str(r#"{"success": false, "message": "Invalid username or password."}"#)
                .expect("dto should parse");
        assert!(!dto.success);
        assert_eq!(dto.user_id, None);
    }
}
