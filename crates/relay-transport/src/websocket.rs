//! WebSocket binding of the relay.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{
        FromRequestParts, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use relay_core::traits::{CompletionBackend, DocumentStore, UserId};
use serde::Deserialize;
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::{
    channel::ChannelTransport,
    protocol::{ClientMessage, ServerMessage},
    relay::{ChannelEvent, Relay},
};

/// WebSocket handler state.
pub struct WsState<D: ?Sized, B: ?Sized> {
    pub relay: Arc<Relay<D, B>>,
    /// Access token to the user it authenticates.
    pub tokens: Arc<HashMap<String, UserId>>,
}

impl<D: ?Sized, B: ?Sized> Clone for WsState<D, B> {
    fn clone(&self) -> Self {
        Self {
            relay: Arc::clone(&self.relay),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

/// User authenticated by the upgrade request.
///
/// The token comes from an `Authorization: Bearer` header or, for browsers
/// that cannot set headers on a WebSocket, a `token` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundUser(pub UserId);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl<D, B> FromRequestParts<WsState<D, B>> for BoundUser
where
    D: DocumentStore + ?Sized + 'static,
    B: CompletionBackend + ?Sized + 'static,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &WsState<D, B>,
    ) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string);
        let token = match bearer {
            Some(token) => Some(token),
            None => Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(query)| query.token),
        };

        match token.as_ref().and_then(|t| state.tokens.get(t)) {
            Some(&user_id) => Ok(Self(user_id)),
            None => {
                tracing::warn!("refused WebSocket upgrade without a known token");
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler<D, B>(
    BoundUser(user_id): BoundUser,
    State(state): State<WsState<D, B>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse
where
    D: DocumentStore + ?Sized + 'static,
    B: CompletionBackend + ?Sized + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(socket, state.relay, user_id))
}

/// The user a text frame is handled for, `None` when it claims someone else.
fn frame_user(bound: UserId, claimed: Option<UserId>) -> Option<UserId> {
    match claimed {
        Some(other) if other != bound => None,
        _ => Some(bound),
    }
}

async fn handle_socket<D, B>(socket: WebSocket, relay: Arc<Relay<D, B>>, bound: UserId)
where
    D: DocumentStore + ?Sized + 'static,
    B: CompletionBackend + ?Sized + 'static,
{
    let connection = Uuid::new_v4();
    tracing::info!(%connection, user_id = bound, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let (transport, mut rx) = ChannelTransport::unbounded();

    // Forward server messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut exchanges = JoinSet::new();
    while let Some(msg) = receiver.next().await {
        while exchanges.try_join_next().is_some() {}

        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s.into(),
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let client_msg: ClientMessage = match serde_json::from_str(msg.as_str()) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid client message: {e}");
                let _ = transport.send(ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                });
                continue;
            }
        };

        match client_msg {
            ClientMessage::Ping => {
                let _ = transport.send(ServerMessage::Pong);
            }
            ClientMessage::Text { user_id, text } => {
                let Some(user_id) = frame_user(bound, user_id) else {
                    tracing::warn!(%connection, user_id = bound, "frame claimed another user");
                    let _ = transport.send(ServerMessage::Error {
                        message: "This connection speaks for another user".to_string(),
                    });
                    continue;
                };
                let event = ChannelEvent::parse(user_id, &text);
                let relay = Arc::clone(&relay);
                let transport = transport.clone();
                exchanges.spawn(async move {
                    if let Err(e) = relay.handle(event, &transport).await {
                        tracing::warn!(user_id, "Failed to answer: {e}");
                    }
                });
            }
        }
    }

    // Dropping an exchange mid-run leaves the session untouched
    exchanges.abort_all();
    send_task.abort();
    tracing::info!(%connection, "WebSocket disconnected");
}

/// Create WebSocket router serving `/ws`.
///
/// Only clients presenting one of `tokens` may connect; an empty map
/// refuses everyone.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_ws_router(relay, config.server.tokens.clone()));
/// ```
#[must_use]
pub fn create_ws_router<D, B>(relay: Arc<Relay<D, B>>, tokens: HashMap<String, UserId>) -> axum::Router
where
    D: DocumentStore + ?Sized + 'static,
    B: CompletionBackend + ?Sized + 'static,
{
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler::<D, B>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(WsState {
            relay,
            tokens: Arc::new(tokens),
        })
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use relay_executor::{RunCoordinator, testing::MockBackend};
    use relay_session::{ConversationManager, storage::MemoryStorage};
    use tower::ServiceExt;

    use super::*;

    fn router() -> axum::Router {
        let manager = ConversationManager::new(
            Arc::new(MemoryStorage::new()),
            RunCoordinator::new(Arc::new(MockBackend::new())),
        );
        let relay: Arc<Relay<MemoryStorage, MockBackend>> = Arc::new(Relay::new(Arc::new(manager)));
        create_ws_router(relay, HashMap::from([("s3cret".to_string(), 42)]))
    }

    async fn status(request: Request<Body>) -> StatusCode {
        router().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_upgrade_without_token_is_refused() {
        let request = Request::get("/ws").body(Body::empty()).unwrap();
        assert_eq!(status(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upgrade_with_unknown_token_is_refused() {
        let request = Request::get("/ws?token=guess").body(Body::empty()).unwrap();
        assert_eq!(status(request).await, StatusCode::UNAUTHORIZED);

        let request = Request::get("/ws")
            .header(header::AUTHORIZATION, "Bearer guess")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_known_token_passes_authentication() {
        // Not a real upgrade, so the WebSocket extractor rejects it next.
        let request = Request::get("/ws?token=s3cret").body(Body::empty()).unwrap();
        assert_ne!(status(request).await, StatusCode::UNAUTHORIZED);

        let request = Request::get("/ws")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        assert_ne!(status(request).await, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_frames_cannot_speak_for_other_users() {
        assert_eq!(frame_user(42, None), Some(42));
        assert_eq!(frame_user(42, Some(42)), Some(42));
        assert_eq!(frame_user(42, Some(7)), None);
    }
}
