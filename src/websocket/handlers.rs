use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::middleware::auth::{self, AuthenticatedUser};
use crate::models::MessageKind;
use crate::services::chat_service::ChatService;
use crate::state::AppState;
use crate::websocket::events::{WsInboundEvent, WsOutboundEvent};
use crate::websocket::SessionId;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Websocket entry point. The credential is checked before the
/// upgrade: a connection without a valid token never enters the
/// registry (refused, terminal).
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = params.token.clone().or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    });

    let user = match token.as_deref().map(|t| auth::verify_token(&state.config.jwt_secret, t)) {
        Some(Ok(user)) => user,
        _ => {
            tracing::warn!("websocket upgrade refused: missing or invalid token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, user, socket))
}

async fn handle_socket(state: AppState, user: AuthenticatedUser, socket: WebSocket) {
    let (session, mut rx) = state.registry.register(user.id).await;
    tracing::debug!(user_id = %user.id, session = ?session, "websocket session opened");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Events fanned out to this session by the registry.
            maybe = rx.recv() => match maybe {
                Some(event) => {
                    let Ok(txt) = serde_json::to_string(&event) else { continue };
                    if sender.send(Message::Text(txt)).await.is_err() {
                        break;
                    }
                }
                // Registry dropped us (full outbound buffer).
                None => break,
            },

            // Frames from the client.
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(txt))) => {
                    let reply = match serde_json::from_str::<WsInboundEvent>(&txt) {
                        Ok(event) => handle_event(&state, session, &user, event).await,
                        Err(_) => Some(WsOutboundEvent::Error {
                            message: "unrecognized event".into(),
                        }),
                    };
                    if let Some(reply) = reply {
                        let Ok(txt) = serde_json::to_string(&reply) else { continue };
                        if sender.send(Message::Text(txt)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    // Transport-level disconnect: release every group membership and
    // the user binding.
    state.registry.unregister(session).await;
    tracing::debug!(user_id = %user.id, session = ?session, "websocket session closed");
}

/// Dispatch one inbound event. The returned event, if any, is a direct
/// reply to the issuing session only; everything else flows through the
/// registry.
async fn handle_event(
    state: &AppState,
    session: SessionId,
    user: &AuthenticatedUser,
    event: WsInboundEvent,
) -> Option<WsOutboundEvent> {
    match event {
        WsInboundEvent::SendMessage {
            receiver_id,
            content,
            message_type,
        } => {
            let result = ChatService::send(
                &state.db,
                &state.registry,
                &state.config,
                user.id,
                receiver_id,
                content,
                message_type.unwrap_or(MessageKind::Text),
                Some(session),
            )
            .await;
            match result {
                // message_sent reaches this session through the registry.
                Ok(_) => None,
                Err(err) => Some(WsOutboundEvent::Error {
                    message: err.public_message(),
                }),
            }
        }

        WsInboundEvent::JoinConversation { other_user_id } => {
            match ChatService::join_conversation(
                &state.db,
                &state.registry,
                session,
                user.id,
                other_user_id,
            )
            .await
            {
                Ok(key) => Some(WsOutboundEvent::JoinedConversation {
                    conversation_id: key,
                }),
                Err(err) => Some(WsOutboundEvent::Error {
                    message: err.public_message(),
                }),
            }
        }

        WsInboundEvent::LeaveConversation { conversation_id } => {
            match ChatService::leave_conversation(
                &state.registry,
                session,
                user.id,
                &conversation_id,
            )
            .await
            {
                Ok(_) => None,
                Err(err) => Some(WsOutboundEvent::Error {
                    message: err.public_message(),
                }),
            }
        }

        WsInboundEvent::TypingStart { other_user_id } => {
            typing(state, user, other_user_id, true).await
        }
        WsInboundEvent::TypingStop { other_user_id } => {
            typing(state, user, other_user_id, false).await
        }
    }
}

async fn typing(
    state: &AppState,
    user: &AuthenticatedUser,
    other_user_id: uuid::Uuid,
    is_typing: bool,
) -> Option<WsOutboundEvent> {
    match ChatService::typing(&state.registry, user.id, other_user_id, is_typing).await {
        Ok(()) => None,
        Err(err) => Some(WsOutboundEvent::Error {
            message: err.public_message(),
        }),
    }
}
