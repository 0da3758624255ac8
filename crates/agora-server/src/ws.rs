//! WebSocket endpoint: authenticated upgrade, the inbound frame loop, and
//! receipt broadcasting.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use agora_shared::protocol::{ClientFrame, ServerFrame};
use agora_shared::Identity;

use crate::api::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    access_token: Option<String>,
}

/// `GET /ws?access_token=...`
///
/// The token is resolved under the collaborator deadline before the
/// upgrade; anything but a verified identity rejects the upgrade and the
/// socket never opens.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.access_token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match tokio::time::timeout(state.config.ops_timeout, state.identity.verify_bearer(&token)).await
    {
        Ok(Some(identity)) => {
            ws.on_upgrade(move |socket| handle_connection(socket, state, identity))
        }
        Ok(None) => {
            debug!("websocket upgrade rejected: invalid token");
            StatusCode::UNAUTHORIZED.into_response()
        }
        Err(_) => {
            warn!("websocket upgrade rejected: identity verification timed out");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

/// One task per connection: a writer draining the hub channel, and the
/// inbound loop below.  Whatever way the connection ends, it is removed
/// from the registry.
async fn handle_connection(socket: WebSocket, state: AppState, identity: Identity) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let conn_id = state.hub.register(&identity, tx.clone()).await;
    info!(identity = %identity, conn = %conn_id, "websocket connected");

    let _ = tx.send(ServerFrame::Hello { ok: true });

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_frame(&state, &identity, &tx, &text).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    // Binary and protocol-level ping/pong carry no meaning here.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(identity = %identity, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            _ = &mut writer => break,
        }
    }

    state.hub.unregister(&identity, conn_id).await;
    writer.abort();
    info!(identity = %identity, conn = %conn_id, "websocket disconnected");
}

/// Dispatch one inbound frame.  Malformed or failing frames are logged and
/// dropped; the connection stays up.
async fn handle_frame(
    state: &AppState,
    identity: &Identity,
    tx: &mpsc::UnboundedSender<ServerFrame>,
    text: &str,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(identity = %identity, error = %e, "ignoring malformed frame");
            return;
        }
    };

    match frame {
        ClientFrame::Ping => {
            let _ = tx.send(ServerFrame::Pong { ts: Utc::now() });
        }

        ClientFrame::MessageDelivered { message_id } => {
            let vis = match state.blocks.visibility_for(identity).await {
                Ok(vis) => vis,
                Err(e) => {
                    debug!(identity = %identity, error = %e, "receipt dropped");
                    return;
                }
            };
            match state.ledger.mark_delivered(&vis, message_id).await {
                Ok(Some((conversation, message))) => {
                    let frame = ServerFrame::MessageDelivered {
                        conversation_id: conversation.id,
                        message_id: message.id,
                        by: identity.clone(),
                    };
                    state
                        .hub
                        .broadcast(conversation.participants.iter(), &frame)
                        .await;
                }
                Ok(None) => {}
                Err(e) => debug!(identity = %identity, error = %e, "delivery receipt failed"),
            }
        }

        ClientFrame::ConversationRead { conversation_id } => {
            let vis = match state.blocks.visibility_for(identity).await {
                Ok(vis) => vis,
                Err(e) => {
                    debug!(identity = %identity, error = %e, "receipt dropped");
                    return;
                }
            };
            match state.ledger.mark_read(&vis, conversation_id).await {
                Ok(Some(conversation)) => {
                    let frame = ServerFrame::ConversationRead {
                        conversation_id: conversation.id,
                        by: identity.clone(),
                        ts: Utc::now(),
                    };
                    state
                        .hub
                        .broadcast(conversation.participants.iter(), &frame)
                        .await;
                }
                Ok(None) => {}
                Err(e) => debug!(identity = %identity, error = %e, "read receipt failed"),
            }
        }
    }
}
