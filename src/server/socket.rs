use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use utoipa::IntoParams;

use crate::broker::ConsumerTag;
use crate::confirm::{
    confirmed_text, invalid_reply_text, rejected_text, stale_reply_text, Outcome, ProposalPayload,
};
use crate::error::CoreResult;
use crate::server::AppState;
use crate::store::EventStore;
use crate::wire::now_rfc3339;
use crate::wire::{ClientFrame, InboundEnvelope, MessageKind, OutcomeMessage};

#[derive(Debug, Deserialize, IntoParams)]
pub struct SocketParams {
    pub token: Option<String>,
}

/// Upgrades `GET /ws?token=...` into a client session.
pub(crate) async fn client_socket(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SocketParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(state, socket, params.token))
}

async fn handle_connection(state: Arc<AppState>, mut socket: WebSocket, token: Option<String>) {
    let client_id = match token {
        Some(token) => match state.verifier.verify(&token).await {
            Ok(client_id) => client_id,
            Err(err) => {
                debug!(error = %err, "websocket rejected");
                close_with(&mut socket, close_code::POLICY, "invalid token").await;
                return;
            }
        },
        None => {
            close_with(&mut socket, close_code::POLICY, "missing token").await;
            return;
        }
    };

    let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    if state.registry.register(&client_id, out_tx.clone()).is_err() {
        close_with(&mut socket, close_code::ERROR, "registry unavailable").await;
        return;
    }

    // A reconnect can race the previous session's teardown; give the old
    // consumer a moment to detach before giving up.
    let tag = match bind_with_retry(&state, &client_id).await {
        Some(tag) => tag,
        None => {
            let _ = state.registry.disconnect(&client_id, &out_tx);
            close_with(&mut socket, close_code::AGAIN, "session busy").await;
            return;
        }
    };
    info!(client_id, "client session started");

    let (mut sink, mut stream) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = out_rx.recv().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(raw) => {
                if let Err(err) = handle_frame(&state, &client_id, &raw).await {
                    warn!(client_id, error = %err, "frame handling failed");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!(client_id, "client session ended");
    end_session(&state, &client_id, &out_tx, &tag).await;
    writer.abort();
}

/// Tears down one session's share of the shared state. The registry entry
/// and pending proposal are released only while this session still owns
/// them; a successor session that already re-registered is left intact.
pub async fn end_session(
    state: &Arc<AppState>,
    client_id: &str,
    out_tx: &tokio::sync::mpsc::UnboundedSender<String>,
    tag: &ConsumerTag,
) {
    let owned = state
        .registry
        .disconnect(client_id, out_tx)
        .unwrap_or(false);
    let _ = state.broker.unbind(client_id, tag).await;
    if owned {
        let _ = state.coordinator.clear(client_id);
    }
}

async fn bind_with_retry(state: &Arc<AppState>, client_id: &str) -> Option<ConsumerTag> {
    let consumer = Arc::clone(&state.worker);
    for _ in 0..3 {
        match state.broker.bind(client_id, consumer.clone()).await {
            Ok(tag) => return Some(tag),
            Err(err) => {
                debug!(client_id, error = %err, "bind attempt failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    None
}

/// Processes one raw frame from a client: replies resolve the open
/// proposal, anything else is queued for parsing.
pub async fn handle_frame(state: &Arc<AppState>, client_id: &str, raw: &str) -> CoreResult<()> {
    let frame: Option<ClientFrame> = serde_json::from_str(raw).ok();

    // A frame carrying response_to answers the open proposal.
    if let Some(frame) = frame.as_ref().filter(|f| f.response_to.is_some()) {
        return handle_reply(state, client_id, frame).await;
    }

    let text = frame
        .and_then(|f| f.text)
        .unwrap_or_else(|| raw.to_string());
    let envelope = InboundEnvelope {
        text,
        timestamp: now_rfc3339(),
        client_id: client_id.to_string(),
    };
    let payload = serde_json::to_string(&envelope)
        .map_err(|e| crate::error::CoreError::Internal(e.to_string()))?;
    state.broker.publish(client_id, payload).await
}

async fn handle_reply(state: &Arc<AppState>, client_id: &str, frame: &ClientFrame) -> CoreResult<()> {
    let reply = frame.text.clone().unwrap_or_default();
    let outcome = state
        .coordinator
        .resolve(client_id, frame.response_to.as_deref(), &reply)?;

    let outcome_message = match outcome {
        Outcome::Confirmed(proposal) => {
            let language = match &proposal.payload {
                ProposalPayload::Parsed(event) => {
                    state.store.create_event(client_id, event).await?;
                    info!(client_id, message_id = %proposal.message_id, "event persisted");
                    Some(event.language)
                }
                ProposalPayload::Failed(_) => None,
            };
            OutcomeMessage {
                text: confirmed_text(language),
                kind: MessageKind::Confirmation,
                client_id: client_id.to_string(),
                timestamp: now_rfc3339(),
                original_message_id: Some(proposal.message_id),
            }
        }
        Outcome::Rejected(proposal) => {
            let language = match &proposal.payload {
                ProposalPayload::Parsed(event) => Some(event.language),
                ProposalPayload::Failed(_) => None,
            };
            OutcomeMessage {
                text: rejected_text(language),
                kind: MessageKind::Rejection,
                client_id: client_id.to_string(),
                timestamp: now_rfc3339(),
                original_message_id: Some(proposal.message_id),
            }
        }
        Outcome::Invalid { message_id, reply } => OutcomeMessage {
            text: invalid_reply_text(&reply),
            kind: MessageKind::Error,
            client_id: client_id.to_string(),
            timestamp: now_rfc3339(),
            original_message_id: message_id,
        },
        Outcome::Stale => OutcomeMessage {
            text: stale_reply_text(),
            kind: MessageKind::Error,
            client_id: client_id.to_string(),
            timestamp: now_rfc3339(),
            original_message_id: frame.response_to.clone(),
        },
    };

    let payload = serde_json::to_string(&outcome_message)
        .map_err(|e| crate::error::CoreError::Internal(e.to_string()))?;
    state.broker.publish(client_id, payload).await
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}
