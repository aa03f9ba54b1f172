use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::broker::QueueConsumer;
use crate::config::Settings;
use crate::confirm::{confirmation_question, ConfirmationCoordinator, PendingProposal, ProposalPayload};
use crate::error::CoreResult;
use crate::nlp::types::ParseRequest;
use crate::nlp::EventParser;
use crate::registry::ConnectionRegistry;
use crate::wire::{new_message_id, peek_kind, MessageKind, RoutedMessage};

/// The queue consumer behind every client session. Plain text payloads run
/// through the parser and come back as confirmation proposals; already-typed
/// messages (confirmations, rejections) pass straight through to the socket.
pub struct ParseWorker {
    parser: Arc<EventParser>,
    registry: Arc<ConnectionRegistry>,
    coordinator: Arc<ConfirmationCoordinator>,
    settings: Settings,
}

impl ParseWorker {
    pub fn new(
        parser: Arc<EventParser>,
        registry: Arc<ConnectionRegistry>,
        coordinator: Arc<ConfirmationCoordinator>,
        settings: Settings,
    ) -> Self {
        Self {
            parser,
            registry,
            coordinator,
            settings,
        }
    }

    fn extract_text(payload: &str) -> String {
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => value
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string()),
            Err(_) => payload.to_string(),
        }
    }
}

#[async_trait]
impl QueueConsumer for ParseWorker {
    async fn handle(&self, client_id: &str, payload: String) -> CoreResult<()> {
        // Outbound messages ride the same queue; forward them untouched.
        if peek_kind(&payload).is_some() {
            if !self.registry.send(client_id, payload)? {
                debug!(client_id, "client offline, outbound message dropped");
            }
            return Ok(());
        }

        let text = Self::extract_text(&payload);
        let request = ParseRequest {
            prompt: text.clone(),
            locale: None,
            user_timezone: self.settings.default_timezone.name().to_string(),
            user_id: None,
        };
        let response = self.parser.parse(&request);

        let message_id = new_message_id();
        let (kind, proposal_payload) = match (&response.data, response.success) {
            (Some(event), true) => (MessageKind::ParsedResult, ProposalPayload::Parsed(event.clone())),
            _ => (
                MessageKind::Error,
                ProposalPayload::Failed(
                    response.error.clone().unwrap_or_else(|| "parse failed".to_string()),
                ),
            ),
        };
        let question = confirmation_question(&proposal_payload, &text);

        let routed = RoutedMessage {
            original_text: text,
            client_id: client_id.to_string(),
            timestamp: Utc::now(),
            kind,
            success: response.success,
            requires_confirmation: true,
            message_id: message_id.clone(),
            candidate: response.data,
            error: response.error,
            confirmation_question: Some(question),
        };

        self.coordinator.propose(PendingProposal {
            client_id: client_id.to_string(),
            message_id: message_id.clone(),
            payload: proposal_payload,
            created_at: Utc::now(),
        })?;
        info!(client_id, message_id = %message_id, success = routed.success, "proposal issued");

        if !self.registry.send(client_id, routed.to_wire_string())? {
            debug!(client_id, "client offline, proposal parked for reconnect");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn worker() -> (ParseWorker, mpsc::UnboundedReceiver<String>, Arc<ConfirmationCoordinator>) {
        let settings = Settings::default();
        let registry = Arc::new(ConnectionRegistry::new());
        let coordinator = Arc::new(ConfirmationCoordinator::new());
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("c1", tx).unwrap();
        let worker = ParseWorker::new(
            Arc::new(EventParser::new(settings.clone())),
            registry,
            Arc::clone(&coordinator),
            settings,
        );
        (worker, rx, coordinator)
    }

    #[tokio::test]
    async fn text_payload_becomes_a_proposal() {
        let (worker, mut rx, coordinator) = worker();
        worker
            .handle("c1", r#"{"text":"create meeting tomorrow at 15:00"}"#.to_string())
            .await
            .unwrap();

        let wire: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(wire["type"], "parsed_result");
        assert_eq!(wire["requires_confirmation"], true);
        assert_eq!(wire["success"], true);
        assert_eq!(wire["client_id"], "c1");

        let pending = coordinator.pending_for("c1").unwrap().unwrap();
        assert_eq!(pending.message_id, wire["message_id"].as_str().unwrap());
        assert!(matches!(pending.payload, ProposalPayload::Parsed(_)));
    }

    #[tokio::test]
    async fn raw_text_without_json_wrapping_still_parses() {
        let (worker, mut rx, _) = worker();
        worker
            .handle("c1", "schedule standup tomorrow at 9:00".to_string())
            .await
            .unwrap();
        let wire: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(wire["original_text"], "schedule standup tomorrow at 9:00");
    }

    #[tokio::test]
    async fn empty_prompt_yields_error_proposal() {
        let (worker, mut rx, coordinator) = worker();
        worker
            .handle("c1", r#"{"text":"   "}"#.to_string())
            .await
            .unwrap();
        let wire: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(wire["type"], "error");
        assert_eq!(wire["success"], false);
        assert_eq!(wire["requires_confirmation"], true);
        let pending = coordinator.pending_for("c1").unwrap().unwrap();
        assert!(matches!(pending.payload, ProposalPayload::Failed(_)));
    }

    #[tokio::test]
    async fn typed_message_passes_through_unchanged() {
        let (worker, mut rx, coordinator) = worker();
        let outbound = r#"{"type":"confirmation","text":"ok","client_id":"c1"}"#;
        worker.handle("c1", outbound.to_string()).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), outbound);
        assert!(coordinator.pending_for("c1").unwrap().is_none());
    }

    #[tokio::test]
    async fn offline_client_still_gets_a_parked_proposal() {
        let settings = Settings::default();
        let coordinator = Arc::new(ConfirmationCoordinator::new());
        let worker = ParseWorker::new(
            Arc::new(EventParser::new(settings.clone())),
            Arc::new(ConnectionRegistry::new()),
            Arc::clone(&coordinator),
            settings,
        );
        worker
            .handle("c1", r#"{"text":"meeting tomorrow"}"#.to_string())
            .await
            .unwrap();
        assert!(coordinator.pending_for("c1").unwrap().is_some());
    }
}
