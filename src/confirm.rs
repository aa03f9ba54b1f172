//! Two-phase confirmation: every parse outcome becomes a pending proposal
//! that the client must confirm or reject before anything is persisted.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::nlp::types::{Language, ParsedEvent};

/// What the client is being asked to approve.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposalPayload {
    Parsed(ParsedEvent),
    /// The parse failed; the client is asked whether to continue anyway.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingProposal {
    pub client_id: String,
    pub message_id: String,
    pub payload: ProposalPayload,
    pub created_at: DateTime<Utc>,
}

/// Resolution of a client reply against the pending proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Confirmed(PendingProposal),
    Rejected(PendingProposal),
    /// Reply was neither affirmative nor negative; the proposal stays open.
    Invalid {
        message_id: Option<String>,
        reply: String,
    },
    /// Reply referenced a proposal that is no longer current.
    Stale,
}

/// One open proposal per client. Proposing while one is open supersedes it.
#[derive(Default)]
pub struct ConfirmationCoordinator {
    pending: Mutex<HashMap<String, PendingProposal>>,
}

const AFFIRMATIVE: &[&str] = &["ha", "yes", "да", "ok", "1"];
const NEGATIVE: &[&str] = &["yo'q", "no", "нет", "cancel", "0"];

impl ConfirmationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a proposal, returning the one it superseded, if any.
    pub fn propose(&self, proposal: PendingProposal) -> CoreResult<Option<PendingProposal>> {
        let superseded = self
            .lock()?
            .insert(proposal.client_id.clone(), proposal);
        if superseded.is_some() {
            debug!("pending proposal superseded");
        }
        Ok(superseded)
    }

    /// Applies a client reply. `response_to` must match the open proposal's
    /// message id when present; a mismatch means the reply is stale.
    pub fn resolve(
        &self,
        client_id: &str,
        response_to: Option<&str>,
        reply: &str,
    ) -> CoreResult<Outcome> {
        let mut pending = self.lock()?;
        let current = match pending.get(client_id) {
            Some(p) => p,
            None => return Ok(Outcome::Stale),
        };
        if let Some(response_to) = response_to {
            if response_to != current.message_id {
                return Ok(Outcome::Stale);
            }
        }

        let reply_norm = reply.trim().to_lowercase();
        if AFFIRMATIVE.contains(&reply_norm.as_str()) {
            match pending.remove(client_id) {
                Some(proposal) => Ok(Outcome::Confirmed(proposal)),
                None => Ok(Outcome::Stale),
            }
        } else if NEGATIVE.contains(&reply_norm.as_str()) {
            match pending.remove(client_id) {
                Some(proposal) => Ok(Outcome::Rejected(proposal)),
                None => Ok(Outcome::Stale),
            }
        } else {
            Ok(Outcome::Invalid {
                message_id: Some(current.message_id.clone()),
                reply: reply_norm,
            })
        }
    }

    /// Drops any open proposal, e.g. when the session ends.
    pub fn clear(&self, client_id: &str) -> CoreResult<()> {
        self.lock()?.remove(client_id);
        Ok(())
    }

    pub fn pending_for(&self, client_id: &str) -> CoreResult<Option<PendingProposal>> {
        Ok(self.lock()?.get(client_id).cloned())
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, HashMap<String, PendingProposal>>> {
        self.pending
            .lock()
            .map_err(|_| CoreError::Internal("confirmation state lock poisoned".into()))
    }
}

pub fn confirmation_question(payload: &ProposalPayload, original_text: &str) -> String {
    match payload {
        ProposalPayload::Parsed(event) => {
            let title = event.title.as_deref().unwrap_or("Tadbiringiz");
            format!("'{title}' tadbirini yaratishni tasdiqlaysizmi? (Ha/Yo'q)")
        }
        ProposalPayload::Failed(_) => {
            let preview: String = original_text.chars().take(30).collect();
            format!("'{preview}' uchun amalni tasdiqlaysizmi? (Ha/Yo'q)")
        }
    }
}

pub fn confirmed_text(language: Option<Language>) -> String {
    match language {
        Some(Language::Russian) => "✅ Подтверждено! Событие создано.".to_string(),
        Some(Language::English) => "✅ Confirmed! Event created.".to_string(),
        _ => "✅ Tasdiqlandi! Tadbir yaratildi.".to_string(),
    }
}

pub fn rejected_text(language: Option<Language>) -> String {
    match language {
        Some(Language::Russian) => "❌ Отменено.".to_string(),
        Some(Language::English) => "❌ Cancelled.".to_string(),
        _ => "❌ Bekor qilindi.".to_string(),
    }
}

pub fn invalid_reply_text(reply: &str) -> String {
    format!("⚠️ Noto'g'ri javob: '{reply}'. Iltimos, 'Ha' yoki 'Yo'q' deb javob bering.")
}

pub fn stale_reply_text() -> String {
    "⚠️ Bu so'rov endi amalda emas.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::types::Intent;

    fn proposal(client_id: &str, message_id: &str) -> PendingProposal {
        let event = ParsedEvent::new(Intent::Create, Language::English, "meeting".into());
        PendingProposal {
            client_id: client_id.to_string(),
            message_id: message_id.to_string(),
            payload: ProposalPayload::Parsed(event),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn affirmative_reply_confirms() {
        let coordinator = ConfirmationCoordinator::new();
        coordinator.propose(proposal("c1", "m1")).unwrap();
        let outcome = coordinator.resolve("c1", Some("m1"), "Yes").unwrap();
        assert!(matches!(outcome, Outcome::Confirmed(p) if p.message_id == "m1"));
        assert!(coordinator.pending_for("c1").unwrap().is_none());
    }

    #[test]
    fn negative_reply_rejects() {
        let coordinator = ConfirmationCoordinator::new();
        coordinator.propose(proposal("c1", "m1")).unwrap();
        let outcome = coordinator.resolve("c1", None, "нет").unwrap();
        assert!(matches!(outcome, Outcome::Rejected(_)));
    }

    #[test]
    fn unintelligible_reply_keeps_proposal_open() {
        let coordinator = ConfirmationCoordinator::new();
        coordinator.propose(proposal("c1", "m1")).unwrap();
        let outcome = coordinator.resolve("c1", Some("m1"), "maybe").unwrap();
        assert!(matches!(outcome, Outcome::Invalid { .. }));
        assert!(coordinator.pending_for("c1").unwrap().is_some());
        // A follow-up valid reply still works.
        let outcome = coordinator.resolve("c1", Some("m1"), "ha").unwrap();
        assert!(matches!(outcome, Outcome::Confirmed(_)));
    }

    #[test]
    fn reply_without_open_proposal_is_stale() {
        let coordinator = ConfirmationCoordinator::new();
        let outcome = coordinator.resolve("c1", Some("m1"), "yes").unwrap();
        assert_eq!(outcome, Outcome::Stale);
    }

    #[test]
    fn mismatched_response_to_is_stale() {
        let coordinator = ConfirmationCoordinator::new();
        coordinator.propose(proposal("c1", "m2")).unwrap();
        let outcome = coordinator.resolve("c1", Some("m1"), "yes").unwrap();
        assert_eq!(outcome, Outcome::Stale);
        // The open proposal is untouched.
        assert!(coordinator.pending_for("c1").unwrap().is_some());
    }

    #[test]
    fn new_proposal_supersedes_previous() {
        let coordinator = ConfirmationCoordinator::new();
        coordinator.propose(proposal("c1", "m1")).unwrap();
        let superseded = coordinator.propose(proposal("c1", "m2")).unwrap();
        assert_eq!(superseded.unwrap().message_id, "m1");
        // Replying to the old id no longer resolves.
        let outcome = coordinator.resolve("c1", Some("m1"), "yes").unwrap();
        assert_eq!(outcome, Outcome::Stale);
        let outcome = coordinator.resolve("c1", Some("m2"), "yes").unwrap();
        assert!(matches!(outcome, Outcome::Confirmed(_)));
    }

    #[test]
    fn clients_are_isolated() {
        let coordinator = ConfirmationCoordinator::new();
        coordinator.propose(proposal("c1", "m1")).unwrap();
        coordinator.propose(proposal("c2", "m2")).unwrap();
        coordinator.resolve("c1", Some("m1"), "yes").unwrap();
        assert!(coordinator.pending_for("c2").unwrap().is_some());
    }
}
