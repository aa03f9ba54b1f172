use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::nlp::types::ParsedEvent;

/// Persistence seam, invoked only after a proposal is confirmed.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create_event(&self, client_id: &str, event: &ParsedEvent) -> CoreResult<()>;
}

#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub client_id: String,
    pub event: ParsedEvent,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<StoredEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> CoreResult<Vec<StoredEvent>> {
        Ok(self
            .events
            .lock()
            .map_err(|_| CoreError::Internal("event store lock poisoned".into()))?
            .clone())
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn create_event(&self, client_id: &str, event: &ParsedEvent) -> CoreResult<()> {
        self.events
            .lock()
            .map_err(|_| CoreError::Internal("event store lock poisoned".into()))?
            .push(StoredEvent {
                client_id: client_id.to_string(),
                event: event.clone(),
                created_at: Utc::now(),
            });
        Ok(())
    }
}
