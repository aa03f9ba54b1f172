use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::auth::{SignedTokenVerifier, TokenVerifier};
use crate::broker::worker::ParseWorker;
use crate::broker::{ChannelBroker, MessageBroker};
use crate::config::Settings;
use crate::confirm::ConfirmationCoordinator;
use crate::error::{CoreError, CoreResult};
use crate::nlp::EventParser;
use crate::registry::ConnectionRegistry;
use crate::store::MemoryEventStore;

pub mod parse;
pub mod socket;

pub struct AppState {
    pub settings: Settings,
    pub parser: Arc<EventParser>,
    pub broker: Arc<dyn MessageBroker>,
    pub registry: Arc<ConnectionRegistry>,
    pub coordinator: Arc<ConfirmationCoordinator>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub store: Arc<MemoryEventStore>,
    pub worker: Arc<ParseWorker>,
}

impl AppState {
    pub fn build(settings: Settings) -> Arc<Self> {
        let parser = Arc::new(EventParser::new(settings.clone()));
        let registry = Arc::new(ConnectionRegistry::new());
        let coordinator = Arc::new(ConfirmationCoordinator::new());
        let broker: Arc<dyn MessageBroker> = Arc::new(ChannelBroker::new(settings.queue_grace));
        let verifier: Arc<dyn TokenVerifier> =
            Arc::new(SignedTokenVerifier::new(settings.token_secret.clone()));
        let store = Arc::new(MemoryEventStore::new());
        let worker = Arc::new(ParseWorker::new(
            Arc::clone(&parser),
            Arc::clone(&registry),
            Arc::clone(&coordinator),
            settings.clone(),
        ));
        Arc::new(Self {
            settings,
            parser,
            broker,
            registry,
            coordinator,
            verifier,
            store,
            worker,
        })
    }
}

pub struct Server {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    state: Arc<AppState>,
}

impl Server {
    pub async fn start(settings: Settings) -> CoreResult<Self> {
        let bind_addr = settings.bind_addr.clone();
        let state = AppState::build(settings);
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        let app = Router::new()
            .route("/health", get(health))
            .route("/ws", get(socket::client_socket))
            .route("/parse", post(parse::parse_prompt))
            .with_state(Arc::clone(&state))
            .layer(cors);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|error| CoreError::Internal(format!("bind {bind_addr}: {error}")))?;
        let addr = listener
            .local_addr()
            .map_err(|error| CoreError::Internal(error.to_string()))?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });
        info!(%addr, "server listening");

        Ok(Server {
            addr,
            shutdown: Some(shutdown_tx),
            state,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn shutdown(&mut self) -> CoreResult<()> {
        if let Some(sender) = self.shutdown.take() {
            sender
                .send(())
                .map_err(|_| CoreError::Internal("failed to send server shutdown signal".into()))
        } else {
            Ok(())
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

async fn health() -> &'static str {
    "ok"
}
