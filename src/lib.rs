//! calparse: a natural-language calendar event parsing service.
//!
//! Clients connect over a websocket, send free-form text in Uzbek, Russian
//! or English, and receive a structured event proposal they must confirm or
//! reject before it is persisted. Messages route through per-client broker
//! queues so a briefly-disconnected client does not lose results.

pub mod auth;
pub mod broker;
pub mod config;
pub mod confirm;
pub mod error;
pub mod nlp;
pub mod registry;
pub mod server;
pub mod store;
pub mod wire;

pub use config::Settings;
pub use error::{CoreError, CoreResult};
pub use nlp::{EventParser, Intent, Language, ParseRequest, ParseResponse, ParsedEvent};
pub use server::Server;
