//! Wire format for messages routed through the broker to websocket clients.
//!
//! The outbound result is a flat JSON object whose event fields are carried
//! as display strings ("True", "None", "['a@b.c']") for client
//! compatibility. Encoding happens in [`RoutedMessage::to_wire`]; the typed
//! form is reconstructed at the boundary with [`RoutedMessage::from_wire`],
//! so nothing downstream touches the stringly fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::nlp::types::{Intent, Language, ParsedEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ParsedResult,
    Error,
    Confirmation,
    Rejection,
}

/// A parse outcome addressed to one client.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedMessage {
    pub original_text: String,
    pub client_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    pub success: bool,
    pub requires_confirmation: bool,
    pub message_id: String,
    pub candidate: Option<ParsedEvent>,
    pub error: Option<String>,
    pub confirmation_question: Option<String>,
}

pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// `msg_<unix seconds>_<8 hex chars>`.
pub fn new_message_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("msg_{}_{}", now_secs(), &suffix[..8])
}

impl RoutedMessage {
    pub fn to_wire(&self) -> Value {
        let mut map = Map::new();
        map.insert("original_text".into(), json!(self.original_text));
        map.insert("success".into(), json!(self.success));
        map.insert("client_id".into(), json!(self.client_id));
        map.insert("timestamp".into(), json!(self.timestamp.to_rfc3339()));
        map.insert("type".into(), serde_json::to_value(self.kind).unwrap_or(Value::Null));
        map.insert(
            "requires_confirmation".into(),
            json!(self.requires_confirmation),
        );
        map.insert("message_id".into(), json!(self.message_id));

        if let Some(event) = &self.candidate {
            map.insert("intent".into(), json!(intent_code(event.intent)));
            map.insert("language".into(), json!(event.language.code()));
            map.insert("confidence".into(), json!(format!("{:.2}", event.confidence)));
            map.insert("title".into(), json!(py_opt(event.title.as_deref())));
            map.insert("time_start".into(), json!(py_time(event.time_start)));
            map.insert("time_end".into(), json!(py_time(event.time_end)));
            map.insert("all_day".into(), json!(py_bool(event.all_day)));
            map.insert("repeat".into(), json!(py_opt(event.repeat.as_deref())));
            map.insert("invites".into(), json!(py_list(&event.invites)));
            map.insert("alerts".into(), json!(py_list(&event.alerts)));
            map.insert("url".into(), json!(py_opt(event.url.as_deref())));
            map.insert("note".into(), json!(py_opt(event.note.as_deref())));
            map.insert("warnings".into(), json!(py_list(&event.warnings)));
        }
        if let Some(error) = &self.error {
            map.insert("error".into(), json!(error));
        }
        if let Some(question) = &self.confirmation_question {
            map.insert("confirmation_question".into(), json!(question));
        }
        Value::Object(map)
    }

    pub fn to_wire_string(&self) -> String {
        self.to_wire().to_string()
    }

    /// Rebuilds the typed form. Pipeline internals that never cross the wire
    /// (raw slots, normalized text) come back empty.
    pub fn from_wire(payload: &str) -> CoreResult<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| CoreError::InvalidInput(format!("malformed wire message: {e}")))?;

        let kind: MessageKind = serde_json::from_value(
            value.get("type").cloned().unwrap_or(Value::Null),
        )
        .map_err(|_| CoreError::InvalidInput("missing message type".into()))?;

        let timestamp = str_field(&value, "timestamp")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let candidate = if value.get("intent").is_some() {
            Some(decode_candidate(&value)?)
        } else {
            None
        };

        Ok(Self {
            original_text: str_field(&value, "original_text").unwrap_or_default(),
            client_id: str_field(&value, "client_id").unwrap_or_default(),
            timestamp,
            kind,
            success: value
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            requires_confirmation: value
                .get("requires_confirmation")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            message_id: str_field(&value, "message_id").unwrap_or_default(),
            candidate,
            error: str_field(&value, "error"),
            confirmation_question: str_field(&value, "confirmation_question"),
        })
    }
}

fn decode_candidate(value: &Value) -> CoreResult<ParsedEvent> {
    let intent: Intent =
        serde_json::from_value(value.get("intent").cloned().unwrap_or(Value::Null))
            .map_err(|_| CoreError::InvalidInput("bad intent field".into()))?;
    let language: Language =
        serde_json::from_value(value.get("language").cloned().unwrap_or(Value::Null))
            .map_err(|_| CoreError::InvalidInput("bad language field".into()))?;

    let mut event = ParsedEvent::new(intent, language, String::new());
    event.confidence = str_field(value, "confidence")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    event.title = str_field(value, "title").and_then(parse_py_opt);
    event.time_start = str_field(value, "time_start")
        .and_then(parse_py_opt)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok());
    event.time_end = str_field(value, "time_end")
        .and_then(parse_py_opt)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok());
    event.all_day = str_field(value, "all_day").map(|s| parse_py_bool(&s)).unwrap_or(false);
    event.repeat = str_field(value, "repeat").and_then(parse_py_opt);
    event.invites = str_field(value, "invites").map(|s| parse_py_list(&s)).unwrap_or_default();
    event.alerts = str_field(value, "alerts").map(|s| parse_py_list(&s)).unwrap_or_default();
    event.url = str_field(value, "url").and_then(parse_py_opt);
    event.note = str_field(value, "note").and_then(parse_py_opt);
    event.warnings = str_field(value, "warnings").map(|s| parse_py_list(&s)).unwrap_or_default();
    Ok(event)
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn intent_code(intent: Intent) -> String {
    serde_json::to_value(intent)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn py_bool(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

fn py_opt(value: Option<&str>) -> String {
    value.map(str::to_string).unwrap_or_else(|| "None".to_string())
}

fn py_time(value: Option<DateTime<chrono::FixedOffset>>) -> String {
    value
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "None".to_string())
}

fn py_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| format!("'{i}'")).collect();
    format!("[{}]", quoted.join(", "))
}

pub fn parse_py_bool(s: &str) -> bool {
    s.eq_ignore_ascii_case("true")
}

pub fn parse_py_opt(s: String) -> Option<String> {
    if s == "None" || s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub fn parse_py_list(s: &str) -> Vec<String> {
    let inner = s.trim().trim_start_matches('[').trim_end_matches(']');
    inner
        .split(',')
        .map(|item| item.trim().trim_matches('\'').trim_matches('"').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Cheap dispatch on the `type` field without decoding the whole message.
pub fn peek_kind(payload: &str) -> Option<MessageKind> {
    let value: Value = serde_json::from_str(payload).ok()?;
    serde_json::from_value(value.get("type")?.clone()).ok()
}

/// What a client (or the socket layer on its behalf) drops onto the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub text: String,
    pub timestamp: String,
    pub client_id: String,
}

/// A raw frame read off the websocket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub response_to: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Confirmation-flow outcome sent back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeMessage {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub client_id: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_message_id: Option<String>,
}
