use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Languages the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Language {
    #[serde(rename = "uz")]
    Uzbek,
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "en")]
    English,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Uzbek => "uz",
            Language::Russian => "ru",
            Language::English => "en",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uz" | "uzbek" => Ok(Language::Uzbek),
            "ru" | "russian" => Ok(Language::Russian),
            "en" | "english" => Ok(Language::English),
            other => Err(CoreError::InvalidInput(format!("unknown language: {other}"))),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// What the user wants done with their calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Create,
    Update,
    Delete,
    Show,
    Confirm,
    Cancel,
    Unknown,
}

/// Categories a text span can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlotKind {
    Datetime,
    Duration,
    Allday,
    Repeat,
    Alert,
    Invite,
    Title,
    Url,
    Note,
}

/// A tagged span of the input text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Slot {
    #[serde(rename = "type")]
    pub kind: SlotKind,
    pub value: String,
    /// Byte offset of the span start in the original text.
    pub start: usize,
    /// Byte offset one past the span end.
    pub end: usize,
    pub confidence: f32,
}

/// Structured result of parsing one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ParsedEvent {
    pub intent: Intent,
    pub language: Language,
    pub confidence: f32,
    pub title: Option<String>,
    pub all_day: bool,
    pub time_start: Option<DateTime<FixedOffset>>,
    pub time_end: Option<DateTime<FixedOffset>>,
    /// Recurrence rule in `FREQ=...` form, when the text asked for one.
    pub repeat: Option<String>,
    /// Email addresses of people to invite.
    pub invites: Vec<String>,
    /// Reminder offsets in ISO-8601 duration form (`PT30M`, `P1D`).
    pub alerts: Vec<String>,
    pub url: Option<String>,
    pub note: Option<String>,
    pub raw_slots: Vec<Slot>,
    pub normalized_text: String,
    pub warnings: Vec<String>,
}

impl ParsedEvent {
    pub fn new(intent: Intent, language: Language, normalized_text: String) -> Self {
        Self {
            intent,
            language,
            confidence: 0.0,
            title: None,
            all_day: false,
            time_start: None,
            time_end: None,
            repeat: None,
            invites: Vec::new(),
            alerts: Vec::new(),
            url: None,
            note: None,
            raw_slots: Vec::new(),
            normalized_text,
            warnings: Vec::new(),
        }
    }

    /// Rejects candidates that break hard constraints. Soft issues land in
    /// `warnings` during assembly instead.
    pub fn validate(&self) -> CoreResult<()> {
        if let (Some(start), Some(end)) = (self.time_start, self.time_end) {
            if start >= end {
                return Err(CoreError::InvalidInput(
                    "event start must be before its end".to_string(),
                ));
            }
        }
        for alert in &self.alerts {
            if !ALERT_GRAMMAR.is_match(alert) {
                return Err(CoreError::InvalidInput(format!(
                    "malformed alert offset: {alert}"
                )));
            }
        }
        for invite in &self.invites {
            if !EMAIL_GRAMMAR.is_match(invite) {
                return Err(CoreError::InvalidInput(format!(
                    "malformed invite address: {invite}"
                )));
            }
        }
        Ok(())
    }
}

static ALERT_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:PT\d+[HM]|P\d+D)$").unwrap());

static EMAIL_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

/// Unanchored variants used to scan free text for addresses and links.
pub(crate) static EMAIL_SCAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());

pub(crate) static URL_SCAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s]+").unwrap());

/// One parse request, from either transport.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ParseRequest {
    pub prompt: String,
    /// Caller-asserted language; skips detection when present.
    #[serde(default)]
    pub locale: Option<Language>,
    pub user_timezone: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// Envelope every parse returns, success or not.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ParseResponse {
    pub success: bool,
    pub data: Option<ParsedEvent>,
    pub error: Option<String>,
    /// Wall-clock seconds spent in the pipeline.
    pub processing_time: f64,
    pub model_version: String,
}

impl ParseResponse {
    pub fn ok(event: ParsedEvent, processing_time: f64) -> Self {
        Self {
            success: true,
            data: Some(event),
            error: None,
            processing_time,
            model_version: MODEL_VERSION.to_string(),
        }
    }

    pub fn err(message: String, processing_time: f64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            processing_time,
            model_version: MODEL_VERSION.to_string(),
        }
    }
}

pub const MODEL_VERSION: &str = "lexicon-0.1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_round_trips_as_code() {
        let json = serde_json::to_string(&Language::Uzbek).unwrap();
        assert_eq!(json, "\"uz\"");
        let back: Language = serde_json::from_str("\"ru\"").unwrap();
        assert_eq!(back, Language::Russian);
    }

    #[test]
    fn slot_kind_serializes_uppercase() {
        let json = serde_json::to_string(&SlotKind::Datetime).unwrap();
        assert_eq!(json, "\"DATETIME\"");
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let mut event = ParsedEvent::new(Intent::Create, Language::English, "x".into());
        let start = DateTime::parse_from_rfc3339("2025-03-01T15:00:00+05:00").unwrap();
        let end = DateTime::parse_from_rfc3339("2025-03-01T14:00:00+05:00").unwrap();
        event.time_start = Some(start);
        event.time_end = Some(end);
        assert!(event.validate().is_err());
    }

    #[test]
    fn validate_checks_alert_grammar() {
        let mut event = ParsedEvent::new(Intent::Create, Language::English, "x".into());
        event.alerts = vec!["PT30M".into(), "P1D".into()];
        assert!(event.validate().is_ok());
        event.alerts.push("30 minutes".into());
        assert!(event.validate().is_err());
    }

    #[test]
    fn validate_checks_invite_grammar() {
        let mut event = ParsedEvent::new(Intent::Create, Language::English, "x".into());
        event.invites = vec!["ali@example.com".into()];
        assert!(event.validate().is_ok());
        event.invites.push("not-an-email".into());
        assert!(event.validate().is_err());
    }
}
