use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, TimeZone, Timelike};
use chrono_tz::Tz;
use tracing::debug;

use crate::config::Settings;
use crate::error::{CoreError, CoreResult};
use crate::nlp::intent::{IntentClassifier, PatternClassifier};
use crate::nlp::language::LanguageDetector;
use crate::nlp::lexicon;
use crate::nlp::normalize::{
    normalize_alert, DateTimeNormalizer, DurationNormalizer, DurationSpec, RepeatNormalizer,
};
use crate::nlp::slots::{LexiconSlotModel, SlotModel};
use crate::nlp::types::{
    Intent, Language, ParseRequest, ParseResponse, ParsedEvent, Slot, SlotKind, EMAIL_SCAN,
    URL_SCAN,
};

/// The extraction pipeline: language detection, intent classification, slot
/// tagging and normalization into a [`ParsedEvent`].
pub struct EventParser {
    settings: Settings,
    detector: LanguageDetector,
    intents: Arc<dyn IntentClassifier>,
    slots: Arc<dyn SlotModel>,
}

impl EventParser {
    pub fn new(settings: Settings) -> Self {
        let detector = LanguageDetector::new(
            settings.default_language,
            settings.language_fallback_threshold,
        );
        Self {
            settings,
            detector,
            intents: Arc::new(PatternClassifier::new()),
            slots: Arc::new(LexiconSlotModel::new()),
        }
    }

    /// Swaps in alternative classifier or slot model implementations.
    pub fn with_components(
        settings: Settings,
        intents: Arc<dyn IntentClassifier>,
        slots: Arc<dyn SlotModel>,
    ) -> Self {
        let detector = LanguageDetector::new(
            settings.default_language,
            settings.language_fallback_threshold,
        );
        Self {
            settings,
            detector,
            intents,
            slots,
        }
    }

    /// Never fails outward; errors are folded into the response envelope.
    pub fn parse(&self, request: &ParseRequest) -> ParseResponse {
        let started = Instant::now();
        match self.parse_inner(request) {
            Ok(event) => ParseResponse::ok(event, started.elapsed().as_secs_f64()),
            Err(err) => {
                debug!(error = %err, "parse failed");
                ParseResponse::err(err.to_string(), started.elapsed().as_secs_f64())
            }
        }
    }

    fn parse_inner(&self, request: &ParseRequest) -> CoreResult<ParsedEvent> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(CoreError::InvalidInput("prompt must not be empty".into()));
        }

        let tz: Tz = request.user_timezone.parse().map_err(|_| {
            CoreError::InvalidInput(format!("unknown timezone: {}", request.user_timezone))
        })?;

        let (language, lang_confidence) = match request.locale {
            Some(locale) => (locale, 1.0),
            None => self.detector.detect_with_fallback(prompt),
        };

        let (intent, intent_confidence) = self.intents.classify(prompt);
        let raw_slots = self.slots.extract(prompt);
        debug!(%language, ?intent, slots = raw_slots.len(), "pipeline stages done");

        let mut event = self.resolve_slots(prompt, &raw_slots, language, tz)?;
        event.intent = intent;
        event.confidence = (intent_confidence * lang_confidence).min(1.0);
        event.raw_slots = raw_slots;
        let soft_issues = collect_warnings(&event);
        event.warnings.extend(soft_issues);
        event.validate()?;
        Ok(event)
    }

    fn resolve_slots(
        &self,
        text: &str,
        slots: &[Slot],
        language: Language,
        tz: Tz,
    ) -> CoreResult<ParsedEvent> {
        let mut groups: HashMap<SlotKind, Vec<&str>> = HashMap::new();
        for slot in slots {
            groups.entry(slot.kind).or_default().push(&slot.value);
        }

        let mut event = ParsedEvent::new(Intent::Unknown, language, normalize_text(text));

        if let Some(titles) = groups.get(&SlotKind::Title) {
            event.title = Some(titles.join(" "));
        }
        event.all_day = groups.contains_key(&SlotKind::Allday);

        let normalizer = DateTimeNormalizer::new(tz);
        if let Some(values) = groups.get(&SlotKind::Datetime) {
            let mut start = normalizer.normalize(values[0], language);
            let mut end = values
                .get(1)
                .and_then(|v| normalizer.normalize(v, language));
            if let (Some(s), Some(e)) = (start, end) {
                if e <= s {
                    // An end like "9:00" after a start of "friday 17:00"
                    // resolved to the wrong day; pull it onto the start's day.
                    end = rebase_end(s, e);
                    if end.is_none() {
                        event
                            .warnings
                            .push("start time must be before end time".to_string());
                    }
                }
            }
            if start.is_none() {
                start = end.take();
            }
            event.time_start = start.map(|dt| dt.fixed_offset());
            event.time_end = end.map(|dt| dt.fixed_offset());
        }

        if event.time_start.is_some() && event.time_end.is_none() {
            if let Some(values) = groups.get(&SlotKind::Duration) {
                match DurationNormalizer::normalize(&values.join(" "), language) {
                    Some(DurationSpec::AllDay) => {
                        event.all_day = true;
                        event.time_end = event.time_start.map(|s| s + Duration::days(1));
                    }
                    Some(DurationSpec::Length(d)) => {
                        event.time_end = event.time_start.map(|s| s + d);
                    }
                    None => {}
                }
            }
        }
        if event.time_start.is_some() && event.time_end.is_none() {
            event.time_end = event
                .time_start
                .map(|s| s + self.settings.default_duration());
        }

        if let Some(values) = groups.get(&SlotKind::Repeat) {
            event.repeat = RepeatNormalizer::normalize(&values.join(" "), language, None);
        }
        if let Some(values) = groups.get(&SlotKind::Alert) {
            event.alerts = values
                .iter()
                .filter_map(|v| normalize_alert(v, language))
                .collect();
        }
        if let Some(values) = groups.get(&SlotKind::Invite) {
            for value in values {
                event
                    .invites
                    .extend(EMAIL_SCAN.find_iter(value).map(|m| m.as_str().to_string()));
            }
        }
        if let Some(values) = groups.get(&SlotKind::Url) {
            event.url = URL_SCAN
                .find(&values.join(" "))
                .map(|m| m.as_str().to_string());
        }
        if let Some(values) = groups.get(&SlotKind::Note) {
            event.note = Some(values.join(" "));
        }

        if event.title.is_none() {
            event.title = extract_title(text);
        }

        Ok(event)
    }
}

fn rebase_end(
    start: DateTime<Tz>,
    end: DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let rebased = end
        .timezone()
        .from_local_datetime(&start.date_naive().and_time(end.time()))
        .earliest()?;
    (rebased > start).then_some(rebased)
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fallback title: the clause right after an event noun, when no quoted
/// phrase supplied one.
fn extract_title(text: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    for noun in lexicon::EVENT_NOUNS {
        if let Some(pos) = lowered.find(noun) {
            let after = &text[pos + noun.len()..];
            let clause = after
                .split(['.', ','])
                .next()
                .unwrap_or("")
                .trim();
            if clause.len() > 3 {
                return Some(capitalize(clause));
            }
        }
    }
    None
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn collect_warnings(event: &ParsedEvent) -> Vec<String> {
    let mut warnings = Vec::new();
    if let (Some(start), Some(end)) = (event.time_start, event.time_end) {
        if end - start > Duration::days(7) {
            warnings.push("event duration is too long (more than 7 days)".to_string());
        }
    }
    if event.all_day {
        if let Some(start) = event.time_start {
            if start.hour() != 0 || start.minute() != 0 {
                warnings.push("all-day events should start at midnight".to_string());
            }
        }
    }
    if !event.all_day
        && event
            .alerts
            .iter()
            .any(|a| a.starts_with('P') && !a.starts_with("PT"))
    {
        warnings.push("day-level alerts are recommended for all-day events only".to_string());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> EventParser {
        EventParser::new(Settings::default())
    }

    fn request(prompt: &str) -> ParseRequest {
        ParseRequest {
            prompt: prompt.to_string(),
            locale: None,
            user_timezone: "Asia/Tashkent".to_string(),
            user_id: None,
        }
    }

    #[test]
    fn empty_prompt_fails_softly() {
        let response = parser().parse(&request("   "));
        assert!(!response.success);
        assert!(response.error.is_some());
        assert!(response.data.is_none());
    }

    #[test]
    fn unknown_timezone_fails_softly() {
        let mut req = request("meeting tomorrow");
        req.user_timezone = "Mars/Olympus".to_string();
        let response = parser().parse(&req);
        assert!(!response.success);
        assert!(response.error.unwrap().contains("timezone"));
    }

    #[test]
    fn full_prompt_resolves_every_field() {
        let response = parser().parse(&request(
            "tomorrow at 15:00 'Design sync' meeting, 1 hour, remind 30 minutes before",
        ));
        assert!(response.success, "{:?}", response.error);
        let event = response.data.unwrap();
        assert_eq!(event.intent, Intent::Create);
        assert_eq!(event.language, Language::English);
        assert_eq!(event.title.as_deref(), Some("Design sync"));
        let start = event.time_start.expect("start");
        let end = event.time_end.expect("end");
        assert_eq!((start.hour(), start.minute()), (15, 0));
        assert_eq!(end - start, Duration::hours(1));
        assert_eq!(event.alerts, vec!["PT30M".to_string()]);
        assert!(!event.all_day);
    }

    #[test]
    fn single_datetime_gets_default_duration() {
        let response = parser().parse(&request("create standup tomorrow at 9:00"));
        let event = response.data.unwrap();
        let start = event.time_start.unwrap();
        let end = event.time_end.unwrap();
        assert_eq!(end - start, Duration::hours(1));
    }

    #[test]
    fn locale_override_skips_detection() {
        let mut req = request("create meeting tomorrow");
        req.locale = Some(Language::Russian);
        let event = parser().parse(&req).data.unwrap();
        assert_eq!(event.language, Language::Russian);
    }

    #[test]
    fn invites_and_url_are_lifted() {
        let response = parser().parse(&request(
            "schedule review tomorrow with ali@example.com https://example.com/doc",
        ));
        let event = response.data.unwrap();
        assert_eq!(event.invites, vec!["ali@example.com".to_string()]);
        assert_eq!(event.url.as_deref(), Some("https://example.com/doc"));
    }

    #[test]
    fn event_noun_clause_becomes_fallback_title() {
        let response = parser().parse(&request("create meeting with the design team tomorrow"));
        let event = response.data.unwrap();
        assert_eq!(event.title.as_deref(), Some("With the design team tomorrow"));
    }

    #[test]
    fn repeat_rule_is_attached() {
        let response = parser().parse(&request("schedule standup every monday at 9:30"));
        let event = response.data.unwrap();
        assert_eq!(event.repeat.as_deref(), Some("FREQ=WEEKLY;BYDAY=MO"));
    }

    #[test]
    fn day_level_alert_on_timed_event_warns() {
        let response = parser().parse(&request("party tomorrow at 18:00, remind 1 day before"));
        let event = response.data.unwrap();
        assert_eq!(event.alerts, vec!["P1D".to_string()]);
        assert!(event
            .warnings
            .iter()
            .any(|w| w.contains("day-level alerts")));
    }

    #[test]
    fn confidence_stays_in_unit_range() {
        let response = parser().parse(&request("create meeting tomorrow"));
        let event = response.data.unwrap();
        assert!((0.0..=1.0).contains(&event.confidence));
    }

    #[test]
    fn normalized_text_collapses_whitespace() {
        let response = parser().parse(&request("  create   meeting  tomorrow "));
        let event = response.data.unwrap();
        assert_eq!(event.normalized_text, "create meeting tomorrow");
    }
}
