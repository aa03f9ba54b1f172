use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

use crate::nlp::lexicon;
use crate::nlp::types::{Slot, SlotKind};

/// Tags spans of the input text with slot kinds.
pub trait SlotModel: Send + Sync {
    fn extract(&self, text: &str) -> Vec<Slot>;
}

/// Dictionary-driven tagger. Tokens are tagged from per-kind lexicons and
/// pattern checks, multi-token constructs are resolved in a second pass, and
/// consecutive same-kind tokens merge into one span. The lexicons cover all
/// three languages at once, so no language hint is needed.
pub struct LexiconSlotModel;

impl LexiconSlotModel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LexiconSlotModel {
    fn default() -> Self {
        Self::new()
    }
}

struct Token {
    core: String,
    start: usize,
    end: usize,
    kind: Option<SlotKind>,
    claimed: bool,
}

impl SlotModel for LexiconSlotModel {
    fn extract(&self, text: &str) -> Vec<Slot> {
        let mut slots = Vec::new();
        let mut claimed_ranges: Vec<(usize, usize)> = Vec::new();

        // Quoted phrases are titles, verbatim.
        for caps in QUOTED.captures_iter(text) {
            let whole = caps.get(0).unwrap();
            let inner = caps.get(1).unwrap();
            slots.push(Slot {
                kind: SlotKind::Title,
                value: inner.as_str().to_string(),
                start: inner.start(),
                end: inner.end(),
                confidence: 0.9,
            });
            claimed_ranges.push((whole.start(), whole.end()));
        }

        let mut tokens = tokenize(text, &claimed_ranges);
        tag_single_tokens(&mut tokens);
        tag_constructs(&mut tokens);
        fill_connectives(&mut tokens);
        slots.extend(merge_runs(text, &tokens));
        slots.sort_by_key(|s| s.start);
        slots
    }
}

fn tokenize(text: &str, claimed: &[(usize, usize)]) -> Vec<Token> {
    let base = text.as_ptr() as usize;
    text.split_whitespace()
        .filter_map(|word| {
            let offset = word.as_ptr() as usize - base;
            let core = word.trim_matches(|c: char| TRIM_CHARS.contains(c));
            if core.is_empty() {
                return None;
            }
            let start = offset + (core.as_ptr() as usize - word.as_ptr() as usize);
            let end = start + core.len();
            let claimed = claimed.iter().any(|&(a, b)| start < b && end > a);
            Some(Token {
                core: core.to_lowercase(),
                start,
                end,
                kind: None,
                claimed,
            })
        })
        .collect()
}

const TRIM_CHARS: &str = ",.;!?()\"'«»";

fn tag_single_tokens(tokens: &mut [Token]) {
    for token in tokens.iter_mut() {
        if token.claimed {
            continue;
        }
        let core = token.core.as_str();
        token.kind = if core.starts_with("http://") || core.starts_with("https://") {
            Some(SlotKind::Url)
        } else if crate::nlp::types::EMAIL_SCAN.is_match(core)
            && crate::nlp::types::EMAIL_SCAN.find(core).map(|m| m.len()) == Some(core.len())
        {
            Some(SlotKind::Invite)
        } else if TIME_RANGE.is_match(core)
            || CLOCK.is_match(core)
            || HOUR_AMPM.is_match(core)
            || lexicon::RELATIVE_DAY_WORDS.contains(&core)
            || lexicon::WEEK_TERMS.contains(&core)
            || lexicon::TIME_OF_DAY_WORDS.contains(&core)
            || lexicon::weekday_for(core).is_some()
        {
            Some(SlotKind::Datetime)
        } else {
            None
        };
    }
}

fn tag_constructs(tokens: &mut [Token]) {
    let n = tokens.len();

    for i in 0..n {
        let core = tokens[i].core.clone();

        // "every X" repeats, overriding whatever X was tagged as.
        if lexicon::EVERY_MARKERS.contains(&core.as_str()) {
            tokens[i].kind = Some(SlotKind::Repeat);
            if i + 1 < n {
                tokens[i + 1].kind = Some(SlotKind::Repeat);
            }
            continue;
        }

        // "all day" pairs.
        if i + 1 < n {
            let next = tokens[i + 1].core.clone();
            if lexicon::ALLDAY_PAIRS
                .iter()
                .any(|&(a, b)| a == core && b == next)
            {
                tokens[i].kind = Some(SlotKind::Allday);
                tokens[i + 1].kind = Some(SlotKind::Allday);
                continue;
            }
        }

        // Quantities: "<n> hours" is a duration; with a before-marker after
        // it (or "за" before it) it becomes a reminder offset.
        if is_number(&core) && i + 1 < n {
            let unit = tokens[i + 1].core.clone();
            let is_unit = lexicon::HOUR_UNITS.contains(&unit.as_str())
                || lexicon::MINUTE_UNITS.contains(&unit.as_str())
                || lexicon::DAY_UNITS.contains(&unit.as_str());
            if is_unit {
                let before_after =
                    i + 2 < n && lexicon::BEFORE_MARKERS.contains(&tokens[i + 2].core.as_str());
                let pre_before =
                    i > 0 && lexicon::PRE_MARKERS.contains(&tokens[i - 1].core.as_str());
                if before_after || pre_before {
                    if pre_before {
                        tokens[i - 1].kind = Some(SlotKind::Alert);
                    }
                    tokens[i].kind = Some(SlotKind::Alert);
                    tokens[i + 1].kind = Some(SlotKind::Alert);
                    if before_after {
                        tokens[i + 2].kind = Some(SlotKind::Alert);
                    }
                } else {
                    tokens[i].kind = Some(SlotKind::Duration);
                    tokens[i + 1].kind = Some(SlotKind::Duration);
                }
                continue;
            }
        }

        // "<day> <month> [<year>]" dates.
        if is_number(&core) && i + 1 < n && lexicon::month_for(&tokens[i + 1].core).is_some() {
            tokens[i].kind = Some(SlotKind::Datetime);
            tokens[i + 1].kind = Some(SlotKind::Datetime);
            if i + 2 < n && tokens[i + 2].core.len() == 4 && is_number(&tokens[i + 2].core) {
                tokens[i + 2].kind = Some(SlotKind::Datetime);
            }
        }
    }

    // Week qualifiers extend leftwards: "на следующей неделе", "next week".
    for i in (0..n.saturating_sub(1)).rev() {
        if tokens[i].kind.is_none()
            && lexicon::WEEK_QUALIFIERS.contains(&tokens[i].core.as_str())
            && tokens[i + 1].kind == Some(SlotKind::Datetime)
        {
            tokens[i].kind = Some(SlotKind::Datetime);
        }
    }
}

/// Untagged connectives between two datetime tokens join them into one span
/// ("tomorrow at 15:00").
fn fill_connectives(tokens: &mut [Token]) {
    for i in 1..tokens.len().saturating_sub(1) {
        if tokens[i].kind.is_none()
            && lexicon::DATETIME_CONNECTIVES.contains(&tokens[i].core.as_str())
            && tokens[i - 1].kind == Some(SlotKind::Datetime)
            && tokens[i + 1].kind == Some(SlotKind::Datetime)
        {
            tokens[i].kind = Some(SlotKind::Datetime);
        }
    }
}

fn merge_runs(text: &str, tokens: &[Token]) -> Vec<Slot> {
    let mut slots = Vec::new();
    let mut run: Option<(SlotKind, usize, usize)> = None;

    for token in tokens {
        let kind = if token.claimed { None } else { token.kind };
        match (run, kind) {
            (Some((k, start, _)), Some(tk)) if k == tk => {
                run = Some((k, start, token.end));
            }
            (prev, next) => {
                if let Some((k, start, end)) = prev {
                    slots.push(make_slot(text, k, start, end));
                }
                run = next.map(|k| (k, token.start, token.end));
            }
        }
    }
    if let Some((k, start, end)) = run {
        slots.push(make_slot(text, k, start, end));
    }
    slots
}

fn make_slot(text: &str, kind: SlotKind, start: usize, end: usize) -> Slot {
    Slot {
        kind,
        value: text[start..end].to_string(),
        start,
        end,
        confidence: 0.8,
    }
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).unwrap());

static TIME_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}[:.]\d{2}[-–]\d{1,2}[:.]\d{2}$").unwrap());

static CLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}[:.]\d{2}(?:am|pm)?$").unwrap());

static HOUR_AMPM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}(?:am|pm)$").unwrap());

/// Probabilistic stand-in for environments without lexicons: roughly a third
/// of the words become slots of a random kind.
pub struct HeuristicSlotModel {
    pub slot_probability: f64,
}

impl Default for HeuristicSlotModel {
    fn default() -> Self {
        Self {
            slot_probability: 0.3,
        }
    }
}

const ALL_KINDS: &[SlotKind] = &[
    SlotKind::Datetime,
    SlotKind::Duration,
    SlotKind::Allday,
    SlotKind::Repeat,
    SlotKind::Alert,
    SlotKind::Invite,
    SlotKind::Title,
    SlotKind::Url,
    SlotKind::Note,
];

impl SlotModel for HeuristicSlotModel {
    fn extract(&self, text: &str) -> Vec<Slot> {
        let mut rng = rand::thread_rng();
        let mut slots = Vec::new();
        for token in tokenize(text, &[]) {
            if token.core.chars().count() <= 2 {
                continue;
            }
            if rng.gen::<f64>() >= self.slot_probability {
                continue;
            }
            slots.push(Slot {
                kind: *ALL_KINDS.choose(&mut rng).unwrap_or(&SlotKind::Note),
                value: token.core.clone(),
                start: token.start,
                end: token.end,
                confidence: rng.gen_range(0.6..0.9),
            });
        }
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<Slot> {
        LexiconSlotModel::new().extract(text)
    }

    fn values_of(slots: &[Slot], kind: SlotKind) -> Vec<String> {
        slots
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.value.clone())
            .collect()
    }

    #[test]
    fn quoted_phrase_becomes_title() {
        let slots = extract("schedule 'Design sync' tomorrow");
        assert_eq!(values_of(&slots, SlotKind::Title), vec!["Design sync"]);
    }

    #[test]
    fn relative_day_and_clock_merge_through_connective() {
        let slots = extract("meeting tomorrow at 15:00");
        assert_eq!(
            values_of(&slots, SlotKind::Datetime),
            vec!["tomorrow at 15:00"]
        );
    }

    #[test]
    fn duration_and_alert_are_distinguished() {
        let slots = extract("lunch tomorrow for 1 hour, remind 30 minutes before");
        assert_eq!(values_of(&slots, SlotKind::Duration), vec!["1 hour"]);
        assert_eq!(
            values_of(&slots, SlotKind::Alert),
            vec!["30 minutes before"]
        );
    }

    #[test]
    fn russian_pre_marker_alert() {
        let slots = extract("встреча завтра, напомни за 30 минут");
        assert_eq!(values_of(&slots, SlotKind::Alert), vec!["за 30 минут"]);
    }

    #[test]
    fn every_marker_claims_following_word() {
        let slots = extract("standup every monday");
        assert_eq!(values_of(&slots, SlotKind::Repeat), vec!["every monday"]);
    }

    #[test]
    fn all_day_pair_is_tagged() {
        let slots = extract("conference friday all day");
        assert_eq!(values_of(&slots, SlotKind::Allday), vec!["all day"]);
        assert_eq!(values_of(&slots, SlotKind::Datetime), vec!["friday"]);
    }

    #[test]
    fn email_and_url_are_found() {
        let slots = extract("sync with ali@example.com notes https://example.com/agenda");
        assert_eq!(
            values_of(&slots, SlotKind::Invite),
            vec!["ali@example.com"]
        );
        assert_eq!(
            values_of(&slots, SlotKind::Url),
            vec!["https://example.com/agenda"]
        );
    }

    #[test]
    fn explicit_date_with_year() {
        let slots = extract("dinner 15 oktabr 2025");
        assert_eq!(
            values_of(&slots, SlotKind::Datetime),
            vec!["15 oktabr 2025"]
        );
    }

    #[test]
    fn offsets_point_into_the_original_text() {
        let text = "meeting tomorrow at 15:00";
        let slots = extract(text);
        for slot in &slots {
            assert_eq!(&text[slot.start..slot.end], slot.value);
        }
    }

    #[test]
    fn heuristic_model_respects_probability_zero() {
        let model = HeuristicSlotModel {
            slot_probability: 0.0,
        };
        assert!(model.extract("some words here").is_empty());
    }

    #[test]
    fn heuristic_model_tags_every_long_token_at_probability_one() {
        let model = HeuristicSlotModel {
            slot_probability: 1.0,
        };
        let text = "plan an offsite in may";
        let slots = model.extract(text);
        // "an" and "in" are too short to tag.
        assert_eq!(slots.len(), 3);
        for slot in &slots {
            assert_eq!(&text[slot.start..slot.end], slot.value);
            assert!((0.6..0.9).contains(&slot.confidence));
        }
    }
}
