use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::nlp::lexicon;
use crate::nlp::types::Language;

/// A normalized event length. All-day events carry a flag instead of a
/// concrete span.
#[derive(Debug, Clone, PartialEq)]
pub enum DurationSpec {
    AllDay,
    Length(Duration),
}

/// Resolves datetime phrases against a reference instant in the user's
/// timezone. Tries explicit formats first, then relative vocabulary, then
/// loose clock/date patterns.
pub struct DateTimeNormalizer {
    tz: Tz,
    now: DateTime<Tz>,
}

enum RelTerm {
    Days(i64),
    ThisWeek,
    NextWeek,
    Weekend,
}

impl DateTimeNormalizer {
    pub fn new(tz: Tz) -> Self {
        let now = Utc::now().with_timezone(&tz);
        Self { tz, now }
    }

    /// Pins the reference instant, for deterministic resolution.
    pub fn with_now(tz: Tz, now: DateTime<Tz>) -> Self {
        Self { tz, now }
    }

    pub fn normalize(&self, text: &str, lang: Language) -> Option<DateTime<Tz>> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        self.parse_explicit(&text)
            .or_else(|| self.parse_relative(&text, lang))
            .or_else(|| self.parse_loose(&text))
    }

    fn parse_explicit(&self, text: &str) -> Option<DateTime<Tz>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&self.tz));
        }
        for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%d.%m.%Y %H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return self.tz.from_local_datetime(&naive).earliest();
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return self.at(date, 12, 0);
        }
        None
    }

    fn parse_relative(&self, text: &str, lang: Language) -> Option<DateTime<Tz>> {
        let today = self.now.date_naive();

        for (term, value) in relative_terms(lang) {
            if !text.contains(term) {
                continue;
            }
            return match value {
                RelTerm::Days(offset) => {
                    let (hour, minute) = self.resolve_time(text);
                    self.at(today + Duration::days(*offset), hour, minute)
                }
                RelTerm::ThisWeek => {
                    let to_end = 6 - i64::from(self.now.weekday().num_days_from_monday());
                    self.tz
                        .from_local_datetime(
                            &(today + Duration::days(to_end)).and_hms_opt(23, 59, 59)?,
                        )
                        .earliest()
                }
                RelTerm::NextWeek => {
                    let to_monday = 7 - i64::from(self.now.weekday().num_days_from_monday());
                    self.at(today + Duration::days(to_monday), 9, 0)
                }
                RelTerm::Weekend => {
                    let mut to_saturday =
                        5 - i64::from(self.now.weekday().num_days_from_monday());
                    if to_saturday < 0 {
                        to_saturday += 7;
                    }
                    self.at(today + Duration::days(to_saturday), 10, 0)
                }
            };
        }

        // Bare weekday names mean the next occurrence, never today.
        for word in text.split_whitespace() {
            if let Some(target) = lexicon::weekday_for(word.trim_matches(|c: char| !c.is_alphanumeric())) {
                let mut delta = i64::from(target.num_days_from_monday())
                    - i64::from(self.now.weekday().num_days_from_monday());
                if delta <= 0 {
                    delta += 7;
                }
                let (hour, minute) = self.resolve_time(text);
                return self.at(today + Duration::days(delta), hour, minute);
            }
        }

        None
    }

    fn parse_loose(&self, text: &str) -> Option<DateTime<Tz>> {
        let today = self.now.date_naive();

        // "15 oktabr 2025", year optional.
        let tokens: Vec<&str> = text.split_whitespace().collect();
        for i in 0..tokens.len().saturating_sub(1) {
            let day: Option<u32> = tokens[i].parse().ok();
            let month = lexicon::month_for(tokens[i + 1].trim_matches(|c: char| !c.is_alphanumeric()));
            if let (Some(day), Some(month)) = (day, month) {
                let year = tokens
                    .get(i + 2)
                    .and_then(|t| t.parse::<i32>().ok())
                    .filter(|y| (2000..2200).contains(y))
                    .unwrap_or_else(|| self.now.year());
                let date = NaiveDate::from_ymd_opt(year, month, day)?;
                let (hour, minute) = self.resolve_time(text);
                return self.at(date, hour, minute);
            }
        }

        // A bare clock reading means today; a range contributes its start.
        if let Some((hour, minute)) = clock_in(text) {
            return self.at(today, hour, minute);
        }

        None
    }

    /// Clock reading in the text, else a time-of-day word, else noon.
    fn resolve_time(&self, text: &str) -> (u32, u32) {
        if let Some(hm) = clock_in(text) {
            return hm;
        }
        for word in text.split_whitespace() {
            if let Some(hm) = lexicon::time_of_day_hour(word) {
                return hm;
            }
        }
        (12, 0)
    }

    fn at(&self, date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Tz>> {
        self.tz
            .from_local_datetime(&date.and_hms_opt(hour, minute, 0)?)
            .earliest()
    }
}

fn relative_terms(lang: Language) -> &'static [(&'static str, RelTerm)] {
    // Longer phrases first, so "послезавтра" wins over "завтра".
    match lang {
        Language::Uzbek => &[
            ("indinga", RelTerm::Days(2)),
            ("ertaga", RelTerm::Days(1)),
            ("bugun", RelTerm::Days(0)),
            ("kecha", RelTerm::Days(-1)),
            ("shu hafta", RelTerm::ThisWeek),
            ("keyingi hafta", RelTerm::NextWeek),
            ("hafta oxiri", RelTerm::Weekend),
        ],
        Language::Russian => &[
            ("послезавтра", RelTerm::Days(2)),
            ("завтра", RelTerm::Days(1)),
            ("сегодня", RelTerm::Days(0)),
            ("вчера", RelTerm::Days(-1)),
            ("на этой неделе", RelTerm::ThisWeek),
            ("на следующей неделе", RelTerm::NextWeek),
            ("выходные", RelTerm::Weekend),
        ],
        Language::English => &[
            ("day after tomorrow", RelTerm::Days(2)),
            ("tomorrow", RelTerm::Days(1)),
            ("today", RelTerm::Days(0)),
            ("yesterday", RelTerm::Days(-1)),
            ("this week", RelTerm::ThisWeek),
            ("next week", RelTerm::NextWeek),
            ("weekend", RelTerm::Weekend),
        ],
    }
}

fn clock_in(text: &str) -> Option<(u32, u32)> {
    if let Some(caps) = CLOCK_IN_TEXT.captures(text) {
        let mut hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        hour = apply_meridiem(hour, caps.get(3).map(|m| m.as_str()));
        return (hour < 24 && minute < 60).then_some((hour, minute));
    }
    if let Some(caps) = HOUR_MERIDIEM_IN_TEXT.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let hour = apply_meridiem(hour, Some(&caps[2]));
        return (hour < 24).then_some((hour, 0));
    }
    None
}

fn apply_meridiem(hour: u32, meridiem: Option<&str>) -> u32 {
    match meridiem {
        Some("pm") if hour < 12 => hour + 12,
        Some("am") if hour == 12 => 0,
        _ => hour,
    }
}

static CLOCK_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})[:.](\d{2})\s*(am|pm)?").unwrap());

static HOUR_MERIDIEM_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\s*(am|pm)\b").unwrap());

/// Turns duration phrases into [`DurationSpec`] values.
pub struct DurationNormalizer;

impl DurationNormalizer {
    pub fn normalize(text: &str, lang: Language) -> Option<DurationSpec> {
        let text = text.trim().to_lowercase();

        if ALLDAY_PHRASES.iter().any(|p| text.contains(p)) {
            return Some(DurationSpec::AllDay);
        }

        let (hm, hours, minutes) = duration_patterns(lang);
        if let Some(caps) = hm.captures(&text) {
            let h: i64 = caps[1].parse().ok()?;
            let m: i64 = caps[2].parse().ok()?;
            return Some(DurationSpec::Length(
                Duration::hours(h) + Duration::minutes(m),
            ));
        }
        if let Some(caps) = hours.captures(&text) {
            return Some(DurationSpec::Length(Duration::hours(caps[1].parse().ok()?)));
        }
        if let Some(caps) = minutes.captures(&text) {
            return Some(DurationSpec::Length(Duration::minutes(
                caps[1].parse().ok()?,
            )));
        }
        None
    }
}

const ALLDAY_PHRASES: &[&str] = &["all day", "butun kun", "весь день"];

fn duration_patterns(lang: Language) -> (&'static Regex, &'static Regex, &'static Regex) {
    match lang {
        Language::Uzbek => (&UZ_HM, &UZ_HOURS, &UZ_MINUTES),
        Language::Russian => (&RU_HM, &RU_HOURS, &RU_MINUTES),
        Language::English => (&EN_HM, &EN_HOURS, &EN_MINUTES),
    }
}

static UZ_HM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+soat\s+(\d+)\s+daqiqa").unwrap());
static UZ_HOURS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+soat").unwrap());
static UZ_MINUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+daqiqa").unwrap());
static RU_HM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+час\w*\s+(\d+)\s+минут").unwrap());
static RU_HOURS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+час").unwrap());
static RU_MINUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+минут").unwrap());
static EN_HM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+hours?\s+(\d+)\s+minutes?").unwrap());
static EN_HOURS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+hour").unwrap());
static EN_MINUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+minute").unwrap());

/// Turns recurrence phrases into `FREQ=...` rule strings.
pub struct RepeatNormalizer;

impl RepeatNormalizer {
    pub fn normalize(text: &str, lang: Language, until: Option<DateTime<Tz>>) -> Option<String> {
        let text = text.trim().to_lowercase();

        let mut rule = None;
        for &(phrase, freq, byday) in repeat_phrases(lang) {
            if text.contains(phrase) {
                rule = Some(match byday {
                    Some(day) => format!("FREQ={freq};BYDAY={day}"),
                    None => format!("FREQ={freq}"),
                });
                break;
            }
        }

        let mut rule = rule?;
        if let Some(until) = until {
            let stamp = until.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ");
            rule.push_str(&format!(";UNTIL={stamp}"));
        }
        Some(rule)
    }
}

type RepeatPhrase = (&'static str, &'static str, Option<&'static str>);

fn repeat_phrases(lang: Language) -> &'static [RepeatPhrase] {
    match lang {
        Language::Uzbek => &[
            ("har kun", "DAILY", None),
            ("har hafta", "WEEKLY", None),
            ("har oy", "MONTHLY", None),
            ("har yil", "YEARLY", None),
            ("har dushanba", "WEEKLY", Some("MO")),
            ("har seshanba", "WEEKLY", Some("TU")),
            ("har chorshanba", "WEEKLY", Some("WE")),
            ("har payshanba", "WEEKLY", Some("TH")),
            ("har juma", "WEEKLY", Some("FR")),
            ("har shanba", "WEEKLY", Some("SA")),
            ("har yakshanba", "WEEKLY", Some("SU")),
        ],
        Language::Russian => &[
            ("каждый день", "DAILY", None),
            ("каждую неделю", "WEEKLY", None),
            ("каждый месяц", "MONTHLY", None),
            ("каждый год", "YEARLY", None),
            ("каждый понедельник", "WEEKLY", Some("MO")),
            ("каждый вторник", "WEEKLY", Some("TU")),
            ("каждую среду", "WEEKLY", Some("WE")),
            ("каждый четверг", "WEEKLY", Some("TH")),
            ("каждую пятницу", "WEEKLY", Some("FR")),
            ("каждую субботу", "WEEKLY", Some("SA")),
            ("каждое воскресенье", "WEEKLY", Some("SU")),
        ],
        Language::English => &[
            ("every day", "DAILY", None),
            ("every week", "WEEKLY", None),
            ("every month", "MONTHLY", None),
            ("every year", "YEARLY", None),
            ("every monday", "WEEKLY", Some("MO")),
            ("every tuesday", "WEEKLY", Some("TU")),
            ("every wednesday", "WEEKLY", Some("WE")),
            ("every thursday", "WEEKLY", Some("TH")),
            ("every friday", "WEEKLY", Some("FR")),
            ("every saturday", "WEEKLY", Some("SA")),
            ("every sunday", "WEEKLY", Some("SU")),
        ],
    }
}

/// Reminder offsets as ISO-8601 durations: `PT30M`, `PT2H`, `P1D`.
pub fn normalize_alert(text: &str, lang: Language) -> Option<String> {
    let text = text.trim().to_lowercase();
    let (minutes, hours, days) = alert_patterns(lang);

    if let Some(caps) = minutes.captures(&text) {
        return Some(format!("PT{}M", &caps[1]));
    }
    if let Some(caps) = hours.captures(&text) {
        return Some(format!("PT{}H", &caps[1]));
    }
    if let Some(caps) = days.captures(&text) {
        return Some(format!("P{}D", &caps[1]));
    }
    None
}

fn alert_patterns(lang: Language) -> (&'static Regex, &'static Regex, &'static Regex) {
    match lang {
        Language::Uzbek => (&UZ_MINUTES, &UZ_HOURS, &UZ_A_DAYS),
        Language::Russian => (&RU_MINUTES, &RU_HOURS, &RU_A_DAYS),
        Language::English => (&EN_MINUTES, &EN_HOURS, &EN_A_DAYS),
    }
}

static UZ_A_DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+kun").unwrap());
static RU_A_DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+(?:день|дня|дней)").unwrap());
static EN_A_DAYS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+day").unwrap());

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const TZ: Tz = chrono_tz::Asia::Tashkent;

    // Wednesday.
    fn normalizer() -> DateTimeNormalizer {
        let now = TZ
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2025, 3, 5)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap(),
            )
            .unwrap();
        DateTimeNormalizer::with_now(TZ, now)
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        TZ.from_local_datetime(
            &NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_opt(h, mi, 0)
                .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn tomorrow_with_clock() {
        let got = normalizer().normalize("tomorrow at 15:00", Language::English);
        assert_eq!(got, Some(local(2025, 3, 6, 15, 0)));
    }

    #[test]
    fn tomorrow_defaults_to_noon() {
        let got = normalizer().normalize("ertaga", Language::Uzbek);
        assert_eq!(got, Some(local(2025, 3, 6, 12, 0)));
    }

    #[test]
    fn day_after_tomorrow_beats_tomorrow() {
        let got = normalizer().normalize("day after tomorrow", Language::English);
        assert_eq!(got, Some(local(2025, 3, 7, 12, 0)));
    }

    #[test]
    fn evening_word_sets_the_hour() {
        let got = normalizer().normalize("завтра вечером", Language::Russian);
        assert_eq!(got, Some(local(2025, 3, 6, 18, 0)));
    }

    #[test]
    fn next_week_is_monday_morning() {
        let got = normalizer().normalize("next week", Language::English);
        assert_eq!(got, Some(local(2025, 3, 10, 9, 0)));
    }

    #[test]
    fn weekend_is_saturday() {
        let got = normalizer().normalize("weekend", Language::English);
        assert_eq!(got, Some(local(2025, 3, 8, 10, 0)));
    }

    #[test]
    fn weekday_name_is_next_occurrence() {
        // Reference day is a Wednesday; "wednesday" must land a week out.
        let got = normalizer().normalize("wednesday", Language::English);
        assert_eq!(got, Some(local(2025, 3, 12, 12, 0)));
        let got = normalizer().normalize("friday at 9:30", Language::English);
        assert_eq!(got, Some(local(2025, 3, 7, 9, 30)));
    }

    #[test]
    fn bare_clock_means_today() {
        let got = normalizer().normalize("15:00", Language::English);
        assert_eq!(got, Some(local(2025, 3, 5, 15, 0)));
    }

    #[test]
    fn range_contributes_its_start() {
        let got = normalizer().normalize("10:00-11:00", Language::English);
        assert_eq!(got, Some(local(2025, 3, 5, 10, 0)));
    }

    #[test]
    fn meridiem_is_applied() {
        let got = normalizer().normalize("tomorrow 3pm", Language::English);
        assert_eq!(got, Some(local(2025, 3, 6, 15, 0)));
    }

    #[test]
    fn explicit_date_with_month_name() {
        let got = normalizer().normalize("15 oktabr 2025", Language::Uzbek);
        assert_eq!(got, Some(local(2025, 10, 15, 12, 0)));
    }

    #[test]
    fn iso_datetime_passes_through() {
        let got = normalizer().normalize("2025-04-01 08:30", Language::English);
        assert_eq!(got, Some(local(2025, 4, 1, 8, 30)));
    }

    #[test]
    fn durations_parse_per_language() {
        assert_eq!(
            DurationNormalizer::normalize("1 hour 30 minutes", Language::English),
            Some(DurationSpec::Length(Duration::minutes(90)))
        );
        assert_eq!(
            DurationNormalizer::normalize("2 soat", Language::Uzbek),
            Some(DurationSpec::Length(Duration::hours(2)))
        );
        assert_eq!(
            DurationNormalizer::normalize("45 минут", Language::Russian),
            Some(DurationSpec::Length(Duration::minutes(45)))
        );
        assert_eq!(
            DurationNormalizer::normalize("all day", Language::English),
            Some(DurationSpec::AllDay)
        );
        assert_eq!(DurationNormalizer::normalize("soon", Language::English), None);
    }

    #[test]
    fn repeats_render_freq_rules() {
        assert_eq!(
            RepeatNormalizer::normalize("every day", Language::English, None),
            Some("FREQ=DAILY".to_string())
        );
        assert_eq!(
            RepeatNormalizer::normalize("каждую пятницу", Language::Russian, None),
            Some("FREQ=WEEKLY;BYDAY=FR".to_string())
        );
        assert_eq!(
            RepeatNormalizer::normalize("har oy", Language::Uzbek, None),
            Some("FREQ=MONTHLY".to_string())
        );
    }

    #[test]
    fn repeat_until_is_utc_stamped() {
        let until = local(2025, 6, 1, 12, 0);
        let rule = RepeatNormalizer::normalize("every week", Language::English, Some(until));
        assert_eq!(rule, Some("FREQ=WEEKLY;UNTIL=20250601T070000Z".to_string()));
    }

    #[test]
    fn alerts_become_iso_offsets() {
        assert_eq!(
            normalize_alert("30 minutes before", Language::English),
            Some("PT30M".to_string())
        );
        assert_eq!(
            normalize_alert("за 2 часа", Language::Russian),
            Some("PT2H".to_string())
        );
        assert_eq!(
            normalize_alert("1 kun oldin", Language::Uzbek),
            Some("P1D".to_string())
        );
        assert_eq!(normalize_alert("sometime", Language::English), None);
    }
}
