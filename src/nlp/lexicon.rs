//! Word lists shared by the slot tagger, the normalizers and title
//! extraction. All entries are lowercase; lookups lowercase first.

use chrono::Weekday;

pub(crate) const RELATIVE_DAY_WORDS: &[&str] = &[
    "today", "tomorrow", "yesterday", "weekend",
    "bugun", "ertaga", "kecha", "indinga",
    "сегодня", "завтра", "вчера", "послезавтра", "выходные",
];

pub(crate) const WEEK_TERMS: &[&str] = &[
    "week", "hafta", "oxiri", "неделе", "неделю", "неделя",
];

/// Qualifiers that extend a week term to its left ("next week").
pub(crate) const WEEK_QUALIFIERS: &[&str] = &[
    "next", "this", "keyingi", "shu", "следующей", "этой", "на",
];

pub(crate) const TIME_OF_DAY_WORDS: &[&str] = &[
    "morning", "afternoon", "evening", "night",
    "ertalab", "tushda", "kechqurun", "tunda",
    "утром", "утро", "вечером", "вечер", "ночью", "ночь",
];

pub(crate) const WEEKDAYS: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
    ("dushanba", Weekday::Mon),
    ("seshanba", Weekday::Tue),
    ("chorshanba", Weekday::Wed),
    ("payshanba", Weekday::Thu),
    ("juma", Weekday::Fri),
    ("shanba", Weekday::Sat),
    ("yakshanba", Weekday::Sun),
    ("понедельник", Weekday::Mon),
    ("вторник", Weekday::Tue),
    ("среду", Weekday::Wed),
    ("среда", Weekday::Wed),
    ("четверг", Weekday::Thu),
    ("пятницу", Weekday::Fri),
    ("пятница", Weekday::Fri),
    ("субботу", Weekday::Sat),
    ("суббота", Weekday::Sat),
    ("воскресенье", Weekday::Sun),
];

pub(crate) const MONTHS: &[(&str, u32)] = &[
    ("yanvar", 1), ("fevral", 2), ("mart", 3), ("aprel", 4),
    ("may", 5), ("iyun", 6), ("iyul", 7), ("avgust", 8),
    ("sentabr", 9), ("oktabr", 10), ("noyabr", 11), ("dekabr", 12),
    ("january", 1), ("february", 2), ("march", 3), ("april", 4),
    ("june", 6), ("july", 7), ("august", 8),
    ("september", 9), ("october", 10), ("november", 11), ("december", 12),
    ("января", 1), ("февраля", 2), ("марта", 3), ("апреля", 4),
    ("мая", 5), ("июня", 6), ("июля", 7), ("августа", 8),
    ("сентября", 9), ("октября", 10), ("ноября", 11), ("декабря", 12),
];

pub(crate) const HOUR_UNITS: &[&str] = &[
    "hour", "hours", "soat", "час", "часа", "часов",
];

pub(crate) const MINUTE_UNITS: &[&str] = &[
    "minute", "minutes", "min", "daqiqa", "минут", "минуты", "минута",
];

pub(crate) const DAY_UNITS: &[&str] = &["day", "days", "kun", "день", "дня", "дней"];

/// Follow a quantity to turn a duration into a reminder ("30 minutes before").
pub(crate) const BEFORE_MARKERS: &[&str] = &["before", "oldin", "до"];

/// Precede a quantity with the same effect ("за 30 минут").
pub(crate) const PRE_MARKERS: &[&str] = &["за"];

pub(crate) const EVERY_MARKERS: &[&str] = &["every", "har", "каждый", "каждую", "каждое"];

pub(crate) const ALLDAY_PAIRS: &[(&str, &str)] = &[
    ("all", "day"),
    ("butun", "kun"),
    ("весь", "день"),
];

/// Connectives that glue two datetime fragments ("tomorrow at 15:00").
pub(crate) const DATETIME_CONNECTIVES: &[&str] = &["at", "on", "da", "soat", "в", "с"];

/// Nouns whose trailing clause is a usable fallback title.
pub(crate) const EVENT_NOUNS: &[&str] = &[
    "встреча", "meeting", "yig'ilish", "yig'ilishi", "uchrashuv", "событие", "event", "task",
];

pub(crate) fn weekday_for(word: &str) -> Option<Weekday> {
    WEEKDAYS
        .iter()
        .find(|(name, _)| *name == word)
        .map(|&(_, day)| day)
}

pub(crate) fn month_for(word: &str) -> Option<u32> {
    MONTHS
        .iter()
        .find(|(name, _)| *name == word)
        .map(|&(_, month)| month)
}

pub(crate) fn time_of_day_hour(word: &str) -> Option<(u32, u32)> {
    let hour = match word {
        "morning" | "ertalab" | "утром" | "утро" => 9,
        "afternoon" | "tushda" | "днём" => 14,
        "evening" | "kechqurun" | "вечером" | "вечер" => 18,
        "night" | "tunda" | "ночью" | "ночь" => 22,
        _ => return None,
    };
    Some((hour, 0))
}
