use once_cell::sync::Lazy;
use tracing::debug;

use crate::nlp::types::Language;

/// Keyword and character-class scoring over the three supported languages.
///
/// Each language gets `0.7 * keyword_hits + 0.3 * native_char_ratio`; the
/// highest score wins, with ties broken in Uzbek, Russian, English order.
pub struct LanguageDetector {
    default: Language,
    threshold: f32,
}

impl LanguageDetector {
    pub fn new(default: Language, threshold: f32) -> Self {
        Self { default, threshold }
    }

    /// Returns the best-scoring language with a confidence in `[0, 1]`.
    /// Empty input reports the default at zero confidence.
    pub fn detect(&self, text: &str) -> (Language, f32) {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return (self.default, 0.0);
        }

        let scores: Vec<(Language, f32)> = CANDIDATE_ORDER
            .iter()
            .map(|&lang| (lang, score_language(&text, lang)))
            .collect();

        let (mut best, mut best_score) = scores[0];
        for &(lang, score) in &scores[1..] {
            if score > best_score {
                best = lang;
                best_score = score;
            }
        }

        let max_score = scores.iter().map(|&(_, s)| s).fold(0.0f32, f32::max);
        let confidence = if max_score > 0.0 {
            best_score / max_score
        } else {
            0.5
        };
        debug!(language = %best, confidence, "language detected");
        (best, confidence)
    }

    /// Like [`detect`](Self::detect) but falls back to the default language
    /// when confidence is below the configured threshold.
    pub fn detect_with_fallback(&self, text: &str) -> (Language, f32) {
        let (lang, confidence) = self.detect(text);
        if confidence < self.threshold {
            (self.default, confidence)
        } else {
            (lang, confidence)
        }
    }
}

const CANDIDATE_ORDER: &[Language] = &[Language::Uzbek, Language::Russian, Language::English];

fn score_language(text: &str, lang: Language) -> f32 {
    let keywords: &[&str] = match lang {
        Language::Uzbek => &UZBEK_KEYWORDS,
        Language::Russian => &RUSSIAN_KEYWORDS,
        Language::English => &ENGLISH_KEYWORDS,
    };
    let keyword_hits = keywords.iter().filter(|kw| text.contains(*kw)).count() as f32;

    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    let char_ratio = if letters.is_empty() {
        0.0
    } else {
        let native = letters.iter().filter(|&&c| is_native_char(c, lang)).count() as f32;
        native / letters.len() as f32
    };

    0.7 * keyword_hits + 0.3 * char_ratio
}

fn is_native_char(c: char, lang: Language) -> bool {
    match lang {
        // Latin alphabet plus the apostrophes of o'/g' digraphs.
        Language::Uzbek => c.is_ascii_alphabetic() || c == '\u{2018}' || c == '\u{02BB}',
        Language::Russian => ('а'..='я').contains(&c) || c == 'ё',
        Language::English => c.is_ascii_alphabetic(),
    }
}

static UZBEK_KEYWORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "ertaga", "bugun", "kecha", "indinga", "soat", "daqiqa", "hafta", "kun", "oy",
        "yig'ilish", "uchrashuv", "yarat", "qo'sh", "o'chir", "ko'rsat", "har", "oldin",
        "va", "bilan", "uchun", "menga", "ertalab", "kechqurun", "tushda",
    ]
});

static RUSSIAN_KEYWORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "завтра", "сегодня", "вчера", "послезавтра", "встреча", "событие", "создай",
        "добавь", "удали", "покажи", "перенеси", "каждый", "каждую", "неделя", "минут",
        "часа", "час", "утра", "вечера", "до", "за", "в", "на",
    ]
});

static ENGLISH_KEYWORDS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "tomorrow", "today", "yesterday", "meeting", "event", "create", "add", "delete",
        "show", "schedule", "every", "week", "hour", "minute", "morning", "evening",
        "remind", "before", "at", "on", "the", "with",
    ]
});
