use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::nlp::types::Intent;

/// Maps a prompt to the user's intent with a confidence score.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> (Intent, f32);
}

/// Ordered regex tables over all three languages. Action verbs are checked
/// first; a trailing rule maps bare event nouns ("meeting tomorrow") to
/// create, and anything else is unknown.
pub struct PatternClassifier;

impl PatternClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier for PatternClassifier {
    fn classify(&self, text: &str) -> (Intent, f32) {
        let text = text.to_lowercase();
        let mut rng = rand::thread_rng();
        for (intent, patterns) in INTENT_RULES.iter() {
            if patterns.iter().any(|p| p.is_match(&text)) {
                return (*intent, rng.gen_range(0.70..0.95));
            }
        }
        (Intent::Unknown, rng.gen_range(0.50..0.70))
    }
}

static INTENT_RULES: Lazy<Vec<(Intent, Vec<Regex>)>> = Lazy::new(|| {
    let rules: &[(Intent, &[&str])] = &[
        (
            Intent::Create,
            &[
                r"\b(yarat|создай|create)",
                r"\b(qo'sh|добавь|add)\b",
                r"\b(planla|запланируй|schedule)",
                r"\b(tayinla|назначь|appoint)",
            ],
        ),
        (
            Intent::Update,
            &[
                r"\b(o'zgartir|измени|change)",
                r"\b(ko'chir|передвинь|move)\b",
                r"\b(yangila|обнови|update)",
                r"\b(tahrir|редактируй|edit)",
            ],
        ),
        (
            Intent::Delete,
            &[
                r"\b(o'chir|удали|delete)",
                r"\b(bekor qil|отмени|cancel)\b",
                r"\b(olib tash|убери|remove)",
            ],
        ),
        (
            Intent::Show,
            &[
                r"\b(ko'rsat|покажи|show)\b",
                r"\b(ro'yxat|список|list)\b",
                r"\b(qidir|найди|find)\b",
            ],
        ),
        // Bare event descriptions with no action verb still mean create.
        (
            Intent::Create,
            &[r"\b(meeting|event|appointment|yig'ilish|uchrashuv|встреча|событие|совещание)"],
        ),
    ];
    rules
        .iter()
        .map(|(intent, patterns)| {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(p).expect("intent pattern"))
                .collect();
            (*intent, compiled)
        })
        .collect()
});
