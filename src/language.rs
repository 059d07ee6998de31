//! Language routing: which language a query is in, which language the
//! answer should be in, and whether the query has to be translated to
//! English before retrieval.
//!
//! Detection is a script heuristic. Text is Arabic-script when most of its
//! letters fall in the Arabic blocks; it is Persian when those letters
//! include a Persian-only character. Latin-script text is reported as
//! English, anything else as `unknown`.

use std::fmt;

/// Target language for the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnswerLanguage {
    Arabic,
    English,
    Persian,
}

impl AnswerLanguage {
    pub fn code(&self) -> &'static str {
        match self {
            AnswerLanguage::Arabic => "ar",
            AnswerLanguage::English => "en",
            AnswerLanguage::Persian => "fa",
        }
    }

    /// English display name, used in status messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            AnswerLanguage::Arabic => "Arabic",
            AnswerLanguage::English => "English",
            AnswerLanguage::Persian => "Persian",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ar" => Some(AnswerLanguage::Arabic),
            "en" => Some(AnswerLanguage::English),
            "fa" | "fas" | "per" => Some(AnswerLanguage::Persian),
            _ => None,
        }
    }

    /// Arabic and Persian answers are rendered right-to-left.
    pub fn is_rtl(&self) -> bool {
        matches!(self, AnswerLanguage::Arabic | AnswerLanguage::Persian)
    }
}

impl fmt::Display for AnswerLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Override phrase buckets, checked in this order.
const OVERRIDES: &[(AnswerLanguage, &[&str])] = &[
    (
        AnswerLanguage::Arabic,
        &[
            "answer in arabic",
            "in arabic",
            "arabic",
            "ans in arabic",
            "باللغة العربيه",
            "اجب بالعربيه",
        ],
    ),
    (
        AnswerLanguage::English,
        &[
            "answer in english",
            "ans in english",
            "in english",
            "english",
            "باللغة الانجليزيه",
            "اجب بالانجليزيه",
        ],
    ),
    (
        AnswerLanguage::Persian,
        &[
            "answer in persian",
            "answer in farsi",
            "in persian",
            "in farsi",
            "بالفارسية",
            "اجب بالفارسية",
        ],
    ),
];

/// Outcome of routing one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePlan {
    /// Detected language code (`ar`, `fa`, `en` or `unknown`).
    pub detected: String,
    pub answer_lang: AnswerLanguage,
    /// Source language of the query when it must be translated to English.
    pub translate_query_from: Option<AnswerLanguage>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LanguageRouter;

impl LanguageRouter {
    pub fn new() -> Self {
        Self
    }

    /// Best-effort language code for `text`; `"unknown"` when undecidable.
    pub fn detect_language(&self, text: &str) -> String {
        detect_script(text).to_string()
    }

    /// Explicit "answer in X" request, if any.
    pub fn detect_override(&self, text: &str) -> Option<AnswerLanguage> {
        let normalized = text.trim().to_lowercase().replace(['إ', 'أ'], "ا");
        OVERRIDES
            .iter()
            .find(|(_, triggers)| triggers.iter().any(|t| normalized.contains(t)))
            .map(|(lang, _)| *lang)
    }

    pub fn resolve(&self, text: &str) -> LanguagePlan {
        let overridden = self.detect_override(text);
        let detected = self.detect_language(text);
        let detected_rtl = AnswerLanguage::from_code(&detected).filter(|l| l.is_rtl());

        let answer_lang = overridden
            .or(detected_rtl)
            .unwrap_or(AnswerLanguage::English);

        tracing::debug!(
            detected = %detected,
            overridden = ?overridden,
            answer = %answer_lang,
            "language resolved"
        );

        LanguagePlan {
            detected,
            answer_lang,
            translate_query_from: detected_rtl,
        }
    }
}

fn detect_script(text: &str) -> &'static str {
    let mut arabic_script = 0usize;
    let mut latin = 0usize;
    let mut persian_marker = false;

    for c in text.chars().filter(|c| c.is_alphabetic()) {
        match c {
            // Persian-only letters: peh, tcheh, jeh, gaf, farsi yeh, keheh
            'پ' | 'چ' | 'ژ' | 'گ' | 'ی' | 'ک' => {
                arabic_script += 1;
                persian_marker = true;
            }
            '\u{0600}'..='\u{06FF}'
            | '\u{0750}'..='\u{077F}'
            | '\u{08A0}'..='\u{08FF}'
            | '\u{FB50}'..='\u{FDFF}'
            | '\u{FE70}'..='\u{FEFF}' => arabic_script += 1,
            c if c.is_ascii_alphabetic() => latin += 1,
            '\u{00C0}'..='\u{024F}' => latin += 1,
            _ => {}
        }
    }

    if arabic_script == 0 && latin == 0 {
        "unknown"
    } else if arabic_script >= latin {
        if persian_marker {
            "fa"
        } else {
            "ar"
        }
    } else {
        "en"
    }
}
