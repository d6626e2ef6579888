//! Language detection and Arabic orthographic normalization.
//!
//! Arabic text is written with optional short-vowel diacritics and several
//! interchangeable letter forms. Both queries and indexed text are folded to
//! a single canonical spelling so that `أحمد`, `احمد` and `أَحْمَد` match.
//!
//! Folding rules applied by [`normalize_arabic`]:
//!
//! | Input | Output |
//! |-------|--------|
//! | harakat, tanween, shadda, sukun, superscript alef, Quranic marks | removed |
//! | tatweel `ـ` | removed |
//! | `أ` `إ` `آ` | `ا` |
//! | `ة` | `ه` |
//! | `ى` | `ي` |

use serde::{Deserialize, Serialize};

use crate::models::Language;

/// Script mix of a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedLanguage {
    En,
    Ar,
    Mixed,
}

impl DetectedLanguage {
    /// Collapse to a query language. Mixed text searches with the English
    /// dictionary since Latin terms need stemming and Arabic terms are
    /// folded before they reach the backend anyway.
    pub fn primary(self) -> Language {
        match self {
            DetectedLanguage::Ar => Language::Ar,
            DetectedLanguage::En | DetectedLanguage::Mixed => Language::En,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectedLanguage::En => "en",
            DetectedLanguage::Ar => "ar",
            DetectedLanguage::Mixed => "mixed",
        }
    }
}

/// True for characters in the Arabic Unicode blocks (base, supplement,
/// extended-A and both presentation-form blocks).
pub fn is_arabic_char(c: char) -> bool {
    matches!(c,
        '\u{0600}'..='\u{06FF}'
            | '\u{0750}'..='\u{077F}'
            | '\u{08A0}'..='\u{08FF}'
            | '\u{FB50}'..='\u{FDFF}'
            | '\u{FE70}'..='\u{FEFF}'
    )
}

fn is_arabic_diacritic(c: char) -> bool {
    matches!(c,
        '\u{0610}'..='\u{061A}'
            | '\u{064B}'..='\u{065F}'
            | '\u{0670}'
            | '\u{06D6}'..='\u{06DC}'
            | '\u{06DF}'..='\u{06E8}'
            | '\u{06EA}'..='\u{06ED}'
            | '\u{0640}'
    )
}

pub fn contains_arabic(text: &str) -> bool {
    text.chars().any(is_arabic_char)
}

/// Classify text by counting Arabic-block characters against Latin letters.
///
/// Returns [`DetectedLanguage::Mixed`] when both scripts are present and
/// [`DetectedLanguage::En`] when neither is (digits, punctuation, empty).
pub fn detect_language(text: &str) -> DetectedLanguage {
    let mut arabic = 0usize;
    let mut latin = 0usize;
    for c in text.chars() {
        if is_arabic_char(c) && c.is_alphabetic() {
            arabic += 1;
        } else if c.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&c) {
            latin += 1;
        }
    }

    match (arabic > 0, latin > 0) {
        (true, true) => DetectedLanguage::Mixed,
        (true, false) => DetectedLanguage::Ar,
        _ => DetectedLanguage::En,
    }
}

/// Strip Arabic diacritics, fold letter variants, and trim.
///
/// Idempotent: `normalize_arabic(&normalize_arabic(x)) == normalize_arabic(x)`.
pub fn normalize_arabic(text: &str) -> String {
    let folded: String = text
        .chars()
        .filter(|c| !is_arabic_diacritic(*c))
        .map(|c| match c {
            'أ' | 'إ' | 'آ' => 'ا',
            'ة' => 'ه',
            'ى' => 'ي',
            other => other,
        })
        .collect();
    folded.trim().to_string()
}

/// Canonical form used for both indexing and matching.
///
/// Lower-cases, applies [`normalize_arabic`] when Arabic is present, and
/// collapses runs of whitespace to a single space.
pub fn normalize_search_text(text: &str) -> String {
    let lower = text.to_lowercase();
    let folded = if contains_arabic(&lower) {
        normalize_arabic(&lower)
    } else {
        lower
    };
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_english() {
        assert_eq!(detect_language("climate policy"), DetectedLanguage::En);
    }

    #[test]
    fn test_detect_arabic() {
        assert_eq!(detect_language("التنمية المستدامة"), DetectedLanguage::Ar);
    }

    #[test]
    fn test_detect_mixed() {
        assert_eq!(detect_language("G20 قمة summit"), DetectedLanguage::Mixed);
    }

    #[test]
    fn test_detect_defaults_to_english() {
        assert_eq!(detect_language(""), DetectedLanguage::En);
        assert_eq!(detect_language("2024 / 17"), DetectedLanguage::En);
    }

    #[test]
    fn test_strips_diacritics() {
        assert_eq!(normalize_arabic("مُحَمَّد"), "محمد");
    }

    #[test]
    fn test_folds_alef_variants() {
        assert_eq!(normalize_arabic("أحمد"), "احمد");
        assert_eq!(normalize_arabic("إسلام"), "اسلام");
        assert_eq!(normalize_arabic("آمال"), "امال");
    }

    #[test]
    fn test_folds_taa_marbuta_and_alef_maksura() {
        assert_eq!(normalize_arabic("مدرسة"), "مدرسه");
        assert_eq!(normalize_arabic("مستشفى"), "مستشفي");
    }

    #[test]
    fn test_normalize_arabic_trims() {
        assert_eq!(normalize_arabic("  سلام  "), "سلام");
    }

    #[test]
    fn test_normalize_arabic_idempotent() {
        let samples = [
            "",
            "   ",
            "أَهْلاً وَسَهْلاً",
            " \u{064B}إدارة ",
            "المنظمة الدولية للتوحيد القياسي",
            "mixed نصّ text",
            "ـــطويلـــ",
        ];
        for s in samples {
            let once = normalize_arabic(s);
            assert_eq!(normalize_arabic(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_normalize_search_text_english() {
        assert_eq!(normalize_search_text("  Climate   POLICY "), "climate policy");
    }

    #[test]
    fn test_normalize_search_text_arabic() {
        assert_eq!(normalize_search_text("الأمم   المتحدة"), "الامم المتحده");
    }

    #[test]
    fn test_normalize_search_text_idempotent() {
        for s in ["Sustainable  Development", "التَّنمية المُستدامة", "UN الأمم"] {
            let once = normalize_search_text(s);
            assert_eq!(normalize_search_text(&once), once);
        }
    }
}
