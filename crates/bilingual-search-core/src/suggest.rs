//! Typeahead scoring.
//!
//! | Match | Score |
//! |-------|-------|
//! | title starts with prefix | `0.9 + 0.1 * plen / tlen` (0.9..=1.0) |
//! | title contains prefix at `pos` | `0.5 + 0.3 * (1 - pos / tlen)` (0.5..0.8) |
//! | neither | `0.4 * common_chars / max(plen, tlen)` (0..=0.4) |
//!
//! Lengths and positions are counted in characters of the normalized text.
//!
//! [`levenshtein_similarity`] backs "did you mean" corrections when a
//! search finds nothing.

use std::collections::HashMap;

use crate::text::normalize_search_text;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuggestionScore {
    pub score: f64,
    /// Character offset of the prefix in the normalized text, or the text
    /// length when the prefix does not occur.
    pub match_position: usize,
}

/// Score `text` against a typed `prefix`. Both are normalized first.
pub fn score_suggestion(prefix: &str, text: &str) -> SuggestionScore {
    let prefix = normalize_search_text(prefix);
    let text = normalize_search_text(text);

    let plen = prefix.chars().count();
    let tlen = text.chars().count();

    if plen == 0 || tlen == 0 {
        return SuggestionScore {
            score: 0.0,
            match_position: tlen,
        };
    }

    if text.starts_with(&prefix) {
        return SuggestionScore {
            score: 0.9 + 0.1 * (plen as f64 / tlen as f64),
            match_position: 0,
        };
    }

    if let Some(byte_pos) = text.find(&prefix) {
        let pos = text[..byte_pos].chars().count();
        return SuggestionScore {
            score: 0.5 + 0.3 * (1.0 - pos as f64 / tlen as f64),
            match_position: pos,
        };
    }

    let common = common_char_count(&prefix, &text);
    SuggestionScore {
        score: 0.4 * common as f64 / plen.max(tlen) as f64,
        match_position: tlen,
    }
}

/// Size of the multiset intersection of the two strings' characters.
fn common_char_count(a: &str, b: &str) -> usize {
    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *counts.entry(c).or_default() += 1;
    }
    let mut common = 0;
    for c in a.chars() {
        if let Some(n) = counts.get_mut(&c) {
            if *n > 0 {
                *n -= 1;
                common += 1;
            }
        }
    }
    common
}

/// Edit distance between two strings, counted in characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `(longer - distance) / longer` over the normalized strings: 1.0 for
/// identical text, 0.0 when either side is empty.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_search_text(a);
    let b = normalize_search_text(b);
    if a == b {
        return 1.0;
    }
    let longer = a.chars().count().max(b.chars().count());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    (longer - levenshtein(&a, &b)) as f64 / longer as f64
}
