//! Boolean query parsing and syntax validation.
//!
//! Free text from the search box is turned into a backend boolean query
//! string using tsquery-style operators:
//!
//! | Input | Output |
//! |-------|--------|
//! | `AND` | `&` |
//! | `OR` | `\|` |
//! | `NOT` | `!` |
//! | `"a b c"` / `'a b c'` | `(a <-> b <-> c)` |
//! | adjacent terms | joined with `&` |
//!
//! Parsing never fails: whatever survives sanitization is assembled into a
//! well-formed expression (balanced parentheses, no dangling operators).
//! Rejecting malformed input is the job of [`validate_query_syntax`], which
//! callers run first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::Language;
use crate::text::{detect_language, normalize_search_text};

/// Maximum accepted query length, in characters.
pub const MAX_QUERY_LENGTH: usize = 500;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"]*)"|'([^']*)'|([()])|([^\s()"']+)"#).expect("valid token regex")
});

static BOOLEAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(AND|OR|NOT)\b").expect("valid boolean regex"));

/// Result of parsing a raw query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Backend boolean expression, or empty if nothing searchable remained.
    pub normalized_query: String,
    pub has_boolean_operators: bool,
    /// Normalized search terms in input order. Quoted phrases are kept as
    /// one space-joined token. Operator keywords are never included.
    pub tokens: Vec<String>,
    pub language: Language,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self.normalized_query.is_empty()
    }

    pub fn mode(&self) -> QueryMode {
        build_query_mode(self)
    }
}

/// Which backend query constructor to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Single bare term or phrase: hand the token to a plain-text constructor.
    Plain,
    /// Full boolean expression in `normalized_query`.
    Boolean,
}

/// Prefer [`QueryMode::Plain`] for a single operator-free token.
pub fn build_query_mode(parsed: &ParsedQuery) -> QueryMode {
    if !parsed.has_boolean_operators && parsed.tokens.len() == 1 {
        QueryMode::Plain
    } else {
        QueryMode::Boolean
    }
}

/// Input validation failures. These are surfaced to the caller as-is and
/// never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("query is too long ({length} characters, maximum {max})")]
    QueryTooLong { length: usize, max: usize },
    #[error("query has unbalanced parentheses")]
    UnbalancedParentheses,
    #[error("query has unbalanced quotes")]
    UnbalancedQuotes,
}

/// Validate with the default [`MAX_QUERY_LENGTH`].
pub fn validate_query_syntax(query: &str) -> Result<(), QueryError> {
    validate_query_syntax_with_limit(query, MAX_QUERY_LENGTH)
}

pub fn validate_query_syntax_with_limit(query: &str, max_length: usize) -> Result<(), QueryError> {
    if query.trim().is_empty() {
        return Err(QueryError::EmptyQuery);
    }

    let length = query.chars().count();
    if length > max_length {
        return Err(QueryError::QueryTooLong {
            length,
            max: max_length,
        });
    }

    let mut depth: i64 = 0;
    for c in query.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(QueryError::UnbalancedParentheses);
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(QueryError::UnbalancedParentheses);
    }

    let double = query.chars().filter(|c| *c == '"').count();
    let single = query.chars().filter(|c| *c == '\'').count();
    if double % 2 != 0 || single % 2 != 0 {
        return Err(QueryError::UnbalancedQuotes);
    }

    Ok(())
}

/// Drop everything except word characters, whitespace, quotes,
/// parentheses, and the Arabic block.
pub fn sanitize_query(raw: &str) -> String {
    raw.chars()
        .filter(|c| {
            c.is_alphanumeric()
                || *c == '_'
                || c.is_whitespace()
                || matches!(c, '"' | '\'' | '(' | ')')
                || ('\u{0600}'..='\u{06FF}').contains(c)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Term(String),
    Phrase(Vec<String>),
    And,
    Or,
    Not,
    Open,
    Close,
}

impl Piece {
    fn is_operand_end(&self) -> bool {
        matches!(self, Piece::Term(_) | Piece::Phrase(_) | Piece::Close)
    }

    fn is_binary(&self) -> bool {
        matches!(self, Piece::And | Piece::Or)
    }
}

/// Parse a raw query into a [`ParsedQuery`].
///
/// `language` is a hint from the caller; when absent the language is
/// detected from the text.
pub fn parse_search_query(raw: &str, language: Option<Language>) -> ParsedQuery {
    let sanitized = sanitize_query(raw);
    let has_boolean_operators = BOOLEAN_RE.is_match(&sanitized);
    let language = language.unwrap_or_else(|| detect_language(raw).primary());

    let mut tokens = Vec::new();
    let mut pieces = Vec::new();

    for caps in TOKEN_RE.captures_iter(&sanitized) {
        if let Some(phrase) = caps.get(1).or_else(|| caps.get(2)) {
            let words: Vec<String> = phrase
                .as_str()
                .split_whitespace()
                .map(normalize_search_text)
                .filter(|w| !w.is_empty())
                .collect();
            match words.len() {
                0 => {}
                1 => {
                    tokens.push(words[0].clone());
                    pieces.push(Piece::Term(words[0].clone()));
                }
                _ => {
                    tokens.push(words.join(" "));
                    pieces.push(Piece::Phrase(words));
                }
            }
        } else if let Some(paren) = caps.get(3) {
            pieces.push(if paren.as_str() == "(" {
                Piece::Open
            } else {
                Piece::Close
            });
        } else if let Some(word) = caps.get(4) {
            match word.as_str().to_ascii_uppercase().as_str() {
                "AND" => pieces.push(Piece::And),
                "OR" => pieces.push(Piece::Or),
                "NOT" => pieces.push(Piece::Not),
                _ => {
                    let term = normalize_search_text(word.as_str());
                    if !term.is_empty() {
                        tokens.push(term.clone());
                        pieces.push(Piece::Term(term));
                    }
                }
            }
        }
    }

    let normalized_query = render(&assemble(pieces));

    ParsedQuery {
        normalized_query,
        has_boolean_operators,
        tokens,
        language,
    }
}

/// Insert implicit `&`, collapse operator runs, drop dangling operators
/// and empty groups, and balance parentheses.
fn assemble(pieces: Vec<Piece>) -> Vec<Piece> {
    let mut out: Vec<Piece> = Vec::with_capacity(pieces.len());
    let mut depth = 0usize;

    for piece in pieces {
        match piece {
            Piece::Term(_) | Piece::Phrase(_) | Piece::Open => {
                if out.last().is_some_and(Piece::is_operand_end) {
                    out.push(Piece::And);
                }
                if piece == Piece::Open {
                    depth += 1;
                }
                out.push(piece);
            }
            Piece::Not => {
                if out.last().is_some_and(Piece::is_operand_end) {
                    out.push(Piece::And);
                }
                if out.last() != Some(&Piece::Not) {
                    out.push(Piece::Not);
                }
            }
            Piece::And | Piece::Or => {
                while out.last() == Some(&Piece::Not) {
                    out.pop();
                }
                match out.last() {
                    None | Some(Piece::Open) => {}
                    Some(last) if last.is_binary() => {
                        out.pop();
                        out.push(piece);
                    }
                    Some(_) => out.push(piece),
                }
            }
            Piece::Close => {
                if depth == 0 {
                    continue;
                }
                trim_dangling(&mut out);
                depth -= 1;
                if out.last() == Some(&Piece::Open) {
                    out.pop();
                    trim_dangling(&mut out);
                } else {
                    out.push(Piece::Close);
                }
            }
        }
    }

    loop {
        trim_dangling(&mut out);
        match out.last() {
            Some(Piece::Open) => {
                out.pop();
                depth = depth.saturating_sub(1);
            }
            _ => break,
        }
    }
    for _ in 0..depth {
        out.push(Piece::Close);
    }

    out
}

fn trim_dangling(out: &mut Vec<Piece>) {
    while out
        .last()
        .is_some_and(|p| p.is_binary() || *p == Piece::Not)
    {
        out.pop();
    }
}

fn render(pieces: &[Piece]) -> String {
    let mut s = String::new();
    for piece in pieces {
        match piece {
            Piece::Term(t) => s.push_str(t),
            Piece::Phrase(words) => {
                s.push('(');
                s.push_str(&words.join(" <-> "));
                s.push(')');
            }
            Piece::And => s.push_str(" & "),
            Piece::Or => s.push_str(" | "),
            Piece::Not => s.push('!'),
            Piece::Open => s.push('('),
            Piece::Close => s.push(')'),
        }
    }
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One lexeme of a rendered boolean expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprToken {
    Word(String),
    And,
    Or,
    Not,
    /// `<->`, joins the words of a phrase.
    Follow,
    Open,
    Close,
}

/// Split a `normalized_query` back into lexemes, for store backends that
/// evaluate or translate the expression.
pub fn lex_expression(expr: &str) -> Vec<ExprToken> {
    let chars: Vec<char> = expr.chars().collect();
    let mut toks = Vec::new();
    let mut word = String::new();
    let mut i = 0;

    while i < chars.len() {
        let op = match chars[i] {
            '(' => Some(ExprToken::Open),
            ')' => Some(ExprToken::Close),
            '&' => Some(ExprToken::And),
            '|' => Some(ExprToken::Or),
            '!' => Some(ExprToken::Not),
            '<' if chars.get(i + 1) == Some(&'-') && chars.get(i + 2) == Some(&'>') => {
                i += 2;
                Some(ExprToken::Follow)
            }
            c if c.is_whitespace() => None,
            c => {
                word.push(c);
                i += 1;
                continue;
            }
        };
        if !word.is_empty() {
            toks.push(ExprToken::Word(std::mem::take(&mut word)));
        }
        toks.extend(op);
        i += 1;
    }
    if !word.is_empty() {
        toks.push(ExprToken::Word(word));
    }
    toks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(q: &str) -> ParsedQuery {
        parse_search_query(q, Some(Language::En))
    }

    #[test]
    fn test_quoted_phrase_becomes_proximity() {
        let p = parse("\"sustainable development\"");
        assert_eq!(p.normalized_query, "(sustainable <-> development)");
        assert!(!p.has_boolean_operators);
        assert_eq!(p.tokens, vec!["sustainable development"]);
    }

    #[test]
    fn test_single_quoted_phrase() {
        let p = parse("'Water Security'");
        assert_eq!(p.normalized_query, "(water <-> security)");
    }

    #[test]
    fn test_and_operator() {
        let p = parse("climate AND policy");
        assert_eq!(p.tokens, vec!["climate", "policy"]);
        assert!(p.has_boolean_operators);
        assert!(p.normalized_query.contains('&'));
        assert_eq!(p.normalized_query, "climate & policy");
    }

    #[test]
    fn test_or_and_not() {
        let p = parse("energy OR water NOT oil");
        assert_eq!(p.normalized_query, "energy | water & !oil");
        assert_eq!(p.tokens, vec!["energy", "water", "oil"]);
    }

    #[test]
    fn test_lowercase_operators_are_recognized() {
        let p = parse("trade or tariffs");
        assert!(p.has_boolean_operators);
        assert_eq!(p.normalized_query, "trade | tariffs");
    }

    #[test]
    fn test_implicit_and_between_terms() {
        let p = parse("Climate Policy");
        assert_eq!(p.normalized_query, "climate & policy");
        assert!(!p.has_boolean_operators);
    }

    #[test]
    fn test_parentheses_pass_through() {
        let p = parse("(energy OR water) AND policy");
        assert_eq!(p.normalized_query, "(energy | water) & policy");
    }

    #[test]
    fn test_consecutive_operators_collapse_to_later() {
        let p = parse("energy AND OR water");
        assert_eq!(p.normalized_query, "energy | water");
    }

    #[test]
    fn test_dangling_operators_stripped() {
        assert_eq!(parse("AND energy OR").normalized_query, "energy");
        assert_eq!(parse("OR NOT").normalized_query, "");
    }

    #[test]
    fn test_leading_not_kept() {
        assert_eq!(parse("NOT archived").normalized_query, "!archived");
    }

    #[test]
    fn test_unbalanced_parentheses_are_repaired() {
        assert_eq!(parse("(a OR b").normalized_query, "(a | b)");
        assert_eq!(parse("a) OR b").normalized_query, "a | b");
        assert_eq!(parse("() a").normalized_query, "a");
    }

    #[test]
    fn test_sanitization_strips_symbols() {
        let p = parse("climate & policy!! <script>");
        assert_eq!(p.tokens, vec!["climate", "policy", "script"]);
        assert!(!p.normalized_query.contains('<'));
    }

    #[test]
    fn test_arabic_terms_are_folded() {
        let p = parse_search_query("الأمم المتحدة", None);
        assert_eq!(p.language, Language::Ar);
        assert_eq!(p.tokens, vec!["الامم", "المتحده"]);
        assert_eq!(p.normalized_query, "الامم & المتحده");
    }

    #[test]
    fn test_language_detected_when_no_hint() {
        assert_eq!(parse_search_query("trade", None).language, Language::En);
        assert_eq!(parse_search_query("تجارة", None).language, Language::Ar);
        assert_eq!(parse_search_query("تجارة", Some(Language::En)).language, Language::En);
    }

    #[test]
    fn test_empty_input() {
        let p = parse("   ");
        assert!(p.is_empty());
        assert!(p.tokens.is_empty());
    }

    #[test]
    fn test_query_mode() {
        assert_eq!(parse("climate").mode(), QueryMode::Plain);
        assert_eq!(parse("\"climate change\"").mode(), QueryMode::Plain);
        assert_eq!(parse("climate change").mode(), QueryMode::Boolean);
        assert_eq!(parse("NOT climate").mode(), QueryMode::Boolean);
    }

    #[test]
    fn test_lex_expression_round_trips_render() {
        let p = parse("\"water policy\" AND NOT oil");
        assert_eq!(
            lex_expression(&p.normalized_query),
            vec![
                ExprToken::Open,
                ExprToken::Word("water".into()),
                ExprToken::Follow,
                ExprToken::Word("policy".into()),
                ExprToken::Close,
                ExprToken::And,
                ExprToken::Not,
                ExprToken::Word("oil".into()),
            ]
        );
    }

    #[test]
    fn test_validate_empty() {
        assert_eq!(validate_query_syntax(""), Err(QueryError::EmptyQuery));
        assert_eq!(validate_query_syntax("  \t "), Err(QueryError::EmptyQuery));
    }

    #[test]
    fn test_validate_unbalanced_parens() {
        assert_eq!(
            validate_query_syntax("(a OR b"),
            Err(QueryError::UnbalancedParentheses)
        );
        assert_eq!(
            validate_query_syntax("a) OR (b"),
            Err(QueryError::UnbalancedParentheses)
        );
    }

    #[test]
    fn test_validate_unbalanced_quotes() {
        assert_eq!(
            validate_query_syntax("\"open phrase"),
            Err(QueryError::UnbalancedQuotes)
        );
        assert_eq!(
            validate_query_syntax("it's"),
            Err(QueryError::UnbalancedQuotes)
        );
    }

    #[test]
    fn test_validate_too_long() {
        let long = "a".repeat(MAX_QUERY_LENGTH + 1);
        assert!(matches!(
            validate_query_syntax(&long),
            Err(QueryError::QueryTooLong { length: 501, max: 500 })
        ));
        assert!(validate_query_syntax(&"a".repeat(MAX_QUERY_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_ok() {
        assert!(validate_query_syntax("(climate OR \"water policy\") AND NOT oil").is_ok());
    }
}
