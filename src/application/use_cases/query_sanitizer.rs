//! Candidate query sanitizer
//!
//! Takes untrusted SQL text (typically produced by a language model) and
//! returns a query that can only read a bounded number of rows from one
//! dataset table, through allow-listed columns. Anything that fails the
//! checks is replaced by a synthesized fallback query. This never errors.
//!
//! Pipeline:
//! 1. quote bare allow-listed column names
//! 2. tokenize and validate the structure
//! 3. clamp or append LIMIT, or fall back

use super::sql_lexer::{is_word_char, render, tokenize, Token, TokenKind};
use crate::domain::sql_type::quote_identifier;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

pub const DEFAULT_LIMIT: u64 = 30;
pub const MAX_LIMIT: u64 = 50;

/// Statements and clauses that never appear in an accepted query
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
    "PRAGMA", "ATTACH", "DETACH",
];

const SET_OPERATORS: &[&str] = &["UNION", "INTERSECT", "EXCEPT", "JOIN"];

/// Keywords a column name may collide with; such names are left unquoted
const RESERVED_WORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "ORDER", "HAVING", "LIMIT", "OFFSET", "AND", "OR",
    "NOT", "AS", "DISTINCT", "IN", "IS", "NULL", "LIKE", "BETWEEN", "ASC", "DESC", "CASE", "WHEN",
    "THEN", "ELSE", "END",
];

static LIMIT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bLIMIT\s+([0-9]+)").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizedQuery {
    pub sql: String,
    /// Why the candidate was replaced; `None` when it passed validation
    pub fallback_reason: Option<String>,
}

impl SanitizedQuery {
    pub fn used_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Sanitize `candidate` against one table and its column allow-list
pub fn sanitize(candidate: &str, table: &str, allowed_columns: &[String]) -> SanitizedQuery {
    let quoted = quote_allowed_columns(candidate, allowed_columns);

    match validate(&quoted, table, allowed_columns) {
        Ok(sql) => {
            debug!(table, sql = %sql, "Candidate query accepted");
            SanitizedQuery {
                sql,
                fallback_reason: None,
            }
        }
        Err(reason) => {
            warn!(table, reason = %reason, "Candidate query rejected, using fallback");
            SanitizedQuery {
                sql: fallback_query(candidate, table, allowed_columns),
                fallback_reason: Some(reason),
            }
        }
    }
}

/// `SELECT "<c1>", ... FROM <table> LIMIT <n>`, with `n` taken from the
/// candidate's own LIMIT when it has one
pub fn fallback_query(candidate: &str, table: &str, allowed_columns: &[String]) -> String {
    let limit = LIMIT_PATTERN
        .captures(candidate)
        .and_then(|c| c.get(1))
        .map(|m| parse_limit(m.as_str()))
        .unwrap_or(DEFAULT_LIMIT);

    let projection = if allowed_columns.is_empty() {
        "*".to_string()
    } else {
        allowed_columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "SELECT {} FROM {} LIMIT {}",
        projection,
        table,
        clamp_limit(limit)
    )
}

pub fn clamp_limit(limit: u64) -> u64 {
    limit.min(MAX_LIMIT)
}

/// Digits to a limit; values too large for u64 saturate
fn parse_limit(digits: &str) -> u64 {
    digits.parse::<u64>().unwrap_or(u64::MAX)
}

// ============================================================
// QUOTING PASS
// ============================================================

struct Segment {
    text: String,
    protected: bool,
}

/// Wrap bare occurrences of allow-listed columns in double quotes.
///
/// Longest names go first so `ageGroup` is never split by `age`. Existing
/// quoted identifiers and string literals are left untouched, as are
/// occurrences glued to a word character or a `"`, occurrences followed by
/// `(` (function calls) and names that are SQL keywords.
pub fn quote_allowed_columns(sql: &str, allowed_columns: &[String]) -> String {
    let mut columns: Vec<&String> = allowed_columns
        .iter()
        .filter(|c| !c.is_empty())
        .filter(|c| !RESERVED_WORDS.iter().any(|k| k.eq_ignore_ascii_case(c)))
        .collect();
    columns.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    columns.dedup();

    let mut segments = split_protected(sql);
    for column in columns {
        segments = quote_in_segments(segments, column);
    }
    segments.into_iter().map(|s| s.text).collect()
}

/// Split into quoted (protected) and bare runs. An unterminated quote
/// protects the rest of the text.
fn split_protected(sql: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut bare = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '"' && c != '\'' {
            bare.push(c);
            continue;
        }
        if !bare.is_empty() {
            segments.push(Segment {
                text: std::mem::take(&mut bare),
                protected: false,
            });
        }
        let mut quoted = String::from(c);
        while let Some(q) = chars.next() {
            quoted.push(q);
            if q == c {
                if chars.peek() == Some(&c) {
                    if let Some(escaped) = chars.next() {
                        quoted.push(escaped);
                    }
                    continue;
                }
                break;
            }
        }
        segments.push(Segment {
            text: quoted,
            protected: true,
        });
    }

    if !bare.is_empty() {
        segments.push(Segment {
            text: bare,
            protected: false,
        });
    }
    segments
}

fn quote_in_segments(segments: Vec<Segment>, column: &str) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    let mut iter = segments.into_iter().peekable();

    while let Some(segment) = iter.next() {
        if segment.protected {
            out.push(segment);
            continue;
        }

        let before_segment = out.last().and_then(|s| s.text.chars().last());
        let after_segment = iter.peek().and_then(|s| s.text.chars().next());

        let text = segment.text;
        let mut cursor = 0;
        let mut bare = String::new();
        let mut search_from = 0;

        while let Some(found) = text[search_from..].find(column) {
            let start = search_from + found;
            let end = start + column.len();

            let prev = text[..start].chars().last().or(before_segment);
            let next = text[end..].chars().next().or(after_segment);
            let followed_by_call = text[end..].trim_start().starts_with('(');

            if is_boundary(prev) && is_boundary(next) && !followed_by_call {
                bare.push_str(&text[cursor..start]);
                if !bare.is_empty() {
                    out.push(Segment {
                        text: std::mem::take(&mut bare),
                        protected: false,
                    });
                }
                out.push(Segment {
                    text: quote_identifier(column),
                    protected: true,
                });
                cursor = end;
                search_from = end;
            } else {
                search_from = start + text[start..].chars().next().map_or(1, |c| c.len_utf8());
            }
        }

        bare.push_str(&text[cursor..]);
        if !bare.is_empty() {
            out.push(Segment {
                text: bare,
                protected: false,
            });
        }
    }
    out
}

fn is_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => !is_word_char(c) && c != '"',
    }
}

// ============================================================
// STRUCTURAL VALIDATION
// ============================================================

fn next_significant(tokens: &[Token], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&i| !tokens[i].is_whitespace())
}

/// Validate a quoted candidate and return it with its LIMIT normalized.
/// The error is a human-readable rejection reason.
fn validate(sql: &str, table: &str, allowed_columns: &[String]) -> std::result::Result<String, String> {
    let mut tokens = tokenize(sql).map_err(|e| e.to_string())?;

    if tokens.iter().any(|t| t.kind == TokenKind::Comment) {
        return Err("SQL comments are not allowed".to_string());
    }

    // Trailing semicolons and whitespace are dropped; any other `;` is a
    // second statement
    while let Some(last) = tokens.last() {
        if last.is_whitespace() || last.is_punct(';') {
            tokens.pop();
        } else {
            break;
        }
    }
    let leading = tokens.iter().take_while(|t| t.is_whitespace()).count();
    tokens.drain(..leading);

    if tokens.iter().any(|t| t.is_punct(';')) {
        return Err("Multiple statements are not allowed".to_string());
    }

    unquote_table_after_from(&mut tokens, table);

    match tokens.first() {
        Some(t) if t.is_word("SELECT") => {}
        _ => return Err("Query must start with SELECT".to_string()),
    }

    for (idx, token) in tokens.iter().enumerate() {
        match &token.kind {
            TokenKind::Quoted(name) if name == "*" => {
                return Err("Quoted wildcard is not allowed".to_string());
            }
            TokenKind::Punct if token.is_punct('`') || token.is_punct('[') => {
                return Err(format!("Identifier quoting with {} is not allowed", token.text));
            }
            TokenKind::Word => {
                if let Some(k) = FORBIDDEN_KEYWORDS.iter().find(|k| token.is_word(k)) {
                    return Err(format!("Forbidden keyword: {}", k));
                }
                if let Some(k) = SET_OPERATORS.iter().find(|k| token.is_word(k)) {
                    return Err(format!("{} is not allowed", k));
                }
                // SQLite accepts `x IN some_table`, which reads a second table
                if token.is_word("IN")
                    && !next_significant(&tokens, idx + 1).is_some_and(|i| tokens[i].is_punct('('))
                {
                    return Err("IN must be followed by a parenthesized list".to_string());
                }
            }
            _ => {}
        }
    }

    let selects = tokens.iter().filter(|t| t.is_word("SELECT")).count();
    if selects > 1 {
        return Err("Subqueries are not allowed".to_string());
    }

    let limit_value_idx = check_limit(&tokens)?;
    check_from(&tokens, table)?;

    for token in &tokens {
        if let TokenKind::Quoted(name) = &token.kind {
            if !allowed_columns.iter().any(|c| c == name) {
                return Err(format!("Column \"{}\" is not in the allow-list", name));
            }
        }
    }

    match limit_value_idx {
        Some(idx) => {
            let limit = clamp_limit(parse_limit(&tokens[idx].text));
            tokens[idx] = Token::new(TokenKind::Number, limit.to_string());
        }
        None => {
            tokens.push(Token::new(TokenKind::Whitespace, " "));
            tokens.push(Token::new(TokenKind::Word, "LIMIT"));
            tokens.push(Token::new(TokenKind::Whitespace, " "));
            tokens.push(Token::new(TokenKind::Number, DEFAULT_LIMIT.to_string()));
        }
    }

    Ok(render(&tokens))
}

/// `FROM "table"` becomes `FROM table`
fn unquote_table_after_from(tokens: &mut Vec<Token>, table: &str) {
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].is_word("FROM") {
            if let Some(target) = next_significant(tokens, i + 1) {
                let is_quoted_table = matches!(
                    &tokens[target].kind,
                    TokenKind::Quoted(name) if name.eq_ignore_ascii_case(table)
                );
                if is_quoted_table {
                    tokens[target] = Token::new(TokenKind::Word, table);
                    // Keep the bare name from fusing with its neighbours
                    if tokens.get(target + 1).is_some_and(|t| !t.is_whitespace()) {
                        tokens.insert(target + 1, Token::new(TokenKind::Whitespace, " "));
                    }
                    if !tokens[target - 1].is_whitespace() {
                        tokens.insert(target, Token::new(TokenKind::Whitespace, " "));
                    }
                }
            }
        }
        i += 1;
    }
}

/// At most one LIMIT, followed by an unsigned integer and optionally
/// `OFFSET <integer>`. Returns the index of the limit value.
fn check_limit(tokens: &[Token]) -> std::result::Result<Option<usize>, String> {
    let positions: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_word("LIMIT"))
        .map(|(i, _)| i)
        .collect();

    let at = match positions.as_slice() {
        [] => return Ok(None),
        [one] => *one,
        _ => return Err("More than one LIMIT clause".to_string()),
    };

    let is_integer = |t: &Token| t.kind == TokenKind::Number && t.text.bytes().all(|b| b.is_ascii_digit());

    let value = next_significant(tokens, at + 1)
        .filter(|&i| is_integer(&tokens[i]))
        .ok_or_else(|| "LIMIT must be followed by an unsigned integer".to_string())?;

    match next_significant(tokens, value + 1) {
        None => Ok(Some(value)),
        Some(i) if tokens[i].is_word("OFFSET") => {
            let offset = next_significant(tokens, i + 1)
                .filter(|&j| is_integer(&tokens[j]))
                .ok_or_else(|| "OFFSET must be followed by an unsigned integer".to_string())?;
            if next_significant(tokens, offset + 1).is_some() {
                return Err("Unexpected tokens after OFFSET".to_string());
            }
            Ok(Some(value))
        }
        Some(i) if tokens[i].is_punct(',') => Err("LIMIT with an offset list is not allowed".to_string()),
        Some(_) => Err("Unexpected tokens after LIMIT".to_string()),
    }
}

/// Exactly one FROM, naming the table, and nothing that widens it
fn check_from(tokens: &[Token], table: &str) -> std::result::Result<(), String> {
    let positions: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_word("FROM"))
        .map(|(i, _)| i)
        .collect();

    let at = match positions.as_slice() {
        [one] => *one,
        [] => return Err("Query has no FROM clause".to_string()),
        _ => return Err("Query has more than one FROM clause".to_string()),
    };

    let target = next_significant(tokens, at + 1)
        .filter(|&i| tokens[i].is_word(table))
        .ok_or_else(|| format!("FROM must name table {}", table))?;

    if let Some(i) = next_significant(tokens, target + 1) {
        if tokens[i].is_punct(',') || tokens[i].is_punct('.') || tokens[i].is_punct('(') {
            return Err(format!("Unexpected '{}' after table name", tokens[i].text));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    const TABLE: &str = "dataset_7_data";

    #[test]
    fn test_forbidden_statement_falls_back() {
        let out = sanitize("DROP TABLE users", TABLE, &cols(&["age", "name"]));
        assert_eq!(out.sql, "SELECT \"age\", \"name\" FROM dataset_7_data LIMIT 30");
        assert!(out.used_fallback());
    }

    #[test]
    fn test_valid_query_is_quoted_and_passed_through() {
        let out = sanitize(
            "SELECT age, name FROM dataset_7_data LIMIT 10",
            TABLE,
            &cols(&["age", "name"]),
        );
        assert_eq!(out.sql, "SELECT \"age\", \"name\" FROM dataset_7_data LIMIT 10");
        assert!(!out.used_fallback());
    }

    #[test]
    fn test_limit_is_clamped() {
        let out = sanitize(
            "SELECT age FROM dataset_7_data LIMIT 500",
            TABLE,
            &cols(&["age", "name"]),
        );
        assert_eq!(out.sql, "SELECT \"age\" FROM dataset_7_data LIMIT 50");
    }

    #[test]
    fn test_longer_column_wins_collision() {
        let out = sanitize(
            "SELECT ageGroup FROM dataset_7_data",
            TABLE,
            &cols(&["age", "ageGroup"]),
        );
        assert_eq!(out.sql, "SELECT \"ageGroup\" FROM dataset_7_data LIMIT 30");
    }

    #[test]
    fn test_missing_limit_is_appended() {
        let out = sanitize(
            "select name from dataset_7_data where age > 3;",
            TABLE,
            &cols(&["age", "name"]),
        );
        assert_eq!(
            out.sql,
            "select \"name\" from dataset_7_data where \"age\" > 3 LIMIT 30"
        );
    }

    #[test]
    fn test_quoted_table_after_from_is_unquoted() {
        let out = sanitize(
            "SELECT \"age\" FROM \"dataset_7_data\" LIMIT 5",
            TABLE,
            &cols(&["age"]),
        );
        assert_eq!(out.sql, "SELECT \"age\" FROM dataset_7_data LIMIT 5");
    }

    #[test]
    fn test_literals_and_function_calls_are_not_quoted() {
        let out = sanitize(
            "SELECT count(*) FROM dataset_7_data WHERE name = 'name'",
            TABLE,
            &cols(&["count", "name"]),
        );
        assert_eq!(
            out.sql,
            "SELECT count(*) FROM dataset_7_data WHERE \"name\" = 'name' LIMIT 30"
        );
    }

    #[test]
    fn test_column_with_spaces_is_quoted() {
        let out = sanitize(
            "SELECT First Name FROM dataset_7_data",
            TABLE,
            &cols(&["First Name"]),
        );
        assert_eq!(out.sql, "SELECT \"First Name\" FROM dataset_7_data LIMIT 30");
    }

    #[test]
    fn test_rejections_fall_back() {
        let allowed = cols(&["age"]);
        let cases = [
            "SELECT age FROM dataset_7_data; DELETE FROM dataset_7_data",
            "SELECT age FROM dataset_7_data -- comment",
            "SELECT age FROM dataset_7_data UNION SELECT age FROM other",
            "SELECT age FROM dataset_7_data JOIN other ON 1 = 1",
            "SELECT age FROM other",
            "SELECT age FROM dataset_7_data, other",
            "SELECT age FROM dataset_7_data LIMIT 5, 10",
            "SELECT age FROM dataset_7_data LIMIT 5 LIMIT 6",
            "SELECT age FROM dataset_7_data LIMIT 10 + 1000",
            "SELECT \"secret\" FROM dataset_7_data",
            "SELECT \"*\" FROM dataset_7_data",
            "SELECT [age] FROM dataset_7_data",
            "SELECT age FROM dataset_7_data WHERE age IN (SELECT 1)",
            "SELECT age FROM dataset_7_data WHERE 'x' IN dataset_8_data",
            "SELECT age FROM dataset_7_data WHERE (age, 1) IN datasets_metadata",
            "SELECT age FROM dataset_7_data WHERE age IN pragma_table_info('dataset_8_data')",
            "SELECT age FROM dataset_7_data WHERE age NOT IN \"dataset_8_data\"",
            "WITH x AS (SELECT 1) SELECT age FROM dataset_7_data",
            "SELECT 'unterminated FROM dataset_7_data",
            "PRAGMA table_info(dataset_7_data)",
        ];
        for candidate in cases {
            let out = sanitize(candidate, TABLE, &allowed);
            assert!(out.used_fallback(), "accepted: {}", candidate);
            assert!(out.sql.starts_with("SELECT \"age\" FROM dataset_7_data LIMIT "));
        }
    }

    #[test]
    fn test_in_list_is_accepted() {
        let out = sanitize(
            "SELECT age FROM dataset_7_data WHERE age IN (1, 2) AND name NOT IN ('a')",
            TABLE,
            &cols(&["age", "name"]),
        );
        assert!(!out.used_fallback(), "{:?}", out.fallback_reason);
        assert_eq!(
            out.sql,
            "SELECT \"age\" FROM dataset_7_data WHERE \"age\" IN (1, 2) AND \"name\" NOT IN ('a') LIMIT 30"
        );
    }

    #[test]
    fn test_forbidden_word_inside_literal_is_allowed() {
        let out = sanitize(
            "SELECT age FROM dataset_7_data WHERE name = 'drop table'",
            TABLE,
            &cols(&["age", "name"]),
        );
        assert!(!out.used_fallback(), "{:?}", out.fallback_reason);
    }

    #[test]
    fn test_fallback_keeps_candidate_limit() {
        assert_eq!(
            fallback_query("DELETE FROM x limit 12", TABLE, &cols(&["a"])),
            "SELECT \"a\" FROM dataset_7_data LIMIT 12"
        );
        assert_eq!(
            fallback_query("LIMIT 99999999999999999999999", TABLE, &cols(&["a"])),
            "SELECT \"a\" FROM dataset_7_data LIMIT 50"
        );
        assert_eq!(
            fallback_query("nonsense", TABLE, &[]),
            "SELECT * FROM dataset_7_data LIMIT 30"
        );
    }

    // ------------------------------------------------------------
    // Output invariants, over arbitrary candidates
    // ------------------------------------------------------------

    fn assert_safe(sql: &str, table: &str, allowed: &[String]) -> std::result::Result<(), TestCaseError> {
        let tokens = tokenize(sql).map_err(|e| TestCaseError::fail(format!("{}: {}", e, sql)))?;
        let first = tokens.iter().find(|t| !t.is_whitespace());
        prop_assert!(first.is_some_and(|t| t.is_word("SELECT")), "no leading SELECT: {}", sql);

        let froms: Vec<usize> = (0..tokens.len()).filter(|&i| tokens[i].is_word("FROM")).collect();
        prop_assert_eq!(froms.len(), 1, "FROM count: {}", sql);
        let target = next_significant(&tokens, froms[0] + 1);
        prop_assert!(target.is_some_and(|i| tokens[i].is_word(table)), "wrong table: {}", sql);

        for t in &tokens {
            if let TokenKind::Quoted(name) = &t.kind {
                prop_assert!(allowed.contains(name), "unlisted {:?} in {}", name, sql);
            }
        }

        for i in (0..tokens.len()).filter(|&i| tokens[i].is_word("IN")) {
            let next = next_significant(&tokens, i + 1);
            prop_assert!(next.is_some_and(|j| tokens[j].is_punct('(')), "IN without a list: {}", sql);
        }

        let limits: Vec<usize> = (0..tokens.len()).filter(|&i| tokens[i].is_word("LIMIT")).collect();
        prop_assert_eq!(limits.len(), 1, "LIMIT count: {}", sql);
        let value = next_significant(&tokens, limits[0] + 1)
            .and_then(|i| tokens[i].text.parse::<u64>().ok());
        prop_assert!(value.is_some_and(|v| v <= MAX_LIMIT), "bad LIMIT: {}", sql);
        Ok(())
    }

    fn column_name() -> impl Strategy<Value = String> {
        "[a-zA-Z_][a-zA-Z0-9_ ]{0,10}[a-zA-Z0-9_]|[a-zA-Z]"
    }

    fn structured_candidate() -> impl Strategy<Value = String> {
        let keyword = prop::sample::select(vec![
            "SELECT", "FROM", "WHERE", "IN", "LIMIT", "OFFSET", "UNION", "DROP", ",", ";", "*", "(", ")",
            "--", "\"", "'",
        ])
        .prop_map(String::from);
        let fragment = prop_oneof![
            keyword,
            "[0-9]{1,25}",
            "[a-z_]{1,8}",
            "dataset_[0-9]{1,6}_data",
            "\"[a-z ]{0,6}\"",
        ];
        prop::collection::vec(fragment, 0..16).prop_map(|parts| parts.join(" "))
    }

    proptest! {
        #[test]
        fn prop_output_is_always_a_bounded_select(
            table in "dataset_[0-9]{1,6}_data",
            allowed in prop::collection::vec(column_name(), 0..5),
            candidate in prop_oneof![any::<String>(), structured_candidate()],
        ) {
            let out = sanitize(&candidate, &table, &allowed);
            assert_safe(&out.sql, &table, &allowed)?;
        }
    }
}
