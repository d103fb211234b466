//! Minimal SQL tokenizer
//!
//! Splits SQL text into words, numbers, quoted identifiers, string literals,
//! comments, whitespace and single-character punctuation. Every token keeps
//! its raw text, so concatenating the tokens reproduces the input exactly.
//! This is not a parser; it only knows enough to tell quoted regions apart
//! from bare text.

use crate::domain::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare identifier or keyword
    Word,
    /// Unsigned numeric literal, possibly malformed (`10abc`)
    Number,
    /// Double-quoted identifier; holds the unescaped name
    Quoted(String),
    /// Single-quoted string literal
    Literal,
    /// `-- ...` or `/* ... */`
    Comment,
    Whitespace,
    Punct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == TokenKind::Punct && self.text.starts_with(c)
    }

    pub fn is_whitespace(&self) -> bool {
        self.kind == TokenKind::Whitespace
    }
}

/// Identifier character; like SQLite, any non-ASCII character counts
pub fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii()
}

/// Tokenize `sql`; unterminated quotes or block comments are errors
pub fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let byte_at = |i: usize| chars.get(i).map(|(b, _)| *b).unwrap_or(sql.len());
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i].1;
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let start = i;

        let kind = if c == '"' || c == '\'' {
            let (end, content) = scan_quoted(&chars, i, c).ok_or_else(|| {
                AppError::ValidationError(format!(
                    "Unterminated {} starting at byte {}",
                    if c == '"' { "quoted identifier" } else { "string literal" },
                    byte_at(i)
                ))
            })?;
            i = end;
            if c == '"' {
                TokenKind::Quoted(content)
            } else {
                TokenKind::Literal
            }
        } else if c == '-' && next == Some('-') {
            while i < chars.len() && chars[i].1 != '\n' {
                i += 1;
            }
            TokenKind::Comment
        } else if c == '/' && next == Some('*') {
            i += 2;
            loop {
                if i + 1 >= chars.len() {
                    return Err(AppError::ValidationError(format!(
                        "Unterminated block comment starting at byte {}",
                        byte_at(start)
                    )));
                }
                if chars[i].1 == '*' && chars[i + 1].1 == '/' {
                    i += 2;
                    break;
                }
                i += 1;
            }
            TokenKind::Comment
        } else if c.is_ascii_whitespace() {
            while i < chars.len() && chars[i].1.is_ascii_whitespace() {
                i += 1;
            }
            TokenKind::Whitespace
        } else if c.is_ascii_digit() {
            while i < chars.len() && (is_word_char(chars[i].1) || chars[i].1 == '.') {
                i += 1;
            }
            TokenKind::Number
        } else if is_word_char(c) {
            while i < chars.len() && is_word_char(chars[i].1) {
                i += 1;
            }
            TokenKind::Word
        } else {
            i += 1;
            TokenKind::Punct
        };

        tokens.push(Token::new(kind, &sql[byte_at(start)..byte_at(i)]));
    }

    Ok(tokens)
}

/// Scan a quoted run starting at `open`; a doubled quote is an escape.
/// Returns the index just past the closing quote and the unescaped content.
fn scan_quoted(chars: &[(usize, char)], open: usize, quote: char) -> Option<(usize, String)> {
    let mut content = String::new();
    let mut i = open + 1;
    while i < chars.len() {
        let c = chars[i].1;
        if c == quote {
            if chars.get(i + 1).map(|(_, c)| *c) == Some(quote) {
                content.push(quote);
                i += 2;
                continue;
            }
            return Some((i + 1, content));
        }
        content.push(c);
        i += 1;
    }
    None
}

/// Concatenate raw token text
pub fn render(tokens: &[Token]) -> String {
    tokens.iter().map(|t| t.text.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_round_trips_raw_text() {
        let sql = "SELECT \"a\"\"b\", 'it''s' FROM t -- tail\nLIMIT 5;";
        let tokens = tokenize(sql).unwrap();
        assert_eq!(render(&tokens), sql);
    }

    #[test]
    fn test_quoted_identifier_is_unescaped() {
        let tokens = tokenize("\"say \"\"hi\"\"\"").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Quoted("say \"hi\"".to_string()));
    }

    #[test]
    fn test_keywords_inside_quotes_are_not_words() {
        let tokens = tokenize("SELECT 'drop table x', \"DELETE\"").unwrap();
        let words: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Word)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(words, vec!["SELECT"]);
    }

    #[test]
    fn test_comments_and_numbers() {
        assert_eq!(
            kinds("1 /* x */ 10abc"),
            vec![
                TokenKind::Number,
                TokenKind::Whitespace,
                TokenKind::Comment,
                TokenKind::Whitespace,
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn test_unterminated_input_is_rejected() {
        assert!(tokenize("SELECT \"abc").is_err());
        assert!(tokenize("SELECT 'abc").is_err());
        assert!(tokenize("SELECT 1 /* open").is_err());
    }

    #[test]
    fn test_non_ascii_space_is_part_of_a_word() {
        let tokens = tokenize("SELECT\u{a0}a").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Word);
    }

    #[test]
    fn test_multibyte_text_keeps_byte_boundaries() {
        let sql = "SELECT \"größe\", café FROM t";
        let tokens = tokenize(sql).unwrap();
        assert_eq!(render(&tokens), sql);
        assert!(tokens.iter().any(|t| t.is_word("café")));
    }
}
