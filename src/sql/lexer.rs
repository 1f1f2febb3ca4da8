//! # Query Lexer
//!
//! Whitespace-insensitive tokenization of query text. Keywords are not
//! distinguished here - `SELECT` and a table named `select` are both
//! `Ident` tokens, and the parser matches keywords case-insensitively.
//! Literals are bare integers (with optional sign) or single-quoted strings
//! without escapes.

use eyre::{bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    Number(i64),
    Str(String),
    Star,
    Comma,
    Dot,
    LParen,
    RParen,
    Eq,
    Gt,
    Semi,
}

impl Token {
    /// True when this token is the given keyword, matched case-insensitively.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '>' => {
                chars.next();
                tokens.push(Token::Gt);
            }
            ';' => {
                chars.next();
                tokens.push(Token::Semi);
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => text.push(c),
                        None => bail!("unterminated string literal"),
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || c == '-' => {
                chars.next();
                let mut text = String::from(c);
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = text
                    .parse::<i64>()
                    .map_err(|_| eyre::eyre!("malformed number literal '{text}'"))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(text));
            }
            other => bail!("unexpected character '{other}' in query text"),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizes_a_term() {
        let tokens = tokenize("SELECT a.c1 FROM a WHERE a.c1 > 3;").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("SELECT".to_string()),
                Token::Ident("a".to_string()),
                Token::Dot,
                Token::Ident("c1".to_string()),
                Token::Ident("FROM".to_string()),
                Token::Ident("a".to_string()),
                Token::Ident("WHERE".to_string()),
                Token::Ident("a".to_string()),
                Token::Dot,
                Token::Ident("c1".to_string()),
                Token::Gt,
                Token::Number(3),
                Token::Semi,
            ]
        );
    }

    #[test]
    fn test_string_and_negative_literals() {
        let tokens = tokenize("'hi there' -42").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Str("hi there".to_string()), Token::Number(-42)]
        );
        assert!(tokenize("'open").is_err());
    }

    #[test]
    fn test_keyword_matching_is_case_insensitive() {
        let tokens = tokenize("select").unwrap();
        assert!(tokens[0].is_keyword("SELECT"));
        assert!(!tokens[0].is_keyword("FROM"));
    }

    #[test]
    fn test_rejects_unsupported_characters() {
        assert!(tokenize("a < b").is_err());
    }
}
