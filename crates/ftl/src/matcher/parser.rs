// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Match string parser.
//!
//! Grammar:
//!
//! ```text
//! matcher := '{' [ pair ( ',' pair )* ] '}'
//! pair    := string ':' value
//! value   := integer | string | 'true' | 'false'
//! ```

use std::collections::HashSet;

use super::{Constraint, MatchTest, MatcherError};
use crate::config::MATCHER_STRING_MAX;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LBrace,
    RBrace,
    Colon,
    Comma,
    String(String),
    Integer(i64),
    True,
    False,
    Eof,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.next_char();
            } else {
                break;
            }
        }
    }

    fn read_hex4(&mut self) -> Result<u32, MatcherError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .next_char()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| MatcherError::Syntax("bad \\u escape".into()))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn read_escape(&mut self) -> Result<char, MatcherError> {
        let esc = self
            .next_char()
            .ok_or_else(|| MatcherError::Syntax("unterminated string".into()))?;
        Ok(match esc {
            '"' => '"',
            '\\' => '\\',
            '/' => '/',
            'b' => '\u{0008}',
            'f' => '\u{000C}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'u' => {
                let high = self.read_hex4()?;
                let code = if (0xD800..0xDC00).contains(&high) {
                    if self.next_char() != Some('\\') || self.next_char() != Some('u') {
                        return Err(MatcherError::Syntax("unpaired surrogate".into()));
                    }
                    let low = self.read_hex4()?;
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err(MatcherError::Syntax("unpaired surrogate".into()));
                    }
                    0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
                } else {
                    high
                };
                char::from_u32(code)
                    .ok_or_else(|| MatcherError::Syntax("invalid \\u escape".into()))?
            }
            other => {
                return Err(MatcherError::Syntax(format!(
                    "unknown escape '\\{}'",
                    other
                )))
            }
        })
    }

    fn read_string(&mut self) -> Result<String, MatcherError> {
        self.next_char(); // opening quote
        let mut out = String::new();
        loop {
            match self.next_char() {
                Some('"') => return Ok(out),
                Some('\\') => out.push(self.read_escape()?),
                Some(ch) => out.push(ch),
                None => return Err(MatcherError::Syntax("unterminated string".into())),
            }
        }
    }

    fn read_integer(&mut self) -> Result<Token, MatcherError> {
        let start = self.pos;
        if matches!(self.peek_char(), Some('-' | '+')) {
            self.next_char();
        }
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                self.next_char();
            } else {
                break;
            }
        }
        if matches!(self.peek_char(), Some('.' | 'e' | 'E')) {
            return Err(MatcherError::Syntax(
                "only integer literals can be matched".into(),
            ));
        }
        let text = &self.input[start..self.pos];
        text.parse()
            .map(Token::Integer)
            .map_err(|_| MatcherError::Syntax(format!("bad integer '{}'", text)))
    }

    fn read_word(&mut self) -> Result<Token, MatcherError> {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.next_char();
            } else {
                break;
            }
        }
        match &self.input[start..self.pos] {
            "true" => Ok(Token::True),
            "false" => Ok(Token::False),
            other => Err(MatcherError::Syntax(format!("unexpected token '{}'", other))),
        }
    }

    fn next_token(&mut self) -> Result<Token, MatcherError> {
        self.skip_whitespace();

        let ch = match self.peek_char() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        let single = match ch {
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            ':' => Some(Token::Colon),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(tok) = single {
            self.next_char();
            return Ok(tok);
        }

        if ch == '"' {
            return self.read_string().map(Token::String);
        }
        if ch.is_ascii_digit() || ch == '-' || ch == '+' {
            return self.read_integer();
        }
        if ch.is_alphabetic() {
            return self.read_word();
        }

        Err(MatcherError::Syntax(format!(
            "unexpected character '{}'",
            ch
        )))
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, MatcherError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> Result<(), MatcherError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, tok: Token, what: &str) -> Result<(), MatcherError> {
        if self.current != tok {
            return Err(MatcherError::Syntax(format!(
                "expected {}, got {:?}",
                what, self.current
            )));
        }
        self.advance()
    }

    fn parse_matcher(&mut self) -> Result<Vec<Constraint>, MatcherError> {
        self.expect(Token::LBrace, "'{'")?;
        let mut constraints = Vec::new();
        let mut seen = HashSet::new();

        if self.current == Token::RBrace {
            self.advance()?;
        } else {
            loop {
                let constraint = self.parse_pair()?;
                if !seen.insert(constraint.field.clone()) {
                    return Err(MatcherError::DuplicateField(constraint.field));
                }
                constraints.push(constraint);

                match self.current {
                    Token::Comma => self.advance()?,
                    Token::RBrace => {
                        self.advance()?;
                        break;
                    }
                    _ => {
                        return Err(MatcherError::Syntax(format!(
                            "expected ',' or '}}', got {:?}",
                            self.current
                        )))
                    }
                }
            }
        }

        if self.current != Token::Eof {
            return Err(MatcherError::Syntax(format!(
                "trailing input after '}}': {:?}",
                self.current
            )));
        }
        Ok(constraints)
    }

    fn parse_pair(&mut self) -> Result<Constraint, MatcherError> {
        let field = match &self.current {
            Token::String(name) if !name.is_empty() => name.clone(),
            Token::String(_) => return Err(MatcherError::Syntax("empty field name".into())),
            other => {
                return Err(MatcherError::Syntax(format!(
                    "expected quoted field name, got {:?}",
                    other
                )))
            }
        };
        self.advance()?;
        self.expect(Token::Colon, "':'")?;

        let test = match &self.current {
            Token::True => MatchTest::Present,
            Token::False => MatchTest::Absent,
            Token::Integer(v) => MatchTest::Long(*v),
            Token::String(s) if s.len() > MATCHER_STRING_MAX => {
                return Err(MatcherError::StringTooLong {
                    field,
                    len: s.len(),
                })
            }
            Token::String(s) => MatchTest::String(s.clone()),
            other => {
                return Err(MatcherError::Syntax(format!(
                    "expected value for '{}', got {:?}",
                    field, other
                )))
            }
        };
        self.advance()?;
        Ok(Constraint { field, test })
    }
}

/// Parse a match string into its constraints.
pub(super) fn parse_match_string(input: &str) -> Result<Vec<Constraint>, MatcherError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MatcherError::Empty);
    }
    Parser::new(trimmed)?.parse_matcher()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_value_kinds() {
        let cs = parse_match_string(r#"{"a":true, "b" : false, "c":-12, "d":"x y"}"#).unwrap();
        assert_eq!(
            cs,
            vec![
                Constraint { field: "a".into(), test: MatchTest::Present },
                Constraint { field: "b".into(), test: MatchTest::Absent },
                Constraint { field: "c".into(), test: MatchTest::Long(-12) },
                Constraint { field: "d".into(), test: MatchTest::String("x y".into()) },
            ]
        );
    }

    #[test]
    fn test_parse_escapes() {
        let cs = parse_match_string(r#"{"q\"k":"tab\there é 😀"}"#).unwrap();
        assert_eq!(cs[0].field, "q\"k");
        assert_eq!(cs[0].test, MatchTest::String("tab\there é 😀".into()));
    }

    #[test]
    fn test_empty_braces() {
        assert!(parse_match_string("{ }").unwrap().is_empty());
    }

    #[test]
    fn test_rejections() {
        let bad = [
            "",
            "   ",
            "{",
            "}",
            r#"{"a":1"#,
            r#"{"a" 1}"#,
            r#"{a:1}"#,
            r#"{"a":1,}"#,
            r#"{"a":1.5}"#,
            r#"{"a":yes}"#,
            r#"{"a":null}"#,
            r#"{"":1}"#,
            r#"{"a":"unterminated}"#,
            r#"{"a":"\q"}"#,
            r#"{"a":1} extra"#,
            r#"{"a":99999999999999999999}"#,
            r#"{"a":"\ud83d"}"#,
        ];
        for input in bad {
            assert!(parse_match_string(input).is_err(), "accepted {:?}", input);
        }
    }

    #[test]
    fn test_duplicates_and_long_strings() {
        assert!(matches!(
            parse_match_string(r#"{"a":1,"a":true}"#),
            Err(MatcherError::DuplicateField(f)) if f == "a"
        ));

        let max = "v".repeat(MATCHER_STRING_MAX);
        assert!(parse_match_string(&format!(r#"{{"a":"{}"}}"#, max)).is_ok());
        let over = "v".repeat(MATCHER_STRING_MAX + 1);
        assert!(matches!(
            parse_match_string(&format!(r#"{{"a":"{}"}}"#, over)),
            Err(MatcherError::StringTooLong { len: 257, .. })
        ));
    }

    #[test]
    fn test_integer_bounds() {
        let cs = parse_match_string(&format!(r#"{{"min":{},"max":{}}}"#, i64::MIN, i64::MAX)).unwrap();
        assert_eq!(cs[0].test, MatchTest::Long(i64::MIN));
        assert_eq!(cs[1].test, MatchTest::Long(i64::MAX));
    }
}
