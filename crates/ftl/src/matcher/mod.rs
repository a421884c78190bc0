// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Content matchers.
//!
//! A matcher is compiled from a match string such as
//! `{"status":"active","retries":false}` and tested against messages:
//!
//! | Value      | Holds when                                         |
//! |------------|----------------------------------------------------|
//! | `true`     | the field is set (any type)                        |
//! | `false`    | the field is not set                               |
//! | integer    | the field is a long with exactly that value        |
//! | `"string"` | the field is a string with exactly that value      |
//!
//! All constraints must hold for a message to match.

mod parser;

use std::fmt;

use crate::error::Error;
use crate::message::{FieldValue, Message};

/// Test applied to one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchTest {
    Present,
    Absent,
    Long(i64),
    String(String),
}

/// One `"field": value` pair of a match string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub field: String,
    pub test: MatchTest,
}

impl Constraint {
    fn holds(&self, msg: &Message) -> bool {
        let value = msg.get(self.field.as_str()).ok();
        match (&self.test, value) {
            (MatchTest::Present, v) => v.is_some(),
            (MatchTest::Absent, v) => v.is_none(),
            (MatchTest::Long(want), Some(FieldValue::Long(got))) => want == got,
            (MatchTest::String(want), Some(FieldValue::String(got))) => want == got,
            _ => false,
        }
    }
}

/// Errors raised while compiling a match string.
#[derive(Debug, Clone, PartialEq)]
pub enum MatcherError {
    /// Match string is empty or blank.
    Empty,
    /// Malformed match string.
    Syntax(String),
    /// Same field named twice.
    DuplicateField(String),
    /// String literal exceeds the matcher limit.
    StringTooLong { field: String, len: usize },
}

impl fmt::Display for MatcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatcherError::Empty => write!(f, "Empty match string"),
            MatcherError::Syntax(msg) => write!(f, "Match string syntax error: {}", msg),
            MatcherError::DuplicateField(name) => {
                write!(f, "Field '{}' appears more than once", name)
            }
            MatcherError::StringTooLong { field, len } => write!(
                f,
                "String value for '{}' is {} bytes (limit {})",
                field,
                len,
                crate::config::MATCHER_STRING_MAX
            ),
        }
    }
}

impl std::error::Error for MatcherError {}

impl From<MatcherError> for Error {
    fn from(e: MatcherError) -> Self {
        Error::InvalidArg(e.to_string())
    }
}

/// Compiled, immutable match predicate.
///
/// Cloning is cheap enough to hand one copy to every subscriber; dropping a
/// matcher never affects subscribers created from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentMatcher {
    source: String,
    constraints: Vec<Constraint>,
}

impl ContentMatcher {
    /// Compile `match_string`. Any syntax problem is `InvalidArg`.
    pub fn new(match_string: &str) -> crate::Result<Self> {
        let constraints = parser::parse_match_string(match_string)?;
        Ok(Self {
            source: match_string.to_string(),
            constraints,
        })
    }

    pub fn match_string(&self) -> &str {
        &self.source
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn matches(&self, msg: &Message) -> bool {
        self.constraints.iter().all(|c| c.holds(msg))
    }
}

impl fmt::Display for ContentMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
