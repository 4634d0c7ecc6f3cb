//! Semantic pattern matching.
//!
//! A pattern is a boolean OR of AND-groups of comparison terms, written as
//! `[op]version` tokens separated by spaces, with groups separated by `||`:
//! `">=1.2 <2.0 || 3.0"`. The operator defaults to `=` when omitted.

use crate::{Error, Result, SemanticVersion, Session};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Comparison operator of one pattern term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternOp {
    /// Exact match (the default).
    Equals,
    /// Strictly greater.
    GreaterThan,
    /// Greater or equal.
    GreaterOrEquals,
    /// Strictly less.
    LessThan,
    /// Less or equal.
    LessOrEquals,
}

impl PatternOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::GreaterThan => ">",
            Self::GreaterOrEquals => ">=",
            Self::LessThan => "<",
            Self::LessOrEquals => "<=",
        }
    }
}

impl fmt::Display for PatternOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `[op]version` comparison.
#[derive(Debug, Clone)]
struct Term {
    op: PatternOp,
    operand: SemanticVersion,
}

impl Term {
    fn matches(&self, version: &SemanticVersion) -> bool {
        let ordering = version.compare(&self.operand);
        match self.op {
            PatternOp::Equals => ordering == Ordering::Equal,
            PatternOp::GreaterThan => {
                self.comparable(version) && ordering == Ordering::Greater
            }
            PatternOp::GreaterOrEquals => {
                self.comparable(version) && ordering != Ordering::Less
            }
            PatternOp::LessThan => self.comparable(version) && ordering == Ordering::Less,
            PatternOp::LessOrEquals => {
                self.comparable(version) && ordering != Ordering::Greater
            }
        }
    }

    /// Range operators only treat a prerelease as comparable when the
    /// operand pins a prerelease of the same core. A plain version is
    /// always comparable.
    fn comparable(&self, version: &SemanticVersion) -> bool {
        version.is_simple()
            || (!self.operand.is_simple() && version.version_match(&self.operand))
    }
}

/// A parsed version pattern: OR-separated groups of ANDed comparisons.
#[derive(Debug, Clone)]
pub struct SemanticPattern {
    source: Box<str>,
    clauses: Vec<Vec<Term>>,
}

impl SemanticPattern {
    /// Parse a pattern string.
    ///
    /// # Errors
    /// Returns an error when the pattern is empty, a group is empty, or any
    /// term's operand is not a valid semantic version.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim_matches(' ');
        if trimmed.is_empty() {
            return Err(Error::pattern(text, "empty pattern"));
        }

        let mut clauses = Vec::new();
        for group in trimmed.split("||") {
            let mut terms = Vec::new();
            for token in group.split(' ').filter(|token| !token.is_empty()) {
                let (op, operand) = split_operator(token);
                let operand = SemanticVersion::parse(operand)
                    .map_err(|error| Error::pattern(trimmed, error.to_string()))?;
                terms.push(Term { op, operand });
            }
            if terms.is_empty() {
                return Err(Error::pattern(trimmed, "empty pattern group"));
            }
            clauses.push(terms);
        }

        Ok(Self {
            source: trimmed.into(),
            clauses,
        })
    }

    /// Parse a pattern string, reporting failures to the session console.
    #[must_use]
    pub fn create(session: &Session, text: &str) -> Option<Arc<Self>> {
        match Self::parse(text) {
            Ok(pattern) => Some(Arc::new(pattern)),
            Err(error) => {
                session.console(error.to_string());
                None
            }
        }
    }

    /// The trimmed source text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern accepts the given version.
    ///
    /// `None` never matches. A group matches when every term in it does;
    /// the pattern matches when any group does.
    #[must_use]
    pub fn matches(&self, version: Option<&SemanticVersion>) -> bool {
        let Some(version) = version else {
            return false;
        };
        self.clauses
            .iter()
            .any(|clause| clause.iter().all(|term| term.matches(version)))
    }
}

impl fmt::Display for SemanticPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split a leading comparison operator off a term token.
fn split_operator(token: &str) -> (PatternOp, &str) {
    if let Some(rest) = token.strip_prefix(">=") {
        (PatternOp::GreaterOrEquals, rest)
    } else if let Some(rest) = token.strip_prefix("<=") {
        (PatternOp::LessOrEquals, rest)
    } else if let Some(rest) = token.strip_prefix('>') {
        (PatternOp::GreaterThan, rest)
    } else if let Some(rest) = token.strip_prefix('<') {
        (PatternOp::LessThan, rest)
    } else if let Some(rest) = token.strip_prefix('=') {
        (PatternOp::Equals, rest)
    } else {
        (PatternOp::Equals, token)
    }
}
