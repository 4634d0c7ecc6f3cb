//! Semantic version parsing and ordering.
//!
//! Versions follow `MAJOR[.MINOR[.PATCH]][-PRERELEASE][+BUILD]`. Missing
//! minor/patch components default to zero, prerelease identifiers are
//! dot-separated runs of `[0-9A-Za-z-]`, and build metadata is parsed for
//! validity but never contributes to ordering. Ordering is element-wise:
//! numbers sort before strings at the same position, and a bare release
//! sorts after every prerelease of the same core (`1.0.0-rc < 1.0.0`).

use crate::{Error, Result, Session};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Versions longer than this are rejected; element offsets and lengths are
/// stored in 8 bits.
const MAX_INPUT_LEN: usize = 255;

/// Numeric components are capped at 31 bits.
const MAX_NUMERIC: u64 = 0x7FFF_FFFF;

/// The number of core (major/minor/patch) elements every version carries.
const CORE_ELEMENTS: usize = 3;

/// One element of a parsed version: a numeric component or a short
/// identifier addressed into the retained source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Number(u32),
    Text { offset: u8, len: u8 },
}

/// A parsed semantic version.
///
/// Holds the trimmed source text plus its element sequence. The first three
/// elements are always the numeric core; anything beyond them is the
/// prerelease. Comparison, equality, and ordering all follow [`compare`].
///
/// [`compare`]: SemanticVersion::compare
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    source: Box<str>,
    elements: Vec<Element>,
}

impl SemanticVersion {
    /// Parse a version string.
    ///
    /// # Errors
    /// Returns an error for empty or oversized input, malformed structure,
    /// leading zeros in core numbers, numeric components that exceed 31
    /// bits, or trailing characters.
    pub fn parse(text: &str) -> Result<Self> {
        if text.len() > MAX_INPUT_LEN {
            return Err(Error::version(text, "longer than 255 bytes"));
        }
        let trimmed = text.trim_matches(' ');
        if trimmed.is_empty() {
            return Err(Error::version(text, "empty version string"));
        }

        let mut parser = Parser::new(trimmed);
        let elements = parser.run()?;
        Ok(Self {
            source: trimmed.into(),
            elements,
        })
    }

    /// Parse a version string, reporting failures to the session console.
    #[must_use]
    pub fn create(session: &Session, text: &str) -> Option<Arc<Self>> {
        match Self::parse(text) {
            Ok(version) => Some(Arc::new(version)),
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

    /// Major component.
    #[must_use]
    pub fn major(&self) -> u32 {
        self.core(0)
    }

    /// Minor component (zero when omitted).
    #[must_use]
    pub fn minor(&self) -> u32 {
        self.core(1)
    }

    /// Patch component (zero when omitted).
    #[must_use]
    pub fn patch(&self) -> u32 {
        self.core(2)
    }

    /// Whether this version has no prerelease elements.
    ///
    /// Build metadata never contributes elements, so `1.2.3+build.7` is
    /// simple.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.elements.len() == CORE_ELEMENTS
    }

    /// Whether the numeric cores of two versions agree, ignoring any
    /// prerelease.
    #[must_use]
    pub fn version_match(&self, other: &Self) -> bool {
        self.elements[..CORE_ELEMENTS] == other.elements[..CORE_ELEMENTS]
    }

    /// Total-order comparison.
    ///
    /// Elements compare positionally: number/number numerically,
    /// string/string byte-wise, and a number always sorts before a string.
    /// When one version is a strict prefix of the other, the bare release
    /// wins over its own prereleases, while among prereleases of the same
    /// core the longer one is greater (`1.0.0-alpha < 1.0.0-alpha.1`).
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        let shared = self.elements.len().min(other.elements.len());
        for index in 0..shared {
            let ordering = match (self.elements[index], other.elements[index]) {
                (Element::Number(a), Element::Number(b)) => a.cmp(&b),
                (Element::Number(_), Element::Text { .. }) => Ordering::Less,
                (Element::Text { .. }, Element::Number(_)) => Ordering::Greater,
                (Element::Text { offset: ao, len: al }, Element::Text { offset: bo, len: bl }) => {
                    self.text(ao, al).cmp(other.text(bo, bl))
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        match self.elements.len().cmp(&other.elements.len()) {
            Ordering::Equal => Ordering::Equal,
            // The shorter version ran out: a bare core beats its own
            // prereleases, but among prereleases more parts sort higher.
            Ordering::Less => {
                if shared == CORE_ELEMENTS {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            Ordering::Greater => {
                if shared == CORE_ELEMENTS {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
        }
    }

    fn core(&self, index: usize) -> u32 {
        match self.elements[index] {
            Element::Number(value) => value,
            Element::Text { .. } => 0,
        }
    }

    fn text(&self, offset: u8, len: u8) -> &str {
        &self.source[offset as usize..offset as usize + len as usize]
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

/// Byte cursor over the trimmed source.
struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn run(&mut self) -> Result<Vec<Element>> {
        let mut elements = Vec::with_capacity(CORE_ELEMENTS + 1);

        elements.push(Element::Number(self.core_number()?));
        for _ in 0..2 {
            if self.eat(b'.') {
                elements.push(Element::Number(self.core_number()?));
            } else {
                break;
            }
        }
        while elements.len() < CORE_ELEMENTS {
            elements.push(Element::Number(0));
        }

        if self.eat(b'-') {
            loop {
                elements.push(self.prerelease_identifier()?);
                if !self.eat(b'.') {
                    break;
                }
            }
        }

        if self.eat(b'+') {
            loop {
                self.build_identifier()?;
                if !self.eat(b'.') {
                    break;
                }
            }
        }

        if self.pos != self.bytes.len() {
            return Err(self.fail("unexpected trailing characters"));
        }
        Ok(elements)
    }

    /// A core number: no leading zeros, at most 31 bits.
    fn core_number(&mut self) -> Result<u32> {
        let start = self.pos;
        let digits = self.take_while(|b| b.is_ascii_digit());
        if digits.is_empty() {
            return Err(self.fail("expected a number"));
        }
        if digits.len() > 1 && digits[0] == b'0' {
            return Err(self.fail("leading zeros are not allowed"));
        }
        self.number_value(start, digits)
    }

    /// One dot-separated prerelease identifier.
    ///
    /// A digits-only identifier without a leading zero is a numeric
    /// element; with a leading zero it is kept as a string ("01" sorts as
    /// the string "01", not the number 1). A numeric identifier may not
    /// run straight into letters.
    fn prerelease_identifier(&mut self) -> Result<Element> {
        let start = self.pos;
        if self
            .peek()
            .is_some_and(|b| b.is_ascii_digit() && !self.leads_with_zero())
        {
            let digits = self.take_while(|b| b.is_ascii_digit());
            if self.peek().is_some_and(is_identifier_byte) {
                return Err(self.fail("unexpected trailing characters"));
            }
            let value = self.number_value(start, digits)?;
            return Ok(Element::Number(value));
        }

        let run = self.take_while(is_identifier_byte);
        if run.is_empty() {
            return Err(self.fail("empty prerelease identifier"));
        }
        Ok(Element::Text {
            offset: start as u8,
            len: run.len() as u8,
        })
    }

    /// One dot-separated build identifier; validated and discarded.
    fn build_identifier(&mut self) -> Result<()> {
        let run = self.take_while(is_identifier_byte);
        if run.is_empty() {
            return Err(self.fail("empty build identifier"));
        }
        Ok(())
    }

    fn number_value(&self, start: usize, digits: &[u8]) -> Result<u32> {
        let mut value: u64 = 0;
        for &digit in digits {
            value = value * 10 + u64::from(digit - b'0');
            if value > MAX_NUMERIC {
                return Err(Error::version(
                    self.input,
                    format!(
                        "numeric value too large at offset {start}: {}",
                        String::from_utf8_lossy(digits)
                    ),
                ));
            }
        }
        Ok(value as u32)
    }

    fn leads_with_zero(&self) -> bool {
        self.bytes[self.pos] == b'0' && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, predicate: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(&predicate) {
            self.pos += 1;
        }
        &self.bytes[start..self.pos]
    }

    fn fail(&self, reason: &str) -> Error {
        Error::version(self.input, format!("{reason} at offset {}", self.pos))
    }
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-'
}
