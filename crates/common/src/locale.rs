//! Locale-aware number presentation and input parsing
//!
//! Canonical values are plain `f64`/`i64`; only what the user sees and types
//! depends on the locale. `en` renders `10000.55` as `10,000.55`, `de` as
//! `10.000,55`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{Error, Result};

/// A language tag with optional region (e.g. `en`, `de_DE`, `pt-BR`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locale {
    /// ISO 639-1 language code, lowercase
    pub language: String,
    /// ISO 3166-1 country code, uppercase
    pub country: Option<String>,
}

impl Locale {
    /// Parse `"de_DE"`, `"de-DE"` or `"de"`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidLocale("empty locale identifier".to_string()));
        }

        let mut parts = s.split(['_', '-']);
        let language = parts.next().unwrap_or_default().to_ascii_lowercase();
        if language.len() < 2
            || language.len() > 3
            || !language.bytes().all(|b| b.is_ascii_alphabetic())
        {
            return Err(Error::InvalidLocale(format!("invalid language code: '{}'", language)));
        }

        let country = parts
            .next()
            .filter(|c| !c.is_empty())
            .map(|c| c.to_ascii_uppercase());

        Ok(Self { language, country })
    }

    pub fn english() -> Self {
        Self {
            language: "en".to_string(),
            country: None,
        }
    }

    /// Canonical string form (e.g. `"de_DE"`)
    pub fn canonical(&self) -> String {
        match &self.country {
            Some(c) => format!("{}_{}", self.language, c),
            None => self.language.clone(),
        }
    }

    /// Pick the first usable tag of an `Accept-Language` header
    pub fn from_accept_language(header: &str) -> Option<Self> {
        header
            .split(',')
            .map(|tag| tag.split(';').next().unwrap_or_default().trim())
            .filter(|tag| !tag.is_empty() && *tag != "*")
            .find_map(|tag| Self::parse(tag).ok())
    }

    pub fn number_symbols(&self) -> NumberSymbols {
        NumberSymbols::for_language(&self.language)
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::english()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromStr for Locale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Locale {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Locale {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Decimal and digit-group separators of a locale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberSymbols {
    pub decimal: char,
    pub group: char,
}

impl NumberSymbols {
    pub fn for_language(language: &str) -> Self {
        match language {
            "de" | "es" | "it" | "nl" | "pt" | "tr" | "id" | "da" => Self {
                decimal: ',',
                group: '.',
            },
            "fr" | "ru" | "pl" | "cs" | "sv" | "nb" | "fi" | "uk" => Self {
                decimal: ',',
                group: '\u{a0}',
            },
            _ => Self {
                decimal: '.',
                group: ',',
            },
        }
    }
}

/// Why a numeric input was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberParseError {
    Empty,
    NotANumber,
    NotAnInteger,
}

/// Render a float for display, digit groups included
pub fn format_float(value: f64, locale: &Locale) -> String {
    render_float(value, locale.number_symbols(), true)
}

/// Render a float for pre-filling an editor: locale decimal separator, no grouping
pub fn format_float_input(value: f64, locale: &Locale) -> String {
    render_float(value, locale.number_symbols(), false)
}

/// Integers are shown as plain digits regardless of locale
pub fn format_integer(value: i64) -> String {
    value.to_string()
}

fn render_float(value: f64, symbols: NumberSymbols, grouped: bool) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    // Display for f64 is the shortest representation that round-trips, never exponential.
    let plain = value.to_string();
    let (negative, unsigned) = match plain.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, plain.as_str()),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut out = String::with_capacity(plain.len() + int_part.len() / 3);
    if negative {
        out.push('-');
    }
    if grouped {
        push_grouped(&mut out, int_part, symbols.group);
    } else {
        out.push_str(int_part);
    }
    if let Some(frac) = frac_part {
        out.push(symbols.decimal);
        out.push_str(frac);
    }
    out
}

fn push_grouped(out: &mut String, digits: &str, group: char) {
    let len = digits.len();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(group);
        }
        out.push(ch);
    }
}

/// Parse user input typed in `locale` into a canonical float
pub fn parse_float(input: &str, locale: &Locale) -> std::result::Result<f64, NumberParseError> {
    let symbols = locale.number_symbols();
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(NumberParseError::Empty);
    }

    let (sign, unsigned) = split_sign(trimmed);
    let (int_part, frac_part) = match unsigned.split_once(symbols.decimal) {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let int_digits = strip_groups(int_part, symbols.group).ok_or(NumberParseError::NotANumber)?;
    let frac_digits = match frac_part {
        Some(f) if !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()) => Some(f),
        Some(_) => return Err(NumberParseError::NotANumber),
        None => None,
    };
    if int_digits.is_empty() && frac_digits.is_none() {
        return Err(NumberParseError::NotANumber);
    }

    let mut canonical = String::with_capacity(trimmed.len() + 1);
    canonical.push_str(sign);
    canonical.push_str(if int_digits.is_empty() { "0" } else { &int_digits });
    if let Some(f) = frac_digits {
        canonical.push('.');
        canonical.push_str(f);
    }

    let value = canonical
        .parse::<f64>()
        .map_err(|_| NumberParseError::NotANumber)?;
    if !value.is_finite() {
        return Err(NumberParseError::NotANumber);
    }
    debug!(input = %input, locale = %locale, value, "parsed float input");
    Ok(value)
}

/// Parse an integer: optional sign and ASCII digits only
pub fn parse_integer(input: &str) -> std::result::Result<i64, NumberParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(NumberParseError::Empty);
    }
    let (_, digits) = split_sign(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NumberParseError::NotAnInteger);
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| NumberParseError::NotAnInteger)
}

fn split_sign(s: &str) -> (&'static str, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        ("-", rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        ("", rest)
    } else {
        ("", s)
    }
}

/// Remove group separators from an integer part, only accepting well-formed
/// groups of three. Returns `None` on stray characters or misplaced separators.
fn strip_groups(int_part: &str, group: char) -> Option<String> {
    if !int_part.contains(group) {
        return int_part
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| int_part.to_string());
    }

    let mut groups = int_part.split(group);
    let head = groups.next()?;
    if head.is_empty() || head.len() > 3 || !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut digits = head.to_string();
    for g in groups {
        if g.len() != 3 || !g.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.push_str(g);
    }
    Some(digits)
}
