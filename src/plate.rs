// 🔖 Plate Validator - format rules + canonical keys
// Accepts the two current and two legacy national plate shapes

use crate::error::{AccessError, AccessResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ============================================================================
// PLATE FORMATS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlateFormat {
    /// Four letters + two digits, hyphenated: BB-BB-22
    Current,
    /// Four letters + two digits: BBBB22
    CurrentCompact,
    /// Two letters + four digits, hyphenated: AB-12-34
    Legacy,
    /// Two letters + four digits: AB1234
    LegacyCompact,
}

static PATTERNS: Lazy<Vec<(PlateFormat, Regex)>> = Lazy::new(|| {
    [
        // ASCII digits only; `\d` is Unicode-aware
        (PlateFormat::Current, r"^[A-Z]{2}-[A-Z]{2}-[0-9]{2}$"),
        (PlateFormat::CurrentCompact, r"^[A-Z]{4}[0-9]{2}$"),
        (PlateFormat::Legacy, r"^[A-Z]{2}-[0-9]{2}-[0-9]{2}$"),
        (PlateFormat::LegacyCompact, r"^[A-Z]{2}[0-9]{4}$"),
    ]
    .into_iter()
    .map(|(format, pattern)| (format, Regex::new(pattern).expect("static plate pattern")))
    .collect()
});

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Upper-case and drop whitespace. Hyphens are kept so the format can still be
/// told apart.
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Storage and lookup key: upper case, no whitespace, no hyphens.
///
/// Applied to every plate before it touches the database, so "bb-bb-22",
/// "BB BB 22" and "BBBB22" all address the same record.
pub fn canonicalize(input: &str) -> String {
    normalize(input).replace('-', "")
}

/// Classify a free-text plate, `None` when no accepted shape matches
pub fn classify(input: &str) -> Option<PlateFormat> {
    let normalized = normalize(input);
    PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&normalized))
        .map(|(format, _)| *format)
}

pub fn is_valid(input: &str) -> bool {
    classify(input).is_some()
}

// ============================================================================
// VALIDATED PLATE
// ============================================================================

/// A plate that passed format validation, held in canonical form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Plate {
    canonical: String,
    format: PlateFormat,
}

impl Plate {
    pub fn parse(input: &str) -> AccessResult<Self> {
        if input.trim().is_empty() {
            return Err(AccessError::invalid("plate", "Required field is empty"));
        }

        match classify(input) {
            Some(format) => Ok(Plate {
                canonical: canonicalize(input),
                format,
            }),
            None => Err(AccessError::invalid(
                "plate",
                format!("'{}' is not a valid plate (use BB-BB-22, BBBB22, AB-12-34 or AB1234)", input.trim()),
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn format(&self) -> PlateFormat {
        self.format
    }
}

impl std::fmt::Display for Plate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl std::str::FromStr for Plate {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Plate::parse(s)
    }
}

// ============================================================================
// TESTS
// ============================================================================
