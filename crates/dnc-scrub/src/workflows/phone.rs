//! Canonical phone keys for registry matching.
//!
//! Every number entering the pipeline, whether from an uploaded lead list or a
//! registry change list, is reduced to a 10-digit North American Numbering Plan
//! key. Numbers that cannot be reduced are rejected with an enumerated reason
//! instead of being passed through in raw form.

use std::fmt;

use serde::{Deserialize, Serialize};

const NANP_LENGTH: usize = 10;
const INTERNATIONAL_DIAL_OUT: &str = "011";

/// Reason a raw phone string could not be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum PhoneRejection {
    #[error("phone number has too few digits")]
    TooShort,
    #[error("phone number has too many digits")]
    TooLong,
    #[error("phone number contains characters other than digits and separators")]
    InvalidCharacters,
    #[error("phone number belongs to an unsupported country")]
    UnsupportedCountry,
    #[error("area code or exchange must start with 2-9")]
    InvalidPrefix,
}

impl PhoneRejection {
    pub const fn label(self) -> &'static str {
        match self {
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
            Self::InvalidCharacters => "invalid_characters",
            Self::UnsupportedCountry => "unsupported_country",
            Self::InvalidPrefix => "invalid_prefix",
        }
    }
}

/// Canonical 10-digit domestic phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneKey(String);

impl PhoneKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn area_code(&self) -> AreaCode {
        AreaCode(self.0[..3].to_string())
    }
}

impl fmt::Display for PhoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneKey {
    type Error = PhoneRejection;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        normalize_phone(&value)
    }
}

impl From<PhoneKey> for String {
    fn from(value: PhoneKey) -> Self {
        value.0
    }
}

/// Three-digit NANP area code, the unit of registry subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AreaCode(String);

impl AreaCode {
    pub fn parse(raw: &str) -> Result<Self, PhoneRejection> {
        let trimmed = raw.trim();
        if !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(PhoneRejection::InvalidCharacters);
        }
        match trimmed.len() {
            0..=2 => Err(PhoneRejection::TooShort),
            3 if valid_leading_digit(trimmed) => Ok(Self(trimmed.to_string())),
            3 => Err(PhoneRejection::InvalidPrefix),
            _ => Err(PhoneRejection::TooLong),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AreaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AreaCode {
    type Error = PhoneRejection;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AreaCode> for String {
    fn from(value: AreaCode) -> Self {
        value.0
    }
}

fn valid_leading_digit(segment: &str) -> bool {
    matches!(segment.as_bytes().first(), Some(b'2'..=b'9'))
}

/// Reduce a raw phone string to its canonical key.
///
/// Separators (whitespace, parentheses, dashes, dots, slashes) are ignored and a
/// single leading `+` is accepted. A `1` trunk prefix on an 11-digit number is
/// stripped; any other country code is rejected.
pub fn normalize_phone(raw: &str) -> Result<PhoneKey, PhoneRejection> {
    let trimmed = raw.trim();
    let (explicit_country, body) = match trimmed.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let mut digits = String::with_capacity(body.len());
    for ch in body.chars() {
        match ch {
            '0'..='9' => digits.push(ch),
            ' ' | '\t' | '(' | ')' | '-' | '.' | '/' => {}
            _ => return Err(PhoneRejection::InvalidCharacters),
        }
    }

    if explicit_country {
        if !digits.starts_with('1') {
            return Err(PhoneRejection::UnsupportedCountry);
        }
        digits.remove(0);
    } else if digits.starts_with(INTERNATIONAL_DIAL_OUT) {
        return Err(PhoneRejection::UnsupportedCountry);
    } else if digits.len() == NANP_LENGTH + 1 {
        if !digits.starts_with('1') {
            return Err(PhoneRejection::UnsupportedCountry);
        }
        digits.remove(0);
    }

    if digits.len() < NANP_LENGTH {
        return Err(PhoneRejection::TooShort);
    }
    if digits.len() > NANP_LENGTH {
        return Err(PhoneRejection::TooLong);
    }

    if !valid_leading_digit(&digits[..3]) || !valid_leading_digit(&digits[3..6]) {
        return Err(PhoneRejection::InvalidPrefix);
    }

    Ok(PhoneKey(digits))
}
