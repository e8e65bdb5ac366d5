use std::{fmt, str::FromStr};

use serde::Serialize;
use thiserror::Error;

const MAX_DECIMALS: usize = 2;

/// The user's own read of the conversation, in [-1, 1] with at most two decimals.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Perception(f64);

#[derive(Debug, Error, PartialEq)]
pub enum PerceptionError {
    #[error("perception is required")]
    Empty,
    #[error("'{0}' is not a number with at most two decimals")]
    Malformed(String),
    #[error("{0} is outside [-1, 1]")]
    OutOfRange(f64),
}

impl Perception {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Perception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Perception {
    type Err = PerceptionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() {
            return Err(PerceptionError::Empty);
        }
        if !has_valid_shape(input) {
            return Err(PerceptionError::Malformed(input.to_string()));
        }
        let value: f64 = input
            .parse()
            .map_err(|_| PerceptionError::Malformed(input.to_string()))?;
        if !(-1.0..=1.0).contains(&value) {
            return Err(PerceptionError::OutOfRange(value));
        }
        Ok(Perception(value))
    }
}

/// Optional minus, digits, then an optional dot with up to two digits.
fn has_valid_shape(input: &str) -> bool {
    let unsigned = input.strip_prefix('-').unwrap_or(input);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match fraction {
        Some(fraction) => {
            fraction.len() <= MAX_DECIMALS && fraction.bytes().all(|b| b.is_ascii_digit())
        }
        None => true,
    }
}

/// Keystroke filter for the perception field: lets a partial entry through
/// (empty, a lone minus sign) as well as any complete valid value.
pub fn accepts_keystroke(input: &str) -> bool {
    input.is_empty() || input == "-" || input.parse::<Perception>().is_ok()
}
