// validate.rs — Edit-time field validators
//
// Validators run when the user edits a field, never during generation: the
// generator trusts the values it is handed. A rejected edit leaves the field
// at its previous value.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Why a raw edit was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected: {reason}")]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    fn new(reason: impl Into<String>) -> Self {
        Rejection {
            reason: reason.into(),
        }
    }
}

/// Predicate over raw field text, returning the normalized text on success.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Validator {
    /// Integer, optionally bounded (inclusive).
    IntRange { min: Option<i64>, max: Option<i64> },
    /// Whole-string regex match.
    Pattern {
        pattern: String,
        #[serde(skip_serializing)]
        regex: Regex,
    },
    /// Exact membership in a fixed set (dropdown values).
    OneOf { options: Vec<String> },
}

static ANALOG_PIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(A\d+|\d+)$").expect("analog pin pattern is valid"));

impl Validator {
    /// GPIO numbers usable on an ESP32 module.
    pub fn gpio() -> Self {
        Validator::IntRange {
            min: Some(0),
            max: Some(40),
        }
    }

    pub fn non_negative() -> Self {
        Validator::IntRange {
            min: Some(0),
            max: None,
        }
    }

    /// `A0`-style or bare numeric analog pin.
    pub fn analog_pin() -> Self {
        Validator::Pattern {
            pattern: ANALOG_PIN.as_str().to_string(),
            regex: ANALOG_PIN.clone(),
        }
    }

    /// Build a pattern validator; the pattern is anchored by the caller.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Validator::Pattern {
            pattern: pattern.to_string(),
            regex: Regex::new(pattern)?,
        })
    }

    pub fn one_of<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Validator::OneOf {
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// Check `raw` and return its normalized form.
    pub fn validate(&self, raw: &str) -> Result<String, Rejection> {
        match self {
            Validator::IntRange { min, max } => {
                let text = raw.trim();
                let n: i64 = text
                    .parse()
                    .map_err(|_| Rejection::new(format!("'{}' is not an integer", text)))?;
                if let Some(min) = min {
                    if n < *min {
                        return Err(Rejection::new(format!("{} is below {}", n, min)));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(Rejection::new(format!("{} is above {}", n, max)));
                    }
                }
                Ok(n.to_string())
            }
            Validator::Pattern { pattern, regex } => {
                let text = raw.trim();
                if regex.is_match(text) {
                    Ok(text.to_string())
                } else {
                    Err(Rejection::new(format!(
                        "'{}' does not match {}",
                        text, pattern
                    )))
                }
            }
            Validator::OneOf { options } => {
                if options.iter().any(|o| o == raw) {
                    Ok(raw.to_string())
                } else {
                    Err(Rejection::new(format!(
                        "'{}' is not one of {}",
                        raw,
                        options.join(", ")
                    )))
                }
            }
        }
    }
}

/// Apply a user edit to `current`. On rejection `current` is left untouched.
pub fn apply_edit(
    validator: Option<&Validator>,
    current: &mut String,
    raw: &str,
) -> Result<(), Rejection> {
    let accepted = match validator {
        Some(v) => v.validate(raw)?,
        None => raw.to_string(),
    };
    *current = accepted;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpio_range_accepts_and_normalizes() {
        let v = Validator::gpio();
        assert_eq!(v.validate("13").unwrap(), "13");
        assert_eq!(v.validate(" 007 ").unwrap(), "7");
        assert!(v.validate("41").is_err());
        assert!(v.validate("-1").is_err());
        assert!(v.validate("pin").is_err());
    }

    #[test]
    fn non_negative_has_no_upper_bound() {
        let v = Validator::non_negative();
        assert_eq!(v.validate("600000").unwrap(), "600000");
        assert!(v.validate("-5").is_err());
    }

    #[test]
    fn analog_pin_pattern() {
        let v = Validator::analog_pin();
        assert_eq!(v.validate("A0").unwrap(), "A0");
        assert_eq!(v.validate("34").unwrap(), "34");
        assert!(v.validate("B3").is_err());
        assert!(v.validate("A").is_err());
    }

    #[test]
    fn one_of_is_exact() {
        let v = Validator::one_of(["HIGH", "LOW"]);
        assert!(v.validate("HIGH").is_ok());
        assert!(v.validate("high").is_err());
    }

    #[test]
    fn rejected_edit_keeps_previous_value() {
        let v = Validator::gpio();
        let mut value = "2".to_string();
        let err = apply_edit(Some(&v), &mut value, "99").unwrap_err();
        assert!(err.reason.contains("above"), "got: {}", err);
        assert_eq!(value, "2");

        apply_edit(Some(&v), &mut value, "13").unwrap();
        assert_eq!(value, "13");
    }

    #[test]
    fn unvalidated_edit_is_taken_verbatim() {
        let mut value = String::new();
        apply_edit(None, &mut value, "  Serial.read() ").unwrap();
        assert_eq!(value, "  Serial.read() ");
    }

    #[test]
    fn custom_pattern_compiles() {
        let v = Validator::pattern(r"^[a-z]+$").unwrap();
        assert!(v.validate("abc").is_ok());
        assert!(Validator::pattern("(").is_err());
    }
}
