//! Pure field validation rules.
//!
//! Every rule is deterministic and infallible: bad input produces a low
//! score or a failing [`Score::Pass`], never an error.

use crate::field::FieldName;
use std::collections::BTreeMap;
use std::fmt;

/// Characters that satisfy [`Criterion::Special`].
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*?:{}|<>_-~;=+";

/// Minimum password length for [`Criterion::MinLength`].
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Default passing score for [`ValidationRule::PasswordStrength`].
pub const DEFAULT_PASSWORD_MIN_SCORE: u8 = 60;

/// Default digit count for [`ValidationRule::NumericCode`].
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// A single named check inside a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Criterion {
    /// Contains a lowercase letter.
    Lowercase,
    /// Contains an uppercase letter.
    Uppercase,
    /// Contains an ASCII digit.
    Digit,
    /// Contains one of [`SPECIAL_CHARACTERS`].
    Special,
    /// At least [`PASSWORD_MIN_LENGTH`] characters.
    MinLength,
    /// Looks like an email address.
    EmailFormat,
    /// Consists of digits only.
    DigitsOnly,
    /// Has the expected number of characters.
    ExactLength,
    /// Is not blank.
    Present,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Criterion::Lowercase => "lowercase",
            Criterion::Uppercase => "uppercase",
            Criterion::Digit => "digit",
            Criterion::Special => "special",
            Criterion::MinLength => "min_length",
            Criterion::EmailFormat => "email_format",
            Criterion::DigitsOnly => "digits_only",
            Criterion::ExactLength => "exact_length",
            Criterion::Present => "present",
        };
        write!(f, "{}", name)
    }
}

/// Aggregate outcome of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Graded strength from 0 to 100 in steps of 20.
    Strength(u8),
    /// Plain pass/fail.
    Pass(bool),
}

/// Outcome of evaluating one field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// The evaluated field.
    pub field: FieldName,
    /// Aggregate score.
    pub score: Score,
    /// Per-criterion outcome.
    pub criteria: BTreeMap<Criterion, bool>,
    passed: bool,
}

impl ValidationResult {
    /// Result for a field that has no rule: passes with no criteria.
    pub fn unchecked(field: impl Into<FieldName>) -> Self {
        Self {
            field: field.into(),
            score: Score::Pass(true),
            criteria: BTreeMap::new(),
            passed: true,
        }
    }

    /// Returns `true` if the value passes the rule it was evaluated against.
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Returns the outcome of a single criterion, if the rule checks it.
    pub fn criterion(&self, criterion: Criterion) -> Option<bool> {
        self.criteria.get(&criterion).copied()
    }

    /// Returns the strength score, if this is a graded result.
    pub fn strength(&self) -> Option<u8> {
        match self.score {
            Score::Strength(s) => Some(s),
            Score::Pass(_) => None,
        }
    }
}

/// A fixed rule set applied to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRule {
    /// Five-criterion strength meter; passes at `min_score` or above.
    PasswordStrength {
        /// Lowest passing score.
        min_score: u8,
    },
    /// Email address shape check.
    Email,
    /// Exactly `length` ASCII digits.
    NumericCode {
        /// Required digit count.
        length: usize,
    },
    /// Phone number: optional `+`, then 10 to 15 digits.
    PhoneNumber,
    /// Non-blank text.
    Present,
}

impl ValidationRule {
    /// Returns the rule used for a well-known field name, if any.
    ///
    /// ```
    /// use ayumi_core::ValidationRule;
    ///
    /// assert_eq!(ValidationRule::for_field("email"), Some(ValidationRule::Email));
    /// assert_eq!(ValidationRule::for_field("firstName"), None);
    /// ```
    pub fn for_field(field: &str) -> Option<Self> {
        match field {
            "password" => Some(ValidationRule::PasswordStrength {
                min_score: DEFAULT_PASSWORD_MIN_SCORE,
            }),
            "email" => Some(ValidationRule::Email),
            "emailVerificationCode" | "resetCode" => Some(ValidationRule::NumericCode {
                length: DEFAULT_CODE_LENGTH,
            }),
            "phoneNumber" => Some(ValidationRule::PhoneNumber),
            _ => None,
        }
    }

    /// Evaluates a raw value against this rule.
    pub fn evaluate(&self, field: impl Into<FieldName>, raw: &str) -> ValidationResult {
        let field = field.into();
        match *self {
            ValidationRule::PasswordStrength { min_score } => {
                let criteria = password_criteria(raw);
                let score = if raw.is_empty() {
                    0
                } else {
                    20 * criteria.values().filter(|ok| **ok).count() as u8
                };
                ValidationResult {
                    field,
                    score: Score::Strength(score),
                    criteria,
                    passed: score >= min_score,
                }
            }
            ValidationRule::Email => {
                pass_fail(field, [(Criterion::EmailFormat, is_email(raw))])
            }
            ValidationRule::NumericCode { length } => pass_fail(
                field,
                [
                    (
                        Criterion::DigitsOnly,
                        !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()),
                    ),
                    (Criterion::ExactLength, raw.chars().count() == length),
                ],
            ),
            ValidationRule::PhoneNumber => {
                let digits: String = raw
                    .trim()
                    .trim_start_matches('+')
                    .chars()
                    .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
                    .collect();
                pass_fail(
                    field,
                    [
                        (
                            Criterion::DigitsOnly,
                            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()),
                        ),
                        (Criterion::ExactLength, (10..=15).contains(&digits.len())),
                    ],
                )
            }
            ValidationRule::Present => {
                pass_fail(field, [(Criterion::Present, !raw.trim().is_empty())])
            }
        }
    }
}

/// Evaluates a raw value using the rule for its field name.
///
/// Fields without a dedicated rule get a presence check.
///
/// ```
/// use ayumi_core::{evaluate, Score};
///
/// assert_eq!(evaluate("password", "Abc12345!").score, Score::Strength(100));
/// assert_eq!(evaluate("password", "abc").score, Score::Strength(20));
/// assert_eq!(evaluate("firstName", "A").score, Score::Pass(true));
/// ```
pub fn evaluate(field: impl Into<FieldName>, raw: &str) -> ValidationResult {
    let field = field.into();
    ValidationRule::for_field(field.as_str())
        .unwrap_or(ValidationRule::Present)
        .evaluate(field, raw)
}

fn password_criteria(raw: &str) -> BTreeMap<Criterion, bool> {
    BTreeMap::from([
        (Criterion::Lowercase, raw.chars().any(|c| c.is_lowercase())),
        (Criterion::Uppercase, raw.chars().any(|c| c.is_uppercase())),
        (Criterion::Digit, raw.chars().any(|c| c.is_ascii_digit())),
        (
            Criterion::Special,
            raw.chars().any(|c| SPECIAL_CHARACTERS.contains(c)),
        ),
        (
            Criterion::MinLength,
            raw.chars().count() >= PASSWORD_MIN_LENGTH,
        ),
    ])
}

fn pass_fail<const N: usize>(
    field: FieldName,
    checks: [(Criterion, bool); N],
) -> ValidationResult {
    let criteria = BTreeMap::from(checks);
    let passed = criteria.values().all(|ok| *ok);
    ValidationResult {
        field,
        score: Score::Pass(passed),
        criteria,
        passed,
    }
}

fn is_email(raw: &str) -> bool {
    if raw.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| !label.is_empty())
}
