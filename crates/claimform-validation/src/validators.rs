#![forbid(unsafe_code)]

//! Core validation types and built-in validators.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

// ---------------------------------------------------------------------------
// Error Codes
// ---------------------------------------------------------------------------

/// Error code for required field validation.
pub const ERROR_CODE_REQUIRED: &str = "required";
/// Error code for email syntax validation.
pub const ERROR_CODE_EMAIL: &str = "email";
/// Error code for numeric range validation.
pub const ERROR_CODE_RANGE: &str = "range";
/// Error code for a collection with too few items.
pub const ERROR_CODE_MIN_ITEMS: &str = "too_few";
/// Error code for a collection with too many items.
pub const ERROR_CODE_MAX_ITEMS: &str = "too_many";
/// Error code for a value outside a known set of choices.
pub const ERROR_CODE_ONE_OF: &str = "one_of";
/// Error code for a value rejected by a remote check.
pub const ERROR_CODE_REMOTE: &str = "remote";
/// Error code for a remote check that could not be completed.
pub const ERROR_CODE_REMOTE_UNAVAILABLE: &str = "remote_unavailable";

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// A validation error with code, message, and interpolation parameters.
///
/// The `code` field is a stable identifier for programmatic handling.
/// The `message` field is a human-readable message template.
/// The `params` field contains key-value pairs for message interpolation.
///
/// # Example
///
/// ```rust
/// use claimform_validation::ValidationError;
///
/// let error = ValidationError::new("range", "Allocation must be between 0 and {max}")
///     .with_param("max", 250);
///
/// assert_eq!(error.format_message(), "Allocation must be between 0 and 250");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Stable error code.
    pub code: &'static str,
    /// Human-readable error message template.
    pub message: String,
    /// Parameters for message interpolation.
    pub params: HashMap<String, String>,
}

impl ValidationError {
    /// Create a new validation error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            params: HashMap::new(),
        }
    }

    /// Add a parameter for message interpolation.
    ///
    /// Parameters are substituted in the message using `{key}` syntax.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Replace the message template, keeping code and parameters.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Format the message with parameter substitution.
    #[must_use]
    pub fn format_message(&self) -> String {
        let mut result = self.message.clone();
        for (key, value) in &self.params {
            result = result.replace(&format!("{{{key}}}"), value);
        }
        result
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_message())
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// ValidationResult
// ---------------------------------------------------------------------------

/// The result of a validation operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValidationResult {
    /// The value is valid.
    #[default]
    Valid,
    /// The value is invalid with an error.
    Invalid(ValidationError),
}

impl ValidationResult {
    /// Returns `true` if the result is `Valid`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Returns `true` if the result is `Invalid`.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    /// Returns the error if the result is `Invalid`, otherwise `None`.
    #[must_use]
    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            Self::Valid => None,
            Self::Invalid(e) => Some(e),
        }
    }

    /// Returns the error message if the result is `Invalid`, otherwise `None`.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error().map(ValidationError::format_message)
    }

    /// Combine two results, returning the first error if any.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::Valid => other,
            Self::Invalid(_) => self,
        }
    }
}

// ---------------------------------------------------------------------------
// Validator Trait
// ---------------------------------------------------------------------------

/// A trait for validating values of type `T`.
///
/// Validators are composable through [`And`].
///
/// ```rust
/// use claimform_validation::{ValidationError, ValidationResult, Validator};
///
/// struct NoSpaces;
///
/// impl Validator<str> for NoSpaces {
///     fn validate(&self, value: &str) -> ValidationResult {
///         if value.contains(' ') {
///             ValidationResult::Invalid(ValidationError::new("no_spaces", self.error_message()))
///         } else {
///             ValidationResult::Valid
///         }
///     }
///
///     fn error_message(&self) -> &str {
///         "Value must not contain spaces"
///     }
/// }
///
/// assert!(NoSpaces.validate("a b").is_invalid());
/// ```
pub trait Validator<T: ?Sized>: Send + Sync {
    /// Validate the given value.
    fn validate(&self, value: &T) -> ValidationResult;

    /// Return the default error message for this validator.
    fn error_message(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Built-in Validators
// ---------------------------------------------------------------------------

/// Validates that a string is not empty.
///
/// Whitespace-only strings are considered empty.
#[derive(Debug, Clone)]
pub struct Required {
    message: String,
}

impl Default for Required {
    fn default() -> Self {
        Self {
            message: "This field is required".to_string(),
        }
    }
}

impl Required {
    /// Create a new `Required` validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom error message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Validator<str> for Required {
    fn validate(&self, value: &str) -> ValidationResult {
        if value.trim().is_empty() {
            ValidationResult::Invalid(ValidationError::new(ERROR_CODE_REQUIRED, &self.message))
        } else {
            ValidationResult::Valid
        }
    }

    fn error_message(&self) -> &str {
        &self.message
    }
}

/// Validates that a string is a syntactically valid email address.
///
/// Heuristic check: exactly one `@` with text on both sides, a dotted domain
/// with non-empty labels and a TLD of at least two characters, no whitespace.
/// Empty values pass; combine with [`Required`] to reject them.
#[derive(Debug, Clone)]
pub struct Email {
    message: String,
}

impl Default for Email {
    fn default() -> Self {
        Self {
            message: "Invalid email address".to_string(),
        }
    }
}

impl Email {
    /// Create a new `Email` validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom error message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    fn is_well_formed(value: &str) -> bool {
        if value.chars().any(char::is_whitespace) {
            return false;
        }
        let Some((local, domain)) = value.split_once('@') else {
            return false;
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return false;
        }
        let labels: Vec<&str> = domain.split('.').collect();
        if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
            return false;
        }
        labels.last().is_some_and(|tld| tld.chars().count() >= 2)
    }
}

impl Validator<str> for Email {
    fn validate(&self, value: &str) -> ValidationResult {
        let trimmed = value.trim();
        if trimmed.is_empty() || Self::is_well_formed(trimmed) {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(ValidationError::new(ERROR_CODE_EMAIL, &self.message))
        }
    }

    fn error_message(&self) -> &str {
        &self.message
    }
}

/// Validates that a value is within an inclusive range.
#[derive(Debug, Clone)]
pub struct Range<T> {
    /// Minimum value (inclusive).
    pub min: T,
    /// Maximum value (inclusive).
    pub max: T,
    message: String,
}

impl<T: Copy> Range<T> {
    /// Create a new `Range` validator.
    #[must_use]
    pub fn new(min: T, max: T) -> Self {
        Self {
            min,
            max,
            message: "Must be between {min} and {max}".to_string(),
        }
    }

    /// Set a custom message template (`{min}`, `{max}` and `{actual}` are available).
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl<T> Validator<T> for Range<T>
where
    T: PartialOrd + fmt::Display + Copy + Send + Sync,
{
    fn validate(&self, value: &T) -> ValidationResult {
        // NaN compares false on both sides and lands in the error branch.
        if *value >= self.min && *value <= self.max {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(
                ValidationError::new(ERROR_CODE_RANGE, &self.message)
                    .with_param("min", self.min)
                    .with_param("max", self.max)
                    .with_param("actual", *value),
            )
        }
    }

    fn error_message(&self) -> &str {
        &self.message
    }
}

/// Validates the number of items in a collection.
#[derive(Debug, Clone)]
pub struct ItemCount {
    /// Minimum number of items (inclusive).
    pub min: usize,
    /// Maximum number of items (inclusive), if bounded.
    pub max: Option<usize>,
    too_few: String,
    too_many: String,
}

impl ItemCount {
    /// Require at least `min` items.
    #[must_use]
    pub fn at_least(min: usize) -> Self {
        Self {
            min,
            max: None,
            too_few: "Select at least {min} item(s)".to_string(),
            too_many: "Select at most {max} item(s)".to_string(),
        }
    }

    /// Require between `min` and `max` items.
    #[must_use]
    pub fn between(min: usize, max: usize) -> Self {
        Self {
            max: Some(max),
            ..Self::at_least(min)
        }
    }

    /// Message used when there are fewer than `min` items.
    #[must_use]
    pub fn too_few_message(mut self, message: impl Into<String>) -> Self {
        self.too_few = message.into();
        self
    }

    /// Message used when there are more than `max` items.
    #[must_use]
    pub fn too_many_message(mut self, message: impl Into<String>) -> Self {
        self.too_many = message.into();
        self
    }
}

impl Validator<usize> for ItemCount {
    fn validate(&self, value: &usize) -> ValidationResult {
        if *value < self.min {
            return ValidationResult::Invalid(
                ValidationError::new(ERROR_CODE_MIN_ITEMS, &self.too_few)
                    .with_param("min", self.min)
                    .with_param("actual", *value),
            );
        }
        if let Some(max) = self.max
            && *value > max
        {
            return ValidationResult::Invalid(
                ValidationError::new(ERROR_CODE_MAX_ITEMS, &self.too_many)
                    .with_param("max", max)
                    .with_param("actual", *value),
            );
        }
        ValidationResult::Valid
    }

    fn error_message(&self) -> &str {
        &self.too_few
    }
}

/// Validates that a string is one of a known set of values.
///
/// Empty values pass; combine with [`Required`] to reject them.
#[derive(Debug, Clone)]
pub struct OneOf<'a> {
    allowed: &'a [String],
    message: String,
}

impl<'a> OneOf<'a> {
    /// Create a new `OneOf` validator over `allowed`.
    #[must_use]
    pub fn new(allowed: &'a [String]) -> Self {
        Self {
            allowed,
            message: "Must be one of the available options".to_string(),
        }
    }

    /// Set a custom error message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Validator<str> for OneOf<'_> {
    fn validate(&self, value: &str) -> ValidationResult {
        if value.is_empty() || self.allowed.iter().any(|a| a == value) {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(
                ValidationError::new(ERROR_CODE_ONE_OF, &self.message).with_param("actual", value),
            )
        }
    }

    fn error_message(&self) -> &str {
        &self.message
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Combines two validators with AND logic.
///
/// The first validator's error wins; the second only runs when the first passes.
#[derive(Debug)]
pub struct And<A, B, T: ?Sized> {
    first: A,
    second: B,
    _marker: PhantomData<fn(&T)>,
}

impl<A, B, T: ?Sized> And<A, B, T> {
    /// Create a new `And` validator.
    #[must_use]
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            _marker: PhantomData,
        }
    }
}

impl<A, B, T> Validator<T> for And<A, B, T>
where
    T: ?Sized,
    A: Validator<T>,
    B: Validator<T>,
{
    fn validate(&self, value: &T) -> ValidationResult {
        match self.first.validate(value) {
            ValidationResult::Valid => self.second.validate(value),
            invalid => invalid,
        }
    }

    fn error_message(&self) -> &str {
        self.first.error_message()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
