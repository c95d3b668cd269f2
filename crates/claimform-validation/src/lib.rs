#![forbid(unsafe_code)]

//! Validation primitives for the claim form.
//!
//! - A core [`Validator`] trait with built-in validators for the patterns the
//!   form needs (required, email syntax, numeric range, item counts, membership)
//! - [`And`] composition where the first failure wins
//! - Error messages with parameter interpolation
//! - A keyed, debounced [`AsyncValidationCoordinator`] with monotonic tokens,
//!   a per-value result cache and a checksummable event trace
//!
//! ```rust
//! use claimform_validation::{And, Email, Required, Validator};
//!
//! let email = And::new(
//!     Required::new().with_message("Email is required"),
//!     Email::new().with_message("Invalid email"),
//! );
//! assert!(email.validate("marek@email.cz").is_valid());
//! assert_eq!(email.validate("").error_message().as_deref(), Some("Email is required"));
//! ```

pub mod async_validation;
mod validators;

pub use async_validation::{
    AsyncStatus, AsyncValidationCoordinator, CheckOutcome, CheckTicket, CoordinatorConfig,
    CoordinatorStats, RequestOutcome, ValidationEvent, ValidationToken, ValidationTrace,
};
pub use validators::{
    // Composition
    And,
    // Error codes
    ERROR_CODE_EMAIL,
    ERROR_CODE_MAX_ITEMS,
    ERROR_CODE_MIN_ITEMS,
    ERROR_CODE_ONE_OF,
    ERROR_CODE_RANGE,
    ERROR_CODE_REMOTE,
    ERROR_CODE_REMOTE_UNAVAILABLE,
    ERROR_CODE_REQUIRED,
    // Built-in validators
    Email,
    ItemCount,
    OneOf,
    Range,
    Required,
    // Core types
    ValidationError,
    ValidationResult,
    Validator,
};
