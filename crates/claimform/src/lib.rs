#![forbid(unsafe_code)]

//! Damage-claim form engine.
//!
//! Keeps a claim record consistent and validated while it is edited field by
//! field, while witness entries are added and removed, and while remote
//! uniqueness checks for witness emails come and go.
//!
//! # Key Components
//!
//! - [`FormModel`] - authoritative record, error map, touched/dirty state
//! - [`SchemaValidator`] - declarative rules, first failure per path wins
//! - [`ConstraintEngine`] - derived constraints (`allocation` follows `amount`)
//! - [`WitnessArray`] - bounded witness list with stable entry ids
//! - [`AsyncValidationCoordinator`] - debounced, token-ordered, cached checks
//! - [`FormSession`] - model plus an [`Effects`] executor and a [`SubmissionSink`]
//!
//! # How it fits together
//! Input goes through [`FormModel::set_field`] or the witness operations. The
//! model recomputes constraints for declared dependencies, runs the sync
//! rules, requests or cancels uniqueness checks, and merges their verdicts
//! into the error map. [`FormModel::revision`] changes whenever anything
//! observable did, which is the re-render signal for a view layer.

pub mod config;
pub mod constraints;
pub mod effects;
pub mod error;
pub mod field_array;
#[cfg(feature = "logging")]
pub mod logging;
pub mod model;
pub mod options;
pub mod path;
pub mod record;
pub mod schema;
pub mod session;

pub use claimform_validation::{
    AsyncStatus, AsyncValidationCoordinator, CheckOutcome, CheckTicket, ValidationToken,
    ValidationTrace,
};
pub use config::{ConfigError, FormConfig};
pub use constraints::{
    ConstraintEngine, DEPENDENCIES, Dependency, DerivedConstraints, derive_constraints,
};
pub use effects::{
    DirectoryError, Effects, InMemoryDirectory, Inbound, InlineEffects, ThreadedEffects,
    UniquenessDirectory,
};
pub use error::{ErrorKind, ErrorMap, FieldError, FormError, SinkError, SubmitError};
pub use field_array::{ArrayError, MAX_WITNESSES, MIN_WITNESSES, WitnessArray, WitnessId};
pub use model::{FormModel, FormStatus};
pub use options::{
    CategoryOptions, CategoryRecord, ChoiceOption, OptionsSource, SourceError, StaticOptions,
    parse_categories,
};
pub use path::{FieldPath, PathParseError, WitnessField};
pub use record::{DamagedPart, FieldValue, Record, ValueKind, Witness};
pub use schema::{Rule, SchemaValidator};
pub use session::{FormSession, LogSink, PumpReport, SubmissionSink};
