#![forbid(unsafe_code)]

//! Field-level error map and operational error types.

use std::collections::BTreeMap;
use std::fmt;

use crate::path::{FieldPath, PathParseError, WitnessField};
use crate::record::ValueKind;

/// Coarse classification of a field error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing value, empty selection, list length.
    Structural,
    /// Numeric bound violated.
    Range,
    /// Malformed value (email syntax, unknown category).
    Format,
    /// Remote uniqueness check rejected the value or could not complete.
    Remote,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Structural => "structural",
            Self::Range => "range",
            Self::Format => "format",
            Self::Remote => "remote",
        })
    }
}

/// A validation failure attached to one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub kind: ErrorKind,
    /// Stable code (see the `ERROR_CODE_*` constants).
    pub code: &'static str,
    /// User-facing message.
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Errors keyed by field path.
///
/// Array-level errors live at [`FieldPath::Witnesses`]; entry errors at
/// `witnesses.<i>.<field>`, one per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMap {
    entries: BTreeMap<FieldPath, FieldError>,
}

impl ErrorMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the error for `path`, replacing any previous one.
    pub fn insert(&mut self, path: FieldPath, error: FieldError) -> Option<FieldError> {
        self.entries.insert(path, error)
    }

    #[must_use]
    pub fn get(&self, path: FieldPath) -> Option<&FieldError> {
        self.entries.get(&path)
    }

    /// Message for `path`, if any.
    #[must_use]
    pub fn message(&self, path: FieldPath) -> Option<&str> {
        self.get(path).map(|e| e.message.as_str())
    }

    #[must_use]
    pub fn contains(&self, path: FieldPath) -> bool {
        self.entries.contains_key(&path)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldPath, &FieldError)> {
        self.entries.iter().map(|(path, error)| (*path, error))
    }

    /// Paths with errors, in path order.
    #[must_use]
    pub fn paths(&self) -> Vec<FieldPath> {
        self.entries.keys().copied().collect()
    }

    /// The array-level error for the witness list.
    #[must_use]
    pub fn array_error(&self) -> Option<&FieldError> {
        self.get(FieldPath::Witnesses)
    }

    /// Errors of the witness entry at `index`.
    #[must_use]
    pub fn entry(&self, index: usize) -> BTreeMap<WitnessField, &FieldError> {
        WitnessField::ALL
            .into_iter()
            .filter_map(|field| {
                self.get(FieldPath::Witness(index, field))
                    .map(|error| (field, error))
            })
            .collect()
    }

    /// Path-to-message view, using dotted paths.
    #[must_use]
    pub fn messages(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(path, error)| (path.to_string(), error.message.clone()))
            .collect()
    }
}

/// A rejected [`FormModel::set_field`](crate::FormModel::set_field) call.
#[derive(Debug, Clone, PartialEq)]
pub enum FormError {
    /// The path does not exist in the current record (e.g. a witness index
    /// past the end).
    UnknownPath(FieldPath),
    /// A dotted path string that names no field.
    InvalidPath(PathParseError),
    /// The value has the wrong shape for the path.
    TypeMismatch {
        path: FieldPath,
        expected: ValueKind,
        found: ValueKind,
    },
    /// A number that is NaN or infinite.
    NonFinite(FieldPath),
    /// The field is currently disabled by a derived constraint.
    Disabled(FieldPath),
    /// The path addresses the witness list itself; use the array operations.
    NotAssignable(FieldPath),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPath(path) => write!(f, "no such field: {path}"),
            Self::InvalidPath(err) => write!(f, "{err}"),
            Self::TypeMismatch {
                path,
                expected,
                found,
            } => write!(f, "{path} expects a {expected}, got a {found}"),
            Self::NonFinite(path) => write!(f, "{path} expects a finite number"),
            Self::Disabled(path) => write!(f, "{path} is disabled"),
            Self::NotAssignable(path) => {
                write!(f, "{path} cannot be assigned; use append/remove")
            }
        }
    }
}

impl std::error::Error for FormError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidPath(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PathParseError> for FormError {
    fn from(err: PathParseError) -> Self {
        Self::InvalidPath(err)
    }
}

/// Why a submission was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The record has validation errors.
    Invalid {
        errors: ErrorMap,
        /// Paths whose remote check is still outstanding.
        pending: Vec<FieldPath>,
    },
    /// No errors, but remote checks are still outstanding.
    Pending { paths: Vec<FieldPath> },
    /// The sink refused the validated record.
    Sink(SinkError),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { errors, pending } => {
                write!(f, "form has {} error(s)", errors.len())?;
                if !pending.is_empty() {
                    write!(f, " and {} pending check(s)", pending.len())?;
                }
                Ok(())
            }
            Self::Pending { paths } => {
                write!(f, "waiting for {} pending check(s)", paths.len())
            }
            Self::Sink(err) => write!(f, "submission sink failed: {err}"),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sink(err) => Some(err),
            _ => None,
        }
    }
}

/// Why a [`SubmissionSink`](crate::SubmissionSink) did not take a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The record could not be serialized.
    Encode(String),
    /// The destination refused or could not store it.
    Rejected(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(detail) => write!(f, "cannot encode record: {detail}"),
            Self::Rejected(detail) => write!(f, "record rejected: {detail}"),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}
