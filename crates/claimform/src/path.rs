#![forbid(unsafe_code)]

//! Addressable locations inside the claim record.
//!
//! Paths display and parse in dotted form: `amount`, `damagedParts`,
//! `allocation`, `category`, `witnesses`, `witnesses.<i>.name`,
//! `witnesses.<i>.email`. The error map is keyed by these paths, so an entry's
//! error is addressable independently of the others.

use std::fmt;
use std::str::FromStr;

/// A field of a witness entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WitnessField {
    Name,
    Email,
}

impl WitnessField {
    /// Both entry fields, in display order.
    pub const ALL: [Self; 2] = [Self::Name, Self::Email];

    /// Path segment for this field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
        }
    }
}

/// The location of a value within the record.
///
/// Ordering follows the record's declaration order, with witness entries
/// ordered by index and then by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldPath {
    Amount,
    DamagedParts,
    Allocation,
    Category,
    /// The witness list as a whole (array-level errors).
    Witnesses,
    /// One field of the witness at `index`.
    Witness(usize, WitnessField),
}

impl FieldPath {
    /// Every scalar (non-array) path.
    pub const SCALARS: [Self; 4] = [
        Self::Amount,
        Self::DamagedParts,
        Self::Allocation,
        Self::Category,
    ];

    /// Shorthand for `witnesses.<index>.name`.
    #[must_use]
    pub const fn witness_name(index: usize) -> Self {
        Self::Witness(index, WitnessField::Name)
    }

    /// Shorthand for `witnesses.<index>.email`.
    #[must_use]
    pub const fn witness_email(index: usize) -> Self {
        Self::Witness(index, WitnessField::Email)
    }

    /// The witness index this path points into, if any.
    #[must_use]
    pub const fn witness_index(self) -> Option<usize> {
        match self {
            Self::Witness(index, _) => Some(index),
            _ => None,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amount => f.write_str("amount"),
            Self::DamagedParts => f.write_str("damagedParts"),
            Self::Allocation => f.write_str("allocation"),
            Self::Category => f.write_str("category"),
            Self::Witnesses => f.write_str("witnesses"),
            Self::Witness(index, field) => write!(f, "witnesses.{index}.{}", field.as_str()),
        }
    }
}

/// Error returned when a string is not a known field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParseError {
    input: String,
}

impl PathParseError {
    /// The rejected input.
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown field path: {:?}", self.input)
    }
}

impl std::error::Error for PathParseError {}

impl FromStr for FieldPath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PathParseError {
            input: s.to_string(),
        };
        match s {
            "amount" => return Ok(Self::Amount),
            "damagedParts" => return Ok(Self::DamagedParts),
            "allocation" => return Ok(Self::Allocation),
            "category" => return Ok(Self::Category),
            "witnesses" => return Ok(Self::Witnesses),
            _ => {}
        }

        let mut segments = s.split('.');
        let (Some("witnesses"), Some(index), Some(field), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(err());
        };
        // Reject "+1" and friends that usize::from_str would accept.
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let index: usize = index.parse().map_err(|_| err())?;
        let field = match field {
            "name" => WitnessField::Name,
            "email" => WitnessField::Email,
            _ => return Err(err()),
        };
        Ok(Self::Witness(index, field))
    }
}
