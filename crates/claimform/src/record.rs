#![forbid(unsafe_code)]

//! The claim record and the values that can be written into it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A part of the vehicle that can be reported as damaged.
///
/// Declaration order is option order; a set of parts iterates (and
/// serializes) in this order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DamagedPart {
    Roof,
    Front,
    Side,
    Rear,
}

impl DamagedPart {
    /// Every selectable part, in option order.
    pub const ALL: [Self; 4] = [Self::Roof, Self::Front, Self::Side, Self::Rear];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Roof => "roof",
            Self::Front => "front",
            Self::Side => "side",
            Self::Rear => "rear",
        }
    }
}

impl fmt::Display for DamagedPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no damaged part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPart(pub String);

impl fmt::Display for UnknownPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown damaged part: {:?}", self.0)
    }
}

impl std::error::Error for UnknownPart {}

impl FromStr for DamagedPart {
    type Err = UnknownPart;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|part| part.as_str() == s)
            .ok_or_else(|| UnknownPart(s.to_string()))
    }
}

/// One witness entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub name: String,
    pub email: String,
}

impl Witness {
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// The full claim record.
///
/// `amount` and `allocation` are `None` when the input is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Record {
    pub amount: Option<f64>,
    pub damaged_parts: BTreeSet<DamagedPart>,
    pub allocation: Option<f64>,
    pub category: String,
    pub witnesses: Vec<Witness>,
}

impl Record {
    /// An empty record with a single blank witness entry.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            witnesses: vec![Witness::default()],
            ..Self::default()
        }
    }

    /// Serialize to the submitted JSON shape.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A value written into a scalar field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `amount` or `allocation`; `None` clears the input.
    Number(Option<f64>),
    /// `category`, `witnesses.<i>.name`, `witnesses.<i>.email`.
    Text(String),
    /// `damagedParts`.
    Parts(BTreeSet<DamagedPart>),
}

impl FieldValue {
    /// Shorthand for a present number.
    #[must_use]
    pub fn number(value: f64) -> Self {
        Self::Number(Some(value))
    }

    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn parts(parts: impl IntoIterator<Item = DamagedPart>) -> Self {
        Self::Parts(parts.into_iter().collect())
    }

    /// The kind of value, for type-mismatch reporting.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Text(_) => ValueKind::Text,
            Self::Parts(_) => ValueKind::Parts,
        }
    }
}

/// Shape of a [`FieldValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Text,
    Parts,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Number => "number",
            Self::Text => "text",
            Self::Parts => "set of damaged parts",
        })
    }
}
