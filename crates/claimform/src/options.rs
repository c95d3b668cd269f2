#![forbid(unsafe_code)]

//! Category options supplied by an external source.
//!
//! The source may answer late, answer with an empty list, or fail. Until a
//! non-empty list is known the category membership rule is not applied.

use std::fmt;

use serde::Deserialize;

/// A category as delivered by the source (`{"name": .., "slug": ..}`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryRecord {
    pub name: String,
    pub slug: String,
}

impl CategoryRecord {
    #[must_use]
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
        }
    }
}

/// A selectable option: `label` is shown, `value` is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    pub label: String,
    pub value: String,
}

impl From<CategoryRecord> for ChoiceOption {
    fn from(record: CategoryRecord) -> Self {
        Self {
            label: record.name,
            value: record.slug,
        }
    }
}

/// What is known about the category options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryOptions {
    /// Nothing has arrived yet.
    #[default]
    NotLoaded,
    /// The source answered (possibly with an empty list).
    Loaded(Vec<ChoiceOption>),
}

impl CategoryOptions {
    /// Build a loaded state from source records, preserving their order.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = CategoryRecord>) -> Self {
        Self::Loaded(records.into_iter().map(ChoiceOption::from).collect())
    }

    /// Options available for display (empty when not loaded).
    #[must_use]
    pub fn options(&self) -> &[ChoiceOption] {
        match self {
            Self::NotLoaded => &[],
            Self::Loaded(options) => options,
        }
    }

    /// Whether the source has answered.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// Allowed values, or `None` when membership cannot be judged yet.
    #[must_use]
    pub fn allowed_values(&self) -> Option<Vec<String>> {
        match self {
            Self::Loaded(options) if !options.is_empty() => {
                Some(options.iter().map(|o| o.value.clone()).collect())
            }
            _ => None,
        }
    }

    /// Label for a stored value.
    #[must_use]
    pub fn label_for(&self, value: &str) -> Option<&str> {
        self.options()
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label.as_str())
    }
}

/// Error raised by an [`OptionsSource`].
#[derive(Debug)]
pub enum SourceError {
    /// The source could not be reached.
    Unavailable(String),
    /// The payload was not a list of `{name, slug}` objects.
    Malformed(serde_json::Error),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(detail) => write!(f, "category source unavailable: {detail}"),
            Self::Malformed(err) => write!(f, "malformed category payload: {err}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unavailable(_) => None,
            Self::Malformed(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err)
    }
}

/// Parse a `[{"name": .., "slug": ..}, ..]` payload.
pub fn parse_categories(json: &str) -> Result<Vec<CategoryRecord>, SourceError> {
    Ok(serde_json::from_str(json)?)
}

/// Supplier of category options.
pub trait OptionsSource: Send + Sync {
    fn fetch_categories(&self) -> Result<Vec<CategoryRecord>, SourceError>;
}

/// Source backed by a fixed list (or a fixed failure).
#[derive(Debug, Clone)]
pub struct StaticOptions {
    result: Result<Vec<CategoryRecord>, String>,
}

impl StaticOptions {
    #[must_use]
    pub fn new(records: Vec<CategoryRecord>) -> Self {
        Self {
            result: Ok(records),
        }
    }

    /// A source that always fails with `detail`.
    #[must_use]
    pub fn failing(detail: impl Into<String>) -> Self {
        Self {
            result: Err(detail.into()),
        }
    }

    /// A source serving a JSON payload.
    pub fn from_json(json: &str) -> Result<Self, SourceError> {
        parse_categories(json).map(Self::new)
    }
}

impl OptionsSource for StaticOptions {
    fn fetch_categories(&self) -> Result<Vec<CategoryRecord>, SourceError> {
        self.result.clone().map_err(SourceError::Unavailable)
    }
}
