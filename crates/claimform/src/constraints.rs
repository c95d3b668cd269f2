#![forbid(unsafe_code)]

//! Derived cross-field constraints.
//!
//! Dependencies between fields are an explicit list rather than something
//! discovered from rule bodies. The engine recomputes only when a declared
//! source changes and reports which targets were affected, so the model knows
//! which paths to revalidate.

use crate::path::FieldPath;
use crate::record::Record;

/// A declared `source -> target` relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub source: FieldPath,
    pub target: FieldPath,
}

/// Every cross-field dependency of the record.
pub const DEPENDENCIES: &[Dependency] = &[Dependency {
    source: FieldPath::Amount,
    target: FieldPath::Allocation,
}];

/// Constraints computed from the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedConstraints {
    /// Inclusive upper bound for `allocation`.
    pub allocation_max: f64,
    /// `allocation` cannot be edited.
    pub allocation_disabled: bool,
}

impl Default for DerivedConstraints {
    fn default() -> Self {
        derive_constraints(&Record::default())
    }
}

/// Compute constraints from the current record.
///
/// `allocation` is disabled while `amount` is absent or zero, and its upper
/// bound follows `amount` (0 when absent).
#[must_use]
pub fn derive_constraints(record: &Record) -> DerivedConstraints {
    let amount = record.amount.filter(|a| a.is_finite());
    DerivedConstraints {
        allocation_max: amount.unwrap_or(0.0),
        allocation_disabled: amount.is_none_or(|a| a == 0.0),
    }
}

/// Targets that depend on `source`.
pub fn dependents_of(source: FieldPath) -> impl Iterator<Item = FieldPath> {
    DEPENDENCIES
        .iter()
        .filter(move |dep| dep.source == source)
        .map(|dep| dep.target)
}

/// Holds the current constraints and recomputes them on declared changes.
#[derive(Debug, Clone)]
pub struct ConstraintEngine {
    current: DerivedConstraints,
    recomputes: u64,
}

impl ConstraintEngine {
    #[must_use]
    pub fn new(record: &Record) -> Self {
        Self {
            current: derive_constraints(record),
            recomputes: 0,
        }
    }

    #[must_use]
    pub fn current(&self) -> DerivedConstraints {
        self.current
    }

    /// Number of recomputations since creation.
    #[must_use]
    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }

    /// React to a change of `changed`.
    ///
    /// Returns the affected targets; empty when `changed` is not a declared
    /// source, in which case nothing is recomputed.
    pub fn on_change(&mut self, changed: FieldPath, record: &Record) -> Vec<FieldPath> {
        let affected: Vec<FieldPath> = dependents_of(changed).collect();
        if affected.is_empty() {
            return affected;
        }
        let previous = self.current;
        self.current = derive_constraints(record);
        self.recomputes += 1;
        tracing::debug!(
            source = %changed,
            allocation_max = self.current.allocation_max,
            allocation_disabled = self.current.allocation_disabled,
            changed = previous != self.current,
            "constraints recomputed"
        );
        affected
    }
}
