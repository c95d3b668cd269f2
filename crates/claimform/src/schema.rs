#![forbid(unsafe_code)]

//! Declarative validation rules for the claim record.
//!
//! A [`Rule`] is plain data: which paths it applies to, a stable name and
//! code, the user-facing message, and either a synchronous check or a marker
//! for an asynchronous one. Rules that target the same path run in
//! declaration order and the first failure wins. A synchronous failure on a
//! path pre-empts its asynchronous rule, so the uniqueness check is only asked
//! for emails that are present and well formed.

use claimform_validation::{
    ERROR_CODE_EMAIL, ERROR_CODE_MAX_ITEMS, ERROR_CODE_MIN_ITEMS, ERROR_CODE_ONE_OF,
    ERROR_CODE_RANGE, ERROR_CODE_REMOTE, ERROR_CODE_REQUIRED, Email, ItemCount, OneOf, Range,
    Required, ValidationError, ValidationResult, Validator,
};

use crate::constraints::DerivedConstraints;
use crate::error::{ErrorKind, ErrorMap, FieldError};
use crate::path::{FieldPath, WitnessField};
use crate::record::Record;

/// Upper bound for `amount`.
pub const AMOUNT_MAX: f64 = 300.0;

/// Which paths a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelector {
    /// A single non-entry path (including the witness list itself).
    Path(FieldPath),
    /// One field of every witness entry.
    EachWitness(WitnessField),
}

impl FieldSelector {
    #[must_use]
    pub fn matches(self, path: FieldPath) -> bool {
        match (self, path) {
            (Self::Path(target), path) => target == path,
            (Self::EachWitness(field), FieldPath::Witness(_, candidate)) => field == candidate,
            (Self::EachWitness(_), _) => false,
        }
    }
}

/// Inputs a synchronous check can read.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub record: &'a Record,
    pub constraints: DerivedConstraints,
    /// Allowed category values; `None` while options are unknown or empty.
    pub allowed_categories: Option<&'a [String]>,
}

impl RuleContext<'_> {
    fn witness_field(&self, path: FieldPath) -> Option<&str> {
        let FieldPath::Witness(index, field) = path else {
            return None;
        };
        let witness = self.record.witnesses.get(index)?;
        Some(match field {
            WitnessField::Name => witness.name.as_str(),
            WitnessField::Email => witness.email.as_str(),
        })
    }
}

/// Synchronous check: `(context, rule, path) -> result`.
pub type SyncCheck = fn(&RuleContext<'_>, &Rule, FieldPath) -> ValidationResult;

/// Remote checks the model knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncCheck {
    /// The email must not already be registered.
    EmailUniqueness,
}

#[derive(Clone, Copy)]
pub enum RuleCheck {
    Sync(SyncCheck),
    Async(AsyncCheck),
}

impl std::fmt::Debug for RuleCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Sync(..)"),
            Self::Async(check) => f.debug_tuple("Async").field(check).finish(),
        }
    }
}

/// One declarative rule.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub field: FieldSelector,
    pub name: &'static str,
    pub kind: ErrorKind,
    pub code: &'static str,
    /// Message template; `{min}`, `{max}` and `{actual}` are interpolated.
    pub message: &'static str,
    pub check: RuleCheck,
}

impl Rule {
    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self.check, RuleCheck::Async(_))
    }

    fn field_error(&self, error: &ValidationError) -> FieldError {
        FieldError::new(self.kind, self.code, error.format_message())
    }
}

/// Outcome of validating one path synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathVerdict {
    /// Every sync rule passed and no async rule applies.
    Valid,
    /// A sync rule failed.
    Invalid(FieldError),
    /// Every sync rule passed; the async rule must decide.
    NeedsAsync(AsyncCheck),
}

impl PathVerdict {
    #[must_use]
    pub fn error(&self) -> Option<&FieldError> {
        match self {
            Self::Invalid(error) => Some(error),
            _ => None,
        }
    }
}

/// Result of a full synchronous pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub errors: ErrorMap,
    /// Paths whose sync rules passed and that still need an async check.
    pub async_requests: Vec<(FieldPath, AsyncCheck)>,
}

/// An ordered rule set.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    rules: Vec<Rule>,
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::claim_form()
    }
}

impl SchemaValidator {
    /// Build a validator from an explicit rule list.
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The rule set of the damage-claim form.
    #[must_use]
    pub fn claim_form() -> Self {
        Self::new(claim_form_rules())
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules that apply to `path`, in declaration order.
    pub fn rules_for(&self, path: FieldPath) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |rule| rule.field.matches(path))
    }

    /// Validate one path.
    #[must_use]
    pub fn validate_path(&self, ctx: &RuleContext<'_>, path: FieldPath) -> PathVerdict {
        let mut pending_async = None;
        for rule in self.rules_for(path) {
            match rule.check {
                RuleCheck::Sync(check) => {
                    if let ValidationResult::Invalid(error) = check(ctx, rule, path) {
                        return PathVerdict::Invalid(rule.field_error(&error));
                    }
                }
                RuleCheck::Async(kind) => {
                    pending_async.get_or_insert(kind);
                }
            }
        }
        pending_async.map_or(PathVerdict::Valid, PathVerdict::NeedsAsync)
    }

    /// Every path the record currently has, in path order.
    #[must_use]
    pub fn paths(record: &Record) -> Vec<FieldPath> {
        let mut paths: Vec<FieldPath> = FieldPath::SCALARS.to_vec();
        paths.push(FieldPath::Witnesses);
        for index in 0..record.witnesses.len() {
            for field in WitnessField::ALL {
                paths.push(FieldPath::Witness(index, field));
            }
        }
        paths
    }

    /// Validate every path synchronously.
    #[must_use]
    pub fn validate_all(&self, ctx: &RuleContext<'_>) -> SyncReport {
        let mut report = SyncReport::default();
        for path in Self::paths(ctx.record) {
            match self.validate_path(ctx, path) {
                PathVerdict::Valid => {}
                PathVerdict::Invalid(error) => {
                    report.errors.insert(path, error);
                }
                PathVerdict::NeedsAsync(kind) => report.async_requests.push((path, kind)),
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Claim form rules
// ---------------------------------------------------------------------------

fn claim_form_rules() -> Vec<Rule> {
    vec![
        Rule {
            field: FieldSelector::Path(FieldPath::Amount),
            name: "amount_required",
            kind: ErrorKind::Structural,
            code: ERROR_CODE_REQUIRED,
            message: "Amount is required",
            check: RuleCheck::Sync(amount_present),
        },
        Rule {
            field: FieldSelector::Path(FieldPath::Amount),
            name: "amount_range",
            kind: ErrorKind::Range,
            code: ERROR_CODE_RANGE,
            message: "Amount must be between 0 and 300",
            check: RuleCheck::Sync(amount_in_range),
        },
        Rule {
            field: FieldSelector::Path(FieldPath::DamagedParts),
            name: "damaged_parts_min",
            kind: ErrorKind::Structural,
            code: ERROR_CODE_MIN_ITEMS,
            message: "Please select at least one damaged part.",
            check: RuleCheck::Sync(parts_selected),
        },
        Rule {
            field: FieldSelector::Path(FieldPath::Allocation),
            name: "allocation_range",
            kind: ErrorKind::Range,
            code: ERROR_CODE_RANGE,
            message: "Allocation must be between 0 and {max}",
            check: RuleCheck::Sync(allocation_in_range),
        },
        Rule {
            field: FieldSelector::Path(FieldPath::Category),
            name: "category_required",
            kind: ErrorKind::Structural,
            code: ERROR_CODE_REQUIRED,
            message: "Category is required",
            check: RuleCheck::Sync(category_present),
        },
        Rule {
            field: FieldSelector::Path(FieldPath::Category),
            name: "category_known",
            kind: ErrorKind::Format,
            code: ERROR_CODE_ONE_OF,
            message: "Please select a valid category",
            check: RuleCheck::Sync(category_known),
        },
        Rule {
            field: FieldSelector::Path(FieldPath::Witnesses),
            name: "witnesses_min",
            kind: ErrorKind::Structural,
            code: ERROR_CODE_MIN_ITEMS,
            message: "At least one witness is required",
            check: RuleCheck::Sync(witnesses_at_least_one),
        },
        Rule {
            field: FieldSelector::Path(FieldPath::Witnesses),
            name: "witnesses_max",
            kind: ErrorKind::Structural,
            code: ERROR_CODE_MAX_ITEMS,
            message: "No more than 5 witnesses allowed",
            check: RuleCheck::Sync(witnesses_at_most_five),
        },
        Rule {
            field: FieldSelector::EachWitness(WitnessField::Name),
            name: "witness_name_required",
            kind: ErrorKind::Structural,
            code: ERROR_CODE_REQUIRED,
            message: "Name is required",
            check: RuleCheck::Sync(witness_text_present),
        },
        Rule {
            field: FieldSelector::EachWitness(WitnessField::Email),
            name: "witness_email_required",
            kind: ErrorKind::Structural,
            code: ERROR_CODE_REQUIRED,
            message: "Email is required",
            check: RuleCheck::Sync(witness_text_present),
        },
        Rule {
            field: FieldSelector::EachWitness(WitnessField::Email),
            name: "witness_email_format",
            kind: ErrorKind::Format,
            code: ERROR_CODE_EMAIL,
            message: "Invalid email",
            check: RuleCheck::Sync(witness_email_well_formed),
        },
        Rule {
            field: FieldSelector::EachWitness(WitnessField::Email),
            name: "witness_email_unique",
            kind: ErrorKind::Remote,
            code: ERROR_CODE_REMOTE,
            message: "Email already exists",
            check: RuleCheck::Async(AsyncCheck::EmailUniqueness),
        },
    ]
}

fn amount_present(ctx: &RuleContext<'_>, rule: &Rule, _: FieldPath) -> ValidationResult {
    match ctx.record.amount {
        Some(_) => ValidationResult::Valid,
        None => ValidationResult::Invalid(ValidationError::new(ERROR_CODE_REQUIRED, rule.message)),
    }
}

fn amount_in_range(ctx: &RuleContext<'_>, rule: &Rule, _: FieldPath) -> ValidationResult {
    match ctx.record.amount {
        Some(amount) => Range::new(0.0, AMOUNT_MAX)
            .with_message(rule.message)
            .validate(&amount),
        None => ValidationResult::Valid,
    }
}

fn parts_selected(ctx: &RuleContext<'_>, rule: &Rule, _: FieldPath) -> ValidationResult {
    ItemCount::at_least(1)
        .too_few_message(rule.message)
        .validate(&ctx.record.damaged_parts.len())
}

fn allocation_in_range(ctx: &RuleContext<'_>, rule: &Rule, _: FieldPath) -> ValidationResult {
    match ctx.record.allocation {
        Some(allocation) => Range::new(0.0, ctx.constraints.allocation_max)
            .with_message(rule.message)
            .validate(&allocation),
        None => ValidationResult::Valid,
    }
}

fn category_present(ctx: &RuleContext<'_>, rule: &Rule, _: FieldPath) -> ValidationResult {
    Required::new()
        .with_message(rule.message)
        .validate(ctx.record.category.as_str())
}

fn category_known(ctx: &RuleContext<'_>, rule: &Rule, _: FieldPath) -> ValidationResult {
    match ctx.allowed_categories {
        Some(allowed) => OneOf::new(allowed)
            .with_message(rule.message)
            .validate(ctx.record.category.as_str()),
        None => ValidationResult::Valid,
    }
}

fn witnesses_at_least_one(ctx: &RuleContext<'_>, rule: &Rule, _: FieldPath) -> ValidationResult {
    ItemCount::at_least(crate::field_array::MIN_WITNESSES)
        .too_few_message(rule.message)
        .validate(&ctx.record.witnesses.len())
}

fn witnesses_at_most_five(ctx: &RuleContext<'_>, rule: &Rule, _: FieldPath) -> ValidationResult {
    ItemCount::between(0, crate::field_array::MAX_WITNESSES)
        .too_many_message(rule.message)
        .validate(&ctx.record.witnesses.len())
}

fn witness_text_present(ctx: &RuleContext<'_>, rule: &Rule, path: FieldPath) -> ValidationResult {
    let value = ctx.witness_field(path).unwrap_or_default();
    Required::new().with_message(rule.message).validate(value)
}

fn witness_email_well_formed(
    ctx: &RuleContext<'_>,
    rule: &Rule,
    path: FieldPath,
) -> ValidationResult {
    // Emptiness is reported by the required rule; Email lets it through.
    let value = ctx.witness_field(path).unwrap_or_default();
    Email::new().with_message(rule.message).validate(value)
}
