#![forbid(unsafe_code)]

//! The authoritative form model.
//!
//! [`FormModel`] owns the record and everything derived from it: field
//! identities for the witness list, cross-field constraints, the error map,
//! touched/dirty bookkeeping, category options and the uniqueness check
//! coordinator. Every mutation goes through it and runs the same pipeline:
//!
//! ```text
//! mutate -> recompute constraints (declared sources only) -> sync rules
//!        -> request/cancel async checks -> merge remote statuses -> revision++
//! ```
//!
//! Remote checks are not executed here. [`FormModel::tick_at`] hands out the
//! checks that are due as tickets; the owner runs them and reports back with
//! [`FormModel::resolve_check_at`]. Tokens inside the tickets decide whether
//! an answer is still wanted.
//!
//! ```rust
//! use claimform::{FieldPath, FieldValue, FormConfig, FormModel, FormStatus, Record};
//! use claimform::{CheckOutcome, Witness};
//! use web_time::{Duration, Instant};
//!
//! let t0 = Instant::now();
//! let mut record = Record::blank();
//! record.amount = Some(120.0);
//! record.damaged_parts.insert("roof".parse().unwrap());
//! record.category = "beauty".into();
//! record.witnesses = vec![Witness::new("Ann", "ann@example.com")];
//!
//! let mut model = FormModel::new_at(record, FormConfig::default(), t0);
//! assert_eq!(model.status(), FormStatus::Pending);
//!
//! let due = t0 + Duration::from_millis(500);
//! let tickets = model.tick_at(due);
//! assert_eq!(tickets.len(), 1);
//! model.resolve_check_at(&tickets[0], CheckOutcome::Passed, due);
//! assert_eq!(model.status(), FormStatus::Valid);
//!
//! model.set_field(FieldPath::Allocation, FieldValue::number(200.0)).unwrap();
//! assert_eq!(
//!     model.error(FieldPath::Allocation).map(|e| e.message.as_str()),
//!     Some("Allocation must be between 0 and 120")
//! );
//! ```

use std::collections::BTreeSet;

use claimform_validation::{
    AsyncStatus, AsyncValidationCoordinator, CheckOutcome, CheckTicket, ERROR_CODE_REMOTE,
    ERROR_CODE_REMOTE_UNAVAILABLE, RequestOutcome, ValidationTrace,
};
use web_time::Instant;

use crate::config::FormConfig;
use crate::constraints::{ConstraintEngine, DerivedConstraints};
use crate::error::{ErrorKind, ErrorMap, FieldError, FormError, SubmitError};
use crate::field_array::{ArrayError, WitnessArray, WitnessId};
use crate::options::{CategoryOptions, CategoryRecord, ChoiceOption};
use crate::path::{FieldPath, WitnessField};
use crate::record::{FieldValue, Record, ValueKind, Witness};
use crate::schema::{RuleContext, SchemaValidator};

/// Overall validity of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormStatus {
    /// No errors and nothing outstanding.
    Valid,
    /// No errors yet, but uniqueness checks are outstanding.
    Pending,
    /// At least one path has an error.
    Invalid,
}

/// Identity used for touched tracking; entries are tracked by id, not index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum TrackKey {
    Field(FieldPath),
    Entry(WitnessId, WitnessField),
}

/// Authoritative record plus validation and bookkeeping state.
#[derive(Debug)]
pub struct FormModel {
    config: FormConfig,
    record: Record,
    initial: Record,
    initial_ids: Vec<WitnessId>,
    witnesses: WitnessArray,
    constraints: ConstraintEngine,
    schema: SchemaValidator,
    options: CategoryOptions,
    allowed_categories: Option<Vec<String>>,
    coordinator: AsyncValidationCoordinator<WitnessId>,
    /// Entries whose sync rules passed and whose email needs the remote check.
    awaiting: Vec<WitnessId>,
    sync_errors: ErrorMap,
    errors: ErrorMap,
    touched: BTreeSet<TrackKey>,
    revision: u64,
    torn_down: bool,
}

impl FormModel {
    /// Build a model from `initial` and run a full validation pass.
    #[must_use]
    pub fn new(initial: Record, config: FormConfig) -> Self {
        Self::new_at(initial, config, Instant::now())
    }

    /// Build a model at `now` (uniqueness checks for the initial emails are
    /// scheduled relative to it).
    #[must_use]
    pub fn new_at(initial: Record, config: FormConfig, now: Instant) -> Self {
        let witnesses = WitnessArray::with_len(initial.witnesses.len());
        let coordinator = AsyncValidationCoordinator::new_at(config.coordinator(), now);
        let mut model = Self {
            constraints: ConstraintEngine::new(&initial),
            initial_ids: witnesses.ids().to_vec(),
            witnesses,
            schema: SchemaValidator::claim_form(),
            options: CategoryOptions::NotLoaded,
            allowed_categories: None,
            coordinator,
            awaiting: Vec::new(),
            sync_errors: ErrorMap::new(),
            errors: ErrorMap::new(),
            touched: BTreeSet::new(),
            revision: 0,
            torn_down: false,
            record: initial.clone(),
            initial,
            config,
        };
        model.revalidate(now);
        tracing::debug!(
            witnesses = model.witnesses.len(),
            errors = model.errors.len(),
            "form model created"
        );
        model
    }

    #[must_use]
    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Field access
    // -----------------------------------------------------------------------

    /// Assign `value` to `path` at the current time.
    pub fn set_field(&mut self, path: FieldPath, value: FieldValue) -> Result<(), FormError> {
        self.set_field_at(path, value, Instant::now())
    }

    /// Assign `value` to `path` at `now`.
    ///
    /// The value must have the shape of the field, numbers must be finite,
    /// `allocation` cannot be written while it is disabled, and the witness
    /// list itself is only changed through [`Self::append_witness`] and
    /// [`Self::remove_witness`]. Rejected writes change nothing.
    pub fn set_field_at(
        &mut self,
        path: FieldPath,
        value: FieldValue,
        now: Instant,
    ) -> Result<(), FormError> {
        let mismatch = |expected: ValueKind, value: &FieldValue| FormError::TypeMismatch {
            path,
            expected,
            found: value.kind(),
        };

        match (path, value) {
            (FieldPath::Witnesses, _) => return Err(FormError::NotAssignable(path)),
            (FieldPath::Amount | FieldPath::Allocation, FieldValue::Number(number)) => {
                if number.is_some_and(|n| !n.is_finite()) {
                    return Err(FormError::NonFinite(path));
                }
                if path == FieldPath::Allocation {
                    if self.constraints.current().allocation_disabled {
                        return Err(FormError::Disabled(path));
                    }
                    self.record.allocation = number;
                } else {
                    self.record.amount = number;
                }
            }
            (FieldPath::DamagedParts, FieldValue::Parts(parts)) => {
                self.record.damaged_parts = parts;
            }
            (FieldPath::Category, FieldValue::Text(text)) => self.record.category = text,
            (FieldPath::Witness(index, field), FieldValue::Text(text)) => {
                let witness = self
                    .record
                    .witnesses
                    .get_mut(index)
                    .ok_or(FormError::UnknownPath(path))?;
                match field {
                    WitnessField::Name => witness.name = text,
                    WitnessField::Email => witness.email = text,
                }
            }
            (FieldPath::Amount | FieldPath::Allocation, other) => {
                return Err(mismatch(ValueKind::Number, &other));
            }
            (FieldPath::DamagedParts, other) => return Err(mismatch(ValueKind::Parts, &other)),
            (FieldPath::Category | FieldPath::Witness(..), other) => {
                if let FieldPath::Witness(index, _) = path
                    && index >= self.record.witnesses.len()
                {
                    return Err(FormError::UnknownPath(path));
                }
                return Err(mismatch(ValueKind::Text, &other));
            }
        }

        let affected = self.constraints.on_change(path, &self.record);
        self.revalidate(now);
        self.bump();
        tracing::debug!(
            path = %path,
            affected = ?affected,
            revision = self.revision,
            errors = self.errors.len(),
            "field updated"
        );
        Ok(())
    }

    /// Assign `value` to a dotted path such as `witnesses.1.email`.
    ///
    /// Fails with [`FormError::InvalidPath`] if the string names no field;
    /// otherwise behaves like [`Self::set_field`].
    pub fn set_field_str(&mut self, path: &str, value: FieldValue) -> Result<(), FormError> {
        let path: FieldPath = path.parse()?;
        self.set_field(path, value)
    }

    /// Current value at `path`.
    pub fn get_field(&self, path: FieldPath) -> Result<FieldValue, FormError> {
        Ok(match path {
            FieldPath::Amount => FieldValue::Number(self.record.amount),
            FieldPath::DamagedParts => FieldValue::Parts(self.record.damaged_parts.clone()),
            FieldPath::Allocation => FieldValue::Number(self.record.allocation),
            FieldPath::Category => FieldValue::Text(self.record.category.clone()),
            FieldPath::Witnesses => return Err(FormError::NotAssignable(path)),
            FieldPath::Witness(index, field) => {
                let witness = self
                    .record
                    .witnesses
                    .get(index)
                    .ok_or(FormError::UnknownPath(path))?;
                FieldValue::Text(match field {
                    WitnessField::Name => witness.name.clone(),
                    WitnessField::Email => witness.email.clone(),
                })
            }
        })
    }

    /// A copy of the full record.
    #[must_use]
    pub fn snapshot(&self) -> Record {
        self.record.clone()
    }

    /// Borrow the record.
    #[must_use]
    pub fn record(&self) -> &Record {
        &self.record
    }

    // -----------------------------------------------------------------------
    // Touched / dirty
    // -----------------------------------------------------------------------

    fn track_key(&self, path: FieldPath) -> Result<TrackKey, FormError> {
        match path {
            FieldPath::Witness(index, field) => self
                .witnesses
                .id_at(index)
                .map(|id| TrackKey::Entry(id, field))
                .ok_or(FormError::UnknownPath(path)),
            other => Ok(TrackKey::Field(other)),
        }
    }

    fn key_path(&self, key: TrackKey) -> Option<FieldPath> {
        match key {
            TrackKey::Field(path) => Some(path),
            TrackKey::Entry(id, field) => self
                .witnesses
                .index_of(id)
                .map(|index| FieldPath::Witness(index, field)),
        }
    }

    /// Mark `path` as touched (the user has interacted with it).
    pub fn mark_touched(&mut self, path: FieldPath) -> Result<(), FormError> {
        let key = self.track_key(path)?;
        if self.touched.insert(key) {
            self.bump();
        }
        Ok(())
    }

    #[must_use]
    pub fn is_touched(&self, path: FieldPath) -> bool {
        self.track_key(path)
            .is_ok_and(|key| self.touched.contains(&key))
    }

    /// Touched paths at their current indices, in path order.
    #[must_use]
    pub fn touched_fields(&self) -> Vec<FieldPath> {
        let mut paths: Vec<FieldPath> = self
            .touched
            .iter()
            .filter_map(|key| self.key_path(*key))
            .collect();
        paths.sort();
        paths
    }

    /// Whether `path` differs from the initial snapshot.
    ///
    /// Entries are compared with the initial entry of the same identity;
    /// appended entries are compared with a blank entry. The witness list is
    /// dirty when entries were added or removed.
    #[must_use]
    pub fn is_dirty(&self, path: FieldPath) -> bool {
        match path {
            FieldPath::Amount => self.record.amount != self.initial.amount,
            FieldPath::DamagedParts => self.record.damaged_parts != self.initial.damaged_parts,
            FieldPath::Allocation => self.record.allocation != self.initial.allocation,
            FieldPath::Category => self.record.category != self.initial.category,
            FieldPath::Witnesses => self.witnesses.ids() != self.initial_ids.as_slice(),
            FieldPath::Witness(index, field) => {
                let (Some(id), Some(current)) =
                    (self.witnesses.id_at(index), self.record.witnesses.get(index))
                else {
                    return false;
                };
                let blank = Witness::default();
                let initial = self
                    .initial_ids
                    .iter()
                    .position(|&candidate| candidate == id)
                    .and_then(|i| self.initial.witnesses.get(i))
                    .unwrap_or(&blank);
                match field {
                    WitnessField::Name => current.name != initial.name,
                    WitnessField::Email => current.email != initial.email,
                }
            }
        }
    }

    /// Dirty paths, in path order.
    #[must_use]
    pub fn dirty_fields(&self) -> Vec<FieldPath> {
        SchemaValidator::paths(&self.record)
            .into_iter()
            .filter(|path| self.is_dirty(*path))
            .collect()
    }

    /// No field touched and no field dirty.
    #[must_use]
    pub fn is_pristine(&self) -> bool {
        self.touched.is_empty() && self.dirty_fields().is_empty()
    }

    /// Forget touched state and take the current record as the new baseline.
    pub fn reset_tracking(&mut self) {
        self.touched.clear();
        self.initial = self.record.clone();
        self.initial_ids = self.witnesses.ids().to_vec();
        self.bump();
    }

    // -----------------------------------------------------------------------
    // Errors and status
    // -----------------------------------------------------------------------

    /// The current error map (sync errors merged with remote verdicts).
    #[must_use]
    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    #[must_use]
    pub fn error(&self, path: FieldPath) -> Option<&FieldError> {
        self.errors.get(path)
    }

    #[must_use]
    pub fn constraints(&self) -> DerivedConstraints {
        self.constraints.current()
    }

    /// Whether `path` can currently be written.
    #[must_use]
    pub fn is_enabled(&self, path: FieldPath) -> bool {
        match path {
            FieldPath::Allocation => !self.constraints.current().allocation_disabled,
            FieldPath::Witnesses => false,
            _ => true,
        }
    }

    fn is_awaiting(&self, id: WitnessId) -> bool {
        // Fail closed: an entry that needs a check but has none is unresolved.
        self.awaiting.contains(&id)
            && self
                .coordinator
                .status(&id)
                .is_none_or(AsyncStatus::is_pending)
    }

    /// Email paths whose uniqueness check is outstanding, in path order.
    #[must_use]
    pub fn pending_paths(&self) -> Vec<FieldPath> {
        self.witnesses
            .ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| self.is_awaiting(**id))
            .map(|(index, _)| FieldPath::witness_email(index))
            .collect()
    }

    #[must_use]
    pub fn status(&self) -> FormStatus {
        if !self.errors.is_empty() {
            FormStatus::Invalid
        } else if self.witnesses.ids().iter().any(|id| self.is_awaiting(*id)) {
            FormStatus::Pending
        } else {
            FormStatus::Valid
        }
    }

    /// Uniqueness status of the email at `index`, if a check was requested.
    #[must_use]
    pub fn email_status(&self, index: usize) -> Option<&AsyncStatus> {
        let id = self.witnesses.id_at(index)?;
        if !self.awaiting.contains(&id) {
            return None;
        }
        self.coordinator.status(&id)
    }

    /// Increments on every observable change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    // -----------------------------------------------------------------------
    // Witness list
    // -----------------------------------------------------------------------

    /// Stable identities of the witness entries, in index order.
    #[must_use]
    pub fn witness_ids(&self) -> &[WitnessId] {
        self.witnesses.ids()
    }

    #[must_use]
    pub fn witness_count(&self) -> usize {
        self.witnesses.len()
    }

    /// Current index of entry `id`.
    #[must_use]
    pub fn witness_index(&self, id: WitnessId) -> Option<usize> {
        self.witnesses.index_of(id)
    }

    /// Append a blank witness entry. Returns its index.
    pub fn append_witness(&mut self) -> Result<usize, ArrayError> {
        self.append_witness_at(Instant::now())
    }

    pub fn append_witness_at(&mut self, now: Instant) -> Result<usize, ArrayError> {
        let id = self
            .witnesses
            .append(&mut self.record.witnesses, Witness::default())
            .inspect_err(|err| tracing::debug!(%err, "append rejected"))?;
        self.revalidate(now);
        self.bump();
        let index = self.witnesses.len() - 1;
        tracing::debug!(%id, index, revision = self.revision, "witness appended");
        Ok(index)
    }

    /// Remove the witness at `index`; later entries move up by one.
    ///
    /// The entry's outstanding uniqueness check is cancelled and any late
    /// answer for it is discarded.
    pub fn remove_witness(&mut self, index: usize) -> Result<Witness, ArrayError> {
        self.remove_witness_at(index, Instant::now())
    }

    pub fn remove_witness_at(
        &mut self,
        index: usize,
        now: Instant,
    ) -> Result<Witness, ArrayError> {
        let (id, entry) = self
            .witnesses
            .remove(&mut self.record.witnesses, index)
            .inspect_err(|err| tracing::debug!(%err, "remove rejected"))?;
        self.coordinator.cancel_at(&id, now);
        self.awaiting.retain(|candidate| *candidate != id);
        self.touched
            .retain(|key| !matches!(key, TrackKey::Entry(entry_id, _) if *entry_id == id));
        self.revalidate(now);
        self.bump();
        tracing::debug!(%id, index, revision = self.revision, "witness removed");
        Ok(entry)
    }

    // -----------------------------------------------------------------------
    // Category options
    // -----------------------------------------------------------------------

    /// Merge category options delivered by the source.
    pub fn set_category_options(&mut self, records: Vec<CategoryRecord>) {
        self.set_category_options_at(records, Instant::now());
    }

    pub fn set_category_options_at(&mut self, records: Vec<CategoryRecord>, now: Instant) {
        self.options = CategoryOptions::from_records(records);
        self.allowed_categories = self.options.allowed_values();
        self.revalidate(now);
        self.bump();
        tracing::debug!(
            options = self.options.options().len(),
            membership_checked = self.allowed_categories.is_some(),
            "category options loaded"
        );
    }

    #[must_use]
    pub fn category_options(&self) -> &[ChoiceOption] {
        self.options.options()
    }

    #[must_use]
    pub fn category_state(&self) -> &CategoryOptions {
        &self.options
    }

    // -----------------------------------------------------------------------
    // Async plumbing
    // -----------------------------------------------------------------------

    /// Uniqueness checks due at `now`. The caller executes them and reports
    /// each answer through [`Self::resolve_check_at`].
    pub fn tick_at(&mut self, now: Instant) -> Vec<CheckTicket<WitnessId>> {
        let before = self.coordinator.stats().cache_hits;
        let tickets = self.coordinator.poll_due(now);
        if self.coordinator.stats().cache_hits != before {
            // Some due checks settled from the cache instead of going out.
            self.merge_async();
            self.bump();
        }
        for ticket in &tickets {
            tracing::debug!(
                id = %ticket.key,
                token = %ticket.token,
                email = %ticket.value,
                "uniqueness check due"
            );
        }
        tickets
    }

    /// Apply an answer at the current time.
    pub fn resolve_check(
        &mut self,
        ticket: &CheckTicket<WitnessId>,
        outcome: CheckOutcome,
    ) -> bool {
        self.resolve_check_at(ticket, outcome, Instant::now())
    }

    /// Apply the answer for `ticket`. Returns `true` if it was still current
    /// and now decides its field; stale and orphaned answers return `false`.
    pub fn resolve_check_at(
        &mut self,
        ticket: &CheckTicket<WitnessId>,
        outcome: CheckOutcome,
        now: Instant,
    ) -> bool {
        if let CheckOutcome::Failed(detail) = &outcome {
            tracing::warn!(
                id = %ticket.key,
                email = %ticket.value,
                %detail,
                "uniqueness check failed"
            );
        }
        let applied = self.coordinator.complete_at(ticket, outcome, now);
        if applied {
            self.merge_async();
            self.bump();
        }
        tracing::debug!(
            id = %ticket.key,
            token = %ticket.token,
            applied,
            revision = self.revision,
            "uniqueness answer received"
        );
        applied
    }

    /// Earliest instant at which [`Self::tick_at`] has work.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.coordinator.next_deadline()
    }

    /// Cancel every outstanding check. Later answers are discarded and no new
    /// checks are requested.
    pub fn teardown(&mut self) {
        self.teardown_at(Instant::now());
    }

    pub fn teardown_at(&mut self, now: Instant) {
        self.coordinator.cancel_all_at(now);
        self.torn_down = true;
        self.merge_async();
        self.bump();
        tracing::debug!("form model torn down");
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// The uniqueness coordinator (read-only; stats and status).
    #[must_use]
    pub fn coordinator(&self) -> &AsyncValidationCoordinator<WitnessId> {
        &self.coordinator
    }

    /// Coordinator event trace.
    #[must_use]
    pub fn validation_trace(&self) -> &ValidationTrace {
        self.coordinator.trace()
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate everything and return the record if it may be submitted.
    pub fn submit(&mut self) -> Result<Record, SubmitError> {
        self.submit_at(Instant::now())
    }

    /// Validate everything at `now`.
    ///
    /// Every current path is marked touched. Checks still in their debounce
    /// window are made due immediately, so the next [`Self::tick_at`] issues
    /// them.
    pub fn submit_at(&mut self, now: Instant) -> Result<Record, SubmitError> {
        for path in SchemaValidator::paths(&self.record) {
            if let Ok(key) = self.track_key(path) {
                self.touched.insert(key);
            }
        }
        self.revalidate(now);
        self.coordinator.flush_at(now);
        self.bump();

        let pending = self.pending_paths();
        if !self.errors.is_empty() {
            tracing::info!(
                errors = self.errors.len(),
                pending = pending.len(),
                "submission refused: invalid"
            );
            return Err(SubmitError::Invalid {
                errors: self.errors.clone(),
                pending,
            });
        }
        if !pending.is_empty() {
            tracing::info!(pending = pending.len(), "submission deferred: checks pending");
            return Err(SubmitError::Pending { paths: pending });
        }
        tracing::info!(revision = self.revision, "submission accepted");
        Ok(self.snapshot())
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    fn revalidate(&mut self, now: Instant) {
        let report = {
            let ctx = RuleContext {
                record: &self.record,
                constraints: self.constraints.current(),
                allowed_categories: self.allowed_categories.as_deref(),
            };
            self.schema.validate_all(&ctx)
        };

        let mut awaiting = Vec::with_capacity(report.async_requests.len());
        for (index, id) in self.witnesses.ids().iter().copied().enumerate() {
            let path = FieldPath::witness_email(index);
            let needs_check = report.async_requests.iter().any(|(p, _)| *p == path);
            if !needs_check {
                // Empty or malformed: no remote call, drop whatever was pending.
                if self.coordinator.value(&id).is_some() {
                    self.coordinator.cancel_at(&id, now);
                }
                continue;
            }
            awaiting.push(id);
            if self.torn_down {
                continue;
            }
            let Some(witness) = self.record.witnesses.get(index) else {
                continue;
            };
            match self.coordinator.request_at(id, witness.email.trim(), now) {
                RequestOutcome::Unchanged => {}
                RequestOutcome::Scheduled(token) => {
                    tracing::debug!(%id, %token, path = %path, "uniqueness check scheduled");
                }
                RequestOutcome::Joined(token) => {
                    tracing::debug!(%id, %token, path = %path, "waiting on outstanding check");
                }
                RequestOutcome::Cached(status) => {
                    tracing::debug!(
                        %id,
                        path = %path,
                        valid = status.is_valid(),
                        "uniqueness answered from cache"
                    );
                }
            }
        }

        self.awaiting = awaiting;
        self.sync_errors = report.errors;
        self.merge_async();
    }

    /// Rebuild the visible error map from sync errors and remote statuses.
    fn merge_async(&mut self) {
        let mut errors = self.sync_errors.clone();
        for (index, id) in self.witnesses.ids().iter().enumerate() {
            if !self.awaiting.contains(id) {
                continue;
            }
            let error = match self.coordinator.status(id) {
                Some(AsyncStatus::Invalid(message)) => Some(FieldError::new(
                    ErrorKind::Remote,
                    ERROR_CODE_REMOTE,
                    message.clone(),
                )),
                Some(AsyncStatus::Error(message)) => Some(FieldError::new(
                    ErrorKind::Remote,
                    ERROR_CODE_REMOTE_UNAVAILABLE,
                    message.clone(),
                )),
                _ => None,
            };
            if let Some(error) = error {
                errors.insert(FieldPath::witness_email(index), error);
            }
        }
        self.errors = errors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DamagedPart;
    use web_time::Duration;

    const DEBOUNCE: Duration = Duration::from_millis(500);

    fn example() -> Record {
        Record {
            amount: Some(250.0),
            damaged_parts: [DamagedPart::Side, DamagedPart::Rear].into_iter().collect(),
            allocation: Some(140.0),
            category: "kitchen-accessories".into(),
            witnesses: vec![
                Witness::new("Marek", "marek@email.cz"),
                Witness::new("Emily", "emily.johnson@x.dummyjson.com"),
            ],
        }
    }

    fn settle_all(model: &mut FormModel, now: Instant, outcome: CheckOutcome) {
        for ticket in model.tick_at(now) {
            model.resolve_check_at(&ticket, outcome.clone(), now);
        }
    }

    #[test]
    fn initial_example_is_pending_then_valid() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        assert_eq!(model.status(), FormStatus::Pending);
        assert_eq!(
            model.pending_paths(),
            vec![FieldPath::witness_email(0), FieldPath::witness_email(1)]
        );
        assert!(model.tick_at(t0 + Duration::from_millis(499)).is_empty());
        settle_all(&mut model, t0 + DEBOUNCE, CheckOutcome::Passed);
        assert_eq!(model.status(), FormStatus::Valid);
        assert!(model.errors().is_empty());
    }

    #[test]
    fn set_field_rejects_wrong_shapes() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        let revision = model.revision();

        assert_eq!(
            model.set_field_at(FieldPath::Amount, FieldValue::text("12"), t0),
            Err(FormError::TypeMismatch {
                path: FieldPath::Amount,
                expected: ValueKind::Number,
                found: ValueKind::Text,
            })
        );
        assert_eq!(
            model.set_field_at(FieldPath::Amount, FieldValue::number(f64::NAN), t0),
            Err(FormError::NonFinite(FieldPath::Amount))
        );
        assert_eq!(
            model.set_field_at(FieldPath::Witnesses, FieldValue::text(""), t0),
            Err(FormError::NotAssignable(FieldPath::Witnesses))
        );
        assert_eq!(
            model.set_field_at(FieldPath::witness_name(9), FieldValue::text("x"), t0),
            Err(FormError::UnknownPath(FieldPath::witness_name(9)))
        );
        assert_eq!(
            model.set_field_at(FieldPath::witness_name(9), FieldValue::number(1.0), t0),
            Err(FormError::UnknownPath(FieldPath::witness_name(9)))
        );
        assert_eq!(model.revision(), revision);
        assert_eq!(model.snapshot(), example());
    }

    #[test]
    fn allocation_disabled_without_amount() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        model
            .set_field_at(FieldPath::Amount, FieldValue::Number(None), t0)
            .unwrap();
        assert!(model.constraints().allocation_disabled);
        assert!(!model.is_enabled(FieldPath::Allocation));
        assert_eq!(
            model.set_field_at(FieldPath::Allocation, FieldValue::number(10.0), t0),
            Err(FormError::Disabled(FieldPath::Allocation))
        );
        assert_eq!(
            model.error(FieldPath::Amount).map(|e| e.message.as_str()),
            Some("Amount is required")
        );
    }

    #[test]
    fn lowering_amount_flags_allocation_without_clamping() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        model
            .set_field_at(FieldPath::Amount, FieldValue::number(100.0), t0)
            .unwrap();
        assert_eq!(model.record().allocation, Some(140.0));
        let error = model.error(FieldPath::Allocation).unwrap();
        assert_eq!(error.message, "Allocation must be between 0 and 100");
        assert_eq!(error.kind, ErrorKind::Range);

        model
            .set_field_at(FieldPath::Amount, FieldValue::number(200.0), t0)
            .unwrap();
        assert!(model.error(FieldPath::Allocation).is_none());
    }

    #[test]
    fn touched_and_dirty_tracking() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        assert!(model.is_pristine());

        model.mark_touched(FieldPath::witness_name(1)).unwrap();
        model
            .set_field_at(FieldPath::Category, FieldValue::text("beauty"), t0)
            .unwrap();
        assert!(model.is_dirty(FieldPath::Category));
        assert!(!model.is_dirty(FieldPath::Amount));

        // Removing entry 0 moves the touched entry to index 0.
        model.remove_witness_at(0, t0).unwrap();
        assert_eq!(model.touched_fields(), vec![FieldPath::witness_name(0)]);
        assert!(model.is_dirty(FieldPath::Witnesses));
        assert!(!model.is_dirty(FieldPath::witness_name(0)));

        model
            .set_field_at(FieldPath::Category, FieldValue::text("kitchen-accessories"), t0)
            .unwrap();
        assert_eq!(model.dirty_fields(), vec![FieldPath::Witnesses]);

        model.reset_tracking();
        assert!(model.is_pristine());
    }

    #[test]
    fn appended_entry_is_blank_and_invalid() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        let index = model.append_witness_at(t0).unwrap();
        assert_eq!(index, 2);
        assert_eq!(
            model.error(FieldPath::witness_name(2)).map(|e| e.message.as_str()),
            Some("Name is required")
        );
        assert_eq!(
            model.error(FieldPath::witness_email(2)).map(|e| e.message.as_str()),
            Some("Email is required")
        );
        assert!(!model.is_dirty(FieldPath::witness_email(2)));
        assert_eq!(model.status(), FormStatus::Invalid);
    }

    #[test]
    fn array_bounds_are_enforced() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        for _ in 0..3 {
            model.append_witness_at(t0).unwrap();
        }
        assert_eq!(
            model.append_witness_at(t0),
            Err(ArrayError::Full { max: 5 })
        );
        for _ in 0..4 {
            model.remove_witness_at(0, t0).unwrap();
        }
        let revision = model.revision();
        assert_eq!(
            model.remove_witness_at(0, t0),
            Err(ArrayError::AtMinimum { min: 1 })
        );
        assert_eq!(model.witness_count(), 1);
        assert_eq!(model.revision(), revision);
    }

    #[test]
    fn removed_entry_answer_is_discarded() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        let tickets = model.tick_at(t0 + DEBOUNCE);
        assert_eq!(tickets.len(), 2);

        model.remove_witness_at(0, t0 + DEBOUNCE).unwrap();
        assert!(!model.resolve_check_at(&tickets[0], CheckOutcome::Rejected, t0 + DEBOUNCE));
        assert!(model.error(FieldPath::witness_email(0)).is_none());

        assert!(model.resolve_check_at(&tickets[1], CheckOutcome::Passed, t0 + DEBOUNCE));
        assert_eq!(model.status(), FormStatus::Valid);
    }

    #[test]
    fn remote_rejection_and_failure_messages() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        let tickets = model.tick_at(t0 + DEBOUNCE);
        model.resolve_check_at(&tickets[0], CheckOutcome::Rejected, t0 + DEBOUNCE);
        model.resolve_check_at(
            &tickets[1],
            CheckOutcome::Failed("connection reset".into()),
            t0 + DEBOUNCE,
        );

        let taken = model.error(FieldPath::witness_email(0)).unwrap();
        assert_eq!(taken.message, "Email already exists");
        assert_eq!(taken.code, ERROR_CODE_REMOTE);
        let failed = model.error(FieldPath::witness_email(1)).unwrap();
        assert_eq!(failed.message, "Validation error, please try again");
        assert_eq!(failed.code, ERROR_CODE_REMOTE_UNAVAILABLE);
        assert!(matches!(model.submit_at(t0 + DEBOUNCE), Err(SubmitError::Invalid { .. })));
    }

    #[test]
    fn malformed_email_cancels_pending_check() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        model
            .set_field_at(FieldPath::witness_email(0), FieldValue::text("nope"), t0)
            .unwrap();
        assert_eq!(
            model.error(FieldPath::witness_email(0)).map(|e| e.message.as_str()),
            Some("Invalid email")
        );
        let tickets = model.tick_at(t0 + DEBOUNCE);
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].value, "emily.johnson@x.dummyjson.com");
    }

    #[test]
    fn submit_flushes_debounce_and_reports_pending() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        let err = model.submit_at(t0).unwrap_err();
        assert_eq!(
            err,
            SubmitError::Pending {
                paths: vec![FieldPath::witness_email(0), FieldPath::witness_email(1)]
            }
        );
        assert!(model.is_touched(FieldPath::Amount));
        assert!(model.is_touched(FieldPath::witness_email(1)));

        // Flushed: due without waiting for the window.
        settle_all(&mut model, t0, CheckOutcome::Passed);
        let record = model.submit_at(t0).unwrap();
        assert_eq!(record, example());
    }

    #[test]
    fn category_membership_follows_options() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        model.set_category_options_at(Vec::new(), t0);
        assert!(model.error(FieldPath::Category).is_none());

        model.set_category_options_at(vec![CategoryRecord::new("Beauty", "beauty")], t0);
        assert_eq!(
            model.error(FieldPath::Category).map(|e| e.message.as_str()),
            Some("Please select a valid category")
        );
        assert_eq!(model.category_options()[0].label, "Beauty");
    }

    #[test]
    fn teardown_discards_late_answers_and_blocks_submit() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        let tickets = model.tick_at(t0 + DEBOUNCE);
        model.teardown_at(t0 + DEBOUNCE);
        for ticket in &tickets {
            assert!(!model.resolve_check_at(ticket, CheckOutcome::Passed, t0 + DEBOUNCE));
        }
        assert!(model.next_deadline().is_none());
        assert!(matches!(
            model.submit_at(t0 + DEBOUNCE),
            Err(SubmitError::Pending { .. })
        ));
        assert!(model.coordinator().verify_trace().is_ok());
    }

    #[test]
    fn revision_increments_on_observable_changes() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        let r0 = model.revision();
        model
            .set_field_at(FieldPath::witness_name(0), FieldValue::text("Marek K."), t0)
            .unwrap();
        let r1 = model.revision();
        assert!(r1 > r0);
        model.mark_touched(FieldPath::Amount).unwrap();
        let r2 = model.revision();
        assert!(r2 > r1);
        model.mark_touched(FieldPath::Amount).unwrap();
        assert_eq!(model.revision(), r2);
    }

    #[test]
    fn returning_to_in_flight_email_sends_no_second_call() {
        let t0 = Instant::now();
        let mut record = example();
        record.witnesses.truncate(1);
        record.witnesses[0].email = "x@example.com".into();
        let mut model = FormModel::new_at(record, FormConfig::default(), t0);
        let path = FieldPath::witness_email(0);

        let ms = |n| t0 + Duration::from_millis(n);

        let first = model.tick_at(ms(500));
        assert_eq!(first.len(), 1);
        model.set_field_at(path, FieldValue::text("y@example.com"), ms(600)).unwrap();
        model.set_field_at(path, FieldValue::text("x@example.com"), ms(650)).unwrap();

        // The earlier call for x is still out; no second one is sent.
        assert!(model.tick_at(ms(1150)).is_empty());
        assert_eq!(model.pending_paths(), vec![path]);
        assert!(model.resolve_check_at(&first[0], CheckOutcome::Rejected, ms(1200)));
        assert_eq!(
            model.error(path).map(|e| e.message.as_str()),
            Some("Email already exists")
        );
        assert_eq!(model.coordinator().stats().remote_calls, 1);
        assert!(model.coordinator().verify_trace().is_ok());
    }

    #[test]
    fn email_is_checked_trimmed() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        let path = FieldPath::witness_email(1);
        model
            .set_field_at(path, FieldValue::text(" a@b.io "), t0)
            .unwrap();
        model.set_field_at(path, FieldValue::text("a@b.io"), t0).unwrap();

        let tickets = model.tick_at(t0 + DEBOUNCE);
        let values: Vec<&str> = tickets.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, ["marek@email.cz", "a@b.io"]);
        // The record keeps what was typed.
        assert_eq!(model.record().witnesses[1].email, "a@b.io");
    }

    #[test]
    fn set_field_str_parses_dotted_paths() {
        let t0 = Instant::now();
        let mut model = FormModel::new_at(example(), FormConfig::default(), t0);
        model
            .set_field_str("witnesses.1.name", FieldValue::text("Emma"))
            .unwrap();
        assert_eq!(model.record().witnesses[1].name, "Emma");

        let revision = model.revision();
        assert!(matches!(
            model.set_field_str("witnesses.x", FieldValue::text("Emma")),
            Err(FormError::InvalidPath(_))
        ));
        assert!(matches!(
            model.set_field_str("colour", FieldValue::text("red")),
            Err(FormError::InvalidPath(_))
        ));
        assert_eq!(model.revision(), revision);
    }
}
