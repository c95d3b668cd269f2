#![forbid(unsafe_code)]

//! End-to-end scenarios for the claim form.
//!
//! Time is driven explicitly (`*_at` APIs) except in the threaded test.

use std::sync::Arc;
use std::time::Duration;

use claimform::{
    ArrayError, CheckOutcome, DamagedPart, ErrorKind, FieldPath, FieldValue, FormConfig,
    FormModel, FormSession, FormStatus, InMemoryDirectory, InlineEffects, LogSink, Record,
    StaticOptions, SubmitError, ThreadedEffects, Witness, parse_categories,
};
use web_time::Instant;

const DEBOUNCE: Duration = Duration::from_millis(500);

fn initial_record() -> Record {
    Record {
        amount: Some(250.0),
        allocation: Some(140.0),
        damaged_parts: [DamagedPart::Side, DamagedPart::Rear].into_iter().collect(),
        category: "kitchen-accessories".into(),
        witnesses: vec![
            Witness::new("Marek", "marek@email.cz"),
            Witness::new("Emily", "emily.johnson@x.dummyjson.com"),
        ],
    }
}

fn message(model: &FormModel, path: FieldPath) -> Option<&str> {
    model.error(path).map(|e| e.message.as_str())
}

#[test]
fn initial_record_blocked_only_by_uniqueness_checks() {
    let t0 = Instant::now();
    let mut model = FormModel::new_at(initial_record(), FormConfig::default(), t0);

    assert!(model.errors().is_empty(), "{:?}", model.errors());
    assert_eq!(model.status(), FormStatus::Pending);
    assert_eq!(
        model.submit_at(t0),
        Err(SubmitError::Pending {
            paths: vec![FieldPath::witness_email(0), FieldPath::witness_email(1)],
        })
    );

    let tickets = model.tick_at(t0);
    assert_eq!(tickets.len(), 2);
    for ticket in &tickets {
        assert!(model.resolve_check_at(ticket, CheckOutcome::Passed, t0));
    }
    assert_eq!(model.submit_at(t0), Ok(initial_record()));
}

#[test]
fn zero_amount_disables_and_invalidates_allocation() {
    let t0 = Instant::now();
    let mut model = FormModel::new_at(initial_record(), FormConfig::default(), t0);

    model
        .set_field_at(FieldPath::Amount, FieldValue::number(0.0), t0)
        .unwrap();

    assert!(model.constraints().allocation_disabled);
    assert_eq!(model.record().allocation, Some(140.0));
    let error = model.error(FieldPath::Allocation).unwrap();
    assert_eq!(error.kind, ErrorKind::Range);
    assert_eq!(error.message, "Allocation must be between 0 and 0");
    assert!(model.error(FieldPath::Amount).is_none());
}

#[test]
fn sixth_witness_is_rejected_without_touching_data() {
    let t0 = Instant::now();
    let mut record = initial_record();
    record.witnesses = (0..5)
        .map(|i| Witness::new(format!("W{i}"), format!("w{i}@example.com")))
        .collect();
    let mut model = FormModel::new_at(record.clone(), FormConfig::default(), t0);
    let revision = model.revision();

    assert_eq!(model.append_witness_at(t0), Err(ArrayError::Full { max: 5 }));
    assert_eq!(model.snapshot(), record);
    assert_eq!(model.witness_count(), 5);
    assert_eq!(model.revision(), revision);
}

#[test]
fn burst_of_edits_issues_one_call_for_final_value() {
    let t0 = Instant::now();
    let directory = Arc::new(InMemoryDirectory::new());
    let model = FormModel::new_at(initial_record(), FormConfig::default(), t0);
    let effects = InlineEffects::new(Arc::new(StaticOptions::new(Vec::new())), directory.clone());
    let mut session = FormSession::new(model, effects);

    // Let the initial checks go out first.
    session.pump_at(t0 + DEBOUNCE);
    session.pump_at(t0 + DEBOUNCE);
    assert_eq!(directory.call_count(), 2);

    let path = FieldPath::witness_email(0);
    let start = t0 + Duration::from_secs(1);
    for (offset, email) in [(0, "a@example.com"), (150, "ab@example.com"), (300, "abc@example.com")] {
        let now = start + Duration::from_millis(offset);
        session
            .model_mut()
            .set_field_at(path, FieldValue::text(email), now)
            .unwrap();
        session.pump_at(now);
    }
    assert_eq!(directory.call_count(), 2);

    // One window after the last edit.
    let due = start + Duration::from_millis(300) + DEBOUNCE;
    session.pump_at(due - Duration::from_millis(1));
    assert_eq!(directory.call_count(), 2);
    let report = session.pump_at(due);
    assert_eq!(report.dispatched, 1);
    session.pump_at(due);

    assert_eq!(directory.calls()[2..], ["abc@example.com".to_string()]);
    assert_eq!(session.model().status(), FormStatus::Valid);
    assert!(session.model().coordinator().verify_trace().is_ok());
}

#[test]
fn stale_answer_never_overwrites_newer_edit() {
    let t0 = Instant::now();
    let mut model = FormModel::new_at(initial_record(), FormConfig::default(), t0);
    let path = FieldPath::witness_email(1);

    let first = model.tick_at(t0 + DEBOUNCE);
    assert_eq!(first.len(), 2);
    let emily = first[1].clone();

    // Edited while the check for the old value is in flight.
    let edit_at = t0 + DEBOUNCE + Duration::from_millis(10);
    model
        .set_field_at(path, FieldValue::text("emily@example.com"), edit_at)
        .unwrap();

    // The old answer arrives late and says "taken".
    assert!(!model.resolve_check_at(&emily, CheckOutcome::Rejected, edit_at));
    assert!(model.error(path).is_none());
    assert!(model.pending_paths().contains(&path));

    let second = model.tick_at(edit_at + DEBOUNCE);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].value, "emily@example.com");
    assert!(model.resolve_check_at(&second[0], CheckOutcome::Passed, edit_at + DEBOUNCE));
    assert!(model.error(path).is_none());

    // The late rejection was still memoized for its own value.
    model
        .set_field_at(path, FieldValue::text("emily.johnson@x.dummyjson.com"), edit_at + DEBOUNCE)
        .unwrap();
    assert_eq!(message(&model, path), Some("Email already exists"));
}

#[test]
fn removed_entry_result_goes_nowhere() {
    let t0 = Instant::now();
    let mut model = FormModel::new_at(initial_record(), FormConfig::default(), t0);
    let tickets = model.tick_at(t0 + DEBOUNCE);
    let marek = tickets[0].clone();

    model.remove_witness_at(0, t0 + DEBOUNCE).unwrap();
    // Emily is now at index 0.
    assert!(!model.resolve_check_at(&marek, CheckOutcome::Rejected, t0 + DEBOUNCE));
    assert!(model.error(FieldPath::witness_email(0)).is_none());
    assert_eq!(model.pending_paths(), vec![FieldPath::witness_email(0)]);
    assert_eq!(model.coordinator().stats().orphaned, 1);
}

#[test]
fn cached_verdict_settles_without_remote_call() {
    let t0 = Instant::now();
    let directory = Arc::new(InMemoryDirectory::with_known(["marek@email.cz"]));
    let model = FormModel::new_at(initial_record(), FormConfig::default(), t0);
    let effects = InlineEffects::new(Arc::new(StaticOptions::new(Vec::new())), directory.clone());
    let mut session = FormSession::new(model, effects);

    session.pump_at(t0 + DEBOUNCE);
    session.pump_at(t0 + DEBOUNCE);
    assert_eq!(
        message(session.model(), FieldPath::witness_email(0)),
        Some("Email already exists")
    );

    // A new entry with the same literal email is answered from the cache.
    let later = t0 + Duration::from_secs(2);
    let index = session.model_mut().append_witness_at(later).unwrap();
    session
        .model_mut()
        .set_field_at(FieldPath::witness_email(index), FieldValue::text("marek@email.cz"), later)
        .unwrap();
    assert_eq!(
        message(session.model(), FieldPath::witness_email(index)),
        Some("Email already exists")
    );
    session.pump_at(later + DEBOUNCE);
    assert_eq!(directory.call_count(), 2);
}

#[test]
fn remote_failure_blocks_and_is_retried_on_next_edit() {
    let t0 = Instant::now();
    let directory = Arc::new(InMemoryDirectory::new());
    directory.fail_on("marek@email.cz");
    let model = FormModel::new_at(initial_record(), FormConfig::default(), t0);
    let effects = InlineEffects::new(Arc::new(StaticOptions::new(Vec::new())), directory.clone());
    let mut session = FormSession::new(model, effects);

    session.pump_at(t0 + DEBOUNCE);
    session.pump_at(t0 + DEBOUNCE);
    let path = FieldPath::witness_email(0);
    assert_eq!(
        message(session.model(), path),
        Some("Validation error, please try again")
    );
    assert_eq!(session.model().status(), FormStatus::Invalid);
    let mut sink = LogSink::new();
    assert!(matches!(
        session.submit_at(t0 + DEBOUNCE, &mut sink),
        Err(SubmitError::Invalid { .. })
    ));

    // Failures are not cached: editing away and back asks again.
    directory.heal("marek@email.cz");
    let t1 = t0 + Duration::from_secs(2);
    let model = session.model_mut();
    model.set_field_at(path, FieldValue::text("marek@email.c"), t1).unwrap();
    model.set_field_at(path, FieldValue::text("marek@email.cz"), t1).unwrap();
    session.pump_at(t1 + DEBOUNCE);
    session.pump_at(t1 + DEBOUNCE);
    assert!(session.model().error(path).is_none());
    assert_eq!(
        directory.calls().iter().filter(|c| *c == "marek@email.cz").count(),
        2
    );
}

#[test]
fn options_arriving_late_revalidate_category() {
    let t0 = Instant::now();
    let payload = r#"[{"slug":"beauty","name":"Beauty"},{"slug":"fragrances","name":"Fragrances"}]"#;
    let mut model = FormModel::new_at(initial_record(), FormConfig::default(), t0);
    assert!(model.error(FieldPath::Category).is_none());

    let revision = model.revision();
    model.set_category_options_at(parse_categories(payload).unwrap(), t0);
    assert!(model.revision() > revision);
    assert_eq!(message(&model, FieldPath::Category), Some("Please select a valid category"));

    model
        .set_field_at(FieldPath::Category, FieldValue::text("fragrances"), t0)
        .unwrap();
    assert!(model.error(FieldPath::Category).is_none());

    model
        .set_field_at(FieldPath::Category, FieldValue::text(""), t0)
        .unwrap();
    assert_eq!(message(&model, FieldPath::Category), Some("Category is required"));
}

#[test]
fn error_paths_follow_reindexing() {
    let t0 = Instant::now();
    let mut model = FormModel::new_at(initial_record(), FormConfig::default(), t0);
    let index = model.append_witness_at(t0).unwrap();
    assert_eq!(index, 2);
    model
        .set_field_at(FieldPath::witness_name(2), FieldValue::text("Zoe"), t0)
        .unwrap();
    assert_eq!(message(&model, FieldPath::witness_email(2)), Some("Email is required"));

    model.remove_witness_at(0, t0).unwrap();
    assert_eq!(message(&model, FieldPath::witness_email(1)), Some("Email is required"));
    assert!(model.error(FieldPath::witness_email(2)).is_none());
    assert!(model.error(FieldPath::witness_name(1)).is_none());
}

#[test]
fn threaded_session_settles() {
    let directory = Arc::new(
        InMemoryDirectory::with_known(["emily.johnson@x.dummyjson.com"])
            .with_latency(Duration::from_millis(5)),
    );
    let source = StaticOptions::from_json(
        r#"[{"slug":"kitchen-accessories","name":"Kitchen Accessories"}]"#,
    )
    .unwrap();
    let config = FormConfig::default().with_debounce(Duration::from_millis(20));
    let model = FormModel::new(initial_record(), config);
    let mut session = FormSession::new(model, ThreadedEffects::new(Arc::new(source), directory));

    session.mount();
    let status = session.settle(Duration::from_secs(5));

    assert_eq!(status, FormStatus::Invalid);
    assert_eq!(session.model().category_options().len(), 1);
    assert!(session.model().error(FieldPath::Category).is_none());
    assert_eq!(
        message(session.model(), FieldPath::witness_email(1)),
        Some("Email already exists")
    );
    assert!(session.model().error(FieldPath::witness_email(0)).is_none());
}
