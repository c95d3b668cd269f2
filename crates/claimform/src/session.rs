#![forbid(unsafe_code)]

//! A mounted form: model plus effect executor plus submission sink.

use std::fmt;
use std::time::Duration;

use web_time::Instant;

use crate::effects::{Effects, Inbound};
use crate::error::{SinkError, SubmitError};
use crate::model::{FormModel, FormStatus};
use crate::record::Record;

/// Receives a record that passed validation.
pub trait SubmissionSink {
    fn submit(&mut self, record: &Record) -> Result<(), SinkError>;
}

/// Sink that logs the submitted record as JSON.
#[derive(Debug, Default)]
pub struct LogSink {
    submitted: Vec<String>,
}

impl LogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON of every record submitted so far.
    #[must_use]
    pub fn submitted(&self) -> &[String] {
        &self.submitted
    }
}

impl SubmissionSink for LogSink {
    fn submit(&mut self, record: &Record) -> Result<(), SinkError> {
        let json = record.to_json()?;
        tracing::info!(form_data = %json, "form submitted");
        self.submitted.push(json);
        Ok(())
    }
}

/// What one [`FormSession::pump_at`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Uniqueness checks handed to the executor.
    pub dispatched: usize,
    /// Answers that changed the model.
    pub applied: usize,
    /// Answers dropped as stale or orphaned.
    pub discarded: usize,
    /// Category payloads received (successful or not).
    pub categories: usize,
}

/// Owns a [`FormModel`] and drives its remote calls through an executor.
pub struct FormSession<E> {
    model: FormModel,
    effects: E,
    mounted: bool,
}

impl<E: fmt::Debug> fmt::Debug for FormSession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormSession")
            .field("revision", &self.model.revision())
            .field("status", &self.model.status())
            .field("effects", &self.effects)
            .field("mounted", &self.mounted)
            .finish()
    }
}

impl<E: Effects> FormSession<E> {
    #[must_use]
    pub fn new(model: FormModel, effects: E) -> Self {
        Self {
            model,
            effects,
            mounted: false,
        }
    }

    /// Start the category fetch. Calling it again does nothing.
    pub fn mount(&mut self) {
        if self.mounted {
            return;
        }
        self.mounted = true;
        self.effects.fetch_categories();
        tracing::debug!("form mounted, category fetch started");
    }

    #[must_use]
    pub fn model(&self) -> &FormModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut FormModel {
        &mut self.model
    }

    #[must_use]
    pub fn effects(&self) -> &E {
        &self.effects
    }

    /// Apply every answer that has arrived, then dispatch the checks due at
    /// `now`.
    pub fn pump_at(&mut self, now: Instant) -> PumpReport {
        let inbound = self.effects.drain();
        let mut report = self.apply_all(inbound, now);
        self.dispatch_due(now, &mut report);
        report
    }

    /// Like [`Self::pump_at`], but waits up to `timeout` for an answer first.
    pub fn pump_blocking(&mut self, timeout: Duration) -> PumpReport {
        let inbound = self.effects.wait(timeout);
        let now = Instant::now();
        let mut report = self.apply_all(inbound, now);
        self.dispatch_due(now, &mut report);
        report
    }

    /// Pump until nothing is scheduled or outstanding, or until `limit`
    /// elapses. Returns the resulting status.
    pub fn settle(&mut self, limit: Duration) -> FormStatus {
        let started = Instant::now();
        loop {
            self.pump_at(Instant::now());
            let idle = self.effects.outstanding() == 0 && self.model.next_deadline().is_none();
            if idle || started.elapsed() >= limit {
                break;
            }
            let wait = self
                .model
                .next_deadline()
                .map_or(limit, |due| due.saturating_duration_since(Instant::now()))
                .clamp(Duration::from_millis(1), Duration::from_millis(50));
            let inbound = self.effects.wait(wait);
            self.apply_all(inbound, Instant::now());
        }
        self.model.status()
    }

    fn dispatch_due(&mut self, now: Instant, report: &mut PumpReport) {
        for ticket in self.model.tick_at(now) {
            report.dispatched += 1;
            self.effects.check_uniqueness(ticket);
        }
    }

    fn apply_all(&mut self, inbound: Vec<Inbound>, now: Instant) -> PumpReport {
        let mut report = PumpReport::default();
        for message in inbound {
            match message {
                Inbound::Categories(Ok(records)) => {
                    report.categories += 1;
                    self.model.set_category_options_at(records, now);
                }
                Inbound::Categories(Err(err)) => {
                    report.categories += 1;
                    tracing::warn!(%err, "category options unavailable");
                }
                Inbound::Uniqueness { ticket, outcome } => {
                    if self.model.resolve_check_at(&ticket, outcome, now) {
                        report.applied += 1;
                    } else {
                        report.discarded += 1;
                    }
                }
            }
        }
        report
    }

    /// Submit at the current time. See [`Self::submit_at`].
    pub fn submit(&mut self, sink: &mut dyn SubmissionSink) -> Result<Record, SubmitError> {
        self.submit_at(Instant::now(), sink)
    }

    /// Validate and, if the record may be submitted, hand it to `sink`.
    ///
    /// Checks still debouncing are dispatched right away, so a later call
    /// can succeed once they are answered.
    pub fn submit_at(
        &mut self,
        now: Instant,
        sink: &mut dyn SubmissionSink,
    ) -> Result<Record, SubmitError> {
        let result = self.model.submit_at(now);
        let mut report = PumpReport::default();
        self.dispatch_due(now, &mut report);
        let record = result?;
        sink.submit(&record).map_err(|err| {
            tracing::warn!(%err, "submission sink failed");
            SubmitError::Sink(err)
        })?;
        Ok(record)
    }

    /// Cancel every outstanding check.
    pub fn teardown(&mut self) {
        self.model.teardown();
    }

    /// Hand back the model.
    #[must_use]
    pub fn into_model(self) -> FormModel {
        self.model
    }
}
