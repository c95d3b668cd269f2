#![forbid(unsafe_code)]

//! Debounced async validation with token-based staleness prevention.
//!
//! The coordinator turns "check value X against a remote service" into a
//! debounced, cancellable, cached operation keyed by field identity:
//!
//! - **Debounce**: requests for the same key collapse into one remote call,
//!   fired one window after the last request of a burst.
//! - **Monotonic tokens**: every new value for a key issues a fresh token.
//!   Responses are applied only if their token is still the key's current one.
//! - **Cache**: definitive answers are memoized per literal value for the
//!   coordinator's lifetime. Failures are not memoized.
//! - **Shared calls**: a value already being checked remotely is never sent
//!   again; later requests for it wait on the outstanding call, and its answer
//!   decides every key that wants that value.
//! - **Event tracing**: lifecycle events are recorded in a checksummable trace.
//!
//! The coordinator never performs I/O and never reads the clock on its own:
//! the owner passes `now` into every time-dependent call (the plain variants
//! read `Instant::now()`), polls for due [`CheckTicket`]s, runs them, and
//! reports outcomes back through [`AsyncValidationCoordinator::complete`].
//!
//! ```rust
//! use claimform_validation::async_validation::{
//!     AsyncStatus, AsyncValidationCoordinator, CheckOutcome, CoordinatorConfig,
//! };
//! use std::time::Duration;
//! use web_time::Instant;
//!
//! let t0 = Instant::now();
//! let mut coordinator = AsyncValidationCoordinator::new_at(CoordinatorConfig::default(), t0);
//!
//! coordinator.request_at(7_u64, "a@b.cz", t0);
//! coordinator.request_at(7_u64, "a@b.com", t0 + Duration::from_millis(100));
//!
//! // Nothing is due inside the window.
//! assert!(coordinator.poll_due(t0 + Duration::from_millis(550)).is_empty());
//!
//! let tickets = coordinator.poll_due(t0 + Duration::from_millis(600));
//! assert_eq!(tickets.len(), 1);
//! assert_eq!(tickets[0].value, "a@b.com");
//!
//! coordinator.complete_at(&tickets[0], CheckOutcome::Passed, t0 + Duration::from_millis(700));
//! assert_eq!(coordinator.status(&7), Some(&AsyncStatus::Valid));
//! ```

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use web_time::Instant;

#[inline]
fn duration_since_or_zero(now: Instant, earlier: Instant) -> Duration {
    now.checked_duration_since(earlier).unwrap_or(Duration::ZERO)
}

#[inline]
fn as_nanos_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// ValidationToken
// ---------------------------------------------------------------------------

/// A monotonically increasing token representing a validation request version.
///
/// # Invariants
///
/// - Tokens are strictly monotonic: `token_n < token_{n+1}`
/// - Token 0 is reserved for "no validation"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ValidationToken(u64);

impl ValidationToken {
    /// The null token representing no validation.
    pub const NONE: Self = Self(0);

    /// Create a token from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw token value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if this is the null token.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ValidationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status and outcomes
// ---------------------------------------------------------------------------

/// Validation state of one key as seen by the synchronous pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncStatus {
    /// A check is debouncing or in flight. Blocks submission.
    Pending,
    /// The remote check passed.
    Valid,
    /// The remote check rejected the value.
    Invalid(String),
    /// The remote check could not be completed. Blocks like `Invalid`.
    Error(String),
}

impl AsyncStatus {
    /// Returns `true` while a check is outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns `true` only for a passed check.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// The user-facing message for `Invalid` and `Error`.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Invalid(msg) | Self::Error(msg) => Some(msg),
            Self::Pending | Self::Valid => None,
        }
    }
}

/// Raw answer of a remote check, reported back by the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The value is acceptable.
    Passed,
    /// The value conflicts with remote state.
    Rejected,
    /// The call failed; the detail is for logs, not for users.
    Failed(String),
}

/// A remote check that is due and must be executed by the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTicket<K> {
    /// Field identity the check belongs to.
    pub key: K,
    /// Literal value to check.
    pub value: String,
    /// Token current for `key` when the ticket was issued.
    pub token: ValidationToken,
}

/// Result of [`AsyncValidationCoordinator::request_at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The key already tracks this value; nothing changed.
    Unchanged,
    /// A debounced check was scheduled under the given token.
    Scheduled(ValidationToken),
    /// The value is already being checked remotely; the key waits on that
    /// call under the given token.
    Joined(ValidationToken),
    /// The value was answered from the cache.
    Cached(AsyncStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CachedVerdict {
    Passed,
    Rejected,
}

// ---------------------------------------------------------------------------
// ValidationEvent
// ---------------------------------------------------------------------------

/// An event in the validation lifecycle, recorded for tracing and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationEvent {
    /// A debounced check was scheduled.
    Scheduled {
        token: ValidationToken,
        /// Deadline relative to coordinator creation.
        due_ns: u64,
        elapsed_ns: u64,
    },
    /// A request was answered from the cache without a remote call.
    CacheHit {
        token: ValidationToken,
        is_valid: bool,
        elapsed_ns: u64,
    },
    /// A request attached to the outstanding remote call for its value.
    Joined {
        token: ValidationToken,
        /// Token of the call that carries the value.
        carrier: ValidationToken,
        elapsed_ns: u64,
    },
    /// The remote call for a token was issued.
    Started {
        token: ValidationToken,
        elapsed_ns: u64,
    },
    /// A scheduled or in-flight check was dropped.
    Cancelled {
        token: ValidationToken,
        /// The newer token that superseded this one, if any.
        superseded_by: Option<ValidationToken>,
        elapsed_ns: u64,
    },
    /// A remote answer arrived (may or may not be applied).
    Completed {
        token: ValidationToken,
        is_valid: bool,
        duration_ns: u64,
        elapsed_ns: u64,
    },
    /// A remote answer was written to the key's status.
    Applied {
        token: ValidationToken,
        is_valid: bool,
        elapsed_ns: u64,
    },
    /// A remote answer was discarded because a newer token exists.
    StaleDiscarded {
        token: ValidationToken,
        current_token: ValidationToken,
        elapsed_ns: u64,
    },
    /// A remote answer arrived for a key that no longer exists.
    Orphaned {
        token: ValidationToken,
        elapsed_ns: u64,
    },
}

impl ValidationEvent {
    /// Get the token associated with this event.
    #[must_use]
    pub fn token(&self) -> ValidationToken {
        match self {
            Self::Scheduled { token, .. }
            | Self::CacheHit { token, .. }
            | Self::Joined { token, .. }
            | Self::Started { token, .. }
            | Self::Cancelled { token, .. }
            | Self::Completed { token, .. }
            | Self::Applied { token, .. }
            | Self::StaleDiscarded { token, .. }
            | Self::Orphaned { token, .. } => *token,
        }
    }

    /// Get the event type name for logging.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Scheduled { .. } => "scheduled",
            Self::CacheHit { .. } => "cache_hit",
            Self::Joined { .. } => "joined",
            Self::Started { .. } => "started",
            Self::Cancelled { .. } => "cancelled",
            Self::Completed { .. } => "completed",
            Self::Applied { .. } => "applied",
            Self::StaleDiscarded { .. } => "stale_discarded",
            Self::Orphaned { .. } => "orphaned",
        }
    }
}

impl Hash for ValidationEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Scheduled {
                token,
                due_ns,
                elapsed_ns,
            } => {
                token.hash(state);
                due_ns.hash(state);
                elapsed_ns.hash(state);
            }
            Self::CacheHit {
                token,
                is_valid,
                elapsed_ns,
            }
            | Self::Applied {
                token,
                is_valid,
                elapsed_ns,
            } => {
                token.hash(state);
                is_valid.hash(state);
                elapsed_ns.hash(state);
            }
            Self::Started { token, elapsed_ns } | Self::Orphaned { token, elapsed_ns } => {
                token.hash(state);
                elapsed_ns.hash(state);
            }
            Self::Cancelled {
                token,
                superseded_by,
                elapsed_ns,
            } => {
                token.hash(state);
                superseded_by.hash(state);
                elapsed_ns.hash(state);
            }
            Self::Joined {
                token,
                carrier,
                elapsed_ns,
            } => {
                token.hash(state);
                carrier.hash(state);
                elapsed_ns.hash(state);
            }
            Self::Completed {
                token,
                is_valid,
                duration_ns,
                elapsed_ns,
            } => {
                token.hash(state);
                is_valid.hash(state);
                duration_ns.hash(state);
                elapsed_ns.hash(state);
            }
            Self::StaleDiscarded {
                token,
                current_token,
                elapsed_ns,
            } => {
                token.hash(state);
                current_token.hash(state);
                elapsed_ns.hash(state);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationTrace
// ---------------------------------------------------------------------------

/// A trace of validation events for debugging and determinism verification.
#[derive(Debug, Clone, Default)]
pub struct ValidationTrace {
    events: Vec<ValidationEvent>,
}

impl ValidationTrace {
    /// Create a new empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the trace.
    pub fn push(&mut self, event: ValidationEvent) {
        self.events.push(event);
    }

    /// Get all events in the trace.
    #[must_use]
    pub fn events(&self) -> &[ValidationEvent] {
        &self.events
    }

    /// Check if the trace contains a specific event type for a token.
    #[must_use]
    pub fn contains_event_type(&self, token: ValidationToken, event_type: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.token() == token && e.event_type() == event_type)
    }

    /// Count events of a given type.
    #[must_use]
    pub fn count_event_type(&self, event_type: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// Get all events for a specific token.
    #[must_use]
    pub fn events_for_token(&self, token: ValidationToken) -> Vec<&ValidationEvent> {
        self.events.iter().filter(|e| e.token() == token).collect()
    }

    /// Compute a checksum of the trace for golden comparison.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for event in &self.events {
            event.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Get the number of events in the trace.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the trace is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clear all events from the trace.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Verify trace invariants.
    ///
    /// Returns a list of violations if any invariants are broken.
    #[must_use]
    pub fn verify_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut started: Vec<ValidationToken> = Vec::new();
        let mut joined: Vec<ValidationToken> = Vec::new();
        let mut answered_from_cache: Vec<ValidationToken> = Vec::new();

        for event in &self.events {
            match event {
                // A token reaches the remote side at most once.
                ValidationEvent::Started { token, .. } => {
                    if started.contains(token) {
                        violations.push(format!("{token} started more than once"));
                    }
                    started.push(*token);
                }
                ValidationEvent::CacheHit { token, .. } => answered_from_cache.push(*token),
                // A request can only wait on a call that went out.
                ValidationEvent::Joined { token, carrier, .. } => {
                    if !started.contains(carrier) {
                        violations.push(format!("{token} joined {carrier}, which never started"));
                    }
                    joined.push(*token);
                }
                // Applied results must belong to a started or joined token.
                ValidationEvent::Applied { token, .. } => {
                    if !started.contains(token) && !joined.contains(token) {
                        violations.push(format!("{token} applied without being started"));
                    }
                }
                ValidationEvent::StaleDiscarded {
                    token,
                    current_token,
                    ..
                } if token >= current_token => {
                    violations.push(format!(
                        "StaleDiscarded with non-stale token: {token} >= {current_token}"
                    ));
                }
                _ => {}
            }
        }

        for token in &answered_from_cache {
            if started.contains(token) {
                violations.push(format!("{token} answered from cache and also started"));
            }
        }
        for token in &joined {
            if started.contains(token) {
                violations.push(format!("{token} joined another call and also started"));
            }
        }

        violations
    }
}

// ---------------------------------------------------------------------------
// Configuration and stats
// ---------------------------------------------------------------------------

/// Configuration for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Quiet period after the last request before the remote call fires.
    pub debounce: Duration,
    /// Message for [`CheckOutcome::Rejected`].
    pub rejected_message: String,
    /// Message for [`CheckOutcome::Failed`].
    pub failure_message: String,
    /// Record lifecycle events in the trace.
    pub trace_enabled: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            rejected_message: "Value already exists".to_string(),
            failure_message: "Validation error, please try again".to_string(),
            trace_enabled: true,
        }
    }
}

impl CoordinatorConfig {
    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the message shown when the remote side rejects a value.
    #[must_use]
    pub fn with_rejected_message(mut self, message: impl Into<String>) -> Self {
        self.rejected_message = message.into();
        self
    }

    /// Set the message shown when the remote call fails.
    #[must_use]
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }

    /// Enable or disable event tracing.
    #[must_use]
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }
}

/// Counters maintained by the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Remote calls issued through [`AsyncValidationCoordinator::poll_due`].
    pub remote_calls: u64,
    /// Requests that waited on an outstanding call for the same value.
    pub joined: u64,
    /// Requests answered from the cache.
    pub cache_hits: u64,
    /// Responses discarded because a newer token existed.
    pub stale_discarded: u64,
    /// Responses discarded because their key had been cancelled.
    pub orphaned: u64,
    /// Scheduled or in-flight checks dropped by supersession or cancellation.
    pub cancelled: u64,
}

// ---------------------------------------------------------------------------
// AsyncValidationCoordinator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum SlotPhase {
    Debouncing { due: Instant },
    InFlight { started_at: Instant },
    /// Waiting on the remote call carried by another token.
    Joined { carrier: ValidationToken },
    Settled,
}

#[derive(Debug, Clone)]
struct FieldSlot {
    value: String,
    token: ValidationToken,
    phase: SlotPhase,
    status: AsyncStatus,
}

/// Coordinates debounced async checks per key with token-based staleness
/// prevention and a per-value result cache.
///
/// Designed for single-threaded use: the owner serializes every call.
pub struct AsyncValidationCoordinator<K> {
    config: CoordinatorConfig,
    next_token: u64,
    slots: HashMap<K, FieldSlot>,
    cache: HashMap<String, CachedVerdict>,
    /// Values with a remote call out, and the token that carries each.
    outstanding: HashMap<String, ValidationToken>,
    trace: ValidationTrace,
    created_at: Instant,
    stats: CoordinatorStats,
}

impl<K> fmt::Debug for AsyncValidationCoordinator<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncValidationCoordinator")
            .field("slots", &self.slots.len())
            .field("cached_values", &self.cache.len())
            .field("outstanding_values", &self.outstanding.len())
            .field("trace_events", &self.trace.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<K> AsyncValidationCoordinator<K>
where
    K: Clone + Eq + Hash + fmt::Debug,
{
    /// Create a new coordinator anchored at the current time.
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    /// Create a new coordinator anchored at `now`.
    ///
    /// Trace timestamps are relative to this instant, which keeps traces
    /// reproducible when tests drive the clock explicitly.
    #[must_use]
    pub fn new_at(config: CoordinatorConfig, now: Instant) -> Self {
        Self {
            config,
            next_token: 1,
            slots: HashMap::new(),
            cache: HashMap::new(),
            outstanding: HashMap::new(),
            trace: ValidationTrace::new(),
            created_at: now,
            stats: CoordinatorStats::default(),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn elapsed_ns(&self, now: Instant) -> u64 {
        as_nanos_u64(duration_since_or_zero(now, self.created_at))
    }

    fn issue_token(&mut self) -> ValidationToken {
        let token = ValidationToken(self.next_token);
        self.next_token += 1;
        token
    }

    fn record(&mut self, event: ValidationEvent) {
        #[cfg(feature = "tracing")]
        tracing::trace!(
            target: "claimform_validation::async",
            event = event.event_type(),
            token = event.token().raw(),
            "async validation event"
        );
        if self.config.trace_enabled {
            self.trace.push(event);
        }
    }

    fn status_for(&self, verdict: CachedVerdict) -> AsyncStatus {
        match verdict {
            CachedVerdict::Passed => AsyncStatus::Valid,
            CachedVerdict::Rejected => AsyncStatus::Invalid(self.config.rejected_message.clone()),
        }
    }

    /// Request a check of `value` for `key` at the current time.
    pub fn request(&mut self, key: K, value: &str) -> RequestOutcome {
        self.request_at(key, value, Instant::now())
    }

    /// Request a check of `value` for `key` at `now`.
    ///
    /// - Same value as the key already tracks: no-op, the debounce timer is
    ///   not reset and no call is re-issued.
    /// - Cached value: the key settles immediately.
    /// - Value with a remote call already out: the key waits on that call.
    /// - Otherwise a new token supersedes whatever the key had scheduled or
    ///   in flight, and a check is scheduled one debounce window from `now`.
    pub fn request_at(&mut self, key: K, value: &str, now: Instant) -> RequestOutcome {
        if self.slots.get(&key).is_some_and(|slot| slot.value == value) {
            return RequestOutcome::Unchanged;
        }

        let token = self.issue_token();
        let elapsed_ns = self.elapsed_ns(now);

        if let Some(previous) = self.slots.get(&key)
            && !matches!(previous.phase, SlotPhase::Settled)
        {
            let superseded = previous.token;
            self.stats.cancelled += 1;
            self.record(ValidationEvent::Cancelled {
                token: superseded,
                superseded_by: Some(token),
                elapsed_ns,
            });
        }

        if let Some(verdict) = self.cache.get(value).copied() {
            let status = self.status_for(verdict);
            self.stats.cache_hits += 1;
            self.record(ValidationEvent::CacheHit {
                token,
                is_valid: status.is_valid(),
                elapsed_ns,
            });
            self.slots.insert(
                key,
                FieldSlot {
                    value: value.to_string(),
                    token,
                    phase: SlotPhase::Settled,
                    status: status.clone(),
                },
            );
            return RequestOutcome::Cached(status);
        }

        if let Some(carrier) = self.outstanding.get(value).copied() {
            self.join(key, value.to_string(), token, carrier, elapsed_ns);
            return RequestOutcome::Joined(token);
        }

        let due = now + self.config.debounce;
        self.record(ValidationEvent::Scheduled {
            token,
            due_ns: self.elapsed_ns(due),
            elapsed_ns,
        });
        self.slots.insert(
            key,
            FieldSlot {
                value: value.to_string(),
                token,
                phase: SlotPhase::Debouncing { due },
                status: AsyncStatus::Pending,
            },
        );
        RequestOutcome::Scheduled(token)
    }

    fn join(
        &mut self,
        key: K,
        value: String,
        token: ValidationToken,
        carrier: ValidationToken,
        elapsed_ns: u64,
    ) {
        self.stats.joined += 1;
        self.record(ValidationEvent::Joined {
            token,
            carrier,
            elapsed_ns,
        });
        self.slots.insert(
            key,
            FieldSlot {
                value,
                token,
                phase: SlotPhase::Joined { carrier },
                status: AsyncStatus::Pending,
            },
        );
    }

    /// Forget `key` at the current time. See [`Self::cancel_at`].
    pub fn cancel(&mut self, key: &K) -> bool {
        self.cancel_at(key, Instant::now())
    }

    /// Forget `key`: its scheduled or in-flight check is dropped and any
    /// late response for it is discarded. Returns `true` if the key existed.
    pub fn cancel_at(&mut self, key: &K, now: Instant) -> bool {
        let Some(slot) = self.slots.remove(key) else {
            return false;
        };
        if !matches!(slot.phase, SlotPhase::Settled) {
            self.stats.cancelled += 1;
            let elapsed_ns = self.elapsed_ns(now);
            self.record(ValidationEvent::Cancelled {
                token: slot.token,
                superseded_by: None,
                elapsed_ns,
            });
        }
        true
    }

    /// Cancel every key (teardown). The cache survives.
    pub fn cancel_all_at(&mut self, now: Instant) {
        let mut keys: Vec<(ValidationToken, K)> = self
            .slots
            .iter()
            .map(|(key, slot)| (slot.token, key.clone()))
            .collect();
        keys.sort_by_key(|(token, _)| *token);
        for (_, key) in keys {
            self.cancel_at(&key, now);
        }
    }

    /// Make every debouncing check due at `now`.
    ///
    /// Used when the owner needs results as soon as possible (submission).
    pub fn flush_at(&mut self, now: Instant) {
        for slot in self.slots.values_mut() {
            if let SlotPhase::Debouncing { due } = &mut slot.phase
                && *due > now
            {
                *due = now;
            }
        }
    }

    /// Issue every check whose debounce window has elapsed at `now`.
    ///
    /// Tickets are returned in token order, at most one per distinct value. A
    /// value that was answered in the meantime settles from the cache; a value
    /// that already has a call out waits on it.
    pub fn poll_due(&mut self, now: Instant) -> Vec<CheckTicket<K>> {
        let mut due: Vec<(ValidationToken, K)> = self
            .slots
            .iter()
            .filter_map(|(key, slot)| match slot.phase {
                SlotPhase::Debouncing { due } if due <= now => Some((slot.token, key.clone())),
                _ => None,
            })
            .collect();
        due.sort_by_key(|(token, _)| *token);

        let elapsed_ns = self.elapsed_ns(now);
        let mut tickets = Vec::with_capacity(due.len());
        for (token, key) in due {
            let Some(value) = self.slots.get(&key).map(|slot| slot.value.clone()) else {
                continue;
            };

            if let Some(verdict) = self.cache.get(&value).copied() {
                let status = self.status_for(verdict);
                self.stats.cache_hits += 1;
                self.record(ValidationEvent::CacheHit {
                    token,
                    is_valid: status.is_valid(),
                    elapsed_ns,
                });
                if let Some(slot) = self.slots.get_mut(&key) {
                    slot.phase = SlotPhase::Settled;
                    slot.status = status;
                }
                continue;
            }

            if let Some(carrier) = self.outstanding.get(&value).copied() {
                self.join(key, value, token, carrier, elapsed_ns);
                continue;
            }

            if let Some(slot) = self.slots.get_mut(&key) {
                slot.phase = SlotPhase::InFlight { started_at: now };
            }
            self.outstanding.insert(value.clone(), token);
            self.stats.remote_calls += 1;
            self.record(ValidationEvent::Started { token, elapsed_ns });
            tickets.push(CheckTicket { key, value, token });
        }
        tickets
    }

    /// Earliest instant at which [`Self::poll_due`] will issue a ticket.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .values()
            .filter_map(|slot| match slot.phase {
                SlotPhase::Debouncing { due } => Some(due),
                _ => None,
            })
            .min()
    }

    /// Time remaining until the next check is due, measured from `now`.
    #[must_use]
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|due| duration_since_or_zero(due, now))
    }

    /// Report the remote answer for `ticket` at the current time.
    pub fn complete(&mut self, ticket: &CheckTicket<K>, outcome: CheckOutcome) -> bool {
        self.complete_at(ticket, outcome, Instant::now())
    }

    /// Report the remote answer for `ticket` at `now`.
    ///
    /// Definitive answers are memoized for the ticket's value whether or not
    /// they are applied. The answer decides the ticket's key if its current
    /// token is still the ticket's token, and every key that joined the call.
    /// Returns `true` if it decided at least one key.
    pub fn complete_at(
        &mut self,
        ticket: &CheckTicket<K>,
        outcome: CheckOutcome,
        now: Instant,
    ) -> bool {
        let elapsed_ns = self.elapsed_ns(now);
        let is_valid = matches!(outcome, CheckOutcome::Passed);

        let duration_ns = match self.slots.get(&ticket.key) {
            Some(FieldSlot {
                token,
                phase: SlotPhase::InFlight { started_at },
                ..
            }) if *token == ticket.token => as_nanos_u64(duration_since_or_zero(now, *started_at)),
            _ => 0,
        };
        self.record(ValidationEvent::Completed {
            token: ticket.token,
            is_valid,
            duration_ns,
            elapsed_ns,
        });

        if self.outstanding.get(&ticket.value) == Some(&ticket.token) {
            self.outstanding.remove(&ticket.value);
        }

        let status = match &outcome {
            CheckOutcome::Passed => {
                self.cache.insert(ticket.value.clone(), CachedVerdict::Passed);
                AsyncStatus::Valid
            }
            CheckOutcome::Rejected => {
                self.cache
                    .insert(ticket.value.clone(), CachedVerdict::Rejected);
                AsyncStatus::Invalid(self.config.rejected_message.clone())
            }
            CheckOutcome::Failed(_) => AsyncStatus::Error(self.config.failure_message.clone()),
        };

        let current = self
            .slots
            .get(&ticket.key)
            .map(|slot| (slot.token, slot.phase));
        let decided_own = match current {
            None => {
                self.stats.orphaned += 1;
                self.record(ValidationEvent::Orphaned {
                    token: ticket.token,
                    elapsed_ns,
                });
                false
            }
            // The key went back to this value and waits on this very call.
            Some((_, SlotPhase::Joined { carrier })) if carrier == ticket.token => false,
            Some((current_token, _)) if current_token != ticket.token => {
                self.stats.stale_discarded += 1;
                self.record(ValidationEvent::StaleDiscarded {
                    token: ticket.token,
                    current_token,
                    elapsed_ns,
                });
                false
            }
            Some(_) => {
                if let Some(slot) = self.slots.get_mut(&ticket.key) {
                    slot.phase = SlotPhase::Settled;
                    slot.status = status.clone();
                }
                self.record(ValidationEvent::Applied {
                    token: ticket.token,
                    is_valid,
                    elapsed_ns,
                });
                true
            }
        };

        let mut waiting: Vec<(ValidationToken, K)> = self
            .slots
            .iter()
            .filter(|(_, slot)| {
                matches!(slot.phase, SlotPhase::Joined { carrier } if carrier == ticket.token)
            })
            .map(|(key, slot)| (slot.token, key.clone()))
            .collect();
        waiting.sort_by_key(|(token, _)| *token);
        let decided_joined = !waiting.is_empty();
        for (token, key) in waiting {
            if let Some(slot) = self.slots.get_mut(&key) {
                slot.phase = SlotPhase::Settled;
                slot.status = status.clone();
            }
            self.record(ValidationEvent::Applied {
                token,
                is_valid,
                elapsed_ns,
            });
        }

        decided_own || decided_joined
    }

    /// Current status for `key`, if the key is tracked.
    #[must_use]
    pub fn status(&self, key: &K) -> Option<&AsyncStatus> {
        self.slots.get(key).map(|slot| &slot.status)
    }

    /// The value currently tracked for `key`.
    #[must_use]
    pub fn value(&self, key: &K) -> Option<&str> {
        self.slots.get(key).map(|slot| slot.value.as_str())
    }

    /// Current token for `key` (`NONE` if untracked).
    #[must_use]
    pub fn current_token(&self, key: &K) -> ValidationToken {
        self.slots
            .get(key)
            .map_or(ValidationToken::NONE, |slot| slot.token)
    }

    /// Whether `key` has a check debouncing or in flight.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.status(key).is_some_and(AsyncStatus::is_pending)
    }

    /// Whether any key has a check debouncing or in flight.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.slots.values().any(|slot| slot.status.is_pending())
    }

    /// Keys with outstanding checks, in token order.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<K> {
        let mut pending: Vec<(ValidationToken, K)> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.status.is_pending())
            .map(|(key, slot)| (slot.token, key.clone()))
            .collect();
        pending.sort_by_key(|(token, _)| *token);
        pending.into_iter().map(|(_, key)| key).collect()
    }

    /// Number of keys whose own check is issued and not yet answered.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot.phase, SlotPhase::InFlight { .. }))
            .count()
    }

    /// Values with a remote call out and no answer yet.
    #[must_use]
    pub fn outstanding_values(&self) -> usize {
        self.outstanding.len()
    }

    /// Cached status for a literal value, if one is memoized.
    #[must_use]
    pub fn cached(&self, value: &str) -> Option<AsyncStatus> {
        self.cache.get(value).map(|v| self.status_for(*v))
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    /// Get the event trace.
    #[must_use]
    pub fn trace(&self) -> &ValidationTrace {
        &self.trace
    }

    /// Clear the trace.
    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    /// Verify that the trace satisfies all invariants.
    pub fn verify_trace(&self) -> Result<(), Vec<String>> {
        let violations = self.trace.verify_invariants();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
