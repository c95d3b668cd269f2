//! Property-based invariant tests for the async validation coordinator.
//!
//! Random interleavings of requests, polls, cancellations and answers
//! (including failed calls, delivered in any order) must keep:
//!
//! 1. The trace free of violations after every step.
//! 2. At most one outstanding call per distinct value.
//! 3. Ticket tokens strictly increasing across polls.
//! 4. Every decided key showing the verdict for its own value.
//! 5. Nothing pending once all due checks are issued and answered.

use std::time::Duration;

use claimform_validation::{
    AsyncStatus, AsyncValidationCoordinator, CheckOutcome, CheckTicket, CoordinatorConfig,
    ValidationToken,
};
use proptest::prelude::*;
use web_time::Instant;

const DEBOUNCE: Duration = Duration::from_millis(500);

const VALUES: [&str; 3] = ["free@example.com", "taken@example.com", "new@example.com"];
const TAKEN: &str = "taken@example.com";

// ── Helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Request { key: u8, value: usize, gap_ms: u64 },
    Poll { gap_ms: u64 },
    Cancel { key: u8 },
    Complete { pick: usize, fail: bool },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..3, 0usize..VALUES.len(), 0u64..700)
            .prop_map(|(key, value, gap_ms)| Op::Request { key, value, gap_ms }),
        3 => (0u64..700).prop_map(|gap_ms| Op::Poll { gap_ms }),
        1 => (0u8..3).prop_map(|key| Op::Cancel { key }),
        3 => (any::<usize>(), prop::bool::weighted(0.2))
            .prop_map(|(pick, fail)| Op::Complete { pick, fail }),
    ]
}

/// What the remote side would answer for `value`.
fn truth(value: &str) -> CheckOutcome {
    if value == TAKEN {
        CheckOutcome::Rejected
    } else {
        CheckOutcome::Passed
    }
}

struct Harness {
    coordinator: AsyncValidationCoordinator<u8>,
    now: Instant,
    outstanding: Vec<CheckTicket<u8>>,
    last_token: Option<ValidationToken>,
}

impl Harness {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            coordinator: AsyncValidationCoordinator::new_at(CoordinatorConfig::default(), now),
            now,
            outstanding: Vec::new(),
            last_token: None,
        }
    }

    fn poll(&mut self) -> Result<(), TestCaseError> {
        for ticket in self.coordinator.poll_due(self.now) {
            if let Some(last) = self.last_token {
                prop_assert!(ticket.token > last, "{} issued after {}", ticket.token, last);
            }
            self.last_token = Some(ticket.token);
            self.outstanding.push(ticket);
        }
        Ok(())
    }

    fn complete(&mut self, index: usize, fail: bool) {
        let ticket = self.outstanding.remove(index);
        let outcome = if fail {
            CheckOutcome::Failed("connection reset".into())
        } else {
            truth(&ticket.value)
        };
        self.coordinator.complete_at(&ticket, outcome, self.now);
    }

    fn apply(&mut self, op: Op) -> Result<(), TestCaseError> {
        match op {
            Op::Request { key, value, gap_ms } => {
                self.now += Duration::from_millis(gap_ms);
                self.coordinator.request_at(key, VALUES[value], self.now);
            }
            Op::Poll { gap_ms } => {
                self.now += Duration::from_millis(gap_ms);
                self.poll()?;
            }
            Op::Cancel { key } => {
                self.coordinator.cancel_at(&key, self.now);
            }
            Op::Complete { pick, fail } => {
                if !self.outstanding.is_empty() {
                    let index = pick % self.outstanding.len();
                    self.complete(index, fail);
                }
            }
        }
        Ok(())
    }

    fn check(&self) -> Result<(), TestCaseError> {
        let verified = self.coordinator.verify_trace();
        prop_assert!(verified.is_ok(), "{:?}", verified);

        for (i, ticket) in self.outstanding.iter().enumerate() {
            prop_assert!(
                self.outstanding[..i].iter().all(|t| t.value != ticket.value),
                "{} has two calls out: {:?}",
                ticket.value,
                self.outstanding
            );
        }
        prop_assert_eq!(self.coordinator.outstanding_values(), self.outstanding.len());

        for key in 0u8..3 {
            let (Some(value), Some(status)) =
                (self.coordinator.value(&key), self.coordinator.status(&key))
            else {
                continue;
            };
            match status {
                AsyncStatus::Valid => {
                    prop_assert_ne!(value, TAKEN, "key {}", key);
                }
                AsyncStatus::Invalid(_) => {
                    prop_assert_eq!(value, TAKEN, "key {}", key);
                }
                AsyncStatus::Pending | AsyncStatus::Error(_) => {}
            }
        }
        Ok(())
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1-4. Invariants hold after every step
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn interleavings_keep_invariants(ops in proptest::collection::vec(op(), 1..60)) {
        let mut harness = Harness::new();
        for op in ops {
            harness.apply(op)?;
            harness.check()?;
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Draining settles every key
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn draining_leaves_nothing_pending(ops in proptest::collection::vec(op(), 1..60)) {
        let mut harness = Harness::new();
        for op in ops {
            harness.apply(op)?;
        }

        // Each round issues everything due and answers it truthfully.
        for _ in 0..4 {
            harness.now += DEBOUNCE;
            harness.poll()?;
            while !harness.outstanding.is_empty() {
                harness.complete(0, false);
            }
            harness.check()?;
        }

        prop_assert!(
            !harness.coordinator.has_pending(),
            "{:?}",
            harness.coordinator.pending_keys()
        );
        prop_assert_eq!(harness.coordinator.outstanding_values(), 0);
        prop_assert!(harness.coordinator.next_deadline().is_none());
    }
}
