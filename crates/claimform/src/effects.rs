#![forbid(unsafe_code)]

//! Executors for the form's remote calls.
//!
//! The model never performs I/O. Its owner hands the category fetch and the
//! due uniqueness checks to an [`Effects`] executor and later drains the
//! answers as [`Inbound`] messages. Answers may arrive in any order; the
//! tickets carry the tokens that decide which ones still count.
//!
//! - [`ThreadedEffects`] runs each call on its own thread and delivers the
//!   result over an `mpsc` channel.
//! - [`InlineEffects`] runs each call synchronously and queues the result,
//!   which keeps tests deterministic.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use claimform_validation::{CheckOutcome, CheckTicket};

use crate::field_array::WitnessId;
use crate::options::{CategoryRecord, OptionsSource, SourceError};

// ---------------------------------------------------------------------------
// Uniqueness directory
// ---------------------------------------------------------------------------

/// Error raised by a [`UniquenessDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory could not be reached.
    Transport(String),
    /// The directory answered with something unusable.
    BadResponse(String),
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(detail) => write!(f, "directory unreachable: {detail}"),
            Self::BadResponse(detail) => write!(f, "bad directory response: {detail}"),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Answers whether an email is already registered.
pub trait UniquenessDirectory: Send + Sync {
    fn email_exists(&self, email: &str) -> Result<bool, DirectoryError>;
}

/// Map a directory answer to a check outcome (failures block submission).
#[must_use]
pub fn outcome_for(answer: Result<bool, DirectoryError>) -> CheckOutcome {
    match answer {
        Ok(false) => CheckOutcome::Passed,
        Ok(true) => CheckOutcome::Rejected,
        Err(err) => CheckOutcome::Failed(err.to_string()),
    }
}

/// Directory held in memory, with scripted failures and a call log.
///
/// Emails compare case-insensitively.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    known: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    latency: Option<Duration>,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory that already knows `emails`.
    #[must_use]
    pub fn with_known<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let directory = Self::new();
        for email in emails {
            directory.register(email.as_ref());
        }
        directory
    }

    /// Sleep this long before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn register(&self, email: &str) {
        lock(&self.known).insert(email.to_lowercase());
    }

    /// Make lookups of `email` fail with a transport error.
    pub fn fail_on(&self, email: &str) {
        lock(&self.failing).insert(email.to_lowercase());
    }

    /// Stop failing lookups of `email`.
    pub fn heal(&self, email: &str) {
        lock(&self.failing).remove(&email.to_lowercase());
    }

    /// Every email looked up so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl UniquenessDirectory for InMemoryDirectory {
    fn email_exists(&self, email: &str) -> Result<bool, DirectoryError> {
        lock(&self.calls).push(email.to_string());
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        let key = email.to_lowercase();
        if lock(&self.failing).contains(&key) {
            return Err(DirectoryError::Transport(format!("lookup of {email} failed")));
        }
        Ok(lock(&self.known).contains(&key))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Executors
// ---------------------------------------------------------------------------

/// An answer delivered back to the model's owner.
#[derive(Debug)]
pub enum Inbound {
    Categories(Result<Vec<CategoryRecord>, SourceError>),
    Uniqueness {
        ticket: CheckTicket<WitnessId>,
        outcome: CheckOutcome,
    },
}

/// Runs remote calls on behalf of a form.
pub trait Effects {
    /// Start the category fetch.
    fn fetch_categories(&mut self);

    /// Start the uniqueness check described by `ticket`.
    fn check_uniqueness(&mut self, ticket: CheckTicket<WitnessId>);

    /// Answers that have arrived, without blocking.
    fn drain(&mut self) -> Vec<Inbound>;

    /// Wait up to `timeout` for at least one answer, then drain.
    fn wait(&mut self, timeout: Duration) -> Vec<Inbound>;

    /// Calls started but not yet drained.
    fn outstanding(&self) -> usize;
}

/// Executes calls synchronously and queues the answers.
pub struct InlineEffects {
    source: Arc<dyn OptionsSource>,
    directory: Arc<dyn UniquenessDirectory>,
    queue: VecDeque<Inbound>,
}

impl InlineEffects {
    #[must_use]
    pub fn new(source: Arc<dyn OptionsSource>, directory: Arc<dyn UniquenessDirectory>) -> Self {
        Self {
            source,
            directory,
            queue: VecDeque::new(),
        }
    }
}

impl fmt::Debug for InlineEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineEffects")
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl Effects for InlineEffects {
    fn fetch_categories(&mut self) {
        self.queue
            .push_back(Inbound::Categories(self.source.fetch_categories()));
    }

    fn check_uniqueness(&mut self, ticket: CheckTicket<WitnessId>) {
        let outcome = outcome_for(self.directory.email_exists(&ticket.value));
        self.queue.push_back(Inbound::Uniqueness { ticket, outcome });
    }

    fn drain(&mut self) -> Vec<Inbound> {
        self.queue.drain(..).collect()
    }

    fn wait(&mut self, _timeout: Duration) -> Vec<Inbound> {
        self.drain()
    }

    fn outstanding(&self) -> usize {
        self.queue.len()
    }
}

struct Running {
    /// The check a worker answers; `None` for the category fetch.
    ticket: Option<CheckTicket<WitnessId>>,
    handle: JoinHandle<()>,
}

/// Executes each call on a spawned thread; answers come back over a channel.
pub struct ThreadedEffects {
    source: Arc<dyn OptionsSource>,
    directory: Arc<dyn UniquenessDirectory>,
    sender: mpsc::Sender<Inbound>,
    receiver: mpsc::Receiver<Inbound>,
    running: Vec<Running>,
    outstanding: usize,
}

impl ThreadedEffects {
    #[must_use]
    pub fn new(source: Arc<dyn OptionsSource>, directory: Arc<dyn UniquenessDirectory>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            source,
            directory,
            sender,
            receiver,
            running: Vec::new(),
            outstanding: 0,
        }
    }

    /// Join finished workers. A worker that panicked while checking a value
    /// is reported as a failed check so its field does not stay pending.
    fn reap(&mut self) {
        if self.running.is_empty() {
            return;
        }
        let mut remaining = Vec::with_capacity(self.running.len());
        for worker in self.running.drain(..) {
            if !worker.handle.is_finished() {
                remaining.push(worker);
                continue;
            }
            if let Err(payload) = worker.handle.join() {
                let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                    (*s).to_owned()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic payload".to_owned()
                };
                tracing::error!("effect worker panicked: {msg}");
                let inbound = match worker.ticket {
                    Some(ticket) => Inbound::Uniqueness {
                        ticket,
                        outcome: CheckOutcome::Failed(msg),
                    },
                    None => Inbound::Categories(Err(SourceError::Unavailable(msg))),
                };
                let _ = self.sender.send(inbound);
            }
        }
        self.running = remaining;
    }

    fn collect(&mut self, first: Option<Inbound>) -> Vec<Inbound> {
        let mut inbound: Vec<Inbound> = first.into_iter().collect();
        inbound.extend(self.receiver.try_iter());
        self.outstanding = self.outstanding.saturating_sub(inbound.len());
        inbound
    }
}

impl fmt::Debug for ThreadedEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedEffects")
            .field("running", &self.running.len())
            .field("outstanding", &self.outstanding)
            .finish()
    }
}

impl Effects for ThreadedEffects {
    fn fetch_categories(&mut self) {
        let sender = self.sender.clone();
        let source = Arc::clone(&self.source);
        let handle = thread::spawn(move || {
            let _ = sender.send(Inbound::Categories(source.fetch_categories()));
        });
        self.outstanding += 1;
        self.running.push(Running {
            ticket: None,
            handle,
        });
    }

    fn check_uniqueness(&mut self, ticket: CheckTicket<WitnessId>) {
        let sender = self.sender.clone();
        let directory = Arc::clone(&self.directory);
        let task_ticket = ticket.clone();
        let handle = thread::spawn(move || {
            let outcome = outcome_for(directory.email_exists(&task_ticket.value));
            let _ = sender.send(Inbound::Uniqueness {
                ticket: task_ticket,
                outcome,
            });
        });
        self.outstanding += 1;
        self.running.push(Running {
            ticket: Some(ticket),
            handle,
        });
    }

    fn drain(&mut self) -> Vec<Inbound> {
        self.reap();
        self.collect(None)
    }

    fn wait(&mut self, timeout: Duration) -> Vec<Inbound> {
        self.reap();
        let first = self.receiver.recv_timeout(timeout).ok();
        self.reap();
        self.collect(first)
    }

    fn outstanding(&self) -> usize {
        self.outstanding
    }
}
