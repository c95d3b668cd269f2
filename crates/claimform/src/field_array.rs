#![forbid(unsafe_code)]

//! Controller for the variable-length witness list.
//!
//! The record owns the entries; the controller owns their identities. Every
//! entry carries a [`WitnessId`] assigned monotonically at insertion and never
//! reused, so per-entry state (touched flags, in-flight uniqueness checks)
//! survives re-indexing when an earlier entry is removed.
//!
//! Length bounds are enforced here, before anything reaches the record:
//! rejected operations return an [`ArrayError`] and leave both the entries and
//! the identities untouched.

use std::fmt;

use crate::record::Witness;

/// Minimum number of witnesses.
pub const MIN_WITNESSES: usize = 1;
/// Maximum number of witnesses.
pub const MAX_WITNESSES: usize = 5;

/// Stable identity of a witness entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WitnessId(u64);

impl WitnessId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WitnessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "witness#{}", self.0)
    }
}

/// A rejected array operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayError {
    /// Append at the maximum length.
    Full { max: usize },
    /// Remove at the minimum length.
    AtMinimum { min: usize },
    /// Remove with an index past the end.
    OutOfBounds { index: usize, len: usize },
}

impl fmt::Display for ArrayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full { max } => write!(f, "cannot add witness: limit of {max} reached"),
            Self::AtMinimum { min } => {
                write!(f, "cannot remove witness: at least {min} required")
            }
            Self::OutOfBounds { index, len } => {
                write!(f, "witness index {index} out of bounds (len {len})")
            }
        }
    }
}

impl std::error::Error for ArrayError {}

/// Identity tracker and bounds guard for the witness list.
#[derive(Debug, Clone)]
pub struct WitnessArray {
    ids: Vec<WitnessId>,
    next_id: u64,
}

impl WitnessArray {
    /// Assign identities to an initial list of `len` entries.
    ///
    /// Initial lists outside the bounds are accepted; validation reports them.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        let mut array = Self {
            ids: Vec::with_capacity(len.max(MAX_WITNESSES)),
            next_id: 1,
        };
        for _ in 0..len {
            let id = array.issue();
            array.ids.push(id);
        }
        array
    }

    fn issue(&mut self) -> WitnessId {
        let id = WitnessId(self.next_id);
        self.next_id += 1;
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identities in index order.
    #[must_use]
    pub fn ids(&self) -> &[WitnessId] {
        &self.ids
    }

    /// Identity of the entry at `index`.
    #[must_use]
    pub fn id_at(&self, index: usize) -> Option<WitnessId> {
        self.ids.get(index).copied()
    }

    /// Current index of `id`, if the entry still exists.
    #[must_use]
    pub fn index_of(&self, id: WitnessId) -> Option<usize> {
        self.ids.iter().position(|&candidate| candidate == id)
    }

    #[must_use]
    pub fn can_append(&self) -> bool {
        self.ids.len() < MAX_WITNESSES
    }

    #[must_use]
    pub fn can_remove(&self) -> bool {
        self.ids.len() > MIN_WITNESSES
    }

    /// Append `entry` to `entries`.
    pub fn append(
        &mut self,
        entries: &mut Vec<Witness>,
        entry: Witness,
    ) -> Result<WitnessId, ArrayError> {
        debug_assert_eq!(entries.len(), self.ids.len());
        if !self.can_append() {
            return Err(ArrayError::Full { max: MAX_WITNESSES });
        }
        let id = self.issue();
        entries.push(entry);
        self.ids.push(id);
        Ok(id)
    }

    /// Remove the entry at `index`; later entries shift down by one.
    pub fn remove(
        &mut self,
        entries: &mut Vec<Witness>,
        index: usize,
    ) -> Result<(WitnessId, Witness), ArrayError> {
        debug_assert_eq!(entries.len(), self.ids.len());
        if index >= self.ids.len() {
            return Err(ArrayError::OutOfBounds {
                index,
                len: self.ids.len(),
            });
        }
        if !self.can_remove() {
            return Err(ArrayError::AtMinimum { min: MIN_WITNESSES });
        }
        let id = self.ids.remove(index);
        let entry = entries.remove(index);
        Ok((id, entry))
    }
}
