//! Sequence exclusivity lock.
//!
//! ibm,get-vpd keeps per-sequence state inside firmware, so a second
//! sequence started before the first finishes corrupts both. Every
//! [`crate::Sequence`] holds a [`SequenceGuard`] from begin to end.

use log::trace;
use spin::{Mutex, MutexGuard};

/// Serializes VPD retrieval sequences.
///
/// One per firmware instance. Retrievers built over the same firmware must
/// share it (see [`crate::Retriever::with_lock`]).
pub struct SequenceLock {
    inner: Mutex<()>,
}

/// Proof that the holder owns the sequence. Released on drop.
pub struct SequenceGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl SequenceLock {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(()),
        }
    }

    /// Block until no other sequence is in flight.
    pub fn lock(&self) -> SequenceGuard<'_> {
        let guard = self.inner.lock();
        trace!("sequence lock acquired");
        SequenceGuard { _guard: guard }
    }

    /// Take the lock only if it is free.
    pub fn try_lock(&self) -> Option<SequenceGuard<'_>> {
        self.inner.try_lock().map(|guard| SequenceGuard { _guard: guard })
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl Default for SequenceLock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SequenceLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SequenceLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        trace!("sequence lock released");
    }
}
