//! The pending set: document ids with a mutating call in flight.
//!
//! Acquiring an id returns a guard; dropping the guard releases the id on
//! every path, including early returns and errors. The gate is advisory
//! and per process. It keeps one client from firing duplicate requests
//! for the same row; it does not provide mutual exclusion between clients.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::DocumentId;

/// Shared set of document ids awaiting a response.
///
/// Clones share state, so a list and a detail controller can gate on the
/// same set.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    ids: Arc<Mutex<HashSet<DocumentId>>>,
}

impl PendingSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as pending. Returns `None` if it already is.
    #[must_use]
    pub fn try_acquire(&self, id: &DocumentId) -> Option<PendingGuard> {
        if self.lock().insert(id.clone()) {
            Some(PendingGuard {
                set: self.clone(),
                id: id.clone(),
            })
        } else {
            None
        }
    }

    pub fn is_pending(&self, id: &DocumentId) -> bool {
        self.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<DocumentId>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases its document id from the pending set when dropped.
#[derive(Debug)]
pub struct PendingGuard {
    set: PendingSet,
    id: DocumentId,
}

impl PendingGuard {
    pub fn document_id(&self) -> &DocumentId {
        &self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}
