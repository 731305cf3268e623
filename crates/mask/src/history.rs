//! Bounded, linear undo/redo over (mask, user-edit) snapshots.
//!
//! Entries are owned exclusively by the history; every read hands out a
//! copy so callers can never corrupt a past snapshot.

use std::collections::VecDeque;

use tracing::debug;

use crate::types::MaskBuffers;

/// Maximum number of snapshots kept by default
pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<MaskBuffers>,
    index: usize,
    capacity: usize,
}

impl History {
    /// Start a history whose first entry is the freshly loaded state
    pub fn new(initial: MaskBuffers) -> Self {
        Self::with_capacity(initial, DEFAULT_HISTORY_CAPACITY)
    }

    /// Same as `new` with a custom cap (at least one entry)
    pub fn with_capacity(initial: MaskBuffers, capacity: usize) -> Self {
        let mut entries = VecDeque::with_capacity(capacity.max(1));
        entries.push_back(initial);
        Self {
            entries,
            index: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    /// Copy of the state the cursor points at
    pub fn current(&self) -> MaskBuffers {
        self.entries[self.index].clone()
    }

    pub(crate) fn current_ref(&self) -> &MaskBuffers {
        &self.entries[self.index]
    }

    /// Run `mutator` on fresh copies of the current buffers. When it reports
    /// a change the result becomes a new entry and a copy is returned.
    pub fn commit<F>(&mut self, mutator: F) -> Option<MaskBuffers>
    where
        F: FnOnce(&mut [u8], &mut [u8]) -> bool,
    {
        let mut next = self.current();
        let (mask, user) = next.parts_mut();
        if !mutator(mask, user) {
            return None;
        }
        Some(self.push(next))
    }

    /// Append a snapshot unconditionally, dropping any redo branch and
    /// evicting the oldest entries beyond the cap.
    pub fn push(&mut self, snapshot: MaskBuffers) -> MaskBuffers {
        debug_assert_eq!(snapshot.len(), self.current_ref().len());
        self.entries.truncate(self.index + 1);
        self.entries.push_back(snapshot);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.index = self.entries.len() - 1;
        debug!(entries = self.entries.len(), index = self.index, "History: pushed snapshot");
        self.current()
    }

    pub fn undo(&mut self) -> Option<MaskBuffers> {
        if !self.can_undo() {
            return None;
        }
        self.index -= 1;
        debug!(index = self.index, "History: undo");
        Some(self.current())
    }

    pub fn redo(&mut self) -> Option<MaskBuffers> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        debug!(index = self.index, "History: redo");
        Some(self.current())
    }

    /// Push zero-filled buffers as a new, undoable entry
    pub fn reset(&mut self) -> MaskBuffers {
        let zeroed = self.current_ref().zeroed_like();
        self.push(zeroed)
    }
}
