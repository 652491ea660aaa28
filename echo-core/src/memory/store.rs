//! Per-character memory store: a bounded short-term queue and a long-term list.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::memory::item::MemoryItem;
use crate::types::MemoryId;

/// Short-term and long-term memories of one character.
///
/// `short_term` is in insertion order (front = oldest). `long_term` only ever
/// receives items popped from `short_term` by [`crate::eviction::admit`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    short_term: VecDeque<MemoryItem>,
    #[serde(default)]
    long_term: Vec<MemoryItem>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Short-term items, oldest first.
    #[must_use]
    pub fn short_term(&self) -> &VecDeque<MemoryItem> {
        &self.short_term
    }

    /// Long-term items, in promotion order.
    #[must_use]
    pub fn long_term(&self) -> &[MemoryItem] {
        &self.long_term
    }

    /// Total number of items (including stale ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.short_term.len() + self.long_term.len()
    }

    /// Whether the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.short_term.is_empty() && self.long_term.is_empty()
    }

    /// Every item: long-term first, then short-term oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryItem> {
        self.long_term.iter().chain(self.short_term.iter())
    }

    /// Find an item by ID in either tier.
    #[must_use]
    pub fn get(&self, id: MemoryId) -> Option<&MemoryItem> {
        self.iter().find(|m| m.id == id)
    }

    /// Whether an item with this ID exists.
    #[must_use]
    pub fn contains(&self, id: MemoryId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn push_short_term(&mut self, item: MemoryItem) {
        self.short_term.push_back(item);
    }

    pub(crate) fn pop_oldest_short_term(&mut self) -> Option<MemoryItem> {
        self.short_term.pop_front()
    }

    pub(crate) fn push_long_term(&mut self, item: MemoryItem) {
        self.long_term.push(item);
    }

    pub(crate) fn long_term_mut(&mut self) -> &mut Vec<MemoryItem> {
        &mut self.long_term
    }

    /// Flag an item as stale. Returns `false` if no such item exists.
    pub(crate) fn mark_stale(&mut self, id: MemoryId) -> bool {
        let found = self
            .short_term
            .iter_mut()
            .chain(self.long_term.iter_mut())
            .find(|m| m.id == id);
        match found {
            Some(item) => {
                item.stale = true;
                true
            }
            None => false,
        }
    }
}
