//! Bounded transposition table with least-recently-used eviction.
//!
//! Keys are 32-bit Zobrist hashes (see [`crate::hash`]); no key verification
//! is stored, so a collision silently returns another position's entry.
//! The table is owned by exactly one search and is never shared.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::{GameState, ZobristTable};

/// Default capacity when none is configured.
pub const DEFAULT_TT_MAX_ENTRIES: usize = 10_000;

/// A cached rollout outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TtEntry {
    /// Outcome value in `[0, 1]` from the root player's point of view.
    pub value: f64,
    pub visits: u32,
}

/// Hash-keyed cache holding at most `max_entries` entries.
///
/// Both [`get`](Self::get) hits and [`set`](Self::set) count as a touch; when
/// an insertion would exceed the capacity the least recently touched entry is
/// evicted.
#[derive(Debug)]
pub struct TranspositionTable {
    entries: FxHashMap<u32, (TtEntry, u64)>,
    /// Touch stamp -> key, oldest first.
    order: BTreeMap<u64, u32>,
    next_stamp: u64,
    max_entries: usize,
    zobrist: ZobristTable,
}

impl TranspositionTable {
    /// Creates an empty table. `seed` makes the Zobrist constants reproducible.
    pub fn new(max_entries: usize, seed: Option<u32>) -> Self {
        TranspositionTable {
            entries: FxHashMap::default(),
            order: BTreeMap::new(),
            next_stamp: 0,
            max_entries: max_entries.max(1),
            zobrist: ZobristTable::new(seed),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Hash used as the key for `state`.
    #[inline]
    pub fn key(&self, state: &GameState) -> u32 {
        self.zobrist.hash(state)
    }

    fn stamp(&mut self) -> u64 {
        let s = self.next_stamp;
        self.next_stamp += 1;
        s
    }

    /// Looks up the entry for `state`, marking it most recently used.
    pub fn get(&mut self, state: &GameState) -> Option<TtEntry> {
        let key = self.key(state);
        self.get_by_key(key)
    }

    pub fn get_by_key(&mut self, key: u32) -> Option<TtEntry> {
        let stamp = self.stamp();
        let (entry, old_stamp) = self.entries.get_mut(&key)?;
        let old = std::mem::replace(old_stamp, stamp);
        let entry = *entry;
        self.order.remove(&old);
        self.order.insert(stamp, key);
        Some(entry)
    }

    /// Replaces the entry for `state` and evicts the oldest entry if over capacity.
    pub fn set(&mut self, state: &GameState, entry: TtEntry) {
        let key = self.key(state);
        self.set_by_key(key, entry);
    }

    pub fn set_by_key(&mut self, key: u32, entry: TtEntry) {
        let stamp = self.stamp();
        if let Some((_, old)) = self.entries.insert(key, (entry, stamp)) {
            self.order.remove(&old);
        }
        self.order.insert(stamp, key);

        while self.entries.len() > self.max_entries {
            match self.order.pop_first() {
                Some((_, oldest)) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
