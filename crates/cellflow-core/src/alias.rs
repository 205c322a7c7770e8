//! Alias index: value identity to the symbols currently bound to it.
//!
//! The index is also the engine's explicit reference-count structure. Every
//! bind/unbind of a symbol to a [`ValueId`] adjusts the named-reference set;
//! containment references (a value held inside a tracked container without a
//! member symbol of its own) are counted separately. A value is garbage
//! exactly when both counts reach zero; the graph reacts to the
//! [`ReleaseState::Released`] signal synchronously by collecting the value's
//! namespace. The engine never inspects a managed runtime's refcounts and
//! never waits for an asynchronous GC callback.

use std::collections::{BTreeSet, HashMap};

use crate::symbol::SymbolId;
use crate::value::ValueId;

// ============================================================================
// ReleaseState
// ============================================================================

/// Outcome of dropping a reference to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseState {
    /// Other references remain; the value stays live.
    StillLive,
    /// That was the last reference; the caller must collect the value now.
    Released,
    /// The value was not tracked (already collected, or never bound).
    Untracked,
}

// ============================================================================
// AliasEntry
// ============================================================================

/// Per-value bookkeeping: bound symbols plus containment references.
#[derive(Debug, Clone, Default)]
pub struct AliasEntry {
    /// Symbols currently bound to this value.
    pub symbols: BTreeSet<SymbolId>,
    /// References from containment (value stored inside a tracked container
    /// without its own member symbol).
    pub containment: u32,
}

impl AliasEntry {
    fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.containment == 0
    }
}

// ============================================================================
// AliasIndex
// ============================================================================

/// Global map from value identity to the set of symbols bound to it.
///
/// Invariant: every non-tombstoned symbol appears in exactly one bucket, the
/// one matching its current value id. The graph is the only writer and keeps
/// the invariant across rebinds.
#[derive(Debug, Default)]
pub struct AliasIndex {
    buckets: HashMap<ValueId, AliasEntry>,
}

impl AliasIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `symbol` is now bound to `value_id`.
    pub fn bind(&mut self, value_id: ValueId, symbol: SymbolId) {
        self.buckets.entry(value_id).or_default().symbols.insert(symbol);
    }

    /// Record that `symbol` is no longer bound to `value_id`.
    pub fn unbind(&mut self, value_id: ValueId, symbol: SymbolId) -> ReleaseState {
        let Some(entry) = self.buckets.get_mut(&value_id) else {
            return ReleaseState::Untracked;
        };
        entry.symbols.remove(&symbol);
        if entry.is_empty() {
            self.buckets.remove(&value_id);
            ReleaseState::Released
        } else {
            ReleaseState::StillLive
        }
    }

    /// Add a containment reference to `value_id`.
    pub fn retain_containment(&mut self, value_id: ValueId) {
        self.buckets.entry(value_id).or_default().containment += 1;
    }

    /// Drop a containment reference from `value_id`.
    pub fn release_containment(&mut self, value_id: ValueId) -> ReleaseState {
        let Some(entry) = self.buckets.get_mut(&value_id) else {
            return ReleaseState::Untracked;
        };
        entry.containment = entry.containment.saturating_sub(1);
        if entry.is_empty() {
            self.buckets.remove(&value_id);
            ReleaseState::Released
        } else {
            ReleaseState::StillLive
        }
    }

    /// The symbols currently bound to `value_id`, in deterministic order.
    pub fn aliases(&self, value_id: ValueId) -> Vec<SymbolId> {
        self.buckets
            .get(&value_id)
            .map(|e| e.symbols.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Total reference count for `value_id` (named + containment).
    pub fn refcount(&self, value_id: ValueId) -> u64 {
        self.buckets
            .get(&value_id)
            .map(|e| e.symbols.len() as u64 + u64::from(e.containment))
            .unwrap_or(0)
    }

    /// Whether `value_id` is still live.
    pub fn is_live(&self, value_id: ValueId) -> bool {
        self.buckets.contains_key(&value_id)
    }
}

// ============================================================================
// Tests
// ============================================================================
