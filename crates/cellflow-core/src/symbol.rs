//! Symbol records: one tracked binding per name, attribute, or subscript.
//!
//! A symbol is identified by a [`SymbolId`] into the graph's arena. The
//! record carries the binding's value stamp, its timestamps, and the
//! multi-edge parent/child maps that form the dependency graph: each edge is
//! tagged with the set of timestamps at which it was introduced, one tag per
//! introduction event.
//!
//! Symbols are never removed from the arena. Deleting a binding or losing
//! the last reference to its value *tombstones* the symbol: the value stamp
//! is cleared but the edges stay, so staleness bookkeeping for downstream
//! symbols keeps working.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::scope::ScopeId;
use crate::timestamp::Timestamp;
use crate::value::{ValueId, ValueStamp};

// ============================================================================
// SymbolId
// ============================================================================

/// Unique identifier for a symbol within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl SymbolId {
    /// Create a new symbol id.
    pub fn new(id: u32) -> Self {
        SymbolId(id)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym_{}", self.0)
    }
}

// ============================================================================
// SymbolKind
// ============================================================================

/// What kind of binding a symbol represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// Plain variable or attribute binding.
    Variable,
    /// Subscript element of a container.
    Subscript,
    /// Function definition.
    Function,
    /// Class definition.
    Class,
    /// Imported name. Imports are treated as always consistent with their
    /// module and are never made stale by propagation.
    Import,
    /// Anonymous/synthetic binding (e.g. a literal element without a name).
    Anonymous,
}

impl SymbolKind {
    /// Stable string form, used in serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Subscript => "subscript",
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Import => "import",
            SymbolKind::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SymbolName
// ============================================================================

/// A symbol's name within its scope.
///
/// Anonymous symbols are named by a unique sequence id drawn from the graph,
/// never by a derived structural path, so two anonymous symbols sharing a
/// path prefix can never collide in a scope map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SymbolName {
    /// Identifier (variable or attribute name).
    Ident(String),
    /// Integer subscript key.
    Index(i64),
    /// Unique id for an anonymous symbol.
    Anon(u64),
}

impl SymbolName {
    /// Convenience constructor for identifier names.
    pub fn ident(name: impl Into<String>) -> Self {
        SymbolName::Ident(name.into())
    }
}

impl fmt::Display for SymbolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolName::Ident(name) => f.write_str(name),
            SymbolName::Index(i) => write!(f, "[{i}]"),
            SymbolName::Anon(n) => write!(f, "<anon_{n}>"),
        }
    }
}

// ============================================================================
// SymbolData
// ============================================================================

/// One tracked binding and its dependency bookkeeping.
#[derive(Debug, Clone)]
pub struct SymbolData {
    /// This symbol's id in the graph arena.
    pub symbol_id: SymbolId,
    /// Name within the containing scope.
    pub name: SymbolName,
    /// Binding kind.
    pub kind: SymbolKind,
    /// Scope that owns this symbol's map entry. The symbol does not own the
    /// scope.
    pub scope: ScopeId,
    /// Current value descriptor; `None` once tombstoned.
    pub value: Option<ValueStamp>,
    /// Timestamp of the last refresh (rebind with a changed value).
    /// Monotonically non-decreasing.
    pub timestamp: Timestamp,
    /// Timestamp this symbol must reach to be non-waiting. Bumped by
    /// propagation when an ancestor updates.
    pub required_timestamp: Timestamp,
    /// Every timestamp at which this symbol was updated (rebinds and
    /// mutations alike).
    pub updated_timestamps: BTreeSet<Timestamp>,
    /// Dependency edges to ancestors, tagged with introduction timestamps.
    pub parents: BTreeMap<SymbolId, BTreeSet<Timestamp>>,
    /// Reverse edges to dependents, kept mutually consistent with `parents`.
    pub children: BTreeMap<SymbolId, BTreeSet<Timestamp>>,
    /// Ancestors that updated more recently than this symbol; cleared on
    /// refresh.
    pub fresher_ancestors: BTreeSet<SymbolId>,
    /// Whether the binding has been deleted or its value collected.
    pub tombstoned: bool,
    /// Whether the symbol is flagged reactive (drives forced re-execution).
    pub reactive: bool,
    /// Execution counter of the last cell that read this symbol.
    pub last_used_counter: u64,
}

impl SymbolData {
    /// Create a fresh symbol bound at `timestamp`.
    pub fn new(
        symbol_id: SymbolId,
        name: SymbolName,
        kind: SymbolKind,
        scope: ScopeId,
        value: ValueStamp,
        timestamp: Timestamp,
    ) -> Self {
        let mut updated_timestamps = BTreeSet::new();
        updated_timestamps.insert(timestamp);
        SymbolData {
            symbol_id,
            name,
            kind,
            scope,
            value: Some(value),
            timestamp,
            required_timestamp: Timestamp::ZERO,
            updated_timestamps,
            parents: BTreeMap::new(),
            children: BTreeMap::new(),
            fresher_ancestors: BTreeSet::new(),
            tombstoned: false,
            reactive: false,
            last_used_counter: 0,
        }
    }

    /// Identity of the currently bound value, if any.
    pub fn value_id(&self) -> Option<ValueId> {
        self.value.as_ref().map(|v| v.value_id)
    }

    /// Whether the symbol is behind its required timestamp.
    pub fn is_waiting(&self) -> bool {
        self.required_timestamp > self.timestamp
    }

    /// The newest update event, falling back to the refresh timestamp.
    pub fn last_updated(&self) -> Timestamp {
        self.updated_timestamps
            .last()
            .copied()
            .unwrap_or(self.timestamp)
    }

    /// Whether any update landed after `ts`.
    pub fn updated_after(&self, ts: Timestamp) -> bool {
        self.updated_timestamps.last().is_some_and(|last| *last > ts)
    }

    /// Refresh the symbol at `ts`: bump its timestamp and clear the waiting
    /// state. Timestamps never move backwards.
    pub fn refresh(&mut self, ts: Timestamp) {
        debug_assert!(ts >= self.timestamp);
        if ts > self.timestamp {
            self.timestamp = ts;
        }
        self.fresher_ancestors.clear();
        self.updated_timestamps.insert(ts);
    }

    /// Record an update event without refreshing (pure mutation).
    pub fn note_updated(&mut self, ts: Timestamp) {
        self.updated_timestamps.insert(ts);
    }

    /// Tombstone the symbol: drop the value stamp, keep the edges.
    pub fn tombstone(&mut self) -> Option<ValueStamp> {
        self.tombstoned = true;
        self.value.take()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SymbolData {
        SymbolData::new(
            SymbolId::new(0),
            SymbolName::ident("x"),
            SymbolKind::Variable,
            ScopeId::new(0),
            ValueStamp::new(ValueId::new(1), "int"),
            Timestamp::new(1, 0),
        )
    }

    #[test]
    fn new_symbol_is_not_waiting() {
        let sym = sample();
        assert!(!sym.is_waiting());
        assert_eq!(sym.last_updated(), Timestamp::new(1, 0));
    }

    #[test]
    fn required_timestamp_makes_symbol_wait() {
        let mut sym = sample();
        sym.required_timestamp = Timestamp::new(2, 0);
        assert!(sym.is_waiting());
        sym.refresh(Timestamp::new(3, 0));
        assert!(!sym.is_waiting());
    }

    #[test]
    fn refresh_is_monotonic() {
        let mut sym = sample();
        sym.refresh(Timestamp::new(5, 1));
        assert_eq!(sym.timestamp, Timestamp::new(5, 1));
        // Refreshing at the same timestamp is a no-op, not a regression.
        sym.refresh(Timestamp::new(5, 1));
        assert_eq!(sym.timestamp, Timestamp::new(5, 1));
    }

    #[test]
    fn updated_after_scans_newest_event() {
        let mut sym = sample();
        assert!(!sym.updated_after(Timestamp::new(1, 0)));
        sym.note_updated(Timestamp::new(4, 2));
        assert!(sym.updated_after(Timestamp::new(2, 0)));
        assert!(!sym.updated_after(Timestamp::new(4, 2)));
    }

    #[test]
    fn tombstone_clears_value_keeps_edges() {
        let mut sym = sample();
        sym.parents
            .entry(SymbolId::new(7))
            .or_default()
            .insert(Timestamp::new(1, 0));
        let stamp = sym.tombstone();
        assert!(stamp.is_some());
        assert!(sym.tombstoned);
        assert!(sym.value.is_none());
        assert_eq!(sym.parents.len(), 1);
    }

    #[test]
    fn anon_names_are_distinct() {
        assert_ne!(SymbolName::Anon(1), SymbolName::Anon(2));
        assert_eq!(SymbolName::Anon(3).to_string(), "<anon_3>");
    }
}
