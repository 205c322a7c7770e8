//! Scopes and namespaces.
//!
//! Three kinds of scope share one record shape:
//!
//! - the single **global** scope,
//! - **lexical** scopes (function bodies, comprehensions), which chain to
//!   their enclosing scope for unqualified lookup, and
//! - **namespace** scopes, one per live container/object value, exposing that
//!   value's members as child symbols. Namespace scopes never leak
//!   unqualified names: the scope-chain walk skips them.
//!
//! A namespace holds two disjoint member maps (attribute members and
//! subscript members) plus a map for anonymous members. Namespaces are
//! created lazily, the first time instrumentation records a member access;
//! nothing ever enumerates an object's fields eagerly.
//!
//! `cloned_from` supports class-to-instance member sharing: an instance
//! namespace starts empty and falls through to its class namespace until a
//! store through the instance shadows the member.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::symbol::{SymbolId, SymbolName};
use crate::timestamp::Timestamp;
use crate::value::ValueId;

// ============================================================================
// ScopeId
// ============================================================================

/// Unique identifier for a scope within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// Create a new scope id.
    pub fn new(id: u32) -> Self {
        ScopeId(id)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope_{}", self.0)
    }
}

// ============================================================================
// ScopeKind
// ============================================================================

/// What kind of scope a record represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    /// The single top-level scope.
    Global,
    /// A lexical scope chaining to its parent for unqualified lookup.
    Lexical,
    /// A per-value namespace exposing the value's members.
    Namespace {
        /// Identity of the owning value.
        value_id: ValueId,
        /// Class namespace this instance namespace shares members with.
        cloned_from: Option<ScopeId>,
    },
}

// ============================================================================
// ScopeData
// ============================================================================

/// One scope record in the graph arena.
#[derive(Debug, Clone)]
pub struct ScopeData {
    /// This scope's id.
    pub scope_id: ScopeId,
    /// Human-readable name for diagnostics.
    pub name: String,
    /// Enclosing scope for the lookup chain; `None` for the global scope and
    /// for namespaces.
    pub parent: Option<ScopeId>,
    /// Scope kind.
    pub kind: ScopeKind,
    /// Attribute/identifier members.
    pub attrs: BTreeMap<String, SymbolId>,
    /// Subscript members (disjoint from `attrs`).
    pub subscripts: BTreeMap<i64, SymbolId>,
    /// Anonymous members, keyed by their unique sequence id.
    pub anon: BTreeMap<u64, SymbolId>,
    /// Newest timestamp at which any member underneath was defined or
    /// updated.
    pub max_defined_timestamp: Timestamp,
}

impl ScopeData {
    /// Create a scope record.
    pub fn new(
        scope_id: ScopeId,
        name: impl Into<String>,
        parent: Option<ScopeId>,
        kind: ScopeKind,
    ) -> Self {
        ScopeData {
            scope_id,
            name: name.into(),
            parent,
            kind,
            attrs: BTreeMap::new(),
            subscripts: BTreeMap::new(),
            anon: BTreeMap::new(),
            max_defined_timestamp: Timestamp::ZERO,
        }
    }

    /// Whether this is a namespace scope.
    pub fn is_namespace(&self) -> bool {
        matches!(self.kind, ScopeKind::Namespace { .. })
    }

    /// The owning value for a namespace scope.
    pub fn value_id(&self) -> Option<ValueId> {
        match self.kind {
            ScopeKind::Namespace { value_id, .. } => Some(value_id),
            _ => None,
        }
    }

    /// The class namespace this scope was cloned from, if any.
    pub fn cloned_from(&self) -> Option<ScopeId> {
        match self.kind {
            ScopeKind::Namespace { cloned_from, .. } => cloned_from,
            _ => None,
        }
    }

    /// Look up a local member by name. Does not follow `cloned_from` or the
    /// parent chain.
    pub fn get_local(&self, name: &SymbolName) -> Option<SymbolId> {
        match name {
            SymbolName::Ident(n) => self.attrs.get(n).copied(),
            SymbolName::Index(i) => self.subscripts.get(i).copied(),
            SymbolName::Anon(n) => self.anon.get(n).copied(),
        }
    }

    /// Insert or replace a local member entry, returning the previous symbol
    /// if one was displaced.
    pub fn insert_local(&mut self, name: SymbolName, symbol: SymbolId) -> Option<SymbolId> {
        match name {
            SymbolName::Ident(n) => self.attrs.insert(n, symbol),
            SymbolName::Index(i) => self.subscripts.insert(i, symbol),
            SymbolName::Anon(n) => self.anon.insert(n, symbol),
        }
    }

    /// Remove a local member entry.
    pub fn remove_local(&mut self, name: &SymbolName) -> Option<SymbolId> {
        match name {
            SymbolName::Ident(n) => self.attrs.remove(n),
            SymbolName::Index(i) => self.subscripts.remove(i),
            SymbolName::Anon(n) => self.anon.remove(n),
        }
    }

    /// All local member symbols, attributes first, in deterministic order.
    pub fn member_ids(&self) -> Vec<SymbolId> {
        self.attrs
            .values()
            .chain(self.subscripts.values())
            .chain(self.anon.values())
            .copied()
            .collect()
    }

    /// Record that a member underneath was defined or updated at `ts`.
    pub fn note_defined(&mut self, ts: Timestamp) {
        if ts > self.max_defined_timestamp {
            self.max_defined_timestamp = ts;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
