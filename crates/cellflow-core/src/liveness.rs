//! Liveness interface: what a cell reads and kills, and how reference
//! chains resolve against the graph.
//!
//! The engine is language-agnostic: it never parses cell content itself.
//! Hosts supply a [`LivenessModel`] that analyzes a cell and reports its live
//! references (reads) and dead references (names the cell rebinds before
//! reading). A live reference is a [`RefChain`] like `lst[1]` or `obj.attr`,
//! optionally flagged as reactively requested or as a call (calls count as
//! deep uses of the callee).
//!
//! [`resolve_chain`] maps a chain to the deepest symbol the graph knows
//! about. A fully resolved chain is a *deep* use (member staleness matters);
//! a chain that stops early, because the member was never accessed under
//! tracing, degrades to a *shallow* use of the longest resolved prefix.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use tracing::trace;

use crate::cell::CellRecord;
use crate::graph::FlowGraph;
use crate::scope::ScopeId;
use crate::symbol::{SymbolId, SymbolName};

// ============================================================================
// RefChain
// ============================================================================

/// One member step in a reference chain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChainLink {
    /// Attribute access (`.name`).
    Attr(String),
    /// Integer subscript access (`[i]`).
    Index(i64),
}

/// A (possibly nested) reference: a root name plus member steps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RefChain {
    /// The unqualified root name.
    pub root: String,
    /// Member steps applied to the root, outermost first.
    pub path: Vec<ChainLink>,
}

impl RefChain {
    /// A bare name reference.
    pub fn name(root: impl Into<String>) -> Self {
        RefChain {
            root: root.into(),
            path: Vec::new(),
        }
    }

    /// Append an attribute step.
    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.path.push(ChainLink::Attr(name.into()));
        self
    }

    /// Append a subscript step.
    pub fn index(mut self, index: i64) -> Self {
        self.path.push(ChainLink::Index(index));
        self
    }
}

impl fmt::Display for RefChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for link in &self.path {
            match link {
                ChainLink::Attr(name) => write!(f, ".{name}")?,
                ChainLink::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Liveness results
// ============================================================================

/// One live reference reported by a liveness model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRef {
    /// The referenced chain.
    pub chain: RefChain,
    /// The reference was reactively requested in the cell source.
    pub reactive: bool,
    /// The reference is called; calls are deep uses.
    pub call: bool,
}

impl LiveRef {
    /// A plain (non-reactive, non-call) live reference.
    pub fn plain(chain: RefChain) -> Self {
        LiveRef {
            chain,
            reactive: false,
            call: false,
        }
    }

    /// Mark the reference reactively requested.
    pub fn reactive(mut self) -> Self {
        self.reactive = true;
        self
    }

    /// Mark the reference as called.
    pub fn called(mut self) -> Self {
        self.call = true;
        self
    }
}

/// Liveness analysis result for one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellLiveness {
    /// References the cell reads before (re)binding them.
    pub live: Vec<LiveRef>,
    /// References the cell kills (rebinds before any read).
    pub dead: BTreeSet<RefChain>,
}

/// Host-supplied liveness analyzer.
pub trait LivenessModel {
    /// Analyze a cell's current content.
    fn cell_liveness(&self, cell: &CellRecord) -> CellLiveness;
}

/// Host-supplied typechecker for reconstructed slices.
pub trait TypeChecker {
    /// Whether `code` typechecks.
    fn typecheck(&self, code: &str) -> bool;
}

// ============================================================================
// Chain resolution
// ============================================================================

/// A live reference resolved against the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRef {
    /// The deepest symbol the chain reached.
    pub symbol: SymbolId,
    /// Whether the whole chain resolved (deep use) or stopped early
    /// (shallow use of a prefix).
    pub deep: bool,
    /// Whether the source reference was reactively requested.
    pub reactive: bool,
}

/// Resolve a reference chain starting from `scope`.
///
/// Returns `None` when even the root name is unbound; mid-chain resolution
/// failures degrade to a shallow use of the deepest resolved prefix rather
/// than failing.
pub fn resolve_chain(graph: &FlowGraph, scope: ScopeId, chain: &RefChain) -> Option<ResolvedRef> {
    let mut symbol = graph.lookup(scope, &SymbolName::ident(&chain.root))?;
    let mut deep = true;
    for link in &chain.path {
        let key = match link {
            ChainLink::Attr(name) => SymbolName::ident(name),
            ChainLink::Index(i) => SymbolName::Index(*i),
        };
        let next = graph
            .symbol(symbol)
            .value_id()
            .and_then(|v| graph.namespace_of(v))
            .and_then(|ns| graph.namespace_member(ns, &key));
        match next {
            Some(member) => symbol = member,
            None => {
                trace!(chain = %chain, stopped_at = %graph.symbol(symbol).name,
                       "chain resolution stopped early, using shallow prefix");
                deep = false;
                break;
            }
        }
    }
    Some(ResolvedRef {
        symbol,
        deep,
        reactive: false,
    })
}

// ============================================================================
// Tests
// ============================================================================
