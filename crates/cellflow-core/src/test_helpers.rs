//! Scripted host implementations for tests and embedding experiments.
//!
//! Real hosts derive liveness from parsing cell source. The helpers here
//! replace that with explicit tables so engine behavior can be exercised
//! without a language frontend.

use std::collections::HashMap;

use crate::cell::{CellId, CellRecord};
use crate::liveness::{CellLiveness, LiveRef, LivenessModel, RefChain, TypeChecker};

// ============================================================================
// ScriptedLiveness
// ============================================================================

/// Liveness model driven by an explicit per-cell table.
#[derive(Default)]
pub struct ScriptedLiveness {
    rows: HashMap<CellId, CellLiveness>,
}

impl ScriptedLiveness {
    /// Create an empty table; cells without a row report no references.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the live references for `cell`.
    pub fn live(mut self, cell: CellId, refs: Vec<LiveRef>) -> Self {
        self.rows.entry(cell).or_default().live = refs;
        self
    }

    /// Add a dead (killed) reference for `cell`.
    pub fn dead(mut self, cell: CellId, chain: RefChain) -> Self {
        self.rows.entry(cell).or_default().dead.insert(chain);
        self
    }
}

impl LivenessModel for ScriptedLiveness {
    fn cell_liveness(&self, cell: &CellRecord) -> CellLiveness {
        self.rows.get(&cell.cell_id).cloned().unwrap_or_default()
    }
}

// ============================================================================
// Typecheckers
// ============================================================================

/// Typechecker that accepts everything.
pub struct AcceptAllTypes;

impl TypeChecker for AcceptAllTypes {
    fn typecheck(&self, _code: &str) -> bool {
        true
    }
}

/// Typechecker that rejects code containing any of the given fragments.
pub struct RejectFragments(pub Vec<String>);

impl TypeChecker for RejectFragments {
    fn typecheck(&self, code: &str) -> bool {
        !self.0.iter().any(|fragment| code.contains(fragment))
    }
}
