//! Cell and execution records consumed by the checker and the slicer.
//!
//! A [`CellRecord`] describes one logical notebook cell: its stable id, the
//! execution counter of its last run, its current position in the notebook
//! (distinct from the counter, since cells move), its unparsed content, and
//! edges
//! to the *specific prior executions* it depended on, dynamic and static.
//!
//! The [`CellStore`] also keeps per-statement sources keyed by timestamp so
//! the slicer can render statement-level slices.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::timestamp::Timestamp;

// ============================================================================
// CellId
// ============================================================================

/// Stable identifier for a logical cell. Survives re-execution and
/// reordering; the host assigns it once per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct CellId(pub u32);

impl CellId {
    /// Create a new cell id.
    pub fn new(id: u32) -> Self {
        CellId(id)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell_{}", self.0)
    }
}

// ============================================================================
// CellRecord
// ============================================================================

/// One logical cell and its latest execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellRecord {
    /// Stable cell id.
    pub cell_id: CellId,
    /// Execution counter of the last run; 0 means the cell never ran.
    pub counter: u64,
    /// Current linear position in the notebook.
    pub position: u32,
    /// Unparsed cell content as of the last run.
    pub content: String,
    /// Prior executions this run read from, captured at runtime.
    pub dynamic_parents: BTreeSet<Timestamp>,
    /// Prior executions this cell reads from per liveness analysis.
    pub static_parents: BTreeSet<Timestamp>,
}

impl CellRecord {
    /// Whether the cell has ever executed.
    pub fn has_run(&self) -> bool {
        self.counter > 0
    }
}

// ============================================================================
// CellStore
// ============================================================================

/// All tracked cells plus the counter and statement-source indexes.
#[derive(Debug, Default)]
pub struct CellStore {
    cells: BTreeMap<CellId, CellRecord>,
    by_counter: BTreeMap<u64, CellId>,
    stmt_sources: BTreeMap<Timestamp, String>,
    next_position: u32,
}

impl CellStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a cell record.
    pub fn cell(&self, cell_id: CellId) -> Option<&CellRecord> {
        self.cells.get(&cell_id)
    }

    /// Mutable access to a cell record.
    pub fn cell_mut(&mut self, cell_id: CellId) -> Option<&mut CellRecord> {
        self.cells.get_mut(&cell_id)
    }

    /// The cell that produced execution counter `counter`.
    pub fn cell_of_counter(&self, counter: u64) -> Option<CellId> {
        self.by_counter.get(&counter).copied()
    }

    /// The notebook position of the cell that produced `counter`.
    pub fn position_of_counter(&self, counter: u64) -> Option<u32> {
        self.cell_of_counter(counter)
            .and_then(|id| self.cells.get(&id))
            .map(|c| c.position)
    }

    /// Record a new execution of `cell_id` at `counter` with `content`.
    ///
    /// Registers the cell on first sight, assigning the next free position.
    /// The dynamic parent set is reset: it describes the latest execution
    /// only.
    pub fn record_execution(&mut self, cell_id: CellId, counter: u64, content: &str) {
        let next_position = &mut self.next_position;
        let record = self.cells.entry(cell_id).or_insert_with(|| {
            let position = *next_position;
            *next_position += 1;
            CellRecord {
                cell_id,
                counter: 0,
                position,
                content: String::new(),
                dynamic_parents: BTreeSet::new(),
                static_parents: BTreeSet::new(),
            }
        });
        record.counter = counter;
        record.content = content.to_string();
        record.dynamic_parents.clear();
        record.static_parents.clear();
        self.by_counter.insert(counter, cell_id);
    }

    /// Record the source of the statement executing at `ts`.
    pub fn record_statement(&mut self, ts: Timestamp, source: &str) {
        self.stmt_sources.insert(ts, source.to_string());
    }

    /// Statement sources recorded for execution counter `counter`.
    pub fn statements_in_counter(
        &self,
        counter: u64,
    ) -> impl Iterator<Item = (&Timestamp, &String)> {
        self.stmt_sources
            .range(Timestamp::cell_start(counter)..Timestamp::cell_start(counter + 1))
    }

    /// Source of the statement at `ts`, falling back to the producing cell's
    /// whole content.
    pub fn statement_source(&self, ts: Timestamp) -> Option<&str> {
        self.stmt_sources
            .get(&ts)
            .map(String::as_str)
            .or_else(|| self.cell_of_counter(ts.cell_counter).and_then(|id| {
                self.cells.get(&id).map(|c| c.content.as_str())
            }))
    }

    /// Apply a reorder notification from the host.
    pub fn set_positions(&mut self, positions: &BTreeMap<CellId, u32>) {
        for (cell_id, position) in positions {
            if let Some(record) = self.cells.get_mut(cell_id) {
                record.position = *position;
            }
        }
        self.next_position = self
            .cells
            .values()
            .map(|c| c.position + 1)
            .max()
            .unwrap_or(0);
    }

    /// All cells ordered by current notebook position.
    pub fn cells_by_position(&self) -> Vec<&CellRecord> {
        let mut cells: Vec<&CellRecord> = self.cells.values().collect();
        cells.sort_by_key(|c| (c.position, c.cell_id));
        cells
    }

    /// Number of tracked cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_execution_registers_cell_with_next_position() {
        let mut store = CellStore::new();
        store.record_execution(CellId::new(10), 1, "x = 0");
        store.record_execution(CellId::new(11), 2, "y = x");
        assert_eq!(store.cell(CellId::new(10)).unwrap().position, 0);
        assert_eq!(store.cell(CellId::new(11)).unwrap().position, 1);
        assert_eq!(store.cell_of_counter(2), Some(CellId::new(11)));
    }

    #[test]
    fn re_execution_updates_counter_and_clears_parents() {
        let mut store = CellStore::new();
        store.record_execution(CellId::new(1), 1, "x = 0");
        store
            .cell_mut(CellId::new(1))
            .unwrap()
            .dynamic_parents
            .insert(Timestamp::new(1, 0));
        store.record_execution(CellId::new(1), 5, "x = 1");
        let cell = store.cell(CellId::new(1)).unwrap();
        assert_eq!(cell.counter, 5);
        assert_eq!(cell.content, "x = 1");
        assert!(cell.dynamic_parents.is_empty());
        // Both counters map back to the same cell.
        assert_eq!(store.cell_of_counter(1), Some(CellId::new(1)));
        assert_eq!(store.cell_of_counter(5), Some(CellId::new(1)));
    }

    #[test]
    fn statement_sources_are_scoped_to_counter() {
        let mut store = CellStore::new();
        store.record_execution(CellId::new(1), 3, "a = 1\nb = 2");
        store.record_statement(Timestamp::new(3, 1), "a = 1");
        store.record_statement(Timestamp::new(3, 2), "b = 2");
        store.record_statement(Timestamp::new(4, 1), "c = 3");
        let stmts: Vec<_> = store.statements_in_counter(3).collect();
        assert_eq!(stmts.len(), 2);
        assert_eq!(store.statement_source(Timestamp::new(3, 2)), Some("b = 2"));
        // Unknown offset falls back to whole-cell content.
        assert_eq!(
            store.statement_source(Timestamp::new(3, 9)),
            Some("a = 1\nb = 2")
        );
    }

    #[test]
    fn set_positions_reorders_cells() {
        let mut store = CellStore::new();
        store.record_execution(CellId::new(1), 1, "a");
        store.record_execution(CellId::new(2), 2, "b");
        let mut positions = BTreeMap::new();
        positions.insert(CellId::new(1), 1);
        positions.insert(CellId::new(2), 0);
        store.set_positions(&positions);
        let ordered: Vec<CellId> = store.cells_by_position().iter().map(|c| c.cell_id).collect();
        assert_eq!(ordered, vec![CellId::new(2), CellId::new(1)]);
    }
}
