//! The session facade: one tracked notebook kernel.
//!
//! [`FlowSession`] ties the pieces together for a host: the dependency graph
//! and clock, the cell store, the checker, and the host-supplied liveness
//! model (plus an optional typechecker). Instrumentation drives it with a
//! begin/events/end bracket per cell execution; between executions the host
//! asks for checker results, slices, and staleness answers.
//!
//! The session enforces the execution bracket: binding events outside an
//! open execution are API misuse and surface as [`FlowError`] values rather
//! than silently corrupting timestamps.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::cell::{CellId, CellStore};
use crate::checker::{Checker, CheckerResult};
use crate::config::FlowSettings;
use crate::error::{FlowError, FlowResult};
use crate::graph::{BindEvent, FlowGraph};
use crate::liveness::{LivenessModel, TypeChecker};
use crate::scope::ScopeId;
use crate::slice;
use crate::symbol::{SymbolId, SymbolName};
use crate::timestamp::Timestamp;
use crate::value::{ValueId, ValueStamp};

// ============================================================================
// FlowSession
// ============================================================================

/// One tracked kernel session.
pub struct FlowSession {
    graph: FlowGraph,
    cells: CellStore,
    checker: Checker,
    liveness: Box<dyn LivenessModel>,
    typechecker: Option<Box<dyn TypeChecker>>,
    active_cell: Option<CellId>,
}

impl FlowSession {
    /// Create a session. Fails when the settings combination is invalid.
    pub fn new(settings: FlowSettings, liveness: Box<dyn LivenessModel>) -> FlowResult<Self> {
        if !settings.schedule_is_valid() {
            return Err(FlowError::invalid_settings(
                "strict schedule requires in-order flow",
            ));
        }
        info!(schedule = ?settings.exec_schedule, order = ?settings.flow_order, "session created");
        Ok(FlowSession {
            graph: FlowGraph::new(settings),
            cells: CellStore::new(),
            checker: Checker::new(),
            liveness,
            typechecker: None,
            active_cell: None,
        })
    }

    /// Attach a typechecker for reconstructed slices.
    pub fn with_typechecker(mut self, typechecker: Box<dyn TypeChecker>) -> Self {
        self.typechecker = Some(typechecker);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The dependency graph.
    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    /// The cell store.
    pub fn cells(&self) -> &CellStore {
        &self.cells
    }

    /// Symbols updated during the current (or just-finished) execution.
    pub fn updated_symbols(&self) -> &BTreeSet<SymbolId> {
        self.graph.updated_symbols()
    }

    /// The global scope id.
    pub fn global_scope(&self) -> ScopeId {
        self.graph.global_scope()
    }

    /// The cell that produced execution counter `counter`.
    pub fn cell_of_counter(&self, counter: u64) -> Option<&crate::cell::CellRecord> {
        self.cells
            .cell_of_counter(counter)
            .and_then(|id| self.cells.cell(id))
    }

    /// All tracked cells in current notebook order.
    pub fn cells_by_position(&self) -> Vec<&crate::cell::CellRecord> {
        self.cells.cells_by_position()
    }

    /// Create a lexical scope chained to `parent`.
    pub fn make_child_scope(&mut self, name: impl Into<String>, parent: ScopeId) -> ScopeId {
        self.graph.make_child_scope(name, parent)
    }

    // ------------------------------------------------------------------
    // Execution bracket
    // ------------------------------------------------------------------

    /// Open an execution bracket for `cell_id`, advancing the clock and
    /// recording the cell content. Returns the new execution counter.
    pub fn begin_cell_execution(&mut self, cell_id: CellId, content: &str) -> FlowResult<u64> {
        if let Some(active) = self.active_cell {
            return Err(FlowError::ExecutionInProgress { cell_id: active });
        }
        let counter = self.graph.begin_cell();
        self.cells.record_execution(cell_id, counter, content);
        self.active_cell = Some(cell_id);
        debug!(cell = %cell_id, counter, "execution started");
        Ok(counter)
    }

    /// Advance to the next statement boundary, recording its source.
    pub fn next_statement(&mut self, source: &str) -> FlowResult<Timestamp> {
        self.require_active()?;
        let ts = self.graph.next_statement();
        self.cells.record_statement(ts, source);
        Ok(ts)
    }

    /// Apply one binding event.
    pub fn bind(&mut self, event: BindEvent) -> FlowResult<SymbolId> {
        self.require_active()?;
        Ok(self.graph.bind(event))
    }

    /// Record an observed member access.
    pub fn record_member_access(
        &mut self,
        owner: ValueId,
        name: SymbolName,
        value: ValueStamp,
    ) -> FlowResult<SymbolId> {
        self.require_active()?;
        Ok(self.graph.record_member_access(owner, name, value))
    }

    /// Clone a class namespace for a freshly constructed instance.
    pub fn record_instance_of(
        &mut self,
        class_value: ValueId,
        instance_value: ValueId,
    ) -> FlowResult<ScopeId> {
        self.require_active()?;
        Ok(self.graph.clone_namespace(class_value, instance_value))
    }

    /// Delete a binding.
    pub fn delete(&mut self, scope: ScopeId, name: &SymbolName) -> FlowResult<Option<SymbolId>> {
        self.require_active()?;
        Ok(self.graph.delete(scope, name))
    }

    /// Close the execution bracket: derive the cell's dynamic parent
    /// executions from the dependency edges recorded during the run.
    pub fn end_cell_execution(&mut self) -> FlowResult<CellId> {
        let Some(cell_id) = self.active_cell.take() else {
            return Err(FlowError::NoActiveExecution);
        };
        let counter = self.graph.clock().counter();
        let range = Timestamp::cell_start(counter)..Timestamp::cell_start(counter + 1);
        let parents: BTreeSet<Timestamp> = self
            .graph
            .dynamic_deps()
            .range(range)
            .flat_map(|(_, targets)| targets.iter().copied())
            .filter(|ts| !ts.in_counter(counter))
            .collect();
        if let Some(record) = self.cells.cell_mut(cell_id) {
            record.dynamic_parents = parents;
        }
        debug!(cell = %cell_id, counter, updated = self.graph.updated_symbols().len(),
               "execution finished");
        Ok(cell_id)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Run a checker pass over every executed cell.
    pub fn check_all_cells(&mut self) -> CheckerResult {
        self.checker.check_and_link(
            &mut self.graph,
            &mut self.cells,
            self.liveness.as_ref(),
            self.typechecker.as_deref(),
            None,
        )
    }

    /// Run a checker pass restricted to `cell_ids`.
    pub fn check_and_link_cells(&mut self, cell_ids: &[CellId]) -> CheckerResult {
        self.checker.check_and_link(
            &mut self.graph,
            &mut self.cells,
            self.liveness.as_ref(),
            self.typechecker.as_deref(),
            Some(cell_ids),
        )
    }

    /// Whether `symbol` is stale as seen from a cell at `position`.
    pub fn is_stale(&mut self, symbol: SymbolId, position: u32) -> bool {
        self.checker
            .symbol_is_stale(&self.graph, &self.cells, symbol, position, true)
    }

    /// Backward slice reproducing the latest executions of `cell_ids`.
    pub fn compute_slice(
        &self,
        cell_ids: &[CellId],
        stmt_level: bool,
    ) -> FlowResult<BTreeMap<u64, String>> {
        let mut seeds: BTreeSet<Timestamp> = BTreeSet::new();
        for &cell_id in cell_ids {
            let record = self
                .cells
                .cell(cell_id)
                .ok_or(FlowError::UnknownCell { cell_id })?;
            seeds.extend(slice::seeds_for_counter(&self.graph, &self.cells, record.counter));
        }
        Ok(slice::compute_slice(&self.graph, &self.cells, &seeds, stmt_level))
    }

    /// Apply a reorder notification from the host.
    pub fn set_cell_positions(&mut self, positions: &BTreeMap<CellId, u32>) {
        self.cells.set_positions(positions);
        self.checker.invalidate_positions();
    }

    /// Release all tracked state through the synchronous collection path.
    pub fn teardown(&mut self) {
        info!(symbols = self.graph.symbol_count(), cells = self.cells.len(), "session teardown");
        self.graph.teardown();
        self.active_cell = None;
    }

    fn require_active(&self) -> FlowResult<()> {
        if self.active_cell.is_none() {
            return Err(FlowError::NoActiveExecution);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellRecord;
    use crate::config::{ExecutionSchedule, FlowOrder};
    use crate::liveness::CellLiveness;

    struct NoLiveness;
    impl LivenessModel for NoLiveness {
        fn cell_liveness(&self, _cell: &CellRecord) -> CellLiveness {
            CellLiveness::default()
        }
    }

    fn session() -> FlowSession {
        FlowSession::new(FlowSettings::default(), Box::new(NoLiveness)).unwrap()
    }

    fn stamp(id: u64) -> ValueStamp {
        ValueStamp::new(ValueId::new(id), "int")
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = FlowSettings::default().with_schedule(ExecutionSchedule::Strict);
        let err = FlowSession::new(settings, Box::new(NoLiveness)).err().unwrap();
        assert!(matches!(err, FlowError::InvalidSettings { .. }));

        let settings = FlowSettings::default()
            .with_schedule(ExecutionSchedule::Strict)
            .with_flow_order(FlowOrder::InOrder);
        assert!(FlowSession::new(settings, Box::new(NoLiveness)).is_ok());
    }

    #[test]
    fn events_outside_bracket_are_rejected() {
        let mut s = session();
        let global = s.global_scope();
        let err = s
            .bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(1)))
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::NoActiveExecution));
        assert!(matches!(
            s.end_cell_execution().err().unwrap(),
            FlowError::NoActiveExecution
        ));
    }

    #[test]
    fn nested_executions_are_rejected() {
        let mut s = session();
        s.begin_cell_execution(CellId::new(1), "x = 0").unwrap();
        let err = s.begin_cell_execution(CellId::new(2), "y = 1").err().unwrap();
        assert!(matches!(err, FlowError::ExecutionInProgress { .. }));
    }

    #[test]
    fn bracket_records_dynamic_parents() {
        let mut s = session();
        let global = s.global_scope();

        s.begin_cell_execution(CellId::new(1), "x = 0").unwrap();
        s.next_statement("x = 0").unwrap();
        let x = s
            .bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(1)))
            .unwrap();
        s.end_cell_execution().unwrap();

        s.begin_cell_execution(CellId::new(2), "y = x + 1").unwrap();
        s.next_statement("y = x + 1").unwrap();
        s.bind(BindEvent::assign(global, SymbolName::ident("y"), stamp(2)).with_parents([x]))
            .unwrap();
        s.end_cell_execution().unwrap();

        let record = s.cells().cell(CellId::new(2)).unwrap();
        assert_eq!(
            record.dynamic_parents,
            BTreeSet::from([Timestamp::new(1, 1)])
        );
        // Intra-cell edges never become parent executions.
        let record1 = s.cells().cell(CellId::new(1)).unwrap();
        assert!(record1.dynamic_parents.is_empty());
    }

    #[test]
    fn slice_through_session_api() {
        let mut s = session();
        let global = s.global_scope();

        s.begin_cell_execution(CellId::new(1), "x = 0").unwrap();
        s.next_statement("x = 0").unwrap();
        let x = s
            .bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(1)))
            .unwrap();
        s.end_cell_execution().unwrap();

        s.begin_cell_execution(CellId::new(2), "y = x + 1").unwrap();
        s.next_statement("y = x + 1").unwrap();
        s.bind(BindEvent::assign(global, SymbolName::ident("y"), stamp(2)).with_parents([x]))
            .unwrap();
        s.end_cell_execution().unwrap();

        let slice = s.compute_slice(&[CellId::new(2)], false).unwrap();
        assert_eq!(slice.keys().copied().collect::<Vec<u64>>(), vec![1, 2]);

        let err = s.compute_slice(&[CellId::new(99)], false).err().unwrap();
        assert!(matches!(err, FlowError::UnknownCell { .. }));
    }

    #[test]
    fn teardown_clears_bindings() {
        let mut s = session();
        let global = s.global_scope();
        s.begin_cell_execution(CellId::new(1), "x = 0").unwrap();
        s.next_statement("x = 0").unwrap();
        s.bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(1)))
            .unwrap();
        s.end_cell_execution().unwrap();

        s.teardown();
        assert!(s.graph().lookup(global, &SymbolName::ident("x")).is_none());
    }
}
