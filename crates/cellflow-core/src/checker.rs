//! The notebook checker: per-cell staleness, freshness, and link duals.
//!
//! After every execution the session asks the checker to classify all cells
//! that have run:
//!
//! - **waiting**: the cell reads a symbol that is stale at the cell's
//!   position (directly waiting, or with a stale ancestor along an edge
//!   introduced at or before that position).
//! - **fresh**: not waiting, but some input updated after the cell's last
//!   run, so re-running would change its result.
//! - **new fresh**: fresh because of the update that just happened. Feeding
//!   exactly these to a reactive executor converges: each pass only re-runs
//!   consequences of the previous one.
//! - **waiter/refresher links**: for each waiting cell, the non-waiting
//!   upstream cells whose re-run would unblock it, and the reverse map.
//!
//! Staleness is position-dependent, so the oracle memoizes per
//! `(symbol, position, deep)` and the memo is invalidated whenever the
//! execution counter moves or cells are reordered.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::cell::{CellId, CellStore};
use crate::config::{ExecutionSchedule, FlowOrder};
use crate::graph::FlowGraph;
use crate::liveness::{resolve_chain, LivenessModel, TypeChecker};
use crate::slice;
use crate::symbol::SymbolId;
use crate::timestamp::Timestamp;

// ============================================================================
// CheckerResult
// ============================================================================

/// Classification of every executed cell, produced by one checker pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckerResult {
    /// Cells reading at least one stale symbol.
    pub waiting_cells: BTreeSet<CellId>,
    /// Cells safe to re-run now with effect: fresh cells plus refreshers of
    /// waiting cells.
    pub ready_cells: BTreeSet<CellId>,
    /// Cells made fresh by the update that just happened.
    pub new_fresh_cells: BTreeSet<CellId>,
    /// New-fresh cells pulled in through a reactive symbol.
    pub forced_reactive_cells: BTreeSet<CellId>,
    /// Cells whose reconstructed slice failed the host typechecker.
    pub typecheck_error_cells: BTreeSet<CellId>,
    /// Waiting cell to the non-waiting upstream cells that would unblock it.
    pub waiter_links: BTreeMap<CellId, BTreeSet<CellId>>,
    /// Reverse of `waiter_links`: refresher cell to the waiting cells it
    /// unblocks.
    pub refresher_links: BTreeMap<CellId, BTreeSet<CellId>>,
}

// ============================================================================
// Checker
// ============================================================================

/// Per-cell analysis state carried across one checker pass.
struct Analysis {
    cell_id: CellId,
    counter: u64,
    position: u32,
    resolved: Vec<crate::liveness::ResolvedRef>,
    stale_syms: Vec<SymbolId>,
    max_update_counter: u64,
    stale: bool,
    fresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TypecheckEntry {
    signature: BTreeMap<String, String>,
    ok: bool,
}

/// The checker and its memoized staleness oracle.
#[derive(Default)]
pub struct Checker {
    memo: HashMap<(SymbolId, u32, bool), bool>,
    memo_counter: u64,
    typecheck_cache: HashMap<CellId, TypecheckEntry>,
}

impl Checker {
    /// Create a checker with empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate position-dependent caches after a reorder.
    pub fn invalidate_positions(&mut self) {
        self.memo.clear();
    }

    /// Whether `symbol` is stale as seen from a cell at `position`.
    /// `deep` additionally considers the staleness of namespace members.
    pub fn symbol_is_stale(
        &mut self,
        graph: &FlowGraph,
        cells: &CellStore,
        symbol: SymbolId,
        position: u32,
        deep: bool,
    ) -> bool {
        self.maybe_invalidate(graph.clock().counter());
        let mut oracle = StalenessOracle {
            graph,
            cells,
            memo: &mut self.memo,
        };
        oracle.is_stale_at(symbol, position, deep)
    }

    /// Run one full checker pass over every executed cell (or just `subset`
    /// when given), recording static dependency edges and symbol usage as a
    /// side effect.
    pub fn check_and_link(
        &mut self,
        graph: &mut FlowGraph,
        cells: &mut CellStore,
        liveness: &dyn LivenessModel,
        typechecker: Option<&dyn TypeChecker>,
        subset: Option<&[CellId]>,
    ) -> CheckerResult {
        let current_counter = graph.clock().counter();
        self.maybe_invalidate(current_counter);

        let mut analyses = self.analyze_cells(graph, cells, liveness, subset);
        self.classify(graph, cells, &mut analyses);

        let settings = graph.settings().clone();
        let waiting: BTreeSet<CellId> = analyses
            .iter()
            .filter(|a| a.stale)
            .map(|a| a.cell_id)
            .collect();

        let mut result = CheckerResult {
            waiting_cells: waiting.clone(),
            ..CheckerResult::default()
        };

        // Link duals.
        let by_id: HashMap<CellId, usize> = analyses
            .iter()
            .enumerate()
            .map(|(i, a)| (a.cell_id, i))
            .collect();
        let mut link_memo: HashMap<CellId, BTreeSet<CellId>> = HashMap::new();
        for idx in 0..analyses.len() {
            if !analyses[idx].stale {
                continue;
            }
            let mut visiting = HashSet::new();
            let links = links_for(
                graph,
                cells,
                &analyses,
                &by_id,
                &waiting,
                settings.flow_order,
                idx,
                &mut link_memo,
                &mut visiting,
            );
            let cell_id = analyses[idx].cell_id;
            for &link in &links {
                result
                    .refresher_links
                    .entry(link)
                    .or_default()
                    .insert(cell_id);
            }
            result.waiter_links.insert(cell_id, links);
        }

        // Ready, new-fresh, forced-reactive.
        for a in &analyses {
            if a.fresh {
                result.ready_cells.insert(a.cell_id);
                if a.max_update_counter == current_counter {
                    result.new_fresh_cells.insert(a.cell_id);
                }
            }
        }
        for refresher in result.refresher_links.keys() {
            result.ready_cells.insert(*refresher);
        }
        if !settings.reactive_mode {
            for a in &analyses {
                if !result.new_fresh_cells.contains(&a.cell_id) {
                    continue;
                }
                let reactive_input = a.resolved.iter().any(|r| {
                    let sym = graph.symbol(r.symbol);
                    (sym.reactive || r.reactive)
                        && sym.last_updated().cell_counter > a.counter
                });
                if reactive_input {
                    result.forced_reactive_cells.insert(a.cell_id);
                }
            }
        }

        if settings.typecheck {
            if let Some(tc) = typechecker {
                self.run_typechecks(graph, cells, &analyses, tc, &mut result);
            }
        }

        debug!(
            waiting = result.waiting_cells.len(),
            ready = result.ready_cells.len(),
            new_fresh = result.new_fresh_cells.len(),
            "checker pass complete"
        );
        result
    }

    fn maybe_invalidate(&mut self, counter: u64) {
        if self.memo_counter != counter {
            self.memo.clear();
            self.memo_counter = counter;
        }
    }

    /// Resolve each cell's live references and record usage bookkeeping:
    /// last-used counters and static dependency edges.
    fn analyze_cells(
        &mut self,
        graph: &mut FlowGraph,
        cells: &mut CellStore,
        liveness: &dyn LivenessModel,
        subset: Option<&[CellId]>,
    ) -> Vec<Analysis> {
        let ordered: Vec<CellId> = cells
            .cells_by_position()
            .iter()
            .filter(|c| c.has_run())
            .filter(|c| subset.is_none_or(|ids| ids.contains(&c.cell_id)))
            .map(|c| c.cell_id)
            .collect();

        let mut analyses = Vec::with_capacity(ordered.len());
        for cell_id in ordered {
            let Some(record) = cells.cell(cell_id) else {
                continue;
            };
            let (counter, position) = (record.counter, record.position);
            let lv = liveness.cell_liveness(record);

            let mut resolved = Vec::with_capacity(lv.live.len());
            for live in &lv.live {
                match resolve_chain(graph, graph.global_scope(), &live.chain) {
                    Some(mut r) => {
                        r.reactive |= live.reactive;
                        // A called symbol is used deeply even when the chain
                        // is a bare name.
                        r.deep |= live.call;
                        resolved.push(r);
                    }
                    None => {
                        debug!(cell = %cell_id, chain = %live.chain, "unresolved live reference");
                    }
                }
            }

            let cell_ts = Timestamp::cell_start(counter);
            for r in &resolved {
                let sym = graph.symbol_mut(r.symbol);
                if counter > sym.last_used_counter {
                    sym.last_used_counter = counter;
                }
                let def_ts = graph.symbol(r.symbol).timestamp;
                if !def_ts.in_counter(counter) && def_ts != Timestamp::ZERO {
                    graph.record_static_dep(cell_ts, def_ts);
                    if let Some(record) = cells.cell_mut(cell_id) {
                        record.static_parents.insert(def_ts);
                    }
                }
            }

            let max_update_counter = resolved
                .iter()
                .map(|r| graph.symbol(r.symbol).last_updated().cell_counter)
                .max()
                .unwrap_or(0);

            analyses.push(Analysis {
                cell_id,
                counter,
                position,
                resolved,
                stale_syms: Vec::new(),
                max_update_counter,
                stale: false,
                fresh: false,
            });
        }
        analyses
    }

    /// Fill in stale/fresh per the configured schedule.
    fn classify(&mut self, graph: &FlowGraph, cells: &CellStore, analyses: &mut [Analysis]) {
        match graph.settings().exec_schedule {
            ExecutionSchedule::LivenessBased => {
                self.classify_liveness(graph, cells, analyses, false);
            }
            ExecutionSchedule::Strict => {
                self.classify_liveness(graph, cells, analyses, true);
            }
            ExecutionSchedule::DagBased => {
                classify_dag(cells, analyses);
            }
        }
        for a in analyses {
            a.fresh = !a.stale && a.max_update_counter > a.counter;
        }
    }

    fn classify_liveness(
        &mut self,
        graph: &FlowGraph,
        cells: &CellStore,
        analyses: &mut [Analysis],
        strict: bool,
    ) {
        let mut oracle = StalenessOracle {
            graph,
            cells,
            memo: &mut self.memo,
        };
        for a in analyses.iter_mut() {
            for r in &a.resolved {
                if oracle.is_stale_at(r.symbol, a.position, r.deep) {
                    a.stale_syms.push(r.symbol);
                } else if strict && graph.symbol(r.symbol).timestamp.cell_counter > a.counter {
                    // Kill rule: an input rebound after this cell's run makes
                    // the recorded result unreproducible top to bottom.
                    a.stale_syms.push(r.symbol);
                }
            }
            a.stale = !a.stale_syms.is_empty();
        }
    }

    fn run_typechecks(
        &mut self,
        graph: &FlowGraph,
        cells: &CellStore,
        analyses: &[Analysis],
        typechecker: &dyn TypeChecker,
        result: &mut CheckerResult,
    ) {
        for a in analyses {
            let signature: BTreeMap<String, String> = a
                .resolved
                .iter()
                .filter_map(|r| {
                    let sym = graph.symbol(r.symbol);
                    sym.value
                        .as_ref()
                        .map(|v| (sym.name.to_string(), v.type_name.clone()))
                })
                .collect();
            let cached = self
                .typecheck_cache
                .get(&a.cell_id)
                .filter(|entry| entry.signature == signature)
                .map(|entry| entry.ok);
            let ok = match cached {
                Some(ok) => ok,
                None => {
                    let seeds = slice::seeds_for_counter(graph, cells, a.counter);
                    let rendered = slice::compute_slice(graph, cells, &seeds, false);
                    let code: Vec<&str> = rendered.values().map(String::as_str).collect();
                    let ok = typechecker.typecheck(&code.join("\n"));
                    if !ok {
                        warn!(cell = %a.cell_id, "reconstructed slice failed typecheck");
                    }
                    self.typecheck_cache
                        .insert(a.cell_id, TypecheckEntry { signature, ok });
                    ok
                }
            };
            if !ok {
                result.typecheck_error_cells.insert(a.cell_id);
            }
        }
    }
}

// ============================================================================
// DAG classification
// ============================================================================

/// Structural staleness: a cell is stale when any of its recorded parent
/// executions came from a cell that is now fresh or stale. Iterated to a
/// fixpoint; positions are ignored.
fn classify_dag(cells: &CellStore, analyses: &mut [Analysis]) {
    let by_id: HashMap<CellId, usize> = analyses
        .iter()
        .enumerate()
        .map(|(i, a)| (a.cell_id, i))
        .collect();

    // Parent cell indexes per analysis, from dynamic + static parents.
    let mut parents: Vec<Vec<usize>> = Vec::with_capacity(analyses.len());
    for a in analyses.iter() {
        let mut cell_parents: BTreeSet<usize> = BTreeSet::new();
        if let Some(record) = cells.cell(a.cell_id) {
            for ts in record.dynamic_parents.iter().chain(&record.static_parents) {
                if let Some(parent_cell) = cells.cell_of_counter(ts.cell_counter) {
                    if parent_cell != a.cell_id {
                        if let Some(&idx) = by_id.get(&parent_cell) {
                            cell_parents.insert(idx);
                        }
                    }
                }
            }
        }
        parents.push(cell_parents.into_iter().collect());
    }

    // Seed freshness from symbol updates, then spread staleness downstream.
    for a in analyses.iter_mut() {
        a.fresh = a.max_update_counter > a.counter;
    }
    loop {
        let mut changed = false;
        for idx in 0..analyses.len() {
            if analyses[idx].stale {
                continue;
            }
            let upstream_dirty = parents[idx]
                .iter()
                .any(|&p| analyses[p].stale || analyses[p].fresh);
            if upstream_dirty {
                analyses[idx].stale = true;
                analyses[idx].fresh = false;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

// ============================================================================
// Staleness oracle
// ============================================================================

/// Memoized position-dependent staleness.
struct StalenessOracle<'a> {
    graph: &'a FlowGraph,
    cells: &'a CellStore,
    memo: &'a mut HashMap<(SymbolId, u32, bool), bool>,
}

impl StalenessOracle<'_> {
    /// Whether `symbol` is stale from the standpoint of a cell at `position`.
    ///
    /// A symbol is stale when it is waiting, or when some ancestor along an
    /// edge introduced at or before `position` updated after both the edge
    /// and the symbol's own timestamp, or when such an ancestor is itself
    /// stale. With `deep`, a stale namespace member also makes the symbol
    /// stale.
    fn is_stale_at(&mut self, symbol: SymbolId, position: u32, deep: bool) -> bool {
        let key = (symbol, position, deep);
        if let Some(&cached) = self.memo.get(&key) {
            return cached;
        }
        // Cycle guard: a symbol is not stale through itself.
        self.memo.insert(key, false);
        let result = self.compute(symbol, position, deep);
        self.memo.insert(key, result);
        result
    }

    fn compute(&mut self, symbol: SymbolId, position: u32, deep: bool) -> bool {
        let graph = self.graph;
        let sym = graph.symbol(symbol);
        if sym.tombstoned && !sym.is_waiting() {
            return false;
        }
        if sym.kind == crate::symbol::SymbolKind::Import {
            return false;
        }
        if sym.is_waiting() {
            return true;
        }
        for (&parent, edges) in &sym.parents {
            let parent_sym = graph.symbol(parent);
            for &edge_ts in edges {
                let edge_position = self
                    .cells
                    .position_of_counter(edge_ts.cell_counter)
                    .unwrap_or(u32::MAX);
                if edge_position > position {
                    continue;
                }
                let newer_parent_update = parent_sym
                    .updated_timestamps
                    .iter()
                    .any(|&ts| ts > edge_ts && ts > sym.timestamp);
                if newer_parent_update || self.is_stale_at(parent, position, true) {
                    return true;
                }
            }
        }
        if deep {
            if let Some(ns) = sym.value_id().and_then(|v| graph.namespace_of(v)) {
                for member in graph.scope(ns).member_ids() {
                    if !graph.symbol(member).tombstoned && self.is_stale_at(member, position, true)
                    {
                        return true;
                    }
                }
            }
        }
        false
    }
}

// ============================================================================
// Link computation
// ============================================================================

/// Non-waiting upstream cells whose re-run would unblock the waiting cell at
/// `analyses[idx]`: for each stale symbol, its defining cell if that cell is
/// itself runnable, transitively following waiting defining cells, with the
/// fresher-ancestor set as a fallback when the definition site is the waiter
/// itself.
#[allow(clippy::too_many_arguments)]
fn links_for(
    graph: &FlowGraph,
    cells: &CellStore,
    analyses: &[Analysis],
    by_id: &HashMap<CellId, usize>,
    waiting: &BTreeSet<CellId>,
    order: FlowOrder,
    idx: usize,
    memo: &mut HashMap<CellId, BTreeSet<CellId>>,
    visiting: &mut HashSet<CellId>,
) -> BTreeSet<CellId> {
    let a = &analyses[idx];
    if let Some(cached) = memo.get(&a.cell_id) {
        return cached.clone();
    }
    if !visiting.insert(a.cell_id) {
        return BTreeSet::new();
    }

    let order_ok = |candidate: CellId| -> bool {
        match order {
            FlowOrder::AnyOrder => true,
            FlowOrder::InOrder => cells
                .cell(candidate)
                .is_some_and(|c| c.position < a.position),
        }
    };

    let mut out: BTreeSet<CellId> = BTreeSet::new();
    for &sym_id in &a.stale_syms {
        let sym = graph.symbol(sym_id);
        let def_cell = cells.cell_of_counter(sym.timestamp.cell_counter);
        match def_cell {
            Some(dc) if dc != a.cell_id && !waiting.contains(&dc) => {
                if order_ok(dc) {
                    out.insert(dc);
                }
            }
            Some(dc) if dc != a.cell_id => {
                // The defining cell is itself waiting: whatever unblocks it
                // unblocks us.
                if let Some(&def_idx) = by_id.get(&dc) {
                    out.extend(links_for(
                        graph, cells, analyses, by_id, waiting, order, def_idx, memo, visiting,
                    ));
                }
            }
            _ => {
                // Defined here (or definition unknown): fall back to the
                // ancestors whose updates made the symbol wait.
                for &ancestor in &sym.fresher_ancestors {
                    let update_counter = graph.symbol(ancestor).last_updated().cell_counter;
                    if let Some(ac) = cells.cell_of_counter(update_counter) {
                        if ac != a.cell_id && !waiting.contains(&ac) && order_ok(ac) {
                            out.insert(ac);
                        }
                    }
                }
            }
        }
    }

    visiting.remove(&a.cell_id);
    memo.insert(a.cell_id, out.clone());
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellRecord;
    use crate::config::FlowSettings;
    use crate::graph::BindEvent;
    use crate::liveness::{CellLiveness, LiveRef, RefChain};
    use crate::symbol::SymbolName;
    use crate::value::{ValueId, ValueStamp};

    /// Table-driven liveness: cell id to its live/dead reference chains.
    #[derive(Default)]
    struct TableLiveness {
        rows: HashMap<CellId, CellLiveness>,
    }

    impl TableLiveness {
        fn with_live(mut self, cell: CellId, chains: Vec<LiveRef>) -> Self {
            self.rows.entry(cell).or_default().live = chains;
            self
        }
    }

    impl LivenessModel for TableLiveness {
        fn cell_liveness(&self, cell: &CellRecord) -> CellLiveness {
            self.rows.get(&cell.cell_id).cloned().unwrap_or_default()
        }
    }

    fn stamp(id: u64) -> ValueStamp {
        ValueStamp::new(ValueId::new(id), "int")
    }

    /// The canonical three-cell fixture: `x = 0`, `y = x + 1`, `print(y)`,
    /// then `x = 42` re-run of the first cell.
    fn fixture() -> (FlowGraph, CellStore, TableLiveness) {
        let mut g = FlowGraph::new(FlowSettings::default());
        let mut cells = CellStore::new();
        let global = g.global_scope();

        let c = g.begin_cell();
        cells.record_execution(CellId::new(1), c, "x = 0");
        g.next_statement();
        let x = g.bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(1)));

        let c = g.begin_cell();
        cells.record_execution(CellId::new(2), c, "y = x + 1");
        g.next_statement();
        g.bind(BindEvent::assign(global, SymbolName::ident("y"), stamp(2)).with_parents([x]));

        let c = g.begin_cell();
        cells.record_execution(CellId::new(3), c, "print(y)");
        g.next_statement();

        let c = g.begin_cell();
        cells.record_execution(CellId::new(1), c, "x = 42");
        g.next_statement();
        g.bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(3)));

        let liveness = TableLiveness::default()
            .with_live(CellId::new(2), vec![LiveRef::plain(RefChain::name("x"))])
            .with_live(CellId::new(3), vec![LiveRef::plain(RefChain::name("y"))]);
        (g, cells, liveness)
    }

    #[test]
    fn waiting_and_ready_after_upstream_rebind() {
        let (mut g, mut cells, liveness) = fixture();
        let mut checker = Checker::new();
        let result = checker.check_and_link(&mut g, &mut cells, &liveness, None, None);

        // print(y) waits on stale y; y = x + 1 is fresh and unblocks it.
        assert_eq!(result.waiting_cells, BTreeSet::from([CellId::new(3)]));
        assert!(result.ready_cells.contains(&CellId::new(2)));
        assert!(!result.ready_cells.contains(&CellId::new(3)));
        assert_eq!(
            result.waiter_links.get(&CellId::new(3)),
            Some(&BTreeSet::from([CellId::new(2)]))
        );
        assert_eq!(
            result.refresher_links.get(&CellId::new(2)),
            Some(&BTreeSet::from([CellId::new(3)]))
        );
    }

    #[test]
    fn new_fresh_tracks_latest_update_only() {
        let (mut g, mut cells, liveness) = fixture();
        let mut checker = Checker::new();
        let result = checker.check_and_link(&mut g, &mut cells, &liveness, None, None);
        // Cell 2 became fresh because of the rebind at counter 4.
        assert_eq!(result.new_fresh_cells, BTreeSet::from([CellId::new(2)]));

        // A pass with no intervening execution reports nothing newly fresh.
        let result2 = checker.check_and_link(&mut g, &mut cells, &liveness, None, None);
        assert_eq!(result2.waiting_cells, result.waiting_cells);
        assert_eq!(result2.ready_cells, result.ready_cells);
        assert_eq!(result2.new_fresh_cells, result.new_fresh_cells);
    }

    #[test]
    fn waiting_chain_links_point_past_stale_cells() {
        // a = 1 ; b = a + 1 ; c = b + 1 ; print(c) ; then a reassigned.
        let mut g = FlowGraph::new(FlowSettings::default());
        let mut cells = CellStore::new();
        let global = g.global_scope();

        let c = g.begin_cell();
        cells.record_execution(CellId::new(1), c, "a = 1");
        g.next_statement();
        let a = g.bind(BindEvent::assign(global, SymbolName::ident("a"), stamp(1)));

        let c = g.begin_cell();
        cells.record_execution(CellId::new(2), c, "b = a + 1");
        g.next_statement();
        let b = g.bind(BindEvent::assign(global, SymbolName::ident("b"), stamp(2)).with_parents([a]));

        let c = g.begin_cell();
        cells.record_execution(CellId::new(3), c, "c = b + 1");
        g.next_statement();
        g.bind(BindEvent::assign(global, SymbolName::ident("c"), stamp(3)).with_parents([b]));

        let c = g.begin_cell();
        cells.record_execution(CellId::new(4), c, "print(c)");
        g.next_statement();

        let c = g.begin_cell();
        cells.record_execution(CellId::new(1), c, "a = 10");
        g.next_statement();
        g.bind(BindEvent::assign(global, SymbolName::ident("a"), stamp(4)));

        let liveness = TableLiveness::default()
            .with_live(CellId::new(2), vec![LiveRef::plain(RefChain::name("a"))])
            .with_live(CellId::new(3), vec![LiveRef::plain(RefChain::name("b"))])
            .with_live(CellId::new(4), vec![LiveRef::plain(RefChain::name("c"))]);

        let mut checker = Checker::new();
        let result = checker.check_and_link(&mut g, &mut cells, &liveness, None, None);
        assert_eq!(
            result.waiting_cells,
            BTreeSet::from([CellId::new(3), CellId::new(4)])
        );
        // Cell 3's refresher is cell 2 (fresh). Cell 4's chain passes through
        // waiting cell 3 and lands on the same non-waiting refresher.
        assert_eq!(
            result.waiter_links.get(&CellId::new(3)),
            Some(&BTreeSet::from([CellId::new(2)]))
        );
        assert_eq!(
            result.waiter_links.get(&CellId::new(4)),
            Some(&BTreeSet::from([CellId::new(2)]))
        );
    }

    #[test]
    fn in_order_flow_only_links_earlier_cells() {
        let (mut g, mut cells, _) = fixture();
        // Reorder: the printing cell now sits above its refresher.
        let mut positions = BTreeMap::new();
        positions.insert(CellId::new(3), 0);
        positions.insert(CellId::new(1), 1);
        positions.insert(CellId::new(2), 2);
        cells.set_positions(&positions);

        let liveness = TableLiveness::default()
            .with_live(CellId::new(2), vec![LiveRef::plain(RefChain::name("x"))])
            .with_live(CellId::new(3), vec![LiveRef::plain(RefChain::name("y"))]);
        g.settings_mut().flow_order = FlowOrder::InOrder;

        let mut checker = Checker::new();
        let result = checker.check_and_link(&mut g, &mut cells, &liveness, None, None);
        // The refresher sits below the waiting cell, so no link survives.
        assert_eq!(result.waiting_cells, BTreeSet::from([CellId::new(3)]));
        assert_eq!(
            result.waiter_links.get(&CellId::new(3)),
            Some(&BTreeSet::new())
        );
    }

    #[test]
    fn dag_schedule_spreads_through_parent_executions() {
        let (mut g, mut cells, liveness) = fixture();
        *g.settings_mut() = FlowSettings::default().with_schedule(ExecutionSchedule::DagBased);

        // Record the dynamic parent executions the session layer would have:
        // cell 2 read cell 1's first run, cell 3 read cell 2's run.
        cells
            .cell_mut(CellId::new(2))
            .unwrap()
            .dynamic_parents
            .insert(Timestamp::new(1, 1));
        cells
            .cell_mut(CellId::new(3))
            .unwrap()
            .dynamic_parents
            .insert(Timestamp::new(2, 1));

        let mut checker = Checker::new();
        let result = checker.check_and_link(&mut g, &mut cells, &liveness, None, None);
        // Cell 2 is fresh (x updated after its run); cell 3 inherits
        // staleness structurally from its fresh parent.
        assert!(result.ready_cells.contains(&CellId::new(2)));
        assert!(result.waiting_cells.contains(&CellId::new(3)));
    }

    #[test]
    fn strict_schedule_applies_kill_rule() {
        let (mut g, mut cells, liveness) = fixture();
        *g.settings_mut() = FlowSettings::default()
            .with_flow_order(FlowOrder::InOrder)
            .with_schedule(ExecutionSchedule::Strict);

        let mut checker = Checker::new();
        let result = checker.check_and_link(&mut g, &mut cells, &liveness, None, None);
        // x was rebound (counter 4) after cell 2's run (counter 2): under the
        // kill rule cell 2 itself is stale, not merely fresh.
        assert!(result.waiting_cells.contains(&CellId::new(2)));
        assert!(result.waiting_cells.contains(&CellId::new(3)));
    }

    #[test]
    fn reactive_symbol_forces_new_fresh_cells() {
        let mut g = FlowGraph::new(FlowSettings::default());
        let mut cells = CellStore::new();
        let global = g.global_scope();

        let c = g.begin_cell();
        cells.record_execution(CellId::new(1), c, "r = 0");
        g.next_statement();
        g.bind(BindEvent::assign(global, SymbolName::ident("r"), stamp(1)).reactive());

        let c = g.begin_cell();
        cells.record_execution(CellId::new(2), c, "print(r)");
        g.next_statement();

        let c = g.begin_cell();
        cells.record_execution(CellId::new(1), c, "r = 1");
        g.next_statement();
        g.bind(BindEvent::assign(global, SymbolName::ident("r"), stamp(2)).reactive());

        let liveness = TableLiveness::default()
            .with_live(CellId::new(2), vec![LiveRef::plain(RefChain::name("r"))]);
        let mut checker = Checker::new();
        let result = checker.check_and_link(&mut g, &mut cells, &liveness, None, None);
        assert!(result.new_fresh_cells.contains(&CellId::new(2)));
        assert!(result.forced_reactive_cells.contains(&CellId::new(2)));

        // Inside a reactive re-run the cascade is suppressed.
        *g.settings_mut() = FlowSettings::default().with_reactive_mode(true);
        let mut checker2 = Checker::new();
        let result2 = checker2.check_and_link(&mut g, &mut cells, &liveness, None, None);
        assert!(result2.forced_reactive_cells.is_empty());
    }

    #[test]
    fn typecheck_failures_are_reported_and_cached() {
        struct RejectAll(std::cell::Cell<u32>);
        impl TypeChecker for RejectAll {
            fn typecheck(&self, _code: &str) -> bool {
                self.0.set(self.0.get() + 1);
                false
            }
        }

        let (mut g, mut cells, liveness) = fixture();
        *g.settings_mut() = FlowSettings::default().with_typecheck(true);
        let tc = RejectAll(std::cell::Cell::new(0));

        let mut checker = Checker::new();
        let result = checker.check_and_link(&mut g, &mut cells, &liveness, Some(&tc), None);
        assert!(result.typecheck_error_cells.contains(&CellId::new(2)));
        let first_runs = tc.0.get();
        assert!(first_runs > 0);

        // Unchanged signatures: the cache answers the second pass.
        checker.check_and_link(&mut g, &mut cells, &liveness, Some(&tc), None);
        assert_eq!(tc.0.get(), first_runs);
    }

    #[test]
    fn symbol_staleness_respects_positions() {
        let (mut g, mut cells, liveness) = fixture();
        let mut checker = Checker::new();
        checker.check_and_link(&mut g, &mut cells, &liveness, None, None);
        let y = g.lookup(g.global_scope(), &SymbolName::ident("y")).unwrap();
        assert!(checker.symbol_is_stale(&g, &cells, y, 5, false));
    }
}
