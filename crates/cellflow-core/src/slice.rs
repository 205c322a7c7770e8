//! Backward program slicing over the timestamp dependency graphs.
//!
//! A slice answers "which past code is needed to reproduce these seeds":
//! starting from a set of seed timestamps, walk the dynamic and/or static
//! dependency maps backwards to a fixpoint, then render the closure as
//! executable text. The closure stays at statement granularity throughout and
//! is only coarsened to whole cells at render time, so statement-level slices
//! lose no precision.
//!
//! Rendering dedups repeated statement sources by content hash: re-running an
//! unchanged cell contributes its statements once.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cell::CellStore;
use crate::graph::FlowGraph;
use crate::timestamp::Timestamp;

// ============================================================================
// Seeds
// ============================================================================

/// All recorded timestamps belonging to execution counter `counter`:
/// statement sources, dependency-map keys, and the cell-start marker.
pub fn seeds_for_counter(graph: &FlowGraph, cells: &CellStore, counter: u64) -> BTreeSet<Timestamp> {
    let mut seeds: BTreeSet<Timestamp> = BTreeSet::new();
    seeds.insert(Timestamp::cell_start(counter));
    for (ts, _) in cells.statements_in_counter(counter) {
        seeds.insert(*ts);
    }
    let range = Timestamp::cell_start(counter)..Timestamp::cell_start(counter + 1);
    for ts in graph.dynamic_deps().range(range.clone()).map(|(ts, _)| *ts) {
        seeds.insert(ts);
    }
    for ts in graph.static_deps().range(range).map(|(ts, _)| *ts) {
        seeds.insert(ts);
    }
    seeds
}

// ============================================================================
// Slice computation
// ============================================================================

/// Compute the backward closure of `seeds` and render it as a map from
/// execution counter to code, sorted by counter.
///
/// Which dependency maps participate follows the session settings
/// (`dynamic_slicing` / `static_slicing`). With `stmt_level` set, each entry
/// holds only the statements actually needed; otherwise whole-cell content.
pub fn compute_slice(
    graph: &FlowGraph,
    cells: &CellStore,
    seeds: &BTreeSet<Timestamp>,
    stmt_level: bool,
) -> BTreeMap<u64, String> {
    let closure = closure_of(graph, seeds);
    debug!(seeds = seeds.len(), closure = closure.len(), stmt_level, "computed slice closure");
    if stmt_level {
        render_statements(cells, &closure)
    } else {
        render_cells(cells, &closure)
    }
}

fn closure_of(graph: &FlowGraph, seeds: &BTreeSet<Timestamp>) -> BTreeSet<Timestamp> {
    let settings = graph.settings();
    let mut closure: BTreeSet<Timestamp> = seeds.clone();
    let mut work: Vec<Timestamp> = seeds.iter().copied().collect();
    while let Some(ts) = work.pop() {
        if settings.dynamic_slicing {
            if let Some(deps) = graph.dynamic_deps().get(&ts) {
                for &dep in deps {
                    if closure.insert(dep) {
                        work.push(dep);
                    }
                }
            }
        }
        if settings.static_slicing {
            if let Some(deps) = graph.static_deps().get(&ts) {
                for &dep in deps {
                    if closure.insert(dep) {
                        work.push(dep);
                    }
                }
            }
        }
    }
    closure
}

// ============================================================================
// Rendering
// ============================================================================

/// Stable content key for dedup, hex-encoded sha256.
fn content_key(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

fn render_statements(cells: &CellStore, closure: &BTreeSet<Timestamp>) -> BTreeMap<u64, String> {
    let mut out: BTreeMap<u64, Vec<&str>> = BTreeMap::new();
    let mut seen_hashes: HashSet<String> = HashSet::new();
    for &ts in closure {
        let Some(source) = cells.statement_source(ts) else {
            continue;
        };
        if !seen_hashes.insert(content_key(source)) {
            continue;
        }
        out.entry(ts.cell_counter).or_default().push(source);
    }
    out.into_iter()
        .filter(|(_, stmts)| !stmts.is_empty())
        .map(|(counter, stmts)| (counter, stmts.join("\n")))
        .collect()
}

fn render_cells(cells: &CellStore, closure: &BTreeSet<Timestamp>) -> BTreeMap<u64, String> {
    let counters: BTreeSet<u64> = closure.iter().map(|ts| ts.cell_counter).collect();
    let mut out: BTreeMap<u64, String> = BTreeMap::new();
    let mut seen_hashes: HashSet<String> = HashSet::new();
    for counter in counters {
        let Some(cell_id) = cells.cell_of_counter(counter) else {
            continue;
        };
        let Some(record) = cells.cell(cell_id) else {
            continue;
        };
        if !seen_hashes.insert(content_key(&record.content)) {
            continue;
        }
        out.insert(counter, record.content.clone());
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
