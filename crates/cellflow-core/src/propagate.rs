//! The update protocol: edge rewiring plus staleness propagation.
//!
//! Every binding event funnels through [`apply_update`]. The protocol first
//! reconciles the updated symbol's dependency edges with the event's declared
//! parents, then walks the graph marking dependents *waiting*: direct
//! children, the aliases of any namespace the symbol lives in, and (for
//! containers) the symbol's own namespace members. A single seen-set bounds
//! the walk, so cyclic graphs terminate and no symbol is marked twice per
//! event.
//!
//! Marked symbols get their `required_timestamp` bumped to the event
//! timestamp and the updated root recorded as a fresher ancestor. The root
//! itself is refreshed, never marked. Import symbols and tombstoned symbols
//! are skipped: an import stays consistent with its module, and a tombstone
//! has nothing left to recompute.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::graph::{BindEvent, FlowGraph};
use crate::symbol::{SymbolId, SymbolKind};
use crate::timestamp::Timestamp;
use crate::value::ValueStamp;

// ============================================================================
// Entry points
// ============================================================================

/// Apply the update protocol for one binding event on `sym_id`.
///
/// `prior_value` is the value stamp the symbol held before this event (or
/// `None` when the symbol was just created).
pub(crate) fn apply_update(
    graph: &mut FlowGraph,
    sym_id: SymbolId,
    event: &BindEvent,
    prior_value: Option<ValueStamp>,
    created: bool,
) {
    let ts = graph.clock().current();

    // A "mutation" of an immutable value is a lie the instrumentation could
    // not see through (e.g. a method call that returned a new value). Ignore
    // it rather than propagate.
    if event.mutated && !event.value.mutable {
        debug!(symbol = %sym_id, value = %event.value.value_id,
               "ignoring mutation event on immutable value");
        return;
    }

    rewire_edges(graph, sym_id, event, ts);

    // Equal-looking rebind: same type, same fingerprint, small enough to
    // trust the fingerprint. Adopt the new value identity but keep the old
    // timestamp so dependents stay fresh.
    let size_cap = graph.settings().equality_size_cap;
    if !created && event.overwrite && !event.mutated {
        let looks_equal = prior_value
            .as_ref()
            .is_some_and(|pv| pv.looks_equal(&event.value, size_cap));
        if looks_equal {
            trace!(symbol = %sym_id, "rebind to equal-looking value, preserving timestamp");
            graph.set_value(sym_id, event.value.clone());
            return;
        }
    }

    graph.set_value(sym_id, event.value.clone());

    let class_redefined =
        event.kind == SymbolKind::Class && event.overwrite && !event.mutated && !created;

    let mut seen: HashSet<SymbolId> = HashSet::new();
    seen.insert(sym_id);
    visit(graph, sym_id, sym_id, ts, &mut seen, true, class_redefined);

    // Redefining a class leaves instances of the *old* definition behind:
    // their cloned namespaces hang off the prior value.
    if class_redefined {
        if let Some(old_ns) = prior_value
            .as_ref()
            .and_then(|pv| graph.namespace_of(pv.value_id))
        {
            for clone in graph.clones_of(old_ns) {
                for member in graph.scope(clone).member_ids() {
                    if seen.insert(member) && mark_waiting(graph, member, sym_id, ts) {
                        visit(graph, member, sym_id, ts, &mut seen, true, false);
                    }
                }
            }
        }
    }

    if event.mutated {
        graph.symbol_mut(sym_id).note_updated(ts);
    } else {
        graph.symbol_mut(sym_id).refresh(ts);
    }
}

/// Propagate staleness for a deleted binding. Children and namespace parents
/// are marked; the symbol's own members are handled by value collection.
pub(crate) fn propagate_deletion(graph: &mut FlowGraph, sym_id: SymbolId, ts: Timestamp) {
    let mut seen: HashSet<SymbolId> = HashSet::new();
    seen.insert(sym_id);
    visit(graph, sym_id, sym_id, ts, &mut seen, false, false);
}

// ============================================================================
// Edge rewiring
// ============================================================================

/// Reconcile the symbol's parent edges with the event's declared parents.
///
/// Overwrite events replace the parent set: edges to dropped parents are
/// removed whole (every introduction tag, both directions). Non-overwrite
/// events union into it. New edges are tagged with the event timestamp;
/// surviving edges keep their original tags. Self-edges are never created.
fn rewire_edges(graph: &mut FlowGraph, sym_id: SymbolId, event: &BindEvent, ts: Timestamp) {
    if event.overwrite {
        let current: Vec<SymbolId> = graph.symbol(sym_id).parents.keys().copied().collect();
        for parent in current {
            if !event.parents.contains(&parent) {
                graph.symbol_mut(sym_id).parents.remove(&parent);
                graph.symbol_mut(parent).children.remove(&sym_id);
            }
        }
    }
    for &parent in &event.parents {
        if parent == sym_id {
            continue;
        }
        if !graph.symbol(sym_id).parents.contains_key(&parent) {
            graph
                .symbol_mut(sym_id)
                .parents
                .entry(parent)
                .or_default()
                .insert(ts);
            graph
                .symbol_mut(parent)
                .children
                .entry(sym_id)
                .or_default()
                .insert(ts);
        }
    }
}

// ============================================================================
// Propagation walk
// ============================================================================

/// Mark `target` waiting on behalf of updated `root`. Returns whether the
/// mark landed (imports and tombstones are skipped).
fn mark_waiting(graph: &mut FlowGraph, target: SymbolId, root: SymbolId, ts: Timestamp) -> bool {
    {
        let sym = graph.symbol(target);
        if sym.kind == SymbolKind::Import || sym.tombstoned {
            return false;
        }
    }
    let sym = graph.symbol_mut(target);
    if ts > sym.required_timestamp {
        sym.required_timestamp = ts;
    }
    sym.fresher_ancestors.insert(root);
    true
}

/// One node of the propagation walk.
///
/// `into_members` gates the namespace-member leg: it is true for the root and
/// for transitively marked dependents, false when reaching a container
/// through the namespace-parent leg (the container's *other* members did not
/// change just because one member did).
fn visit(
    graph: &mut FlowGraph,
    node: SymbolId,
    root: SymbolId,
    ts: Timestamp,
    seen: &mut HashSet<SymbolId>,
    into_members: bool,
    class_redefined: bool,
) {
    // Direct dependents.
    let children: Vec<SymbolId> = graph.symbol(node).children.keys().copied().collect();
    for child in children {
        if seen.insert(child) && mark_waiting(graph, child, root, ts) {
            visit(graph, child, root, ts, seen, true, false);
        }
    }

    // Namespace parents: updating a member updates every alias of the
    // containing value. Aliases are updated, not marked waiting: the
    // container they name really did change.
    let scope_id = graph.symbol(node).scope;
    if let Some(owner) = graph.scope(scope_id).value_id() {
        graph.scope_mut(scope_id).note_defined(ts);
        for alias in graph.aliases_of(owner) {
            if !seen.insert(alias) {
                continue;
            }
            let skip = {
                let sym = graph.symbol(alias);
                sym.kind == SymbolKind::Import || sym.tombstoned
            };
            if skip {
                continue;
            }
            graph.symbol_mut(alias).note_updated(ts);
            graph.note_updated_symbol(alias);
            visit(graph, alias, root, ts, seen, false, false);
        }
    }

    // Namespace members of the node's own value.
    if into_members {
        if let Some(ns) = graph
            .symbol(node)
            .value_id()
            .and_then(|v| graph.namespace_of(v))
        {
            for member in graph.scope(ns).member_ids() {
                if seen.insert(member) && mark_waiting(graph, member, root, ts) {
                    visit(graph, member, root, ts, seen, true, false);
                }
            }
            // Members shadowed into instance clones only go stale when the
            // class itself was redefined, not when one instance mutates a
            // shared attribute.
            if class_redefined {
                for clone in graph.clones_of(ns) {
                    for member in graph.scope(clone).member_ids() {
                        if seen.insert(member) && mark_waiting(graph, member, root, ts) {
                            visit(graph, member, root, ts, seen, true, false);
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
