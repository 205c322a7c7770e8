//! The dependency graph: arena storage plus the bind/lookup/delete
//! operations instrumentation drives.
//!
//! [`FlowGraph`] owns every symbol and scope record, the per-value namespace
//! registry, the alias index with its explicit reference counts, the logical
//! clock, and the dynamic/static timestamp dependency maps consumed by the
//! slicer. There is no global state anywhere: a graph is constructed per
//! session and passed explicitly.
//!
//! Storage follows the arena-with-id-newtypes pattern: records live in
//! `Vec`s indexed by their ids, and cross-references are ids, never
//! references. All ids handed out by a graph are valid for its lifetime;
//! records are tombstoned, not removed.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::alias::{AliasIndex, ReleaseState};
use crate::config::FlowSettings;
use crate::propagate;
use crate::scope::{ScopeData, ScopeId, ScopeKind};
use crate::symbol::{SymbolData, SymbolId, SymbolKind, SymbolName};
use crate::timestamp::{ExecClock, Timestamp};
use crate::value::{ValueId, ValueStamp};

// ============================================================================
// BindEvent
// ============================================================================

/// One observed binding event: assignment, attribute store, subscript store,
/// or mutating call. Emitted by instrumentation, one call per event.
#[derive(Debug, Clone)]
pub struct BindEvent {
    /// Name being bound within `scope`.
    pub name: SymbolName,
    /// Scope receiving the binding (a namespace scope for member stores).
    pub scope: ScopeId,
    /// Descriptor of the bound value.
    pub value: ValueStamp,
    /// Symbols the right-hand side read.
    pub parents: BTreeSet<SymbolId>,
    /// Binding kind.
    pub kind: SymbolKind,
    /// Replace the parent set (plain assignment) rather than union into it
    /// (augmented assignment).
    pub overwrite: bool,
    /// The event is an in-place mutation, not a rebind.
    pub mutated: bool,
    /// Flag the symbol reactive.
    pub reactive: bool,
}

impl BindEvent {
    /// A plain assignment: overwrite semantics, not a mutation. The default
    /// kind follows the name shape (subscript names bind subscript symbols).
    pub fn assign(scope: ScopeId, name: SymbolName, value: ValueStamp) -> Self {
        let kind = match name {
            SymbolName::Index(_) => SymbolKind::Subscript,
            SymbolName::Anon(_) => SymbolKind::Anonymous,
            SymbolName::Ident(_) => SymbolKind::Variable,
        };
        BindEvent {
            name,
            scope,
            value,
            parents: BTreeSet::new(),
            kind,
            overwrite: true,
            mutated: false,
            reactive: false,
        }
    }

    /// Set the declared parents.
    pub fn with_parents(mut self, parents: impl IntoIterator<Item = SymbolId>) -> Self {
        self.parents = parents.into_iter().collect();
        self
    }

    /// Set the symbol kind.
    pub fn with_kind(mut self, kind: SymbolKind) -> Self {
        self.kind = kind;
        self
    }

    /// Augmented-assignment semantics: union parents instead of replacing.
    pub fn augmented(mut self) -> Self {
        self.overwrite = false;
        self
    }

    /// In-place mutation semantics: the value identity is unchanged and the
    /// symbol's timestamp is preserved.
    pub fn mutation(mut self) -> Self {
        self.mutated = true;
        self.overwrite = false;
        self
    }

    /// Flag the bound symbol reactive.
    pub fn reactive(mut self) -> Self {
        self.reactive = true;
        self
    }
}

// ============================================================================
// FlowGraph
// ============================================================================

/// The session's dependency graph and clock.
#[derive(Debug)]
pub struct FlowGraph {
    settings: FlowSettings,
    clock: ExecClock,
    symbols: Vec<SymbolData>,
    scopes: Vec<ScopeData>,
    global_scope: ScopeId,
    namespaces: HashMap<ValueId, ScopeId>,
    namespace_clones: HashMap<ScopeId, Vec<ScopeId>>,
    aliases: AliasIndex,
    anon_counter: u64,
    updated_symbols: BTreeSet<SymbolId>,
    dynamic_deps: BTreeMap<Timestamp, BTreeSet<Timestamp>>,
    static_deps: BTreeMap<Timestamp, BTreeSet<Timestamp>>,
}

impl FlowGraph {
    /// Create an empty graph with a global scope.
    pub fn new(settings: FlowSettings) -> Self {
        let global = ScopeData::new(ScopeId::new(0), "<global>", None, ScopeKind::Global);
        FlowGraph {
            settings,
            clock: ExecClock::new(),
            symbols: Vec::new(),
            scopes: vec![global],
            global_scope: ScopeId::new(0),
            namespaces: HashMap::new(),
            namespace_clones: HashMap::new(),
            aliases: AliasIndex::new(),
            anon_counter: 0,
            updated_symbols: BTreeSet::new(),
            dynamic_deps: BTreeMap::new(),
            static_deps: BTreeMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The session settings.
    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// Mutable access to the settings; hosts may retune policies between
    /// executions.
    pub fn settings_mut(&mut self) -> &mut FlowSettings {
        &mut self.settings
    }

    /// The logical clock.
    pub fn clock(&self) -> &ExecClock {
        &self.clock
    }

    /// The global scope id.
    pub fn global_scope(&self) -> ScopeId {
        self.global_scope
    }

    /// Fetch a symbol record. Ids from this graph are always valid.
    pub fn symbol(&self, id: SymbolId) -> &SymbolData {
        &self.symbols[id.0 as usize]
    }

    /// Mutable access to a symbol record.
    pub(crate) fn symbol_mut(&mut self, id: SymbolId) -> &mut SymbolData {
        &mut self.symbols[id.0 as usize]
    }

    /// Fetch a scope record.
    pub fn scope(&self, id: ScopeId) -> &ScopeData {
        &self.scopes[id.0 as usize]
    }

    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> &mut ScopeData {
        &mut self.scopes[id.0 as usize]
    }

    /// Number of symbols ever created (tombstoned included).
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// The alias index.
    pub fn aliases(&self) -> &AliasIndex {
        &self.aliases
    }

    /// Symbols bound to `value_id`, in deterministic order.
    pub fn aliases_of(&self, value_id: ValueId) -> Vec<SymbolId> {
        self.aliases.aliases(value_id)
    }

    /// Symbols updated since the current cell execution began.
    pub fn updated_symbols(&self) -> &BTreeSet<SymbolId> {
        &self.updated_symbols
    }

    pub(crate) fn note_updated_symbol(&mut self, id: SymbolId) {
        self.updated_symbols.insert(id);
    }

    /// Runtime-captured dependency edges, event timestamp to the timestamps
    /// it read from.
    pub fn dynamic_deps(&self) -> &BTreeMap<Timestamp, BTreeSet<Timestamp>> {
        &self.dynamic_deps
    }

    /// Liveness-derived dependency edges.
    pub fn static_deps(&self) -> &BTreeMap<Timestamp, BTreeSet<Timestamp>> {
        &self.static_deps
    }

    /// Record a liveness-derived dependency edge.
    pub fn record_static_dep(&mut self, from: Timestamp, to: Timestamp) {
        if from != to {
            self.static_deps.entry(from).or_default().insert(to);
        }
    }

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    /// Start a new cell execution. Clears the updated-symbol set and returns
    /// the new execution counter.
    pub fn begin_cell(&mut self) -> u64 {
        self.updated_symbols.clear();
        self.clock.begin_cell()
    }

    /// Advance to the next statement boundary.
    pub fn next_statement(&mut self) -> Timestamp {
        self.clock.next_statement()
    }

    // ------------------------------------------------------------------
    // Scopes and namespaces
    // ------------------------------------------------------------------

    /// Create a lexical scope chained to `parent`.
    pub fn make_child_scope(&mut self, name: impl Into<String>, parent: ScopeId) -> ScopeId {
        let id = ScopeId::new(self.scopes.len() as u32);
        self.scopes
            .push(ScopeData::new(id, name, Some(parent), ScopeKind::Lexical));
        id
    }

    /// The live namespace for a value, if one exists.
    pub fn namespace_of(&self, value_id: ValueId) -> Option<ScopeId> {
        self.namespaces.get(&value_id).copied()
    }

    /// Instance namespaces cloned from `ns`.
    pub fn clones_of(&self, ns: ScopeId) -> Vec<ScopeId> {
        self.namespace_clones.get(&ns).cloned().unwrap_or_default()
    }

    /// The namespace for a value, created lazily on first use.
    pub fn ensure_namespace(&mut self, value_id: ValueId) -> ScopeId {
        if let Some(ns) = self.namespaces.get(&value_id) {
            return *ns;
        }
        let name = self
            .aliases
            .aliases(value_id)
            .first()
            .map(|s| format!("ns:{}", self.symbol(*s).name))
            .unwrap_or_else(|| format!("ns:{value_id}"));
        let id = ScopeId::new(self.scopes.len() as u32);
        self.scopes.push(ScopeData::new(
            id,
            name,
            None,
            ScopeKind::Namespace {
                value_id,
                cloned_from: None,
            },
        ));
        self.namespaces.insert(value_id, id);
        id
    }

    /// Clone a class namespace for an instance. Members stay shared until a
    /// store through the instance shadows them.
    pub fn clone_namespace(&mut self, class_value: ValueId, instance_value: ValueId) -> ScopeId {
        if let Some(existing) = self.namespaces.get(&instance_value) {
            return *existing;
        }
        let class_ns = self.ensure_namespace(class_value);
        let id = ScopeId::new(self.scopes.len() as u32);
        self.scopes.push(ScopeData::new(
            id,
            format!("{}:instance", self.scope(class_ns).name),
            None,
            ScopeKind::Namespace {
                value_id: instance_value,
                cloned_from: Some(class_ns),
            },
        ));
        self.namespaces.insert(instance_value, id);
        self.namespace_clones.entry(class_ns).or_default().push(id);
        id
    }

    /// Look up a namespace member, following the `cloned_from` chain and
    /// skipping tombstoned entries.
    pub fn namespace_member(&self, ns: ScopeId, name: &SymbolName) -> Option<SymbolId> {
        let mut cursor = Some(ns);
        while let Some(scope_id) = cursor {
            let scope = self.scope(scope_id);
            if let Some(id) = scope.get_local(name) {
                if !self.symbol(id).tombstoned {
                    return Some(id);
                }
            }
            cursor = scope.cloned_from();
        }
        None
    }

    /// Resolve an unqualified name by walking the scope chain. Namespace
    /// scopes do not leak unqualified names and are skipped.
    pub fn lookup(&self, scope: ScopeId, name: &SymbolName) -> Option<SymbolId> {
        let mut cursor = Some(scope);
        while let Some(scope_id) = cursor {
            let record = self.scope(scope_id);
            if !record.is_namespace() {
                if let Some(id) = record.get_local(name) {
                    if !self.symbol(id).tombstoned {
                        return Some(id);
                    }
                }
            }
            cursor = record.parent;
        }
        None
    }

    // ------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------

    /// Apply one binding event and run the update protocol.
    ///
    /// If a symbol of the same kind already occupies `(scope, name)` it is
    /// updated in place, preserving identity; otherwise a new symbol is
    /// created. Never fails: unresolvable inputs degrade to "no tracked
    /// dependency".
    pub fn bind(&mut self, event: BindEvent) -> SymbolId {
        let ts = self.clock.current();
        let existing = self
            .scope(event.scope)
            .get_local(&event.name)
            .filter(|&id| {
                let s = self.symbol(id);
                !s.tombstoned && s.kind == event.kind
            });

        let created = existing.is_none();
        let sym_id = match existing {
            Some(id) => id,
            None => {
                // A tombstoned or different-kind occupant is displaced, not
                // reused: identity only survives same-kind rebinds. The name
                // still changed for the occupant's dependents, so they go
                // stale the same way a deletion stales them.
                if let Some(displaced) = self.scope(event.scope).get_local(&event.name) {
                    propagate::propagate_deletion(self, displaced, ts);
                    self.tombstone_symbol(displaced);
                }
                let id = SymbolId::new(self.symbols.len() as u32);
                self.symbols.push(SymbolData::new(
                    id,
                    event.name.clone(),
                    event.kind,
                    event.scope,
                    event.value.clone(),
                    ts,
                ));
                self.scope_mut(event.scope).insert_local(event.name.clone(), id);
                id
            }
        };

        // Alias index maintenance: every live symbol sits in exactly the
        // bucket of its current value id.
        let prior_value = if created {
            None
        } else {
            self.symbol(sym_id).value.clone()
        };
        let prior_vid = prior_value.as_ref().map(|v| v.value_id);
        if prior_vid != Some(event.value.value_id) {
            if let Some(pv) = prior_vid {
                self.release_symbol_ref(pv, sym_id);
            }
            self.aliases.bind(event.value.value_id, sym_id);
        } else if created {
            self.aliases.bind(event.value.value_id, sym_id);
        }

        // Dynamic slice edges: this event read each declared parent's last
        // update.
        for &p in &event.parents {
            if p == sym_id {
                continue;
            }
            let pts = self.symbol(p).last_updated();
            if pts != ts {
                self.dynamic_deps.entry(ts).or_default().insert(pts);
            }
        }

        if event.reactive {
            self.symbol_mut(sym_id).reactive = true;
        }
        if self.scope(event.scope).is_namespace() {
            self.scope_mut(event.scope).note_defined(ts);
        }

        propagate::apply_update(self, sym_id, &event, prior_value, created);
        self.updated_symbols.insert(sym_id);
        sym_id
    }

    /// Create an anonymous symbol with a unique sequence id.
    pub fn anonymous_symbol(
        &mut self,
        scope: ScopeId,
        value: ValueStamp,
        parents: impl IntoIterator<Item = SymbolId>,
    ) -> SymbolId {
        self.anon_counter += 1;
        let event = BindEvent::assign(scope, SymbolName::Anon(self.anon_counter), value)
            .with_kind(SymbolKind::Anonymous)
            .with_parents(parents);
        self.bind(event)
    }

    /// Record an observed member access on `owner`, creating the member
    /// symbol lazily on first sight. Shared class members are returned
    /// as-is until a store through the instance shadows them.
    pub fn record_member_access(
        &mut self,
        owner: ValueId,
        name: SymbolName,
        value: ValueStamp,
    ) -> SymbolId {
        let ns = self.ensure_namespace(owner);
        if let Some(id) = self.namespace_member(ns, &name) {
            return id;
        }
        let ts = self.clock.current();
        let kind = match name {
            SymbolName::Index(_) => SymbolKind::Subscript,
            SymbolName::Ident(_) => SymbolKind::Variable,
            SymbolName::Anon(_) => SymbolKind::Anonymous,
        };
        let id = SymbolId::new(self.symbols.len() as u32);
        self.symbols
            .push(SymbolData::new(id, name.clone(), kind, ns, value.clone(), ts));
        self.scope_mut(ns).insert_local(name, id);
        self.scope_mut(ns).note_defined(ts);
        self.aliases.bind(value.value_id, id);
        id
    }

    /// Delete a binding: propagate staleness to dependents, then tombstone.
    /// Returns the tombstoned symbol, or `None` if the name was not bound.
    pub fn delete(&mut self, scope: ScopeId, name: &SymbolName) -> Option<SymbolId> {
        let id = self.scope_mut(scope).remove_local(name)?;
        let ts = self.clock.current();
        propagate::propagate_deletion(self, id, ts);
        self.tombstone_symbol(id);
        self.updated_symbols.insert(id);
        Some(id)
    }

    /// Add an explicit containment reference (value held inside a tracked
    /// container without a member symbol).
    pub fn retain_containment(&mut self, value_id: ValueId) {
        self.aliases.retain_containment(value_id);
    }

    /// Drop an explicit containment reference, collecting the value if that
    /// was the last reference.
    pub fn release_containment(&mut self, value_id: ValueId) {
        if self.aliases.release_containment(value_id) == ReleaseState::Released {
            self.collect_value(value_id);
        }
    }

    /// Release everything: tombstone all symbols and collect all values.
    /// Fires the same synchronous release path as ordinary rebinds.
    pub fn teardown(&mut self) {
        for idx in 0..self.symbols.len() {
            self.tombstone_symbol(SymbolId::new(idx as u32));
        }
        for scope in &mut self.scopes {
            scope.attrs.clear();
            scope.subscripts.clear();
            scope.anon.clear();
        }
        self.namespaces.clear();
        self.namespace_clones.clear();
        self.updated_symbols.clear();
    }

    // ------------------------------------------------------------------
    // Internal release path
    // ------------------------------------------------------------------

    pub(crate) fn set_value(&mut self, id: SymbolId, value: ValueStamp) {
        self.symbol_mut(id).value = Some(value);
        self.symbol_mut(id).tombstoned = false;
    }

    fn tombstone_symbol(&mut self, id: SymbolId) {
        if let Some(stamp) = self.symbol_mut(id).tombstone() {
            self.release_symbol_ref(stamp.value_id, id);
        }
    }

    fn release_symbol_ref(&mut self, value_id: ValueId, symbol: SymbolId) {
        if self.aliases.unbind(value_id, symbol) == ReleaseState::Released {
            self.collect_value(value_id);
        }
    }

    /// Synchronous drop hook: the last reference to `value_id` is gone.
    /// Tombstones the value's namespace members and releases their values in
    /// turn; a seen-set keeps cyclic containment from looping.
    fn collect_value(&mut self, value_id: ValueId) {
        let mut seen: HashSet<ValueId> = HashSet::new();
        let mut work = vec![value_id];
        while let Some(v) = work.pop() {
            if !seen.insert(v) {
                continue;
            }
            let Some(ns) = self.namespaces.remove(&v) else {
                continue;
            };
            debug!(value = %v, namespace = %ns, "collecting dead value namespace");
            self.namespace_clones.remove(&ns);
            for member in self.scope(ns).member_ids() {
                if let Some(stamp) = self.symbol_mut(member).tombstone() {
                    if self.aliases.unbind(stamp.value_id, member) == ReleaseState::Released {
                        work.push(stamp.value_id);
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> FlowGraph {
        FlowGraph::new(FlowSettings::default())
    }

    fn stamp(id: u64) -> ValueStamp {
        ValueStamp::new(ValueId::new(id), "int")
    }

    #[test]
    fn bind_creates_then_updates_in_place() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let x1 = g.bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(1)));
        g.begin_cell();
        let x2 = g.bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(2)));
        // Same kind at the same (scope, name) preserves identity.
        assert_eq!(x1, x2);
        assert_eq!(g.symbol(x1).timestamp, Timestamp::cell_start(2));
        assert_eq!(g.symbol_count(), 1);
    }

    #[test]
    fn different_kind_displaces_old_symbol() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let var = g.bind(BindEvent::assign(global, SymbolName::ident("f"), stamp(1)));
        let func = g.bind(
            BindEvent::assign(global, SymbolName::ident("f"), stamp(2))
                .with_kind(SymbolKind::Function),
        );
        assert_ne!(var, func);
        assert!(g.symbol(var).tombstoned);
        assert_eq!(g.lookup(global, &SymbolName::ident("f")), Some(func));
    }

    #[test]
    fn displacing_rebind_marks_old_symbol_dependents_waiting() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let f = g.bind(BindEvent::assign(global, SymbolName::ident("f"), stamp(1)));
        g.begin_cell();
        let y = g.bind(
            BindEvent::assign(global, SymbolName::ident("y"), stamp(2)).with_parents([f]),
        );

        // Shadowing the variable with a def displaces it; y read the old
        // binding and must observe the change.
        g.begin_cell();
        let func = g.bind(
            BindEvent::assign(global, SymbolName::ident("f"), stamp(3))
                .with_kind(SymbolKind::Function),
        );
        assert_ne!(f, func);
        assert!(g.symbol(y).is_waiting());
        assert!(g.symbol(y).fresher_ancestors.contains(&f));
    }

    #[test]
    fn bind_wires_edges_bidirectionally() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let x = g.bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(1)));
        g.begin_cell();
        let y = g.bind(
            BindEvent::assign(global, SymbolName::ident("y"), stamp(2)).with_parents([x]),
        );
        assert!(g.symbol(y).parents.contains_key(&x));
        assert!(g.symbol(x).children.contains_key(&y));
        let tags = &g.symbol(y).parents[&x];
        assert_eq!(tags.iter().next(), Some(&Timestamp::cell_start(2)));
    }

    #[test]
    fn lookup_walks_lexical_chain_and_skips_namespaces() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let x = g.bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(1)));
        let inner = g.make_child_scope("f", global);
        assert_eq!(g.lookup(inner, &SymbolName::ident("x")), Some(x));

        // A namespace member never resolves as an unqualified name.
        let owner = ValueId::new(50);
        g.bind(BindEvent::assign(global, SymbolName::ident("obj"), ValueStamp::new(owner, "obj")));
        let ns = g.ensure_namespace(owner);
        g.bind(BindEvent::assign(ns, SymbolName::ident("hidden"), stamp(3)));
        assert_eq!(g.lookup(inner, &SymbolName::ident("hidden")), None);
    }

    #[test]
    fn alias_index_tracks_rebinds() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let v1 = ValueId::new(1);
        let a = g.bind(BindEvent::assign(global, SymbolName::ident("a"), stamp(1)));
        let b = g.bind(BindEvent::assign(global, SymbolName::ident("b"), stamp(1)));
        assert_eq!(g.aliases_of(v1), vec![a, b]);

        g.begin_cell();
        g.bind(BindEvent::assign(global, SymbolName::ident("b"), stamp(2)));
        assert_eq!(g.aliases_of(v1), vec![a]);
        assert_eq!(g.aliases_of(ValueId::new(2)), vec![b]);
    }

    #[test]
    fn member_access_is_lazy_and_idempotent() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let owner = ValueId::new(9);
        g.bind(BindEvent::assign(global, SymbolName::ident("lst"), ValueStamp::new(owner, "list")));
        assert!(g.namespace_of(owner).is_none());

        let m1 = g.record_member_access(owner, SymbolName::Index(1), stamp(21));
        let m2 = g.record_member_access(owner, SymbolName::Index(1), stamp(21));
        assert_eq!(m1, m2);
        let ns = g.namespace_of(owner).unwrap();
        assert_eq!(g.scope(ns).member_ids(), vec![m1]);
    }

    #[test]
    fn zero_refcount_collects_namespace() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let owner = ValueId::new(9);
        g.bind(BindEvent::assign(global, SymbolName::ident("d"), ValueStamp::new(owner, "dict")));
        let member = g.record_member_access(owner, SymbolName::Index(5), stamp(21));

        // Rebinding d to a new value drops the last reference to the old one.
        g.begin_cell();
        g.bind(BindEvent::assign(global, SymbolName::ident("d"), ValueStamp::new(ValueId::new(10), "dict")));
        assert!(g.namespace_of(owner).is_none());
        assert!(g.symbol(member).tombstoned);
        assert!(!g.aliases().is_live(owner));
    }

    #[test]
    fn aliased_value_survives_one_rebind() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let owner = ValueId::new(9);
        g.bind(BindEvent::assign(global, SymbolName::ident("a"), ValueStamp::new(owner, "list")));
        g.bind(BindEvent::assign(global, SymbolName::ident("b"), ValueStamp::new(owner, "list")));
        g.record_member_access(owner, SymbolName::Index(0), stamp(21));

        g.begin_cell();
        g.bind(BindEvent::assign(global, SymbolName::ident("a"), stamp(2)));
        // b still references the value; the namespace must survive.
        assert!(g.namespace_of(owner).is_some());
        assert!(g.aliases().is_live(owner));
    }

    #[test]
    fn cloned_namespace_shares_members_until_shadowed() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let class_v = ValueId::new(1);
        let inst_v = ValueId::new(2);
        g.bind(
            BindEvent::assign(global, SymbolName::ident("C"), ValueStamp::new(class_v, "type"))
                .with_kind(SymbolKind::Class),
        );
        let class_ns = g.ensure_namespace(class_v);
        let attr = g.bind(BindEvent::assign(class_ns, SymbolName::ident("a"), stamp(30)));

        g.bind(BindEvent::assign(global, SymbolName::ident("i"), ValueStamp::new(inst_v, "C")));
        let inst_ns = g.clone_namespace(class_v, inst_v);
        // Shared until shadowed.
        assert_eq!(g.namespace_member(inst_ns, &SymbolName::ident("a")), Some(attr));

        let shadow = g.bind(BindEvent::assign(inst_ns, SymbolName::ident("a"), stamp(31)));
        assert_ne!(shadow, attr);
        assert_eq!(g.namespace_member(inst_ns, &SymbolName::ident("a")), Some(shadow));
        assert_eq!(g.namespace_member(class_ns, &SymbolName::ident("a")), Some(attr));
    }

    #[test]
    fn delete_tombstones_and_marks_dependents() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let x = g.bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(1)));
        g.begin_cell();
        let y = g.bind(
            BindEvent::assign(global, SymbolName::ident("y"), stamp(2)).with_parents([x]),
        );
        g.begin_cell();
        let deleted = g.delete(global, &SymbolName::ident("x"));
        assert_eq!(deleted, Some(x));
        assert!(g.symbol(x).tombstoned);
        assert!(g.symbol(y).is_waiting());
        assert_eq!(g.lookup(global, &SymbolName::ident("x")), None);
    }

    #[test]
    fn anonymous_symbols_get_unique_names() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let a = g.anonymous_symbol(global, stamp(1), []);
        let b = g.anonymous_symbol(global, stamp(2), []);
        assert_ne!(g.symbol(a).name, g.symbol(b).name);
    }

    #[test]
    fn teardown_releases_everything() {
        let mut g = graph();
        g.begin_cell();
        let global = g.global_scope();
        let owner = ValueId::new(9);
        g.bind(BindEvent::assign(global, SymbolName::ident("d"), ValueStamp::new(owner, "dict")));
        g.record_member_access(owner, SymbolName::Index(0), stamp(21));
        g.teardown();
        assert!(g.namespace_of(owner).is_none());
        assert!(!g.aliases().is_live(owner));
        assert_eq!(g.lookup(global, &SymbolName::ident("d")), None);
    }

    #[test]
    fn monotonic_timestamps_across_rebinds() {
        let mut g = graph();
        let global = g.global_scope();
        let mut prev = Timestamp::ZERO;
        for i in 0..5 {
            g.begin_cell();
            let x = g.bind(BindEvent::assign(global, SymbolName::ident("x"), stamp(i + 1)));
            assert!(g.symbol(x).timestamp > prev);
            prev = g.symbol(x).timestamp;
        }
    }
}
