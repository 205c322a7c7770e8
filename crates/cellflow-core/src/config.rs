//! Session configuration: ordering, scheduling, and heuristic policies.

use serde::{Deserialize, Serialize};

// ============================================================================
// FlowOrder
// ============================================================================

/// Whether cells are expected to execute in positional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowOrder {
    /// Cells may execute in any order (the notebook default).
    #[default]
    AnyOrder,
    /// Cells are expected to run top to bottom.
    InOrder,
}

// ============================================================================
// ExecutionSchedule
// ============================================================================

/// Staleness-determination policy used by the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSchedule {
    /// Positional, liveness-driven staleness (memoized recursive ancestor
    /// check per cell position).
    #[default]
    LivenessBased,
    /// Structural staleness from dynamic/static parent executions,
    /// fixpoint-iterated across all cells; ignores positions.
    DagBased,
    /// Liveness-based plus the kill rule: a symbol rewritten after a cell's
    /// run forces that cell stale. Only valid with [`FlowOrder::InOrder`].
    Strict,
}

// ============================================================================
// FlowSettings
// ============================================================================

/// Tunable policies for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSettings {
    /// Expected execution ordering.
    pub flow_order: FlowOrder,
    /// Staleness-determination policy.
    pub exec_schedule: ExecutionSchedule,
    /// Use runtime-captured dependency edges for slicing.
    pub dynamic_slicing: bool,
    /// Use liveness-derived dependency edges for slicing.
    pub static_slicing: bool,
    /// Opportunistically typecheck reconstructed slices.
    pub typecheck: bool,
    /// Whether the session is already re-running reactively; suppresses the
    /// forced-reactive cascade.
    pub reactive_mode: bool,
    /// Size bound (in the instrumentation's size-hint units) above which the
    /// equal-looking-rebind heuristic assumes the value changed.
    pub equality_size_cap: u64,
}

impl Default for FlowSettings {
    fn default() -> Self {
        FlowSettings {
            flow_order: FlowOrder::default(),
            exec_schedule: ExecutionSchedule::default(),
            dynamic_slicing: true,
            static_slicing: true,
            typecheck: false,
            reactive_mode: false,
            equality_size_cap: 4096,
        }
    }
}

impl FlowSettings {
    /// Set the flow order.
    pub fn with_flow_order(mut self, order: FlowOrder) -> Self {
        self.flow_order = order;
        self
    }

    /// Set the execution schedule.
    pub fn with_schedule(mut self, schedule: ExecutionSchedule) -> Self {
        self.exec_schedule = schedule;
        self
    }

    /// Enable or disable dynamic slicing edges.
    pub fn with_dynamic_slicing(mut self, enabled: bool) -> Self {
        self.dynamic_slicing = enabled;
        self
    }

    /// Enable or disable static slicing edges.
    pub fn with_static_slicing(mut self, enabled: bool) -> Self {
        self.static_slicing = enabled;
        self
    }

    /// Enable or disable opportunistic typechecking.
    pub fn with_typecheck(mut self, enabled: bool) -> Self {
        self.typecheck = enabled;
        self
    }

    /// Mark the session as already executing reactively.
    pub fn with_reactive_mode(mut self, enabled: bool) -> Self {
        self.reactive_mode = enabled;
        self
    }

    /// Whether the schedule/order combination is valid.
    pub fn schedule_is_valid(&self) -> bool {
        !(self.exec_schedule == ExecutionSchedule::Strict && self.flow_order != FlowOrder::InOrder)
    }
}

// ============================================================================
// Tests
// ============================================================================
