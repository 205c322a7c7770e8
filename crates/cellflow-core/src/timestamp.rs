//! Logical timestamps for out-of-order cell execution.
//!
//! A [`Timestamp`] is the pair `(cell_counter, stmt_offset)`: the global
//! execution counter of the run that produced an event, plus the statement
//! offset within that run. Timestamps are totally ordered and every clock
//! operation is monotonic, so "A happened before B" is always `a < b`.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Timestamp
// ============================================================================

/// Logical clock value: `(cell_counter, stmt_offset)`.
///
/// `cell_counter` is the global, monotonic execution counter (one per cell
/// run). `stmt_offset` positions an event within a single run. The derived
/// ordering compares counters first, then offsets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp {
    /// Global execution counter of the producing run.
    pub cell_counter: u64,
    /// Statement offset within the run (0 = cell start).
    pub stmt_offset: u32,
}

impl Timestamp {
    /// The origin timestamp, earlier than any event.
    pub const ZERO: Timestamp = Timestamp {
        cell_counter: 0,
        stmt_offset: 0,
    };

    /// Create a timestamp from counter and statement offset.
    pub fn new(cell_counter: u64, stmt_offset: u32) -> Self {
        Timestamp {
            cell_counter,
            stmt_offset,
        }
    }

    /// The timestamp at which a run begins (statement offset zero).
    pub fn cell_start(cell_counter: u64) -> Self {
        Timestamp::new(cell_counter, 0)
    }

    /// Whether this timestamp belongs to the given execution counter.
    pub fn in_counter(&self, cell_counter: u64) -> bool {
        self.cell_counter == cell_counter
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts{}:{}", self.cell_counter, self.stmt_offset)
    }
}

// ============================================================================
// ExecClock
// ============================================================================

/// The session's logical clock.
///
/// `begin_cell` bumps the execution counter and resets the statement offset;
/// `next_statement` bumps the offset. Both are monotonic by construction and
/// there is no way to move the clock backwards.
#[derive(Debug, Clone, Default)]
pub struct ExecClock {
    counter: u64,
    stmt_offset: u32,
}

impl ExecClock {
    /// Create a clock positioned before the first execution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new cell execution; returns the new execution counter.
    pub fn begin_cell(&mut self) -> u64 {
        self.counter += 1;
        self.stmt_offset = 0;
        self.counter
    }

    /// Advance to the next statement boundary; returns the new timestamp.
    pub fn next_statement(&mut self) -> Timestamp {
        self.stmt_offset += 1;
        self.current()
    }

    /// The current timestamp.
    pub fn current(&self) -> Timestamp {
        Timestamp::new(self.counter, self.stmt_offset)
    }

    /// The current execution counter (0 before the first run).
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

// ============================================================================
// Tests
// ============================================================================
