//! Incremental dependency tracking for interactive notebook execution.
//!
//! The engine maintains a live dependency graph between the symbols a kernel
//! session defines, keyed by logical timestamps, so a host can answer: which
//! cells are *waiting* on stale inputs, which are *ready* to re-run with
//! effect, and what minimal slice of past code reproduces a result.
//!
//! The crate is runtime-agnostic. Instrumentation feeds it opaque value
//! identities and binding events; a host-supplied [`LivenessModel`] reports
//! what each cell reads. Nothing here parses or executes code.
//!
//! Typical driving loop:
//!
//! ```
//! use cellflow_core::{
//!     BindEvent, CellId, FlowSession, FlowSettings, LiveRef, RefChain, ScriptedLiveness,
//!     SymbolName, ValueId, ValueStamp,
//! };
//!
//! let liveness = ScriptedLiveness::new()
//!     .live(CellId::new(2), vec![LiveRef::plain(RefChain::name("x"))]);
//! let mut session = FlowSession::new(FlowSettings::default(), Box::new(liveness)).unwrap();
//! let scope = session.global_scope();
//!
//! session.begin_cell_execution(CellId::new(1), "x = 0").unwrap();
//! session.next_statement("x = 0").unwrap();
//! session
//!     .bind(BindEvent::assign(
//!         scope,
//!         SymbolName::ident("x"),
//!         ValueStamp::new(ValueId::new(1), "int"),
//!     ))
//!     .unwrap();
//! session.end_cell_execution().unwrap();
//!
//! let result = session.check_all_cells();
//! assert!(result.waiting_cells.is_empty());
//! ```

pub mod alias;
pub mod cell;
pub mod checker;
pub mod config;
pub mod error;
pub mod graph;
pub mod liveness;
mod propagate;
pub mod scope;
pub mod session;
pub mod slice;
pub mod symbol;
pub mod test_helpers;
pub mod timestamp;
pub mod value;

pub use alias::{AliasEntry, AliasIndex, ReleaseState};
pub use cell::{CellId, CellRecord, CellStore};
pub use checker::{Checker, CheckerResult};
pub use config::{ExecutionSchedule, FlowOrder, FlowSettings};
pub use error::{FlowError, FlowResult};
pub use graph::{BindEvent, FlowGraph};
pub use liveness::{
    resolve_chain, CellLiveness, ChainLink, LiveRef, LivenessModel, RefChain, ResolvedRef,
    TypeChecker,
};
pub use scope::{ScopeData, ScopeId, ScopeKind};
pub use session::FlowSession;
pub use slice::{compute_slice, seeds_for_counter};
pub use symbol::{SymbolData, SymbolId, SymbolKind, SymbolName};
pub use test_helpers::{AcceptAllTypes, RejectFragments, ScriptedLiveness};
pub use timestamp::{ExecClock, Timestamp};
pub use value::{ValueId, ValueStamp};
