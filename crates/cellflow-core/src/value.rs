//! Value identity handles and descriptors.
//!
//! The engine never owns or inspects runtime values. Instrumentation hands it
//! a [`ValueId`] (an opaque identity token, stable for the lifetime of the
//! underlying object) plus a [`ValueStamp`] describing the value well enough
//! for the engine's heuristics: type name, mutability, an optional size hint,
//! and an optional content fingerprint for the bounded equality check used by
//! the equal-looking-rebind optimization.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ValueId
// ============================================================================

/// Opaque identity handle for a runtime value.
///
/// Two names bound to the same `ValueId` are aliases. The instrumentation
/// layer is responsible for keeping ids stable per object identity and never
/// reusing an id while the engine still tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u64);

impl ValueId {
    /// Create a new value id.
    pub fn new(id: u64) -> Self {
        ValueId(id)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "val_{}", self.0)
    }
}

// ============================================================================
// ValueStamp
// ============================================================================

/// Instrumentation-supplied descriptor of a bound value.
///
/// The `fingerprint` is a content hash computed by the instrumentation layer
/// when the value is small enough to hash cheaply; `None` means "too large or
/// not hashable", which the equality heuristic treats as "assume changed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueStamp {
    /// Identity of the value at bind time.
    pub value_id: ValueId,
    /// Runtime type name (e.g. `"list"`, `"int"`, `"DataFrame"`).
    pub type_name: String,
    /// Whether the value can mutate in place. Immutable values ignore
    /// pure-mutation events entirely.
    pub mutable: bool,
    /// Approximate size in elements or bytes, if known.
    pub size_hint: Option<u64>,
    /// Content fingerprint for cheap equality, if the value was small enough
    /// to hash.
    pub fingerprint: Option<u64>,
}

impl ValueStamp {
    /// Create a stamp for a mutable value with no size or fingerprint info.
    pub fn new(value_id: ValueId, type_name: impl Into<String>) -> Self {
        ValueStamp {
            value_id,
            type_name: type_name.into(),
            mutable: true,
            size_hint: None,
            fingerprint: None,
        }
    }

    /// Mark the value immutable.
    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Attach a size hint.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    /// Attach a content fingerprint.
    pub fn with_fingerprint(mut self, fingerprint: u64) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Best-effort equality against another stamp, bounded by `size_cap`.
    ///
    /// Returns true only when both stamps carry fingerprints, both declared
    /// sizes are at or under the cap, and type names and fingerprints match.
    /// Anything unknown counts as "changed"; this is a heuristic, not a
    /// correctness guarantee.
    pub fn looks_equal(&self, other: &ValueStamp, size_cap: u64) -> bool {
        if self.type_name != other.type_name {
            return false;
        }
        let within_cap = |stamp: &ValueStamp| stamp.size_hint.is_some_and(|s| s <= size_cap);
        match (self.fingerprint, other.fingerprint) {
            (Some(a), Some(b)) => within_cap(self) && within_cap(other) && a == b,
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
