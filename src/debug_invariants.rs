//! Structural self-checks for stateful aggregation types.
//!
//! [`ValueCalculator`](crate::calc::ValueCalculator) checks that its activity
//! flag agrees with the presence of the active communicator, and
//! [`MoleculeCounter`](crate::algs::MoleculeCounter) checks that its dense
//! table is contiguous. `validate_invariants` is always available; the
//! panicking form only fires in debug builds, or in release builds compiled
//! with the `strict-invariants` feature.

use crate::stats_error::StatsError;

pub trait DebugInvariants {
    /// Return the first violated invariant, if any.
    fn validate_invariants(&self) -> Result<(), StatsError>;

    /// Panic on a violated invariant when checks are compiled in.
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "invariant check");
    }
}

/// Panic with `ctx` if `$expr` is an `Err`, when checks are compiled in.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
