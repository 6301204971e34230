//! Leadership state shared between election, driver restarts and the
//! reconciliation timer.

use std::sync::atomic::{AtomicBool, Ordering};

/// Whether this instance currently leads the cluster.
///
/// Only the two compare-and-set transitions change the flag, so every
/// `elect` that succeeds is matched by exactly one successful `defeat`.
#[derive(Debug, Default)]
pub struct Leadership {
    leading: AtomicBool,
}

impl Leadership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_leader(&self) -> bool {
        self.leading.load(Ordering::Acquire)
    }

    /// follower -> leader; `false` if this instance already leads
    pub(crate) fn elect(&self) -> bool {
        self.leading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// leader -> follower; `false` if this instance was not leading
    pub(crate) fn defeat(&self) -> bool {
        self.leading
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
