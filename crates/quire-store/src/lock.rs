//! Per-page write serialization.
//!
//! Backends hold a [`NameLocks`] table and take the lock for a page name
//! around every multi-step mutation (copy old revision, write new text,
//! update properties). Names hash onto a fixed set of stripes, so memory
//! stays bounded and two different names only rarely contend.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of lock stripes.
const STRIPES: usize = 64;

/// Striped mutex table keyed by page name.
#[derive(Debug)]
pub struct NameLocks {
    stripes: Vec<Mutex<()>>,
}

impl Default for NameLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl NameLocks {
    /// Create a lock table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, name: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        // Truncation is fine: only the low bits select a stripe.
        #[allow(clippy::cast_possible_truncation)]
        let hash = hasher.finish() as usize;
        hash % self.stripes.len()
    }

    /// Lock the stripe for `name`.
    ///
    /// A poisoned stripe is recovered: the protected data is `()`, and the
    /// filesystem state it guards is re-read by every operation.
    pub fn lock(&self, name: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(name)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the stripes for two names in a fixed order.
    ///
    /// The second guard is `None` when both names share a stripe.
    pub fn lock_pair(&self, a: &str, b: &str) -> (MutexGuard<'_, ()>, Option<MutexGuard<'_, ()>>) {
        let (sa, sb) = (self.stripe(a), self.stripe(b));
        let lock = |i: usize| {
            self.stripes[i]
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
        };
        match sa.cmp(&sb) {
            std::cmp::Ordering::Equal => (lock(sa), None),
            std::cmp::Ordering::Less => {
                let first = lock(sa);
                (first, Some(lock(sb)))
            }
            std::cmp::Ordering::Greater => {
                let first = lock(sb);
                (first, Some(lock(sa)))
            }
        }
    }
}
