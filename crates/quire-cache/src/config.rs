//! Cache tuning knobs.

use std::path::PathBuf;
use std::time::Duration;

/// Default interval between consistency checks of one page.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(2);
/// Default time-to-live of cached page text.
pub const DEFAULT_TEXT_TTL: Duration = Duration::from_secs(300);
/// Default time-to-live of cached version histories.
pub const DEFAULT_HISTORY_TTL: Duration = Duration::from_secs(60);
/// Default tolerance when comparing modification times.
pub const DEFAULT_MTIME_EPSILON: Duration = Duration::from_millis(1);
/// Default number of index updates between optimizations.
pub const DEFAULT_OPTIMIZE_EVERY: usize = 100;

/// Settings for [`CachingProvider`](crate::CachingProvider).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Minimum time between consistency checks of one page.
    pub check_interval: Duration,
    /// Age after which cached text is revalidated.
    pub text_ttl: Duration,
    /// Age after which a cached history is refetched.
    pub history_ttl: Duration,
    /// Modification times closer than this are considered equal.
    pub mtime_epsilon: Duration,
    /// Where the search index is persisted; `None` keeps it in memory.
    pub index_dir: Option<PathBuf>,
    /// Index updates between optimize-and-persist passes.
    pub optimize_every: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            text_ttl: DEFAULT_TEXT_TTL,
            history_ttl: DEFAULT_HISTORY_TTL,
            mtime_epsilon: DEFAULT_MTIME_EPSILON,
            index_dir: None,
            optimize_every: DEFAULT_OPTIMIZE_EVERY,
        }
    }
}
