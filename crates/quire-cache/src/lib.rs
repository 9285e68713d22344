//! Caching layer for quire page providers.
//!
//! [`CachingProvider`] wraps any [`PageProvider`](quire_store::PageProvider)
//! and keeps page metadata, latest text and version histories in memory.
//! Cached entries are periodically checked against the wrapped store so that
//! edits made behind the cache's back are noticed; the first read after such
//! an edit fails with `RepositoryModified` and the next one sees fresh data.
//!
//! Content searches go through a [`SearchIndex`] maintained on a background
//! thread by [`IndexMaintainer`].
//!
//! ```ignore
//! let store = Arc::new(VersioningFileProvider::new("pages")?);
//! let cache = CachingProvider::new(store, CacheConfig::default());
//! let text = cache.get_page_text("Main", Version::Latest)?;
//! ```

mod clock;
mod config;
mod index;
mod maintainer;
mod provider;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, DEFAULT_CHECK_INTERVAL, DEFAULT_HISTORY_TTL, DEFAULT_MTIME_EPSILON,
    DEFAULT_OPTIMIZE_EVERY, DEFAULT_TEXT_TTL,
};
pub use index::{INDEX_FILE, SearchIndex};
pub use maintainer::{IndexMaintainer, IndexUpdate};
pub use provider::{CacheStats, CachingProvider};
