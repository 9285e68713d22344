//! The caching [`PageProvider`] decorator.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use quire_store::{
    NameLocks, PageInfo, PageProvider, PageUpdate, ProviderError, QueryItem, SearchMatcher,
    SearchResult, Version, rank,
};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::maintainer::{IndexMaintainer, IndexUpdate};

const BACKEND: &str = "Cache";

/// Hit and miss counts of the three caches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub metadata_hits: u64,
    pub metadata_misses: u64,
    pub text_hits: u64,
    pub text_misses: u64,
    pub history_hits: u64,
    pub history_misses: u64,
}

#[derive(Default)]
struct Counters {
    metadata_hits: AtomicU64,
    metadata_misses: AtomicU64,
    text_hits: AtomicU64,
    text_misses: AtomicU64,
    history_hits: AtomicU64,
    history_misses: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            metadata_hits: self.metadata_hits.load(Ordering::Relaxed),
            metadata_misses: self.metadata_misses.load(Ordering::Relaxed),
            text_hits: self.text_hits.load(Ordering::Relaxed),
            text_misses: self.text_misses.load(Ordering::Relaxed),
            history_hits: self.history_hits.load(Ordering::Relaxed),
            history_misses: self.history_misses.load(Ordering::Relaxed),
        }
    }
}

struct Entry {
    info: PageInfo,
    checked: Instant,
}

/// A cached value tagged with the page version it belongs to.
struct Cached<T> {
    value: T,
    version: u32,
    stored: Instant,
}

/// Everything the cache knows, behind one lock so evictions are atomic.
#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    texts: HashMap<String, Cached<String>>,
    histories: HashMap<String, Cached<Vec<PageInfo>>>,
    /// Names of all pages, once fetched in full.
    inventory: Option<BTreeSet<String>>,
}

impl CacheState {
    fn evict(&mut self, name: &str) {
        self.entries.remove(name);
        self.texts.remove(name);
        self.histories.remove(name);
    }

    fn forget(&mut self, name: &str) {
        self.evict(name);
        if let Some(inventory) = &mut self.inventory {
            inventory.remove(name);
        }
    }

    fn remember(&mut self, name: &str) {
        if let Some(inventory) = &mut self.inventory {
            inventory.insert(name.to_owned());
        }
    }
}

/// [`PageProvider`] decorator caching metadata, latest text and histories.
///
/// A cached page is trusted for [`CacheConfig::check_interval`]. After that
/// the next access compares its modification time with the wrapped store;
/// if the page changed or vanished, every cached item for it is evicted and
/// the access fails with `RepositoryModified`. Callers retry once.
///
/// Writes go to the wrapped store first. The cache is only touched after the
/// store accepted the write.
pub struct CachingProvider {
    inner: Arc<dyn PageProvider>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    locks: NameLocks,
    state: Mutex<CacheState>,
    counters: Counters,
    maintainer: IndexMaintainer,
}

impl fmt::Debug for CachingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingProvider")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .field("maintainer", &self.maintainer)
            .finish_non_exhaustive()
    }
}

impl CachingProvider {
    /// Wrap `inner` and start indexing its pages in the background.
    pub fn new(inner: Arc<dyn PageProvider>, config: CacheConfig) -> Self {
        Self::with_clock(inner, config, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new) with an explicit time source.
    pub fn with_clock(
        inner: Arc<dyn PageProvider>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let maintainer = IndexMaintainer::start(
            Arc::clone(&inner),
            config.index_dir.clone(),
            config.optimize_every,
        );
        Self {
            inner,
            config,
            clock,
            locks: NameLocks::new(),
            state: Mutex::new(CacheState::default()),
            counters: Counters::default(),
            maintainer,
        }
    }

    /// Current hit and miss counts.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// True once the search index can answer queries.
    #[must_use]
    pub fn index_ready(&self) -> bool {
        self.maintainer.is_ready()
    }

    /// Block until all queued index updates are applied.
    pub fn flush_index(&self) {
        self.maintainer.flush();
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn changed(&self, cached: &PageInfo, fresh: &PageInfo) -> bool {
        let drift = match cached.last_modified.duration_since(fresh.last_modified) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        cached.version != fresh.version || drift > self.config.mtime_epsilon
    }

    /// Latest metadata of `name`, checked against the store when due.
    ///
    /// `force` skips the check interval. The caller holds the name lock.
    fn latest_info(&self, name: &str, force: bool) -> Result<Option<PageInfo>, ProviderError> {
        let now = self.clock.now();
        if !force {
            let state = self.state();
            if let Some(entry) = state.entries.get(name)
                && now.duration_since(entry.checked) <= self.config.check_interval
            {
                Counters::bump(&self.counters.metadata_hits);
                return Ok(Some(entry.info.clone()));
            }
        }

        let fresh = self.inner.get_page_info(name, Version::Latest)?;
        let mut state = self.state();
        let consistent = state.entries.get(name).map(|entry| {
            fresh
                .as_ref()
                .is_some_and(|info| !self.changed(&entry.info, info))
        });

        match consistent {
            None => {
                Counters::bump(&self.counters.metadata_misses);
                if let Some(info) = &fresh {
                    state.entries.insert(
                        name.to_owned(),
                        Entry {
                            info: info.clone(),
                            checked: now,
                        },
                    );
                }
                Ok(fresh)
            }
            Some(true) => {
                Counters::bump(&self.counters.metadata_hits);
                let entry = state.entries.get_mut(name);
                Ok(entry.map(|entry| {
                    entry.checked = now;
                    entry.info.clone()
                }))
            }
            Some(false) => {
                if fresh.is_some() {
                    state.evict(name);
                    tracing::info!(page = name, "Page changed outside the cache, evicted");
                } else {
                    state.forget(name);
                    tracing::info!(page = name, "Page vanished outside the cache, evicted");
                }
                Err(ProviderError::repository_modified(name).with_backend(BACKEND))
            }
        }
    }

    fn cached_text(&self, name: &str, version: u32) -> Option<(String, bool)> {
        let now = self.clock.now();
        let state = self.state();
        let cached = state.texts.get(name).filter(|c| c.version == version)?;
        let stale = now.duration_since(cached.stored) > self.config.text_ttl;
        Some((cached.value.clone(), stale))
    }

    fn latest_text(&self, name: &str, info: &PageInfo) -> Result<String, ProviderError> {
        match self.cached_text(name, info.version) {
            Some((text, false)) => {
                Counters::bump(&self.counters.text_hits);
                return Ok(text);
            }
            Some((text, true)) => {
                let revalidated = self
                    .latest_info(name, true)?
                    .ok_or_else(|| ProviderError::not_found(name).with_backend(BACKEND))?;
                if revalidated.version == info.version {
                    let now = self.clock.now();
                    if let Some(cached) = self.state().texts.get_mut(name) {
                        cached.stored = now;
                    }
                    Counters::bump(&self.counters.text_hits);
                    tracing::debug!(page = name, "Revalidated stale text");
                    return Ok(text);
                }
            }
            None => {}
        }

        Counters::bump(&self.counters.text_misses);
        let text = self.inner.get_page_text(name, Version::Latest)?;
        let now = self.clock.now();
        {
            let mut state = self.state();
            state.texts.insert(
                name.to_owned(),
                Cached {
                    value: text.clone(),
                    version: info.version,
                    stored: now,
                },
            );
            if let Some(entry) = state.entries.get_mut(name) {
                entry.checked = now;
            }
        }
        self.maintainer.enqueue(IndexUpdate::Upsert {
            name: name.to_owned(),
            text: text.clone(),
            modified: Some(info.last_modified),
        });
        Ok(text)
    }

    /// Latest text for scoring search candidates, retrying once after an
    /// external modification.
    fn text_for_search(&self, name: &str) -> Result<String, ProviderError> {
        match self.get_page_text(name, Version::Latest) {
            Err(e) if e.is_repository_modified() => self.get_page_text(name, Version::Latest),
            other => other,
        }
    }

    fn search_index(&self, query: &[QueryItem]) -> Result<Vec<SearchResult>, ProviderError> {
        let candidates: BTreeSet<String> =
            match self.maintainer.with_index(|index| index.candidates(query)) {
                Some(candidates) => candidates,
                None => self
                    .get_all_pages()?
                    .into_iter()
                    .map(|page| page.name)
                    .collect(),
            };

        let matcher = SearchMatcher::new(query);
        let mut results = Vec::new();
        for name in candidates {
            let text = match self.text_for_search(&name) {
                Ok(text) => text,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            results.extend(matcher.match_page(&name, &text));
        }
        rank(&mut results);
        Ok(results)
    }

    /// Reindex `name` from the store after a structural change.
    fn reindex(&self, name: &str) {
        match self.inner.get_page_text(name, Version::Latest) {
            Ok(text) => self.maintainer.enqueue(IndexUpdate::Upsert {
                name: name.to_owned(),
                text,
                modified: None,
            }),
            Err(e) if e.is_not_found() => {
                self.state().forget(name);
                self.maintainer.enqueue(IndexUpdate::Remove {
                    name: name.to_owned(),
                });
            }
            Err(e) => tracing::warn!(page = name, error = %e, "Failed to reindex page"),
        }
    }
}

impl PageProvider for CachingProvider {
    fn put_page_text(&self, page: &PageUpdate, text: &str) -> Result<(), ProviderError> {
        let _guard = self.locks.lock(&page.name);
        self.inner.put_page_text(page, text)?;

        let fresh = self.inner.get_page_info(&page.name, Version::Latest);
        let modified = fresh
            .as_ref()
            .ok()
            .and_then(Option::as_ref)
            .map(|info| info.last_modified);
        let now = self.clock.now();
        {
            let mut state = self.state();
            state.evict(&page.name);
            match fresh {
                Ok(Some(info)) => {
                    state.texts.insert(
                        page.name.clone(),
                        Cached {
                            value: text.to_owned(),
                            version: info.version,
                            stored: now,
                        },
                    );
                    state
                        .entries
                        .insert(page.name.clone(), Entry { info, checked: now });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(page = %page.name, error = %e, "Failed to refresh metadata after write");
                }
            }
            state.remember(&page.name);
        }

        self.maintainer.enqueue(IndexUpdate::Upsert {
            name: page.name.clone(),
            text: text.to_owned(),
            modified,
        });
        Ok(())
    }

    fn get_page_text(&self, name: &str, version: Version) -> Result<String, ProviderError> {
        let _guard = self.locks.lock(name);
        let info = self
            .latest_info(name, false)?
            .ok_or_else(|| ProviderError::not_found(name).with_backend(BACKEND))?;
        match version {
            Version::Number(n) if n != info.version => self.inner.get_page_text(name, version),
            _ => self.latest_text(name, &info),
        }
    }

    fn get_page_info(
        &self,
        name: &str,
        version: Version,
    ) -> Result<Option<PageInfo>, ProviderError> {
        let _guard = self.locks.lock(name);
        let Some(latest) = self.latest_info(name, false)? else {
            return Ok(None);
        };
        match version {
            Version::Number(n) if n != latest.version => self.inner.get_page_info(name, version),
            _ => Ok(Some(latest)),
        }
    }

    fn get_version_history(&self, name: &str) -> Result<Vec<PageInfo>, ProviderError> {
        let _guard = self.locks.lock(name);
        let Some(latest) = self.latest_info(name, false)? else {
            return Ok(Vec::new());
        };

        let now = self.clock.now();
        {
            let state = self.state();
            if let Some(cached) = state.histories.get(name)
                && cached.version == latest.version
                && now.duration_since(cached.stored) <= self.config.history_ttl
            {
                Counters::bump(&self.counters.history_hits);
                return Ok(cached.value.clone());
            }
        }

        Counters::bump(&self.counters.history_misses);
        let history = self.inner.get_version_history(name)?;
        self.state().histories.insert(
            name.to_owned(),
            Cached {
                value: history.clone(),
                version: latest.version,
                stored: now,
            },
        );
        Ok(history)
    }

    fn page_exists(&self, name: &str) -> bool {
        let _guard = self.locks.lock(name);
        match self.latest_info(name, false) {
            Ok(info) => info.is_some(),
            Err(e) if e.is_repository_modified() => self.inner.page_exists(name),
            Err(e) => {
                tracing::warn!(page = name, error = %e, "Existence check failed");
                false
            }
        }
    }

    fn get_all_pages(&self) -> Result<Vec<PageInfo>, ProviderError> {
        let inventory = self.state().inventory.clone();
        let Some(names) = inventory else {
            let pages = self.inner.get_all_pages()?;
            let now = self.clock.now();
            let mut state = self.state();
            for page in &pages {
                state
                    .entries
                    .entry(page.name.clone())
                    .or_insert_with(|| Entry {
                        info: page.clone(),
                        checked: now,
                    });
            }
            state.inventory = Some(pages.iter().map(|p| p.name.clone()).collect());
            tracing::debug!(pages = pages.len(), "Cached page inventory");
            return Ok(pages);
        };

        let mut pages = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        {
            let state = self.state();
            for name in names {
                match state.entries.get(&name) {
                    Some(entry) => pages.push(entry.info.clone()),
                    None => missing.push(name),
                }
            }
        }
        for name in missing {
            let _guard = self.locks.lock(&name);
            match self.latest_info(&name, false) {
                Ok(Some(info)) => pages.push(info),
                Ok(None) => self.state().forget(&name),
                Err(e) if e.is_repository_modified() => {}
                Err(e) => return Err(e),
            }
        }
        pages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pages)
    }

    fn find_pages(&self, query: &[QueryItem]) -> Result<Vec<SearchResult>, ProviderError> {
        if self.inner.supports_fast_search() {
            return self.inner.find_pages(query);
        }
        if !self.maintainer.is_ready() {
            tracing::debug!("Search index not ready, searching the store directly");
            return self.inner.find_pages(query);
        }
        self.search_index(query)
    }

    fn supports_fast_search(&self) -> bool {
        self.inner.supports_fast_search() || self.maintainer.is_ready()
    }

    fn delete_version(&self, name: &str, version: u32) -> Result<(), ProviderError> {
        let _guard = self.locks.lock(name);
        self.inner.delete_version(name, version)?;
        self.state().evict(name);
        self.reindex(name);
        Ok(())
    }

    fn delete_page(&self, name: &str) -> Result<(), ProviderError> {
        let _guard = self.locks.lock(name);
        self.inner.delete_page(name)?;
        self.state().forget(name);
        self.maintainer.enqueue(IndexUpdate::Remove {
            name: name.to_owned(),
        });
        Ok(())
    }

    fn move_page(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        let _guards = self.locks.lock_pair(from, to);
        self.inner.move_page(from, to)?;
        {
            let mut state = self.state();
            state.forget(from);
            state.evict(to);
            state.remember(to);
        }
        self.maintainer.enqueue(IndexUpdate::Remove {
            name: from.to_owned(),
        });
        self.reindex(to);
        Ok(())
    }

    fn provider_info(&self) -> String {
        let stats = self.stats();
        let index = if self.maintainer.is_ready() {
            let pages = self.maintainer.with_index(crate::SearchIndex::len);
            format!("ready, {pages} pages")
        } else {
            "building".to_owned()
        };
        format!(
            "CachingProvider over {}; metadata {}/{} hits, text {}/{} hits, history {}/{} hits; index {index}",
            self.inner.provider_info(),
            stats.metadata_hits,
            stats.metadata_hits + stats.metadata_misses,
            stats.text_hits,
            stats.text_hits + stats.text_misses,
            stats.history_hits,
            stats.history_hits + stats.history_misses,
        )
    }
}
