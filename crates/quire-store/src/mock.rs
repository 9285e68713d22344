//! Mock provider implementation for testing.
//!
//! Provides [`MockProvider`], an in-memory [`PageProvider`] with a logical
//! clock, call counters and hooks for simulating out-of-band edits.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::ProviderError;
use crate::provider::{PageInfo, PageProvider, PageUpdate, Version};
use crate::query::{QueryItem, SearchMatcher, SearchResult, rank};

/// Backend identifier for error messages.
const BACKEND: &str = "Mock";

#[derive(Clone, Debug)]
struct MockRevision {
    text: String,
    last_modified: SystemTime,
    author: Option<String>,
    attributes: BTreeMap<String, String>,
}

/// In-memory page provider for tests.
///
/// Every write advances a logical clock by one second, so modification
/// times are distinct and deterministic.
///
/// # Example
///
/// ```ignore
/// use quire_store::{MockProvider, PageProvider, Version};
///
/// let provider = MockProvider::new().with_page("Main", "Hello");
/// assert_eq!(provider.get_page_text("Main", Version::Latest).unwrap(), "Hello");
/// ```
#[derive(Debug)]
pub struct MockProvider {
    pages: RwLock<BTreeMap<String, BTreeMap<u32, MockRevision>>>,
    clock: Mutex<SystemTime>,
    calls: Mutex<HashMap<&'static str, usize>>,
    fail_writes: AtomicBool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            pages: RwLock::new(BTreeMap::new()),
            clock: Mutex::new(UNIX_EPOCH + Duration::from_secs(1_000_000)),
            calls: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl MockProvider {
    /// Create an empty mock provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a revision authored by nobody.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_page(self, name: &str, text: &str) -> Self {
        self.store(&PageUpdate::new(name), text);
        self
    }

    /// Replace the latest revision's text without creating a version,
    /// as an external editor would, and bump its modification time.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned or the page does not exist.
    pub fn modify_externally(&self, name: &str, text: &str) {
        let now = self.tick();
        let mut pages = self.pages.write().unwrap();
        let revisions = pages.get_mut(name).expect("page must exist");
        let (_, latest) = revisions.iter_mut().next_back().expect("page has revisions");
        latest.text = text.to_owned();
        latest.last_modified = now;
    }

    /// Remove a page behind the provider's back.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn remove_externally(&self, name: &str) {
        self.pages.write().unwrap().remove(name);
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// How many times the named trait method was called.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    fn record(&self, method: &'static str) {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(method)
            .or_default() += 1;
    }

    fn tick(&self) -> SystemTime {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        *clock += Duration::from_secs(1);
        *clock
    }

    fn store(&self, page: &PageUpdate, text: &str) {
        let now = self.tick();
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        let revisions = pages.entry(page.name.clone()).or_default();
        let next = revisions.keys().next_back().map_or(1, |v| v + 1);
        revisions.insert(
            next,
            MockRevision {
                text: text.to_owned(),
                last_modified: now,
                author: page.author.clone(),
                attributes: page.attributes.clone(),
            },
        );
    }

    fn info(name: &str, version: u32, rev: &MockRevision) -> PageInfo {
        PageInfo {
            name: name.to_owned(),
            version,
            last_modified: rev.last_modified,
            size: rev.text.len() as u64,
            author: rev.author.clone(),
            attributes: rev.attributes.clone(),
        }
    }

    fn with_revision<T>(
        &self,
        name: &str,
        version: Version,
        f: impl FnOnce(u32, &MockRevision) -> T,
    ) -> Result<T, ProviderError> {
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        let revisions = pages
            .get(name)
            .ok_or_else(|| ProviderError::not_found(name).with_backend(BACKEND))?;
        let latest = revisions.keys().next_back().copied().unwrap_or(0);
        let number = version.number().unwrap_or(latest);
        if number == 0 || number > latest {
            return Err(ProviderError::no_such_version(name, number).with_backend(BACKEND));
        }
        let rev = revisions.get(&number).ok_or_else(|| {
            ProviderError::not_found(name)
                .with_version(number)
                .with_backend(BACKEND)
        })?;
        Ok(f(number, rev))
    }
}

impl PageProvider for MockProvider {
    fn put_page_text(&self, page: &PageUpdate, text: &str) -> Result<(), ProviderError> {
        self.record("put_page_text");
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ProviderError::provider("simulated write failure")
                .with_backend(BACKEND)
                .with_name(&page.name));
        }
        self.store(page, text);
        Ok(())
    }

    fn get_page_text(&self, name: &str, version: Version) -> Result<String, ProviderError> {
        self.record("get_page_text");
        self.with_revision(name, version, |_, rev| rev.text.clone())
    }

    fn get_page_info(
        &self,
        name: &str,
        version: Version,
    ) -> Result<Option<PageInfo>, ProviderError> {
        self.record("get_page_info");
        match self.with_revision(name, version, |v, rev| Self::info(name, v, rev)) {
            Ok(info) => Ok(Some(info)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn get_version_history(&self, name: &str) -> Result<Vec<PageInfo>, ProviderError> {
        self.record("get_version_history");
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        Ok(pages
            .get(name)
            .map(|revisions| {
                revisions
                    .iter()
                    .rev()
                    .map(|(v, rev)| Self::info(name, *v, rev))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn page_exists(&self, name: &str) -> bool {
        self.record("page_exists");
        self.pages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn get_all_pages(&self) -> Result<Vec<PageInfo>, ProviderError> {
        self.record("get_all_pages");
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        Ok(pages
            .iter()
            .filter_map(|(name, revisions)| {
                let (v, rev) = revisions.iter().next_back()?;
                Some(Self::info(name, *v, rev))
            })
            .collect())
    }

    fn find_pages(&self, query: &[QueryItem]) -> Result<Vec<SearchResult>, ProviderError> {
        self.record("find_pages");
        let matcher = SearchMatcher::new(query);
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        let mut results: Vec<_> = pages
            .iter()
            .filter_map(|(name, revisions)| {
                let (_, rev) = revisions.iter().next_back()?;
                matcher.match_page(name, &rev.text)
            })
            .collect();
        rank(&mut results);
        Ok(results)
    }

    fn delete_version(&self, name: &str, version: u32) -> Result<(), ProviderError> {
        self.record("delete_version");
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        let revisions = pages
            .get_mut(name)
            .ok_or_else(|| ProviderError::not_found(name).with_backend(BACKEND))?;
        if revisions.remove(&version).is_none() {
            return Err(ProviderError::no_such_version(name, version).with_backend(BACKEND));
        }
        if revisions.is_empty() {
            pages.remove(name);
        }
        Ok(())
    }

    fn delete_page(&self, name: &str) -> Result<(), ProviderError> {
        self.record("delete_page");
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }

    fn move_page(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        self.record("move_page");
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        if pages.contains_key(to) {
            return Err(ProviderError::provider("target page already exists")
                .with_backend(BACKEND)
                .with_name(to));
        }
        let revisions = pages
            .remove(from)
            .ok_or_else(|| ProviderError::not_found(from).with_backend(BACKEND))?;
        pages.insert(to.to_owned(), revisions);
        Ok(())
    }

    fn provider_info(&self) -> String {
        "MockProvider (in-memory)".to_owned()
    }
}
