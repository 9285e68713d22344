//! Background thread keeping the [`SearchIndex`] in step with the store.
//!
//! Updates are queued from request threads and applied in order by a single
//! worker. The worker's first job is to load the persisted index and reconcile
//! it with the wrapped provider, or rebuild it from scratch; until that
//! finishes [`IndexMaintainer::is_ready`] reports `false` and searches bypass
//! the index.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use quire_store::{PageProvider, Version};

use crate::index::SearchIndex;

/// Work item for the index worker.
#[derive(Debug)]
pub enum IndexUpdate {
    /// Index the latest text of a page, last modified at `modified`.
    Upsert {
        name: String,
        text: String,
        modified: Option<SystemTime>,
    },
    /// Drop a page from the index.
    Remove { name: String },
    /// Reply once everything queued before this has been applied.
    Flush(Sender<()>),
    /// Persist and stop.
    Shutdown,
}

/// Owner of the index worker thread.
///
/// Dropping the maintainer persists the index and joins the worker.
pub struct IndexMaintainer {
    sender: Sender<IndexUpdate>,
    index: Arc<RwLock<SearchIndex>>,
    ready: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for IndexMaintainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexMaintainer")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl IndexMaintainer {
    /// Start the worker for pages of `source`.
    ///
    /// The index is persisted to `index_dir` after every `optimize_every`
    /// updates and on shutdown.
    pub fn start(
        source: Arc<dyn PageProvider>,
        index_dir: Option<PathBuf>,
        optimize_every: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        let index = Arc::new(RwLock::new(SearchIndex::new()));
        let ready = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            source,
            index_dir,
            optimize_every: optimize_every.max(1),
            index: Arc::clone(&index),
            ready: Arc::clone(&ready),
            pending: 0,
        };
        let handle = thread::Builder::new()
            .name("quire-index".to_owned())
            .spawn(move || worker.run(&receiver));
        let worker = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start index worker, search will not use the index");
                None
            }
        };

        Self {
            sender,
            index,
            ready,
            worker,
        }
    }

    /// Queue an update. Never blocks.
    pub fn enqueue(&self, update: IndexUpdate) {
        if self.sender.send(update).is_err() {
            tracing::warn!("Index worker is gone, dropping update");
        }
    }

    /// True once the initial load or rebuild has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Block until every update queued so far has been applied.
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        if self.sender.send(IndexUpdate::Flush(tx)).is_ok() {
            // A closed channel means the worker exited; nothing left to wait for.
            let _ = rx.recv();
        }
    }

    /// Run `f` against the current index.
    pub fn with_index<T>(&self, f: impl FnOnce(&SearchIndex) -> T) -> T {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        f(&index)
    }
}

impl Drop for IndexMaintainer {
    fn drop(&mut self) {
        let _ = self.sender.send(IndexUpdate::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("Index worker panicked");
        }
    }
}

struct Worker {
    source: Arc<dyn PageProvider>,
    index_dir: Option<PathBuf>,
    optimize_every: usize,
    index: Arc<RwLock<SearchIndex>>,
    ready: Arc<AtomicBool>,
    pending: usize,
}

impl Worker {
    fn run(mut self, receiver: &Receiver<IndexUpdate>) {
        let initial = match self.load() {
            Some(mut index) => {
                self.reconcile(&mut index);
                index
            }
            None => self.rebuild(),
        };
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = initial;
        self.ready.store(true, Ordering::Release);

        for update in receiver {
            match update {
                IndexUpdate::Upsert {
                    name,
                    text,
                    modified,
                } => {
                    self.index_mut().upsert_modified(&name, &text, modified);
                    self.applied();
                }
                IndexUpdate::Remove { name } => {
                    self.index_mut().remove(&name);
                    self.applied();
                }
                IndexUpdate::Flush(reply) => {
                    let _ = reply.send(());
                }
                IndexUpdate::Shutdown => break,
            }
        }

        self.optimize_and_persist();
    }

    fn index_mut(&self) -> std::sync::RwLockWriteGuard<'_, SearchIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Option<SearchIndex> {
        let dir = self.index_dir.as_deref()?;
        match SearchIndex::load(dir) {
            Ok(Some(index)) => {
                tracing::info!(pages = index.len(), dir = %dir.display(), "Loaded search index");
                Some(index)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to load search index");
                None
            }
        }
    }

    fn rebuild(&self) -> SearchIndex {
        let mut index = SearchIndex::new();
        let pages = match self.source.get_all_pages() {
            Ok(pages) => pages,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list pages for index rebuild");
                return index;
            }
        };
        for page in &pages {
            self.index_page(&mut index, &page.name, page.last_modified);
        }
        tracing::info!(pages = index.len(), "Rebuilt search index");
        index
    }

    /// Bring a loaded index up to date with pages changed while it was on
    /// disk: reindex pages that are new or whose modification time differs,
    /// and drop pages that no longer exist.
    fn reconcile(&self, index: &mut SearchIndex) {
        let pages = match self.source.get_all_pages() {
            Ok(pages) => pages,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list pages, using persisted index as is");
                return;
            }
        };

        let mut refreshed = 0usize;
        for page in &pages {
            if index.modified(&page.name) != Some(page.last_modified) {
                self.index_page(index, &page.name, page.last_modified);
                refreshed += 1;
            }
        }

        let live: BTreeSet<&str> = pages.iter().map(|p| p.name.as_str()).collect();
        let gone: Vec<String> = index
            .names()
            .filter(|name| !live.contains(name))
            .map(str::to_owned)
            .collect();
        for name in &gone {
            index.remove(name);
        }

        if refreshed > 0 || !gone.is_empty() {
            tracing::info!(refreshed, removed = gone.len(), "Reconciled search index with store");
            index.optimize();
        }
    }

    fn index_page(&self, index: &mut SearchIndex, name: &str, modified: SystemTime) {
        match self.source.get_page_text(name, Version::Latest) {
            Ok(text) => index.upsert_modified(name, &text, Some(modified)),
            Err(e) if e.is_not_found() => index.remove(name),
            Err(e) => tracing::warn!(page = %name, error = %e, "Skipping page in index rebuild"),
        }
    }

    fn applied(&mut self) {
        self.pending += 1;
        if self.pending >= self.optimize_every {
            self.optimize_and_persist();
        }
    }

    fn optimize_and_persist(&mut self) {
        self.pending = 0;
        let mut index = self.index_mut();
        index.optimize();
        if let Some(dir) = &self.index_dir
            && let Err(e) = index.save(dir)
        {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to persist search index");
        }
    }
}
