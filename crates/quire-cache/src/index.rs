//! In-memory inverted index used to narrow content searches.
//!
//! The index only nominates candidates. Every candidate is re-scored against
//! its real text, so the index may over-approximate but must never miss a
//! page that would match.
//!
//! On disk the index is a single JSON document:
//!
//! ```text
//! {index_dir}/
//! +-- index.json   # {"format": 2, "documents": {"Page": {"modified": ..., "terms": [...]}}}
//! ```
//!
//! A file with a different `format` is ignored and the index is rebuilt.
//! Each document keeps the modification time of the text it was built from,
//! so a loaded index can be reconciled against the store.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use quire_store::{QueryItem, QueryKind, tokenize};
use serde::{Deserialize, Serialize};

/// On-disk format version. Bump when the layout changes.
const FORMAT: u32 = 2;

/// File name of the persisted index inside the index directory.
pub const INDEX_FILE: &str = "index.json";

#[derive(Serialize, Deserialize)]
struct Persisted {
    format: u32,
    documents: BTreeMap<String, Document>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Document {
    /// Modification time of the indexed text, if known.
    #[serde(default)]
    modified: Option<SystemTime>,
    terms: BTreeSet<String>,
}

/// Term dictionary mapping tokens to the pages containing them.
#[derive(Debug, Default)]
pub struct SearchIndex {
    postings: BTreeMap<String, BTreeSet<String>>,
    documents: BTreeMap<String, Document>,
}

impl SearchIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check whether no pages are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Check whether a page is indexed.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.documents.contains_key(name)
    }

    /// Modification time recorded for an indexed page.
    #[must_use]
    pub fn modified(&self, name: &str) -> Option<SystemTime> {
        self.documents.get(name)?.modified
    }

    /// Names of all indexed pages.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    /// Index a page, replacing any previous entry for the same name.
    pub fn upsert(&mut self, name: &str, text: &str) {
        self.upsert_modified(name, text, None);
    }

    /// Index a page whose text was last modified at `modified`.
    pub fn upsert_modified(&mut self, name: &str, text: &str, modified: Option<SystemTime>) {
        self.remove(name);
        let terms: BTreeSet<String> = tokenize(name).chain(tokenize(text)).collect();
        for term in &terms {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(name.to_owned());
        }
        self.documents
            .insert(name.to_owned(), Document { modified, terms });
    }

    /// Drop a page from the index.
    ///
    /// Posting lists left empty are kept until [`optimize`](Self::optimize).
    pub fn remove(&mut self, name: &str) {
        let Some(document) = self.documents.remove(name) else {
            return;
        };
        for term in document.terms {
            if let Some(pages) = self.postings.get_mut(&term) {
                pages.remove(name);
            }
        }
    }

    /// Discard empty posting lists.
    pub fn optimize(&mut self) {
        let before = self.postings.len();
        self.postings.retain(|_, pages| !pages.is_empty());
        tracing::debug!(
            pruned = before - self.postings.len(),
            terms = self.postings.len(),
            "Optimized search index"
        );
    }

    /// Pages that could match `query`.
    ///
    /// Returns `None` when the query cannot be narrowed, in which case every
    /// page is a candidate.
    #[must_use]
    pub fn candidates(&self, query: &[QueryItem]) -> Option<BTreeSet<String>> {
        let required: Vec<&QueryItem> = query
            .iter()
            .filter(|item| item.kind == QueryKind::Required)
            .collect();

        if !required.is_empty() {
            let mut result: Option<BTreeSet<String>> = None;
            for item in required {
                let Some(pages) = self.pages_for(&item.word) else {
                    continue;
                };
                result = Some(match result {
                    Some(acc) => acc.intersection(&pages).cloned().collect(),
                    None => pages,
                });
            }
            return result;
        }

        // Queries made only of forbidden terms never match anything.
        let mut result = BTreeSet::new();
        for item in query.iter().filter(|i| i.kind == QueryKind::Requested) {
            result.extend(self.pages_for(&item.word)?);
        }
        Some(result)
    }

    /// Pages containing every token of `word` as a substring of some term.
    ///
    /// `None` if `word` has no tokens to look up.
    fn pages_for(&self, word: &str) -> Option<BTreeSet<String>> {
        let tokens: Vec<String> = tokenize(word).collect();
        if tokens.is_empty() {
            return None;
        }
        let mut result: Option<BTreeSet<String>> = None;
        for token in tokens {
            let pages: BTreeSet<String> = self
                .postings
                .iter()
                .filter(|(term, _)| term.contains(token.as_str()))
                .flat_map(|(_, pages)| pages.iter().cloned())
                .collect();
            result = Some(match result {
                Some(acc) => acc.intersection(&pages).cloned().collect(),
                None => pages,
            });
        }
        result
    }

    /// Load a persisted index.
    ///
    /// Returns `Ok(None)` if there is no index file or it was written in a
    /// different format.
    pub fn load(dir: &Path) -> io::Result<Option<Self>> {
        let path = dir.join(INDEX_FILE);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let persisted: Persisted = match serde_json::from_slice(&data) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable search index");
                return Ok(None);
            }
        };
        if persisted.format != FORMAT {
            tracing::info!(
                found = persisted.format,
                expected = FORMAT,
                "Search index format changed, rebuilding"
            );
            return Ok(None);
        }

        let mut index = Self::new();
        for (name, document) in persisted.documents {
            for term in &document.terms {
                index
                    .postings
                    .entry(term.clone())
                    .or_default()
                    .insert(name.clone());
            }
            index.documents.insert(name, document);
        }
        Ok(Some(index))
    }

    /// Write the index to `dir`, replacing any previous copy atomically.
    pub fn save(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let persisted = Persisted {
            format: FORMAT,
            documents: self.documents.clone(),
        };
        let data = serde_json::to_vec(&persisted).map_err(io::Error::other)?;

        let path = dir.join(INDEX_FILE);
        let tmp = temp_path(&path);
        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    fn sample() -> SearchIndex {
        let mut index = SearchIndex::new();
        index.upsert("Main", "Welcome to the caching layer");
        index.upsert("Storage", "Pages are stored on disk");
        index.upsert("CacheNotes", "Eviction happens on modification");
        index
    }

    #[test]
    fn test_requested_terms_union() {
        let index = sample();
        let query = [QueryItem::requested("disk"), QueryItem::requested("eviction")];

        let found = index.candidates(&query).unwrap();

        assert_eq!(names(&found), vec!["CacheNotes", "Storage"]);
    }

    #[test]
    fn test_substring_lookup_covers_name_and_text() {
        let index = sample();

        let found = index.candidates(&[QueryItem::requested("cach")]).unwrap();

        assert_eq!(names(&found), vec!["CacheNotes", "Main"]);
    }

    #[test]
    fn test_required_terms_intersect() {
        let index = sample();
        let query = [
            QueryItem::required("on"),
            QueryItem::required("disk"),
            QueryItem::requested("welcome"),
        ];

        let found = index.candidates(&query).unwrap();

        assert_eq!(names(&found), vec!["Storage"]);
    }

    #[test]
    fn test_multi_token_word_requires_all_tokens() {
        let index = sample();

        let found = index
            .candidates(&[QueryItem::requested("stored on")])
            .unwrap();

        assert_eq!(names(&found), vec!["Storage"]);
    }

    #[test]
    fn test_forbidden_only_query_has_no_candidates() {
        let index = sample();

        let found = index.candidates(&[QueryItem::forbidden("disk")]).unwrap();

        assert!(found.is_empty());
    }

    #[test]
    fn test_punctuation_only_word_cannot_narrow() {
        let index = sample();

        assert!(index.candidates(&[QueryItem::requested("++")]).is_none());
    }

    #[test]
    fn test_upsert_replaces_previous_terms() {
        let mut index = sample();

        index.upsert("Storage", "Now kept in memory");

        assert!(index.candidates(&[QueryItem::requested("disk")]).unwrap().is_empty());
        assert_eq!(
            names(&index.candidates(&[QueryItem::requested("memory")]).unwrap()),
            vec!["Storage"]
        );
    }

    #[test]
    fn test_remove_and_optimize() {
        let mut index = sample();

        index.remove("Storage");
        assert_eq!(index.len(), 2);
        assert!(index.postings.get("disk").is_some_and(BTreeSet::is_empty));

        index.optimize();
        assert!(!index.postings.contains_key("disk"));
        assert!(!index.contains("Storage"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample();

        index.save(dir.path()).unwrap();
        let loaded = SearchIndex::load(dir.path()).unwrap().unwrap();

        assert_eq!(loaded.len(), 3);
        assert_eq!(
            names(&loaded.candidates(&[QueryItem::requested("eviction")]).unwrap()),
            vec!["CacheNotes"]
        );
        assert!(!temp_path(&dir.path().join(INDEX_FILE)).exists());
    }

    #[test]
    fn test_save_and_load_keeps_modified_time() {
        let dir = tempfile::tempdir().unwrap();
        let modified = SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(1_234_567);
        let mut index = SearchIndex::new();
        index.upsert_modified("Main", "text", Some(modified));
        index.upsert("Loose", "text");

        index.save(dir.path()).unwrap();
        let loaded = SearchIndex::load(dir.path()).unwrap().unwrap();

        assert_eq!(loaded.modified("Main"), Some(modified));
        assert_eq!(loaded.modified("Loose"), None);
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["Loose", "Main"]);
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();

        assert!(SearchIndex::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_ignores_other_format() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(INDEX_FILE),
            r#"{"format": 1, "documents": {"A": ["a"]}}"#,
        )
        .unwrap();

        assert!(SearchIndex::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_ignores_garbage() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE), "not json").unwrap();

        assert!(SearchIndex::load(dir.path()).unwrap().is_none());
    }
}
