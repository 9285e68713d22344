//! Latest-only page store: one file per page in a flat directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use quire_store::{
    Charset, CodecError, NameLocks, PageInfo, PageProvider, PageUpdate, Properties,
    ProviderError, QueryItem, SearchMatcher, SearchResult, Version, decode_with_fallback,
    mangle_name, rank, unmangle_name,
};

use crate::files;

/// Backend identifier for error messages.
const BACKEND: &str = "Fs";

/// Suffix of page text files.
pub const PAGE_SUFFIX: &str = ".txt";

/// Suffix of the per-page metadata sidecar.
const SIDECAR_SUFFIX: &str = ".properties";

/// Key holding the author in property files.
pub(crate) const AUTHOR_KEY: &str = "author";

/// Filesystem page provider without version history.
///
/// Pages live in `<page_dir>/<mangled name>.txt`; author, change note and
/// attributes of the current text live in `<mangled name>.properties`. Every
/// existing page reports version 1.
///
/// # Example
///
/// ```ignore
/// use std::path::PathBuf;
/// use quire_store::{PageProvider, PageUpdate, Version};
/// use quire_store_fs::FileSystemProvider;
///
/// let provider = FileSystemProvider::new(PathBuf::from("pages"))?;
/// provider.put_page_text(&PageUpdate::new("Main"), "Hello")?;
/// assert_eq!(provider.get_page_text("Main", Version::Latest)?, "Hello");
/// ```
#[derive(Debug)]
pub struct FileSystemProvider {
    page_dir: PathBuf,
    encoding: Charset,
    fallback_encoding: Charset,
    locks: NameLocks,
}

impl FileSystemProvider {
    /// Open (and create if needed) a page directory.
    ///
    /// Text is stored as UTF-8 with ISO-8859-1 as the read fallback.
    pub fn new(page_dir: PathBuf) -> Result<Self, ProviderError> {
        fs::create_dir_all(&page_dir).map_err(|e| {
            ProviderError::io(e, Some(page_dir.clone())).with_backend(BACKEND)
        })?;
        tracing::debug!(page_dir = %page_dir.display(), "Opened page directory");
        Ok(Self {
            page_dir,
            encoding: Charset::Utf8,
            fallback_encoding: Charset::Latin1,
            locks: NameLocks::new(),
        })
    }

    /// Use a different storage charset and read fallback.
    #[must_use]
    pub fn with_encoding(mut self, encoding: Charset, fallback_encoding: Charset) -> Self {
        self.encoding = encoding;
        self.fallback_encoding = fallback_encoding;
        self
    }

    /// Directory holding the page files.
    #[must_use]
    pub fn page_dir(&self) -> &Path {
        &self.page_dir
    }

    /// Storage charset for text and file names.
    #[must_use]
    pub fn encoding(&self) -> Charset {
        self.encoding
    }

    /// Per-name write locks shared by wrappers around this store.
    #[must_use]
    pub fn locks(&self) -> &NameLocks {
        &self.locks
    }

    /// Reject names that cannot be stored safely.
    ///
    /// Path separators are escaped by mangling, so only empty names and the
    /// directory aliases `.` and `..` need rejecting.
    pub fn validate_name(name: &str) -> Result<(), ProviderError> {
        if name.is_empty() || name == "." || name == ".." {
            return Err(ProviderError::provider("invalid page name")
                .with_name(name)
                .with_backend(BACKEND));
        }
        Ok(())
    }

    /// On-disk base name for a page.
    pub fn mangle(&self, name: &str) -> Result<String, ProviderError> {
        Self::validate_name(name)?;
        mangle_name(name, self.encoding).map_err(|e| codec_error(name, e))
    }

    /// Path of the current text file.
    pub fn page_file(&self, name: &str) -> Result<PathBuf, ProviderError> {
        Ok(self
            .page_dir
            .join(format!("{}{PAGE_SUFFIX}", self.mangle(name)?)))
    }

    fn sidecar_file(&self, name: &str) -> Result<PathBuf, ProviderError> {
        Ok(self
            .page_dir
            .join(format!("{}{SIDECAR_SUFFIX}", self.mangle(name)?)))
    }

    /// Encode text in the storage charset.
    pub fn encode(&self, name: &str, text: &str) -> Result<Vec<u8>, ProviderError> {
        self.encoding.encode(text).map_err(|e| codec_error(name, e))
    }

    /// Read and decode a text file with charset fallback.
    pub fn read_text(&self, name: &str, path: &Path) -> Result<String, ProviderError> {
        let bytes = fs::read(path).map_err(|e| io_error(name, path, e))?;
        decode_with_fallback(&bytes, self.encoding, self.fallback_encoding)
            .map_err(|e| codec_error(name, e).with_path(path))
    }

    /// Replace the current text file atomically.
    pub fn write_current(&self, name: &str, text: &str) -> Result<(), ProviderError> {
        let path = self.page_file(name)?;
        let bytes = self.encode(name, text)?;
        files::write_atomic(&path, &bytes).map_err(|e| io_error(name, &path, e))
    }

    /// Stat the current text file.
    pub fn current_stat(
        &self,
        name: &str,
    ) -> Result<Option<(SystemTime, u64)>, ProviderError> {
        let path = self.page_file(name)?;
        files::stat(&path).map_err(|e| io_error(name, &path, e))
    }

    /// Names of every page with a current text file.
    ///
    /// Files whose names do not decode under the storage charset are skipped.
    pub(crate) fn list_names(&self) -> Result<Vec<String>, ProviderError> {
        let entries = fs::read_dir(&self.page_dir).map_err(|e| {
            ProviderError::io(e, Some(self.page_dir.clone())).with_backend(BACKEND)
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ProviderError::io(e, Some(self.page_dir.clone())).with_backend(BACKEND)
            })?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            let file_name = entry.file_name();
            let Some(mangled) = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(PAGE_SUFFIX))
            else {
                continue;
            };
            match unmangle_name(mangled, self.encoding) {
                Ok(name) => names.push(name),
                Err(e) => {
                    tracing::warn!(file = mangled, error = %e, "Skipping undecodable page file");
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Linear scan of every current text with the shared matcher.
    pub(crate) fn scan_pages(&self, query: &[QueryItem]) -> Result<Vec<SearchResult>, ProviderError> {
        let matcher = SearchMatcher::new(query);
        let mut results = Vec::new();
        for name in self.list_names()? {
            let text = match self.page_file(&name).and_then(|p| self.read_text(&name, &p)) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(page = %name, error = %e, "Skipping unreadable page in search");
                    continue;
                }
            };
            if let Some(result) = matcher.match_page(&name, &text) {
                results.push(result);
            }
        }
        rank(&mut results);
        Ok(results)
    }

    /// Rename the current text file of `from` to `to`.
    ///
    /// Caller holds the locks for both names.
    pub(crate) fn rename_current(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        let source = self.page_file(from)?;
        let target = self.page_file(to)?;
        if !source.is_file() {
            return Err(ProviderError::not_found(from).with_backend(BACKEND));
        }
        if target.exists() {
            return Err(ProviderError::provider("target page already exists")
                .with_name(to)
                .with_backend(BACKEND));
        }
        fs::rename(&source, &target).map_err(|e| io_error(from, &source, e))
    }

    fn latest_info(&self, name: &str) -> Result<Option<PageInfo>, ProviderError> {
        let Some((modified, size)) = self.current_stat(name)? else {
            return Ok(None);
        };
        let sidecar = self.sidecar_file(name)?;
        let props = files::read_properties(&sidecar).map_err(|e| e.with_name(name))?;
        Ok(Some(page_info(name, 1, modified, size, &props, "")))
    }
}

/// Build page metadata from stat data plus the properties under `prefix`.
pub(crate) fn page_info(
    name: &str,
    version: u32,
    modified: SystemTime,
    size: u64,
    props: &Properties,
    prefix: &str,
) -> PageInfo {
    let mut info = PageInfo::new(name, version, modified, size);
    for (key, value) in props.with_prefix(prefix) {
        if key == AUTHOR_KEY {
            info.author = Some(value.to_owned());
        } else {
            info.attributes.insert(key.to_owned(), value.to_owned());
        }
    }
    info
}

/// Write author and attributes of an update under `prefix`.
pub(crate) fn record_update(props: &mut Properties, prefix: &str, page: &PageUpdate) {
    props.remove_prefix(prefix);
    if let Some(author) = &page.author {
        props.set(format!("{prefix}{AUTHOR_KEY}"), author.as_str());
    }
    for (key, value) in &page.attributes {
        props.set(format!("{prefix}{key}"), value.as_str());
    }
}

fn io_error(name: &str, path: &Path, err: io::Error) -> ProviderError {
    ProviderError::io(err, Some(path.to_path_buf()))
        .with_name(name)
        .with_backend(BACKEND)
}

fn codec_error(name: &str, err: CodecError) -> ProviderError {
    ProviderError::provider("charset conversion failed")
        .with_name(name)
        .with_backend(BACKEND)
        .with_source(err)
}

impl PageProvider for FileSystemProvider {
    fn put_page_text(&self, page: &PageUpdate, text: &str) -> Result<(), ProviderError> {
        let name = page.name.as_str();
        let path = self.page_file(name)?;
        let sidecar = self.sidecar_file(name)?;
        let bytes = self.encode(name, text)?;

        let mut props = Properties::new();
        record_update(&mut props, "", page);

        let _guard = self.locks.lock(name);
        let staged_text = files::stage(&path, &bytes).map_err(|e| io_error(name, &path, e))?;
        let staged_props = if props.is_empty() {
            None
        } else {
            match files::stage(&sidecar, props.to_text().as_bytes()) {
                Ok(tmp) => Some(tmp),
                Err(e) => {
                    files::discard(&staged_text);
                    return Err(io_error(name, &sidecar, e));
                }
            }
        };

        files::commit(&staged_text, &path).map_err(|e| {
            if let Some(tmp) = &staged_props {
                files::discard(tmp);
            }
            io_error(name, &path, e)
        })?;
        match staged_props {
            Some(tmp) => files::commit(&tmp, &sidecar).map_err(|e| io_error(name, &sidecar, e))?,
            None => files::remove_if_exists(&sidecar).map_err(|e| io_error(name, &sidecar, e))?,
        }

        tracing::debug!(page = %name, bytes = bytes.len(), "Wrote page");
        Ok(())
    }

    fn get_page_text(&self, name: &str, version: Version) -> Result<String, ProviderError> {
        let path = self.page_file(name)?;
        if !path.is_file() {
            return Err(ProviderError::not_found(name).with_backend(BACKEND));
        }
        match version {
            Version::Latest | Version::Number(1) => self.read_text(name, &path),
            Version::Number(n) => {
                Err(ProviderError::no_such_version(name, n).with_backend(BACKEND))
            }
        }
    }

    fn get_page_info(
        &self,
        name: &str,
        version: Version,
    ) -> Result<Option<PageInfo>, ProviderError> {
        match version {
            Version::Latest | Version::Number(1) => self.latest_info(name),
            Version::Number(_) => Ok(None),
        }
    }

    fn get_version_history(&self, name: &str) -> Result<Vec<PageInfo>, ProviderError> {
        Ok(self.latest_info(name)?.into_iter().collect())
    }

    fn page_exists(&self, name: &str) -> bool {
        self.page_file(name).is_ok_and(|p| p.is_file())
    }

    fn get_all_pages(&self) -> Result<Vec<PageInfo>, ProviderError> {
        let mut pages = Vec::new();
        for name in self.list_names()? {
            if let Some(info) = self.latest_info(&name)? {
                pages.push(info);
            }
        }
        Ok(pages)
    }

    fn find_pages(&self, query: &[QueryItem]) -> Result<Vec<SearchResult>, ProviderError> {
        self.scan_pages(query)
    }

    fn delete_version(&self, name: &str, version: u32) -> Result<(), ProviderError> {
        if !self.page_exists(name) {
            return Err(ProviderError::not_found(name).with_backend(BACKEND));
        }
        if version != 1 {
            return Err(ProviderError::no_such_version(name, version).with_backend(BACKEND));
        }
        self.delete_page(name)
    }

    fn delete_page(&self, name: &str) -> Result<(), ProviderError> {
        let path = self.page_file(name)?;
        let sidecar = self.sidecar_file(name)?;
        let _guard = self.locks.lock(name);
        files::remove_if_exists(&path).map_err(|e| io_error(name, &path, e))?;
        files::remove_if_exists(&sidecar).map_err(|e| io_error(name, &sidecar, e))?;
        tracing::debug!(page = %name, "Deleted page");
        Ok(())
    }

    fn move_page(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        let source_sidecar = self.sidecar_file(from)?;
        let target_sidecar = self.sidecar_file(to)?;
        let _guards = self.locks.lock_pair(from, to);
        self.rename_current(from, to)?;
        if source_sidecar.exists() {
            fs::rename(&source_sidecar, &target_sidecar)
                .map_err(|e| io_error(from, &source_sidecar, e))?;
        }
        tracing::debug!(from = %from, to = %to, "Moved page");
        Ok(())
    }

    fn provider_info(&self) -> String {
        format!(
            "FileSystemProvider (dir: {}, encoding: {})",
            self.page_dir.display(),
            self.encoding
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quire_store::{CHANGENOTE, ProviderErrorKind, parse_query};

    use super::*;

    fn changenote<'a>(props: &'a Properties, prefix: &str) -> Option<&'a str> {
        props.get(&format!("{prefix}{CHANGENOTE}"))
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_provider_is_send_sync() {
        assert_send_sync::<FileSystemProvider>();
    }

    fn create_provider() -> (tempfile::TempDir, FileSystemProvider) {
        let temp_dir = tempfile::tempdir().unwrap();
        let provider = FileSystemProvider::new(temp_dir.path().join("pages")).unwrap();
        (temp_dir, provider)
    }

    #[test]
    fn test_round_trip() {
        let (_dir, provider) = create_provider();

        provider
            .put_page_text(&PageUpdate::new("Main"), "Hello, world")
            .unwrap();

        assert_eq!(
            provider.get_page_text("Main", Version::Latest).unwrap(),
            "Hello, world"
        );
        assert!(provider.page_dir().join("Main.txt").is_file());
    }

    #[test]
    fn test_name_with_slash_stays_in_page_dir() {
        let (_dir, provider) = create_provider();

        provider
            .put_page_text(&PageUpdate::new("../escape"), "x")
            .unwrap();

        assert!(provider.page_dir().join("..%2Fescape.txt").is_file());
        assert_eq!(provider.list_names().unwrap(), vec!["../escape"]);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let (_dir, provider) = create_provider();

        for name in ["", ".", ".."] {
            let err = provider
                .put_page_text(&PageUpdate::new(name), "x")
                .unwrap_err();
            assert_eq!(err.kind, ProviderErrorKind::Provider);
        }
    }

    #[test]
    fn test_missing_page() {
        let (_dir, provider) = create_provider();

        let err = provider.get_page_text("Nope", Version::Latest).unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::NotFound);
        assert_eq!(err.backend, Some("Fs"));
        assert!(provider.get_page_info("Nope", Version::Latest).unwrap().is_none());
        assert!(!provider.page_exists("Nope"));
    }

    #[test]
    fn test_only_version_one_exists() {
        let (_dir, provider) = create_provider();
        provider.put_page_text(&PageUpdate::new("Main"), "a").unwrap();
        provider.put_page_text(&PageUpdate::new("Main"), "b").unwrap();

        let err = provider.get_page_text("Main", Version::Number(2)).unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::NoSuchVersion);
        assert_eq!(provider.get_page_text("Main", Version::Number(1)).unwrap(), "b");
        assert_eq!(provider.get_version_history("Main").unwrap().len(), 1);
    }

    #[test]
    fn test_sidecar_metadata() {
        let (_dir, provider) = create_provider();
        let update = PageUpdate::new("Main")
            .with_author("Alice")
            .with_changenote("first draft");

        provider.put_page_text(&update, "text").unwrap();
        let info = provider
            .get_page_info("Main", Version::Latest)
            .unwrap()
            .unwrap();

        assert_eq!(info.version, 1);
        assert_eq!(info.size, 4);
        assert_eq!(info.author.as_deref(), Some("Alice"));
        assert_eq!(info.changenote(), Some("first draft"));
    }

    #[test]
    fn test_anonymous_write_clears_sidecar() {
        let (_dir, provider) = create_provider();
        provider
            .put_page_text(&PageUpdate::new("Main").with_author("Alice"), "a")
            .unwrap();

        provider.put_page_text(&PageUpdate::new("Main"), "b").unwrap();

        let info = provider
            .get_page_info("Main", Version::Latest)
            .unwrap()
            .unwrap();
        assert_eq!(info.author_or_unknown(), "unknown");
        assert!(!provider.page_dir().join("Main.properties").exists());
    }

    #[test]
    fn test_read_falls_back_to_latin1() {
        let (_dir, provider) = create_provider();
        fs::write(provider.page_dir().join("Old.txt"), [b'P', 0xE4, b'i']).unwrap();

        assert_eq!(provider.get_page_text("Old", Version::Latest).unwrap(), "Päi");
    }

    #[test]
    fn test_latin1_storage_encoding() {
        let temp_dir = tempfile::tempdir().unwrap();
        let provider = FileSystemProvider::new(temp_dir.path().to_path_buf())
            .unwrap()
            .with_encoding(Charset::Latin1, Charset::Utf8);

        provider.put_page_text(&PageUpdate::new("Päivä"), "ä").unwrap();

        assert_eq!(
            fs::read(temp_dir.path().join("P%E4iv%E4.txt")).unwrap(),
            vec![0xE4]
        );
        assert_eq!(provider.list_names().unwrap(), vec!["Päivä"]);
    }

    #[test]
    fn test_unencodable_text_is_provider_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let provider = FileSystemProvider::new(temp_dir.path().to_path_buf())
            .unwrap()
            .with_encoding(Charset::Ascii, Charset::Latin1);

        let err = provider
            .put_page_text(&PageUpdate::new("Main"), "snow ☃")
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Provider);
        assert!(!provider.page_exists("Main"));
    }

    #[test]
    fn test_get_all_pages_ignores_other_files() {
        let (_dir, provider) = create_provider();
        provider.put_page_text(&PageUpdate::new("B"), "b").unwrap();
        provider.put_page_text(&PageUpdate::new("A"), "a").unwrap();
        fs::write(provider.page_dir().join("notes.md"), "x").unwrap();
        fs::create_dir(provider.page_dir().join("dir.txt")).unwrap();

        let names: Vec<_> = provider
            .get_all_pages()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();

        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(provider.get_page_count().unwrap(), 2);
    }

    #[test]
    fn test_find_pages_ranks_results() {
        let (_dir, provider) = create_provider();
        provider
            .put_page_text(&PageUpdate::new("Cats"), "cats cats cats")
            .unwrap();
        provider
            .put_page_text(&PageUpdate::new("Dogs"), "dogs and one cats mention")
            .unwrap();
        provider
            .put_page_text(&PageUpdate::new("Fish"), "nothing here")
            .unwrap();

        let results = provider.find_pages(&parse_query("cats")).unwrap();

        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Cats", "Dogs"]);
    }

    #[test]
    fn test_delete_version_one_deletes_page() {
        let (_dir, provider) = create_provider();
        provider
            .put_page_text(&PageUpdate::new("Main").with_author("A"), "x")
            .unwrap();

        assert_eq!(
            provider.delete_version("Main", 2).unwrap_err().kind,
            ProviderErrorKind::NoSuchVersion
        );
        provider.delete_version("Main", 1).unwrap();

        assert!(!provider.page_exists("Main"));
        assert!(!provider.page_dir().join("Main.properties").exists());
    }

    #[test]
    fn test_move_page() {
        let (_dir, provider) = create_provider();
        provider
            .put_page_text(&PageUpdate::new("Old").with_author("Alice"), "body")
            .unwrap();
        provider.put_page_text(&PageUpdate::new("Taken"), "t").unwrap();

        assert_eq!(
            provider.move_page("Old", "Taken").unwrap_err().kind,
            ProviderErrorKind::Provider
        );
        provider.move_page("Old", "New").unwrap();

        assert!(!provider.page_exists("Old"));
        let info = provider
            .get_page_info("New", Version::Latest)
            .unwrap()
            .unwrap();
        assert_eq!(info.author.as_deref(), Some("Alice"));
        assert_eq!(
            provider.move_page("Missing", "Other").unwrap_err().kind,
            ProviderErrorKind::NotFound
        );
    }

    #[test]
    fn test_changed_since_filters_by_mtime() {
        let (_dir, provider) = create_provider();
        provider.put_page_text(&PageUpdate::new("Main"), "x").unwrap();
        let future = SystemTime::now() + std::time::Duration::from_secs(3600);

        assert_eq!(provider.get_all_changed_since(SystemTime::UNIX_EPOCH).unwrap().len(), 1);
        assert!(provider.get_all_changed_since(future).unwrap().is_empty());
    }

    #[test]
    fn test_record_update_replaces_prefix() {
        let mut props: Properties = [("2.author", "Old"), ("2.stale", "x"), ("1.author", "A")]
            .into_iter()
            .collect();
        let update = PageUpdate::new("Main")
            .with_author("Bob")
            .with_changenote("fix");

        record_update(&mut props, "2.", &update);

        assert_eq!(props.get("2.author"), Some("Bob"));
        assert_eq!(changenote(&props, "2."), Some("fix"));
        assert_eq!(props.get("2.stale"), None);
        assert_eq!(props.get("1.author"), Some("A"));
    }
}
