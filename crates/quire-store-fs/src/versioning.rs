//! Versioned page store with a private old-versions tree.
//!
//! Layout under the page directory:
//!
//! ```text
//! <page_dir>/<mangled>.txt                   current text
//! <page_dir>/OLD/<mangled>/<version>.txt     superseded revisions
//! <page_dir>/OLD/<mangled>/page.properties   <version>.author, <version>.changenote, ...
//! ```
//!
//! The current version number is `max(highest old file + 1, highest version
//! recorded in page.properties)`. Every write records `<version>.author`, so
//! deleting the highest old revision never renumbers the current one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use quire_store::{
    Charset, PageInfo, PageProvider, PageUpdate, Properties, ProviderError, QueryItem,
    SearchResult, UNKNOWN_AUTHOR, Version,
};

use crate::filesystem::{AUTHOR_KEY, FileSystemProvider, PAGE_SUFFIX, page_info, record_update};
use crate::files;

/// Backend identifier for error messages.
const BACKEND: &str = "Versioning";

/// Name of the old-versions directory.
pub const OLD_DIR: &str = "OLD";

/// Per-page version metadata file.
const PROPERTIES_FILE: &str = "page.properties";

/// Page provider keeping every revision on disk.
#[derive(Debug)]
pub struct VersioningFileProvider {
    store: FileSystemProvider,
}

impl VersioningFileProvider {
    /// Open (and create if needed) a page directory.
    pub fn new(page_dir: PathBuf) -> Result<Self, ProviderError> {
        Ok(Self {
            store: FileSystemProvider::new(page_dir)?,
        })
    }

    /// Use a different storage charset and read fallback.
    #[must_use]
    pub fn with_encoding(self, encoding: Charset, fallback_encoding: Charset) -> Self {
        Self {
            store: self.store.with_encoding(encoding, fallback_encoding),
        }
    }

    /// Directory holding the current page files.
    #[must_use]
    pub fn page_dir(&self) -> &Path {
        self.store.page_dir()
    }

    fn old_dir(&self, name: &str) -> Result<PathBuf, ProviderError> {
        Ok(self
            .store
            .page_dir()
            .join(OLD_DIR)
            .join(self.store.mangle(name)?))
    }

    fn old_file(dir: &Path, version: u32) -> PathBuf {
        dir.join(format!("{version}{PAGE_SUFFIX}"))
    }

    fn load_properties(dir: &Path) -> Result<Properties, ProviderError> {
        files::read_properties(&dir.join(PROPERTIES_FILE)).map_err(|e| e.with_backend(BACKEND))
    }

    fn save_properties(name: &str, dir: &Path, props: &Properties) -> Result<(), ProviderError> {
        let path = dir.join(PROPERTIES_FILE);
        fs::create_dir_all(dir).map_err(|e| io_error(name, dir, e))?;
        files::write_atomic(&path, props.to_text().as_bytes()).map_err(|e| io_error(name, &path, e))
    }

    fn old_versions(name: &str, dir: &Path) -> Result<Vec<u32>, ProviderError> {
        files::numbered_files(dir).map_err(|e| io_error(name, dir, e))
    }

    /// Current version number, or 0 if the page does not exist.
    fn current_version(
        &self,
        name: &str,
        dir: &Path,
        props: &Properties,
    ) -> Result<u32, ProviderError> {
        if self.store.current_stat(name)?.is_none() {
            return Ok(0);
        }
        let next_after_old = Self::old_versions(name, dir)?
            .last()
            .map_or(1, |v| v + 1);
        Ok(next_after_old.max(files::max_recorded_version(props)))
    }

    fn info_for(
        &self,
        name: &str,
        version: Version,
    ) -> Result<Option<PageInfo>, ProviderError> {
        let dir = self.old_dir(name)?;
        let props = Self::load_properties(&dir)?;
        let current = self.current_version(name, &dir, &props)?;
        if current == 0 {
            return Ok(None);
        }
        let number = version.number().unwrap_or(current);
        if number == 0 || number > current {
            return Ok(None);
        }
        let stat = if number == current {
            self.store.current_stat(name)?
        } else {
            let path = Self::old_file(&dir, number);
            files::stat(&path).map_err(|e| io_error(name, &path, e))?
        };
        Ok(stat.map(|(modified, size)| revision_info(name, number, modified, size, &props)))
    }

    fn write_revision(
        &self,
        page: &PageUpdate,
        text: &str,
        dir: &Path,
    ) -> Result<u32, ProviderError> {
        let name = page.name.as_str();
        let mut props = Self::load_properties(dir)?;
        let current = self.current_version(name, dir, &props)?;

        let archived = if current > 0 {
            fs::create_dir_all(dir).map_err(|e| io_error(name, dir, e))?;
            let source = self.store.page_file(name)?;
            let target = Self::old_file(dir, current);
            files::copy_preserving_mtime(&source, &target).map_err(|e| io_error(name, &target, e))?;
            Some(target)
        } else {
            None
        };

        if let Err(e) = self.store.write_current(name, text) {
            if let Some(target) = &archived {
                files::discard(target);
            }
            return Err(e.with_backend(BACKEND));
        }

        let version = current + 1;
        let prefix = format!("{version}.");
        record_update(&mut props, &prefix, page);
        if page.author.is_none() {
            props.set(format!("{prefix}{AUTHOR_KEY}"), UNKNOWN_AUTHOR);
        }
        if let Err(e) = Self::save_properties(name, dir, &props) {
            self.rollback(name, archived.as_deref());
            return Err(e);
        }
        Ok(version)
    }

    /// Put the archived previous revision back as the current text.
    fn rollback(&self, name: &str, archived: Option<&Path>) {
        let result = self.store.page_file(name).and_then(|current| {
            match archived {
                Some(old) => files::copy_preserving_mtime(old, &current)
                    .map_err(|e| io_error(name, &current, e)),
                None => files::remove_if_exists(&current).map_err(|e| io_error(name, &current, e)),
            }
        });
        match result {
            Ok(()) => {
                if let Some(old) = archived {
                    files::discard(old);
                }
            }
            Err(e) => tracing::warn!(page = %name, error = %e, "Failed to roll back write"),
        }
    }

    /// Promote the highest old revision into the current slot.
    fn promote_previous(
        &self,
        name: &str,
        dir: &Path,
        previous: u32,
    ) -> Result<(), ProviderError> {
        let old = Self::old_file(dir, previous);
        let current = self.store.page_file(name)?;
        files::copy_preserving_mtime(&old, &current).map_err(|e| io_error(name, &current, e))?;
        fs::remove_file(&old).map_err(|e| io_error(name, &old, e))
    }
}

fn revision_info(
    name: &str,
    version: u32,
    modified: std::time::SystemTime,
    size: u64,
    props: &Properties,
) -> PageInfo {
    let mut info = page_info(name, version, modified, size, props, &format!("{version}."));
    if info.author.as_deref() == Some(UNKNOWN_AUTHOR) {
        info.author = None;
    }
    info
}

fn io_error(name: &str, path: &Path, err: io::Error) -> ProviderError {
    ProviderError::io(err, Some(path.to_path_buf()))
        .with_name(name)
        .with_backend(BACKEND)
}

impl PageProvider for VersioningFileProvider {
    fn put_page_text(&self, page: &PageUpdate, text: &str) -> Result<(), ProviderError> {
        let name = page.name.as_str();
        let dir = self.old_dir(name)?;
        let _guard = self.store.locks().lock(name);
        let version = self.write_revision(page, text, &dir)?;
        tracing::debug!(page = %name, version, author = page.author.as_deref(), "Wrote revision");
        Ok(())
    }

    fn get_page_text(&self, name: &str, version: Version) -> Result<String, ProviderError> {
        let dir = self.old_dir(name)?;
        let props = Self::load_properties(&dir)?;
        let current = self.current_version(name, &dir, &props)?;
        if current == 0 {
            return Err(ProviderError::not_found(name).with_backend(BACKEND));
        }
        let number = version.number().unwrap_or(current);
        if number == 0 || number > current {
            return Err(ProviderError::no_such_version(name, number).with_backend(BACKEND));
        }
        if number == current {
            let path = self.store.page_file(name)?;
            return self
                .store
                .read_text(name, &path)
                .map_err(|e| e.with_backend(BACKEND));
        }
        let path = Self::old_file(&dir, number);
        if !path.is_file() {
            return Err(ProviderError::not_found(name)
                .with_version(number)
                .with_backend(BACKEND));
        }
        self.store
            .read_text(name, &path)
            .map_err(|e| e.with_version(number).with_backend(BACKEND))
    }

    fn get_page_info(
        &self,
        name: &str,
        version: Version,
    ) -> Result<Option<PageInfo>, ProviderError> {
        self.info_for(name, version)
    }

    fn get_version_history(&self, name: &str) -> Result<Vec<PageInfo>, ProviderError> {
        let dir = self.old_dir(name)?;
        let props = Self::load_properties(&dir)?;
        let current = self.current_version(name, &dir, &props)?;
        let Some((modified, size)) = self.store.current_stat(name)? else {
            return Ok(Vec::new());
        };

        let mut history = vec![revision_info(name, current, modified, size, &props)];
        for version in Self::old_versions(name, &dir)?.into_iter().rev() {
            if version >= current {
                continue;
            }
            let path = Self::old_file(&dir, version);
            if let Some((modified, size)) = files::stat(&path).map_err(|e| io_error(name, &path, e))? {
                history.push(revision_info(name, version, modified, size, &props));
            }
        }
        Ok(history)
    }

    fn page_exists(&self, name: &str) -> bool {
        self.store.page_exists(name)
    }

    fn page_version_exists(&self, name: &str, version: Version) -> bool {
        matches!(self.info_for(name, version), Ok(Some(_)))
    }

    fn get_all_pages(&self) -> Result<Vec<PageInfo>, ProviderError> {
        let mut pages = Vec::new();
        for name in self.store.list_names()? {
            if let Some(info) = self.info_for(&name, Version::Latest)? {
                pages.push(info);
            }
        }
        Ok(pages)
    }

    fn find_pages(&self, query: &[QueryItem]) -> Result<Vec<SearchResult>, ProviderError> {
        self.store.scan_pages(query)
    }

    fn delete_version(&self, name: &str, version: u32) -> Result<(), ProviderError> {
        let dir = self.old_dir(name)?;
        let guard = self.store.locks().lock(name);
        let mut props = Self::load_properties(&dir)?;
        let current = self.current_version(name, &dir, &props)?;
        if current == 0 {
            return Err(ProviderError::not_found(name).with_backend(BACKEND));
        }
        if version == 0 || version > current {
            return Err(ProviderError::no_such_version(name, version).with_backend(BACKEND));
        }

        if version == current {
            let previous = Self::old_versions(name, &dir)?
                .into_iter()
                .rev()
                .find(|v| *v < current);
            let Some(previous) = previous else {
                drop(guard);
                return self.delete_page(name);
            };
            self.promote_previous(name, &dir, previous)?;
        } else {
            let path = Self::old_file(&dir, version);
            if !path.is_file() {
                return Err(ProviderError::not_found(name)
                    .with_version(version)
                    .with_backend(BACKEND));
            }
            fs::remove_file(&path).map_err(|e| io_error(name, &path, e))?;
        }

        props.remove_prefix(&format!("{version}."));
        Self::save_properties(name, &dir, &props)?;
        tracing::debug!(page = %name, version, "Deleted revision");
        Ok(())
    }

    fn delete_page(&self, name: &str) -> Result<(), ProviderError> {
        let dir = self.old_dir(name)?;
        let current = self.store.page_file(name)?;
        let _guard = self.store.locks().lock(name);
        files::remove_if_exists(&current).map_err(|e| io_error(name, &current, e))?;
        files::remove_dir_if_exists(&dir).map_err(|e| io_error(name, &dir, e))?;
        tracing::debug!(page = %name, "Deleted page with history");
        Ok(())
    }

    fn move_page(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        let from_dir = self.old_dir(from)?;
        let to_dir = self.old_dir(to)?;
        let _guards = self.store.locks().lock_pair(from, to);
        if to_dir.exists() {
            return Err(ProviderError::provider("target history already exists")
                .with_name(to)
                .with_backend(BACKEND));
        }
        self.store
            .rename_current(from, to)
            .map_err(|e| e.with_backend(BACKEND))?;
        if from_dir.is_dir() {
            fs::rename(&from_dir, &to_dir).map_err(|e| io_error(from, &from_dir, e))?;
        }
        tracing::debug!(from = %from, to = %to, "Moved page with history");
        Ok(())
    }

    fn provider_info(&self) -> String {
        format!(
            "VersioningFileProvider (dir: {}, encoding: {})",
            self.store.page_dir().display(),
            self.store.encoding()
        )
    }
}
