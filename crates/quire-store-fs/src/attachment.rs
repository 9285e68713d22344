//! Versioned attachment storage on the filesystem.
//!
//! ```text
//! <storage_dir>/<mangled parent>-att/<mangled file>-dir/<version>.<ext>
//! <storage_dir>/<mangled parent>-att/<mangled file>-dir/attachment.properties
//! ```

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use quire_store::{
    AttachmentInfo, AttachmentProvider, AttachmentUpdate, Charset, NameLocks, Properties,
    ProviderError, UNKNOWN_AUTHOR, Version, mangle_name, unmangle_name,
};

use crate::filesystem::AUTHOR_KEY;
use crate::files;

/// Backend identifier for error messages.
const BACKEND: &str = "Attachments";

/// Suffix of a page's attachment directory.
const PAGE_DIR_SUFFIX: &str = "-att";

/// Suffix of a single attachment's directory.
const ATTACHMENT_DIR_SUFFIX: &str = "-dir";

/// Per-attachment version metadata file.
const PROPERTIES_FILE: &str = "attachment.properties";

/// Extension used when the file name has none.
const DEFAULT_EXTENSION: &str = "bin";

/// Filesystem attachment provider.
#[derive(Debug)]
pub struct BasicAttachmentProvider {
    storage_dir: PathBuf,
    encoding: Charset,
    locks: NameLocks,
}

impl BasicAttachmentProvider {
    /// Open (and create if needed) the attachment storage directory.
    pub fn new(storage_dir: PathBuf) -> Result<Self, ProviderError> {
        fs::create_dir_all(&storage_dir).map_err(|e| {
            ProviderError::io(e, Some(storage_dir.clone())).with_backend(BACKEND)
        })?;
        Ok(Self {
            storage_dir,
            encoding: Charset::Utf8,
            locks: NameLocks::new(),
        })
    }

    /// Use a different charset for mangling names.
    #[must_use]
    pub fn with_encoding(mut self, encoding: Charset) -> Self {
        self.encoding = encoding;
        self
    }

    fn mangle(&self, full_name: &str, part: &str) -> Result<String, ProviderError> {
        if part.is_empty() || part == "." || part == ".." {
            return Err(ProviderError::provider("invalid attachment name")
                .with_name(full_name)
                .with_backend(BACKEND));
        }
        mangle_name(part, self.encoding).map_err(|e| {
            ProviderError::provider("charset conversion failed")
                .with_name(full_name)
                .with_backend(BACKEND)
                .with_source(e)
        })
    }

    fn page_dir(&self, parent: &str) -> Result<PathBuf, ProviderError> {
        Ok(self
            .storage_dir
            .join(format!("{}{PAGE_DIR_SUFFIX}", self.mangle(parent, parent)?)))
    }

    fn attachment_dir(&self, parent: &str, file_name: &str) -> Result<PathBuf, ProviderError> {
        let full_name = format!("{parent}/{file_name}");
        Ok(self.page_dir(parent)?.join(format!(
            "{}{ATTACHMENT_DIR_SUFFIX}",
            self.mangle(&full_name, file_name)?
        )))
    }

    fn version_file(dir: &Path, file_name: &str, version: u32) -> PathBuf {
        dir.join(format!("{version}.{}", extension(file_name)))
    }

    fn versions(full_name: &str, dir: &Path) -> Result<Vec<u32>, ProviderError> {
        files::numbered_files(dir).map_err(|e| io_error(full_name, dir, e))
    }

    fn load_properties(dir: &Path) -> Result<Properties, ProviderError> {
        files::read_properties(&dir.join(PROPERTIES_FILE)).map_err(|e| e.with_backend(BACKEND))
    }

    fn latest_version(full_name: &str, dir: &Path) -> Result<Option<u32>, ProviderError> {
        Ok(Self::versions(full_name, dir)?.last().copied())
    }

    fn info(
        parent: &str,
        file_name: &str,
        version: u32,
        (modified, size): (SystemTime, u64),
        props: &Properties,
    ) -> AttachmentInfo {
        let mut info = AttachmentInfo {
            parent: parent.to_owned(),
            file_name: file_name.to_owned(),
            version,
            last_modified: modified,
            size,
            author: None,
            attributes: std::collections::BTreeMap::new(),
        };
        for (key, value) in props.with_prefix(&format!("{version}.")) {
            if key == AUTHOR_KEY {
                if value != UNKNOWN_AUTHOR {
                    info.author = Some(value.to_owned());
                }
            } else {
                info.attributes.insert(key.to_owned(), value.to_owned());
            }
        }
        info
    }

    fn resolve(
        &self,
        parent: &str,
        file_name: &str,
        version: Version,
    ) -> Result<(PathBuf, u32), ProviderError> {
        let full_name = format!("{parent}/{file_name}");
        let dir = self.attachment_dir(parent, file_name)?;
        let latest = Self::latest_version(&full_name, &dir)?
            .ok_or_else(|| ProviderError::not_found(&full_name).with_backend(BACKEND))?;
        let number = version.number().unwrap_or(latest);
        if number == 0 || number > latest {
            return Err(ProviderError::no_such_version(&full_name, number).with_backend(BACKEND));
        }
        Ok((dir, number))
    }

    /// Latest info of each attachment under one page directory.
    fn scan_page_dir(
        &self,
        parent: &str,
        page_dir: &Path,
    ) -> Result<Vec<AttachmentInfo>, ProviderError> {
        let entries = match fs::read_dir(page_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(parent, page_dir, e)),
        };
        let mut attachments = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(parent, page_dir, e))?;
            let dir_name = entry.file_name();
            let Some(mangled) = dir_name
                .to_str()
                .and_then(|n| n.strip_suffix(ATTACHMENT_DIR_SUFFIX))
            else {
                continue;
            };
            let Ok(file_name) = unmangle_name(mangled, self.encoding) else {
                tracing::warn!(dir = mangled, "Skipping undecodable attachment directory");
                continue;
            };
            if let Some(info) =
                self.get_attachment_info(parent, &file_name, Version::Latest)?
            {
                attachments.push(info);
            }
        }
        attachments.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(attachments)
    }
}

/// Storage extension for an attachment file name.
fn extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext
        }
        _ => DEFAULT_EXTENSION,
    }
}

fn io_error(name: &str, path: &Path, err: io::Error) -> ProviderError {
    ProviderError::io(err, Some(path.to_path_buf()))
        .with_name(name)
        .with_backend(BACKEND)
}

impl AttachmentProvider for BasicAttachmentProvider {
    fn put_attachment_data(
        &self,
        attachment: &AttachmentUpdate,
        data: &mut dyn Read,
    ) -> Result<(), ProviderError> {
        let full_name = format!("{}/{}", attachment.parent, attachment.file_name);
        let dir = self.attachment_dir(&attachment.parent, &attachment.file_name)?;
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)
            .map_err(|e| io_error(&full_name, &dir, e))?;

        let _guard = self.locks.lock(&full_name);
        fs::create_dir_all(&dir).map_err(|e| io_error(&full_name, &dir, e))?;
        let mut props = Self::load_properties(&dir)?;
        let latest = Self::latest_version(&full_name, &dir)?.unwrap_or(0);
        let version = latest.max(files::max_recorded_version(&props)) + 1;

        let path = Self::version_file(&dir, &attachment.file_name, version);
        files::write_atomic(&path, &bytes).map_err(|e| io_error(&full_name, &path, e))?;

        let prefix = format!("{version}.");
        props.remove_prefix(&prefix);
        props.set(
            format!("{prefix}{AUTHOR_KEY}"),
            attachment.author.as_deref().unwrap_or(UNKNOWN_AUTHOR),
        );
        for (key, value) in &attachment.attributes {
            props.set(format!("{prefix}{key}"), value.as_str());
        }
        let props_path = dir.join(PROPERTIES_FILE);
        if let Err(e) = files::write_atomic(&props_path, props.to_text().as_bytes()) {
            files::discard(&path);
            return Err(io_error(&full_name, &props_path, e));
        }

        tracing::debug!(attachment = %full_name, version, bytes = bytes.len(), "Stored attachment");
        Ok(())
    }

    fn get_attachment_data(
        &self,
        parent: &str,
        file_name: &str,
        version: Version,
    ) -> Result<Vec<u8>, ProviderError> {
        let full_name = format!("{parent}/{file_name}");
        let (dir, number) = self.resolve(parent, file_name, version)?;
        let path = Self::version_file(&dir, file_name, number);
        fs::read(&path).map_err(|e| io_error(&full_name, &path, e).with_version(number))
    }

    fn get_attachment_info(
        &self,
        parent: &str,
        file_name: &str,
        version: Version,
    ) -> Result<Option<AttachmentInfo>, ProviderError> {
        let (dir, number) = match self.resolve(parent, file_name, version) {
            Ok(resolved) => resolved,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let full_name = format!("{parent}/{file_name}");
        let path = Self::version_file(&dir, file_name, number);
        let Some(stat) = files::stat(&path).map_err(|e| io_error(&full_name, &path, e))? else {
            return Ok(None);
        };
        let props = Self::load_properties(&dir)?;
        Ok(Some(Self::info(parent, file_name, number, stat, &props)))
    }

    fn list_attachments(&self, parent: &str) -> Result<Vec<AttachmentInfo>, ProviderError> {
        let page_dir = self.page_dir(parent)?;
        self.scan_page_dir(parent, &page_dir)
    }

    fn list_all_changed(&self, since: SystemTime) -> Result<Vec<AttachmentInfo>, ProviderError> {
        let entries = fs::read_dir(&self.storage_dir).map_err(|e| {
            ProviderError::io(e, Some(self.storage_dir.clone())).with_backend(BACKEND)
        })?;
        let mut changed = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ProviderError::io(e, Some(self.storage_dir.clone())).with_backend(BACKEND)
            })?;
            let dir_name = entry.file_name();
            let Some(mangled) = dir_name
                .to_str()
                .and_then(|n| n.strip_suffix(PAGE_DIR_SUFFIX))
            else {
                continue;
            };
            let Ok(parent) = unmangle_name(mangled, self.encoding) else {
                continue;
            };
            changed.extend(
                self.scan_page_dir(&parent, &entry.path())?
                    .into_iter()
                    .filter(|a| a.last_modified >= since),
            );
        }
        changed.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(changed)
    }

    fn get_version_history(
        &self,
        parent: &str,
        file_name: &str,
    ) -> Result<Vec<AttachmentInfo>, ProviderError> {
        let full_name = format!("{parent}/{file_name}");
        let dir = self.attachment_dir(parent, file_name)?;
        let props = Self::load_properties(&dir)?;
        let mut history = Vec::new();
        for version in Self::versions(&full_name, &dir)?.into_iter().rev() {
            let path = Self::version_file(&dir, file_name, version);
            if let Some(stat) = files::stat(&path).map_err(|e| io_error(&full_name, &path, e))? {
                history.push(Self::info(parent, file_name, version, stat, &props));
            }
        }
        Ok(history)
    }

    fn delete_version(
        &self,
        parent: &str,
        file_name: &str,
        version: u32,
    ) -> Result<(), ProviderError> {
        let full_name = format!("{parent}/{file_name}");
        let _guard = self.locks.lock(&full_name);
        let (dir, _) = self.resolve(parent, file_name, Version::Number(version))?;
        let path = Self::version_file(&dir, file_name, version);
        if !path.is_file() {
            return Err(ProviderError::not_found(&full_name)
                .with_version(version)
                .with_backend(BACKEND));
        }
        fs::remove_file(&path).map_err(|e| io_error(&full_name, &path, e))?;

        if Self::versions(&full_name, &dir)?.is_empty() {
            files::remove_dir_if_exists(&dir).map_err(|e| io_error(&full_name, &dir, e))?;
        } else {
            let mut props = Self::load_properties(&dir)?;
            props.remove_prefix(&format!("{version}."));
            let props_path = dir.join(PROPERTIES_FILE);
            files::write_atomic(&props_path, props.to_text().as_bytes())
                .map_err(|e| io_error(&full_name, &props_path, e))?;
        }
        tracing::debug!(attachment = %full_name, version, "Deleted attachment revision");
        Ok(())
    }

    fn delete_attachment(&self, parent: &str, file_name: &str) -> Result<(), ProviderError> {
        let full_name = format!("{parent}/{file_name}");
        let dir = self.attachment_dir(parent, file_name)?;
        let _guard = self.locks.lock(&full_name);
        files::remove_dir_if_exists(&dir).map_err(|e| io_error(&full_name, &dir, e))
    }

    fn move_attachments_for_page(
        &self,
        old_parent: &str,
        new_parent: &str,
    ) -> Result<(), ProviderError> {
        let from = self.page_dir(old_parent)?;
        let to = self.page_dir(new_parent)?;
        if !from.is_dir() {
            return Ok(());
        }
        if to.exists() {
            return Err(ProviderError::provider("target page already has attachments")
                .with_name(new_parent)
                .with_backend(BACKEND));
        }
        fs::rename(&from, &to).map_err(|e| io_error(old_parent, &from, e))?;
        tracing::debug!(from = %old_parent, to = %new_parent, "Moved attachments");
        Ok(())
    }

    fn provider_info(&self) -> String {
        format!("BasicAttachmentProvider (dir: {})", self.storage_dir.display())
    }
}
