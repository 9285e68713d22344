//! Attachment provider trait and types.
//!
//! Attachments are binary files scoped to a parent page and versioned the
//! same way pages are. They are addressed by `(parent, file_name)`.

use std::collections::BTreeMap;
use std::io::Read;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::provider::{CHANGENOTE, UNKNOWN_AUTHOR, Version};

/// Metadata for one revision of an attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// Parent page name.
    pub parent: String,
    /// Attachment file name.
    pub file_name: String,
    /// Version number.
    pub version: u32,
    /// Filesystem modification time.
    pub last_modified: SystemTime,
    /// Size in bytes.
    pub size: u64,
    /// Author recorded at upload time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Change note and custom attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl AttachmentInfo {
    /// `parent/file_name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.parent, self.file_name)
    }

    /// Author name, or `"unknown"`.
    #[must_use]
    pub fn author_or_unknown(&self) -> &str {
        self.author.as_deref().unwrap_or(UNKNOWN_AUTHOR)
    }

    /// Change note, if recorded.
    #[must_use]
    pub fn changenote(&self) -> Option<&str> {
        self.attributes.get(CHANGENOTE).map(String::as_str)
    }
}

/// A new attachment revision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttachmentUpdate {
    /// Parent page name.
    pub parent: String,
    /// Attachment file name.
    pub file_name: String,
    /// Uploader.
    pub author: Option<String>,
    /// Change note and custom attributes.
    pub attributes: BTreeMap<String, String>,
}

impl AttachmentUpdate {
    /// Start an update for `parent/file_name`.
    #[must_use]
    pub fn new(parent: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            file_name: file_name.into(),
            ..Self::default()
        }
    }

    /// Set the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Set the change note.
    #[must_use]
    pub fn with_changenote(mut self, note: impl Into<String>) -> Self {
        self.attributes.insert(CHANGENOTE.to_owned(), note.into());
        self
    }
}

/// Versioned attachment storage.
pub trait AttachmentProvider: Send + Sync {
    /// Store a new revision read from `data`.
    fn put_attachment_data(
        &self,
        attachment: &AttachmentUpdate,
        data: &mut dyn Read,
    ) -> Result<(), ProviderError>;

    /// Read the bytes of a revision.
    fn get_attachment_data(
        &self,
        parent: &str,
        file_name: &str,
        version: Version,
    ) -> Result<Vec<u8>, ProviderError>;

    /// Revision metadata, `Ok(None)` if missing.
    fn get_attachment_info(
        &self,
        parent: &str,
        file_name: &str,
        version: Version,
    ) -> Result<Option<AttachmentInfo>, ProviderError>;

    /// Latest revision of every attachment on a page.
    fn list_attachments(&self, parent: &str) -> Result<Vec<AttachmentInfo>, ProviderError>;

    /// Latest revisions changed at or after `since`, across all pages.
    fn list_all_changed(&self, since: SystemTime) -> Result<Vec<AttachmentInfo>, ProviderError>;

    /// All revisions of an attachment, newest first.
    fn get_version_history(
        &self,
        parent: &str,
        file_name: &str,
    ) -> Result<Vec<AttachmentInfo>, ProviderError>;

    /// Remove one revision.
    fn delete_version(
        &self,
        parent: &str,
        file_name: &str,
        version: u32,
    ) -> Result<(), ProviderError>;

    /// Remove an attachment with all revisions.
    fn delete_attachment(&self, parent: &str, file_name: &str) -> Result<(), ProviderError>;

    /// Re-parent every attachment of `old_parent` onto `new_parent`.
    fn move_attachments_for_page(
        &self,
        old_parent: &str,
        new_parent: &str,
    ) -> Result<(), ProviderError>;

    /// Free-form diagnostic description.
    fn provider_info(&self) -> String;
}
