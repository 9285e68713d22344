//! Page provider trait and page data types.
//!
//! [`PageProvider`] is the uniform storage interface every backend implements
//! and the caching decorator wraps. All methods take page *names*, never file
//! paths; each backend owns the mapping from names to its storage format.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::query::{QueryItem, SearchResult};

/// Author reported for revisions written without one.
pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Attribute key for the free-form change note.
pub const CHANGENOTE: &str = "changenote";

/// Revision selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Version {
    /// Highest existing version.
    #[default]
    Latest,
    /// A specific version number (1-based).
    Number(u32),
}

impl Version {
    /// The explicit number, or `None` for [`Version::Latest`].
    #[must_use]
    pub fn number(self) -> Option<u32> {
        match self {
            Self::Latest => None,
            Self::Number(n) => Some(n),
        }
    }
}

impl From<u32> for Version {
    fn from(n: u32) -> Self {
        Self::Number(n)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for Version {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("latest") {
            Ok(Self::Latest)
        } else {
            s.parse().map(Self::Number)
        }
    }
}

/// Metadata for one revision of a page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Page name (case-sensitive).
    pub name: String,
    /// Version number of this revision.
    pub version: u32,
    /// Filesystem modification time of the revision's file.
    pub last_modified: SystemTime,
    /// Content length in bytes as stored.
    pub size: u64,
    /// Author recorded at write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Free-form metadata (change note and custom attributes).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl PageInfo {
    /// Create metadata with no author or attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, version: u32, last_modified: SystemTime, size: u64) -> Self {
        Self {
            name: name.into(),
            version,
            last_modified,
            size,
            author: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Author name, or `"unknown"` if none was recorded.
    #[must_use]
    pub fn author_or_unknown(&self) -> &str {
        self.author.as_deref().unwrap_or(UNKNOWN_AUTHOR)
    }

    /// Change note, if one was recorded.
    #[must_use]
    pub fn changenote(&self) -> Option<&str> {
        self.attributes.get(CHANGENOTE).map(String::as_str)
    }
}

/// A new revision to be written with [`PageProvider::put_page_text`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageUpdate {
    /// Page name.
    pub name: String,
    /// Author of the revision.
    pub author: Option<String>,
    /// Attributes stored with the revision.
    pub attributes: BTreeMap<String, String>,
}

impl PageUpdate {
    /// Start an update for the named page.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
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
    pub fn with_changenote(self, note: impl Into<String>) -> Self {
        self.with_attribute(CHANGENOTE, note)
    }

    /// Set an arbitrary attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Change note, if set.
    #[must_use]
    pub fn changenote(&self) -> Option<&str> {
        self.attributes.get(CHANGENOTE).map(String::as_str)
    }
}

/// Versioned page storage.
///
/// Implementations must be safe to share between request threads. Writes to
/// the same page name are serialized by the implementation; writes to
/// different names may proceed concurrently.
pub trait PageProvider: Send + Sync {
    /// Write `text` as the new latest revision of `page.name`.
    ///
    /// Either the text and its metadata both become visible, or neither does.
    fn put_page_text(&self, page: &PageUpdate, text: &str) -> Result<(), ProviderError>;

    /// Read the text of a revision.
    ///
    /// # Errors
    ///
    /// `NotFound` if the page (or a deleted version) does not exist,
    /// `NoSuchVersion` if the version number is out of range.
    fn get_page_text(&self, name: &str, version: Version) -> Result<String, ProviderError>;

    /// Read revision metadata.
    ///
    /// Returns `Ok(None)` when the page or version does not exist; errors are
    /// reserved for I/O and backend failures.
    fn get_page_info(&self, name: &str, version: Version)
    -> Result<Option<PageInfo>, ProviderError>;

    /// All revisions of a page, newest first. Empty if the page does not exist.
    fn get_version_history(&self, name: &str) -> Result<Vec<PageInfo>, ProviderError>;

    /// Check whether a page exists.
    ///
    /// Returns `false` on errors (treats errors as "doesn't exist").
    fn page_exists(&self, name: &str) -> bool;

    /// Check whether a specific revision exists.
    fn page_version_exists(&self, name: &str, version: Version) -> bool {
        matches!(self.get_page_info(name, version), Ok(Some(_)))
    }

    /// Latest metadata for every page.
    fn get_all_pages(&self) -> Result<Vec<PageInfo>, ProviderError>;

    /// Latest metadata for pages modified at or after `since`.
    fn get_all_changed_since(&self, since: SystemTime) -> Result<Vec<PageInfo>, ProviderError> {
        Ok(self
            .get_all_pages()?
            .into_iter()
            .filter(|p| p.last_modified >= since)
            .collect())
    }

    /// Number of pages.
    fn get_page_count(&self) -> Result<usize, ProviderError> {
        Ok(self.get_all_pages()?.len())
    }

    /// Linear content search. Results are ranked by descending score.
    fn find_pages(&self, query: &[QueryItem]) -> Result<Vec<SearchResult>, ProviderError>;

    /// True if [`find_pages`](Self::find_pages) is backed by a native index,
    /// in which case wrappers should not add their own.
    fn supports_fast_search(&self) -> bool {
        false
    }

    /// Remove exactly one revision.
    ///
    /// Surviving versions keep their numbers. Deleting the latest revision
    /// promotes the previous one to latest.
    fn delete_version(&self, name: &str, version: u32) -> Result<(), ProviderError>;

    /// Remove a page with all revisions and metadata.
    fn delete_page(&self, name: &str) -> Result<(), ProviderError>;

    /// Rename a page, keeping its history.
    ///
    /// # Errors
    ///
    /// `NotFound` if `from` does not exist; `Provider` if `to` already exists.
    fn move_page(&self, from: &str, to: &str) -> Result<(), ProviderError>;

    /// Free-form diagnostic description.
    fn provider_info(&self) -> String;
}
