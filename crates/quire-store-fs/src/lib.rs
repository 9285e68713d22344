//! Filesystem storage backends for the Quire wiki engine.
//!
//! This crate provides three providers built on plain directories:
//!
//! - [`FileSystemProvider`]: latest-only pages, one `.txt` file per page
//! - [`VersioningFileProvider`]: adds an `OLD/` tree with every superseded
//!   revision and per-version author metadata
//! - [`BasicAttachmentProvider`]: versioned binary attachments per page
//!
//! Page names are percent-mangled under the configured charset, so names
//! containing `/` never create subdirectories. Writes go through a temporary
//! sibling file and a rename.
//!
//! # Example
//!
//! ```ignore
//! use std::path::PathBuf;
//! use quire_store::{PageProvider, PageUpdate, Version};
//! use quire_store_fs::VersioningFileProvider;
//!
//! let provider = VersioningFileProvider::new(PathBuf::from("pages"))?;
//! provider.put_page_text(&PageUpdate::new("Main").with_author("Alice"), "Hello")?;
//! let history = provider.get_version_history("Main")?;
//! ```

mod attachment;
mod files;
mod filesystem;
mod versioning;

pub use attachment::BasicAttachmentProvider;
pub use filesystem::{FileSystemProvider, PAGE_SUFFIX};
pub use versioning::{OLD_DIR, VersioningFileProvider};
