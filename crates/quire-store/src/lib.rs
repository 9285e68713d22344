//! Versioned page storage abstraction for the Quire wiki engine.
//!
//! This crate defines the [`PageProvider`] and [`AttachmentProvider`] traits
//! every storage backend implements, together with the pieces backends share:
//!
//! - [`ProviderError`] with semantic [`ProviderErrorKind`]s
//! - page name mangling under a configurable [`Charset`]
//! - a Java-style [`Properties`] codec for revision metadata
//! - the query model and [`SearchMatcher`] used by every `find_pages`
//! - [`NameLocks`] for per-name write serialization
//! - [`MockProvider`] for testing (behind `mock` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use quire_store::{PageProvider, PageUpdate, Version};
//!
//! provider.put_page_text(&PageUpdate::new("Main").with_author("Alice"), "Hello")?;
//! let text = provider.get_page_text("Main", Version::Latest)?;
//! ```

mod attachment;
mod error;
mod lock;
mod mangle;
#[cfg(feature = "mock")]
mod mock;
mod properties;
mod provider;
mod query;

pub use attachment::{AttachmentInfo, AttachmentProvider, AttachmentUpdate};
pub use error::{ProviderError, ProviderErrorKind};
pub use lock::NameLocks;
pub use mangle::{
    Charset, CodecError, decode_with_fallback, mangle_name, unmangle_name, url_decode, url_encode,
};
#[cfg(feature = "mock")]
pub use mock::MockProvider;
pub use properties::Properties;
pub use provider::{CHANGENOTE, PageInfo, PageProvider, PageUpdate, UNKNOWN_AUTHOR, Version};
pub use query::{
    QueryItem, QueryKind, SearchMatcher, SearchResult, parse_query, rank, tokenize,
};
