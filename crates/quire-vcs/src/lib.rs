//! RCS-backed page storage for the Quire wiki engine.
//!
//! [`RcsFileProvider`] keeps the latest text as a plain working file and
//! delegates history to the RCS tools (`ci`, `co`, `rlog`, `rcs`). Commands
//! are [`CommandTemplates`] with `%s`, `%u`, `%c` and `%v` placeholders,
//! executed through a [`CommandRunner`] so tests can substitute a scripted
//! double for the real executables.
//!
//! # Example
//!
//! ```ignore
//! use std::path::PathBuf;
//! use quire_store::{PageProvider, PageUpdate};
//! use quire_vcs::RcsFileProvider;
//!
//! let provider = RcsFileProvider::new(PathBuf::from("pages"))?;
//! provider.put_page_text(&PageUpdate::new("Main").with_author("Alice"), "Hello")?;
//! ```

mod log;
mod provider;
mod runner;
mod template;

pub use log::{LogEntry, confirmed_version, parse_log};
pub use provider::RcsFileProvider;
pub use runner::{CommandOutput, CommandRunner, ShellRunner};
pub use template::{
    CommandTemplates, DEFAULT_CHECKIN, DEFAULT_CHECKOUT, DEFAULT_DELETE_VERSION, DEFAULT_FULL_LOG,
    DEFAULT_LOG, Substitutions, expand,
};
