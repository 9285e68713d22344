//! CLI command implementations.

mod attachment;
mod page;
mod search;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use clap::Args;
use quire_config::{CliSettings, Config};
use quire_store::{PageProvider, ProviderError};

use crate::error::CliError;
use crate::registry;

pub(crate) use attachment::AttachmentCommand;
pub(crate) use page::{
    DeleteArgs, DeleteVersionArgs, GetArgs, HistoryArgs, InfoArgs, ListArgs, MoveArgs, PutArgs,
};
pub(crate) use search::SearchArgs;

/// Options shared by every command.
#[derive(Args)]
pub(crate) struct GlobalArgs {
    /// Path to configuration file (default: auto-discover quire.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage backend (overrides config).
    #[arg(long, global = true, env = "QUIRE_BACKEND")]
    backend: Option<String>,

    /// Page directory (overrides config).
    #[arg(long, global = true)]
    page_dir: Option<PathBuf>,

    /// Bypass the caching layer.
    #[arg(long, global = true)]
    no_cache: bool,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Loaded configuration and the page provider built from it.
pub(crate) struct Store {
    pub config: Config,
    pub pages: Arc<dyn PageProvider>,
}

impl Store {
    /// Load configuration and open the configured backend.
    pub(crate) fn open(args: &GlobalArgs) -> Result<Self, CliError> {
        let settings = CliSettings {
            backend: args.backend.clone(),
            page_dir: args.page_dir.clone(),
            cache_enabled: args.no_cache.then_some(false),
        };
        let config = Config::load(args.config.as_deref(), Some(&settings))?;
        let pages = registry::open_pages(&config)?;
        Ok(Self { config, pages })
    }
}

/// Run a read, retrying once if the cache reports an external modification.
pub(crate) fn retry_modified<T>(
    mut op: impl FnMut() -> Result<T, ProviderError>,
) -> Result<T, ProviderError> {
    match op() {
        Err(e) if e.is_repository_modified() => {
            tracing::debug!(error = %e, "Retrying after external modification");
            op()
        }
        other => other,
    }
}

/// Format a timestamp for display.
pub(crate) fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Parse `key=value`.
pub(crate) fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty attribute name in '{raw}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
