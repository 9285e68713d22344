//! Page commands: `get`, `put`, `info`, `history`, `list`, `delete`,
//! `delete-version`, `move`.

use std::path::PathBuf;

use chrono::DateTime;
use clap::Args;
use quire_store::{PageInfo, PageUpdate, Version};

use super::{Store, format_time, parse_attribute, retry_modified};
use crate::error::CliError;
use crate::output::Output;
use crate::registry;

/// Print the text of a page.
#[derive(Args)]
pub(crate) struct GetArgs {
    /// Page name.
    name: String,

    /// Revision number or "latest".
    #[arg(short, long, default_value = "latest")]
    revision: Version,
}

impl GetArgs {
    pub(crate) fn execute(self, store: &Store) -> Result<(), CliError> {
        let text = retry_modified(|| store.pages.get_page_text(&self.name, self.revision))?;
        Output::new().raw(text.as_bytes())
    }
}

/// Save a new revision of a page.
#[derive(Args)]
pub(crate) struct PutArgs {
    /// Page name.
    name: String,

    /// Read text from this file instead of stdin.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Author of the change.
    #[arg(short, long, env = "QUIRE_AUTHOR")]
    author: Option<String>,

    /// Change note.
    #[arg(short, long)]
    message: Option<String>,

    /// Extra attribute as key=value. Repeatable.
    #[arg(long = "attr", value_parser = parse_attribute)]
    attributes: Vec<(String, String)>,
}

impl PutArgs {
    pub(crate) fn execute(self, store: &Store) -> Result<(), CliError> {
        let text = match &self.file {
            Some(path) => std::fs::read_to_string(path)?,
            None => std::io::read_to_string(std::io::stdin())?,
        };

        let mut update = PageUpdate::new(&self.name);
        if let Some(author) = self.author {
            update = update.with_author(author);
        }
        if let Some(note) = self.message {
            update = update.with_changenote(note);
        }
        for (key, value) in self.attributes {
            update = update.with_attribute(key, value);
        }

        store.pages.put_page_text(&update, &text)?;

        let version = store
            .pages
            .get_page_info(&self.name, Version::Latest)?
            .map_or(0, |info| info.version);
        Output::new().success(&format!("Saved {} (version {version})", self.name));
        Ok(())
    }
}

/// Show page metadata, or describe the provider.
#[derive(Args)]
pub(crate) struct InfoArgs {
    /// Page name.
    #[arg(required_unless_present = "provider")]
    name: Option<String>,

    /// Revision number or "latest".
    #[arg(short, long, default_value = "latest")]
    revision: Version,

    /// Describe the configured provider instead of a page.
    #[arg(long)]
    provider: bool,

    /// Print JSON.
    #[arg(long)]
    json: bool,
}

impl InfoArgs {
    pub(crate) fn execute(self, store: &Store) -> Result<(), CliError> {
        let output = Output::new();
        if self.provider {
            output.line(&store.pages.provider_info());
            return Ok(());
        }
        let name = self
            .name
            .ok_or_else(|| CliError::Validation("page name required".to_owned()))?;

        let info = retry_modified(|| store.pages.get_page_info(&name, self.revision))?
            .ok_or_else(|| CliError::Validation(format!("No such page: {name}")))?;

        if self.json {
            return output.json(&info);
        }
        output.heading(&info.name);
        output.line(&format!("version:  {}", info.version));
        output.line(&format!("modified: {}", format_time(info.last_modified)));
        output.line(&format!("size:     {}", info.size));
        output.line(&format!("author:   {}", info.author_or_unknown()));
        if let Some(note) = info.changenote() {
            output.line(&format!("note:     {note}"));
        }
        for (key, value) in &info.attributes {
            if key != quire_store::CHANGENOTE {
                output.muted(&format!("{key} = {value}"));
            }
        }
        Ok(())
    }
}

/// List every revision of a page, newest first.
#[derive(Args)]
pub(crate) struct HistoryArgs {
    /// Page name.
    name: String,

    /// Print JSON.
    #[arg(long)]
    json: bool,
}

impl HistoryArgs {
    pub(crate) fn execute(self, store: &Store) -> Result<(), CliError> {
        let output = Output::new();
        let history = retry_modified(|| store.pages.get_version_history(&self.name))?;
        if self.json {
            return output.json(&history);
        }
        if history.is_empty() {
            output.muted(&format!("No history for {}", self.name));
        }
        for info in &history {
            output.line(&history_line(info));
        }
        Ok(())
    }
}

fn history_line(info: &PageInfo) -> String {
    let mut line = format!(
        "{:>4}  {}  {:<12} {:>8}",
        info.version,
        format_time(info.last_modified),
        info.author_or_unknown(),
        info.size
    );
    if let Some(note) = info.changenote() {
        line.push_str("  ");
        line.push_str(note);
    }
    line
}

/// List pages.
#[derive(Args)]
pub(crate) struct ListArgs {
    /// Only pages modified at or after this RFC 3339 timestamp.
    #[arg(long)]
    since: Option<String>,

    /// Print only the number of pages.
    #[arg(long, conflicts_with = "since")]
    count: bool,

    /// Print JSON.
    #[arg(long)]
    json: bool,
}

impl ListArgs {
    pub(crate) fn execute(self, store: &Store) -> Result<(), CliError> {
        let output = Output::new();
        if self.count {
            output.line(&store.pages.get_page_count()?.to_string());
            return Ok(());
        }

        let pages = match &self.since {
            Some(raw) => {
                let since = DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| CliError::Validation(format!("invalid --since '{raw}': {e}")))?;
                store.pages.get_all_changed_since(since.into())?
            }
            None => store.pages.get_all_pages()?,
        };

        if self.json {
            return output.json(&pages);
        }
        for page in &pages {
            output.line(&format!(
                "{:<30} {:>4}  {}",
                page.name,
                page.version,
                format_time(page.last_modified)
            ));
        }
        Ok(())
    }
}

/// Delete a page with all revisions.
#[derive(Args)]
pub(crate) struct DeleteArgs {
    /// Page name.
    name: String,
}

impl DeleteArgs {
    pub(crate) fn execute(self, store: &Store) -> Result<(), CliError> {
        store.pages.delete_page(&self.name)?;
        Output::new().success(&format!("Deleted {}", self.name));
        Ok(())
    }
}

/// Delete one revision of a page.
#[derive(Args)]
pub(crate) struct DeleteVersionArgs {
    /// Page name.
    name: String,

    /// Revision to remove.
    version: u32,
}

impl DeleteVersionArgs {
    pub(crate) fn execute(self, store: &Store) -> Result<(), CliError> {
        store.pages.delete_version(&self.name, self.version)?;
        Output::new().success(&format!("Deleted {} version {}", self.name, self.version));
        Ok(())
    }
}

/// Rename a page, keeping its history and attachments.
#[derive(Args)]
pub(crate) struct MoveArgs {
    /// Current name.
    from: String,

    /// New name.
    to: String,
}

impl MoveArgs {
    pub(crate) fn execute(self, store: &Store) -> Result<(), CliError> {
        store.pages.move_page(&self.from, &self.to)?;
        if store.config.attachments_dir.is_dir() {
            registry::open_attachments(&store.config)?
                .move_attachments_for_page(&self.from, &self.to)?;
        }
        Output::new().success(&format!("Moved {} to {}", self.from, self.to));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn test_history_line_includes_note() {
        let mut info = PageInfo::new("Main", 3, UNIX_EPOCH + Duration::from_secs(60), 42);
        info.author = Some("alice".to_owned());
        info.attributes
            .insert(quire_store::CHANGENOTE.to_owned(), "typo".to_owned());

        let line = history_line(&info);

        assert!(line.starts_with("   3  1970-01-01 00:01:00  alice"));
        assert!(line.ends_with("  typo"));
    }

    #[test]
    fn test_history_line_unknown_author() {
        let info = PageInfo::new("Main", 1, UNIX_EPOCH, 0);

        assert!(history_line(&info).contains("unknown"));
    }
}
