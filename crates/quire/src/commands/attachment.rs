//! `quire attachment` subcommand group.

use std::fs::File;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use quire_store::{AttachmentUpdate, Version};

use super::{Store, format_time};
use crate::error::CliError;
use crate::output::Output;
use crate::registry;

/// Attachment commands.
#[derive(Subcommand)]
pub(crate) enum AttachmentCommand {
    /// Store a new revision of an attachment.
    Put(PutArgs),
    /// Write an attachment's bytes to stdout or a file.
    Get(GetArgs),
    /// List the attachments of a page.
    List(ListArgs),
}

impl AttachmentCommand {
    pub(crate) fn execute(self, store: &Store) -> Result<(), CliError> {
        match self {
            Self::Put(args) => args.execute(store),
            Self::Get(args) => args.execute(store),
            Self::List(args) => args.execute(store),
        }
    }
}

#[derive(Args)]
pub(crate) struct PutArgs {
    /// Page the attachment belongs to.
    page: String,

    /// Attachment file name.
    file_name: String,

    /// Read data from this file instead of stdin.
    #[arg(short, long)]
    from: Option<PathBuf>,

    /// Author of the change.
    #[arg(short, long, env = "QUIRE_AUTHOR")]
    author: Option<String>,

    /// Change note.
    #[arg(short, long)]
    message: Option<String>,
}

impl PutArgs {
    fn execute(self, store: &Store) -> Result<(), CliError> {
        let attachments = registry::open_attachments(&store.config)?;

        let mut update = AttachmentUpdate::new(&self.page, &self.file_name);
        if let Some(author) = self.author {
            update = update.with_author(author);
        }
        if let Some(note) = self.message {
            update = update.with_changenote(note);
        }

        match &self.from {
            Some(path) => attachments.put_attachment_data(&update, &mut File::open(path)?)?,
            None => attachments.put_attachment_data(&update, &mut std::io::stdin())?,
        }

        let version = attachments
            .get_attachment_info(&self.page, &self.file_name, Version::Latest)?
            .map_or(0, |info| info.version);
        Output::new().success(&format!(
            "Saved {}/{} (version {version})",
            self.page, self.file_name
        ));
        Ok(())
    }
}

#[derive(Args)]
pub(crate) struct GetArgs {
    /// Page the attachment belongs to.
    page: String,

    /// Attachment file name.
    file_name: String,

    /// Revision number or "latest".
    #[arg(short, long, default_value = "latest")]
    revision: Version,

    /// Write to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl GetArgs {
    fn execute(self, store: &Store) -> Result<(), CliError> {
        let attachments = registry::open_attachments(&store.config)?;
        let data = attachments.get_attachment_data(&self.page, &self.file_name, self.revision)?;
        match &self.output {
            Some(path) => {
                std::fs::write(path, &data)?;
                Output::new().success(&format!("Wrote {} bytes to {}", data.len(), path.display()));
                Ok(())
            }
            None => Output::new().raw(&data),
        }
    }
}

#[derive(Args)]
pub(crate) struct ListArgs {
    /// Page whose attachments to list.
    page: String,

    /// Print JSON.
    #[arg(long)]
    json: bool,
}

impl ListArgs {
    fn execute(self, store: &Store) -> Result<(), CliError> {
        let output = Output::new();
        let attachments = registry::open_attachments(&store.config)?;
        let list = attachments.list_attachments(&self.page)?;
        if self.json {
            return output.json(&list);
        }
        for info in &list {
            output.line(&format!(
                "{:<30} {:>4}  {}  {:>8}  {}",
                info.file_name,
                info.version,
                format_time(info.last_modified),
                info.size,
                info.author_or_unknown()
            ));
        }
        Ok(())
    }
}
