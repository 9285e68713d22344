//! `quire search` command implementation.

use clap::Args;
use quire_store::parse_query;

use super::{Store, retry_modified};
use crate::error::CliError;
use crate::output::Output;

/// Search page contents.
///
/// `+word` must match, `-word` must not, `"a phrase"` matches a run of words.
#[derive(Args)]
pub(crate) struct SearchArgs {
    /// Query terms.
    #[arg(required = true, allow_hyphen_values = true)]
    query: Vec<String>,

    /// Maximum number of results.
    #[arg(short = 'n', long, default_value_t = 20)]
    limit: usize,

    /// Print JSON.
    #[arg(long)]
    json: bool,
}

impl SearchArgs {
    pub(crate) fn execute(self, store: &Store) -> Result<(), CliError> {
        let output = Output::new();
        let query = parse_query(&self.query.join(" "));
        if query.is_empty() {
            return Err(CliError::Validation("empty query".to_owned()));
        }

        let mut results = retry_modified(|| store.pages.find_pages(&query))?;
        results.truncate(self.limit);

        if self.json {
            return output.json(&results);
        }
        if results.is_empty() {
            output.muted("No matches");
        }
        for result in &results {
            output.heading(&format!("{} ({})", result.name, result.score));
            for context in &result.contexts {
                output.muted(&format!("  {context}"));
            }
        }
        Ok(())
    }
}
