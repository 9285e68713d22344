//! Terminal output: data on stdout, status on stderr.

use std::io::Write;

use console::{Style, Term};
use serde::Serialize;

use crate::error::CliError;

/// Terminal output formatter.
pub(crate) struct Output {
    out: Term,
    err: Term,
    green: Style,
    red: Style,
    cyan_bold: Style,
    dim: Style,
}

impl Output {
    /// Create a new output formatter.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            out: Term::stdout(),
            err: Term::stderr(),
            green: Style::new().green(),
            red: Style::new().red(),
            cyan_bold: Style::new().cyan().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Print a line of command output.
    pub(crate) fn line(&self, msg: &str) {
        let _ = self.out.write_line(msg);
    }

    /// Write bytes to stdout unchanged.
    pub(crate) fn raw(&self, data: &[u8]) -> Result<(), CliError> {
        let mut out = &self.out;
        out.write_all(data)?;
        out.flush()?;
        Ok(())
    }

    /// Print a value as pretty JSON.
    pub(crate) fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), CliError> {
        self.line(&serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print a success message (green).
    pub(crate) fn success(&self, msg: &str) {
        let _ = self.err.write_line(&self.green.apply_to(msg).to_string());
    }

    /// Print an error message (red).
    pub(crate) fn error(&self, msg: &str) {
        let _ = self.err.write_line(&self.red.apply_to(msg).to_string());
    }

    /// Print a heading (cyan bold) on stdout.
    pub(crate) fn heading(&self, msg: &str) {
        self.line(&self.cyan_bold.apply_to(msg).to_string());
    }

    /// Print a de-emphasized line on stdout.
    pub(crate) fn muted(&self, msg: &str) {
        self.line(&self.dim.apply_to(msg).to_string());
    }
}
