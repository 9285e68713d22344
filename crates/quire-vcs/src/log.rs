//! Parser for `rlog` output.

use std::sync::LazyLock;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime};
use quire_store::{Charset, url_decode};
use regex::Regex;

static REVISION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^revision 1\.(\d+)").unwrap());
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^date:\s*([^;]+);").unwrap());
static AUTHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^"?author=([^;"]*)(?:;changenote=([^"]*))?"?\s*$"#).unwrap()
});
static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:-{20,}|={20,})\s*$").unwrap());
static CONFIRMED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^revision 1\.(\d+)").unwrap());

/// One revision record from the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Revision number (the `N` of `1.N`).
    pub version: u32,
    /// Check-in time.
    pub date: Option<SystemTime>,
    /// Author from the check-in message.
    pub author: Option<String>,
    /// Change note from the check-in message.
    pub changenote: Option<String>,
}

/// Parse a log into entries in output order (newest first for `rlog`).
///
/// Header lines before the first revision are ignored; each record ends at
/// a separator line.
pub fn parse_log(output: &str, charset: Charset) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut current: Option<LogEntry> = None;

    for line in output.lines() {
        let line = line.trim_end();
        if SEPARATOR_RE.is_match(line) {
            entries.extend(current.take());
            continue;
        }
        if let Some(caps) = REVISION_RE.captures(line) {
            entries.extend(current.take());
            current = caps[1].parse().ok().map(|version| LogEntry {
                version,
                date: None,
                author: None,
                changenote: None,
            });
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        if let Some(caps) = DATE_RE.captures(line) {
            entry.date = parse_date(caps[1].trim());
        } else if let Some(caps) = AUTHOR_RE.captures(line) {
            entry.author = decode(&caps[1], charset);
            entry.changenote = caps.get(2).and_then(|m| decode(m.as_str(), charset));
        }
    }
    entries.extend(current);
    entries
}

/// Revision number confirmed by `co` on stderr (`revision 1.N`).
pub fn confirmed_version(stderr: &str) -> Option<u32> {
    CONFIRMED_RE
        .captures(stderr)
        .and_then(|caps| caps[1].parse().ok())
}

fn decode(value: &str, charset: Charset) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    Some(url_decode(value, charset).unwrap_or_else(|_| value.to_owned()))
}

/// Parse `-zLT` (`2024-01-15 10:30:00+00`) or classic (`2024/01/15 10:30:00`,
/// UTC) dates.
fn parse_date(text: &str) -> Option<SystemTime> {
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%#z") {
        return Some(dt.into());
    }
    ["%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc().into())
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use pretty_assertions::assert_eq;

    use super::*;

    const FULL_LOG: &str = "\
RCS file: RCS/Main.txt,v
Working file: Main.txt
head: 1.3
branch:
locks: strict
\twiki: 1.3
access list:
keyword substitution: kv
total revisions: 3;\tselected revisions: 3
description:
----------------------------
revision 1.3\tlocked by: wiki;
date: 2024-01-15 10:30:00+02;  author: wiki;  state: Exp;  lines: +1 -1
author=Jane+Doe;changenote=typo+fix
----------------------------
revision 1.2
date: 2024/01/14 09:00:00;  author: wiki;  state: Exp;  lines: +2 -0
\"author=Bob;changenote=\"
----------------------------
revision 1.1
date: 2024/01/13 08:00:00;  author: wiki;  state: Exp;
Initial revision
=============================================================================
";

    #[test]
    fn test_parse_full_log() {
        let entries = parse_log(FULL_LOG, Charset::Utf8);

        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.version, e.author.clone(), e.changenote.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (3, Some("Jane Doe".to_owned()), Some("typo fix".to_owned())),
                (2, Some("Bob".to_owned()), None),
                (1, None, None),
            ]
        );
    }

    #[test]
    fn test_parse_dates() {
        let entries = parse_log(FULL_LOG, Charset::Utf8);

        // 2024-01-15 08:30:00 UTC
        assert_eq!(
            entries[0].date,
            Some(UNIX_EPOCH + Duration::from_secs(1_705_307_400))
        );
        // 2024-01-14 09:00:00 UTC
        assert_eq!(
            entries[1].date,
            Some(UNIX_EPOCH + Duration::from_secs(1_705_222_800))
        );
    }

    #[test]
    fn test_parse_unquoted_author_only() {
        let log = "revision 1.1\ndate: 2024/01/13 08:00:00;  author: x;\nauthor=Alice\n-----------------------------\n";

        let entries = parse_log(log, Charset::Utf8);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].author.as_deref(), Some("Alice"));
        assert_eq!(entries[0].changenote, None);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_log("", Charset::Utf8).is_empty());
        assert!(parse_log("RCS file: x\nhead: 1.1\n", Charset::Utf8).is_empty());
    }

    #[test]
    fn test_confirmed_version() {
        assert_eq!(
            confirmed_version("Main.txt,v  -->  standard output\nrevision 1.4\n"),
            Some(4)
        );
        assert_eq!(confirmed_version("co: Main.txt,v: no such file"), None);
    }
}
