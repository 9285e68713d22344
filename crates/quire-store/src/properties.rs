//! Java-properties style `key = value` files.
//!
//! Used for per-version metadata (`page.properties`, `attachment.properties`)
//! and the plain store's sidecar files. Output is pure ASCII: non-ASCII
//! characters are written as `\uXXXX` escapes so the files read back the
//! same regardless of the platform charset.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Ordered string-to-string property map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Create an empty property map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse properties text. Malformed escapes are kept literally.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in logical_lines(text) {
            let (key, value) = split_key_value(&line);
            entries.insert(unescape(key), unescape(value));
        }
        Self { entries }
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Remove a key, returning the old value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Remove every key that starts with `prefix`.
    pub fn remove_prefix(&mut self, prefix: &str) {
        self.entries.retain(|k, _| !k.starts_with(prefix));
    }

    /// Iterate entries whose key starts with `prefix`, yielding the suffix.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.entries
            .range(prefix.to_owned()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(move |(k, v)| (&k[prefix.len()..], v.as_str()))
    }

    /// Iterate all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Serialize as `key = value` lines, sorted by key.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            let _ = writeln!(out, "{} = {}", escape(key, true), escape(value, false));
        }
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Join continuation lines and drop blanks and comments.
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut continuing = false;

    for raw in text.lines() {
        let line = raw.trim_start();
        if !continuing && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }
        current.push_str(line);
        // An odd number of trailing backslashes continues the line.
        let trailing = current.chars().rev().take_while(|&c| c == '\\').count();
        if trailing % 2 == 1 {
            current.pop();
            continuing = true;
        } else {
            lines.push(std::mem::take(&mut current));
            continuing = false;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Split a logical line at the first unescaped separator.
fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\x0c' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }
    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches([' ', '\t', '\x0c']);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches([' ', '\t', '\x0c']);
    }
    (key, rest)
}

fn unescape(input: &str) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u16; 2];
            units.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }
        let Some(next) = chars.next() else { break };
        let decoded = match next {
            't' => '\t',
            'n' => '\n',
            'r' => '\r',
            'f' => '\x0c',
            'u' => {
                let hex: String = chars.clone().take(4).collect();
                if let Ok(unit) = u16::from_str_radix(&hex, 16)
                    && hex.len() == 4
                {
                    for _ in 0..4 {
                        chars.next();
                    }
                    units.push(unit);
                    continue;
                }
                'u'
            }
            other => other,
        };
        let mut buf = [0u16; 2];
        units.extend_from_slice(decoded.encode_utf16(&mut buf));
    }
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn escape(input: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, c) in input.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    let _ = write!(out, "\\u{unit:04X}");
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_basic() {
        let props = Properties::parse("# comment\n1.author = Alice\n2.author=Bob\n\n! other\n");

        assert_eq!(props.len(), 2);
        assert_eq!(props.get("1.author"), Some("Alice"));
        assert_eq!(props.get("2.author"), Some("Bob"));
    }

    #[test]
    fn test_parse_colon_and_whitespace_separators() {
        let props = Properties::parse("a: one\nb two\n  c   =   three  ");

        assert_eq!(props.get("a"), Some("one"));
        assert_eq!(props.get("b"), Some("two"));
        assert_eq!(props.get("c"), Some("three  "));
    }

    #[test]
    fn test_parse_continuation() {
        let props = Properties::parse("note = first \\\n    second\n");

        assert_eq!(props.get("note"), Some("first second"));
    }

    #[test]
    fn test_round_trip_special_characters() {
        let mut props = Properties::new();
        props.set("3.changenote", "fixed a=b: #1 \\ path\nnext line");
        props.set("key with space", " leading");
        props.set("3.author", "Jürgen 😀");

        let parsed = Properties::parse(&props.to_text());

        assert_eq!(parsed, props);
    }

    #[test]
    fn test_output_is_ascii() {
        let mut props = Properties::new();
        props.set("1.author", "Jürgen");

        let text = props.to_text();

        assert!(text.is_ascii());
        assert_eq!(text, "1.author = J\\u00FCrgen\n");
    }

    #[test]
    fn test_with_prefix() {
        let props: Properties = [
            ("1.author", "A"),
            ("1.changenote", "first"),
            ("10.author", "B"),
            ("2.author", "C"),
        ]
        .into_iter()
        .collect();

        let one: Vec<_> = props.with_prefix("1.").collect();

        assert_eq!(one, vec![("author", "A"), ("changenote", "first")]);
    }

    #[test]
    fn test_remove_prefix() {
        let mut props: Properties = [("2.author", "A"), ("2.changenote", "x"), ("1.author", "B")]
            .into_iter()
            .collect();

        props.remove_prefix("2.");

        assert_eq!(props.len(), 1);
        assert_eq!(props.get("1.author"), Some("B"));
    }
}
