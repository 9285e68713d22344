//! Command templates for the external RCS tools.

use quire_store::{Charset, CodecError, url_encode};

/// Default check-in command.
pub const DEFAULT_CHECKIN: &str = "ci -m\"author=%u;changenote=%c\" -l -t-none %s";
/// Default check-out command (writes the revision to stdout).
pub const DEFAULT_CHECKOUT: &str = "co -p -r1.%v %s";
/// Default head-revision log command.
pub const DEFAULT_LOG: &str = "rlog -zLT -r %s";
/// Default full-history log command.
pub const DEFAULT_FULL_LOG: &str = "rlog -zLT %s";
/// Default revision removal command.
pub const DEFAULT_DELETE_VERSION: &str = "rcs -o1.%v %s";

/// Configurable command lines.
///
/// Placeholders: `%s` quoted `./`-relative working file name, `%u`
/// URL-encoded author, `%c` URL-encoded change note, `%v` version number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandTemplates {
    /// Check in the working file as a new revision.
    pub checkin: String,
    /// Print one revision to stdout.
    pub checkout: String,
    /// Log of the head revision.
    pub log: String,
    /// Log of every revision.
    pub full_log: String,
    /// Remove one revision; `None` disables `delete_version`.
    pub delete_version: Option<String>,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            checkin: DEFAULT_CHECKIN.to_owned(),
            checkout: DEFAULT_CHECKOUT.to_owned(),
            log: DEFAULT_LOG.to_owned(),
            full_log: DEFAULT_FULL_LOG.to_owned(),
            delete_version: Some(DEFAULT_DELETE_VERSION.to_owned()),
        }
    }
}

/// Values substituted into a template.
#[derive(Clone, Debug, Default)]
pub struct Substitutions<'a> {
    /// Mangled working file name, including suffix.
    pub file: &'a str,
    /// Author, unencoded.
    pub author: Option<&'a str>,
    /// Change note, unencoded.
    pub changenote: Option<&'a str>,
    /// Revision number.
    pub version: Option<u32>,
}

/// Expand placeholders in `template`.
///
/// Unknown `%x` sequences are kept literally. Author and change note are
/// URL-encoded so they cannot break out of shell quoting. The file name is
/// passed as one quoted `./name` argument, so the shell never globs it and
/// the tools never read it as an option.
pub fn expand(template: &str, subs: &Substitutions<'_>, charset: Charset) -> Result<String, CodecError> {
    let mut out = String::with_capacity(template.len() + subs.file.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push_str(&quote_file(subs.file)),
            Some('u') => out.push_str(&url_encode(subs.author.unwrap_or_default(), charset)?),
            Some('c') => out.push_str(&url_encode(subs.changenote.unwrap_or_default(), charset)?),
            Some('v') => {
                if let Some(v) = subs.version {
                    out.push_str(&v.to_string());
                }
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    Ok(out)
}

/// Quote `./<file>` as a single argument for the platform shell.
#[cfg(not(target_os = "windows"))]
fn quote_file(file: &str) -> String {
    format!("'./{}'", file.replace('\'', r"'\''"))
}

#[cfg(target_os = "windows")]
fn quote_file(file: &str) -> String {
    format!("\"./{file}\"")
}

#[cfg(all(test, not(target_os = "windows")))]
mod tests {
    use super::*;

    #[test]
    fn test_expand_checkin() {
        let subs = Substitutions {
            file: "Main+Page.txt",
            author: Some("Jane Doe"),
            changenote: Some("fix; \"quotes\""),
            version: None,
        };

        let cmd = expand(DEFAULT_CHECKIN, &subs, Charset::Utf8).unwrap();

        assert_eq!(
            cmd,
            "ci -m\"author=Jane+Doe;changenote=fix%3B+%22quotes%22\" -l -t-none './Main+Page.txt'"
        );
    }

    #[test]
    fn test_expand_checkout() {
        let subs = Substitutions {
            file: "Main.txt",
            version: Some(3),
            ..Substitutions::default()
        };

        assert_eq!(
            expand(DEFAULT_CHECKOUT, &subs, Charset::Utf8).unwrap(),
            "co -p -r1.3 './Main.txt'"
        );
    }

    #[test]
    fn test_expand_keeps_unknown_placeholders() {
        let subs = Substitutions {
            file: "A.txt",
            ..Substitutions::default()
        };

        assert_eq!(expand("x %q %s 100%", &subs, Charset::Utf8).unwrap(), "x %q './A.txt' 100%");
    }

    #[test]
    fn test_expand_missing_author_is_empty() {
        let subs = Substitutions {
            file: "A.txt",
            ..Substitutions::default()
        };

        assert_eq!(expand("u=%u", &subs, Charset::Utf8).unwrap(), "u=");
    }

    #[test]
    fn test_expand_quotes_file_argument() {
        let subs = Substitutions {
            file: "*.txt",
            ..Substitutions::default()
        };

        assert_eq!(expand("rlog %s", &subs, Charset::Utf8).unwrap(), "rlog './*.txt'");
    }

    #[test]
    fn test_quote_file_escapes_single_quote() {
        assert_eq!(quote_file("it's.txt"), r"'./it'\''s.txt'");
    }
}
