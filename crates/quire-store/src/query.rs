//! Search query model and the linear content matcher.
//!
//! A query is an ordered list of [`QueryItem`]s, each required, forbidden or
//! merely requested. [`SearchMatcher`] scores a single page's name and text
//! against the query; every provider's `find_pages` and the caching
//! decorator's index-assisted search share it, so ranking is identical no
//! matter which path found the candidates.

use std::cmp::Ordering;

use serde::Serialize;

/// Score added when a term appears in the page name.
const NAME_MATCH_BONUS: u32 = 5;

/// Maximum number of context lines kept per result.
const MAX_CONTEXTS: usize = 3;

/// How a query term constrains the result set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Page must contain the term.
    Required,
    /// Page must not contain the term.
    Forbidden,
    /// Term contributes to the score if present.
    Requested,
}

/// One term of a search query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryItem {
    /// Word or phrase (phrases contain whitespace).
    pub word: String,
    /// Constraint kind.
    pub kind: QueryKind,
}

impl QueryItem {
    /// Create a required term.
    #[must_use]
    pub fn required(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            kind: QueryKind::Required,
        }
    }

    /// Create a forbidden term.
    #[must_use]
    pub fn forbidden(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            kind: QueryKind::Forbidden,
        }
    }

    /// Create a requested (optional) term.
    #[must_use]
    pub fn requested(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            kind: QueryKind::Requested,
        }
    }

    /// True if the term is a multi-word phrase.
    #[must_use]
    pub fn is_phrase(&self) -> bool {
        self.word.trim().contains(char::is_whitespace)
    }
}

/// A page matching a search, with its score.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// Page name.
    pub name: String,
    /// Relevance score (higher is better, always > 0).
    pub score: u32,
    /// Lines of the page that matched, for display.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,
}

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Parse a query string.
///
/// Syntax: `+word` required, `-word` forbidden, bare words requested,
/// `"a phrase"` for phrases (prefixes apply to phrases too). The keywords
/// `AND`, `OR` and `NOT` are also understood: `NOT x` forbids `x`, `a AND b`
/// requires both, `OR` is the default.
#[must_use]
pub fn parse_query(input: &str) -> Vec<QueryItem> {
    let mut items: Vec<QueryItem> = Vec::new();
    let mut pending: Option<QueryKind> = None;
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else { break };

        let mut kind = None;
        if first == '+' || first == '-' {
            kind = Some(if first == '+' {
                QueryKind::Required
            } else {
                QueryKind::Forbidden
            });
            chars.next();
        }

        let quoted = chars.peek() == Some(&'"');
        let mut word = String::new();
        if quoted {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                word.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
        }

        if !quoted && kind.is_none() {
            match word.as_str() {
                "AND" => {
                    if let Some(last) = items.last_mut()
                        && last.kind == QueryKind::Requested
                    {
                        last.kind = QueryKind::Required;
                    }
                    pending = Some(QueryKind::Required);
                    continue;
                }
                "OR" => continue,
                "NOT" => {
                    pending = Some(QueryKind::Forbidden);
                    continue;
                }
                _ => {}
            }
        }

        let word = word.trim().to_owned();
        if word.is_empty() {
            continue;
        }
        let kind = kind
            .or_else(|| pending.take())
            .unwrap_or(QueryKind::Requested);
        pending = None;
        items.push(QueryItem { word, kind });
    }

    items
}

/// Prepared form of a query item.
struct Term {
    kind: QueryKind,
    needle: String,
    phrase: Option<Vec<String>>,
}

/// Scores pages against a query.
pub struct SearchMatcher {
    terms: Vec<Term>,
}

impl SearchMatcher {
    /// Prepare a matcher for the given query.
    #[must_use]
    pub fn new(query: &[QueryItem]) -> Self {
        let terms = query
            .iter()
            .filter_map(|item| {
                let needle = item.word.trim().to_lowercase();
                if needle.is_empty() {
                    return None;
                }
                let phrase = item
                    .is_phrase()
                    .then(|| tokenize(&needle).collect::<Vec<_>>())
                    .filter(|tokens| !tokens.is_empty());
                Some(Term {
                    kind: item.kind,
                    needle,
                    phrase,
                })
            })
            .collect();
        Self { terms }
    }

    /// Score one page.
    ///
    /// Returns `None` if a required term is missing, a forbidden term is
    /// present, or nothing matched at all.
    #[must_use]
    pub fn match_page(&self, name: &str, text: &str) -> Option<SearchResult> {
        let lower_text = text.to_lowercase();
        let lower_name = name.to_lowercase();
        let needs_tokens = self.terms.iter().any(|t| t.phrase.is_some());
        let text_tokens: Vec<String> = if needs_tokens {
            tokenize(&lower_text).collect()
        } else {
            Vec::new()
        };
        let name_tokens: Vec<String> = if needs_tokens {
            tokenize(&lower_name).collect()
        } else {
            Vec::new()
        };

        let mut score = 0u32;
        for term in &self.terms {
            let (in_text, in_name) = match &term.phrase {
                Some(run) => (
                    count_runs(&text_tokens, run),
                    count_runs(&name_tokens, run) > 0,
                ),
                None => (
                    count_occurrences(&lower_text, &term.needle),
                    lower_name.contains(&term.needle),
                ),
            };
            let found = in_text > 0 || in_name;
            match term.kind {
                QueryKind::Forbidden if found => return None,
                QueryKind::Forbidden => continue,
                QueryKind::Required if !found => return None,
                _ => {}
            }
            score = score.saturating_add(in_text);
            if in_name {
                score = score.saturating_add(NAME_MATCH_BONUS);
            }
        }

        if score == 0 {
            return None;
        }

        Some(SearchResult {
            name: name.to_owned(),
            score,
            contexts: self.contexts(text),
        })
    }

    /// Collect up to [`MAX_CONTEXTS`] lines containing a positive term.
    fn contexts(&self, text: &str) -> Vec<String> {
        let needles: Vec<&str> = self
            .terms
            .iter()
            .filter(|t| t.kind != QueryKind::Forbidden)
            .map(|t| match &t.phrase {
                Some(run) => run.first().map_or(t.needle.as_str(), String::as_str),
                None => t.needle.as_str(),
            })
            .collect();

        text.lines()
            .filter(|line| {
                let lower = line.to_lowercase();
                needles.iter().any(|n| lower.contains(n))
            })
            .map(|line| line.trim().to_owned())
            .take(MAX_CONTEXTS)
            .collect()
    }
}

/// Sort results by descending score, then by name.
pub fn rank(results: &mut [SearchResult]) {
    results.sort_by(|a, b| match b.score.cmp(&a.score) {
        Ordering::Equal => a.name.cmp(&b.name),
        other => other,
    });
}

fn count_occurrences(haystack: &str, needle: &str) -> u32 {
    u32::try_from(haystack.matches(needle).count()).unwrap_or(u32::MAX)
}

fn count_runs(tokens: &[String], run: &[String]) -> u32 {
    if run.is_empty() || tokens.len() < run.len() {
        return 0;
    }
    let count = tokens.windows(run.len()).filter(|w| *w == run).count();
    u32::try_from(count).unwrap_or(u32::MAX)
}
