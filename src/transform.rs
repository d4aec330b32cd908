//! Pure content-to-content transforms.
//!
//! A [`Transform`] never touches the filesystem and never fails. Whether a
//! step "did something" is decided by the engine, which compares the output
//! of [`Transform::apply`] against its input.

use regex::Regex;
use serde::Deserialize;
use std::fmt;

/// How many matches a substitution rewrites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLimit {
    /// Every non-overlapping match
    #[default]
    All,
    /// Only the leftmost match
    First,
}

/// How the engine persists a changed file.
///
/// Chosen by the transform kind, never by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Rewrite the whole file
    Truncate,
    /// Write only the bytes added at the end of the file
    Append,
}

/// A textual transformation over whole-file content.
#[derive(Debug, Clone)]
#[must_use = "Transform does nothing until apply() is called"]
pub enum Transform {
    /// Replace pattern matches with an expanded template.
    Substitute {
        pattern: Regex,
        /// Template in regex-crate expansion syntax (already normalised)
        template: String,
        limit: MatchLimit,
        /// Literal whose presence means the substitution already happened
        unless_contains: Option<String>,
    },
    /// Append a literal snippet unless the content already contains it.
    AppendIfMissing { snippet: String },
}

impl Transform {
    /// Build a substitution that rewrites every match.
    ///
    /// `template` uses `$N` group references (`$1new` is group 1 followed by
    /// `new`), `$&` for the whole match and `$$` for a literal dollar sign.
    pub fn substitute(pattern: Regex, template: &str) -> Self {
        Transform::Substitute {
            pattern,
            template: normalize_template(template),
            limit: MatchLimit::All,
            unless_contains: None,
        }
    }

    pub fn append_if_missing(snippet: impl Into<String>) -> Self {
        Transform::AppendIfMissing {
            snippet: snippet.into(),
        }
    }

    /// Restrict a substitution to the given number of matches.
    ///
    /// No effect on `AppendIfMissing`.
    pub fn with_limit(mut self, new_limit: MatchLimit) -> Self {
        if let Transform::Substitute { limit, .. } = &mut self {
            *limit = new_limit;
        }
        self
    }

    /// Skip a substitution when `guard` already occurs in the content.
    ///
    /// No effect on `AppendIfMissing`, whose snippet is its own guard.
    pub fn unless_contains(mut self, guard: impl Into<String>) -> Self {
        if let Transform::Substitute {
            unless_contains, ..
        } = &mut self
        {
            *unless_contains = Some(guard.into());
        }
        self
    }

    /// Apply the transform to `content`.
    ///
    /// Returns `content` unchanged when the pattern matches nothing, the guard
    /// is present, or the snippet is already there.
    pub fn apply(&self, content: &str) -> String {
        match self {
            Transform::Substitute {
                pattern,
                template,
                limit,
                unless_contains,
            } => {
                if let Some(guard) = unless_contains {
                    if content.contains(guard.as_str()) {
                        return content.to_string();
                    }
                }
                let replaced = match limit {
                    MatchLimit::All => pattern.replace_all(content, template.as_str()),
                    MatchLimit::First => pattern.replace(content, template.as_str()),
                };
                replaced.into_owned()
            }
            Transform::AppendIfMissing { snippet } => {
                if content.contains(snippet.as_str()) {
                    return content.to_string();
                }
                let mut out = String::with_capacity(content.len() + snippet.len() + 2);
                out.push_str(content);
                out.push('\n');
                out.push_str(snippet);
                out.push('\n');
                out
            }
        }
    }

    pub fn write_mode(&self) -> WriteMode {
        match self {
            Transform::Substitute { .. } => WriteMode::Truncate,
            Transform::AppendIfMissing { .. } => WriteMode::Append,
        }
    }

    /// Short kind name, as used in plan files.
    pub fn kind(&self) -> &'static str {
        match self {
            Transform::Substitute { .. } => "substitute",
            Transform::AppendIfMissing { .. } => "append-if-missing",
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Substitute {
                pattern,
                template,
                limit,
                ..
            } => {
                let scope = match limit {
                    MatchLimit::All => "all",
                    MatchLimit::First => "first",
                };
                write!(f, "substitute ({scope}) /{}/ -> {:?}", pattern.as_str(), template)
            }
            Transform::AppendIfMissing { snippet } => {
                let first_line = snippet.lines().next().unwrap_or("");
                write!(f, "append-if-missing {:?}", first_line)
            }
        }
    }
}

/// Rewrite `$N`-style group references into regex-crate syntax.
///
/// The regex crate reads `$1new` as a group named `1new`; plans mean group 1
/// followed by `new`. Group numbers take at most two digits, so `$123` is
/// group 12 followed by `3`. `$&` becomes `${0}` and `$$` stays a literal `$`.
/// `${name}` keeps its regex-crate meaning.
///
/// Any other `$` is literal text: `$CC` in a Makefile template stays `$CC`
/// instead of expanding a group named `CC`. This includes `` $` `` and `$'`,
/// which are emitted as written rather than expanded to the text before or
/// after the match.
pub fn normalize_template(template: &str) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().map(|&(_, next)| next) {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some(d) if d.is_ascii_digit() => {
                out.push_str("${");
                for _ in 0..2 {
                    match chars.peek() {
                        Some(&(_, d)) if d.is_ascii_digit() => {
                            out.push(d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                out.push('}');
            }
            Some('{') => out.push('$'),
            _ => out.push_str("$$"),
        }
    }

    out
}
