//! Paths exempt from response caching.
//!
//! Patterns accept `:name` or `{name}` for a single path segment and `*` or
//! `{*name}` for the remainder of the path. They are compiled once, when the
//! route cache is built, and a malformed pattern is a startup error.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhitelistPatternError {
    #[error("whitelist pattern `{pattern}` must start with `/`")]
    MissingLeadingSlash { pattern: String },
    #[error("whitelist pattern `{pattern}` has an empty parameter name at byte {position}")]
    EmptyParameter { pattern: String, position: usize },
    #[error("whitelist pattern `{pattern}` has an invalid parameter name `{name}`")]
    InvalidParameter { pattern: String, name: String },
    #[error("whitelist pattern `{pattern}` has an unbalanced brace at byte {position}")]
    UnbalancedBrace { pattern: String, position: usize },
    #[error("whitelist pattern `{pattern}` failed to compile: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled whitelist, evaluated in configured order.
#[derive(Debug, Clone, Default)]
pub struct WhitelistMatcher {
    patterns: Vec<Regex>,
}

impl WhitelistMatcher {
    pub fn new<I, S>(patterns: I) -> Result<Self, WhitelistPatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| compile(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_whitelisted(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(path))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn compile(pattern: &str) -> Result<Regex, WhitelistPatternError> {
    if !pattern.starts_with('/') {
        return Err(WhitelistPatternError::MissingLeadingSlash {
            pattern: pattern.to_string(),
        });
    }

    let trimmed = if pattern.len() > 1 {
        pattern.trim_end_matches('/')
    } else {
        pattern
    };

    let mut source = String::from("^");
    let mut chars = trimmed.char_indices().peekable();

    while let Some((position, ch)) = chars.next() {
        match ch {
            ':' => {
                let mut name = String::new();
                while let Some((_, next)) = chars.peek() {
                    if !is_name_char(*next) {
                        break;
                    }
                    name.push(*next);
                    chars.next();
                }
                if name.is_empty() {
                    return Err(WhitelistPatternError::EmptyParameter {
                        pattern: pattern.to_string(),
                        position,
                    });
                }
                source.push_str("[^/]+");
            }
            '{' => {
                let mut inner = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    inner.push(next);
                }
                if !closed {
                    return Err(WhitelistPatternError::UnbalancedBrace {
                        pattern: pattern.to_string(),
                        position,
                    });
                }
                let (catch_all, name) = match inner.strip_prefix('*') {
                    Some(rest) => (true, rest),
                    None => (false, inner.as_str()),
                };
                if name.is_empty() {
                    return Err(WhitelistPatternError::EmptyParameter {
                        pattern: pattern.to_string(),
                        position,
                    });
                }
                if !name.chars().all(is_name_char) {
                    return Err(WhitelistPatternError::InvalidParameter {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                source.push_str(if catch_all { ".*" } else { "[^/]+" });
            }
            '}' => {
                return Err(WhitelistPatternError::UnbalancedBrace {
                    pattern: pattern.to_string(),
                    position,
                });
            }
            '*' => source.push_str(".*"),
            other => {
                let mut buf = [0u8; 4];
                source.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }

    if trimmed != "/" {
        source.push_str("/?");
    }
    source.push('$');

    Regex::new(&source).map_err(|source| WhitelistPatternError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}
