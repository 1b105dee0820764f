//! Leader index pattern expressions.
//!
//! An autofollow rule names the leader indices it follows with a comma-separated
//! expression such as `logs-*,-logs-tmp*`. Items are index names where `*` matches
//! any run of characters; items prefixed with `-` exclude matches. Wildcards do not
//! match hidden indices (names starting with `.`) unless the item itself starts
//! with `.`.

use std::fmt;

use crate::error::FollowerError;

const INVALID_CHARS: &[char] = &['\\', '/', '?', '"', '<', '>', '|', ' ', '#', ':'];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Item {
    glob: String,
    exclude: bool,
}

impl Item {
    fn matches(&self, name: &str) -> bool {
        if name.starts_with('.') && self.glob.contains('*') && !self.glob.starts_with('.') {
            return false;
        }
        simple_match(&self.glob, name)
    }
}

/// A parsed leader index expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPattern {
    source: String,
    items: Vec<Item>,
}

impl IndexPattern {
    /// Parse and validate an expression.
    pub fn parse(expr: &str) -> Result<Self, FollowerError> {
        let invalid = |reason: &str| FollowerError::InvalidPattern {
            pattern: expr.to_string(),
            reason: reason.to_string(),
        };

        if expr.trim().is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let mut items = Vec::new();
        for (i, raw) in expr.split(',').enumerate() {
            let (glob, exclude) = match raw.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (raw, false),
            };
            if glob.is_empty() {
                return Err(invalid("empty item"));
            }
            if exclude && i == 0 {
                return Err(invalid("pattern cannot start with an exclusion"));
            }
            if glob.starts_with('_') || glob.starts_with('+') {
                return Err(invalid("items must not start with '_' or '+'"));
            }
            if glob.chars().any(|c| INVALID_CHARS.contains(&c)) {
                return Err(invalid("item contains an invalid character"));
            }
            if glob.chars().any(|c| c.is_uppercase()) {
                return Err(invalid("index names must be lowercase"));
            }
            items.push(Item {
                glob: glob.to_string(),
                exclude,
            });
        }

        Ok(Self {
            source: expr.to_string(),
            items,
        })
    }

    /// Returns true if `name` is selected by the expression.
    pub fn matches(&self, name: &str) -> bool {
        let included = self.items.iter().any(|item| !item.exclude && item.matches(name));
        included && !self.items.iter().any(|item| item.exclude && item.matches(name))
    }

    /// Keep the names the expression selects, preserving their order.
    pub fn filter(&self, names: Vec<String>) -> Vec<String> {
        names.into_iter().filter(|n| self.matches(n)).collect()
    }

    /// The expression as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for IndexPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Glob match supporting only `*`.
fn simple_match(glob: &str, name: &str) -> bool {
    let g: Vec<char> = glob.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut gi, mut ni) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while ni < n.len() {
        if gi < g.len() && g[gi] == '*' {
            star = Some(gi);
            gi += 1;
            resume = ni;
        } else if gi < g.len() && g[gi] == n[ni] {
            gi += 1;
            ni += 1;
        } else if let Some(s) = star {
            gi = s + 1;
            resume += 1;
            ni = resume;
        } else {
            return false;
        }
    }
    g[gi..].iter().all(|c| *c == '*')
}
