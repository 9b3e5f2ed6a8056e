//! Wildcard pattern matching for call and variable matchers.
//!
//! `*` is the only metacharacter. Supported shapes: `*`, `prefix*`,
//! `*suffix`, `*infix*` — at most one `*` on each side. Anything else is an
//! invalid pattern.

use crate::error::{Result, SleuthError};

/// Check a pattern up front so invalid rules are rejected at load time.
pub fn validate(pattern: &str, wildcard: bool) -> Result<()> {
    if !wildcard {
        return Ok(());
    }
    shape(pattern).map(|_| ())
}

/// Match `text` against `pattern`.
pub fn matches(text: &str, pattern: &str, wildcard: bool) -> Result<bool> {
    if !wildcard {
        return Ok(text == pattern);
    }
    Ok(match shape(pattern)? {
        Shape::Any => true,
        Shape::Exact(p) => text == p,
        Shape::Prefix(p) => text.starts_with(p),
        Shape::Suffix(s) => text.ends_with(s),
        Shape::Infix(i) => text.contains(i),
    })
}

enum Shape<'a> {
    Any,
    Exact(&'a str),
    Prefix(&'a str),
    Suffix(&'a str),
    Infix(&'a str),
}

fn shape(pattern: &str) -> Result<Shape<'_>> {
    if pattern == "*" {
        return Ok(Shape::Any);
    }
    let leading = pattern.starts_with('*');
    let trailing = pattern.ends_with('*');
    let inner = match (leading, trailing) {
        (true, true) => &pattern[1..pattern.len() - 1],
        (true, false) => &pattern[1..],
        (false, true) => &pattern[..pattern.len() - 1],
        (false, false) => pattern,
    };
    if inner.contains('*') {
        return Err(SleuthError::InvalidPattern(pattern.to_string()));
    }
    Ok(match (leading, trailing) {
        (true, true) => Shape::Infix(inner),
        (true, false) => Shape::Suffix(inner),
        (false, true) => Shape::Prefix(inner),
        (false, false) => Shape::Exact(inner),
    })
}
