//! SeedLink selector tokens.
//!
//! Selectors are applied server-side; the client validates their shape
//! and forwards each token in its own `SELECT` command. The accepted
//! shape is `[LL]CCC[.T]` with an optional leading `!` for negation,
//! where `?` is a single-character wildcard in the location and channel
//! fields.

use crate::error::{ProtocolError, Result};

/// Maximum length of a single selector token on the wire.
pub const MAX_SELECTOR_LEN: usize = 8;

/// Split a space-separated selector expression into validated tokens.
pub fn split_selectors(expr: &str) -> Result<Vec<String>> {
    expr.split_whitespace()
        .map(|token| {
            validate_selector(token)?;
            Ok(token.to_owned())
        })
        .collect()
}

/// Check that a token is a plausible selector.
pub fn validate_selector(token: &str) -> Result<()> {
    let body = token.strip_prefix('!').unwrap_or(token);

    if body.is_empty() || token.len() > MAX_SELECTOR_LEN {
        return Err(ProtocolError::InvalidSelector(token.to_owned()));
    }

    let (codes, qual) = match body.split_once('.') {
        Some((codes, qual)) => (codes, Some(qual)),
        None => (body, None),
    };

    // 3 chars selects a channel, 5 selects location + channel.
    if !matches!(codes.len(), 3 | 5)
        || !codes.chars().all(|c| c.is_ascii_alphanumeric() || c == '?')
    {
        return Err(ProtocolError::InvalidSelector(token.to_owned()));
    }

    if let Some(qual) = qual {
        if qual.len() != 1 || !qual.chars().all(|c| c.is_ascii_alphabetic() || c == '?') {
            return Err(ProtocolError::InvalidSelector(token.to_owned()));
        }
    }

    Ok(())
}
