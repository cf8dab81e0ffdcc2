//! Splitting of multi-value IP range cells.

use std::net::IpAddr;
use std::sync::OnceLock;

use ipnet::IpNet;
use regex::Regex;

/// Error type for `ranges` operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// Token is neither a network nor a bare address
    #[error("invalid network '{value}'")]
    InvalidNetwork {
        /// Offending token, annotation stripped
        value: String,
    },
}

fn trailing_annotation() -> &'static Regex {
    static ANNOTATION: OnceLock<Regex> = OnceLock::new();
    ANNOTATION.get_or_init(|| Regex::new(r"\(.*\)$").expect("static regex"))
}

/// Splits a cell on `,` or `;` outside of parentheses.
///
/// `"10.0.0.0/24 (office, 2nd floor); 10.1.0.0/16"` yields two tokens; the comma inside
/// the annotation is kept.
pub fn smart_split(cell: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut depth = 0usize;

    for ch in cell.trim().chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if matches!(ch, ',' | ';') && depth == 0 {
            let part = buf.trim();
            if !part.is_empty() {
                out.push(part.to_string());
            }
            buf.clear();
        } else {
            buf.push(ch);
        }
    }
    let part = buf.trim();
    if !part.is_empty() {
        out.push(part.to_string());
    }
    out
}

/// Removes a trailing `(...)` annotation and surrounding whitespace.
pub fn strip_annotation(token: &str) -> &str {
    match trailing_annotation().find(token) {
        Some(m) => token[..m.start()].trim(),
        None => token.trim(),
    }
}

/// Candidate CIDR tokens of a cell, annotations stripped, empties dropped.
pub fn split_ranges(cell: &str) -> Vec<String> {
    smart_split(cell)
        .iter()
        .map(|token| strip_annotation(token))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses an IPv4 or IPv6 network. A bare address becomes a /32 or /128.
///
/// Host bits are kept as written, the way the cloud API receives them.
///
/// # Errors
/// Returns [`RangeError::InvalidNetwork`] if `token` is not a network literal.
pub fn parse_network(token: &str) -> Result<IpNet, RangeError> {
    if let Ok(net) = token.parse::<IpNet>() {
        return Ok(net);
    }
    let invalid = || RangeError::InvalidNetwork {
        value: token.to_string(),
    };
    let addr = token.parse::<IpAddr>().map_err(|_| invalid())?;
    let prefix = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    IpNet::new(addr, prefix).map_err(|_| invalid())
}

/// Splits and validates every network of a cell.
///
/// # Errors
/// Fails on the first token that is not a valid network.
pub fn parse_ranges(cell: &str) -> Result<Vec<IpNet>, RangeError> {
    split_ranges(cell)
        .iter()
        .map(|token| parse_network(token))
        .collect()
}
