//! Counting store key generation.
//!
//! Every window lives under a composite key of the form
//! `ratelimit:{dimension}:{identifier}:{endpoint}`. Keys are never shared
//! across endpoints or across dimensions.

use crate::dimensions::DimensionKind;

/// Build the counting store key for one (dimension, identifier, endpoint)
/// combination.
pub fn window_key(kind: DimensionKind, identifier: &str, endpoint: &str) -> String {
    format!(
        "ratelimit:{}:{}:{}",
        kind.prefix(),
        sanitize(identifier),
        sanitize(endpoint)
    )
}

/// Sanitize a key segment. `:` is rejected along with other punctuation so
/// a hostile identifier cannot fake extra key segments.
pub fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
