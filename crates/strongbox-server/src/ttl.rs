//! TTL string parsing.
//!
//! Accepts `s` (seconds), `m` (minutes), and `h` (hours) suffixes; a
//! bare number is seconds. Anything else is an invalid TTL.

/// A TTL string could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid TTL value")]
pub struct TtlError;

/// Parse a TTL like `"1h"`, `"5m"`, `"30s"`, or `"300"` into seconds.
///
/// # Errors
///
/// Returns [`TtlError`] for an empty string, an unknown unit, or a
/// non-numeric quantity.
pub fn parse_ttl(ttl: &str) -> Result<i64, TtlError> {
    if ttl.is_empty() {
        return Err(TtlError);
    }

    let (quantity, multiplier) = match ttl.as_bytes()[ttl.len() - 1] {
        b's' => (&ttl[..ttl.len() - 1], 1),
        b'm' => (&ttl[..ttl.len() - 1], 60),
        b'h' => (&ttl[..ttl.len() - 1], 3600),
        b'0'..=b'9' => (ttl, 1),
        _ => return Err(TtlError),
    };

    let seconds: i64 = quantity.parse().map_err(|_| TtlError)?;
    Ok(seconds * multiplier)
}
