//! Retry-After header parsing
//!
//! The `retry-after` HTTP header arrives either as a number of seconds or
//! as an RFC 7231 HTTP-date. Providers overwhelmingly send the numeric
//! form, so that is tried first.

use tracing::debug;

/// Parse a `retry-after` header value into seconds from now.
///
/// Returns `None` when the value is neither a non-negative integer nor a
/// parseable HTTP-date. Past dates collapse to `Some(0)`: retry
/// immediately.
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    if let Ok(seconds) = header_value.trim().parse::<u64>() {
        return Some(seconds);
    }

    if let Ok(target_time) = chrono::DateTime::parse_from_rfc2822(header_value) {
        let delta = target_time.signed_duration_since(chrono::Utc::now());
        return Some(delta.num_seconds().max(0) as u64);
    }

    debug!(header_value, "unparseable retry-after header");
    None
}
