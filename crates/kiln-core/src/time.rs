//! Compact monotonic time utilities.
//!
//! Uses a process-local monotonic clock so deadlines fit in a bare u64
//! (8 bytes vs 16 for `Option<Instant>`). Deadline 0 is the reserved
//! "never expires" sentinel; real deadlines are always `now_ms() + ttl`
//! with a positive ttl, so 0 is never produced arithmetically.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static START: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *START.get_or_init(Instant::now)
}

/// Sentinel deadline meaning "never expires".
pub const NO_EXPIRY: u64 = 0;

/// Returns current monotonic time in milliseconds since process start.
#[inline]
pub fn now_ms() -> u64 {
    epoch().elapsed().as_millis() as u64
}

/// Converts a positive TTL in milliseconds to an absolute deadline.
#[inline]
pub fn deadline_after(ttl_ms: u64) -> u64 {
    debug_assert!(ttl_ms > 0, "a zero ttl means no expiry, not a deadline");
    now_ms().saturating_add(ttl_ms)
}

/// Returns remaining TTL in milliseconds, or None if the deadline is the
/// no-expiry sentinel.
#[inline]
pub fn remaining_ms(deadline_ms: u64) -> Option<u64> {
    if deadline_ms == NO_EXPIRY {
        None
    } else {
        Some(deadline_ms.saturating_sub(now_ms()))
    }
}

/// Returns remaining TTL in whole seconds, or None if no expiry.
#[inline]
pub fn remaining_secs(deadline_ms: u64) -> Option<u64> {
    remaining_ms(deadline_ms).map(|ms| ms / 1000)
}

/// Maps a deadline on the process-local clock back to an `Instant`,
/// for handing to timer primitives that sleep until a time point.
#[inline]
pub fn instant_at(deadline_ms: u64) -> Instant {
    epoch() + Duration::from_millis(deadline_ms)
}
