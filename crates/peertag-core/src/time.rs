use std::time::Instant;

/// Milliseconds on a session-local wall clock.
pub type Millis = u64;

/// Milliseconds elapsed since `start`, saturating at `u64::MAX`.
pub fn millis_since(start: Instant) -> Millis {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
