pub mod inspect;
pub mod monitor;
pub mod record;

use std::time::Duration;

/// Parse a duration string like "5m", "30s", "1h", "100ms". Bare numbers are
/// seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    let (numeric, multiplier) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1000)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        (s, 1000)
    };

    let value: u64 = numeric.trim().parse().ok()?;
    value.checked_mul(multiplier).map(Duration::from_millis)
}
