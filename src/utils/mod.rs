pub mod constants;

pub use constants::*;

use std::time::Duration;

/// Convert a configured number of seconds into a `Duration`.
///
/// Negative, NaN and out-of-range values collapse to zero instead of
/// panicking the way `Duration::from_secs_f64` would.
#[must_use]
pub fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::ZERO)
}

/// Case-insensitive substring check used by the response classifiers.
#[must_use]
pub fn contains_marker(content: &str, marker: &str) -> bool {
    content.to_lowercase().contains(marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_to_duration_clamps_invalid_values() {
        assert_eq!(secs_to_duration(1.5), Duration::from_millis(1500));
        assert_eq!(secs_to_duration(-3.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_contains_marker_ignores_case() {
        assert!(contains_marker("Checking your browser - CloudFlare", "cloudflare"));
        assert!(!contains_marker("plain article", "captcha"));
    }
}
