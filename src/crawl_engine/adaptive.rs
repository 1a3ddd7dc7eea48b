//! Feedback-to-pacing loop
//!
//! `classify` turns a response into [`Feedback`]; `adjust` moves the shared
//! delay multiplicatively (x1.5 to slow down, x0.8 to speed up), jitters it
//! and clamps it into `[min_delay, max_delay]`. One instance serves every
//! task of a crawler, so the delay lives behind a mutex.

use log::{debug, info};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::crawl_types::{CrawlContext, Feedback, ResponseSnapshot};
use crate::config::AdaptiveSettings;
use crate::utils::{contains_marker, secs_to_duration};

const SLOW_DOWN_FACTOR: f64 = 1.5;
const SPEED_UP_FACTOR: f64 = 0.8;

/// Delay movement produced by one `adjust` call, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayAdjustment {
    pub previous: f64,
    /// Value after the multiplicative step, before jitter and clamping
    pub target: f64,
    pub applied: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustmentCounts {
    pub increased: u64,
    pub decreased: u64,
}

#[derive(Debug)]
pub struct AdaptiveManager {
    settings: AdaptiveSettings,
    current_delay: Mutex<f64>,
    increased: AtomicU64,
    decreased: AtomicU64,
}

impl AdaptiveManager {
    /// Create a manager starting at `min_delay`.
    #[must_use]
    pub fn new(settings: AdaptiveSettings) -> Self {
        let start = settings.min_delay;
        Self {
            settings,
            current_delay: Mutex::new(start),
            increased: AtomicU64::new(0),
            decreased: AtomicU64::new(0),
        }
    }

    /// Derive feedback from the last captured response.
    #[must_use]
    pub fn classify(&self, response: Option<&ResponseSnapshot>) -> Feedback {
        let mut feedback = Feedback::default();

        let Some(response) = response.filter(|r| !r.is_empty()) else {
            feedback.slow_down = true;
            feedback.retry_needed = true;
            return feedback;
        };

        let load_secs = response.load_time.as_secs_f64();
        match response.status {
            429 => {
                feedback.slow_down = true;
                feedback.retry_needed = true;
            }
            403 => {
                feedback.waf_detected = true;
                feedback.retry_needed = true;
            }
            status if status >= 400 => feedback.retry_needed = true,
            200 if load_secs < self.settings.adjust_threshold_fast => feedback.speed_up = true,
            200 if load_secs > self.settings.adjust_threshold_slow => feedback.slow_down = true,
            _ => {}
        }

        if contains_marker(&response.content, "captcha") {
            feedback.captcha_detected = true;
            feedback.slow_down = true;
        }
        if contains_marker(&response.content, "cloudflare") {
            feedback.waf_detected = true;
        }

        feedback
    }

    /// Move the shared delay according to `feedback` and flag the context
    /// when the retry budget is spent on a response that still needs one.
    pub fn adjust(&self, feedback: &Feedback, ctx: &mut CrawlContext) -> DelayAdjustment {
        let min = self.settings.min_delay;
        let max = self.settings.max_delay.max(min);
        let jitter_bound = self.settings.random_jitter.abs();

        let adjustment = {
            let mut current = self.current_delay.lock();
            let previous = *current;
            let target = if feedback.slow_down {
                self.increased.fetch_add(1, Ordering::Relaxed);
                (previous * SLOW_DOWN_FACTOR).min(max)
            } else if feedback.speed_up {
                self.decreased.fetch_add(1, Ordering::Relaxed);
                (previous * SPEED_UP_FACTOR).max(min)
            } else {
                previous
            };

            let jitter = if jitter_bound > 0.0 {
                rand::rng().random_range(-jitter_bound..=jitter_bound)
            } else {
                0.0
            };
            let applied = (target + jitter).clamp(min, max);
            *current = applied;
            DelayAdjustment {
                previous,
                target,
                applied,
            }
        };

        if feedback.slow_down {
            info!(
                "Slowing down {}: delay {:.2}s -> {:.2}s",
                ctx.url, adjustment.previous, adjustment.applied
            );
        } else if feedback.speed_up {
            debug!(
                "Speeding up: delay {:.2}s -> {:.2}s",
                adjustment.previous, adjustment.applied
            );
        }

        if feedback.retry_needed && ctx.retry_budget_spent() {
            info!("Retry budget spent for {}, stopping attempts", ctx.url);
            ctx.stop_attempts = true;
        }

        adjustment
    }

    #[must_use]
    pub fn current_delay(&self) -> Duration {
        secs_to_duration(*self.current_delay.lock())
    }

    #[must_use]
    pub fn adjustments(&self) -> AdjustmentCounts {
        AdjustmentCounts {
            increased: self.increased.load(Ordering::Relaxed),
            decreased: self.decreased.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &AdaptiveSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AdaptiveManager {
        AdaptiveManager::new(AdaptiveSettings::default())
    }

    fn page(status: u16, secs: f64, content: &str) -> ResponseSnapshot {
        ResponseSnapshot::new(content, status, Duration::from_secs_f64(secs))
    }

    #[test]
    fn test_classify_status_branches() {
        let m = manager();
        let body = "ordinary article body";

        let too_many = m.classify(Some(&page(429, 1.0, body)));
        assert!(too_many.slow_down && too_many.retry_needed);

        let forbidden = m.classify(Some(&page(403, 1.0, body)));
        assert!(forbidden.waf_detected && forbidden.retry_needed);
        assert!(!forbidden.slow_down);

        let not_found = m.classify(Some(&page(404, 1.0, body)));
        assert_eq!(
            not_found,
            Feedback {
                retry_needed: true,
                ..Feedback::default()
            }
        );

        let fast = m.classify(Some(&page(200, 0.1, body)));
        assert_eq!(
            fast,
            Feedback {
                speed_up: true,
                ..Feedback::default()
            }
        );

        let slow = m.classify(Some(&page(200, 3.0, body)));
        assert!(slow.slow_down && !slow.retry_needed);
    }

    #[test]
    fn test_classify_markers_regardless_of_status() {
        let m = manager();
        let captcha = m.classify(Some(&page(200, 0.1, "...CAPTCHA form...")));
        assert!(captcha.captcha_detected && captcha.slow_down);

        let waf = m.classify(Some(&page(503, 1.0, "Attention Required! | Cloudflare")));
        assert!(waf.waf_detected && waf.retry_needed);
    }

    #[test]
    fn test_classify_absent_response() {
        let m = manager();
        for response in [None, Some(&ResponseSnapshot::failed(Duration::ZERO))] {
            let feedback = m.classify(response);
            assert_eq!(
                feedback,
                Feedback {
                    slow_down: true,
                    retry_needed: true,
                    ..Feedback::default()
                }
            );
        }
    }

    #[test]
    fn test_stop_attempts_only_when_budget_spent() {
        let m = manager();
        let feedback = Feedback {
            retry_needed: true,
            ..Feedback::default()
        };
        let mut ctx = CrawlContext::new("http://a", "s", 3);
        ctx.attempts = 2;
        m.adjust(&feedback, &mut ctx);
        assert!(!ctx.stop_attempts);
        ctx.attempts = 3;
        m.adjust(&feedback, &mut ctx);
        assert!(ctx.stop_attempts);
    }

    #[test]
    fn test_counters_track_direction() {
        let m = manager();
        let mut ctx = CrawlContext::new("http://a", "s", 3);
        let slow = Feedback {
            slow_down: true,
            ..Feedback::default()
        };
        let fast = Feedback {
            speed_up: true,
            ..Feedback::default()
        };
        m.adjust(&slow, &mut ctx);
        m.adjust(&fast, &mut ctx);
        m.adjust(&fast, &mut ctx);
        assert_eq!(
            m.adjustments(),
            AdjustmentCounts {
                increased: 1,
                decreased: 2
            }
        );
    }
}
