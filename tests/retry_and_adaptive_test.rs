// Fetch retry budget, backoff bounds and adaptive delay bounds
mod common;

use common::{Counters, FakeSession, Scripted};
use news_crawler::config::{AdaptiveSettings, RetrySettings};
use news_crawler::crawl_engine::{
    AdaptiveManager, CrawlContext, Feedback, RequestManager, ResponseSnapshot, RetryPolicy,
    retry_jitter, should_retry,
};
use proptest::prelude::*;
use std::time::Duration;

fn manager(max_attempts: u32) -> RequestManager {
    let settings = RetrySettings {
        max_attempts,
        ..RetrySettings::default()
    };
    RequestManager::new(RetryPolicy::from(&settings), Duration::from_secs(60))
}

#[tokio::test(start_paused = true)]
async fn test_retryable_status_exhausts_exact_budget() {
    for status in [429u16, 503, 504, 404] {
        let session = FakeSession::serving(Scripted::new(
            status,
            "x".repeat(500),
            Duration::from_millis(10),
        ));
        let mut ctx = CrawlContext::new("http://a", "s", 3);

        let content = manager(3).send_request(&session, &mut ctx).await;

        assert!(content.is_none(), "status {status} should not yield content");
        assert_eq!(ctx.attempts, 3);
        assert_eq!(Counters::get(&session.counters.navigations), 3);
        assert_eq!(ctx.response.as_ref().map(|r| r.status), Some(status));
    }
}

#[tokio::test(start_paused = true)]
async fn test_short_or_captcha_body_is_retried() {
    for body in ["tiny".to_string(), format!("{} solve the CAPTCHA", "a".repeat(80))] {
        let session = FakeSession::serving(Scripted::new(200, body, Duration::ZERO));
        let mut ctx = CrawlContext::new("http://a", "s", 2);
        let requests = manager(2);
        assert!(requests.send_request(&session, &mut ctx).await.is_none());
        assert_eq!(ctx.attempts, 2);
        assert_eq!(requests.retry_stats().failure, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_good_page_returns_on_first_attempt() {
    let body = "a".repeat(200);
    let session = FakeSession::serving(Scripted::new(200, body.clone(), Duration::ZERO));
    let mut ctx = CrawlContext::new("http://a", "s", 3);
    let requests = manager(3);

    assert_eq!(requests.send_request(&session, &mut ctx).await, Some(body));
    assert_eq!(ctx.attempts, 1);
    assert_eq!(requests.retry_stats().success, 1);
}

#[tokio::test(start_paused = true)]
async fn test_hung_navigation_counts_as_failed_attempt() {
    let session = FakeSession::serving(Scripted::new(200, "a".repeat(200), Duration::from_secs(600)));
    let mut ctx = CrawlContext::new("http://slow", "s", 2);
    let settings = RetrySettings {
        max_attempts: 2,
        ..RetrySettings::default()
    };
    let requests = RequestManager::new(RetryPolicy::from(&settings), Duration::from_secs(1));

    assert!(requests.send_request(&session, &mut ctx).await.is_none());
    assert_eq!(ctx.attempts, 2);
    assert!(ctx.response.as_ref().is_some_and(ResponseSnapshot::is_empty));
}

#[test]
fn test_should_retry_rules() {
    let long = "a".repeat(100);
    assert!(should_retry(&ResponseSnapshot::new(long.clone(), 429, Duration::ZERO)));
    assert!(should_retry(&ResponseSnapshot::new(long.clone(), 500, Duration::ZERO)));
    assert!(should_retry(&ResponseSnapshot::new("short", 200, Duration::ZERO)));
    assert!(!should_retry(&ResponseSnapshot::new(long, 200, Duration::ZERO)));
}

#[test]
fn test_classify_signals() {
    let adaptive = AdaptiveManager::new(AdaptiveSettings::default());
    let body = "a".repeat(200);

    let throttled = adaptive.classify(Some(&ResponseSnapshot::new(body.clone(), 429, Duration::ZERO)));
    assert!(throttled.slow_down && throttled.retry_needed);

    let forbidden = adaptive.classify(Some(&ResponseSnapshot::new(body.clone(), 403, Duration::ZERO)));
    assert!(forbidden.waf_detected && forbidden.retry_needed);

    let fast = adaptive.classify(Some(&ResponseSnapshot::new(
        body,
        200,
        Duration::from_millis(100),
    )));
    assert!(fast.speed_up);

    let captcha = adaptive.classify(Some(&ResponseSnapshot::new(
        "...CAPTCHA form...",
        200,
        Duration::from_millis(100),
    )));
    assert!(captcha.captcha_detected && captcha.slow_down);
}

#[test]
fn test_exhausted_retry_sets_stop_attempts() {
    let adaptive = AdaptiveManager::new(AdaptiveSettings::default());
    let feedback = Feedback {
        retry_needed: true,
        ..Feedback::default()
    };
    let mut ctx = CrawlContext::new("http://a", "s", 3);
    ctx.attempts = 2;
    adaptive.adjust(&feedback, &mut ctx);
    assert!(!ctx.stop_attempts);
    ctx.attempts = 3;
    adaptive.adjust(&feedback, &mut ctx);
    assert!(ctx.stop_attempts);
}

proptest! {
    #[test]
    fn prop_backoff_matches_formula(
        base in 0.1f64..5.0,
        factor in 1.0f64..4.0,
        cap in 1.0f64..60.0,
        attempt in 1u32..20,
    ) {
        let policy = RetryPolicy::from(&RetrySettings {
            max_attempts: 3,
            base_delay: base,
            max_delay: cap,
            backoff_factor: factor,
        });
        let expected = (base * factor.powi(attempt as i32 - 1)).min(cap);
        let actual = policy.backoff_delay(attempt).as_secs_f64();
        prop_assert!((actual - expected).abs() < 1e-6, "attempt {attempt}: {actual} vs {expected}");
        prop_assert!(actual <= cap + 1e-9);
    }

    #[test]
    fn prop_jitter_within_half_second(_round in 0u8..50) {
        let jitter = retry_jitter();
        prop_assert!(jitter <= Duration::from_millis(500));
    }

    #[test]
    fn prop_adaptive_delay_stays_within_bounds(
        min_delay in 0.1f64..3.0,
        span in 0.0f64..10.0,
        jitter in 0.0f64..2.0,
        signals in proptest::collection::vec(0u8..3, 1..40),
    ) {
        let settings = AdaptiveSettings {
            min_delay,
            max_delay: min_delay + span,
            random_jitter: jitter,
            ..AdaptiveSettings::default()
        };
        let adaptive = AdaptiveManager::new(settings.clone());
        let mut ctx = CrawlContext::new("http://a", "s", 3);

        for signal in signals {
            let feedback = Feedback {
                slow_down: signal == 0,
                speed_up: signal == 1,
                ..Feedback::default()
            };
            let step = adaptive.adjust(&feedback, &mut ctx);

            prop_assert!(step.applied >= settings.min_delay - 1e-9);
            prop_assert!(step.applied <= settings.max_delay + 1e-9);
            if feedback.slow_down {
                prop_assert!(
                    step.target >= step.previous * 1.5 - 1e-9
                        || (step.target - settings.max_delay).abs() < 1e-9
                );
            }
            if feedback.speed_up {
                prop_assert!(
                    step.target <= step.previous * 0.8 + 1e-9
                        || (step.target - settings.min_delay).abs() < 1e-9
                );
            }
        }
    }
}
