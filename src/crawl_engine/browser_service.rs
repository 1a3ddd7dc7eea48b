//! Session and identity facade
//!
//! Owns the crawler's current fingerprint, decides when a response calls
//! for a new identity, swaps sessions on rotation, and passes rate limiting
//! through to the shared throttle.

use log::{info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::crawl_types::{Fingerprint, ResponseSnapshot};
use super::fingerprint::FingerprintManager;
use super::throttle::{ThrottleManager, ThrottlePermit};
use crate::browser::{BrowserEngine, BrowsingSession};
use crate::error::CrawlResult;
use crate::utils::{MIN_CONTENT_LENGTH, contains_marker};

async fn close_quietly<S: BrowsingSession>(session: S) {
    if let Err(e) = session.close().await {
        warn!("Failed to close replaced session: {e}");
    }
}

#[derive(Debug)]
pub struct BrowserService {
    fingerprints: FingerprintManager,
    throttle: Arc<ThrottleManager>,
    current: Mutex<Option<Fingerprint>>,
}

impl BrowserService {
    #[must_use]
    pub fn new(fingerprints: FingerprintManager, throttle: Arc<ThrottleManager>) -> Self {
        Self {
            fingerprints,
            throttle,
            current: Mutex::new(None),
        }
    }

    /// Generate a fresh fingerprint and make it current.
    pub fn generate_fingerprint(&self) -> Fingerprint {
        let fingerprint = self.fingerprints.generate();
        *self.current.lock() = Some(fingerprint.clone());
        fingerprint
    }

    #[must_use]
    pub fn current_fingerprint(&self) -> Option<Fingerprint> {
        self.current.lock().clone()
    }

    /// The current fingerprint, generating one on first use.
    pub fn session_fingerprint(&self) -> Fingerprint {
        let mut current = self.current.lock();
        match current.as_ref() {
            Some(fingerprint) => fingerprint.clone(),
            None => {
                let fingerprint = self.fingerprints.generate();
                *current = Some(fingerprint.clone());
                fingerprint
            }
        }
    }

    /// Replace the current fingerprint with one derived from it.
    pub fn rotate_fingerprint(&self, reason: &str) -> Fingerprint {
        let mut current = self.current.lock();
        let next = match current.as_ref() {
            Some(previous) => self.fingerprints.rotate(previous),
            None => self.fingerprints.generate(),
        };
        *current = Some(next.clone());
        info!(
            "Rotating fingerprint ({reason}): {} {}x{}",
            next.user_agent, next.viewport.width, next.viewport.height
        );
        next
    }

    /// True when a response suggests the current identity is burned.
    #[must_use]
    pub fn should_rotate(response: Option<&ResponseSnapshot>) -> bool {
        let Some(response) = response else {
            return true;
        };
        response.status >= 400
            || contains_marker(&response.content, "captcha")
            || response.content.chars().count() < MIN_CONTENT_LENGTH
    }

    /// Open a session under `fingerprint` into `slot`, then harden it.
    ///
    /// The session is stored before stealth runs, so a caller cancelled at
    /// any await point still finds it in `slot` for cleanup. Stealth
    /// failures are logged; the session stays usable.
    async fn open_into<'s, E: BrowserEngine>(
        &self,
        engine: &E,
        fingerprint: &Fingerprint,
        slot: &'s mut Option<E::Session>,
    ) -> CrawlResult<&'s E::Session> {
        let session = slot.insert(engine.open_session(fingerprint).await?);
        if let Err(e) = session.apply_stealth(fingerprint).await {
            warn!("Stealth injection failed: {e}");
        }
        Ok(&*session)
    }

    /// Open a session under the current fingerprint into an empty `slot`.
    pub async fn open_session<'s, E: BrowserEngine>(
        &self,
        engine: &E,
        slot: &'s mut Option<E::Session>,
    ) -> CrawlResult<&'s E::Session> {
        let fingerprint = self.session_fingerprint();
        if let Some(stale) = slot.take() {
            close_quietly(stale).await;
        }
        self.open_into(engine, &fingerprint, slot).await
    }

    /// Close the session in `slot` and reopen it under a rotated fingerprint.
    ///
    /// `slot` is left empty if the new session cannot be opened.
    pub async fn rotate<E: BrowserEngine>(
        &self,
        engine: &E,
        slot: &mut Option<E::Session>,
        reason: &str,
    ) -> CrawlResult<()> {
        if let Some(old) = slot.take() {
            close_quietly(old).await;
        }
        let fingerprint = self.rotate_fingerprint(reason);
        self.open_into(engine, &fingerprint, slot).await?;
        Ok(())
    }

    /// Rotate the session in `slot` if `response` calls for it. Returns
    /// whether a rotation happened.
    pub async fn process_page<E: BrowserEngine>(
        &self,
        engine: &E,
        slot: &mut Option<E::Session>,
        response: Option<&ResponseSnapshot>,
    ) -> CrawlResult<bool> {
        if Self::should_rotate(response) {
            self.rotate(engine, slot, "response_analysis").await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Wait for a throttle slot.
    pub async fn limit_rate(&self) -> ThrottlePermit {
        self.throttle.acquire().await
    }

    pub fn update_throttle_rate(&self, rate: Duration) {
        self.throttle.set_rate(rate);
    }

    #[must_use]
    pub fn throttle(&self) -> &Arc<ThrottleManager> {
        &self.throttle
    }

    #[must_use]
    pub fn fingerprints(&self) -> &FingerprintManager {
        &self.fingerprints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_rotate_rules() {
        let long = "a".repeat(150);
        assert!(BrowserService::should_rotate(None));
        assert!(BrowserService::should_rotate(Some(&ResponseSnapshot::new(
            long.clone(),
            403,
            Duration::ZERO
        ))));
        assert!(BrowserService::should_rotate(Some(&ResponseSnapshot::new(
            "tiny",
            200,
            Duration::ZERO
        ))));
        assert!(BrowserService::should_rotate(Some(&ResponseSnapshot::new(
            format!("{long} captcha"),
            200,
            Duration::ZERO
        ))));
        assert!(!BrowserService::should_rotate(Some(&ResponseSnapshot::new(
            long,
            200,
            Duration::ZERO
        ))));
    }

    #[test]
    fn test_generate_sets_current() {
        let service = BrowserService::new(
            FingerprintManager::new(crate::config::FingerprintSettings::default()),
            Arc::new(ThrottleManager::new(Duration::from_secs(1), 1)),
        );
        assert!(service.current_fingerprint().is_none());
        let fp = service.generate_fingerprint();
        assert_eq!(service.current_fingerprint(), Some(fp));
    }

    #[test]
    fn test_sessions_reuse_current_until_rotation() {
        let service = BrowserService::new(
            FingerprintManager::new(crate::config::FingerprintSettings::default()),
            Arc::new(ThrottleManager::new(Duration::from_secs(1), 1)),
        );
        let first = service.session_fingerprint();
        assert_eq!(service.session_fingerprint(), first);

        let rotated = service.rotate_fingerprint("test");
        assert_ne!(rotated.user_agent, first.user_agent);
        assert_eq!(service.session_fingerprint(), rotated);
    }
}
