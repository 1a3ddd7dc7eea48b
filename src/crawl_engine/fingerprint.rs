//! Synthetic browser identity generation
//!
//! Pure functions over the fingerprint settings. Randomness comes from the
//! thread-local RNG and is never held across an await point.

use rand::Rng;
use rand::seq::IndexedRandom;

use super::crawl_types::{Fingerprint, Viewport};
use crate::config::{BrowserType, FingerprintSettings};
use crate::utils::{
    CHROME_USER_AGENT, CHROME_USER_AGENTS, FIREFOX_USER_AGENTS, SAFARI_USER_AGENTS,
    SCREEN_HEIGHT_RANGE, SCREEN_WIDTH_RANGE,
};

/// User agents a browser type may present.
#[must_use]
pub fn user_agent_pool(browser_type: BrowserType) -> &'static [&'static str] {
    match browser_type {
        BrowserType::Chromium => CHROME_USER_AGENTS,
        BrowserType::Firefox => FIREFOX_USER_AGENTS,
        BrowserType::Webkit => SAFARI_USER_AGENTS,
    }
}

fn all_user_agents() -> impl Iterator<Item = &'static str> {
    CHROME_USER_AGENTS
        .iter()
        .chain(FIREFOX_USER_AGENTS)
        .chain(SAFARI_USER_AGENTS)
        .copied()
}

fn random_viewport(rng: &mut impl Rng) -> Viewport {
    Viewport {
        width: rng.random_range(SCREEN_WIDTH_RANGE.0..=SCREEN_WIDTH_RANGE.1),
        height: rng.random_range(SCREEN_HEIGHT_RANGE.0..=SCREEN_HEIGHT_RANGE.1),
    }
}

#[derive(Debug, Clone)]
pub struct FingerprintManager {
    settings: FingerprintSettings,
}

impl FingerprintManager {
    #[must_use]
    pub fn new(settings: FingerprintSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &FingerprintSettings {
        &self.settings
    }

    /// Build a fingerprint from the configured settings.
    ///
    /// With `randomize` the user agent is drawn from every pool and the
    /// screen size from the randomized ranges; otherwise the configured
    /// screen size is used and the user agent is the configured one, or a
    /// pick from the pool for `browser_type`.
    #[must_use]
    pub fn generate(&self) -> Fingerprint {
        let mut rng = rand::rng();
        let settings = &self.settings;

        let (user_agent, viewport) = if settings.randomize {
            let agents: Vec<&str> = all_user_agents().collect();
            let ua = agents.choose(&mut rng).copied().unwrap_or(CHROME_USER_AGENT);
            (ua.to_string(), random_viewport(&mut rng))
        } else {
            let ua = settings.user_agent.clone().unwrap_or_else(|| {
                user_agent_pool(settings.browser_type)
                    .choose(&mut rng)
                    .copied()
                    .unwrap_or(CHROME_USER_AGENT)
                    .to_string()
            });
            let viewport = Viewport {
                width: settings.screen_width,
                height: settings.screen_height,
            };
            (ua, viewport)
        };

        Fingerprint {
            user_agent,
            viewport,
            locale: settings.locale.clone(),
            timezone_id: settings.timezone_id.clone(),
            device_scale_factor: settings.device_scale_factor,
            geolocation: settings.geolocation,
            browser_type: settings.browser_type,
        }
    }

    /// Derive a new identity that differs from `previous` in user agent and
    /// viewport. Locale, timezone, geolocation, scale and browser type carry
    /// over unchanged.
    ///
    /// The user agent stays within the pool for `previous.browser_type`; the
    /// other pools are only used when that pool has no alternative left.
    #[must_use]
    pub fn rotate(&self, previous: &Fingerprint) -> Fingerprint {
        let mut rng = rand::rng();

        let mut candidates: Vec<&str> = user_agent_pool(previous.browser_type)
            .iter()
            .copied()
            .filter(|ua| *ua != previous.user_agent)
            .collect();
        if candidates.is_empty() {
            candidates = all_user_agents()
                .filter(|ua| *ua != previous.user_agent)
                .collect();
        }
        let user_agent = candidates
            .choose(&mut rng)
            .copied()
            .unwrap_or(CHROME_USER_AGENT)
            .to_string();

        let mut viewport = random_viewport(&mut rng);
        while viewport == previous.viewport {
            viewport = random_viewport(&mut rng);
        }

        Fingerprint {
            user_agent,
            viewport,
            ..previous.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Geolocation;

    #[test]
    fn test_fixed_generation_uses_configured_values() {
        let manager = FingerprintManager::new(FingerprintSettings {
            user_agent: Some("custom-agent".into()),
            screen_width: 1366,
            screen_height: 768,
            locale: "de-DE".into(),
            ..FingerprintSettings::default()
        });
        let fp = manager.generate();
        assert_eq!(fp.user_agent, "custom-agent");
        assert_eq!(fp.viewport, Viewport { width: 1366, height: 768 });
        assert_eq!(fp.locale, "de-DE");
    }

    #[test]
    fn test_unset_user_agent_comes_from_browser_pool() {
        let manager = FingerprintManager::new(FingerprintSettings {
            browser_type: BrowserType::Firefox,
            ..FingerprintSettings::default()
        });
        let fp = manager.generate();
        assert!(FIREFOX_USER_AGENTS.contains(&fp.user_agent.as_str()));
    }

    #[test]
    fn test_randomized_viewport_within_bounds() {
        let manager = FingerprintManager::new(FingerprintSettings {
            randomize: true,
            ..FingerprintSettings::default()
        });
        for _ in 0..50 {
            let fp = manager.generate();
            assert!((1024..=1920).contains(&fp.viewport.width));
            assert!((768..=1080).contains(&fp.viewport.height));
        }
    }

    #[test]
    fn test_rotation_changes_identity_but_keeps_locale() {
        let manager = FingerprintManager::new(FingerprintSettings {
            timezone_id: "Asia/Shanghai".into(),
            geolocation: Geolocation {
                latitude: 31.2,
                longitude: 121.5,
            },
            ..FingerprintSettings::default()
        });
        let original = manager.generate();
        for _ in 0..20 {
            let rotated = manager.rotate(&original);
            assert_ne!(rotated.user_agent, original.user_agent);
            assert_ne!(rotated.viewport, original.viewport);
            assert_eq!(rotated.locale, original.locale);
            assert_eq!(rotated.timezone_id, original.timezone_id);
            assert_eq!(rotated.geolocation, original.geolocation);
        }
    }

    #[test]
    fn test_rotation_keeps_user_agent_family() {
        for browser_type in [BrowserType::Chromium, BrowserType::Firefox, BrowserType::Webkit] {
            let manager = FingerprintManager::new(FingerprintSettings {
                browser_type,
                ..FingerprintSettings::default()
            });
            let original = manager.generate();
            for _ in 0..20 {
                let rotated = manager.rotate(&original);
                assert!(user_agent_pool(browser_type).contains(&rotated.user_agent.as_str()));
                assert_ne!(rotated.user_agent, original.user_agent);
            }
        }
    }

    #[test]
    fn test_rotation_from_custom_agent_uses_browser_pool() {
        let manager = FingerprintManager::new(FingerprintSettings::default());
        let original = Fingerprint {
            user_agent: "custom-agent".into(),
            ..manager.generate()
        };
        let rotated = manager.rotate(&original);
        assert!(user_agent_pool(original.browser_type).contains(&rotated.user_agent.as_str()));
    }
}
