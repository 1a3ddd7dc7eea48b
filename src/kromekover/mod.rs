use chromiumoxide::{Page, cdp};
use futures::future::join_all;
use tracing::{debug, warn};

pub mod config;
pub use config::StealthConfig;

use crate::crawl_engine::crawl_types::Fingerprint;
use crate::error::{CrawlError, CrawlResult};

// Order matters: every evasion reads window.__stealthConfig
const EVASION_SCRIPTS: &[(&str, &str)] = &[
    (
        "navigator_webdriver",
        r"Object.defineProperty(Navigator.prototype, 'webdriver', { get: () => undefined });",
    ),
    (
        "cdp_evasion",
        r"for (const key of Object.keys(window)) {
            if (/^cdc_|^\$cdc_/.test(key)) { try { delete window[key]; } catch (e) {} }
        }",
    ),
    (
        "navigator_language",
        r"(() => {
            const c = window.__stealthConfig;
            Object.defineProperty(Navigator.prototype, 'language', { get: () => c.language });
            Object.defineProperty(Navigator.prototype, 'languages', { get: () => Object.freeze([...c.languages]) });
            Object.defineProperty(Navigator.prototype, 'platform', { get: () => c.platform });
        })();",
    ),
    (
        "navigator_vendor",
        r"Object.defineProperty(Navigator.prototype, 'vendor', {
            get: () => window.__stealthConfig.platform === 'MacIntel' ? 'Apple Computer, Inc.' : 'Google Inc.'
        });",
    ),
    (
        "hardware_concurrency",
        r"Object.defineProperty(Navigator.prototype, 'hardwareConcurrency', {
            get: () => window.__stealthConfig.hardwareConcurrency
        });",
    ),
    (
        "navigator_plugins",
        r"(() => {
            const names = ['PDF Viewer', 'Chrome PDF Viewer', 'Chromium PDF Viewer'];
            const plugins = names.map(name => ({ name, filename: 'internal-pdf-viewer', description: 'Portable Document Format' }));
            Object.defineProperty(Navigator.prototype, 'plugins', {
                get: () => Object.assign(Object.create(PluginArray.prototype), plugins, { length: plugins.length })
            });
        })();",
    ),
    (
        "navigator_permissions",
        r"(() => {
            if (!navigator.permissions) return;
            const query = navigator.permissions.query.bind(navigator.permissions);
            navigator.permissions.query = (params) => params && params.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission, onchange: null })
                : query(params);
        })();",
    ),
    (
        "screen_metrics",
        r"(() => {
            const c = window.__stealthConfig;
            Object.defineProperty(Screen.prototype, 'width', { get: () => c.screenWidth });
            Object.defineProperty(Screen.prototype, 'height', { get: () => c.screenHeight });
            Object.defineProperty(Screen.prototype, 'availWidth', { get: () => c.screenWidth });
            Object.defineProperty(Screen.prototype, 'availHeight', { get: () => c.screenHeight - 40 });
            Object.defineProperty(window, 'devicePixelRatio', { get: () => c.devicePixelRatio });
        })();",
    ),
    (
        "webgl_vendor_override",
        r"(() => {
            const c = window.__stealthConfig;
            const patch = (proto) => {
                if (!proto) return;
                const original = proto.getParameter;
                proto.getParameter = function (param) {
                    if (param === 37445) return c.webglVendor;
                    if (param === 37446) return c.webglRenderer;
                    return original.call(this, param);
                };
            };
            patch(window.WebGLRenderingContext && WebGLRenderingContext.prototype);
            patch(window.WebGL2RenderingContext && WebGL2RenderingContext.prototype);
        })();",
    ),
    (
        "canvas_noise",
        r"(() => {
            const seed = window.__stealthConfig.sessionSeed;
            let state = parseInt(seed.slice(0, 8), 16) || 1;
            const next = () => { state ^= state << 13; state ^= state >>> 17; state ^= state << 5; return state & 1; };
            const toDataURL = HTMLCanvasElement.prototype.toDataURL;
            HTMLCanvasElement.prototype.toDataURL = function (...args) {
                const ctx = this.getContext('2d');
                if (ctx && this.width > 0 && this.height > 0) {
                    const image = ctx.getImageData(0, 0, 1, 1);
                    image.data[0] = image.data[0] ^ next();
                    ctx.putImageData(image, 0, 0);
                }
                return toDataURL.apply(this, args);
            };
        })();",
    ),
    (
        "chrome_runtime",
        r"(() => {
            if (!window.chrome) window.chrome = {};
            if (!window.chrome.runtime) {
                window.chrome.runtime = {
                    connect: () => ({ onMessage: { addListener() {}, removeListener() {} }, postMessage() {} }),
                    sendMessage: () => {}
                };
            }
        })();",
    ),
];

async fn add_script(page: &Page, source: String) -> CrawlResult<()> {
    page.execute(
        cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams {
            source,
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        },
    )
    .await
    .map(|_| ())
    .map_err(|e| CrawlError::Browser(e.to_string()))
}

/// Install the evasion scripts for every document the page loads, then
/// align the network-level user agent and platform with `fingerprint`.
///
/// Individual script failures are tolerated; the call fails only if no
/// evasion could be installed at all.
pub async fn inject(page: &Page, fingerprint: &Fingerprint) -> CrawlResult<()> {
    let session_seed = hex::encode(rand::random::<[u8; 16]>());
    let config = StealthConfig::from_fingerprint(fingerprint, session_seed);

    debug!("Injecting stealth config for {}", fingerprint.user_agent);
    let config_script = config
        .to_script()
        .map_err(|e| CrawlError::Browser(format!("stealth config: {e}")))?;
    add_script(page, config_script).await?;

    let results = join_all(EVASION_SCRIPTS.iter().map(|(name, source)| async move {
        (*name, add_script(page, (*source).to_string()).await)
    }))
    .await;

    let mut injected = 0usize;
    for (name, result) in results {
        match result {
            Ok(()) => injected += 1,
            Err(e) => warn!("Failed to inject {name}: {e}"),
        }
    }
    if injected == 0 {
        return Err(CrawlError::Browser(
            "failed to inject any stealth scripts".to_string(),
        ));
    }

    page.execute(cdp::browser_protocol::network::SetUserAgentOverrideParams {
        user_agent: fingerprint.user_agent.replace("Headless", ""),
        accept_language: Some(config.accept_language.clone()),
        platform: Some(config.platform.clone()),
        user_agent_metadata: None,
    })
    .await
    .map_err(|e| CrawlError::Browser(e.to_string()))?;

    debug!("Stealth injection complete: {injected}/{} scripts active", EVASION_SCRIPTS.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrowserType, Geolocation};
    use crate::crawl_engine::crawl_types::Viewport;

    #[test]
    fn test_config_follows_fingerprint() {
        let fingerprint = Fingerprint {
            user_agent: crate::utils::SAFARI_USER_AGENTS[0].to_string(),
            viewport: Viewport { width: 1440, height: 900 },
            locale: "fr-FR".to_string(),
            timezone_id: "Europe/Paris".to_string(),
            device_scale_factor: 2.0,
            geolocation: Geolocation::default(),
            browser_type: BrowserType::Webkit,
        };
        let config = StealthConfig::from_fingerprint(&fingerprint, "00ff".to_string());
        assert_eq!(config.platform, "MacIntel");
        assert_eq!(config.languages, vec!["fr-FR".to_string(), "fr".to_string()]);
        assert_eq!(config.screen_width, 1440);
        assert_eq!(config.webgl_vendor, "Apple Inc.");

        let script = config.to_script().expect("serializable");
        assert!(script.starts_with("window.__stealthConfig = {"));
        assert!(script.contains("\"screenWidth\":1440"));
        assert!(script.contains("\"sessionSeed\":\"00ff\""));
    }

    #[test]
    fn test_scripts_are_named_uniquely() {
        let mut names: Vec<&str> = EVASION_SCRIPTS.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EVASION_SCRIPTS.len());
    }
}
