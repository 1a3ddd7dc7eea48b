use serde::Serialize;

use crate::crawl_engine::crawl_types::Fingerprint;

/// Values the evasion scripts read from `window.__stealthConfig`.
///
/// Everything identity-related is derived from the session fingerprint so
/// the JavaScript surface never contradicts the CDP overrides.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StealthConfig {
    pub accept_language: String,
    pub platform: String,
    pub language: String,
    pub languages: Vec<String>,
    pub screen_width: u32,
    pub screen_height: u32,
    pub device_pixel_ratio: f64,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    pub hardware_concurrency: u32,
    pub session_seed: String,
}

impl StealthConfig {
    #[must_use]
    pub fn from_fingerprint(fingerprint: &Fingerprint, session_seed: String) -> Self {
        let language = fingerprint.locale.clone();
        let mut languages = vec![language.clone()];
        if let Some((base, _)) = language.split_once('-') {
            languages.push(base.to_string());
        }

        // Wider viewports get a beefier machine; keeps the pair plausible.
        let hardware_concurrency = if fingerprint.viewport.width >= 1600 { 8 } else { 4 };

        let (webgl_vendor, webgl_renderer) = match fingerprint.platform() {
            "MacIntel" | "iPad" => ("Apple Inc.", "Apple GPU"),
            _ => ("Intel Inc.", "Intel(R) UHD Graphics"),
        };

        Self {
            accept_language: fingerprint.accept_language(),
            platform: fingerprint.platform().to_string(),
            language,
            languages,
            screen_width: fingerprint.viewport.width,
            screen_height: fingerprint.viewport.height,
            device_pixel_ratio: fingerprint.device_scale_factor,
            webgl_vendor: webgl_vendor.to_string(),
            webgl_renderer: webgl_renderer.to_string(),
            hardware_concurrency,
            session_seed,
        }
    }

    /// Script that publishes this config before any evasion runs.
    pub fn to_script(&self) -> Result<String, serde_json::Error> {
        Ok(format!(
            "window.__stealthConfig = {};",
            serde_json::to_string(self)?
        ))
    }
}
