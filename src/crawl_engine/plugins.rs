//! Countermeasure plugins
//!
//! Plugins inspect a finished fetch and answer with [`PluginHints`]. The
//! manager runs every registered plugin concurrently against a shared view
//! of the context, merges their hints into it, and enforces any suggested
//! delay itself before returning.

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use log::{error, info, warn};
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread;

use super::crawl_types::{CrawlContext, PluginHints};
use crate::error::CrawlResult;
use crate::utils::{ANTI_BOT_SUGGESTED_DELAY_SECS, contains_marker, secs_to_duration};

/// A detector that reacts to defenses seen in the last response.
pub trait CountermeasurePlugin: Send + Sync {
    fn name(&self) -> &str;

    fn execute<'a>(&'a self, ctx: &'a CrawlContext) -> BoxFuture<'a, CrawlResult<PluginHints>>;
}

#[derive(Default)]
pub struct PluginManager {
    plugins: RwLock<Vec<Arc<dyn CountermeasurePlugin>>>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.registered_plugins())
            .finish()
    }
}

fn same_plugin(a: &Arc<dyn CountermeasurePlugin>, b: &Arc<dyn CountermeasurePlugin>) -> bool {
    // Compare data pointers only; vtable pointers are not unique
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

impl PluginManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin instance. Registering the same instance again is a
    /// no-op and returns `false`.
    pub fn register(&self, plugin: Arc<dyn CountermeasurePlugin>) -> bool {
        let mut plugins = self.plugins.write();
        if plugins.iter().any(|existing| same_plugin(existing, &plugin)) {
            warn!("Plugin {} already registered, ignoring", plugin.name());
            return false;
        }
        info!("Registered plugin {}", plugin.name());
        plugins.push(plugin);
        true
    }

    #[must_use]
    pub fn registered_plugins(&self) -> Vec<String> {
        self.plugins
            .read()
            .iter()
            .map(|plugin| plugin.name().to_string())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }

    /// Run every plugin concurrently and fold their hints into `ctx`.
    ///
    /// A plugin that errors or panics is logged and skipped. If the merged
    /// hints carry a suggested delay, this call sleeps for it before
    /// returning.
    pub async fn run_all(&self, ctx: &mut CrawlContext) -> PluginHints {
        let plugins: Vec<Arc<dyn CountermeasurePlugin>> = self.plugins.read().clone();
        if plugins.is_empty() {
            return PluginHints::default();
        }

        let view: &CrawlContext = ctx;
        let runs: Vec<BoxFuture<'_, (String, thread::Result<CrawlResult<PluginHints>>)>> = plugins
            .iter()
            .map(|plugin| {
                let name = plugin.name().to_string();
                let execution = AssertUnwindSafe(plugin.execute(view)).catch_unwind();
                async move { (name, execution.await) }.boxed()
            })
            .collect();
        let results = join_all(runs).await;

        let mut hints = PluginHints::default();
        for (name, outcome) in results {
            match outcome {
                Ok(Ok(plugin_hints)) => hints = hints.merge(plugin_hints),
                Ok(Err(e)) => error!("Plugin {name} failed for {}: {e}", view.url),
                Err(_) => error!("Plugin {name} panicked for {}", view.url),
            }
        }

        ctx.apply_hints(hints);

        if let Some(delay) = hints.suggested_delay {
            info!(
                "Plugins suggested a {:.2}s delay for {}",
                delay.as_secs_f64(),
                ctx.url
            );
            tokio::time::sleep(delay).await;
        }

        hints
    }
}

/// Flags Cloudflare challenges and CAPTCHA walls.
#[derive(Debug, Default, Clone, Copy)]
pub struct AntiBotPlugin;

impl CountermeasurePlugin for AntiBotPlugin {
    fn name(&self) -> &str {
        "AntiBotPlugin"
    }

    fn execute<'a>(&'a self, ctx: &'a CrawlContext) -> BoxFuture<'a, CrawlResult<PluginHints>> {
        Box::pin(async move {
            let Some(response) = ctx.response.as_ref() else {
                return Ok(PluginHints::default());
            };
            let content = response.content.to_lowercase();
            if content.contains("cloudflare") || contains_marker(&content, "captcha") {
                info!("Anti-bot defenses detected on {}", ctx.url);
                return Ok(PluginHints {
                    adjust_fingerprint: true,
                    suggested_delay: Some(secs_to_duration(ANTI_BOT_SUGGESTED_DELAY_SECS)),
                });
            }
            Ok(PluginHints::default())
        })
    }
}
