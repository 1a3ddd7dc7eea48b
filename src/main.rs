// News crawler command line entry point.
//
// Loads the JSON config, applies command-line overrides, seeds the URL queue
// from the input directory and runs the crawler until the queue drains or
// Ctrl-C is pressed.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use news_crawler::config::{BrowserType, CrawlerConfig};
use news_crawler::{
    ChromiumLauncher, Collaborators, ContentAnalyzer, FileUrlSource, JsonlDataSaver, NewsCrawler,
    NoopAnalyzer, OllamaAnalyzer, OutcomeSink, url_queue,
};

#[derive(Debug, Parser)]
#[command(
    name = "news-crawler",
    version,
    about = "Adaptive news crawler with fingerprint rotation and anti-bot countermeasures"
)]
struct Cli {
    /// JSON config file
    #[arg(long, value_name = "FILE", env = "NEWS_CRAWLER_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    queue_size: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,

    /// Minimum spacing between request admissions, seconds
    #[arg(long)]
    min_rate: Option<f64>,
    #[arg(long)]
    max_concurrent: Option<usize>,

    #[arg(long)]
    browser_type: Option<BrowserType>,
    #[arg(long)]
    user_agent: Option<String>,
    /// Randomize user agent and screen size per fingerprint
    #[arg(long)]
    randomize: bool,
    #[arg(long)]
    screen_width: Option<u32>,
    #[arg(long)]
    screen_height: Option<u32>,
    #[arg(long)]
    locale: Option<String>,
    #[arg(long)]
    timezone_id: Option<String>,
    #[arg(long)]
    device_scale_factor: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    latitude: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    longitude: Option<f64>,

    #[arg(long)]
    min_delay: Option<f64>,
    #[arg(long)]
    max_delay: Option<f64>,
    #[arg(long)]
    adjust_threshold_slow: Option<f64>,
    #[arg(long)]
    adjust_threshold_fast: Option<f64>,
    #[arg(long)]
    random_jitter: Option<f64>,

    /// Directory with `.txt` / `.csv` URL seed files
    #[arg(long, value_name = "DIR")]
    input_dir: Option<PathBuf>,
    /// Output path prefix for `.jsonl` result files
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    #[arg(long, value_name = "URL", env = "OLLAMA_ENDPOINT")]
    ollama_endpoint: Option<String>,
    #[arg(long)]
    ollama_model: Option<String>,
    #[arg(long, value_name = "FILE")]
    prompt_file: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,
    /// Skip scrolling and reading pauses after each fetch
    #[arg(long)]
    no_behavior: bool,
    /// Deadline for a whole per-URL task, seconds
    #[arg(long)]
    task_timeout: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<CrawlerConfig> {
        let mut config = match &self.config {
            Some(path) => CrawlerConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => CrawlerConfig::default(),
        };

        if let Some(queue_size) = self.queue_size {
            config.set_queue_size(queue_size);
        }
        if let Some(batch_size) = self.batch_size {
            config.set_batch_size(batch_size);
        }
        if self.task_timeout.is_some() {
            config.set_task_timeout_secs(self.task_timeout);
        }

        let throttle = config.throttle_mut();
        if let Some(min_rate) = self.min_rate {
            throttle.min_rate = min_rate;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            throttle.max_concurrent = max_concurrent;
        }

        let fingerprint = config.fingerprint_mut();
        if let Some(browser_type) = self.browser_type {
            fingerprint.browser_type = browser_type;
        }
        if self.user_agent.is_some() {
            fingerprint.user_agent = self.user_agent;
        }
        fingerprint.randomize |= self.randomize;
        if let Some(width) = self.screen_width {
            fingerprint.screen_width = width;
        }
        if let Some(height) = self.screen_height {
            fingerprint.screen_height = height;
        }
        if let Some(locale) = self.locale {
            fingerprint.locale = locale;
        }
        if let Some(timezone_id) = self.timezone_id {
            fingerprint.timezone_id = timezone_id;
        }
        if let Some(scale) = self.device_scale_factor {
            fingerprint.device_scale_factor = scale;
        }
        if let Some(latitude) = self.latitude {
            fingerprint.geolocation.latitude = latitude;
        }
        if let Some(longitude) = self.longitude {
            fingerprint.geolocation.longitude = longitude;
        }

        let adaptive = config.adaptive_mut();
        if let Some(v) = self.min_delay {
            adaptive.min_delay = v;
        }
        if let Some(v) = self.max_delay {
            adaptive.max_delay = v;
        }
        if let Some(v) = self.adjust_threshold_slow {
            adaptive.adjust_threshold_slow = v;
        }
        if let Some(v) = self.adjust_threshold_fast {
            adaptive.adjust_threshold_fast = v;
        }
        if let Some(v) = self.random_jitter {
            adaptive.random_jitter = v;
        }

        if let Some(dir) = self.input_dir {
            config.collector_mut().input_dir = Some(dir);
        }
        if let Some(output) = self.output {
            config.data_saver_mut().base_filename = output;
        }

        let analyzer = config.analyzer_mut();
        if self.ollama_endpoint.is_some() {
            analyzer.ollama_endpoint = self.ollama_endpoint;
        }
        if let Some(model) = self.ollama_model {
            analyzer.model = model;
        }
        if self.prompt_file.is_some() {
            analyzer.prompt_file = self.prompt_file;
        }

        let browser = config.browser_mut();
        if self.headed {
            browser.headless = false;
        }
        if self.no_behavior {
            browser.simulate_behavior = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config()?;

    let (queue, receiver) = url_queue(config.queue_size());
    let seeder = match config.collector().input_dir.clone() {
        Some(dir) => {
            let source = FileUrlSource::new(dir);
            Some(tokio::spawn(async move {
                match source.seed(&queue).await {
                    Ok(count) => info!("Seeded {count} URLs from {}", source.input_dir().display()),
                    Err(e) => error!("URL seeding failed: {e}"),
                }
            }))
        }
        None => {
            warn!("No input directory configured, nothing to crawl");
            drop(queue);
            None
        }
    };

    let analyzer: Arc<dyn ContentAnalyzer> = match &config.analyzer().ollama_endpoint {
        Some(endpoint) => Arc::new(OllamaAnalyzer::new(endpoint.clone(), config.analyzer())?),
        None => {
            info!("No Ollama endpoint configured, articles get neutral labels");
            Arc::new(NoopAnalyzer)
        }
    };
    let sink: Arc<dyn OutcomeSink> = Arc::new(JsonlDataSaver::new(config.data_saver()));
    let collaborators = Collaborators::new(Arc::clone(&sink)).with_analyzer(analyzer);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let launcher = ChromiumLauncher::new(config.headless());
    let mut crawler =
        NewsCrawler::new(config, launcher, receiver, collaborators).with_shutdown(shutdown_rx);
    let result = crawler.run().await;

    if let Some(seeder) = seeder {
        seeder.abort();
    }
    sink.flush().await.context("Failed to flush outcomes")?;

    let stats = result?;
    info!(
        "Done: {} succeeded, {} failed, {} rotations",
        stats.succeeded, stats.failed, stats.rotations
    );
    Ok(())
}
