//! Defines the configuration settings for the funnel-scout application.

use crate::error::AppError;
use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command line overrides shared by every subcommand that runs the pipeline.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct ConfigOverrides {
    /// Path to configuration file (TOML format)
    #[arg(long, env = "FUNNEL_SCOUT_CONFIG")]
    pub config_file: Option<String>,

    /// Maximum number of pages checked simultaneously
    #[arg(short, long, env = "FUNNEL_SCOUT_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Maximum number of pages emitted by the link crawler
    #[arg(long, env = "FUNNEL_SCOUT_MAX_PAGES")]
    pub max_pages: Option<usize>,

    /// Maximum link depth followed by the crawler
    #[arg(long, env = "FUNNEL_SCOUT_MAX_DEPTH")]
    pub max_depth: Option<usize>,

    /// Delay imposed before each request to the target site (milliseconds)
    #[arg(long, env = "FUNNEL_SCOUT_DELAY_MS")]
    pub delay_ms: Option<u64>,

    /// Minimum score for a page to be classified as ad-like
    #[arg(long, env = "FUNNEL_SCOUT_THRESHOLD")]
    pub threshold: Option<u32>,

    /// Maximum number of link hops searched from a landing page
    #[arg(long, env = "FUNNEL_SCOUT_MAX_STEPS")]
    pub max_steps: Option<usize>,

    /// User agent string for HTTP requests
    #[arg(long, env = "FUNNEL_SCOUT_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Never launch a headless browser, even when plain fetching fails
    #[arg(long, default_value = "false", env = "FUNNEL_SCOUT_NO_BROWSER")]
    pub no_browser: bool,

    /// Path to a Chromium/Chrome executable for the rendering fallback
    #[arg(long, env = "FUNNEL_SCOUT_BROWSER_PATH")]
    pub browser_path: Option<PathBuf>,
}

/// TOML Configuration file structure
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    network: Option<NetworkConfig>,
    crawl: Option<CrawlConfig>,
    scoring: Option<ScoringConfig>,
    heuristics: Option<HeuristicsConfig>,
}

#[derive(Deserialize, Debug, Default)]
struct NetworkConfig {
    probe_timeout: Option<u64>,
    request_timeout: Option<u64>,
    render_timeout: Option<u64>,
    delay_ms: Option<u64>,
    user_agent: Option<String>,
    browser_fallback: Option<bool>,
    browser_path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
struct CrawlConfig {
    max_pages: Option<usize>,
    max_depth: Option<usize>,
    max_queue: Option<usize>,
    max_sitemaps: Option<usize>,
    max_candidates: Option<usize>,
    excluded_sample_limit: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
struct ScoringConfig {
    concurrency: Option<usize>,
    ad_threshold: Option<u32>,
    max_ad_pages: Option<usize>,
    max_funnel_steps: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
struct HeuristicsConfig {
    exclusion_keywords: Option<Vec<String>>,
    asset_extensions: Option<Vec<String>>,
    funnel_hints: Option<Vec<String>>,
    cta_phrases: Option<Vec<String>>,
    conversion_hints: Option<Vec<String>>,
    tracking_signatures: Option<Vec<String>>,
    button_class_tokens: Option<Vec<String>>,
    tracking_params: Option<Vec<String>>,
}

/// Token lists driving URL exclusion, page scoring and conversion detection.
///
/// All matching is case-insensitive; entries are stored lowercase.
#[derive(Debug, Clone)]
pub(crate) struct Heuristics {
    /// Path keywords marking content pages that are never ad landing pages.
    pub exclusion_keywords: Vec<String>,
    /// File extensions of static assets (without the dot).
    pub asset_extensions: Vec<String>,
    /// URL path tokens typical of campaign and offer pages.
    pub funnel_hints: Vec<String>,
    /// Visible-text phrases of call-to-action anchors and buttons.
    pub cta_phrases: Vec<String>,
    /// URL path tokens of conversion pages (checkout, thank-you, ...).
    pub conversion_hints: Vec<String>,
    /// Markup fragments left by advertising and analytics tags.
    pub tracking_signatures: Vec<String>,
    /// Class tokens that make an anchor look like a button.
    pub button_class_tokens: Vec<String>,
    /// Query keys removed during URL canonicalization.
    pub tracking_params: Vec<String>,
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn to_lowercase(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Default for Heuristics {
    fn default() -> Self {
        Heuristics {
            exclusion_keywords: to_strings(&[
                "blog", "news", "article", "faq", "help", "support", "privacy", "terms", "legal",
                "cookie", "career", "jobs", "press", "about", "contact", "login", "account",
                "author", "tag", "category", "feed", "wp-admin", "wp-json", "docs",
            ]),
            asset_extensions: to_strings(&[
                "jpg", "jpeg", "png", "gif", "svg", "webp", "ico", "bmp", "css", "js", "json",
                "xml", "txt", "pdf", "zip", "gz", "mp3", "mp4", "webm", "mov", "woff", "woff2",
                "ttf", "eot",
            ]),
            funnel_hints: to_strings(&[
                "offer", "promo", "deal", "landing", "campaign", "signup", "sign-up", "register",
                "trial", "demo", "pricing", "checkout", "buy", "get-started", "special",
                "discount", "coupon",
            ]),
            cta_phrases: to_strings(&[
                "buy now", "order now", "shop now", "add to cart", "checkout", "get started",
                "start now", "sign up", "start free", "free trial", "try free", "try it free",
                "get offer", "claim", "book a demo", "request a demo", "get a quote", "subscribe",
                "join now", "download now", "register now",
            ]),
            conversion_hints: to_strings(&[
                "checkout", "order", "pay", "cart", "thank", "success", "confirm", "complete",
            ]),
            tracking_signatures: to_strings(&[
                "googletagmanager.com",
                "google-analytics.com",
                "googleadservices.com",
                "doubleclick.net",
                "connect.facebook.net",
                "fbq(",
                "analytics.tiktok.com",
                "snap.licdn.com",
                "bat.bing.com",
                "static.hotjar.com",
                "clarity.ms",
                "sc-static.net",
                "ads-twitter.com",
            ]),
            button_class_tokens: to_strings(&["btn", "button", "cta"]),
            tracking_params: to_strings(&[
                "utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content", "utm_id",
                "gclid", "gbraid", "wbraid", "dclid", "fbclid", "msclkid", "yclid", "ttclid",
                "twclid", "li_fat_id", "mc_cid", "mc_eid", "_hsenc", "_hsmi", "igshid",
            ]),
        }
    }
}

/// Application configuration settings.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Timeout for HEAD/GET status probes.
    pub probe_timeout: Duration,
    /// Timeout for plain document GETs.
    pub request_timeout: Duration,
    /// Timeout for a full browser render of one page.
    pub render_timeout: Duration,
    /// Fixed delay imposed before each request to the target site.
    pub politeness_delay: Duration,
    /// User agent string presented on every request.
    pub user_agent: String,
    /// Whether a headless browser may be launched as a fetch fallback.
    pub browser_fallback: bool,
    /// Explicit browser executable; autodetected when unset.
    pub browser_path: Option<PathBuf>,
    /// Page-count budget of the link crawler.
    pub max_pages: usize,
    /// Depth budget of the link crawler.
    pub max_depth: usize,
    /// Pending-queue ceiling of the link crawler.
    pub max_queue: usize,
    /// Maximum number of sitemap documents fetched.
    pub max_sitemaps: usize,
    /// Maximum number of candidate URLs submitted to the check stage.
    pub max_candidates: usize,
    /// Number of excluded URLs kept for diagnostics.
    pub excluded_sample_limit: usize,
    /// Number of candidates checked simultaneously.
    pub concurrency: usize,
    /// Minimum score of an ad-like page.
    pub ad_threshold: u32,
    /// Maximum number of ad-like pages kept.
    pub max_ad_pages: usize,
    /// Maximum link hops from a landing page to its conversion page.
    pub max_funnel_steps: usize,
    /// Show a progress bar over the check stage.
    pub show_progress: bool,
    /// Token lists used by the URL policy, scorer and funnel builder.
    pub heuristics: Heuristics,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            probe_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(15),
            render_timeout: Duration::from_secs(20),
            politeness_delay: Duration::from_millis(150),
            user_agent: "Mozilla/5.0 (compatible; FunnelScout/0.1; +https://github.com/funnel-scout)".to_string(),
            browser_fallback: true,
            browser_path: None,
            max_pages: 350,
            max_depth: 4,
            max_queue: 5000,
            max_sitemaps: 20,
            max_candidates: 600,
            excluded_sample_limit: 25,
            concurrency: 4,
            ad_threshold: 18,
            max_ad_pages: 250,
            max_funnel_steps: 5,
            show_progress: false,
            heuristics: Heuristics::default(),
        }
    }
}

/// Load configuration from a TOML file
fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() {
        tracing::warn!("Configuration file {} not found, using defaults", file_path);
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::info!("Loaded configuration from {}", file_path);
    Ok(config)
}

fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    if let Some(network) = &file_config.network {
        if let Some(timeout) = network.probe_timeout {
            config.probe_timeout = Duration::from_secs(timeout);
        }
        if let Some(timeout) = network.request_timeout {
            config.request_timeout = Duration::from_secs(timeout);
        }
        if let Some(timeout) = network.render_timeout {
            config.render_timeout = Duration::from_secs(timeout);
        }
        if let Some(delay) = network.delay_ms {
            config.politeness_delay = Duration::from_millis(delay);
        }
        if let Some(user_agent) = &network.user_agent {
            config.user_agent = user_agent.clone();
        }
        if let Some(enabled) = network.browser_fallback {
            config.browser_fallback = enabled;
        }
        if let Some(path) = &network.browser_path {
            config.browser_path = Some(path.clone());
        }
    }

    if let Some(crawl) = &file_config.crawl {
        if let Some(pages) = crawl.max_pages {
            config.max_pages = pages;
        }
        if let Some(depth) = crawl.max_depth {
            config.max_depth = depth;
        }
        if let Some(queue) = crawl.max_queue {
            config.max_queue = queue;
        }
        if let Some(sitemaps) = crawl.max_sitemaps {
            config.max_sitemaps = sitemaps;
        }
        if let Some(candidates) = crawl.max_candidates {
            config.max_candidates = candidates;
        }
        if let Some(limit) = crawl.excluded_sample_limit {
            config.excluded_sample_limit = limit;
        }
    }

    if let Some(scoring) = &file_config.scoring {
        if let Some(concurrency) = scoring.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(threshold) = scoring.ad_threshold {
            config.ad_threshold = threshold;
        }
        if let Some(max_pages) = scoring.max_ad_pages {
            config.max_ad_pages = max_pages;
        }
        if let Some(steps) = scoring.max_funnel_steps {
            config.max_funnel_steps = steps;
        }
    }

    if let Some(heuristics) = &file_config.heuristics {
        let h = &mut config.heuristics;
        let lists: [(&Option<Vec<String>>, &mut Vec<String>); 8] = [
            (&heuristics.exclusion_keywords, &mut h.exclusion_keywords),
            (&heuristics.asset_extensions, &mut h.asset_extensions),
            (&heuristics.funnel_hints, &mut h.funnel_hints),
            (&heuristics.cta_phrases, &mut h.cta_phrases),
            (&heuristics.conversion_hints, &mut h.conversion_hints),
            (&heuristics.tracking_signatures, &mut h.tracking_signatures),
            (&heuristics.button_class_tokens, &mut h.button_class_tokens),
            (&heuristics.tracking_params, &mut h.tracking_params),
        ];
        for (source, target) in lists {
            if let Some(values) = source {
                *target = to_lowercase(values);
            }
        }
    }
}

/// Apply command line arguments to the Config instance
fn apply_cli_args(config: &mut Config, args: &ConfigOverrides) {
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }

    if let Some(pages) = args.max_pages {
        config.max_pages = pages;
    }

    if let Some(depth) = args.max_depth {
        config.max_depth = depth;
    }

    if let Some(delay) = args.delay_ms {
        config.politeness_delay = Duration::from_millis(delay);
    }

    if let Some(threshold) = args.threshold {
        config.ad_threshold = threshold;
    }

    if let Some(steps) = args.max_steps {
        config.max_funnel_steps = steps;
    }

    if let Some(ref agent) = args.user_agent {
        config.user_agent = agent.clone();
    }

    if args.no_browser {
        config.browser_fallback = false;
    }

    if let Some(ref path) = args.browser_path {
        config.browser_path = Some(path.clone());
    }
}

fn validate_config(config: &mut Config) {
    if config.concurrency == 0 {
        config.concurrency = 1;
        tracing::warn!("Concurrency was set to 0. Setting to 1.");
    }

    if config.max_pages == 0 {
        config.max_pages = 1;
        tracing::warn!("Page budget was set to 0. Setting to 1.");
    }

    if config.max_sitemaps == 0 {
        tracing::warn!("Sitemap budget is 0; sitemap discovery is disabled.");
    }

    if config.max_funnel_steps == 0 {
        config.max_funnel_steps = 1;
        tracing::warn!("Funnel step budget was set to 0. Setting to 1.");
    }

    if config.max_queue < config.max_pages {
        config.max_queue = config.max_pages;
        tracing::warn!(
            "Queue ceiling was below the page budget. Setting to {}",
            config.max_pages
        );
    }

    if config.user_agent.trim().is_empty() {
        config.user_agent = Config::default().user_agent;
        tracing::warn!("User agent was empty. Restoring the default.");
    }
}

/// Builds the run configuration: defaults, then the TOML file, then CLI overrides.
///
/// An explicitly named config file that cannot be read or parsed is an error.
pub(crate) fn build_config(args: &ConfigOverrides) -> anyhow::Result<Config> {
    let mut config = Config::default();

    if let Some(ref file_path) = args.config_file {
        let file_config = load_config_file(file_path).map_err(|e| {
            tracing::error!("Failed to load configuration file: {:#}", e);
            AppError::Config(format!("{:#}", e))
        })?;
        apply_file_config(&mut config, &file_config);
    } else {
        for path in ["./funnel-scout.toml", "./config.toml"].iter() {
            if Path::new(path).exists() {
                match load_config_file(path) {
                    Ok(file_config) => {
                        apply_file_config(&mut config, &file_config);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load configuration from {}: {}", path, e);
                    }
                }
            }
        }
    }

    apply_cli_args(&mut config, args);

    validate_config(&mut config);

    tracing::debug!("Final configuration: {:?}", config);

    Ok(config)
}
