//! Core pipeline: discovery, classification and funnel reconstruction for one site.

use crate::config::Config;
use crate::crawler::{CrawlLimits, crawl};
use crate::error::Result;
use crate::fetcher::{DocumentSource, Fetcher, build_http_client};
use crate::funnel::build_funnels;
use crate::models::{PageFinding, PagePreview, RobotsRules, RunResult};
use crate::renderer::{ChromiumFactory, RenderHandle};
use crate::report::format_report;
use crate::robots::{fetch_robots, is_allowed};
use crate::scorer::score_page;
use crate::sitemap::discover;
use crate::url_policy::{canonicalize, is_excluded, normalize, same_origin};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{OnceCell, Semaphore};
use tokio::time::sleep;
use url::Url;

/// Documents keyed by canonical URL.
///
/// Concurrent requests for the same URL share a single fetch. Failed fetches
/// (empty documents) are not stored, so the next caller tries again.
#[derive(Default)]
pub(crate) struct DocumentCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl DocumentCache {
    pub(crate) async fn get_or_fetch(&self, source: &dyn DocumentSource, url: &Url) -> String {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(entries.entry(url.to_string()).or_default())
        };
        let fetched = cell
            .get_or_try_init(move || async move {
                let html = source.fetch_document(url).await;
                if html.is_empty() { Err(()) } else { Ok(html) }
            })
            .await;
        fetched.cloned().unwrap_or_default()
    }
}

/// Fetcher view that reads through the run's document cache.
struct CachedSource<'a> {
    fetcher: &'a Fetcher,
    cache: &'a DocumentCache,
}

#[async_trait]
impl DocumentSource for CachedSource<'_> {
    async fn fetch_document(&self, url: &Url) -> String {
        self.cache.get_or_fetch(self.fetcher, url).await
    }
}

/// Shared state handed to every check task.
struct CheckContext {
    fetcher: Arc<Fetcher>,
    documents: Arc<dyn DocumentSource>,
    config: Arc<Config>,
    base_url: Url,
    rules: RobotsRules,
    cache: Arc<DocumentCache>,
}

enum CheckOutcome {
    Disallowed,
    Dropped,
    Scored(PageFinding),
}

/// Candidates selected from the discovered URLs.
struct Candidates {
    urls: Vec<Url>,
    excluded_samples: Vec<String>,
}

#[derive(Clone)]
pub(crate) struct FunnelScout {
    fetcher: Arc<Fetcher>,
    config: Arc<Config>,
}

impl FunnelScout {
    /// Creates a new FunnelScout with a shared HTTP client and a lazily
    /// launched browser (when the fallback is enabled).
    pub(crate) fn new(config: Config) -> Result<Self> {
        let renderer = if config.browser_fallback {
            RenderHandle::new(Box::new(ChromiumFactory::new(config.browser_path.clone())))
        } else {
            RenderHandle::disabled()
        };
        Self::with_renderer(config, renderer)
    }

    pub(crate) fn with_renderer(config: Config, renderer: RenderHandle) -> Result<Self> {
        let http_client = build_http_client(&config)?;
        let fetcher = Arc::new(Fetcher::new(http_client, Arc::new(renderer), &config));
        Ok(Self {
            fetcher,
            config: Arc::new(config),
        })
    }

    /// Preview of a single page: final URL, title and screenshot when possible.
    pub(crate) async fn preview(&self, input: &str) -> Result<PagePreview> {
        let url = normalize(input)?;
        self.fetcher.preview(&url).await
    }

    /// Runs the full pipeline against `input`.
    ///
    /// Only an unusable input URL is an error; every per-URL failure is
    /// absorbed and simply missing from the result.
    pub(crate) async fn analyze(&self, input: &str) -> Result<RunResult> {
        let start_time = Instant::now();
        let base_url = normalize(input)?;
        let config = &self.config;
        let heuristics = &config.heuristics;
        tracing::info!(target: "analyze_task", "Analyzing {}", base_url);

        let rules = fetch_robots(self.fetcher.http_client(), &base_url, config.request_timeout).await;

        let sitemaps = discover(
            self.fetcher.http_client(),
            &base_url,
            &rules.sitemaps,
            config.max_sitemaps,
            config.request_timeout,
        )
        .await;

        let cache = Arc::new(DocumentCache::default());
        let limits = CrawlLimits {
            max_pages: config.max_pages,
            max_depth: config.max_depth,
            max_queue: config.max_queue,
            delay: config.politeness_delay,
        };
        let source = CachedSource {
            fetcher: &self.fetcher,
            cache: &cache,
        };
        let crawled = crawl(&source, &base_url, &rules, heuristics, &limits).await;

        let mut discovered: Vec<String> = Vec::new();
        let mut discovered_seen: HashSet<&str> = HashSet::new();
        for url in sitemaps.page_urls.iter().chain(crawled.iter()) {
            if discovered_seen.insert(url.as_str()) {
                discovered.push(url.clone());
            }
        }

        let candidates = select_candidates(&base_url, &discovered, config);
        tracing::info!(target: "analyze_task",
            "{} URLs discovered ({} from sitemaps, {} crawled); {} candidates, {} excluded samples",
            discovered.len(),
            sitemaps.page_urls.len(),
            crawled.len(),
            candidates.urls.len(),
            candidates.excluded_samples.len()
        );

        let context = Arc::new(CheckContext {
            fetcher: Arc::clone(&self.fetcher),
            documents: Arc::clone(&self.fetcher) as Arc<dyn DocumentSource>,
            config: Arc::clone(&self.config),
            base_url: base_url.clone(),
            rules,
            cache,
        });
        let (checked, mut findings) = check_candidates(context, candidates.urls).await;

        // Completion order is arbitrary; order by score, then URL for stable output.
        findings.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.final_url.cmp(&b.final_url)));

        let mut final_seen: HashSet<String> = HashSet::new();
        let ad_pages: Vec<PageFinding> = findings
            .into_iter()
            .filter(|f| f.score >= config.ad_threshold)
            .filter(|f| final_seen.insert(f.final_url.clone()))
            .take(config.max_ad_pages)
            .collect();

        let funnels = build_funnels(
            &ad_pages,
            &heuristics.conversion_hints,
            config.ad_threshold,
            config.max_funnel_steps,
        );

        let report = format_report(base_url.as_str(), discovered.len(), checked, &funnels, &ad_pages);

        tracing::info!(target: "analyze_task",
            "Analysis of {} finished in {:.2?}: {} checked, {} ad-like, {} funnels",
            base_url,
            start_time.elapsed(),
            checked,
            ad_pages.len(),
            funnels.len()
        );

        Ok(RunResult {
            base_url: base_url.to_string(),
            discovered: discovered.len(),
            checked,
            classified: ad_pages.len(),
            funnel_count: funnels.len(),
            ad_pages,
            funnels,
            excluded_samples: candidates.excluded_samples,
            sitemaps_fetched: sitemaps.fetched,
            report,
        })
    }
}

/// Keeps same-origin, non-excluded URLs, canonicalized and deduplicated.
fn select_candidates(base_url: &Url, discovered: &[String], config: &Config) -> Candidates {
    let heuristics = &config.heuristics;
    let mut urls = Vec::new();
    let mut excluded_samples = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for raw in discovered {
        let Ok(url) = base_url.join(raw.trim()) else {
            tracing::debug!(target: "analyze_task", "Ignoring unparsable URL: {}", raw);
            continue;
        };
        if !same_origin(base_url, &url) {
            continue;
        }
        let url = canonicalize(&url, &heuristics.tracking_params);
        let key = url.to_string();
        if is_excluded(&url, heuristics) {
            if excluded_samples.len() < config.excluded_sample_limit && !excluded_samples.contains(&key) {
                excluded_samples.push(key);
            }
            continue;
        }
        if !seen.insert(key) {
            continue;
        }
        if urls.len() >= config.max_candidates {
            tracing::warn!(target: "analyze_task",
                "Candidate limit ({}) reached; remaining URLs are not checked",
                config.max_candidates
            );
            break;
        }
        urls.push(url);
    }

    Candidates {
        urls,
        excluded_samples,
    }
}

/// Probes and scores candidates with bounded parallelism.
///
/// Returns the number of candidates actually probed and the findings.
async fn check_candidates(context: Arc<CheckContext>, candidates: Vec<Url>) -> (usize, Vec<PageFinding>) {
    let start_time = Instant::now();
    let semaphore = Arc::new(Semaphore::new(context.config.concurrency));

    let progress_bar = if context.config.show_progress {
        ProgressBar::new(candidates.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        progress_bar.set_style(style.progress_chars("##-"));
    }

    let mut tasks = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let context_clone = Arc::clone(&context);
        let semaphore_clone = Arc::clone(&semaphore);
        let progress_bar_clone = progress_bar.clone();

        tasks.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore_clone.acquire().await else {
                return CheckOutcome::Dropped;
            };
            let outcome = check_candidate(&context_clone, candidate).await;
            progress_bar_clone.inc(1);
            outcome
        }));
    }

    let mut checked = 0usize;
    let mut findings = Vec::new();
    for task in tasks {
        match task.await {
            Ok(CheckOutcome::Disallowed) => {}
            Ok(CheckOutcome::Dropped) => checked += 1,
            Ok(CheckOutcome::Scored(finding)) => {
                checked += 1;
                findings.push(finding);
            }
            Err(e) => {
                tracing::error!(target: "check_task", "Check task failed: {}", e);
            }
        }
    }

    progress_bar.finish_with_message("Checks complete");
    tracing::info!(target: "check_task",
        "Checked {} candidates in {:.2?}; {} pages scored",
        checked,
        start_time.elapsed(),
        findings.len()
    );
    (checked, findings)
}

async fn check_candidate(context: &CheckContext, candidate: Url) -> CheckOutcome {
    if !is_allowed(&context.base_url, &context.rules, &candidate) {
        tracing::debug!(target: "check_task", "Disallowed by robots.txt: {}", candidate);
        return CheckOutcome::Disallowed;
    }

    sleep(context.config.politeness_delay).await;
    let probe = context.fetcher.probe_status(&candidate).await;
    if !probe.is_html_success() {
        tracing::debug!(target: "check_task",
            "Dropping {} (status {}, type {:?})",
            candidate, probe.status, probe.content_type
        );
        return CheckOutcome::Dropped;
    }
    if !is_allowed(&context.base_url, &context.rules, &probe.final_url) {
        tracing::debug!(target: "check_task",
            "Dropping {}: redirected to {}, which is off-origin or disallowed",
            candidate, probe.final_url
        );
        return CheckOutcome::Dropped;
    }

    let heuristics = &context.config.heuristics;
    let final_url = canonicalize(&probe.final_url, &heuristics.tracking_params);
    let html = context
        .cache
        .get_or_fetch(context.documents.as_ref(), &final_url)
        .await;
    if html.is_empty() {
        tracing::debug!(target: "check_task", "No document for {}", final_url);
        return CheckOutcome::Dropped;
    }

    let scored = score_page(&final_url, &html, heuristics);
    CheckOutcome::Scored(PageFinding {
        requested_url: candidate.to_string(),
        final_url: final_url.to_string(),
        http_status: probe.status,
        score: scored.score,
        reasons: scored.reasons,
        title: scored.title,
        cta_links: scored.cta_links,
        all_out_links: scored.all_out_links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::report::FUNNELS_HEADING;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOME: &str = r#"<html><head><title>Home</title></head>
        <body><a href="/offer">See our offer</a></body></html>"#;

    const OFFER: &str = r#"<html><head><title>Spring Offer</title>
        <script async src="https://www.googletagmanager.com/gtag/js?id=AW-1"></script>
        <script>fbq('init', '1');</script></head>
        <body><form action="/lead"><input type="email" name="email"></form>
        <a class="btn btn-primary" href="/checkout/thank-you?utm_source=lp">Buy now</a>
        </body></html>"#;

    const THANK_YOU: &str = r#"<html><head><title>Thanks!</title>
        <script async src="https://www.googletagmanager.com/gtag/js?id=AW-1"></script></head>
        <body><form action="/survey"></form><p>Order received.</p></body></html>"#;

    fn test_config() -> Config {
        Config {
            politeness_delay: Duration::ZERO,
            probe_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
            browser_fallback: false,
            ..Config::default()
        }
    }

    async fn mount_page(server: &MockServer, route: &str, html: &'static str) {
        Mock::given(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
            .mount(server)
            .await;
    }

    async fn fixture_site() -> MockServer {
        let server = MockServer::start().await;
        mount_page(&server, "/", HOME).await;
        mount_page(&server, "/offer", OFFER).await;
        mount_page(&server, "/checkout/thank-you", THANK_YOU).await;
        server
    }

    fn scout() -> FunnelScout {
        FunnelScout::new(test_config()).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_single_funnel() {
        let server = fixture_site().await;
        let result = scout().analyze(&server.uri()).await.unwrap();

        let offer = format!("{}/offer", server.uri());
        let thank_you = format!("{}/checkout/thank-you", server.uri());

        assert_eq!(result.funnels.len(), 1);
        assert_eq!(result.funnel_count, 1);
        let funnel = &result.funnels[0];
        assert_eq!(funnel.landing, offer);
        assert!(funnel.steps.is_empty());
        assert_eq!(funnel.conversion, thank_you);

        let landing = result.ad_pages.iter().find(|p| p.final_url == offer).unwrap();
        assert!(landing.score >= 18);
        assert!(u32::from(funnel.confidence) > landing.score);
        assert_eq!(landing.cta_links, vec![thank_you.clone()]);

        assert_eq!(result.discovered, 3);
        assert_eq!(result.checked, 3);
        assert_eq!(result.classified, 2);
        assert!(result.ad_pages.iter().all(|p| p.final_url != format!("{}/", server.uri())));
        assert!(result.report.contains(&format!("{} -> {}", offer, thank_you)));
    }

    #[tokio::test]
    async fn test_not_found_pages_are_never_ad_like() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"<a href="/offer">offer</a><a href="/promo-gone">gone</a>"#,
                "text/html",
            ))
            .mount(&server)
            .await;
        mount_page(&server, "/offer", OFFER).await;
        // The dead page would score well if it were ever scored.
        Mock::given(path("/promo-gone"))
            .respond_with(ResponseTemplate::new(404).set_body_raw(OFFER, "text/html"))
            .mount(&server)
            .await;

        let result = scout().analyze(&server.uri()).await.unwrap();
        let gone = format!("{}/promo-gone", server.uri());
        assert!(result.ad_pages.iter().all(|p| p.final_url != gone && p.requested_url != gone));
        assert!(result.funnels.iter().all(|f| {
            f.landing != gone && f.conversion != gone && !f.steps.contains(&gone)
        }));
        assert!(result.ad_pages.iter().any(|p| p.final_url.ends_with("/offer")));
    }

    #[tokio::test]
    async fn test_robots_and_sitemap_feed_the_pipeline() {
        let server = MockServer::start().await;
        let uri = server.uri();
        Mock::given(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "User-agent: *\nDisallow: /offer\nSitemap: {}/pages.xml\n",
                uri
            )))
            .mount(&server)
            .await;
        Mock::given(path("/pages.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<urlset><url><loc>{0}/offer</loc></url><url><loc>{0}/deal?gclid=1</loc></url>\
                 <url><loc>{0}/blog/launch</loc></url><url><loc>https://other.example/x</loc></url></urlset>",
                uri
            )))
            .mount(&server)
            .await;
        mount_page(&server, "/", "<p>home</p>").await;
        mount_page(&server, "/deal", OFFER).await;
        mount_page(&server, "/offer", OFFER).await;

        let result = scout().analyze(&uri).await.unwrap();

        assert_eq!(result.sitemaps_fetched, vec![format!("{}/pages.xml", uri)]);
        assert_eq!(result.excluded_samples, vec![format!("{}/blog/launch", uri)]);
        assert!(result.ad_pages.iter().any(|p| p.final_url == format!("{}/deal", uri)));
        assert!(result.ad_pages.iter().all(|p| !p.final_url.ends_with("/offer")));

        // /offer is disallowed and must never be requested.
        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.url.path() != "/offer"));
    }

    #[tokio::test]
    async fn test_empty_site_reports_placeholder() {
        let server = MockServer::start().await;
        let result = scout().analyze(&server.uri()).await.unwrap();
        assert!(result.funnels.is_empty());
        assert!(result.ad_pages.is_empty());
        let lines: Vec<&str> = result.report.lines().collect();
        let at = lines.iter().position(|l| *l == FUNNELS_HEADING).unwrap();
        assert_eq!(lines[at + 1], "(none found)");
    }

    #[tokio::test]
    async fn test_invalid_input_is_fatal() {
        assert!(matches!(scout().analyze("").await, Err(AppError::InvalidUrl(_))));
        assert!(matches!(scout().analyze("http://").await, Err(AppError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_failed_crawl_fetch_is_retried_when_scoring() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/offer"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_page(&server, "/offer", OFFER).await;

        let offer = format!("{}/offer", server.uri());
        let result = scout().analyze(&offer).await.unwrap();

        assert_eq!(result.checked, 1);
        assert!(result.ad_pages.iter().any(|p| p.final_url == offer));
        let gets = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == "GET" && r.url.path() == "/offer")
            .count();
        assert_eq!(gets, 2);
    }

    #[tokio::test]
    async fn test_off_origin_redirects_are_not_scored() {
        let server = MockServer::start().await;
        let elsewhere = MockServer::start().await;
        mount_page(&elsewhere, "/offer", OFFER).await;
        Mock::given(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<urlset><url><loc>{}/go</loc></url></urlset>",
                server.uri()
            )))
            .mount(&server)
            .await;
        Mock::given(path("/go"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", format!("{}/offer", elsewhere.uri())),
            )
            .mount(&server)
            .await;
        mount_page(&server, "/", "<p>home</p>").await;

        let result = scout().analyze(&server.uri()).await.unwrap();

        assert_eq!(result.checked, 2);
        assert!(result.ad_pages.is_empty());
        let foreign = elsewhere.received_requests().await.unwrap();
        assert!(foreign.iter().all(|r| r.method.as_str() != "GET"));
    }

    /// Records how many fetches run at the same time.
    #[derive(Default)]
    struct TrackingSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSource for TrackingSource {
        async fn fetch_document(&self, _url: &Url) -> String {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            "<html><title>Page</title></html>".to_string()
        }
    }

    async fn html_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "text/html"))
            .mount(&server)
            .await;
        server
    }

    fn check_context(server: &MockServer, config: Config, documents: Arc<TrackingSource>) -> Arc<CheckContext> {
        let http_client = build_http_client(&config).unwrap();
        let fetcher = Arc::new(Fetcher::new(http_client, Arc::new(RenderHandle::disabled()), &config));
        Arc::new(CheckContext {
            fetcher,
            documents,
            config: Arc::new(config),
            base_url: Url::parse(&server.uri()).unwrap(),
            rules: RobotsRules::default(),
            cache: Arc::new(DocumentCache::default()),
        })
    }

    fn pages(server: &MockServer, count: usize) -> Vec<Url> {
        (0..count)
            .map(|i| Url::parse(&format!("{}/p{}", server.uri(), i)).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_check_stage_respects_concurrency_limit() {
        let server = html_server().await;
        let documents = Arc::new(TrackingSource::default());
        let config = Config {
            concurrency: 3,
            ..test_config()
        };
        let context = check_context(&server, config, Arc::clone(&documents));

        let (checked, findings) = check_candidates(context, pages(&server, 10)).await;

        assert_eq!(checked, 10);
        assert_eq!(findings.len(), 10);
        assert_eq!(documents.calls.load(Ordering::SeqCst), 10);
        let peak = documents.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {}", peak);
        assert!(peak >= 2, "checks never overlapped");
    }

    #[tokio::test]
    async fn test_politeness_delay_precedes_every_probe() {
        let server = html_server().await;
        let config = Config {
            concurrency: 1,
            politeness_delay: Duration::from_millis(100),
            ..test_config()
        };
        let context = check_context(&server, config, Arc::new(TrackingSource::default()));

        let started = Instant::now();
        let (checked, _) = check_candidates(context, pages(&server, 3)).await;

        assert_eq!(checked, 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
        let probes = server.received_requests().await.unwrap();
        assert_eq!(probes.iter().filter(|r| r.method.as_str() == "HEAD").count(), 3);
    }

    /// Fails on the first fetch, then serves markup.
    #[derive(Default)]
    struct FlakySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSource for FlakySource {
        async fn fetch_document(&self, _url: &Url) -> String {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                String::new()
            } else {
                "<html></html>".to_string()
            }
        }
    }

    #[tokio::test]
    async fn test_document_cache_does_not_keep_failures() {
        let cache = DocumentCache::default();
        let source = FlakySource::default();
        let url = Url::parse("https://example.com/offer").unwrap();

        assert_eq!(cache.get_or_fetch(&source, &url).await, "");
        assert_eq!(cache.get_or_fetch(&source, &url).await, "<html></html>");
        assert_eq!(cache.get_or_fetch(&source, &url).await, "<html></html>");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSource for CountingSource {
        async fn fetch_document(&self, _url: &Url) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            "<html></html>".to_string()
        }
    }

    #[tokio::test]
    async fn test_document_cache_single_flight() {
        let cache = Arc::new(DocumentCache::default());
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let url = Url::parse("https://example.com/offer").unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let source = Arc::clone(&source);
            let url = url.clone();
            tasks.push(tokio::spawn(async move {
                cache.get_or_fetch(source.as_ref(), &url).await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), "<html></html>");
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_select_candidates() {
        let base = Url::parse("https://example.com/").unwrap();
        let config = Config {
            excluded_sample_limit: 1,
            ..Config::default()
        };
        let discovered: Vec<String> = [
            "https://example.com/offer?utm_medium=cpc",
            "https://example.com/offer",
            "https://example.com/faq",
            "https://example.com/privacy",
            "https://cdn.example.com/offer",
            "/pricing#plans",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let candidates = select_candidates(&base, &discovered, &config);
        let urls: Vec<String> = candidates.urls.iter().map(Url::to_string).collect();
        assert_eq!(urls, vec!["https://example.com/offer", "https://example.com/pricing"]);
        assert_eq!(candidates.excluded_samples, vec!["https://example.com/faq"]);
    }
}
