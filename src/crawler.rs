//! Breadth-first crawl of same-origin links starting from the base URL.

use crate::config::Heuristics;
use crate::fetcher::DocumentSource;
use crate::models::RobotsRules;
use crate::robots::is_allowed;
use crate::url_policy::{canonicalize, is_excluded, resolve_link, same_origin};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use url::Url;

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href], area[href]").expect("valid link selector"));

/// Budgets bounding one crawl.
#[derive(Debug, Clone)]
pub(crate) struct CrawlLimits {
    /// Maximum number of URLs emitted.
    pub max_pages: usize,
    /// Pages at this depth are emitted but not expanded.
    pub max_depth: usize,
    /// The crawl stops once more than this many URLs are pending.
    pub max_queue: usize,
    /// Pause before every expansion fetch.
    pub delay: Duration,
}

/// Every `href` target on the page, resolved against `page_url`, in document order.
pub(crate) fn extract_links(html: &str, page_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    document
        .select(&LINK_SELECTOR)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(page_url, href))
        .collect()
}

/// Crawls from `base_url` and returns the canonical URLs it emitted, in BFS order.
///
/// A URL is enqueued at most once (the seen-set is checked at enqueue time).
/// Disallowed URLs are dropped silently. Expansion failures count as pages
/// without links.
pub(crate) async fn crawl(
    source: &dyn DocumentSource,
    base_url: &Url,
    rules: &RobotsRules,
    heuristics: &Heuristics,
    limits: &CrawlLimits,
) -> Vec<String> {
    let start_time = Instant::now();
    tracing::info!(target: "crawl_task", "Starting crawl for: {}", base_url);

    let start = canonicalize(base_url, &heuristics.tracking_params);
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(Url, usize)> = VecDeque::new();
    let mut emitted: Vec<String> = Vec::new();
    let mut expanded = 0usize;

    seen.insert(start.to_string());
    queue.push_back((start, 0));

    while let Some((page_url, depth)) = queue.pop_front() {
        if !is_allowed(base_url, rules, &page_url) {
            tracing::debug!(target: "crawl_task", "Disallowed by robots.txt: {}", page_url);
            continue;
        }

        emitted.push(page_url.to_string());
        if emitted.len() >= limits.max_pages {
            tracing::debug!(target: "crawl_task", "Page budget ({}) reached", limits.max_pages);
            break;
        }
        if depth >= limits.max_depth {
            continue;
        }

        tokio::time::sleep(limits.delay).await;
        let html = source.fetch_document(&page_url).await;
        expanded += 1;
        if html.is_empty() {
            tracing::debug!(target: "crawl_task", "No document for {}, treating as leaf", page_url);
            continue;
        }

        let mut added = 0usize;
        for link in extract_links(&html, &page_url) {
            if !same_origin(base_url, &link) {
                continue;
            }
            let link = canonicalize(&link, &heuristics.tracking_params);
            if is_excluded(&link, heuristics) {
                continue;
            }
            if seen.insert(link.to_string()) {
                queue.push_back((link, depth + 1));
                added += 1;
            }
        }
        tracing::debug!(target: "crawl_task",
            "Expanded {} (depth {}): {} new links, {} pending",
            page_url, depth, added, queue.len()
        );

        if queue.len() > limits.max_queue {
            tracing::warn!(target: "crawl_task",
                "Pending queue exceeded {} URLs; stopping crawl of {}",
                limits.max_queue, base_url
            );
            break;
        }
    }

    tracing::info!(target: "crawl_task",
        "Crawl for {} finished in {:.2?}. Emitted {} URLs, expanded {} pages.",
        base_url,
        start_time.elapsed(),
        emitted.len(),
        expanded
    );
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves a synthetic site where every page links to every other page.
    struct CompleteGraph {
        nodes: usize,
        fetches: Mutex<usize>,
    }

    #[async_trait]
    impl DocumentSource for CompleteGraph {
        async fn fetch_document(&self, _url: &Url) -> String {
            *self.fetches.lock().unwrap() += 1;
            let mut html = String::from("<html><body>");
            for i in 0..self.nodes {
                html.push_str(&format!("<a href=\"/p/{}\">{}</a>", i, i));
            }
            html.push_str("</body></html>");
            html
        }
    }

    /// Serves fixed pages keyed by path; unknown paths fail.
    struct FixtureSite {
        pages: HashMap<&'static str, &'static str>,
    }

    #[async_trait]
    impl DocumentSource for FixtureSite {
        async fn fetch_document(&self, url: &Url) -> String {
            self.pages.get(url.path()).map(|s| s.to_string()).unwrap_or_default()
        }
    }

    fn limits(max_pages: usize, max_depth: usize) -> CrawlLimits {
        CrawlLimits {
            max_pages,
            max_depth,
            max_queue: 5000,
            delay: Duration::ZERO,
        }
    }

    fn base() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[test]
    fn test_extract_links() {
        let page = Url::parse("https://example.com/offer/").unwrap();
        let links = extract_links(
            r##"<a href="step2">a</a><a href="#top">b</a><a href="mailto:x@y.z">c</a>
                <map><area href="/checkout"></map><a>no href</a>"##,
            &page,
        );
        let links: Vec<String> = links.iter().map(Url::to_string).collect();
        assert_eq!(
            links,
            vec!["https://example.com/offer/step2", "https://example.com/checkout"]
        );
    }

    #[tokio::test]
    async fn test_complete_graph_respects_page_budget_without_duplicates() {
        let site = CompleteGraph {
            nodes: 10_000,
            fetches: Mutex::new(0),
        };
        let mut crawl_limits = limits(350, 4);
        crawl_limits.max_queue = 20_000;

        let emitted = crawl(&site, &base(), &RobotsRules::default(), &Heuristics::default(), &crawl_limits).await;

        assert_eq!(emitted.len(), 350);
        let unique: HashSet<&String> = emitted.iter().collect();
        assert_eq!(unique.len(), emitted.len());
    }

    #[tokio::test]
    async fn test_queue_ceiling_stops_crawl() {
        let site = CompleteGraph {
            nodes: 10_000,
            fetches: Mutex::new(0),
        };
        let emitted = crawl(&site, &base(), &RobotsRules::default(), &Heuristics::default(), &limits(350, 4)).await;

        // The first expansion enqueues 10,000 URLs, which exceeds the ceiling.
        assert_eq!(emitted, vec!["https://example.com/"]);
        assert_eq!(*site.fetches.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_filters_and_depth() {
        let site = FixtureSite {
            pages: HashMap::from([
                (
                    "/",
                    r#"<a href="/offer?utm_source=x">o</a>
                       <a href="/offer">o again</a>
                       <a href="https://other.com/offer">external</a>
                       <a href="/blog/post">blog</a>
                       <a href="/admin/panel">admin</a>
                       <a href="/logo.png">img</a>"#,
                ),
                ("/offer", r#"<a href="/offer/step">next</a><a href="/">home</a>"#),
                ("/offer/step", r#"<a href="/deep">deep</a>"#),
            ]),
        };
        let rules = RobotsRules {
            sitemaps: vec![],
            disallow: vec!["/admin".to_string()],
        };

        let emitted = crawl(&site, &base(), &rules, &Heuristics::default(), &limits(100, 2)).await;
        assert_eq!(
            emitted,
            vec![
                "https://example.com/",
                "https://example.com/offer",
                "https://example.com/offer/step",
            ]
        );

        let deeper = crawl(&site, &base(), &rules, &Heuristics::default(), &limits(100, 3)).await;
        assert_eq!(deeper.last().map(String::as_str), Some("https://example.com/deep"));
    }

    #[tokio::test]
    async fn test_failed_expansion_still_counts_page() {
        let site = FixtureSite {
            pages: HashMap::new(),
        };
        let emitted = crawl(&site, &base(), &RobotsRules::default(), &Heuristics::default(), &limits(10, 4)).await;
        assert_eq!(emitted, vec!["https://example.com/"]);
    }
}
