//! Defines the core data structures used in the funnel-scout application.

use serde::{Deserialize, Serialize};
use url::Url;

/// Rules read from a site's robots.txt for the wildcard user agent.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RobotsRules {
    /// Sitemap URLs declared anywhere in the file, resolved and deduplicated.
    pub sitemaps: Vec<String>,
    /// `Disallow` path prefixes of the `User-agent: *` group, in file order.
    pub disallow: Vec<String>,
}

/// Outcome of a HEAD (or fallback GET) status probe.
#[derive(Debug, Clone)]
pub(crate) struct ProbeResult {
    /// HTTP status of the final response, or 0 on network failure/timeout.
    pub status: u16,
    /// The URL after following redirects (the requested URL on failure).
    pub final_url: Url,
    /// Lowercased `Content-Type` header, if reported.
    pub content_type: Option<String>,
}

impl ProbeResult {
    pub(crate) fn failed(url: &Url) -> Self {
        Self {
            status: 0,
            final_url: url.clone(),
            content_type: None,
        }
    }

    /// True when the final response was 2xx and, if a type was given, HTML.
    pub(crate) fn is_html_success(&self) -> bool {
        (200..300).contains(&self.status)
            && self
                .content_type
                .as_deref()
                .map_or(true, |ct| ct.contains("html"))
    }
}

/// Result of scoring one HTML document.
#[derive(Debug, Clone, Default)]
pub(crate) struct PageScore {
    pub score: u32,
    pub reasons: Vec<String>,
    pub title: Option<String>,
    pub cta_links: Vec<String>,
    pub all_out_links: Vec<String>,
}

/// A successfully fetched and scored candidate page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageFinding {
    /// The candidate URL that was probed.
    pub requested_url: String,
    /// The canonical URL after redirects; identity key of the page.
    pub final_url: String,
    /// HTTP status of the final response.
    pub http_status: u16,
    /// Heuristic ad-likeness score.
    pub score: u32,
    /// Tags naming every rule that contributed to the score.
    pub reasons: Vec<String>,
    /// Contents of the `<title>` element, if any.
    pub title: Option<String>,
    /// Canonical targets of button-like call-to-action anchors.
    pub cta_links: Vec<String>,
    /// Canonical targets of every resolvable anchor on the page.
    pub all_out_links: Vec<String>,
}

/// A reconstructed landing → conversion path through ad-like pages.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct FunnelPath {
    pub landing: String,
    /// Intermediate pages, excluding the landing and conversion pages.
    pub steps: Vec<String>,
    pub conversion: String,
    /// Confidence in the range 0-100.
    pub confidence: u8,
}

/// Everything produced by one full analysis run.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub(crate) struct RunResult {
    /// The normalized base URL the run started from.
    pub base_url: String,
    /// Number of distinct URLs found by sitemap discovery and crawling.
    pub discovered: usize,
    /// Number of candidates whose status was actually probed.
    pub checked: usize,
    /// Number of pages classified as ad-like (after the cap).
    pub classified: usize,
    /// Number of funnels reconstructed.
    pub funnel_count: usize,
    /// Ad-like pages, highest score first.
    pub ad_pages: Vec<PageFinding>,
    /// Funnels, highest confidence first.
    pub funnels: Vec<FunnelPath>,
    /// A sample of candidates dropped by the exclusion heuristic.
    pub excluded_samples: Vec<String>,
    /// Sitemap documents that were fetched successfully.
    pub sitemaps_fetched: Vec<String>,
    /// Human readable report of the funnels and ad-like pages.
    pub report: String,
}

/// A lightweight preview of a single page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct PagePreview {
    pub final_url: String,
    pub title: Option<String>,
    /// PNG screenshot of the visible viewport, base64-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_base64: Option<String>,
}
