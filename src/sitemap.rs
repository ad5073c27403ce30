//! Sitemap discovery: fetches sitemap documents breadth-first and collects page URLs.

use crate::error::{AppError, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Client;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use url::Url;

/// `loc` entries of a single sitemap document.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SitemapDocument {
    /// Page URLs listed under `<url>` entries.
    pub pages: Vec<String>,
    /// Nested sitemap URLs listed under `<sitemap>` entries.
    pub sitemaps: Vec<String>,
}

/// Result of walking a site's sitemap hierarchy.
#[derive(Debug, Default)]
pub(crate) struct SitemapDiscovery {
    /// Deduplicated page URLs, in discovery order.
    pub page_urls: Vec<String>,
    /// Sitemap documents that were fetched successfully.
    pub fetched: Vec<String>,
}

/// Walks `{origin}/sitemap.xml` plus `extra_sitemaps` breadth-first.
///
/// Unreachable or malformed sitemaps are skipped. Stops once `max_fetches`
/// documents have been fetched successfully.
pub(crate) async fn discover(
    http_client: &Client,
    base_url: &Url,
    extra_sitemaps: &[String],
    max_fetches: usize,
    timeout: Duration,
) -> SitemapDiscovery {
    let start_time = Instant::now();
    let mut discovery = SitemapDiscovery::default();
    let mut queued: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut seen_pages: HashSet<String> = HashSet::new();

    let mut seeds = Vec::with_capacity(extra_sitemaps.len() + 1);
    if let Ok(default_sitemap) = base_url.join("/sitemap.xml") {
        seeds.push(default_sitemap.to_string());
    }
    seeds.extend(extra_sitemaps.iter().cloned());
    for seed in seeds {
        if queued.insert(seed.clone()) {
            queue.push_back(seed);
        }
    }

    while let Some(sitemap_url) = queue.pop_front() {
        if discovery.fetched.len() >= max_fetches {
            tracing::info!(target: "sitemap_task",
                "Sitemap fetch budget ({}) reached; {} sitemaps left unvisited",
                max_fetches, queue.len() + 1
            );
            break;
        }

        let body = match fetch_text(http_client, &sitemap_url, timeout).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(target: "sitemap_task", "Skipping sitemap {}: {}", sitemap_url, e);
                continue;
            }
        };
        discovery.fetched.push(sitemap_url.clone());

        let document = match parse_sitemap(&body) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(target: "sitemap_task", "Malformed sitemap {}: {}", sitemap_url, e);
                SitemapDocument::default()
            }
        };

        tracing::debug!(target: "sitemap_task",
            "Sitemap {}: {} pages, {} nested sitemaps",
            sitemap_url, document.pages.len(), document.sitemaps.len()
        );

        for page in document.pages {
            if seen_pages.insert(page.clone()) {
                discovery.page_urls.push(page);
            }
        }
        for nested in document.sitemaps {
            if queued.insert(nested.clone()) {
                queue.push_back(nested);
            }
        }
    }

    tracing::info!(target: "sitemap_task",
        "Sitemap discovery for {} finished in {:.2?}: {} documents, {} page URLs",
        base_url,
        start_time.elapsed(),
        discovery.fetched.len(),
        discovery.page_urls.len()
    );
    discovery
}

async fn fetch_text(http_client: &Client, url: &str, timeout: Duration) -> Result<String> {
    let response = http_client.get(url).timeout(timeout).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::UpstreamRejection {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.text().await?)
}

/// Parses a `urlset` or `sitemapindex` document.
///
/// Tags are matched on their local name so namespaced documents work. Any XML
/// error fails the whole document.
pub(crate) fn parse_sitemap(xml: &str) -> Result<SitemapDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut document = SitemapDocument::default();
    let mut buf = Vec::new();
    let mut stack: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase());
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| AppError::ParseFailure(format!("bad text in sitemap: {}", err)))?;
                record_loc(&stack, text.trim(), &mut document);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                record_loc(&stack, text.trim(), &mut document);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AppError::ParseFailure(format!(
                    "XML error at position {}: {}",
                    reader.error_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(document)
}

fn record_loc(stack: &[String], text: &str, document: &mut SitemapDocument) {
    if text.is_empty() {
        return;
    }
    let [.., parent, current] = stack else {
        return;
    };
    if current != "loc" {
        return;
    }
    match parent.as_str() {
        "url" => document.pages.push(text.to_string()),
        "sitemap" => document.sitemaps.push(text.to_string()),
        _ => {}
    }
}
