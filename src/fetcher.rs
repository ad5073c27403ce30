//! HTTP status probes and document retrieval with a headless-browser fallback.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{PagePreview, ProbeResult};
use crate::renderer::RenderHandle;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode, redirect};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));

/// Anything able to return the markup of a page. Failures yield an empty string.
#[async_trait]
pub(crate) trait DocumentSource: Send + Sync {
    async fn fetch_document(&self, url: &Url) -> String;
}

/// Builds the shared HTTP client with the run's fixed outbound headers.
pub(crate) fn build_http_client(config: &Config) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .redirect(redirect::Policy::limited(10))
        .timeout(config.request_timeout.max(config.probe_timeout))
        .build()
        .map_err(|e| AppError::Generic(anyhow::anyhow!("Failed to build HTTP client: {}", e)))
}

fn content_type_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|val| val.to_str().ok())
        .map(|s| s.to_lowercase())
}

/// Extracts the `<title>` text with a permissive pattern, for markup that was not parsed.
pub(crate) fn title_from_markup(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
}

/// Fetches pages from the target site.
pub(crate) struct Fetcher {
    http_client: Client,
    renderer: Arc<RenderHandle>,
    probe_timeout: Duration,
    request_timeout: Duration,
    render_timeout: Duration,
}

impl Fetcher {
    pub(crate) fn new(http_client: Client, renderer: Arc<RenderHandle>, config: &Config) -> Self {
        Self {
            http_client,
            renderer,
            probe_timeout: config.probe_timeout,
            request_timeout: config.request_timeout,
            render_timeout: config.render_timeout,
        }
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Probes `url` with HEAD (falling back to GET on 405/501).
    ///
    /// Never fails: network errors and timeouts are reported as status 0.
    pub(crate) async fn probe_status(&self, url: &Url) -> ProbeResult {
        let head = match self.probe_once(Method::HEAD, url).await {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(target: "check_task", "HEAD {} failed: {}", url, e);
                return ProbeResult::failed(url);
            }
        };

        let rejected = head.status == StatusCode::METHOD_NOT_ALLOWED.as_u16()
            || head.status == StatusCode::NOT_IMPLEMENTED.as_u16();
        if !rejected {
            return head;
        }

        tracing::debug!(target: "check_task", "HEAD rejected by {} ({}), retrying with GET", url, head.status);
        match self.probe_once(Method::GET, url).await {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(target: "check_task", "GET probe {} failed: {}", url, e);
                ProbeResult::failed(url)
            }
        }
    }

    async fn probe_once(&self, method: Method, url: &Url) -> Result<ProbeResult> {
        let request = self.http_client.request(method, url.clone()).send();
        // Dropping the request future on timeout cancels the connection.
        let response = tokio::time::timeout(self.probe_timeout, request)
            .await
            .map_err(|_| {
                AppError::NetworkFailure(format!("probe of {} timed out after {:?}", url, self.probe_timeout))
            })??;

        Ok(ProbeResult {
            status: response.status().as_u16(),
            final_url: response.url().clone(),
            content_type: content_type_of(&response),
        })
    }

    /// Plain GET that only succeeds for a 2xx response declaring an HTML type.
    async fn fetch_html(&self, url: &Url) -> Result<String> {
        let request = async {
            let response = self.http_client.get(url.clone()).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(AppError::UpstreamRejection {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            let content_type = content_type_of(&response).unwrap_or_default();
            if !content_type.contains("html") {
                return Err(AppError::ContentTypeMismatch {
                    url: url.to_string(),
                    content_type,
                });
            }
            Ok::<_, AppError>(response.text().await?)
        };

        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| {
                AppError::NetworkFailure(format!("GET {} timed out after {:?}", url, self.request_timeout))
            })?
    }

    /// Returns the HTML of `url`, rendering it in the browser when a plain GET
    /// does not produce HTML. Returns an empty string when both fail.
    pub(crate) async fn fetch_document(&self, url: &Url) -> String {
        let plain_error = match self.fetch_html(url).await {
            Ok(body) => return body,
            Err(e) => e,
        };
        tracing::debug!(target: "check_task", "Plain fetch of {} unusable ({}), trying browser", url, plain_error);

        match self.renderer.render(url.as_str(), self.render_timeout, false).await {
            Ok(rendered) => rendered.html,
            Err(AppError::RenderingUnavailable(reason)) => {
                tracing::debug!(target: "check_task", "No rendering for {}: {}", url, reason);
                String::new()
            }
            Err(e) => {
                tracing::warn!(target: "check_task", "Browser fetch of {} failed: {}", url, e);
                String::new()
            }
        }
    }

    /// Final URL, title and (when a browser is available) a screenshot of `url`.
    pub(crate) async fn preview(&self, url: &Url) -> Result<PagePreview> {
        match self.renderer.render(url.as_str(), self.render_timeout, true).await {
            Ok(rendered) => {
                let title = rendered
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .or_else(|| title_from_markup(&rendered.html));
                return Ok(PagePreview {
                    final_url: rendered.final_url.unwrap_or_else(|| url.to_string()),
                    title,
                    screenshot_base64: rendered.screenshot.map(|png| BASE64.encode(png)),
                });
            }
            Err(e) => {
                tracing::debug!(target: "render_task", "Preview of {} without browser: {}", url, e);
            }
        }

        let request = async {
            let response = self.http_client.get(url.clone()).send().await?;
            let final_url = response.url().to_string();
            let body = response.text().await?;
            Ok::<_, AppError>((final_url, body))
        };
        let (final_url, body) = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| AppError::NetworkFailure(format!("preview of {} timed out", url)))??;

        Ok(PagePreview {
            final_url,
            title: title_from_markup(&body),
            screenshot_base64: None,
        })
    }
}

#[async_trait]
impl DocumentSource for Fetcher {
    async fn fetch_document(&self, url: &Url) -> String {
        Fetcher::fetch_document(self, url).await
    }
}
