//! Utility functions for normalizing, comparing and filtering URLs.

use crate::config::Heuristics;
use crate::error::{AppError, Result};
use url::Url;

/// Parses the input website string into a valid Url object, adding a scheme if necessary.
///
/// The fragment is always removed. Inputs without a host are rejected.
pub(crate) fn normalize(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidUrl("Website URL is empty".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| {
        tracing::debug!("Failed to parse URL '{}' (original: {}): {}", with_scheme, input, e);
        AppError::InvalidUrl(format!("{}: {}", input, e))
    })?;

    if url.host_str().map_or(true, str::is_empty) {
        return Err(AppError::InvalidUrl(format!("{}: missing host", input)));
    }

    url.set_fragment(None);
    Ok(url)
}

/// True iff both URLs share scheme, host and port.
pub(crate) fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Resolves an `href` found on `base` into an absolute http(s) URL without fragment.
///
/// Returns `None` for empty, fragment-only, `mailto:`, `tel:` and `javascript:`
/// targets, and for anything that does not resolve.
pub(crate) fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["mailto:", "tel:", "javascript:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Returns a copy of `url` with the fragment and all denylisted query keys removed.
///
/// The query string is only rewritten when a key was actually removed, so
/// remaining parameters keep their original order and encoding.
pub(crate) fn canonicalize(url: &Url, tracking_params: &[String]) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);

    if url.query().is_none() {
        return url;
    }

    let is_tracking = |key: &str| {
        let key = key.to_ascii_lowercase();
        tracking_params.iter().any(|p| *p == key)
    };

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if !pairs.iter().any(|(k, _)| is_tracking(k)) {
        return url;
    }

    let kept: Vec<&(String, String)> = pairs.iter().filter(|(k, _)| !is_tracking(k)).collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    url
}

/// Canonical string form of `url`: the identity key used for deduplication.
pub(crate) fn strip_tracking_params(url: &Url, tracking_params: &[String]) -> String {
    canonicalize(url, tracking_params).to_string()
}

/// True for static assets and content sections that never act as ad landing pages.
///
/// A keyword matches a path segment when the segment starts with it or contains
/// it as a hyphen-delimited token (`/help-center`, `/get-support`).
pub(crate) fn is_excluded(url: &Url, heuristics: &Heuristics) -> bool {
    let path = url.path().to_ascii_lowercase();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(last) = segments.last() {
        if let Some((_, ext)) = last.rsplit_once('.') {
            if heuristics.asset_extensions.iter().any(|e| e == ext) {
                return true;
            }
        }
    }

    segments.iter().any(|segment| {
        heuristics.exclusion_keywords.iter().any(|keyword| {
            segment.starts_with(keyword.as_str()) || segment.split('-').any(|t| t == keyword)
        })
    })
}

/// True when the URL path (case-insensitive) contains any conversion token.
pub(crate) fn matches_conversion_path(url: &Url, conversion_hints: &[String]) -> bool {
    let path = url.path().to_ascii_lowercase();
    conversion_hints.iter().any(|hint| path.contains(hint.as_str()))
}

/// String variant of [`matches_conversion_path`] for graph nodes keyed by URL.
pub(crate) fn matches_conversion_str(url: &str, conversion_hints: &[String]) -> bool {
    Url::parse(url)
        .map(|u| matches_conversion_path(&u, conversion_hints))
        .unwrap_or(false)
}
