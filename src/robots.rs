//! Fetching and interpreting robots.txt for the wildcard user agent.

use crate::error::{AppError, Result};
use crate::models::RobotsRules;
use crate::url_policy::same_origin;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Fetches `{origin}/robots.txt` and parses it.
///
/// Any failure (network, non-2xx, unreadable body) yields empty rules; a
/// missing robots.txt is not an error for this tool.
pub(crate) async fn fetch_robots(http_client: &Client, base_url: &Url, timeout: Duration) -> RobotsRules {
    let robots_url = match base_url.join("/robots.txt") {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(target: "robots_task", "Cannot build robots.txt URL for {}: {}", base_url, e);
            return RobotsRules::default();
        }
    };

    match fetch_robots_text(http_client, &robots_url, timeout).await {
        Ok(body) => {
            let rules = parse_robots(&body, &robots_url);
            tracing::info!(target: "robots_task",
                "robots.txt for {}: {} disallow rules, {} sitemaps",
                base_url, rules.disallow.len(), rules.sitemaps.len()
            );
            rules
        }
        Err(e) => {
            tracing::debug!(target: "robots_task", "No usable robots.txt at {}: {}", robots_url, e);
            RobotsRules::default()
        }
    }
}

async fn fetch_robots_text(http_client: &Client, robots_url: &Url, timeout: Duration) -> Result<String> {
    let response = http_client
        .get(robots_url.clone())
        .timeout(timeout)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::UpstreamRejection {
            url: robots_url.to_string(),
            status: status.as_u16(),
        });
    }

    Ok(response.text().await?)
}

/// Parses robots.txt content.
///
/// Only `Disallow` lines of groups naming `User-agent: *` are kept; `Sitemap`
/// lines are collected from anywhere, resolved against `robots_url`.
pub(crate) fn parse_robots(content: &str, robots_url: &Url) -> RobotsRules {
    let mut rules = RobotsRules::default();
    let mut applies_to_us = false;
    let mut in_agent_lines = false;

    for raw_line in content.lines() {
        let line = match raw_line.split_once('#') {
            Some((before, _)) => before,
            None => raw_line,
        }
        .trim();

        if line.is_empty() {
            continue;
        }

        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_ascii_lowercase();
        let value = value.trim();

        match directive.as_str() {
            "user-agent" => {
                // Consecutive user-agent lines share one group.
                if !in_agent_lines {
                    applies_to_us = false;
                }
                in_agent_lines = true;
                if value == "*" {
                    applies_to_us = true;
                }
            }
            "disallow" => {
                in_agent_lines = false;
                if applies_to_us && !value.is_empty() {
                    rules.disallow.push(value.to_string());
                }
            }
            "sitemap" => {
                in_agent_lines = false;
                match robots_url.join(value) {
                    Ok(url) => {
                        let url = url.to_string();
                        if !rules.sitemaps.contains(&url) {
                            rules.sitemaps.push(url);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(target: "robots_task", "Ignoring unresolvable sitemap '{}': {}", value, e);
                    }
                }
            }
            _ => {
                in_agent_lines = false;
            }
        }
    }

    rules
}

/// True when `candidate` is on the base origin and no disallow prefix matches its path.
///
/// Prefix matching only; `*` and `$` patterns are not interpreted.
pub(crate) fn is_allowed(base_url: &Url, rules: &RobotsRules, candidate: &Url) -> bool {
    if !same_origin(base_url, candidate) {
        return false;
    }
    let path = candidate.path();
    !rules.disallow.iter().any(|prefix| path.starts_with(prefix.as_str()))
}
