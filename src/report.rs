//! Plain-text report of a run.

use crate::models::{FunnelPath, PageFinding};

pub(crate) const FUNNELS_HEADING: &str = "=== Probable funnels ===";
pub(crate) const PAGES_HEADING: &str = "=== Ad-like pages ===";

/// Formats one funnel as `landing -> step -> ... -> conversion (confidence N)`.
pub(crate) fn format_funnel(funnel: &FunnelPath) -> String {
    let chain: Vec<&str> = std::iter::once(funnel.landing.as_str())
        .chain(funnel.steps.iter().map(String::as_str))
        .chain(std::iter::once(funnel.conversion.as_str()))
        .collect();
    format!("{} (confidence {})", chain.join(" -> "), funnel.confidence)
}

/// Builds the newline-joined report: a summary line, the funnels section and
/// the ad-like pages section, each with a placeholder when empty.
pub(crate) fn format_report(
    base_url: &str,
    discovered: usize,
    checked: usize,
    funnels: &[FunnelPath],
    ad_pages: &[PageFinding],
) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!(
        "Scanned {}: {} URLs discovered, {} checked, {} ad-like, {} funnels",
        base_url,
        discovered,
        checked,
        ad_pages.len(),
        funnels.len()
    ));
    lines.push(String::new());

    lines.push(FUNNELS_HEADING.to_string());
    if funnels.is_empty() {
        lines.push("(none found)".to_string());
    } else {
        lines.extend(funnels.iter().map(format_funnel));
    }
    lines.push(String::new());

    lines.push(PAGES_HEADING.to_string());
    if ad_pages.is_empty() {
        lines.push("(none)".to_string());
    } else {
        for page in ad_pages {
            let title = page
                .title
                .as_deref()
                .map(|t| format!(" \"{}\"", t))
                .unwrap_or_default();
            lines.push(format!(
                "{} (score {}){} [{}]",
                page.final_url,
                page.score,
                title,
                page.reasons.join(", ")
            ));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_has_placeholders() {
        let report = format_report("https://example.com/", 3, 2, &[], &[]);
        let lines: Vec<&str> = report.lines().collect();
        let funnels_at = lines.iter().position(|l| *l == FUNNELS_HEADING).unwrap();
        assert_eq!(lines[funnels_at + 1], "(none found)");
        let pages_at = lines.iter().position(|l| *l == PAGES_HEADING).unwrap();
        assert_eq!(lines[pages_at + 1], "(none)");
    }

    #[test]
    fn test_report_lists_chains_and_pages() {
        let funnel = FunnelPath {
            landing: "https://example.com/offer".to_string(),
            steps: vec!["https://example.com/plans".to_string()],
            conversion: "https://example.com/checkout".to_string(),
            confidence: 72,
        };
        let page = PageFinding {
            requested_url: "https://example.com/offer".to_string(),
            final_url: "https://example.com/offer".to_string(),
            http_status: 200,
            score: 30,
            reasons: vec!["url_hint:offer".to_string(), "forms:1".to_string()],
            title: Some("Offer".to_string()),
            cta_links: vec![],
            all_out_links: vec![],
        };

        let report = format_report("https://example.com/", 5, 4, &[funnel], &[page]);
        assert!(report.contains(
            "https://example.com/offer -> https://example.com/plans -> https://example.com/checkout (confidence 72)"
        ));
        assert!(report.contains("https://example.com/offer (score 30) \"Offer\" [url_hint:offer, forms:1]"));
        assert!(!report.contains("(none"));
    }
}
