//! Heuristic "ad-likeness" scoring of a single HTML page.
//!
//! Every rule is independent and additive, and each rule that contributes
//! appends one reason tag:
//!
//! | signal                                   | points             | cap |
//! |------------------------------------------|--------------------|-----|
//! | funnel hint in the URL path              | 8 per distinct hint| -   |
//! | tracking-script signatures in the markup | 6 per signature    | 20  |
//! | `<form>` elements                        | 12 + 3 per form    | 24  |
//! | `<meta name="robots">` with `noindex`    | 6                  | -   |
//! | call-to-action hits                      | 6 per hit          | 18  |
//! | at most 35 outbound links                | 6                  | -   |

use crate::config::Heuristics;
use crate::models::PageScore;
use crate::url_policy::{canonicalize, matches_conversion_path, resolve_link};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static FORM_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("form").expect("valid selector"));
static META_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[name][content]").expect("valid selector"));
static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static CTA_CANDIDATE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a, button, input[type=submit], input[type=button]").expect("valid selector")
});

const FUNNEL_HINT_POINTS: u32 = 8;
const TRACKING_POINTS: u32 = 6;
const TRACKING_CAP: u32 = 20;
const FORM_BASE_POINTS: u32 = 12;
const FORM_POINTS: u32 = 3;
const FORM_CAP: u32 = 24;
const NOINDEX_POINTS: u32 = 6;
const CTA_POINTS: u32 = 6;
const CTA_CAP: u32 = 18;
const FEW_LINKS_POINTS: u32 = 6;
const FEW_LINKS_MAX: usize = 35;

/// Lowercased visible text with whitespace collapsed.
fn visible_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_button_like(element: &ElementRef, heuristics: &Heuristics) -> bool {
    let attrs = element.value();
    if attrs
        .attr("role")
        .is_some_and(|role| role.trim().eq_ignore_ascii_case("button"))
    {
        return true;
    }
    attrs.classes().any(|class| {
        let class = class.to_ascii_lowercase();
        heuristics
            .button_class_tokens
            .iter()
            .any(|token| class.contains(token.as_str()))
    })
}

/// True when `phrase` occurs in `text` as whole words.
fn contains_phrase(text: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    text.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Pushes `item` unless already present, keeping first-seen order.
fn push_unique(list: &mut Vec<String>, seen: &mut HashSet<String>, item: String) {
    if seen.insert(item.clone()) {
        list.push(item);
    }
}

/// Scores the document at `final_url` and extracts its link sets.
pub(crate) fn score_page(final_url: &Url, html: &str, heuristics: &Heuristics) -> PageScore {
    let document = Html::parse_document(html);
    let mut result = PageScore::default();

    result.title = document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|t| t.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());

    let path = final_url.path().to_ascii_lowercase();
    let mut matched_hints: HashSet<&str> = HashSet::new();
    for hint in &heuristics.funnel_hints {
        if path.contains(hint.as_str()) && matched_hints.insert(hint.as_str()) {
            result.score += FUNNEL_HINT_POINTS;
            result.reasons.push(format!("url_hint:{}", hint));
        }
    }

    let markup = html.to_lowercase();
    let signatures: HashSet<&str> = heuristics
        .tracking_signatures
        .iter()
        .map(String::as_str)
        .filter(|sig| markup.contains(sig))
        .collect();
    if !signatures.is_empty() {
        result.score += (TRACKING_POINTS * signatures.len() as u32).min(TRACKING_CAP);
        result.reasons.push(format!("tracking_scripts:{}", signatures.len()));
    }

    let forms = document.select(&FORM_SELECTOR).count() as u32;
    if forms > 0 {
        result.score += (FORM_BASE_POINTS + FORM_POINTS * forms).min(FORM_CAP);
        result.reasons.push(format!("forms:{}", forms));
    }

    let noindex = document.select(&META_SELECTOR).any(|meta| {
        let attrs = meta.value();
        attrs
            .attr("name")
            .is_some_and(|n| n.trim().eq_ignore_ascii_case("robots"))
            && attrs
                .attr("content")
                .is_some_and(|c| c.to_ascii_lowercase().contains("noindex"))
    });
    if noindex {
        result.score += NOINDEX_POINTS;
        result.reasons.push("noindex".to_string());
    }

    let mut cta_hits = 0u32;
    let mut cta_seen = HashSet::new();
    for element in document.select(&CTA_CANDIDATE_SELECTOR) {
        let tag = element.value().name();
        let text = if tag == "input" {
            element.value().attr("value").unwrap_or("").trim().to_lowercase()
        } else {
            visible_text(&element)
        };
        let text_match = !text.is_empty()
            && heuristics
                .cta_phrases
                .iter()
                .any(|phrase| contains_phrase(&text, phrase));

        let target = if tag == "a" {
            element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(final_url, href))
                .map(|u| canonicalize(&u, &heuristics.tracking_params))
        } else {
            None
        };
        let button_like = target.is_some() && is_button_like(&element, heuristics);
        let target_converts = target
            .as_ref()
            .is_some_and(|u| matches_conversion_path(u, &heuristics.conversion_hints));

        if text_match || (button_like && target_converts) {
            cta_hits += 1;
        }
        if button_like && (text_match || target_converts) {
            if let Some(target) = target {
                push_unique(&mut result.cta_links, &mut cta_seen, target.to_string());
            }
        }
    }
    if cta_hits > 0 {
        result.score += (CTA_POINTS * cta_hits).min(CTA_CAP);
        result.reasons.push(format!("cta:{}", cta_hits));
    }

    let mut link_seen = HashSet::new();
    for anchor in document.select(&ANCHOR_SELECTOR) {
        if let Some(target) = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_link(final_url, href))
        {
            let target = canonicalize(&target, &heuristics.tracking_params).to_string();
            push_unique(&mut result.all_out_links, &mut link_seen, target);
        }
    }
    if result.all_out_links.len() <= FEW_LINKS_MAX {
        result.score += FEW_LINKS_POINTS;
        result.reasons.push(format!("few_links:{}", result.all_out_links.len()));
    }

    tracing::debug!(target: "check_task",
        "Scored {}: {} ({})", final_url, result.score, result.reasons.join(", ")
    );
    result
}
