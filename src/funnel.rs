//! Reconstructs landing → conversion paths through the graph of ad-like pages.

use crate::models::{FunnelPath, PageFinding};
use crate::url_policy::matches_conversion_str;
use std::collections::{HashMap, HashSet, VecDeque};

/// Directed link graph over ad-like pages, keyed by canonical final URL.
///
/// Each node lists its CTA targets first, then its remaining outlinks; only
/// targets that are themselves ad-like become edges.
pub(crate) struct FunnelGraph<'a> {
    adjacency: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> FunnelGraph<'a> {
    pub(crate) fn build(pages: &'a [PageFinding]) -> Self {
        let nodes: HashSet<&str> = pages.iter().map(|p| p.final_url.as_str()).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::with_capacity(pages.len());

        for page in pages {
            let edges = adjacency.entry(page.final_url.as_str()).or_default();
            let cta: HashSet<&str> = page.cta_links.iter().map(String::as_str).collect();
            let ordered = page.cta_links.iter().map(String::as_str).chain(
                page.all_out_links
                    .iter()
                    .map(String::as_str)
                    .filter(|link| !cta.contains(link)),
            );
            for target in ordered {
                if nodes.contains(target) && !edges.contains(&target) {
                    edges.push(target);
                }
            }
        }

        Self { adjacency }
    }

    fn neighbours(&self, node: &str) -> &[&'a str] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Breadth-first search from `landing` for the first conversion page within
    /// `max_steps` hops. Returns the full path, landing first.
    pub(crate) fn find_conversion(
        &self,
        landing: &'a str,
        conversion_hints: &[String],
        max_steps: usize,
    ) -> Option<Vec<&'a str>> {
        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([landing]);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(landing, 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_steps {
                continue;
            }
            for &next in self.neighbours(node) {
                if !visited.insert(next) {
                    continue;
                }
                parents.insert(next, node);
                if matches_conversion_str(next, conversion_hints) {
                    let mut path = vec![next];
                    let mut current = next;
                    while let Some(&parent) = parents.get(current) {
                        path.push(parent);
                        current = parent;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back((next, depth + 1));
            }
        }
        None
    }
}

/// `min(100, round(2 × landing + conversion + bonus))`, where the bonus is
/// `10 / steps` (or 10 for a direct link). Halves round away from zero, so a
/// four-step path with scores 10 and 10 gives 33, not 32.
pub(crate) fn confidence(landing_score: u32, conversion_score: u32, step_count: usize) -> u8 {
    let bonus = if step_count > 0 {
        10.0 / step_count as f64
    } else {
        10.0
    };
    let raw = (2.0 * landing_score as f64 + conversion_score as f64 + bonus).round();
    raw.min(100.0) as u8
}

/// Builds funnels from the ad-like pages, highest confidence first.
///
/// Pages below `threshold` are ignored. Landing pages that already look like
/// conversion pages are skipped.
pub(crate) fn build_funnels(
    pages: &[PageFinding],
    conversion_hints: &[String],
    threshold: u32,
    max_steps: usize,
) -> Vec<FunnelPath> {
    let ad_like: Vec<PageFinding> = pages.iter().filter(|p| p.score >= threshold).cloned().collect();
    let graph = FunnelGraph::build(&ad_like);

    let mut scores: HashMap<&str, u32> = HashMap::new();
    for page in &ad_like {
        let entry = scores.entry(page.final_url.as_str()).or_insert(page.score);
        *entry = (*entry).max(page.score);
    }

    let mut funnels: Vec<FunnelPath> = Vec::new();
    let mut seen_pairs: HashSet<(String, String)> = HashSet::new();

    for landing in &ad_like {
        if matches_conversion_str(&landing.final_url, conversion_hints) {
            continue;
        }
        let Some(path) = graph.find_conversion(&landing.final_url, conversion_hints, max_steps) else {
            continue;
        };
        let Some(&conversion) = path.last() else {
            continue;
        };

        if !seen_pairs.insert((landing.final_url.clone(), conversion.to_string())) {
            continue;
        }

        let steps: Vec<String> = path[1..path.len() - 1].iter().map(|s| s.to_string()).collect();
        let conversion_score = scores.get(conversion).copied().unwrap_or(0);
        funnels.push(FunnelPath {
            landing: landing.final_url.clone(),
            confidence: confidence(landing.score, conversion_score, steps.len()),
            steps,
            conversion: conversion.to_string(),
        });
    }

    // Stable sort keeps first-found order among equal confidences.
    funnels.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    funnels
}
