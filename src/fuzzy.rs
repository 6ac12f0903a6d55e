use std::cmp::Ordering;

use crate::syntax::CalloutKind;

/// One autocomplete candidate supplied by the host application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSuggestion {
    pub title: String,
    pub url: String,
}

impl LinkSuggestion {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Order-insensitive subsequence score. Candidate and query are lowercased
/// and character-sorted, then each query character is located by a forward
/// scan through the candidate; the score accumulates `1/gap` per character,
/// starting from 1. A query character with no match past the previous one
/// disqualifies the candidate (score 0).
pub fn fuzzy_score(candidate: &str, query: &str) -> f64 {
    let mut haystack: Vec<char> = candidate.to_lowercase().chars().collect();
    haystack.sort_unstable();
    let mut needle: Vec<char> = query.to_lowercase().chars().collect();
    needle.sort_unstable();

    let mut score = 1.0;
    let mut last: Option<usize> = None;
    for ch in needle {
        let from = last.map_or(0, |index| index + 1);
        let Some(offset) = haystack[from.min(haystack.len())..]
            .iter()
            .position(|&c| c == ch)
        else {
            return 0.0;
        };
        let index = from + offset;
        let gap = match last {
            Some(previous) => index - previous,
            None => index + 1,
        };
        score += 1.0 / gap as f64;
        last = Some(index);
    }
    score
}

/// Ranks link suggestions against a query, best first. A suggestion scores
/// on whichever of its title or url matches better; zero-scoring entries are
/// dropped.
pub fn rank_links(links: &[LinkSuggestion], query: &str) -> Vec<LinkSuggestion> {
    let mut scored: Vec<(f64, &LinkSuggestion)> = links
        .iter()
        .map(|link| {
            let score = fuzzy_score(&link.title, query).max(fuzzy_score(&link.url, query));
            (score, link)
        })
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(_, link)| link.clone()).collect()
}

/// Ranks the callout type names against a query, best first.
pub fn rank_callouts(query: &str) -> Vec<CalloutKind> {
    let mut scored: Vec<(f64, CalloutKind)> = CalloutKind::ALL
        .into_iter()
        .map(|kind| (fuzzy_score(kind.as_str(), query), kind))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(_, kind)| kind).collect()
}
