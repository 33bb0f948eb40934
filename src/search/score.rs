//! Scoring pipeline: layered matchers fused into one score per
//! (query, name) pair, then file-type and symbol-presence ranking.
//!
//! Layers do not stack: a pair contributes the maximum matching layer
//! only. Lexical scores are the layer weight scaled to 100; ranking
//! adjustments are added afterwards. Final ordering is by descending
//! score, then ascending path, then ascending (line, column).

use crate::config::{RankingConfig, ScoringConfig};
use crate::parsing::FileCategory;
use crate::types::AnnotationSet;
use serde::Serialize;

/// Which matcher layer produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchLayer {
    Exact,
    Substring,
    Annotation,
    Fuzzy,
    Stemming,
    NameSplit,
    Abbreviation,
}

/// Split an identifier into lowercase parts on case and separator
/// boundaries: `parseHTTPRequest` -> ["parse", "http", "request"],
/// `snake_case_name` -> ["snake", "case", "name"].
pub fn split_name(name: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = name.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == '.' || c == ' ' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev_lower = chars[i - 1].is_lowercase();
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            // Break before a new word: aB | ABb (acronym followed by word).
            if prev_lower || next_lower {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Levenshtein distance over scalar values.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Similarity ratio in 0.0..=1.0.
fn edit_ratio(a: &str, b: &str) -> f32 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f32 / longest as f32
}

/// Light suffix-stripping stemmer, enough to fold common inflections.
pub fn stem(word: &str) -> &str {
    for suffix in ["ization", "ations", "ation", "ings", "ing", "ers", "ies", "es", "ed", "er", "s"] {
        if let Some(stripped) = word.strip_suffix(suffix) {
            if stripped.chars().count() >= 3 {
                return stripped;
            }
        }
    }
    word
}

/// Score a query against one symbol name (plus its annotations).
///
/// Returns the winning layer and its weight scaled to 100, or `None` when
/// no layer triggers.
pub fn score_name(
    query: &str,
    name: &str,
    annotations: Option<&AnnotationSet>,
    weights: &ScoringConfig,
    case_sensitive: bool,
) -> Option<(f32, MatchLayer)> {
    let query_cmp = if case_sensitive {
        query.to_string()
    } else {
        query.to_lowercase()
    };
    let name_cmp = if case_sensitive {
        name.to_string()
    } else {
        name.to_lowercase()
    };

    let mut best: Option<(f32, MatchLayer)> = None;
    let mut consider = |weight: f32, layer: MatchLayer| {
        if weight > 0.0 && best.map_or(true, |(w, _)| weight > w) {
            best = Some((weight, layer));
        }
    };

    if query_cmp == name_cmp {
        consider(weights.exact, MatchLayer::Exact);
    }
    if name_cmp.contains(query_cmp.as_str()) {
        consider(weights.substring, MatchLayer::Substring);
    }
    if let Some(annotations) = annotations {
        let query_lower = query.to_lowercase();
        let matched = annotations.iter().any(|(key, value)| {
            key.to_lowercase().contains(&query_lower)
                || value.to_lowercase().contains(&query_lower)
        });
        if matched {
            consider(weights.annotation, MatchLayer::Annotation);
        }
    }
    if edit_ratio(&query_cmp, &name_cmp) >= weights.fuzzy_threshold {
        consider(weights.fuzzy, MatchLayer::Fuzzy);
    }
    {
        let query_stem = stem(&query_cmp);
        let name_stem = stem(&name_cmp);
        if query_stem == name_stem
            && query_stem.chars().count() >= 3
            && name_stem.chars().count() >= 3
        {
            consider(weights.stemming, MatchLayer::Stemming);
        }
    }
    let parts = split_name(name);
    if parts.iter().any(|p| p == &query_cmp.to_lowercase()) {
        consider(weights.name_split, MatchLayer::NameSplit);
    }
    if parts.len() >= 2 {
        let initials: String = parts.iter().filter_map(|p| p.chars().next()).collect();
        if initials == query_cmp.to_lowercase() {
            consider(weights.abbreviation, MatchLayer::Abbreviation);
        }
    }

    best.map(|(weight, layer)| (weight * 100.0, layer))
}

/// File-type and symbol-presence adjustment added to a lexical score.
pub fn ranking_adjustment(
    category: FileCategory,
    is_symbol: bool,
    ranking: &RankingConfig,
) -> f32 {
    if !ranking.enabled {
        return 0.0;
    }
    let file_part = match category {
        FileCategory::Code => ranking.code_boost,
        FileCategory::Documentation => ranking.doc_penalty,
        FileCategory::Config => ranking.config_boost,
    };
    let symbol_part = if is_symbol {
        0.0
    } else {
        ranking.non_symbol_penalty
    };
    file_part + symbol_part
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[test]
    fn test_exact_beats_substring() {
        let (score, layer) =
            score_name("handle", "handle", None, &weights(), false).unwrap();
        assert_eq!(layer, MatchLayer::Exact);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_substring_layer() {
        let (score, layer) =
            score_name("request", "handle_request_body", None, &weights(), false).unwrap();
        assert_eq!(layer, MatchLayer::Substring);
        assert_eq!(score, 90.0);
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let (_, layer) = score_name("HANDLEREQUEST", "HandleRequest", None, &weights(), false).unwrap();
        assert_eq!(layer, MatchLayer::Exact);
        assert!(score_name("HANDLEREQUEST", "HandleRequest", None, &weights(), true).is_none());
    }

    #[test]
    fn test_annotation_layer() {
        let mut annotations = AnnotationSet::new();
        annotations.insert("owner".into(), "billing-team".into());
        let (score, layer) = score_name(
            "billing",
            "unrelated_name_zq",
            Some(&annotations),
            &weights(),
            false,
        )
        .unwrap();
        assert_eq!(layer, MatchLayer::Annotation);
        assert_eq!(score, 85.0);
    }

    #[test]
    fn test_fuzzy_layer() {
        // One edit away from an 8-scalar name: ratio 0.875 >= 0.7.
        let (score, layer) =
            score_name("hanlder1", "handler1", None, &weights(), false).unwrap();
        assert_eq!(layer, MatchLayer::Fuzzy);
        assert_eq!(score, 70.0);
    }

    #[test]
    fn test_stemming_layer() {
        let (score, layer) = score_name("indexing", "indexer", None, &weights(), false).unwrap();
        assert_eq!(layer, MatchLayer::Stemming);
        assert_eq!(score, 55.0);
    }

    #[test]
    fn test_name_split_layer() {
        // Under case-sensitive matching the substring layer misses
        // `Request`, but the case-folded name part still matches.
        let (score, layer) =
            score_name("request", "parseRequestFast", None, &weights(), true).unwrap();
        assert_eq!(layer, MatchLayer::NameSplit);
        assert_eq!(score, 40.0);
    }

    #[test]
    fn test_abbreviation_layer() {
        let (score, layer) =
            score_name("phr", "parse_http_request", None, &weights(), false).unwrap();
        assert_eq!(layer, MatchLayer::Abbreviation);
        assert_eq!(score, 25.0);
    }

    #[test]
    fn test_no_match() {
        assert!(score_name("zzz", "completely_different", None, &weights(), false).is_none());
    }

    #[test]
    fn test_layers_do_not_stack() {
        // "parse" is both a substring and a name part; only the higher
        // weight applies.
        let (score, layer) =
            score_name("parse", "parse_tree", None, &weights(), false).unwrap();
        assert_eq!(layer, MatchLayer::Substring);
        assert_eq!(score, 90.0);
    }

    #[test]
    fn test_split_name_camel_and_snake() {
        assert_eq!(split_name("parseHTTPRequest"), vec!["parse", "http", "request"]);
        assert_eq!(split_name("snake_case_name"), vec!["snake", "case", "name"]);
        assert_eq!(split_name("HTTPServer"), vec!["http", "server"]);
        assert_eq!(split_name("simple"), vec!["simple"]);
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("indexing"), "index");
        assert_eq!(stem("indexes"), "index");
        assert_eq!(stem("indexed"), "index");
        // Too short after stripping: unchanged.
        assert_eq!(stem("red"), "red");
    }

    #[test]
    fn test_ranking_adjustments() {
        let ranking = RankingConfig::default();
        assert_eq!(ranking_adjustment(FileCategory::Code, true, &ranking), 50.0);
        assert_eq!(
            ranking_adjustment(FileCategory::Documentation, true, &ranking),
            -20.0
        );
        assert_eq!(ranking_adjustment(FileCategory::Config, true, &ranking), 10.0);
        assert_eq!(ranking_adjustment(FileCategory::Code, false, &ranking), 20.0);

        let disabled = RankingConfig {
            enabled: false,
            ..RankingConfig::default()
        };
        assert_eq!(ranking_adjustment(FileCategory::Code, true, &disabled), 0.0);
    }
}
