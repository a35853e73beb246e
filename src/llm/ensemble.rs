//! Consensus merge for multi-adapter analysis.
//!
//! Pure data reduction: no IO, no state. Narratives are concatenated with
//! source prefixes, suggestions and issues are de-duplicated on a
//! normalized key, and the derived confidence rewards cross-adapter
//! agreement.

use std::collections::HashMap;

use crate::llm::analysis::{AnalysisFinding, ConsensusFinding};

/// Confidence floor for any merged result.
const BASELINE_CONFIDENCE: f64 = 0.5;
/// Merged confidence never exceeds this, however strong the overlap.
const CONFIDENCE_CAP: f64 = 0.9;

/// Merge per-adapter findings into one consensus finding.
///
/// `findings` pairs each contributing adapter's name with its result.
/// Callers guarantee at least one entry; the interesting behavior starts
/// at two.
pub fn merge(findings: &[(String, AnalysisFinding)]) -> ConsensusFinding {
    let narrative = findings
        .iter()
        .map(|(provider, finding)| format!("[{provider}] {}", finding.narrative.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    // Count how many adapters produced each normalized key, keeping the
    // first occurrence of the underlying item.
    let mut suggestion_hits: HashMap<String, usize> = HashMap::new();
    let mut suggestions = Vec::new();
    let mut issue_hits: HashMap<String, usize> = HashMap::new();
    let mut issues = Vec::new();

    for (_, finding) in findings {
        for suggestion in &finding.suggestions {
            let key = normalized_key(&suggestion.kind, &suggestion.description);
            let hits = suggestion_hits.entry(key).or_insert(0);
            if *hits == 0 {
                suggestions.push(suggestion.clone());
            }
            *hits += 1;
        }
        for issue in &finding.issues {
            let key = normalized_key(&format!("{:?}", issue.severity), &issue.message);
            let hits = issue_hits.entry(key).or_insert(0);
            if *hits == 0 {
                issues.push(issue.clone());
            }
            *hits += 1;
        }
    }

    let unique = suggestion_hits.len() + issue_hits.len();
    let shared = suggestion_hits
        .values()
        .chain(issue_hits.values())
        .filter(|hits| **hits > 1)
        .count();

    let overlap = if unique == 0 {
        0.0
    } else {
        shared as f64 / unique as f64
    };
    let confidence = (BASELINE_CONFIDENCE + 0.4 * overlap).min(CONFIDENCE_CAP);

    ConsensusFinding {
        narrative,
        suggestions,
        issues,
        confidence,
        providers: findings.iter().map(|(p, _)| p.clone()).collect(),
    }
}

/// Normalized de-duplication key: kind/severity plus the first 50 chars
/// of the description, case-folded.
fn normalized_key(kind: &str, description: &str) -> String {
    let prefix: String = description.chars().take(50).collect();
    format!("{}|{}", kind.to_lowercase(), prefix.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::analysis::{Impact, Issue, Severity, Suggestion};

    fn suggestion(kind: &str, description: &str) -> Suggestion {
        Suggestion {
            kind: kind.to_string(),
            description: description.to_string(),
            confidence: 0.8,
            impact: Impact::Medium,
        }
    }

    fn issue(severity: Severity, message: &str) -> Issue {
        Issue {
            severity,
            message: message.to_string(),
            location: None,
        }
    }

    fn finding(narrative: &str, suggestions: Vec<Suggestion>, issues: Vec<Issue>) -> AnalysisFinding {
        AnalysisFinding {
            analysis_kind: None,
            narrative: narrative.to_string(),
            suggestions,
            issues,
        }
    }

    #[test]
    fn narratives_are_prefixed_by_source() {
        let merged = merge(&[
            ("openai".to_string(), finding("looks fine", vec![], vec![])),
            ("anthropic".to_string(), finding("one concern", vec![], vec![])),
        ]);
        assert!(merged.narrative.contains("[openai] looks fine"));
        assert!(merged.narrative.contains("[anthropic] one concern"));
    }

    #[test]
    fn duplicate_suggestions_collapse() {
        let merged = merge(&[
            (
                "openai".to_string(),
                finding("a", vec![suggestion("refactor", "Split the parser loop")], vec![]),
            ),
            (
                "anthropic".to_string(),
                finding("b", vec![suggestion("Refactor", "split the parser LOOP")], vec![]),
            ),
        ]);
        assert_eq!(merged.suggestions.len(), 1);
    }

    #[test]
    fn long_descriptions_dedupe_on_first_fifty_chars() {
        let base = "x".repeat(50);
        let merged = merge(&[
            (
                "openai".to_string(),
                finding("a", vec![suggestion("k", &format!("{base} tail one"))], vec![]),
            ),
            (
                "anthropic".to_string(),
                finding("b", vec![suggestion("k", &format!("{base} tail two"))], vec![]),
            ),
        ]);
        assert_eq!(merged.suggestions.len(), 1);
    }

    #[test]
    fn non_identical_results_get_baseline_confidence() {
        let merged = merge(&[
            (
                "openai".to_string(),
                finding("a", vec![suggestion("refactor", "one thing")], vec![]),
            ),
            (
                "anthropic".to_string(),
                finding("b", vec![suggestion("refactor", "another thing")], vec![]),
            ),
        ]);
        assert_eq!(merged.confidence, 0.5);
    }

    #[test]
    fn full_overlap_hits_the_cap() {
        let items = vec![suggestion("refactor", "same thing")];
        let merged = merge(&[
            ("openai".to_string(), finding("a", items.clone(), vec![])),
            ("anthropic".to_string(), finding("b", items, vec![])),
        ]);
        assert_eq!(merged.confidence, 0.9);
    }

    #[test]
    fn confidence_stays_inside_open_interval() {
        let merged = merge(&[
            (
                "openai".to_string(),
                finding(
                    "a",
                    vec![suggestion("k", "shared"), suggestion("k", "only mine")],
                    vec![issue(Severity::High, "shared issue")],
                ),
            ),
            (
                "anthropic".to_string(),
                finding(
                    "b",
                    vec![suggestion("k", "shared")],
                    vec![issue(Severity::High, "shared issue")],
                ),
            ),
        ]);
        assert!(merged.confidence > 0.0 && merged.confidence < 1.0);
        // 2 shared of 3 unique keys.
        assert!((merged.confidence - (0.5 + 0.4 * (2.0 / 3.0))).abs() < 1e-9);
    }

    #[test]
    fn issues_dedupe_on_severity_and_message() {
        let merged = merge(&[
            (
                "openai".to_string(),
                finding("a", vec![], vec![issue(Severity::High, "unchecked index")]),
            ),
            (
                "anthropic".to_string(),
                finding("b", vec![], vec![issue(Severity::Low, "unchecked index")]),
            ),
        ]);
        // Different severities are different findings.
        assert_eq!(merged.issues.len(), 2);
    }

    #[test]
    fn providers_are_recorded_in_order() {
        let merged = merge(&[
            ("openai".to_string(), finding("a", vec![], vec![])),
            ("local".to_string(), finding("b", vec![], vec![])),
        ]);
        assert_eq!(merged.providers, vec!["openai", "local"]);
    }
}
