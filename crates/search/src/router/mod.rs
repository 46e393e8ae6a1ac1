//! Query routing
//!
//! Evaluates a declarative table of keyword rules against the question.
//! Composition is additive: every matching rule appends its suffix (table
//! order, empty and repeated suffixes skipped) and `k` is the maximum of the
//! default and every matched rule's ceiling.

use docqa_common::config::{RouteRule, RoutingConfig};
use serde::Serialize;
use tracing::debug;

/// Outcome of classifying a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutedQuery {
    /// Query text sent to the retriever
    pub query: String,

    /// Retrieval depth
    pub k: usize,

    /// Names of the rules that fired, in table order
    pub matched: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct QueryRouter {
    default_k: usize,
    rules: Vec<RouteRule>,
}

impl QueryRouter {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            default_k: config.default_k,
            rules: config
                .rules
                .iter()
                .map(|rule| RouteRule {
                    triggers: rule.triggers.iter().map(|t| t.to_lowercase()).collect(),
                    ..rule.clone()
                })
                .collect(),
        }
    }

    /// Rewrite the question and choose retrieval depth
    pub fn classify(&self, question: &str) -> RoutedQuery {
        let lowered = question.to_lowercase();
        let mut query = question.trim().to_string();
        let mut k = self.default_k;
        let mut matched = Vec::new();
        let mut suffixes: Vec<&str> = Vec::new();

        for rule in &self.rules {
            if !rule.triggers.iter().any(|t| !t.is_empty() && lowered.contains(t.as_str())) {
                continue;
            }
            matched.push(rule.name.clone());
            k = k.max(rule.k);

            let suffix = rule.query_suffix.trim();
            if !suffix.is_empty() && !suffixes.contains(&suffix) {
                suffixes.push(suffix);
                query.push(' ');
                query.push_str(suffix);
            }
        }

        debug!(k = k, matched = ?matched, "Query routed");

        RoutedQuery { query, k, matched }
    }
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new(&RoutingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gst_question_gets_tax_rewrite() {
        let router = QueryRouter::default();
        let routed = router.classify("Explain GST return filing");

        assert!(routed.query.starts_with("Explain GST return filing"));
        assert!(routed.query.contains("GST goods and services tax returns filing GSTR tax ledger"));
        assert!(routed.k >= 35);
        assert_eq!(routed.matched, vec!["tax"]);
    }

    #[test]
    fn test_no_match_uses_default_k() {
        let router = QueryRouter::default();
        let routed = router.classify("How do I reconcile my bank statement?");
        assert_eq!(routed.query, "How do I reconcile my bank statement?");
        assert_eq!(routed.k, 15);
        assert!(routed.matched.is_empty());
    }

    #[test]
    fn test_rules_compose_additively() {
        let router = QueryRouter::default();
        let routed = router.classify("Complete guide to GST on stock transfers");

        assert_eq!(routed.matched, vec!["tax", "inventory", "complete"]);
        assert_eq!(routed.k, 35);
        let tax = routed.query.find("GST goods").unwrap();
        let stock = routed.query.find("stock item inventory").unwrap();
        assert!(tax < stock);
    }

    #[test]
    fn test_complete_only_raises_k() {
        let router = QueryRouter::default();
        let routed = router.classify("Give me the FULL list of reports");
        assert_eq!(routed.query, "Give me the FULL list of reports");
        assert_eq!(routed.k, 30);
    }

    #[test]
    fn test_duplicate_suffixes_are_skipped_and_triggers_case_folded() {
        let config = RoutingConfig {
            default_k: 10,
            rules: vec![
                RouteRule {
                    name: "a".into(),
                    triggers: vec!["Ledger".into()],
                    query_suffix: "accounts ledger".into(),
                    k: 20,
                },
                RouteRule {
                    name: "b".into(),
                    triggers: vec!["group".into()],
                    query_suffix: "accounts ledger".into(),
                    k: 12,
                },
            ],
        };
        let router = QueryRouter::new(&config);
        let routed = router.classify("ledger GROUP setup");
        assert_eq!(routed.query, "ledger GROUP setup accounts ledger");
        assert_eq!(routed.k, 20);
        assert_eq!(routed.matched.len(), 2);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let router = QueryRouter::default();
        let q = "How to set user permissions and TallyVault password";
        assert_eq!(router.classify(q), router.classify(q));
        assert_eq!(router.classify(q).matched, vec!["security"]);
    }
}
