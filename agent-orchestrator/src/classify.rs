use std::sync::Arc;
use std::time::Duration;

use common::utils::cache::SharedCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const CLASSIFY_CACHE_NAMESPACE: &str = "cache:classify:";
const CLASSIFY_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Factual,
    Analytical,
    Procedural,
    Conversational,
    Correction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub intent: IntentType,
    pub complexity: Complexity,
    pub confidence: f32,
    pub suggested_tools: Vec<String>,
    pub suggested_model: String,
}

const GREETINGS: &[&str] = &["hi", "hello", "hey", "thanks", "thank you", "ok", "okay", "bye", "goodbye"];
const META_PHRASES: &[&str] = &["summarize our chat", "what did we talk about", "what have we discussed"];
const CORRECTION_MARKERS: &[&str] = &["actually", "i meant", "not ", "correction:", "that's wrong", "to correct"];
const DOMAIN_TERMS: &[&str] = &[
    "revenue", "ebitda", "margin", "contract", "customer", "churn", "valuation", "liability",
    "covenant", "earnings", "cash flow", "multiple", "synergy", "working capital",
];
const QUANTIFIER_TERMS: &[&str] = &["compare", "trend", "growth", "ratio", "across", "over time", "quarter", "year"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Heuristic classification of the last user message, per §4.8's intent and
/// complexity rules. No LLM call: classification gates whether an LLM call
/// happens at all (retrieval, tool tier, model choice), so it has to be cheap.
pub fn classify(message: &str) -> Classification {
    let lower = message.trim().to_lowercase();
    let word_count = lower.split_whitespace().count();

    if contains_any(&lower, CORRECTION_MARKERS) {
        return Classification {
            intent: IntentType::Correction,
            complexity: Complexity::Medium,
            confidence: 0.75,
            suggested_tools: vec!["search_documents".into(), "get_finding".into()],
            suggested_model: "medium".into(),
        };
    }

    if word_count <= 4 && contains_any(&lower, GREETINGS) || contains_any(&lower, META_PHRASES) {
        return Classification {
            intent: IntentType::Conversational,
            complexity: Complexity::Simple,
            confidence: 0.9,
            suggested_tools: vec![],
            suggested_model: "simple".into(),
        };
    }

    let has_domain_term = contains_any(&lower, DOMAIN_TERMS);
    let has_quantifier = contains_any(&lower, QUANTIFIER_TERMS);

    if has_domain_term && has_quantifier {
        return Classification {
            intent: IntentType::Analytical,
            complexity: Complexity::Complex,
            confidence: 0.8,
            suggested_tools: vec!["financial_analysis".into(), "search_knowledge_graph".into()],
            suggested_model: "complex".into(),
        };
    }

    if lower.ends_with('?') || lower.starts_with("what") || lower.starts_with("who") || lower.starts_with("when") || lower.starts_with("where") {
        let complexity = if has_domain_term { Complexity::Medium } else { Complexity::Simple };
        return Classification {
            intent: IntentType::Factual,
            complexity,
            confidence: 0.7,
            suggested_tools: if has_domain_term {
                vec!["search_documents".into(), "search_knowledge_graph".into()]
            } else {
                vec![]
            },
            suggested_model: if has_domain_term { "medium".into() } else { "simple".into() },
        };
    }

    if lower.starts_with("how do") || lower.starts_with("how to") || lower.starts_with("walk me through") {
        return Classification {
            intent: IntentType::Procedural,
            complexity: Complexity::Medium,
            confidence: 0.65,
            suggested_tools: vec![],
            suggested_model: "medium".into(),
        };
    }

    Classification {
        intent: IntentType::Conversational,
        complexity: Complexity::Simple,
        confidence: 0.5,
        suggested_tools: vec![],
        suggested_model: "simple".into(),
    }
}

fn message_hash(message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Caches `classify` results by message hash so repeated or replayed turns
/// (e.g. the teacher's existing-AI-response replay path) skip reclassifying.
pub async fn classify_cached(message: &str, cache: &Arc<SharedCache>) -> Classification {
    let key = message_hash(message);

    if let Some(cached) = cache.get(CLASSIFY_CACHE_NAMESPACE, &key).await {
        if let Ok(classification) = serde_json::from_str(&cached) {
            return classification;
        }
    }

    let classification = classify(message);
    if let Ok(serialized) = serde_json::to_string(&classification) {
        cache.set(CLASSIFY_CACHE_NAMESPACE, &key, &serialized, CLASSIFY_CACHE_TTL).await;
    }
    classification
}

/// Skip patterns for the pre-model retrieval hook: factual/analytical intents
/// still skip retrieval when the message itself is meta-conversation.
pub fn skips_retrieval(message: &str, intent: IntentType) -> bool {
    if !matches!(intent, IntentType::Factual | IntentType::Analytical) {
        return true;
    }
    let lower = message.trim().to_lowercase();
    contains_any(&lower, META_PHRASES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_greeting_is_simple_conversational() {
        let c = classify("hey there");
        assert_eq!(c.intent, IntentType::Conversational);
        assert_eq!(c.complexity, Complexity::Simple);
    }

    #[test]
    fn domain_terms_with_quantifier_are_complex_analytical() {
        let c = classify("compare revenue growth across the last three quarters");
        assert_eq!(c.intent, IntentType::Analytical);
        assert_eq!(c.complexity, Complexity::Complex);
    }

    #[test]
    fn explicit_correction_marker_is_detected() {
        let c = classify("actually, the churn rate is 3.1%, not 4.2%");
        assert_eq!(c.intent, IntentType::Correction);
    }

    #[test]
    fn factual_question_without_domain_terms_is_simple() {
        let c = classify("what time is it?");
        assert_eq!(c.intent, IntentType::Factual);
        assert_eq!(c.complexity, Complexity::Simple);
    }

    #[test]
    fn factual_question_with_domain_terms_is_medium() {
        let c = classify("what was the customer churn rate last quarter?");
        assert_eq!(c.intent, IntentType::Factual);
        assert_eq!(c.complexity, Complexity::Medium);
    }

    #[test]
    fn meta_question_skips_retrieval_even_when_analytical() {
        assert!(skips_retrieval("can you summarize our chat", IntentType::Factual));
    }

    #[test]
    fn conversational_intent_always_skips_retrieval() {
        assert!(skips_retrieval("revenue grew, thanks", IntentType::Conversational));
    }

    #[tokio::test]
    async fn classify_cached_returns_same_result_on_second_call() {
        let cfg = common::utils::config::AppConfig::default();
        let cache = Arc::new(SharedCache::from_config(&cfg).await);

        let first = classify_cached("what was revenue last quarter?", &cache).await;
        let second = classify_cached("what was revenue last quarter?", &cache).await;
        assert_eq!(first.intent, second.intent);
        assert_eq!(first.complexity, second.complexity);
    }
}
