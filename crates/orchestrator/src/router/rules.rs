//! Keyword routing.
//!
//! Matching is plain substring search on the lower-cased utterance, so
//! "bank" matches "ban". That is intentional and kept stable.

use cachelm_core::expert::{Expert, ExpertTask, RoutingDecision};

const COMPLIANCE_KEYWORDS: &[&str] = &[
    "policy",
    "compliance",
    "regulation",
    "regulatory",
    "allowed",
    "can i",
    "cannot",
    "can't",
    "must",
    "prohibited",
    "ban",
    "approve",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "api",
    "limit",
    "timeout",
    "error",
    "exception",
    "troubleshoot",
    "spec",
    "specification",
    "rate",
    "latency",
];

const SUPPORT_KEYWORDS: &[&str] = &[
    "how do i",
    "how to",
    "steps",
    "step-by-step",
    "step by step",
    "guide",
    "walk me through",
    "explain",
    "summarize",
];

/// Predicates in evaluation order.
const RULES: [(Expert, &[&str]); 3] = [
    (Expert::ComplianceAuditor, COMPLIANCE_KEYWORDS),
    (Expert::TechnicalSpecialist, TECHNICAL_KEYWORDS),
    (Expert::SupportConcierge, SUPPORT_KEYWORDS),
];

fn matches_any(text_lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text_lower.contains(k))
}

/// Route by keyword rules. Never fails; no match goes to the concierge.
pub fn route_by_rules(utterance: &str) -> RoutingDecision {
    let text_lower = utterance.to_lowercase();

    let mut experts: Vec<Expert> = Vec::new();
    for (expert, keywords) in RULES {
        if matches_any(&text_lower, keywords) && !experts.contains(&expert) {
            experts.push(expert);
        }
    }
    experts.truncate(RoutingDecision::MAX_TASKS);

    let tasks: Vec<ExpertTask> = experts
        .into_iter()
        .map(|expert| ExpertTask::new(expert, utterance))
        .collect();

    RoutingDecision::new(tasks)
        .unwrap_or_else(|| RoutingDecision::single(ExpertTask::new(Expert::SupportConcierge, utterance)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_limit_goes_to_technical() {
        let decision = route_by_rules("What is the API limit?");
        assert_eq!(decision.experts(), vec![Expert::TechnicalSpecialist]);
        assert_eq!(decision.tasks()[0].query, "What is the API limit?");
    }

    #[test]
    fn combined_question_uses_all_three_in_order() {
        let decision =
            route_by_rules("Can I do this under policy, what are the API limits, and summarize in steps?");
        assert_eq!(decision.experts(), Expert::CANONICAL_ORDER.to_vec());
    }

    #[test]
    fn no_match_falls_back_to_concierge() {
        let decision = route_by_rules("Hello there");
        assert_eq!(decision.experts(), vec![Expert::SupportConcierge]);
        assert_eq!(decision.tasks()[0].query, "Hello there");
    }

    #[test]
    fn empty_utterance_still_routes() {
        let decision = route_by_rules("");
        assert_eq!(decision.experts(), vec![Expert::SupportConcierge]);
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        assert_eq!(
            route_by_rules("Which BANK accounts?").experts(),
            vec![Expert::ComplianceAuditor]
        );
        assert_eq!(
            route_by_rules("Walk Me Through onboarding").experts(),
            vec![Expert::SupportConcierge]
        );
    }

    fn assert_canonical(input: &str, experts: &[Expert]) {
        assert!((1..=3).contains(&experts.len()), "{input:?} routed to {experts:?}");
        let mut sorted = experts.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, experts, "not canonical for {input:?}");
    }

    fn all_keywords() -> impl Iterator<Item = (Expert, &'static str)> {
        RULES
            .into_iter()
            .flat_map(|(expert, keywords)| keywords.iter().map(move |k| (expert, *k)))
    }

    #[test]
    fn every_keyword_routes_to_its_expert() {
        for (expert, keyword) in all_keywords() {
            let input = format!("tell me about {}", keyword.to_uppercase());
            let experts = route_by_rules(&input).experts();
            assert_canonical(&input, &experts);
            assert!(experts.contains(&expert), "{keyword:?} missed {expert}");
        }
    }

    #[test]
    fn every_keyword_pair_is_a_canonical_subsequence() {
        for (first_expert, first) in all_keywords() {
            for (second_expert, second) in all_keywords() {
                let input = format!("{first} and {second}");
                let decision = route_by_rules(&input);
                let experts = decision.experts();

                assert_canonical(&input, &experts);
                assert!(experts.contains(&first_expert), "{input:?}");
                assert!(experts.contains(&second_expert), "{input:?}");
                // No expert appears without one of its keywords present.
                for expert in &experts {
                    let (_, keywords) = RULES.iter().find(|(e, _)| e == expert).unwrap();
                    assert!(matches_any(&input.to_lowercase(), keywords), "{input:?}");
                }
                assert!(decision.tasks().iter().all(|t| t.query == input));
            }
        }
    }

    #[test]
    fn result_is_canonical_subsequence() {
        let inputs = [
            "explain the rate policy",
            "timeout error steps",
            "must I approve this exception?",
            "guide",
            "nothing relevant",
        ];
        for input in inputs {
            assert_canonical(input, &route_by_rules(input).experts());
        }
    }
}
