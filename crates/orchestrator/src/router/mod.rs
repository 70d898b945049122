//! Routing — which experts answer the current utterance.
//!
//! Two strategies:
//!
//! 1. **Rules** — keyword predicates, always succeeds
//! 2. **Model** — asks the routing model; any failure falls back to rules
//!
//! Either way the turn gets a non-empty [`RoutingDecision`].

pub mod model;
pub mod rules;

use cachelm_core::expert::RoutingDecision;
use cachelm_core::message::Message;
use tracing::{debug, warn};

pub use model::{ModelRouter, parse_routing_json};
pub use rules::route_by_rules;

/// The configured routing strategy.
#[derive(Debug, Clone)]
pub enum Router {
    Rules,
    Model(ModelRouter),
}

impl Router {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Model(_) => "llm",
        }
    }

    /// Decide the experts for `utterance`. Never fails.
    pub async fn route(&self, utterance: &str, history: &[Message]) -> RoutingDecision {
        let decision = match self {
            Self::Rules => route_by_rules(utterance),
            Self::Model(router) => match router.route(utterance, history).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(error = %e, "Model routing failed, falling back to rules");
                    route_by_rules(utterance)
                }
            },
        };

        debug!(
            router = self.name(),
            experts = ?decision.experts(),
            "Routing decision"
        );
        decision
    }
}
