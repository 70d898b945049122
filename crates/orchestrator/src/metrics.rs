//! Per-expert timing report.

use std::fmt::Write;

use cachelm_core::expert::Expert;
use cachelm_core::state::TurnState;

/// Render TTFT/latency lines in canonical order.
///
/// Returns `None` when no expert recorded a TTFT (stub mode).
pub fn render_metrics(state: &TurnState) -> Option<String> {
    if state.ttft_ms_by_expert.is_empty() {
        return None;
    }

    let mut out = String::from("metrics:");
    for expert in Expert::CANONICAL_ORDER {
        let Some(ttft) = state.ttft_ms_by_expert.get(&expert) else {
            continue;
        };
        let _ = write!(out, "\n- {expert}: ttft_ms={ttft:.1}");
        if let Some(latency) = state.latency_ms_by_expert.get(&expert) {
            let _ = write!(out, " latency_ms={latency:.1}");
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_ttft_renders_nothing() {
        let mut state = TurnState::new();
        state.latency_ms_by_expert.insert(Expert::SupportConcierge, 3.0);
        assert_eq!(render_metrics(&state), None);
    }

    #[test]
    fn lines_in_canonical_order() {
        let mut state = TurnState::new();
        state.ttft_ms_by_expert.insert(Expert::SupportConcierge, 12.34);
        state.ttft_ms_by_expert.insert(Expert::ComplianceAuditor, 5.0);
        state.latency_ms_by_expert.insert(Expert::ComplianceAuditor, 250.06);

        assert_eq!(
            render_metrics(&state).unwrap(),
            "metrics:\n- compliance_auditor: ttft_ms=5.0 latency_ms=250.1\n- support_concierge: ttft_ms=12.3"
        );
    }
}
