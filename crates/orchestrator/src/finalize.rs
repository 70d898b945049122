//! Merging expert outputs into the turn's response.

use cachelm_core::expert::Expert;
use cachelm_core::message::Message;
use cachelm_core::state::TurnState;

pub const EMPTY_RESPONSE: &str = "No expert produced an output.";

/// Join non-empty outputs in canonical order, independent of which expert
/// ran or finished first.
pub fn merge_outputs(state: &TurnState) -> String {
    let response = Expert::CANONICAL_ORDER
        .iter()
        .filter_map(|expert| state.expert_outputs.get(expert))
        .filter(|text| !text.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string();

    if response.is_empty() {
        EMPTY_RESPONSE.to_string()
    } else {
        response
    }
}

/// Write `response` and append it to the conversation.
pub fn finalize(state: &mut TurnState) {
    let response = merge_outputs(state);
    state.messages.push(Message::assistant(&response));
    state.response = response;
}
