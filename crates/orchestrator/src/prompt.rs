//! Prompt assembly.
//!
//! Every expert prompt starts with the same system prefix (instructions plus
//! the full manual) so providers can reuse a cached prompt prefix across
//! experts and turns. Only the expert suffix and the conversation vary.

use cachelm_core::expert::Expert;
use cachelm_core::message::{Message, Role};
use cachelm_core::state::PromptFingerprint;

use crate::manual::{ReferenceDocument, sha256_hex};

pub const GLOBAL_SYSTEM_INSTRUCTIONS: &str = "You are an internal bank assistant. Answer using only the provided manual when possible. If the manual does not contain the answer, say so explicitly.";

pub const MANUAL_BEGIN: &str = "===== BEGIN INTERNAL OPERATIONS & COMPLIANCE MANUAL =====";
pub const MANUAL_END: &str = "===== END INTERNAL OPERATIONS & COMPLIANCE MANUAL =====";

/// The shared system prefix for a manual.
pub fn system_prefix(manual_text: &str) -> String {
    [GLOBAL_SYSTEM_INSTRUCTIONS, MANUAL_BEGIN, manual_text, MANUAL_END].join("\n\n")
}

/// Hashes exposed in the turn state instead of the prefix itself.
pub fn fingerprint(document: &ReferenceDocument) -> PromptFingerprint {
    PromptFingerprint {
        manual_sha256: document.sha256.clone(),
        system_prefix_hash: sha256_hex(system_prefix(&document.text).as_bytes()),
    }
}

/// Role instructions appended after the shared prefix.
pub fn expert_suffix(expert: Expert) -> &'static str {
    match expert {
        Expert::TechnicalSpecialist => {
            "You are the Technical Specialist. Extract system specifications, API limits, and troubleshooting steps from the manual. Be precise and cite section names or headings when applicable."
        }
        Expert::ComplianceAuditor => {
            "You are the Compliance Auditor. Interpret regulatory rules and 'Can/Cannot' constraints from the manual. Be strict about policy boundaries and clearly state what is allowed vs. disallowed."
        }
        Expert::SupportConcierge => {
            "You are the Support Concierge. Summarize complex procedures into clear, step-by-step guides for non-technical staff. Prefer numbered steps."
        }
    }
}

/// Conversation history an expert should see for `query`.
///
/// The current utterance is already the final prompt message, so a trailing
/// user message equal to the query is dropped. System messages never pass.
pub fn expert_history<'a>(messages: &'a [Message], query: &str) -> Vec<&'a Message> {
    let history = match messages.split_last() {
        Some((last, rest)) if last.role == Role::User && last.content == query => rest,
        _ => messages,
    };
    history.iter().filter(|m| m.role != Role::System).collect()
}

/// Full prompt: prefix, suffix, history, then the query as a user message.
pub fn build_messages(
    expert: Expert,
    document: &ReferenceDocument,
    history: &[Message],
    query: &str,
) -> Vec<Message> {
    let mut messages = vec![
        Message::system(system_prefix(&document.text)),
        Message::system(expert_suffix(expert)),
    ];
    messages.extend(expert_history(history, query).into_iter().cloned());
    messages.push(Message::user(query));
    messages
}
