//! Model client implementations for cachelm.
//!
//! All providers implement the `cachelm_core::Provider` trait.
//! [`build_from_config`] constructs the client when a model-backed mode is
//! selected.

use std::sync::Arc;

use cachelm_config::{AppConfig, ConfigError};
use cachelm_core::Provider;

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

/// Build the model client from configuration.
///
/// Returns `Ok(None)` when neither the router nor the experts need a model.
/// A missing required setting is reported before any network call.
pub fn build_from_config(config: &AppConfig) -> Result<Option<Arc<dyn Provider>>, ConfigError> {
    if !config.needs_model() {
        return Ok(None);
    }

    let settings = config.llm_settings()?;
    let provider = OpenAiCompatProvider::from_settings(&settings)
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    tracing::debug!(
        provider = provider.name(),
        base_url = %settings.base_url,
        model = %settings.model,
        "Model client configured"
    );

    Ok(Some(Arc::new(provider)))
}
