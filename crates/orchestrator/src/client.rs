//! A provider bound to the request settings it should be called with.

use std::sync::Arc;

use cachelm_config::LlmSettings;
use cachelm_core::message::Message;
use cachelm_core::provider::{Provider, ProviderRequest};

/// Provider plus model name, temperature and token cap.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ModelClient {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }

    pub fn from_settings(provider: Arc<dyn Provider>, settings: &LlmSettings) -> Self {
        Self::new(provider, &settings.model, settings.temperature, settings.max_tokens)
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// A non-streaming request with the configured settings.
    pub fn request(&self, messages: Vec<Message>) -> ProviderRequest {
        ProviderRequest::new(&self.model, messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}

impl std::fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}
