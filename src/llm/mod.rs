pub mod groq;
pub mod provider;
pub mod types;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::GenerationSettings;
use crate::errors::ApiError;

pub use groq::GroqProvider;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ChatRequest};

/// Memoized generation client, keyed by the settings it was built from.
/// Rebuilds only when credential, endpoint, or model change.
#[derive(Default)]
pub struct ProviderCache {
    cached: RwLock<Option<(GenerationSettings, Arc<GroqProvider>)>>,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_build(
        &self,
        settings: &GenerationSettings,
    ) -> Result<Arc<dyn LlmProvider>, ApiError> {
        {
            let cached = self.cached.read().await;
            if let Some((held_settings, provider)) = cached.as_ref() {
                if held_settings == settings {
                    return Ok(provider.clone());
                }
            }
        }

        let provider = Arc::new(GroqProvider::new(settings)?);
        let mut cached = self.cached.write().await;
        *cached = Some((settings.clone(), provider.clone()));
        Ok(provider)
    }
}
