pub mod heuristic;
pub mod openai;

use crate::config::{AiConfig, AiProvider};
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub use heuristic::{CannedTextGenerator, TitleSplitExtractor};
pub use openai::OpenAiClient;

/// Artists named by an event, in listing order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtistExtraction {
    pub names: Vec<String>,
    pub is_music_event: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub model: String,
}

/// Pulls performer names out of an event's title and description
#[async_trait::async_trait]
pub trait ArtistExtractor: Send + Sync {
    async fn extract_artists(&self, title: &str, description: &str) -> Result<ArtistExtraction>;
}

#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}

fn openai_client(config: &AiConfig) -> Result<Option<OpenAiClient>> {
    if config.provider != AiProvider::OpenAi {
        return Ok(None);
    }
    match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => Ok(Some(OpenAiClient::new(
            key,
            &config.model,
            config.request_timeout_secs,
        )?)),
        None => {
            warn!("⚠️ ai.provider is openai but OPENAI_API_KEY is not set, using heuristics");
            Ok(None)
        }
    }
}

pub fn build_artist_extractor(config: &AiConfig) -> Result<Arc<dyn ArtistExtractor>> {
    let extractor: Arc<dyn ArtistExtractor> = match openai_client(config)? {
        Some(client) => {
            info!("Artist extraction via OpenAI model {}", config.model);
            Arc::new(client)
        }
        None => Arc::new(TitleSplitExtractor),
    };
    Ok(extractor)
}

pub fn build_text_generator(config: &AiConfig) -> Result<Arc<dyn TextGenerator>> {
    let generator: Arc<dyn TextGenerator> = match openai_client(config)? {
        Some(client) => Arc::new(client),
        None => Arc::new(CannedTextGenerator),
    };
    Ok(generator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_openai_without_key_falls_back() {
        let config = AiConfig {
            provider: AiProvider::OpenAi,
            api_key: None,
            ..AiConfig::default()
        };
        let extractor = build_artist_extractor(&config).unwrap();
        let found = extractor
            .extract_artists("Wet Leg & Sunflower Bean", "")
            .await
            .unwrap();
        assert_eq!(found.names, vec!["Wet Leg", "Sunflower Bean"]);
    }
}
