//! LLM backends behind the single `LlmClient` capability.

pub mod gemini;
pub mod openrouter;

use crate::domain::ports::LlmClient;
use anyhow::{Result, anyhow};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

pub use gemini::GeminiClient;
pub use openrouter::OpenRouterClient;

/// Which backend to use. `Auto` prefers whichever credential is configured,
/// OpenRouter first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProviderChoice {
    #[default]
    Auto,
    OpenRouter,
    Gemini,
}

impl FromStr for LlmProviderChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(LlmProviderChoice::Auto),
            "openrouter" => Ok(LlmProviderChoice::OpenRouter),
            "gemini" => Ok(LlmProviderChoice::Gemini),
            _ => Err(anyhow!(
                "Invalid LLM provider: '{}'. Must be 'auto', 'openrouter' or 'gemini'",
                s
            )),
        }
    }
}

/// Builds the configured client from `OPENROUTER_API_KEY` / `GEMINI_API_KEY`
pub fn client_from_env(choice: LlmProviderChoice) -> Result<Arc<dyn LlmClient>> {
    let openrouter_key = env::var("OPENROUTER_API_KEY").ok().filter(|k| !k.is_empty());
    let gemini_key = env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());

    let client: Arc<dyn LlmClient> = match choice {
        LlmProviderChoice::OpenRouter => Arc::new(OpenRouterClient::new(
            openrouter_key.ok_or_else(|| anyhow!("OPENROUTER_API_KEY not set"))?,
        )),
        LlmProviderChoice::Gemini => Arc::new(GeminiClient::new(
            gemini_key.ok_or_else(|| anyhow!("GEMINI_API_KEY not set"))?,
        )),
        LlmProviderChoice::Auto => {
            if let Some(key) = openrouter_key {
                Arc::new(OpenRouterClient::new(key))
            } else if let Some(key) = gemini_key {
                Arc::new(GeminiClient::new(key))
            } else {
                return Err(anyhow!(
                    "no LLM credential configured; set OPENROUTER_API_KEY or GEMINI_API_KEY"
                ));
            }
        }
    };

    info!("LLM backend ready: {}", client.model_name());
    Ok(client)
}
