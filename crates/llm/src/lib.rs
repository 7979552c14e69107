pub mod mock;
pub mod ollama;
pub mod traits;

pub use mock::MockLlm;
pub use ollama::OllamaLlm;
pub use traits::ApplicationLlm;

use sa_domain::config::LlmConfig;
use std::sync::Arc;

/// Build the configured backend. Unknown providers fall back to the mock —
/// `doctor` surfaces that fallback as a warning rather than a hard failure.
pub fn build_provider(cfg: &LlmConfig) -> Arc<dyn ApplicationLlm> {
    match cfg.provider.as_str() {
        "ollama" | "openai_compat" => {
            let base_url = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            let model = cfg.model.clone().unwrap_or_else(|| "llama3".to_string());
            Arc::new(OllamaLlm::new(base_url, model, cfg.timeout_ms))
        }
        other => {
            if other != "mock" {
                tracing::warn!(provider = other, "unknown LLM provider, falling back to mock");
            }
            Arc::new(MockLlm)
        }
    }
}
