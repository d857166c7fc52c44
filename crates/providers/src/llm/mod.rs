//! LLM provider seam for call analysis.

pub mod anthropic;

use async_trait::async_trait;

use cs_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single-turn analysis request: one system message, one user message.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub system: String,
    pub user: String,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
    /// Model identifier override. `None` uses the provider's default.
    pub model: Option<String>,
}

/// Token usage as reported by the provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct AnalysisResponse {
    /// Textual content of the response; expected to be JSON, possibly
    /// fence-wrapped.
    pub content: String,
    pub usage: Usage,
    /// The model that actually produced the response.
    pub model: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every LLM adapter implements. The call is synchronous from the
/// pipeline's point of view: no streaming, no internal retry. A failed or
/// timed-out call surfaces as an error and the caller records it.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn analyze(&self, req: AnalysisRequest) -> Result<AnalysisResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
