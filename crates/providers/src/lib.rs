//! `asp-providers` - everything between a turn and the model gateway.
//!
//! - [`traits::LlmProvider`] is the generation seam; [`openai_compat`]
//!   implements it against OpenRouter's OpenAI-compatible API.
//! - [`registry::ModelRegistry`] holds per-model pricing, tier gates and
//!   fallback chains.
//! - [`health::FeatureHealthTracker`] is the per-capability circuit breaker.
//! - [`router::ModelRouter`] combines the two to pick the model a turn runs on.

pub mod errors;
pub mod health;
pub mod openai_compat;
pub mod registry;
pub mod router;
pub mod smart_router;
pub mod traits;
pub(crate) mod sse;
pub(crate) mod util;

// Re-exports for convenience.
pub use errors::ProviderErrorKind;
pub use health::{FeatureHealthTracker, HealthSnapshot, HealthStatus};
pub use openai_compat::OpenAiCompatProvider;
pub use registry::ModelRegistry;
pub use router::{ModelRouter, RouteError, RouteOutcome};
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
