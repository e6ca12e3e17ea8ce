//! AI opponent: suggestion service, retrying resolver and scripted fallback.

pub mod fallback;
pub mod gemini;
pub mod resolver;
pub mod service;

pub use resolver::{AiDecision, MoveResolver, MoveSource, ResolverConfig};
pub use service::{AiError, MoveSuggester};
