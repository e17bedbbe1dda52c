//! Question answering over the analytical views: intent classification,
//! specialist agents, routing, and answer synthesis.
//!
//! The reasoning collaborator is reached through
//! [`vantage_core::reasoner::Reasoner`]; [`anthropic::AnthropicReasoner`] is
//! the production implementation.

pub mod agents;
pub mod anthropic;
pub mod classifier;
pub mod pipeline;
pub mod router;
pub mod synthesizer;

pub use agents::{Agent, AgentKind, AgentProfile, AgentRegistry, AgentTask};
pub use classifier::{Classifier, ClassifierSettings, RoutingTable};
pub use pipeline::{AskResponse, Pipeline, PipelineSettings, SchemaRefresh};
pub use router::{AgentResponses, AgentRouter, RouterSettings};
pub use synthesizer::{Synthesizer, SynthesizerSettings};

#[cfg(test)]
mod testing;
