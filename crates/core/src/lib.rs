//! Negotiation practice engine.
//!
//! Guides a learner through a timeline of exercises, runs simulated
//! negotiations against a counterpart with a private coach alongside, and
//! adapts upcoming content to the learner's grades. Text generation and
//! storage are collaborators behind the [`llm_client::TextGenerator`] and
//! [`store::SessionStore`] traits.

pub mod agreement;
pub mod briefing;
pub mod catalog;
pub mod coach;
pub mod content;
pub mod conversation;
pub mod counterpart;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod llm_client;
pub mod model;
pub mod orchestrator;
pub mod performance;
pub mod prompts;
pub mod store;
pub mod timeline;

pub use engine::PracticeEngine;
pub use error::{EngineError, EngineResult};
pub use orchestrator::TurnOutcome;
