//! Named agents reachable over HTTP.
//!
//! An [`Agent`] answers a free-form prompt, either whole or as a stream
//! of [`DeliveryEvent`]s. The [`AgentRegistry`] maps the `agent_id` path
//! segment of `/agents/{agent_id}/...` to an implementation.
//!
//! | Agent | Behavior |
//! |-------|----------|
//! | `product` | [`ProductAgent`]: runs the product workflow with the prompt as query |
//!
//! Request `meta` may carry `tone`, `language` and `limit`; anything else
//! in it is ignored.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::delivery::DeliveryEvent;
use crate::error::RagError;
use crate::models::WorkflowInput;
use crate::workflow::ProductWorkflow;

/// A prompt-answering agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// URL-safe identifier, e.g. `"product"`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Answer `prompt` in one piece.
    async fn generate(&self, prompt: &str, meta: &Value) -> Result<String>;

    /// Answer `prompt` as a stream.
    ///
    /// Errors returned here happen before the first event; failures after
    /// that arrive in-band as [`DeliveryEvent::Error`].
    async fn stream(&self, prompt: &str, meta: &Value) -> Result<mpsc::Receiver<DeliveryEvent>>;
}

/// Discovery entry for `GET /agents`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
}

pub struct AgentRegistry {
    agents: Vec<Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self { agents: Vec::new() }
    }

    /// Registry holding the built-in `product` agent.
    pub fn with_product(workflow: Arc<ProductWorkflow>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ProductAgent::new(workflow)));
        registry
    }

    /// Register an agent. A later registration with the same name wins.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.retain(|a| a.name() != agent.name());
        self.agents.push(agent);
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.iter().find(|a| a.name() == name).cloned()
    }

    /// Like [`find`](Self::find), failing with [`RagError::UnknownAgent`].
    pub fn get(&self, name: &str) -> Result<Arc<dyn Agent>, RagError> {
        self.find(name)
            .ok_or_else(|| RagError::UnknownAgent(name.to_string()))
    }

    pub fn list(&self) -> Vec<AgentInfo> {
        self.agents
            .iter()
            .map(|a| AgentInfo {
                name: a.name().to_string(),
                description: a.description().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Product question answering over the indexed docs.
pub struct ProductAgent {
    workflow: Arc<ProductWorkflow>,
}

impl ProductAgent {
    pub fn new(workflow: Arc<ProductWorkflow>) -> Self {
        Self { workflow }
    }
}

/// Build workflow input from a prompt and optional `meta` overrides.
pub fn workflow_input(prompt: &str, meta: &Value) -> Result<WorkflowInput, RagError> {
    let mut input = WorkflowInput::new(prompt);

    let Some(obj) = meta.as_object() else {
        return Ok(input);
    };

    if let Some(tone) = obj.get("tone").filter(|v| !v.is_null()) {
        let tone = tone
            .as_str()
            .ok_or_else(|| RagError::invalid("meta.tone must be a string"))?;
        input = input.with_tone(tone.parse()?);
    }
    if let Some(language) = obj.get("language").filter(|v| !v.is_null()) {
        let language = language
            .as_str()
            .ok_or_else(|| RagError::invalid("meta.language must be a string"))?;
        input = input.with_language(language.parse()?);
    }
    if let Some(limit) = obj.get("limit").filter(|v| !v.is_null()) {
        let limit = limit
            .as_u64()
            .ok_or_else(|| RagError::invalid("meta.limit must be a positive integer"))?;
        input = input.with_limit(limit as usize);
    }

    Ok(input)
}

#[async_trait]
impl Agent for ProductAgent {
    fn name(&self) -> &str {
        "product"
    }

    fn description(&self) -> &str {
        "Answers product questions from the indexed product documentation"
    }

    async fn generate(&self, prompt: &str, meta: &Value) -> Result<String> {
        let input = workflow_input(prompt, meta)?;
        Ok(self.workflow.run(input).await?.answer)
    }

    async fn stream(&self, prompt: &str, meta: &Value) -> Result<mpsc::Receiver<DeliveryEvent>> {
        let input = workflow_input(prompt, meta)?;
        Ok(self.workflow.run_streaming(input).await?.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, Tone};
    use serde_json::json;

    #[test]
    fn test_meta_defaults() {
        let input = workflow_input("laptop", &Value::Null).unwrap();
        assert_eq!(input.query, "laptop");
        assert_eq!(input.limit, 5);
        assert_eq!(input.tone, Tone::Helpful);
        assert_eq!(input.language, Language::Id);
    }

    #[test]
    fn test_meta_overrides() {
        let meta = json!({"tone": "neutral", "language": "en", "limit": 3, "chatId": "abc"});
        let input = workflow_input("laptop", &meta).unwrap();
        assert_eq!(input.tone, Tone::Neutral);
        assert_eq!(input.language, Language::En);
        assert_eq!(input.limit, 3);
    }

    #[test]
    fn test_meta_bad_values() {
        assert!(workflow_input("q", &json!({"tone": "angry"})).is_err());
        assert!(workflow_input("q", &json!({"language": 7})).is_err());
        assert!(workflow_input("q", &json!({"limit": -1})).is_err());
    }
}
