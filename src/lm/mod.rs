//! Model query seam.
//!
//! The pipeline only sees [`ModelQuery`]: a synchronous, fallible
//! `prompt -> answer` call. Timeouts and retries belong to the backends here,
//! never to the pipeline.
//!
//! Two backends are provided:
//! - [`OpenAiClient`]: OpenAI-compatible chat completions over HTTP.
//! - [`CommandClient`]: any local command that reads the prompt on stdin and
//!   prints the answer on stdout (e.g. `llm`, `ollama run <model>`).

pub(crate) mod command;
mod openai;

pub use command::CommandClient;
pub use openai::OpenAiClient;

use crate::config::ModelConfig;
use anyhow::Result;

/// A synchronous model call.
pub trait ModelQuery: Send + Sync {
    fn query(&self, prompt: &str) -> Result<String>;
}

impl<F> ModelQuery for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn query(&self, prompt: &str) -> Result<String> {
        self(prompt)
    }
}

/// Construct the configured backend.
pub fn build_model(config: &ModelConfig) -> Result<Box<dyn ModelQuery>> {
    match config {
        ModelConfig::OpenAi(openai) => Ok(Box::new(OpenAiClient::new(openai)?)),
        ModelConfig::Command(command) => Ok(Box::new(CommandClient::new(&command.command)?)),
    }
}
