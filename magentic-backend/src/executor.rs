//! Task executor - drives one agent run to completion
//!
//! Each event from the team stream is classified, projected onto the session's
//! interaction log, forwarded to the live-display callback, and retained for
//! persistence. Failures are returned to the caller as-is: the executor never
//! retries and never swallows an error.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use crate::agents::{AgentEvent, AgentMessage, MessageKind, TeamFactory, format_source_display};
use crate::ai::{ModelClient, ProviderConfig};
use crate::interactions::InteractionLog;
use crate::models::{Interaction, InteractionKind, UsageTotals};

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Failed to create model client: {0}")]
    Client(String),
    #[error("{0}")]
    Stream(String),
}

/// A run that stopped on an error, with whatever it produced before failing
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    pub error: ExecutionError,
    pub events: Vec<AgentEvent>,
    pub elapsed_seconds: f64,
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    /// Every event in arrival order, including the final result
    pub events: Vec<AgentEvent>,
    pub usage: UsageTotals,
    pub elapsed_seconds: f64,
}

pub struct TaskExecutor {
    teams: Arc<dyn TeamFactory>,
}

impl TaskExecutor {
    pub fn new(teams: Arc<dyn TeamFactory>) -> Self {
        Self { teams }
    }

    /// Run `prompt` to completion.
    ///
    /// `log` receives one interaction per displayed event; `on_event` is called
    /// with each of them as soon as it is appended.
    pub async fn run<F>(
        &self,
        prompt: &str,
        provider: &ProviderConfig,
        log: &Mutex<InteractionLog>,
        mut on_event: F,
    ) -> Result<ExecutionOutput, RunFailure>
    where
        F: FnMut(&Interaction) + Send,
    {
        let start = Instant::now();
        let mut events = Vec::new();
        let mut usage = UsageTotals::default();

        log::info!(
            "[EXECUTOR] Starting run with {} model {}",
            provider.provider,
            provider.model_name
        );

        let client = ModelClient::from_provider(provider).map_err(|e| RunFailure {
            error: ExecutionError::Client(e),
            events: Vec::new(),
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })?;

        let team = self.teams.build(client);
        let mut stream = team.run_stream(prompt);

        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    log::error!("[EXECUTOR] Agent stream failed after {} events: {}", events.len(), e);
                    return Err(RunFailure {
                        error: ExecutionError::Stream(e),
                        events,
                        elapsed_seconds: start.elapsed().as_secs_f64(),
                    });
                }
            };

            match &event {
                AgentEvent::Message(message) => {
                    let interaction = {
                        let mut log = log.lock();
                        let (content, kind) = display_content(message);
                        log.append(format_source_display(&message.source), content, kind)
                            .clone()
                    };
                    on_event(&interaction);
                }
                AgentEvent::Final(outcome) => {
                    let outcome_usage = outcome.usage();
                    usage.add(outcome_usage.prompt_tokens, outcome_usage.completion_tokens);

                    let interaction = {
                        let mut log = log.lock();
                        log.add_completion(start.elapsed().as_secs_f64());
                        log.entries().last().cloned()
                    };
                    if let Some(interaction) = interaction {
                        on_event(&interaction);
                    }
                }
            }

            events.push(event);
        }

        let elapsed_seconds = start.elapsed().as_secs_f64();

        if !usage.is_zero() {
            let interaction = {
                let mut log = log.lock();
                log.add_usage_summary(usage.prompt_tokens, usage.completion_tokens, elapsed_seconds);
                log.entries().last().cloned()
            };
            if let Some(interaction) = interaction {
                on_event(&interaction);
            }
        }

        log::info!(
            "[EXECUTOR] Run finished in {:.2}s with {} events ({} prompt / {} completion tokens)",
            elapsed_seconds,
            events.len(),
            usage.prompt_tokens,
            usage.completion_tokens
        );

        Ok(ExecutionOutput {
            events,
            usage,
            elapsed_seconds,
        })
    }
}

/// Text or `data:` URI for one message, as shown in the interaction log
fn display_content(message: &AgentMessage) -> (String, InteractionKind) {
    match message.kind {
        MessageKind::Text => (message.text.clone().unwrap_or_default(), InteractionKind::Text),
        MessageKind::MultiModal => match message.image.as_deref() {
            Some(encoded) if BASE64.decode(encoded).is_ok_and(|bytes| !bytes.is_empty()) => (
                format!("data:image/png;base64,{}", encoded),
                InteractionKind::Image,
            ),
            Some(_) => ("🖼️ Image could not be decoded".to_string(), InteractionKind::Text),
            None => (
                message
                    .text
                    .clone()
                    .unwrap_or_else(|| "🖼️ No image content available".to_string()),
                InteractionKind::Text,
            ),
        },
    }
}
