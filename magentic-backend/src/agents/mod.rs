//! Boundary with the external multi-agent framework
//!
//! The orchestration engine is consumed as an opaque producer of
//! [`AgentEvent`]s. A run yields zero or more [`AgentEvent::Message`]s followed
//! by exactly one [`AgentEvent::Final`], then the stream ends.
//!
//! Only the task executor matches on these events; everything downstream works
//! with interactions and run records.

pub mod completion_team;
pub mod formatter;
#[cfg(test)]
pub(crate) mod testing;

pub use completion_team::{CompletionTeam, CompletionTeamFactory};
pub use formatter::format_source_display;

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::ai::ModelClient;
use crate::models::UsageTotals;

/// Source identifier of messages authored by the end user
pub const USER_SOURCE: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    MultiModal,
}

impl MessageKind {
    /// Message type name used in persisted and API payloads
    pub fn type_name(&self) -> &'static str {
        match self {
            MessageKind::Text => "TextMessage",
            MessageKind::MultiModal => "MultiModalMessage",
        }
    }
}

/// Model usage attributed to a single message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub source: String,
    pub kind: MessageKind,
    pub text: Option<String>,
    /// Base64-encoded PNG, as produced by the framework for multimodal messages
    pub image: Option<String>,
    pub usage: Option<MessageUsage>,
}

impl AgentMessage {
    pub fn text(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: MessageKind::Text,
            text: Some(text.into()),
            image: None,
            usage: None,
        }
    }

    pub fn multimodal(source: impl Into<String>, caption: Option<String>, image: Option<String>) -> Self {
        Self {
            source: source.into(),
            kind: MessageKind::MultiModal,
            text: caption,
            image,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: MessageUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn is_from_user(&self) -> bool {
        self.source == USER_SOURCE
    }
}

/// Terminal event of a run, carrying every message with its usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub messages: Vec<AgentMessage>,
    pub stop_reason: Option<String>,
}

impl TaskOutcome {
    /// Usage summed over all messages not authored by the user
    pub fn usage(&self) -> UsageTotals {
        let mut totals = UsageTotals::default();
        for usage in self
            .messages
            .iter()
            .filter(|m| !m.is_from_user())
            .filter_map(|m| m.usage)
        {
            totals.add(usage.prompt_tokens, usage.completion_tokens);
        }
        totals
    }
}

#[derive(Debug, Clone)]
pub enum AgentEvent {
    Message(AgentMessage),
    Final(TaskOutcome),
}

impl AgentEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, AgentEvent::Final(_))
    }
}

pub type AgentEventStream = BoxStream<'static, Result<AgentEvent, String>>;

/// A team of agents able to work on a task
pub trait AgentTeam: Send + Sync {
    fn run_stream(&self, task: &str) -> AgentEventStream;
}

/// Builds a team around a model client configured for one run
pub trait TeamFactory: Send + Sync {
    fn build(&self, client: ModelClient) -> Box<dyn AgentTeam>;
}
