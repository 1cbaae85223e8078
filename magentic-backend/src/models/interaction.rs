use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InteractionKind {
    Text,
    Image,
}

/// A display-oriented projection of one agent event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub agent_label: String,
    pub timestamp: DateTime<Local>,
    pub kind: InteractionKind,
    /// Markdown text, or a `data:` URI when `kind` is `Image`
    pub content: String,
}

impl Interaction {
    pub fn new(agent_label: impl Into<String>, content: impl Into<String>, kind: InteractionKind) -> Self {
        Self {
            agent_label: agent_label.into(),
            timestamp: Local::now(),
            kind,
            content: content.into(),
        }
    }

    /// Wall-clock time shown next to the agent label
    pub fn display_time(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}
