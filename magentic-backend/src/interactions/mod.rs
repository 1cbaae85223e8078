//! Session-scoped log of displayed agent interactions
//!
//! The log is append-only and renders in arrival order. It is cleared at the
//! start of every run, never at process start.

use crate::models::{Interaction, InteractionKind};

pub const SYSTEM_LABEL: &str = "✅ System";
pub const ANALYTICS_LABEL: &str = "📊 System Analytics";

/// Display target for interactions (HTML page, log output, test buffer)
pub trait InteractionSink {
    fn show(&mut self, interaction: &Interaction);
}

#[derive(Debug, Default)]
pub struct InteractionLog {
    entries: Vec<Interaction>,
    completed: bool,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        agent_label: impl Into<String>,
        content: impl Into<String>,
        kind: InteractionKind,
    ) -> &Interaction {
        self.entries.push(Interaction::new(agent_label, content, kind));
        &self.entries[self.entries.len() - 1]
    }

    /// Record that the task finished and how long it took
    pub fn add_completion(&mut self, elapsed_seconds: f64) {
        self.append(
            SYSTEM_LABEL,
            format!("Task completed in {:.2} seconds", elapsed_seconds),
            InteractionKind::Text,
        );
        self.completed = true;
    }

    /// Append a token usage summary; skipped when no tokens were used
    pub fn add_usage_summary(&mut self, prompt_tokens: u64, completion_tokens: u64, elapsed_seconds: f64) {
        if prompt_tokens == 0 && completion_tokens == 0 {
            return;
        }

        let summary = format!(
            "**📊 Token Usage Summary:**\n\
             - **Prompt Tokens:** {}\n\
             - **Completion Tokens:** {}\n\
             - **Total Tokens:** {}\n\
             - **Elapsed Time:** {:.2} seconds",
            with_thousands(prompt_tokens),
            with_thousands(completion_tokens),
            with_thousands(prompt_tokens + completion_tokens),
            elapsed_seconds
        );
        self.append(ANALYTICS_LABEL, summary, InteractionKind::Text);
    }

    pub fn render(&self, sink: &mut dyn InteractionSink) {
        for interaction in &self.entries {
            sink.show(interaction);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.completed = false;
    }

    pub fn entries(&self) -> &[Interaction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

/// Format an integer with comma thousands separators
pub fn with_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
