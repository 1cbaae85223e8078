//! Scripted teams for exercising the pipeline without a model service

use futures_util::stream::{self, StreamExt};

use super::{AgentEvent, AgentEventStream, AgentMessage, AgentTeam, MessageUsage, TaskOutcome, TeamFactory};
use crate::ai::ModelClient;

/// Replays a fixed list of stream items for every run
#[derive(Clone)]
pub struct ScriptedTeamFactory {
    script: Vec<Result<AgentEvent, String>>,
}

impl ScriptedTeamFactory {
    pub fn new(script: Vec<Result<AgentEvent, String>>) -> Self {
        Self { script }
    }

    /// A user task, one reply from `source`, and a final result carrying `usage`
    pub fn single_reply(source: &str, reply: &str, usage: (u64, u64)) -> Self {
        let user = AgentMessage::text("user", "task");
        let answer = AgentMessage::text(source, reply).with_usage(MessageUsage {
            prompt_tokens: usage.0,
            completion_tokens: usage.1,
        });
        Self::new(vec![
            Ok(AgentEvent::Message(answer.clone())),
            Ok(AgentEvent::Final(TaskOutcome {
                messages: vec![user, answer],
                stop_reason: None,
            })),
        ])
    }
}

struct ScriptedTeam {
    script: Vec<Result<AgentEvent, String>>,
}

impl AgentTeam for ScriptedTeam {
    fn run_stream(&self, _task: &str) -> AgentEventStream {
        stream::iter(self.script.clone()).boxed()
    }
}

impl TeamFactory for ScriptedTeamFactory {
    fn build(&self, _client: ModelClient) -> Box<dyn AgentTeam> {
        Box::new(ScriptedTeam {
            script: self.script.clone(),
        })
    }
}
