//! Single-agent team backed directly by the model client
//!
//! Stands in for the external orchestration framework: the orchestrator answers
//! the task in one completion, and the run closes with a `Final` event carrying
//! the user and orchestrator messages.

use futures_util::stream::{self, StreamExt};
use std::sync::Arc;

use super::{AgentEvent, AgentEventStream, AgentMessage, AgentTeam, TaskOutcome, TeamFactory, USER_SOURCE};
use crate::ai::{Message, ModelClient};

pub const ORCHESTRATOR_SOURCE: &str = "MagenticOneOrchestrator";

const ORCHESTRATOR_PROMPT: &str = "You are the orchestrator of a team of agents. \
Work through the user's task step by step and reply with the final answer. \
Be explicit about any assumptions you make.";

pub struct CompletionTeam {
    client: Arc<ModelClient>,
}

impl CompletionTeam {
    pub fn new(client: ModelClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl AgentTeam for CompletionTeam {
    fn run_stream(&self, task: &str) -> AgentEventStream {
        let client = self.client.clone();
        let task = task.to_string();
        let user_message = AgentMessage::text(USER_SOURCE, task.clone());

        let head = stream::iter(vec![Ok(AgentEvent::Message(user_message.clone()))]);

        let tail = stream::once(async move {
            let completion = client
                .complete(vec![Message::system(ORCHESTRATOR_PROMPT), Message::user(task)])
                .await?;

            let reply = AgentMessage::text(ORCHESTRATOR_SOURCE, completion.content)
                .with_usage(completion.usage);

            Ok::<_, String>(vec![
                AgentEvent::Message(reply.clone()),
                AgentEvent::Final(TaskOutcome {
                    messages: vec![user_message, reply],
                    stop_reason: completion.finish_reason,
                }),
            ])
        })
        .flat_map(|result| {
            let items: Vec<Result<AgentEvent, String>> = match result {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        });

        head.chain(tail).boxed()
    }
}

/// Builds a [`CompletionTeam`] for every run
pub struct CompletionTeamFactory;

impl TeamFactory for CompletionTeamFactory {
    fn build(&self, client: ModelClient) -> Box<dyn AgentTeam> {
        Box::new(CompletionTeam::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ProviderSettings;
    use futures_util::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_stream_ends_with_final_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "42" }, "finish_reason": "stop" }],
                "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
            })))
            .mount(&server)
            .await;

        let settings = ProviderSettings {
            openai_api_key: Some("sk-test".to_string()),
            openai_endpoint: Some(server.uri()),
            ..Default::default()
        };
        let client = ModelClient::from_provider(&settings.provider_config(false, "gpt-4o")).unwrap();
        let team = CompletionTeamFactory.build(client);

        let events: Vec<AgentEvent> = team.run_stream("meaning of life").try_collect().await.unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], AgentEvent::Message(m) if m.source == USER_SOURCE));
        assert!(matches!(&events[1], AgentEvent::Message(m) if m.text.as_deref() == Some("42")));
        match &events[2] {
            AgentEvent::Final(outcome) => {
                assert_eq!(outcome.usage().prompt_tokens, 10);
                assert_eq!(outcome.usage().completion_tokens, 5);
            }
            other => panic!("expected final event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_model_failure_surfaces_after_user_message() {
        let client = ModelClient::from_provider(&ProviderSettings::default().provider_config(false, "gpt-4o")).unwrap();
        let team = CompletionTeam::new(client);

        let results: Vec<Result<AgentEvent, String>> = team.run_stream("task").collect().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().contains("OPEN_AI_API_KEY"));
    }
}
