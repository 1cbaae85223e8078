//! Background task queue for the JSON API
//!
//! `submit` stores a pending task and returns immediately; the run happens on
//! a spawned tokio task that moves the row through `running` to `completed`
//! or `failed`. Only this worker ever changes a task's status.

use parking_lot::Mutex;
use rusqlite::Result as SqliteResult;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::agents::{AgentEvent, MessageKind};
use crate::ai::ProviderSettings;
use crate::db::Database;
use crate::executor::{ExecutionOutput, TaskExecutor};
use crate::interactions::InteractionLog;
use crate::models::Task;

#[derive(Clone)]
pub struct TaskQueue {
    db: Arc<Database>,
    executor: Arc<TaskExecutor>,
    providers: ProviderSettings,
}

impl TaskQueue {
    pub fn new(db: Arc<Database>, executor: Arc<TaskExecutor>, providers: ProviderSettings) -> Self {
        Self { db, executor, providers }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Queue a prompt and start working on it in the background
    pub fn submit(&self, prompt: &str, model_name: &str, use_alternate_provider: bool) -> SqliteResult<Task> {
        let task = self.db.create_task(prompt, model_name, use_alternate_provider)?;
        log::info!("[TASKS] Queued task {} ({})", task.id, task.model_name);

        let queue = self.clone();
        let task_id = task.id.clone();
        tokio::spawn(async move {
            queue.process(&task_id).await;
        });

        Ok(task)
    }

    /// Run a pending task to a terminal state
    pub async fn process(&self, task_id: &str) {
        let task = match self.db.get_task(task_id) {
            Ok(Some(task)) => task,
            Ok(None) => {
                log::warn!("[TASKS] Task {} disappeared before it could run", task_id);
                return;
            }
            Err(e) => {
                log::error!("[TASKS] Failed to load task {}: {}", task_id, e);
                return;
            }
        };

        match self.db.mark_task_running(task_id) {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("[TASKS] Task {} is no longer pending, skipping", task_id);
                return;
            }
            Err(e) => {
                log::error!("[TASKS] Failed to start task {}: {}", task_id, e);
                return;
            }
        }

        let provider = self
            .providers
            .provider_config(task.use_alternate_provider, &task.model_name);
        let interactions = Mutex::new(InteractionLog::new());

        let outcome = self
            .executor
            .run(&task.prompt, &provider, &interactions, |interaction| {
                log::debug!("[TASKS] {} {}", task_id, interaction.agent_label);
            })
            .await;

        let stored = match outcome {
            Ok(output) => {
                log::info!(
                    "[TASKS] Task {} completed in {:.2}s",
                    task_id,
                    output.elapsed_seconds
                );
                self.db.complete_task(
                    task_id,
                    &structured_result(&output),
                    output.usage.prompt_tokens,
                    output.usage.completion_tokens,
                )
            }
            Err(failure) => {
                log::error!("[TASKS] Task {} failed: {}", task_id, failure);
                self.db.fail_task(task_id, &failure.to_string())
            }
        };

        if let Err(e) = stored {
            log::error!("[TASKS] Failed to record outcome of task {}: {}", task_id, e);
        }
    }
}

/// API result payload built from the final event's messages
pub fn structured_result(output: &ExecutionOutput) -> Value {
    let mut messages = Vec::new();
    let mut completed = false;

    for event in &output.events {
        let AgentEvent::Final(outcome) = event else {
            continue;
        };
        completed = true;

        for message in &outcome.messages {
            let mut entry = json!({
                "source": message.source,
                "content": message.text,
                "type": message.kind.type_name(),
            });
            if let Some(usage) = message.usage {
                entry["usage"] = json!({
                    "prompt_tokens": usage.prompt_tokens,
                    "completion_tokens": usage.completion_tokens,
                });
            }
            messages.push(entry);

            if message.kind == MessageKind::MultiModal {
                if let Some(image) = &message.image {
                    messages.push(json!({
                        "source": message.source,
                        "content": image,
                        "type": "base64_image",
                    }));
                }
            }
        }
    }

    json!({
        "messages": messages,
        "task_result": if completed { json!({ "status": "completed" }) } else { Value::Null },
        "execution_time": output.elapsed_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedTeamFactory;
    use crate::agents::{AgentMessage, MessageUsage, TaskOutcome};
    use crate::models::{TaskStatus, UsageTotals};

    fn queue(factory: ScriptedTeamFactory) -> TaskQueue {
        TaskQueue::new(
            Arc::new(Database::in_memory().unwrap()),
            Arc::new(TaskExecutor::new(Arc::new(factory))),
            ProviderSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_process_completes_task() {
        let queue = queue(ScriptedTeamFactory::single_reply("MagenticOneOrchestrator", "Hi!", (10, 5)));
        let task = queue.db().create_task("hello", "gpt-4o", true).unwrap();

        queue.process(&task.id).await;

        let done = queue.db().get_task(&task.id).unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.prompt_tokens, 10);
        assert_eq!(done.completion_tokens, 5);

        let result = done.result.unwrap();
        assert_eq!(result["task_result"]["status"], "completed");
        let messages = result["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["source"], "user");
        assert_eq!(messages[1]["content"], "Hi!");
        assert_eq!(messages[1]["type"], "TextMessage");
        assert_eq!(messages[1]["usage"]["prompt_tokens"], 10);
    }

    #[tokio::test]
    async fn test_process_records_failure() {
        let queue = queue(ScriptedTeamFactory::new(vec![Err("model overloaded".to_string())]));
        let task = queue.db().create_task("hello", "gpt-4o", true).unwrap();

        queue.process(&task.id).await;

        let failed = queue.db().get_task(&task.id).unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.result, Some(json!({ "error": "model overloaded" })));
    }

    #[tokio::test]
    async fn test_process_skips_non_pending_task() {
        let queue = queue(ScriptedTeamFactory::single_reply("Coder", "x", (1, 1)));
        let task = queue.db().create_task("hello", "gpt-4o", true).unwrap();
        queue.db().fail_task(&task.id, "cancelled").unwrap();

        queue.process(&task.id).await;

        let task = queue.db().get_task(&task.id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn test_multimodal_messages_emit_image_entry() {
        let output = ExecutionOutput {
            events: vec![AgentEvent::Final(TaskOutcome {
                messages: vec![
                    AgentMessage::multimodal("WebSurfer", Some("screenshot".to_string()), Some("aGk=".to_string()))
                        .with_usage(MessageUsage {
                            prompt_tokens: 3,
                            completion_tokens: 1,
                        }),
                ],
                stop_reason: None,
            })],
            usage: UsageTotals::new(3, 1),
            elapsed_seconds: 2.0,
        };

        let result = structured_result(&output);
        let messages = result["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["type"], "MultiModalMessage");
        assert_eq!(messages[0]["content"], "screenshot");
        assert_eq!(messages[1]["type"], "base64_image");
        assert_eq!(messages[1]["content"], "aGk=");
        assert!(messages[1].get("usage").is_none());
        assert_eq!(result["execution_time"], 2.0);
    }
}
