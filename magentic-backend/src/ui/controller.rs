//! Run orchestration for the interactive UI
//!
//! One submitted prompt becomes one run: fresh run id, cleared log, executor
//! run with live updates into the session log, then (when persistence is on)
//! serialization and storage.

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::session::SessionContext;
use crate::agents::AgentEvent;
use crate::ai::{DEFAULT_MODEL, ProviderSettings};
use crate::config::Config;
use crate::executor::TaskExecutor;
use crate::models::{RunMetadata, RunRecord, UsageTotals};
use crate::storage::{ResultSerializer, StorageManager, StoreOutcome};

/// Settings chosen on the main page
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub prompt: String,
    pub use_alternate_provider: bool,
    pub model_name: String,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            use_alternate_provider: true,
            model_name: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub model_name: String,
    pub usage: UsageTotals,
    pub elapsed_seconds: f64,
    /// Raw error message when the run failed
    pub error: Option<String>,
    pub storage: StoreOutcome,
    /// Link to the stored run, only when it was persisted
    pub share_url: Option<String>,
}

/// A persisted run with the images it references
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub record: RunRecord,
    /// Downloaded image bytes keyed by blob URL
    pub images: HashMap<String, Vec<u8>>,
}

pub struct UiController {
    executor: Arc<TaskExecutor>,
    storage: Arc<StorageManager>,
    serializer: ResultSerializer,
    providers: ProviderSettings,
    config: Config,
}

impl UiController {
    pub fn new(
        executor: Arc<TaskExecutor>,
        storage: Arc<StorageManager>,
        serializer: ResultSerializer,
        config: Config,
    ) -> Self {
        Self {
            executor,
            storage,
            serializer,
            providers: config.providers.clone(),
            config,
        }
    }

    pub fn storage_enabled(&self) -> bool {
        self.storage.is_enabled()
    }

    /// Run one prompt for `session`. The caller holds the session's run guard.
    pub async fn execute(&self, session: &SessionContext, request: &RunRequest) -> RunReport {
        let run_id = Uuid::new_v4();
        session.interactions().lock().clear();

        let provider = self
            .providers
            .provider_config(request.use_alternate_provider, &request.model_name);
        log::info!("[UI] Run {} started ({} / {})", run_id, provider.provider, provider.model_name);

        let result = self
            .executor
            .run(&request.prompt, &provider, session.interactions(), |interaction| {
                log::debug!("[UI] {} {}", run_id, interaction.agent_label);
            })
            .await;

        let (events, usage, elapsed_seconds, error) = match result {
            Ok(output) => (output.events, output.usage, output.elapsed_seconds, None),
            Err(failure) => {
                log::error!("[UI] Run {} failed: {}", run_id, failure);
                let usage = partial_usage(&failure.events);
                let error = failure.to_string();
                (failure.events, usage, failure.elapsed_seconds, Some(error))
            }
        };

        let storage = if self.storage.is_enabled() {
            let meta = RunMetadata {
                run_id,
                prompt: request.prompt.clone(),
                model_name: provider.model_name.clone(),
                use_alternate_provider: request.use_alternate_provider,
                error: error.clone(),
            };
            match self
                .serializer
                .serialize(&meta, &events, elapsed_seconds, usage, self.storage.as_ref())
                .await
            {
                Ok(record) => self.storage.store(&record).await,
                Err(e) => {
                    log::error!("[UI] Failed to serialize run {}: {}", run_id, e);
                    StoreOutcome::Failed(e.to_string())
                }
            }
        } else {
            StoreOutcome::Disabled
        };

        let share_url = storage
            .is_success()
            .then(|| self.config.share_url(&run_id.to_string()));

        RunReport {
            run_id,
            model_name: provider.model_name,
            usage,
            elapsed_seconds,
            error,
            storage,
            share_url,
        }
    }

    /// Load a stored run and download every image it references
    pub async fn stored_run(&self, run_id: &str) -> Option<StoredRun> {
        let record = self.storage.load(run_id).await?;

        let mut images = HashMap::new();
        for url in record
            .results
            .iter()
            .filter_map(|item| item.content.as_image())
            .filter_map(|image| image.blob_url.as_deref())
        {
            if images.contains_key(url) {
                continue;
            }
            if let Some(bytes) = self.storage.download_image(url).await {
                images.insert(url.to_string(), bytes);
            }
        }

        Some(StoredRun { record, images })
    }
}

fn partial_usage(events: &[AgentEvent]) -> UsageTotals {
    let mut usage = UsageTotals::default();
    for event in events {
        if let AgentEvent::Final(outcome) = event {
            let totals = outcome.usage();
            usage.add(totals.prompt_tokens, totals.completion_tokens);
        }
    }
    usage
}
