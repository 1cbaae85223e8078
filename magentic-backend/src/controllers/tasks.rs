//! Background task API
//!
//! Tasks are queued with `POST /tasks` and polled by id until they reach a
//! terminal state.

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::ApiState;
use crate::ai::DEFAULT_MODEL;
use crate::models::Task;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tasks")
            .route("", web::post().to(create_task))
            .route("/{task_id}", web::get().to(get_task_status))
            .route("/{task_id}/result", web::get().to(get_task_result)),
    );
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub prompt: String,
    #[serde(default = "default_true")]
    pub use_alternate_provider: bool,
    #[serde(default)]
    pub model_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task_id: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: String,
    pub prompt: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct TaskResultResponse {
    pub task_id: String,
    pub status: String,
    pub result: serde_json::Value,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub created_at: String,
    pub updated_at: String,
}

fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "detail": "Task not found" }))
}

fn internal_error(e: rusqlite::Error) -> HttpResponse {
    log::error!("[TASKS] Database error: {}", e);
    HttpResponse::InternalServerError().json(serde_json::json!({ "error": "Internal server error" }))
}

fn load_task(state: &ApiState, task_id: &str) -> Result<Task, HttpResponse> {
    match state.tasks.db().get_task(task_id) {
        Ok(Some(task)) => Ok(task),
        Ok(None) => Err(not_found()),
        Err(e) => Err(internal_error(e)),
    }
}

async fn create_task(state: web::Data<ApiState>, body: web::Json<CreateTaskRequest>) -> impl Responder {
    if body.prompt.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({ "error": "prompt must not be empty" }));
    }

    let model_name = body
        .model_name
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MODEL);

    match state.tasks.submit(&body.prompt, model_name, body.use_alternate_provider) {
        Ok(task) => HttpResponse::Ok().json(TaskResponse {
            task_id: task.id,
            status: task.status.to_string(),
            created_at: task.created_at.to_rfc3339(),
        }),
        Err(e) => internal_error(e),
    }
}

async fn get_task_status(state: web::Data<ApiState>, path: web::Path<String>) -> impl Responder {
    match load_task(&state, &path) {
        Ok(task) => HttpResponse::Ok().json(TaskStatusResponse {
            task_id: task.id,
            status: task.status.to_string(),
            prompt: task.prompt,
            created_at: task.created_at.to_rfc3339(),
            updated_at: task.updated_at.to_rfc3339(),
        }),
        Err(response) => response,
    }
}

async fn get_task_result(state: web::Data<ApiState>, path: web::Path<String>) -> impl Responder {
    let task = match load_task(&state, &path) {
        Ok(task) => task,
        Err(response) => return response,
    };

    if !task.status.is_terminal() {
        return HttpResponse::Accepted().json(serde_json::json!({ "detail": "Task still in progress" }));
    }

    HttpResponse::Ok().json(TaskResultResponse {
        task_id: task.id,
        status: task.status.to_string(),
        result: task.result.unwrap_or_else(|| serde_json::json!({})),
        prompt_tokens: task.prompt_tokens,
        completion_tokens: task.completion_tokens,
        created_at: task.created_at.to_rfc3339(),
        updated_at: task.updated_at.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedTeamFactory;
    use crate::ai::ProviderSettings;
    use crate::db::Database;
    use crate::executor::TaskExecutor;
    use crate::task_queue::TaskQueue;
    use actix_web::http::StatusCode;
    use actix_web::App;
    use actix_web::test as actix_test;
    use std::sync::Arc;
    use std::time::Duration;

    fn state(factory: ScriptedTeamFactory) -> web::Data<ApiState> {
        web::Data::new(ApiState {
            tasks: TaskQueue::new(
                Arc::new(Database::in_memory().unwrap()),
                Arc::new(TaskExecutor::new(Arc::new(factory))),
                ProviderSettings::default(),
            ),
        })
    }

    #[actix_web::test]
    async fn test_task_lifecycle() {
        let state = state(ScriptedTeamFactory::single_reply("MagenticOneOrchestrator", "42", (10, 5)));
        let app = actix_test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = actix_test::TestRequest::post()
            .uri("/tasks")
            .set_json(serde_json::json!({ "prompt": "what is the answer?" }))
            .to_request();
        let created: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(created["status"], "pending");
        let task_id = created["task_id"].as_str().unwrap().to_string();

        let stored = state.tasks.db().get_task(&task_id).unwrap().unwrap();
        assert_eq!(stored.model_name, "gpt-4o");
        assert!(stored.use_alternate_provider);

        // Wait for the background worker
        let mut finished = false;
        for _ in 0..100 {
            let task = state.tasks.db().get_task(&task_id).unwrap().unwrap();
            if task.status.is_terminal() {
                finished = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(finished);

        let req = actix_test::TestRequest::get().uri(&format!("/tasks/{}", task_id)).to_request();
        let status: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(status["status"], "completed");
        assert_eq!(status["prompt"], "what is the answer?");

        let req = actix_test::TestRequest::get().uri(&format!("/tasks/{}/result", task_id)).to_request();
        let result: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(result["prompt_tokens"], 10);
        assert_eq!(result["completion_tokens"], 5);
        assert_eq!(result["result"]["task_result"]["status"], "completed");
        assert_eq!(result["result"]["messages"][1]["content"], "42");
    }

    #[actix_web::test]
    async fn test_result_in_progress_and_unknown() {
        let state = state(ScriptedTeamFactory::new(vec![]));
        let pending = state.tasks.db().create_task("later", "gpt-4o", false).unwrap();
        let app = actix_test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = actix_test::TestRequest::get()
            .uri(&format!("/tasks/{}/result", pending.id))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["detail"], "Task still in progress");

        let req = actix_test::TestRequest::get().uri("/tasks/nope").to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = actix_test::TestRequest::get().uri("/tasks/nope/result").to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_empty_prompt_is_rejected() {
        let state = state(ScriptedTeamFactory::new(vec![]));
        let app = actix_test::init_service(App::new().app_data(state).configure(config)).await;

        let req = actix_test::TestRequest::post()
            .uri("/tasks")
            .set_json(serde_json::json!({ "prompt": "  " }))
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
