//! Interactive UI routes
//!
//! Sessions are tracked with a `session_id` cookie that is issued on the first
//! request. Session state is only created once a run is submitted, and each
//! session runs at most one task at a time.

use actix_web::cookie::Cookie;
use actix_web::http::header::ContentType;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;

use crate::AppState;
use crate::interactions::InteractionLog;
use crate::ui::templates::{self, MainPage};
use crate::ui::{RunReport, RunRequest, SESSION_COOKIE, SessionContext, SessionStore};

/// Largest accepted `POST /run` body; prompts may embed long documents
pub const MAX_FORM_BYTES: usize = 8 * 1024 * 1024;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::FormConfig::default().limit(MAX_FORM_BYTES));
    cfg.service(web::resource("/").route(web::get().to(index)));
    cfg.service(web::resource("/run").route(web::post().to(run_task)));
    cfg.service(web::resource("/interactions").route(web::get().to(interactions)));
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    run_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunForm {
    prompt: String,
    #[serde(default)]
    use_alternate_provider: Option<String>,
    #[serde(default)]
    alternate_model: Option<String>,
    #[serde(default)]
    model_name: Option<String>,
}

impl RunForm {
    fn into_request(self) -> RunRequest {
        let use_alternate_provider = self
            .use_alternate_provider
            .as_deref()
            .is_some_and(|v| matches!(v, "true" | "on" | "1"));
        let chosen = if use_alternate_provider {
            self.alternate_model
        } else {
            self.model_name
        };
        let defaults = RunRequest::default();

        RunRequest {
            prompt: self.prompt.trim().to_string(),
            use_alternate_provider,
            model_name: chosen
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .unwrap_or(defaults.model_name),
        }
    }
}

/// Session id for this request, plus the cookie to set when it is new
fn session_cookie(req: &HttpRequest) -> (String, Option<Cookie<'static>>) {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        return (cookie.value().to_string(), None);
    }

    let id = SessionStore::new_session_id();
    let cookie = Cookie::build(SESSION_COOKIE, id.clone())
        .path("/")
        .http_only(true)
        .finish();
    (id, Some(cookie))
}

fn html(mut builder: actix_web::HttpResponseBuilder, cookie: Option<Cookie<'static>>, body: String) -> HttpResponse {
    if let Some(cookie) = cookie {
        builder.cookie(cookie);
    }
    builder.content_type(ContentType::html()).body(body)
}

fn render_main(
    state: &AppState,
    request: &RunRequest,
    session: Option<&SessionContext>,
    notices: Vec<(&'static str, String)>,
    report: Option<&RunReport>,
) -> String {
    let empty = InteractionLog::new();
    let log = session.map(|s| s.interactions().lock());

    templates::main_page(&MainPage {
        storage_enabled: state.ui.storage_enabled(),
        request,
        interactions: log.as_deref().unwrap_or(&empty),
        notices,
        report,
    })
}

async fn index(state: web::Data<AppState>, req: HttpRequest, query: web::Query<IndexQuery>) -> impl Responder {
    let (session_id, cookie) = session_cookie(&req);
    let mut notices = Vec::new();

    if let Some(run_id) = query.run_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        match state.ui.stored_run(run_id).await {
            Some(stored) => {
                return html(HttpResponse::Ok(), cookie, templates::stored_run_page(&stored));
            }
            None => notices.push(("info", format!("Run with ID {} not found", run_id))),
        }
    }

    let session = state.sessions.get(&session_id);
    let body = render_main(&state, &RunRequest::default(), session.as_deref(), notices, None);
    html(HttpResponse::Ok(), cookie, body)
}

async fn run_task(state: web::Data<AppState>, req: HttpRequest, form: web::Form<RunForm>) -> impl Responder {
    let (session_id, cookie) = session_cookie(&req);
    let request = form.into_inner().into_request();

    if request.prompt.is_empty() {
        let session = state.sessions.get(&session_id);
        let notices = vec![("warning", "Please enter a task for the agents.".to_string())];
        let body = render_main(&state, &request, session.as_deref(), notices, None);
        return html(HttpResponse::BadRequest(), cookie, body);
    }

    let session = state.sessions.get_or_create(&session_id);
    let Some(_guard) = session.try_begin_run() else {
        return html(
            HttpResponse::Conflict(),
            cookie,
            "<p>A run is already in progress for this session. Wait for it to finish.</p>".to_string(),
        );
    };

    let report = state.ui.execute(&session, &request).await;

    let body = render_main(&state, &request, Some(session.as_ref()), Vec::new(), Some(&report));
    html(HttpResponse::Ok(), cookie, body)
}

async fn interactions(state: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let fragment = match req.cookie(SESSION_COOKIE).and_then(|c| state.sessions.get(c.value())) {
        Some(session) => templates::interactions_fragment(&session.interactions().lock()),
        None => templates::interactions_fragment(&InteractionLog::new()),
    };
    HttpResponse::Ok().content_type(ContentType::html()).body(fragment)
}
