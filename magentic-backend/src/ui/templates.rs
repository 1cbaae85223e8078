//! Server-rendered HTML for the interactive UI

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::controller::{RunReport, RunRequest, StoredRun};
use crate::agents::format_source_display;
use crate::ai::ALTERNATE_PROVIDER_MODELS;
use crate::interactions::{InteractionLog, InteractionSink, SYSTEM_LABEL, with_thousands};
use crate::models::{Interaction, InteractionKind, ResultItem, ResultItemType, TRUNCATION_MARKER};
use crate::storage::StoreOutcome;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0 auto; max-width: 960px; padding: 1.5rem; color: #1f2328; }
h1 { margin-bottom: 0.25rem; }
.notice { padding: 0.75rem 1rem; border-radius: 6px; margin: 0.75rem 0; }
.info { background: #ddf4ff; } .success { background: #dafbe1; } .warning { background: #fff8c5; } .error { background: #ffebe9; }
details.interaction { border: 1px solid #d0d7de; border-radius: 6px; margin: 0.5rem 0; padding: 0.5rem 0.75rem; }
details.interaction summary { font-weight: 600; cursor: pointer; }
.time { color: #656d76; font-weight: normal; font-size: 0.85em; margin-left: 0.5rem; }
.content { white-space: pre-wrap; margin-top: 0.5rem; }
img.agent-image { max-width: 100%; margin-top: 0.5rem; }
form textarea { width: 100%; min-height: 6rem; }
.settings { display: flex; gap: 1.5rem; align-items: center; flex-wrap: wrap; margin: 0.5rem 0; }
table.meta td { padding: 0.15rem 0.75rem 0.15rem 0; }
"#;

// Polls the session log while the run request is in flight
const LIVE_SCRIPT: &str = r#"
document.getElementById('run-form').addEventListener('submit', function () {
  var button = document.getElementById('run-button');
  button.disabled = true;
  button.textContent = 'Running...';
  var target = document.getElementById('interactions');
  setInterval(function () {
    fetch('/interactions', { credentials: 'same-origin' })
      .then(function (r) { return r.text(); })
      .then(function (html) { target.innerHTML = html; })
      .catch(function () {});
  }, 1000);
});
"#;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Renders each interaction as an expanded `<details>` block
#[derive(Default)]
pub struct HtmlSink {
    html: String,
}

impl HtmlSink {
    pub fn into_html(self) -> String {
        self.html
    }
}

impl InteractionSink for HtmlSink {
    fn show(&mut self, interaction: &Interaction) {
        let body = match interaction.kind {
            InteractionKind::Image => format!(
                r#"<img class="agent-image" src="{}" alt="Agent image">"#,
                escape_html(&interaction.content)
            ),
            InteractionKind::Text => format!(r#"<div class="content">{}</div>"#, escape_html(&interaction.content)),
        };
        self.html.push_str(&format!(
            r#"<details class="interaction" open><summary>{}<span class="time">{}</span></summary>{}</details>"#,
            escape_html(&interaction.agent_label),
            interaction.display_time(),
            body
        ));
    }
}

/// Fragment served to the live-display poller
pub fn interactions_fragment(log: &InteractionLog) -> String {
    if log.is_empty() {
        return r#"<p class="time">No interactions yet.</p>"#.to_string();
    }
    let mut sink = HtmlSink::default();
    log.render(&mut sink);
    sink.into_html()
}

fn notice(class: &str, text: &str) -> String {
    format!(r#"<div class="notice {}">{}</div>"#, class, escape_html(text))
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{}</title>
<style>{}</style>
</head>
<body>
{}
</body>
</html>"#,
        escape_html(title),
        STYLE,
        body
    )
}

/// Everything the main page shows
pub struct MainPage<'a> {
    pub storage_enabled: bool,
    pub request: &'a RunRequest,
    pub interactions: &'a InteractionLog,
    pub notices: Vec<(&'static str, String)>,
    pub report: Option<&'a RunReport>,
}

pub fn main_page(ctx: &MainPage) -> String {
    let mut body = String::from("<h1>🤖 Magentic-One</h1><p>A team of agents that plans, browses, reads files and writes code to solve your task.</p>");

    body.push_str(&if ctx.storage_enabled {
        notice("info", "💾 Run results storage is enabled. Completed runs get a shareable link.")
    } else {
        notice("info", "ℹ️ Run results storage is disabled. Set STORE_RUN_RESULT=true to enable.")
    });

    for (class, text) in &ctx.notices {
        body.push_str(&notice(class, text));
    }

    body.push_str(&run_form(ctx.request));

    if let Some(report) = ctx.report {
        body.push_str(&report_section(report));
    }

    body.push_str(&format!(
        r#"<h2>Agent interactions</h2><div id="interactions">{}</div><script>{}</script>"#,
        interactions_fragment(ctx.interactions),
        LIVE_SCRIPT
    ));

    page("Magentic-One", &body)
}

fn run_form(request: &RunRequest) -> String {
    let options: String = ALTERNATE_PROVIDER_MODELS
        .iter()
        .map(|model| {
            let selected = if *model == request.model_name { " selected" } else { "" };
            format!(r#"<option value="{0}"{1}>{0}</option>"#, model, selected)
        })
        .collect();
    let checked = if request.use_alternate_provider { " checked" } else { "" };

    format!(
        r#"<form id="run-form" method="post" action="/run">
<div class="settings">
<label><input type="checkbox" name="use_alternate_provider" value="true"{}> Use Azure OpenAI</label>
<label>Azure model <select name="alternate_model">{}</select></label>
<label>OpenAI model <input type="text" name="model_name" value="{}"></label>
</div>
<textarea name="prompt" placeholder="Describe the task for the agents">{}</textarea>
<p><button id="run-button" type="submit">Run task</button></p>
</form>"#,
        checked,
        options,
        escape_html(&request.model_name),
        escape_html(&request.prompt)
    )
}

fn report_section(report: &RunReport) -> String {
    let mut html = String::from("<h2>Result</h2>");

    match &report.error {
        Some(error) => html.push_str(&notice("error", &format!("❌ Error: {}", error))),
        None => html.push_str(&notice(
            "success",
            &format!("✅ Task completed in {:.2} seconds", report.elapsed_seconds),
        )),
    }

    html.push_str(&format!(
        r#"<table class="meta"><tr><td>Model</td><td>{}</td></tr><tr><td>Prompt tokens</td><td>{}</td></tr><tr><td>Completion tokens</td><td>{}</td></tr><tr><td>Total tokens</td><td>{}</td></tr></table>"#,
        escape_html(&report.model_name),
        with_thousands(report.usage.prompt_tokens),
        with_thousands(report.usage.completion_tokens),
        with_thousands(report.usage.total())
    ));

    match &report.storage {
        StoreOutcome::Disabled => {}
        StoreOutcome::Stored { size_bytes, images } => {
            let size_mb = *size_bytes as f64 / 1024.0 / 1024.0;
            let text = if *images > 0 {
                format!("Run result stored with ID: {} (Size: {:.2} MB, {} images in blob storage)", report.run_id, size_mb, images)
            } else {
                format!("Run result stored with ID: {} (Size: {:.2} MB)", report.run_id, size_mb)
            };
            html.push_str(&notice("success", &text));
        }
        StoreOutcome::MetadataOnly => html.push_str(&notice(
            "warning",
            &format!("Result too large to store. Metadata stored with ID: {}", report.run_id),
        )),
        StoreOutcome::Failed(e) => html.push_str(&notice("error", &format!("Failed to store run result: {}", e))),
    }

    if let Some(url) = &report.share_url {
        html.push_str(&format!(
            r#"<div class="notice info">🔗 Shareable link: <a href="{0}">{0}</a></div>"#,
            escape_html(url)
        ));
    }

    html
}

pub fn stored_run_page(stored: &StoredRun) -> String {
    let record = &stored.record;
    let mut body = format!(
        r#"<h1>📋 Stored run</h1><p><a href="/">← New task</a></p>
<table class="meta">
<tr><td>Run ID</td><td>{}</td></tr>
<tr><td>Prompt</td><td>{}</td></tr>
<tr><td>Model</td><td>{}</td></tr>
<tr><td>Azure OpenAI</td><td>{}</td></tr>
<tr><td>Created</td><td>{}</td></tr>
<tr><td>Elapsed</td><td>{:.2} seconds</td></tr>
<tr><td>Tokens</td><td>{} prompt / {} completion</td></tr>
<tr><td>Stored size</td><td>{:.2} MB</td></tr>
<tr><td>Images</td><td>{}</td></tr>
</table>"#,
        record.id,
        escape_html(&record.prompt),
        escape_html(&record.model_name),
        if record.use_alternate_provider { "Yes" } else { "No" },
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        record.elapsed_seconds,
        with_thousands(record.prompt_tokens),
        with_thousands(record.completion_tokens),
        record.document_size_bytes as f64 / 1024.0 / 1024.0,
        record.total_images
    );

    if record.is_metadata_only {
        body.push_str(&notice(
            "warning",
            "⚠️ This run was too large to store in full. Only metadata is available.",
        ));
    }
    if let Some(error) = &record.error {
        body.push_str(&notice("error", &format!("❌ This run failed: {}", error)));
    }

    body.push_str("<h2>Agent interactions</h2>");
    for item in &record.results {
        body.push_str(&stored_item(item, stored));
    }

    page("Magentic-One - stored run", &body)
}

fn stored_item(item: &ResultItem, stored: &StoredRun) -> String {
    match item.item_type {
        ResultItemType::TruncationNote | ResultItemType::MetadataOnly => {
            return notice("warning", item.content.as_text().unwrap_or_default());
        }
        ResultItemType::Error => return notice("error", item.content.as_text().unwrap_or_default()),
        _ => {}
    }

    let label = match item.item_type {
        ResultItemType::TaskResult => SYSTEM_LABEL,
        _ => format_source_display(item.source.as_deref().unwrap_or_default()),
    };

    let body = match (item.content.as_text(), item.content.as_image()) {
        (Some(text), _) => {
            let mut html = format!(r#"<div class="content">{}</div>"#, escape_html(text));
            if text.ends_with(TRUNCATION_MARKER) {
                html.push_str(&notice("warning", "⚠️ This message was truncated before it was stored."));
            }
            html
        }
        (None, Some(image)) => match image.blob_url.as_ref().and_then(|url| stored.images.get(url)) {
            Some(bytes) => format!(
                r#"<img class="agent-image" src="data:image/png;base64,{}" alt="Agent image">"#,
                BASE64.encode(bytes)
            ),
            None => {
                let reason = image
                    .note
                    .clone()
                    .unwrap_or_else(|| "Image could not be loaded from blob storage".to_string());
                notice("info", &format!("🖼️ {}", reason))
            }
        },
        (None, None) => String::new(),
    };

    format!(
        r#"<details class="interaction" open><summary>{}<span class="time">{}</span></summary>{}</details>"#,
        escape_html(label),
        item.timestamp.format("%H:%M:%S"),
        body
    )
}
