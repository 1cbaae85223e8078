/// Convert a message source identifier into a display label
pub fn format_source_display(source: &str) -> &'static str {
    match source {
        "user" => "👤 User",
        "MagenticOneOrchestrator" => "🤖 Orchestrator Agent",
        "WebSurfer" => "🌐 Web Agent",
        "FileSurfer" => "📁 File Agent",
        "Coder" => "💻 Coder Agent",
        _ => "💻 Terminal Agent",
    }
}
