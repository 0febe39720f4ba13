// Web front end - status page, start/stop form posts and file downloads

use crate::recording::{RecordingState, SessionController, StartOutcome, StopOutcome};
use crate::session::RecordingFile;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

/// Shared state for web handlers
#[derive(Clone)]
pub struct WebState {
    pub controller: Arc<SessionController>,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/start", post(start_recording))
        .route("/stop", post(stop_recording))
        .route("/download/{filename}", get(download))
        .route("/status", get(status))
        .route("/recordings", get(list_recordings))
        .with_state(state)
}

/// Main page with start/stop buttons and file history
async fn index(State(state): State<WebState>) -> Response {
    let recording = state.controller.status().await;
    match state.controller.store().list() {
        Ok(files) => Html(render_index(&recording, &files)).into_response(),
        Err(e) => {
            log::error!("Failed to list recordings: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list recordings").into_response()
        }
    }
}

async fn start_recording(State(state): State<WebState>) -> &'static str {
    match state.controller.start().await {
        StartOutcome::Started => "Recording started!",
        StartOutcome::AlreadyActive => "Recording already in progress.",
    }
}

async fn stop_recording(State(state): State<WebState>) -> String {
    match state.controller.stop().await {
        StopOutcome::NotActive => "Recording stopped!".to_string(),
        StopOutcome::Finished(Ok(path)) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("Recording stopped! Saved {}", name)
        }
        StopOutcome::Finished(Err(e)) => {
            format!("Recording stopped, but the capture failed: {}", e)
        }
    }
}

/// Serve a recording as an attachment
async fn download(State(state): State<WebState>, Path(filename): Path<String>) -> Response {
    let Some(path) = state.controller.store().resolve(&filename) else {
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            log::warn!("Failed to open {}: {}", path.display(), e);
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }
    };

    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/midi")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename.replace('"', "")),
        )
        .body(body)
        .map_err(|e| {
            log::error!("Failed to build response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
        .unwrap_or_else(|status| status.into_response())
}

async fn status(State(state): State<WebState>) -> Json<RecordingState> {
    Json(state.controller.status().await)
}

async fn list_recordings(State(state): State<WebState>) -> Response {
    match state.controller.store().list() {
        Ok(files) => Json(files).into_response(),
        Err(e) => {
            log::error!("Failed to list recordings: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list recordings").into_response()
        }
    }
}

fn render_index(state: &RecordingState, files: &[RecordingFile]) -> String {
    let status = if state.is_recording() {
        "<p class=\"status recording\">Recording...</p>".to_string()
    } else {
        "<p class=\"status\">Not recording</p>".to_string()
    };

    let error = state
        .last_error
        .as_deref()
        .map(|e| format!("<p class=\"error\">Last recording failed: {}</p>", escape_html(e)))
        .unwrap_or_default();

    let rows: String = if files.is_empty() {
        "<li class=\"empty\">No recordings yet</li>".to_string()
    } else {
        files
            .iter()
            .map(|f| {
                let name = escape_html(&f.filename);
                let notes = f
                    .note_count
                    .map(|n| format!("{} notes, ", n))
                    .unwrap_or_default();
                format!(
                    "<li><a href=\"/download/{name}\">{name}</a> \
                     <span class=\"meta\">({notes}{size} bytes)</span></li>",
                    name = name,
                    notes = notes,
                    size = f.size_bytes,
                )
            })
            .collect()
    };

    INDEX_HTML
        .replace("{{status}}", &status)
        .replace("{{error}}", &error)
        .replace("{{files}}", &rows)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML template for the recorder page
const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>MIDI Recorder</title>
  <style>
    body {
      font-family: system-ui, -apple-system, sans-serif;
      max-width: 40rem;
      margin: 2rem auto;
      padding: 0 1rem;
    }
    .status.recording { color: #c0392b; font-weight: bold; }
    .error { color: #c0392b; }
    .controls form { display: inline; }
    button { padding: 0.5rem 1.5rem; font-size: 1rem; margin-right: 0.5rem; }
    ul { padding-left: 1.2rem; }
    .meta, .empty { color: #888; }
  </style>
</head>
<body>
  <h1>MIDI Recorder</h1>
  {{status}}
  {{error}}
  <div class="controls">
    <form action="/start" method="post"><button type="submit">Start Recording</button></form>
    <form action="/stop" method="post"><button type="submit">Stop Recording</button></form>
  </div>
  <h2>Recordings</h2>
  <ul>
    {{files}}
  </ul>
</body>
</html>
"##;
