// Axum handlers: form, harvest submission, one-shot archive download.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use imgharvest_engine::accumulate::AccumulationPolicy;
use imgharvest_engine::harvest::{build_harvest_request, run_harvest_in, HarvestVerdict};
use imgharvest_engine::source::ImageSource;
use imgharvest_engine::EngineError;

use crate::pages::{self, DownloadLink, Notice, NoticeLevel};
use crate::shelf::{ArchiveShelf, ReadyArchive};
use crate::telemetry::forward_engine_log;

pub type SharedSource = Arc<dyn ImageSource + Send + Sync>;

/// Everything a request needs. Cloned per request; holds no run state.
#[derive(Clone)]
pub struct AppState {
    pub source: SharedSource,
    pub policy: AccumulationPolicy,
    pub shelf: ArchiveShelf,
    /// Parent for per-run scratch directories.
    pub scratch_dir: PathBuf,
}

impl AppState {
    pub fn new(source: SharedSource, policy: AccumulationPolicy, max_ready_archives: usize) -> Self {
        Self {
            source,
            policy,
            shelf: ArchiveShelf::new(max_ready_archives),
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn with_scratch_dir(mut self, scratch_dir: PathBuf) -> Self {
        self.scratch_dir = scratch_dir;
        self
    }
}

/// Raw form fields. Numbers stay strings so a blank or mistyped field falls
/// back to its default instead of rejecting the whole submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarvestForm {
    pub query: String,
    pub target: String,
    pub min_fraction: String,
    pub max_rounds: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(form_handler))
        .route("/harvest", get(form_handler).post(harvest_handler))
        .route("/archives/{archive_id}", get(archive_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state)
}

async fn form_handler() -> Html<String> {
    Html(pages::form_page(&HarvestForm::default()))
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// POST /harvest: runs one harvest to completion and renders the outcome.
async fn harvest_handler(State(state): State<AppState>, Form(form): Form<HarvestForm>) -> Response {
    let request = match build_harvest_request(
        &form.query,
        parse_count(&form.target),
        parse_field(&form.min_fraction),
        parse_count(&form.max_rounds),
        &state.policy,
    ) {
        Ok(request) => request,
        Err(err) => return failure_page(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string(), &form),
    };

    info!(keyword = %request.keyword, target = request.target, "harvest requested");

    let source = state.source.clone();
    let scratch_dir = state.scratch_dir.clone();
    let joined = tokio::task::spawn_blocking(move || {
        run_harvest_in(source.as_ref(), &request, &scratch_dir, forward_engine_log)
    })
    .await;

    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(error = %err, "harvest task panicked");
            return failure_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                "the harvest stopped unexpectedly",
                &form,
            );
        }
    };

    match outcome {
        Ok(result) => {
            let level = match result.verdict {
                HarvestVerdict::Partial => NoticeLevel::Warning,
                HarvestVerdict::TargetReached | HarvestVerdict::MinimumReached => {
                    NoticeLevel::Success
                }
            };
            let notice = Notice::new(level, result.message());
            let file_name = result.file_name.clone();
            let archive_id = state.shelf.put(ReadyArchive {
                file_name: file_name.clone(),
                bytes: result.archive,
            });
            let link = DownloadLink {
                href: format!("/archives/{archive_id}"),
                file_name,
            };
            Html(pages::result_page(&[notice], Some(&link), &form)).into_response()
        }
        Err(err @ EngineError::NoImages { .. }) => {
            warn!(error = %err, "harvest produced nothing");
            failure_page(StatusCode::OK, &err.to_string(), &form)
        }
        Err(err @ (EngineError::InvalidQuery | EngineError::InvalidRequest(_))) => {
            failure_page(StatusCode::UNPROCESSABLE_ENTITY, &err.to_string(), &form)
        }
        Err(err) => {
            error!(error = %err, "harvest failed");
            failure_page(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string(), &form)
        }
    }
}

/// GET /archives/{archive_id}: hands the ZIP over once.
async fn archive_handler(
    State(state): State<AppState>,
    Path(archive_id): Path<String>,
) -> Response {
    let Some(archive) = state.shelf.take(&archive_id) else {
        return (StatusCode::NOT_FOUND, "archive not found").into_response();
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&archive.file_name)),
        ],
        archive.bytes,
    )
        .into_response()
}

fn failure_page(status: StatusCode, message: &str, form: &HarvestForm) -> Response {
    let notice = Notice::new(NoticeLevel::Error, message);
    (status, Html(pages::result_page(&[notice], None, form))).into_response()
}

fn parse_field<T: std::str::FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}

/// Whole-number field that also takes what a number input may send, such as
/// `10.5` or `1e2`. Rounded to the nearest count; negatives read as 0.
fn parse_count(raw: &str) -> Option<usize> {
    let value = parse_field::<f64>(raw).filter(|v| v.is_finite())?;
    Some(value.round().max(0.0) as usize)
}

/// `attachment` disposition with an ASCII fallback name plus the RFC 5987
/// UTF-8 form for names with non-ASCII letters.
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        percent_encode(file_name)
    )
}

fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_tolerates_blank_and_garbage() {
        assert_eq!(parse_field::<usize>(" 40 "), Some(40));
        assert_eq!(parse_field::<usize>(""), None);
        assert_eq!(parse_field::<usize>("lots"), None);
        assert_eq!(parse_field::<f64>("0.75"), Some(0.75));
    }

    #[test]
    fn parse_count_rounds_decimal_input() {
        assert_eq!(parse_count("40"), Some(40));
        assert_eq!(parse_count(" 10.5 "), Some(11));
        assert_eq!(parse_count("10.4"), Some(10));
        assert_eq!(parse_count("1e2"), Some(100));
        assert_eq!(parse_count("-3"), Some(0));
        assert_eq!(parse_count("NaN"), None);
        assert_eq!(parse_count("inf"), None);
        assert_eq!(parse_count(""), None);
    }

    #[test]
    fn content_disposition_carries_ascii_and_utf8_names() {
        assert_eq!(
            content_disposition("skin stapler.zip"),
            "attachment; filename=\"skin stapler.zip\"; filename*=UTF-8''skin%20stapler.zip"
        );
        assert_eq!(
            content_disposition("café.zip"),
            "attachment; filename=\"caf_.zip\"; filename*=UTF-8''caf%C3%A9.zip"
        );
    }
}
