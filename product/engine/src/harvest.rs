use crate::accumulate::{download_until_target, AccumulationPolicy, StopReason};
use crate::archive::make_zip_from_folder;
use crate::names::{archive_file_name, clean_query};
use crate::paths::RunDir;
use crate::source::ImageSource;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MIN_TARGET: usize = 1;
pub const MAX_TARGET: usize = 300;
pub const DEFAULT_TARGET: usize = 100;
pub const MIN_FRACTION: f64 = 0.50;
pub const MAX_FRACTION: f64 = 1.00;
pub const MIN_ROUNDS: usize = 3;
pub const MAX_ROUNDS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestRequest {
    /// Sanitized search term; doubles as the archive file stem.
    pub keyword: String,
    pub target: usize,
    pub policy: AccumulationPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestVerdict {
    TargetReached,
    MinimumReached,
    /// Something was downloaded, but less than the minimum fraction.
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestResult {
    pub keyword: String,
    pub file_name: String,
    pub images: usize,
    pub target: usize,
    pub min_needed: usize,
    pub exact: bool,
    pub verdict: HarvestVerdict,
    pub rounds: usize,
    pub stop: StopReason,
    pub archive_entries: usize,
    #[serde(skip)]
    pub archive: Vec<u8>,
}

impl HarvestResult {
    pub fn message(&self) -> String {
        match self.verdict {
            HarvestVerdict::TargetReached => {
                format!("Done! Downloaded {} images (target reached).", self.images)
            }
            HarvestVerdict::MinimumReached => format!(
                "Done! Downloaded {} of {} images (at least the minimum of {} achieved).",
                self.images, self.target, self.min_needed
            ),
            HarvestVerdict::Partial => format!(
                "Only downloaded {} images (minimum target was {}). The ZIP contains the images that were available.",
                self.images, self.min_needed
            ),
        }
    }
}

/// Validates the search term and clamps the numeric knobs into their ranges.
/// `None` picks the default for that knob.
pub fn build_harvest_request(
    query: &str,
    target: Option<usize>,
    min_fraction: Option<f64>,
    max_rounds: Option<usize>,
    base_policy: &AccumulationPolicy,
) -> Result<HarvestRequest> {
    let keyword = clean_query(query);
    if keyword.is_empty() {
        return Err(EngineError::InvalidQuery);
    }

    let target = target.unwrap_or(DEFAULT_TARGET).clamp(MIN_TARGET, MAX_TARGET);
    let min_fraction = min_fraction
        .filter(|v| v.is_finite())
        .unwrap_or(base_policy.min_fraction)
        .clamp(MIN_FRACTION, MAX_FRACTION);
    let max_rounds = max_rounds
        .unwrap_or(base_policy.max_rounds)
        .clamp(MIN_ROUNDS, MAX_ROUNDS);

    Ok(HarvestRequest {
        keyword,
        target,
        policy: AccumulationPolicy {
            min_fraction,
            max_rounds,
            ..base_policy.clone()
        },
    })
}

pub fn classify(images: usize, exact: bool, min_needed: usize) -> Option<HarvestVerdict> {
    if images == 0 {
        None
    } else if exact {
        Some(HarvestVerdict::TargetReached)
    } else if images >= min_needed {
        Some(HarvestVerdict::MinimumReached)
    } else {
        Some(HarvestVerdict::Partial)
    }
}

/// Downloads images for `request`, packs them, and returns the ZIP bytes.
///
/// The scratch directory is created under `scratch_parent` and removed before
/// this returns, whatever the outcome. Zero images is an error and no archive
/// is built.
pub fn run_harvest_in<S, FLog>(
    source: &S,
    request: &HarvestRequest,
    scratch_parent: &Path,
    mut log_line: FLog,
) -> Result<HarvestResult>
where
    S: ImageSource + ?Sized,
    FLog: FnMut(&str, &str, serde_json::Value) -> Result<()>,
{
    let run = RunDir::create_in(scratch_parent)?;
    let downloads_dir = run.downloads_dir();
    let min_needed = request.policy.min_needed(request.target);

    log_line(
        "info",
        "harvest_begin",
        serde_json::json!({
            "keyword": request.keyword,
            "target": request.target,
            "min_needed": min_needed,
            "max_rounds": request.policy.max_rounds,
            "work_dir": run.root().to_string_lossy(),
        }),
    )?;

    let outcome = download_until_target(
        source,
        &request.keyword,
        &downloads_dir,
        request.target,
        &request.policy,
        &mut log_line,
    )?;

    let Some(verdict) = classify(outcome.images, outcome.exact, min_needed) else {
        log_line(
            "warn",
            "harvest_no_images",
            serde_json::json!({
                "keyword": request.keyword,
                "rounds": outcome.rounds,
            }),
        )?;
        return Err(EngineError::NoImages {
            keyword: request.keyword.clone(),
        });
    };
    if verdict == HarvestVerdict::Partial {
        log_line(
            "warn",
            "harvest_below_minimum",
            serde_json::json!({
                "images": outcome.images,
                "min_needed": min_needed,
            }),
        )?;
    }

    let file_name = archive_file_name(&request.keyword);
    let archive_path = run.archive_path(&file_name);
    let summary = make_zip_from_folder(&downloads_dir, &archive_path)?;
    let archive = std::fs::read(&archive_path)?;

    log_line(
        "info",
        "harvest_done",
        serde_json::json!({
            "keyword": request.keyword,
            "images": outcome.images,
            "exact": outcome.exact,
            "verdict": verdict,
            "archive": summary,
        }),
    )?;

    Ok(HarvestResult {
        keyword: request.keyword.clone(),
        file_name,
        images: outcome.images,
        target: request.target,
        min_needed,
        exact: outcome.exact,
        verdict,
        rounds: outcome.rounds,
        stop: outcome.stop,
        archive_entries: summary.entries,
        archive,
    })
}
