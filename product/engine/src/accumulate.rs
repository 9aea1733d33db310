use crate::scan::count_images;
use crate::source::{FetchRequest, ImageSource};
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MIN_FRACTION: f64 = 0.66;
pub const DEFAULT_ROUND_BATCH_SIZE: usize = 80;
pub const DEFAULT_MAX_ROUNDS: usize = 12;

// Absorbs float error such as 100 * 0.66 == 66.00000000000001.
const FRACTION_EPSILON: f64 = 1e-9;

/// Knobs for [`download_until_target`]. The defaults are empirical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulationPolicy {
    pub min_fraction: f64,
    /// Upper bound on how many results a single round may ask for.
    pub round_batch_size: usize,
    pub max_rounds: usize,
    /// Lower bound on a round's request, however few images are missing.
    pub min_batch: usize,
    /// Over-request multiplier for the missing count; downloads routinely fail.
    pub overfetch_factor: usize,
    /// Stop early once this many rounds made no progress and the minimum is met.
    pub accept_after_stagnant_rounds: usize,
    /// Give up once this many rounds made no progress and the minimum is not met.
    pub abort_after_stagnant_rounds: usize,
}

impl Default for AccumulationPolicy {
    fn default() -> Self {
        Self {
            min_fraction: DEFAULT_MIN_FRACTION,
            round_batch_size: DEFAULT_ROUND_BATCH_SIZE,
            max_rounds: DEFAULT_MAX_ROUNDS,
            min_batch: 30,
            overfetch_factor: 2,
            accept_after_stagnant_rounds: 3,
            abort_after_stagnant_rounds: 4,
        }
    }
}

impl AccumulationPolicy {
    /// `max(1, ceil(target * min_fraction))`.
    pub fn min_needed(&self, target: usize) -> usize {
        let fraction = self.min_fraction.clamp(0.0, 1.0);
        let raw = target as f64 * fraction;
        let needed = (raw - FRACTION_EPSILON).ceil();
        if needed.is_finite() && needed > 0.0 {
            (needed as usize).max(1)
        } else {
            1
        }
    }

    pub fn batch_size(&self, remaining: usize) -> usize {
        let wanted = remaining
            .saturating_mul(self.overfetch_factor)
            .max(self.min_batch);
        wanted.min(self.round_batch_size.max(1)).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    /// Progress stalled after the minimum was already met.
    GoodEnough,
    /// Progress stalled below the minimum.
    Stagnated,
    RoundsExhausted,
}

impl StopReason {
    fn as_str(&self) -> &'static str {
        match self {
            StopReason::TargetReached => "target_reached",
            StopReason::GoodEnough => "good_enough",
            StopReason::Stagnated => "stagnated",
            StopReason::RoundsExhausted => "rounds_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccumulationOutcome {
    /// Images on disk when the loop returned.
    pub images: usize,
    /// Whether `images >= target`.
    pub exact: bool,
    /// Number of provider calls issued.
    pub rounds: usize,
    /// Offset the next round would have used.
    pub offset: usize,
    pub stop: StopReason,
}

/// Calls `source` with advancing offsets until `target` images sit in
/// `download_dir`, progress stalls, or `policy.max_rounds` is used up.
///
/// Progress is always re-counted from disk; provider reports are only logged.
/// A provider error ends that round, not the loop.
pub fn download_until_target<S, FLog>(
    source: &S,
    keyword: &str,
    download_dir: &Path,
    target: usize,
    policy: &AccumulationPolicy,
    mut log_line: FLog,
) -> Result<AccumulationOutcome>
where
    S: ImageSource + ?Sized,
    FLog: FnMut(&str, &str, serde_json::Value) -> Result<()>,
{
    if target == 0 {
        return Err(EngineError::InvalidRequest(
            "target must be at least 1".to_string(),
        ));
    }

    let min_needed = policy.min_needed(target);
    let mut offset = 0_usize;
    let mut last_count = 0_usize;
    let mut stagnant_rounds = 0_usize;
    let mut rounds = 0_usize;
    let mut stop = StopReason::RoundsExhausted;

    for round in 1..=policy.max_rounds {
        let current = count_images(download_dir);
        if current >= target {
            return finish(current, true, rounds, offset, StopReason::TargetReached, &mut log_line);
        }

        if current == last_count {
            stagnant_rounds += 1;
        } else {
            stagnant_rounds = 0;
            last_count = current;
        }

        if stagnant_rounds >= policy.accept_after_stagnant_rounds && current >= min_needed {
            return finish(current, false, rounds, offset, StopReason::GoodEnough, &mut log_line);
        }
        if stagnant_rounds >= policy.abort_after_stagnant_rounds && current < min_needed {
            stop = StopReason::Stagnated;
            break;
        }

        let batch = policy.batch_size(target - current);
        log_line(
            "info",
            "harvest_round",
            serde_json::json!({
                "round": round,
                "current": current,
                "target": target,
                "min_needed": min_needed,
                "stagnant_rounds": stagnant_rounds,
                "offset": offset,
                "batch": batch,
            }),
        )?;

        let request = FetchRequest {
            keyword,
            offset,
            max_num: batch,
            dir: download_dir,
        };
        match source.fetch(&request, &mut log_line) {
            Ok(report) => {
                log_line(
                    "info",
                    "harvest_round_fetched",
                    serde_json::json!({
                        "round": round,
                        "reported": report,
                    }),
                )?;
            }
            Err(err) => {
                log_line(
                    "warn",
                    "harvest_round_fetch_failed",
                    serde_json::json!({
                        "round": round,
                        "error": err.to_string(),
                    }),
                )?;
            }
        }

        offset += batch;
        rounds += 1;
    }

    let final_count = count_images(download_dir);
    finish(final_count, final_count >= target, rounds, offset, stop, &mut log_line)
}

fn finish<FLog>(
    images: usize,
    exact: bool,
    rounds: usize,
    offset: usize,
    stop: StopReason,
    log_line: &mut FLog,
) -> Result<AccumulationOutcome>
where
    FLog: FnMut(&str, &str, serde_json::Value) -> Result<()>,
{
    log_line(
        "info",
        "harvest_loop_done",
        serde_json::json!({
            "images": images,
            "exact": exact,
            "rounds": rounds,
            "offset": offset,
            "stop": stop.as_str(),
        }),
    )?;
    Ok(AccumulationOutcome {
        images,
        exact,
        rounds,
        offset,
        stop,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::source::{FetchReport, LogLine};
    use std::cell::RefCell;

    /// Writes a scripted number of fresh `.png` files per call.
    pub(crate) struct ScriptedSource {
        yields: Vec<usize>,
        pub(crate) calls: RefCell<Vec<(usize, usize)>>,
        written: RefCell<usize>,
    }

    impl ScriptedSource {
        pub(crate) fn new(yields: Vec<usize>) -> Self {
            Self {
                yields,
                calls: RefCell::new(Vec::new()),
                written: RefCell::new(0),
            }
        }
    }

    impl ImageSource for ScriptedSource {
        fn fetch(&self, request: &FetchRequest<'_>, _log: &mut LogLine<'_>) -> Result<FetchReport> {
            let call = self.calls.borrow().len();
            self.calls
                .borrow_mut()
                .push((request.offset, request.max_num));
            let n = self.yields.get(call).copied().unwrap_or(0);
            std::fs::create_dir_all(request.dir)?;
            for _ in 0..n {
                let idx = {
                    let mut w = self.written.borrow_mut();
                    *w += 1;
                    *w
                };
                std::fs::write(request.dir.join(format!("{idx:06}.png")), [idx as u8])?;
            }
            Ok(FetchReport {
                downloaded: n,
                ..FetchReport::default()
            })
        }
    }

    struct FailingSource {
        calls: RefCell<usize>,
    }

    impl ImageSource for FailingSource {
        fn fetch(&self, _request: &FetchRequest<'_>, _log: &mut LogLine<'_>) -> Result<FetchReport> {
            *self.calls.borrow_mut() += 1;
            Err(EngineError::Http("connection reset".to_string()))
        }
    }

    fn no_log(_: &str, _: &str, _: serde_json::Value) -> Result<()> {
        Ok(())
    }

    fn run(source: &ScriptedSource, target: usize) -> AccumulationOutcome {
        let dir = tempfile::tempdir().expect("tempdir");
        download_until_target(
            source,
            "cats",
            dir.path(),
            target,
            &AccumulationPolicy::default(),
            no_log,
        )
        .expect("loop")
    }

    #[test]
    fn min_needed_rounds_up_and_tolerates_float_noise() {
        let policy = AccumulationPolicy::default();
        assert_eq!(policy.min_needed(100), 66);
        assert_eq!(policy.min_needed(1), 1);
        assert_eq!(policy.min_needed(10), 7);

        let half = AccumulationPolicy {
            min_fraction: 0.5,
            ..AccumulationPolicy::default()
        };
        assert_eq!(half.min_needed(3), 2);
        assert_eq!(half.min_needed(1), 1);

        let odd = AccumulationPolicy {
            min_fraction: 0.29,
            ..AccumulationPolicy::default()
        };
        assert_eq!(odd.min_needed(100), 29);
    }

    #[test]
    fn batch_size_overfetches_within_bounds() {
        let policy = AccumulationPolicy::default();
        assert_eq!(policy.batch_size(100), 80);
        assert_eq!(policy.batch_size(35), 70);
        assert_eq!(policy.batch_size(10), 30);
        assert_eq!(policy.batch_size(1), 30);
    }

    #[test]
    fn offset_is_the_sum_of_requested_batches() {
        let source = ScriptedSource::new(vec![10, 10, 10, 10, 10]);
        let out = run(&source, 100);
        let calls = source.calls.borrow();
        let mut expected_offset = 0;
        for (offset, batch) in calls.iter() {
            assert_eq!(*offset, expected_offset);
            expected_offset += batch;
        }
        assert_eq!(out.offset, expected_offset);
        assert_eq!(out.rounds, calls.len());
    }

    #[test]
    fn stops_as_soon_as_target_is_on_disk() {
        let source = ScriptedSource::new(vec![60, 60, 60]);
        let out = run(&source, 100);
        assert_eq!(out.images, 120);
        assert!(out.exact);
        assert_eq!(out.stop, StopReason::TargetReached);
        assert_eq!(source.calls.borrow().len(), 2);
    }

    #[test]
    fn target_already_met_issues_no_calls() {
        let dir = tempfile::tempdir().expect("tempdir");
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("{i}.jpg")), [i as u8]).expect("write");
        }
        let source = ScriptedSource::new(vec![]);
        let out = download_until_target(
            &source,
            "cats",
            dir.path(),
            5,
            &AccumulationPolicy::default(),
            no_log,
        )
        .expect("loop");
        assert!(out.exact);
        assert_eq!(out.rounds, 0);
        assert!(source.calls.borrow().is_empty());
    }

    #[test]
    fn stagnation_above_minimum_is_good_enough() {
        let source = ScriptedSource::new(vec![70]);
        let out = run(&source, 100);
        assert_eq!(out.images, 70);
        assert!(!out.exact);
        assert_eq!(out.stop, StopReason::GoodEnough);
        assert_eq!(source.calls.borrow().len(), 4);
    }

    #[test]
    fn stagnation_below_minimum_gives_up() {
        let source = ScriptedSource::new(vec![40]);
        let out = run(&source, 100);
        assert_eq!(out.images, 40);
        assert!(!out.exact);
        assert_eq!(out.stop, StopReason::Stagnated);
        assert_eq!(source.calls.borrow().len(), 5);
    }

    #[test]
    fn empty_provider_stops_after_fourth_stagnant_round() {
        let source = ScriptedSource::new(vec![]);
        let out = run(&source, 100);
        assert_eq!(out.images, 0);
        assert_eq!(out.stop, StopReason::Stagnated);
        assert_eq!(source.calls.borrow().len(), 3);
    }

    #[test]
    fn slow_progress_runs_out_of_rounds_then_rescans() {
        let source = ScriptedSource::new(vec![5; 20]);
        let out = run(&source, 100);
        assert_eq!(source.calls.borrow().len(), DEFAULT_MAX_ROUNDS);
        assert_eq!(out.images, 5 * DEFAULT_MAX_ROUNDS);
        assert_eq!(out.stop, StopReason::RoundsExhausted);
        assert!(!out.exact);
    }

    #[test]
    fn target_reached_in_last_round_is_exact() {
        let policy = AccumulationPolicy {
            max_rounds: 3,
            ..AccumulationPolicy::default()
        };
        let source = ScriptedSource::new(vec![4, 4, 4]);
        let dir = tempfile::tempdir().expect("tempdir");
        let out =
            download_until_target(&source, "cats", dir.path(), 12, &policy, no_log).expect("loop");
        assert_eq!(out.images, 12);
        assert!(out.exact);
        assert_eq!(out.stop, StopReason::RoundsExhausted);
    }

    #[test]
    fn provider_errors_do_not_abort_the_loop() {
        let source = FailingSource {
            calls: RefCell::new(0),
        };
        let dir = tempfile::tempdir().expect("tempdir");
        let mut warnings = Vec::new();
        let out = download_until_target(
            &source,
            "cats",
            dir.path(),
            10,
            &AccumulationPolicy::default(),
            |level, event, _data| {
                if level == "warn" {
                    warnings.push(event.to_string());
                }
                Ok(())
            },
        )
        .expect("loop");
        assert_eq!(out.images, 0);
        assert_eq!(*source.calls.borrow(), 3);
        assert_eq!(out.offset, 90);
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().all(|w| w == "harvest_round_fetch_failed"));
    }

    #[test]
    fn zero_target_is_rejected() {
        let source = ScriptedSource::new(vec![]);
        let dir = tempfile::tempdir().expect("tempdir");
        let err = download_until_target(
            &source,
            "cats",
            dir.path(),
            0,
            &AccumulationPolicy::default(),
            no_log,
        )
        .expect_err("zero target");
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }
}
