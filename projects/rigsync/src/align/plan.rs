// Choosing reference points for manual video alignment and refitting
//
// Pass one: guess video times for the candidate events, pick the points just
// before the largest gaps, and print seek commands for a video player.
// Pass two: the user reports the true video time of each point and the
// guess is corrected with a least-squares line.

use crate::align::fit::LinearFit;
use crate::errors::AlignError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AlignParams {
    /// Number of reference points (and index segments).
    pub n_points: usize,
    /// Times closer than this to either end of the video are ignored.
    pub buffer: f64,
    /// Seconds to start playback ahead of each guessed time.
    pub pre_roll: f64,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self {
            n_points: 4,
            buffer: 10.0,
            pre_roll: 10.0,
        }
    }
}

/// Undefines every time outside `[buffer, end_time - buffer]`, keeping indices.
pub fn mask_by_buffer_from_end(times: &[Option<f64>], end_time: f64, buffer: f64) -> Vec<Option<f64>> {
    times
        .iter()
        .map(|t| t.filter(|&v| v >= buffer && v <= end_time - buffer))
        .collect()
}

/// For each of `n` equal segments of the defined times, the index of the
/// point immediately preceding the segment's largest consecutive gap.
///
/// Segment boundaries are positions `len * k / n` among the defined values
/// plus the last defined position; both ends are inclusive. Ties keep the
/// earlier point.
pub fn index_of_biggest_gaps(times: &[Option<f64>], n: usize) -> Result<Vec<usize>, AlignError> {
    if n == 0 {
        return Err(AlignError::ZeroPoints);
    }
    let defined: Vec<(usize, f64)> = times
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.map(|v| (i, v)))
        .collect();
    if defined.len() < n + 1 {
        return Err(AlignError::InsufficientTimes {
            needed: n + 1,
            found: defined.len(),
        });
    }

    let len = defined.len();
    let mut cuts: Vec<usize> = (0..n).map(|k| len * k / n).collect();
    cuts.push(len - 1);

    let mut res = Vec::with_capacity(n);
    for bounds in cuts.windows(2) {
        let mut best: Option<(usize, f64)> = None;
        for pos in bounds[0]..bounds[1] {
            let gap = defined[pos + 1].1 - defined[pos].1;
            if best.map_or(true, |(_, g)| gap > g) {
                best = Some((pos, gap));
            }
        }
        if let Some((pos, _)) = best {
            res.push(defined[pos].0);
        }
    }
    Ok(res)
}

/// A point the user should locate in the video.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    /// Index into the candidate times.
    pub index: usize,
    /// Guessed video time.
    pub guess: f64,
    /// Guessed time of the following candidate, if defined.
    pub next: Option<f64>,
}

impl Checkpoint {
    /// Start is `trunc(guess) - pre_roll` and may be negative when the
    /// buffer is shorter than the pre-roll.
    pub fn seek_command(&self, video: &Path, pre_roll: f64) -> String {
        let start = (self.guess.trunc() - pre_roll).trunc() as i64;
        let next = match self.next {
            Some(n) => format!("{:.1}", n),
            None => "nan".to_string(),
        };
        format!(
            "mplayer -ss {} {} # guess {:.1}, next {}",
            start,
            video.display(),
            self.guess,
            next
        )
    }
}

/// Result of refitting against user-confirmed times.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Refit {
    /// Correction fit on the guessed times.
    pub correction: LinearFit,
    /// Initial guess followed by the correction.
    pub combined: LinearFit,
    /// Observed minus predicted, per checkpoint.
    pub residuals: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct AlignmentPlan {
    pub initial: LinearFit,
    pub params: AlignParams,
    /// Candidates after the initial guess and masking, index aligned.
    pub guessed: Vec<Option<f64>>,
    pub checkpoints: Vec<Checkpoint>,
}

impl AlignmentPlan {
    /// Plans reference points for `candidates` (behavior times already
    /// shifted by the start offset; NaN means undefined).
    pub fn new(
        candidates: &[f64],
        video_duration: f64,
        initial: LinearFit,
        params: AlignParams,
    ) -> Result<Self, AlignError> {
        let raw: Vec<Option<f64>> = candidates
            .iter()
            .map(|&t| (!t.is_nan()).then(|| initial.eval(t)))
            .collect();
        let guessed = mask_by_buffer_from_end(&raw, video_duration, params.buffer);

        let checkpoints = index_of_biggest_gaps(&guessed, params.n_points)?
            .into_iter()
            .filter_map(|index| {
                Some(Checkpoint {
                    index,
                    guess: guessed[index]?,
                    next: guessed.get(index + 1).copied().flatten(),
                })
            })
            .collect();

        Ok(Self {
            initial,
            params,
            guessed,
            checkpoints,
        })
    }

    pub fn seek_commands(&self, video: &Path) -> Vec<String> {
        self.checkpoints
            .iter()
            .map(|c| c.seek_command(video, self.params.pre_roll))
            .collect()
    }

    pub fn guessed_times(&self) -> Vec<f64> {
        self.checkpoints.iter().map(|c| c.guess).collect()
    }

    /// Fits a correction from the user's video times, one per checkpoint.
    ///
    /// A wrong number of times or a degenerate fit logs a warning and
    /// returns `None`; the initial guess stays in effect.
    pub fn refit(&self, observed: &[f64]) -> Option<Refit> {
        if observed.len() != self.params.n_points {
            tracing::warn!(
                "Expected {} user results, got {}; not refitting",
                self.params.n_points,
                observed.len()
            );
            return None;
        }

        let guessed = self.guessed_times();
        let correction = match LinearFit::fit(&guessed, observed) {
            Ok(fit) => fit,
            Err(e) => {
                tracing::warn!("Not refitting: {}", e);
                return None;
            }
        };

        Some(Refit {
            correction,
            combined: self.initial.then(&correction),
            residuals: correction.residuals(&guessed, observed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_keeps_values_inside_buffer() {
        let times: Vec<Option<f64>> = [-5.0, 0.0, 9.99, 10.0, 50.0, 90.0, 90.01, 200.0]
            .iter()
            .map(|&t| Some(t))
            .chain([None])
            .collect();
        let (end, buffer) = (100.0, 10.0);
        let masked = mask_by_buffer_from_end(&times, end, buffer);

        assert_eq!(masked.len(), times.len());
        for v in masked.iter().flatten() {
            assert!(*v >= buffer && *v <= end - buffer);
        }
        assert_eq!(
            masked,
            vec![None, None, None, Some(10.0), Some(50.0), Some(90.0), None, None, None]
        );
    }

    #[test]
    fn test_biggest_gaps_per_segment() {
        // Two segments over 8 defined values; undefined entries keep their index.
        let times = vec![
            Some(0.0),
            Some(1.0),
            None,
            Some(6.0),
            Some(7.0),
            Some(8.0),
            Some(9.0),
            Some(20.0),
            Some(21.0),
        ];
        // defined positions: 0..8 -> cuts [0, 4, 7]
        // segment 0: values 0,1,6,7,8 gaps 1,5,1,1 -> position 1 (index 1)
        // segment 1: values 8,9,20,21 gaps 1,11,1 -> position 5 (index 6)
        assert_eq!(index_of_biggest_gaps(&times, 2).unwrap(), vec![1, 6]);
    }

    #[test]
    fn test_biggest_gaps_ties_keep_first() {
        let times: Vec<Option<f64>> = (0..6).map(|i| Some(i as f64 * 2.0)).collect();
        assert_eq!(index_of_biggest_gaps(&times, 1).unwrap(), vec![0]);
    }

    #[test]
    fn test_biggest_gaps_needs_enough_points() {
        let times = vec![Some(1.0), None, Some(2.0)];
        assert!(matches!(
            index_of_biggest_gaps(&times, 2),
            Err(AlignError::InsufficientTimes { needed: 3, found: 2 })
        ));
        assert!(matches!(
            index_of_biggest_gaps(&times, 0),
            Err(AlignError::ZeroPoints)
        ));
    }

    fn candidates() -> Vec<f64> {
        // Trials every 20 s with a few long pauses the user can spot.
        let mut t = 0.0;
        let mut out = Vec::new();
        for i in 0..60 {
            t += if i % 15 == 7 { 95.0 } else { 20.0 };
            out.push(t);
        }
        out
    }

    #[test]
    fn test_plan_is_deterministic_and_inside_video() {
        let params = AlignParams::default();
        let candidates = candidates();
        let duration = 1500.0;
        let a = AlignmentPlan::new(&candidates, duration, LinearFit::IDENTITY, params).unwrap();
        let b = AlignmentPlan::new(&candidates, duration, LinearFit::IDENTITY, params).unwrap();

        assert_eq!(a.checkpoints, b.checkpoints);
        assert_eq!(a.checkpoints.len(), params.n_points);
        for c in &a.checkpoints {
            assert!(c.guess >= params.buffer && c.guess <= duration - params.buffer);
        }
        assert_eq!(a.guessed.len(), candidates.len());
    }

    #[test]
    fn test_plan_picks_points_before_long_pauses() {
        let plan = AlignmentPlan::new(
            &candidates(),
            1e6,
            LinearFit::IDENTITY,
            AlignParams::default(),
        )
        .unwrap();
        for c in &plan.checkpoints {
            let next = c.next.unwrap();
            assert_eq!(next - c.guess, 95.0);
        }
    }

    #[test]
    fn test_seek_command_format() {
        let c = Checkpoint {
            index: 3,
            guess: 123.46,
            next: Some(218.0),
        };
        assert_eq!(
            c.seek_command(Path::new("/v/L1.20190101120000.mp4"), 10.0),
            "mplayer -ss 113 /v/L1.20190101120000.mp4 # guess 123.5, next 218.0"
        );
        let last = Checkpoint {
            next: None,
            ..c
        };
        assert!(last.seek_command(Path::new("v.mp4"), 10.0).ends_with("next nan"));
    }

    #[test]
    fn test_seek_command_is_not_clamped_at_zero() {
        let early = Checkpoint {
            index: 0,
            guess: 4.7,
            next: Some(50.0),
        };
        assert_eq!(
            early.seek_command(Path::new("v.mp4"), 10.0),
            "mplayer -ss -6 v.mp4 # guess 4.7, next 50.0"
        );
    }

    #[test]
    fn test_refit_composes_guess_then_correction() {
        let initial = LinearFit::new(0.9991, 7.5);
        let params = AlignParams::default();
        let plan = AlignmentPlan::new(&candidates(), 1e6, initial, params).unwrap();

        let truth = LinearFit::new(1.02, -0.3);
        let observed: Vec<f64> = plan.guessed_times().iter().map(|g| truth.eval(*g)).collect();
        let refit = plan.refit(&observed).unwrap();

        assert!((refit.correction.slope - 1.02).abs() < 1e-9);
        assert!((refit.correction.intercept + 0.3).abs() < 1e-6);
        assert!(refit.residuals.iter().all(|r| r.abs() < 1e-6));

        let expected = initial.then(&truth);
        assert!((refit.combined.slope - expected.slope).abs() < 1e-9);
        assert!((refit.combined.intercept - expected.intercept).abs() < 1e-6);
        assert!((refit.combined.intercept - truth.then(&initial).intercept).abs() > 0.1);
    }

    #[test]
    fn test_refit_with_wrong_count_is_no_update() {
        let plan = AlignmentPlan::new(
            &candidates(),
            1e6,
            LinearFit::IDENTITY,
            AlignParams::default(),
        )
        .unwrap();
        assert!(plan.refit(&[1.0, 2.0, 3.0]).is_none());
        assert!(plan.refit(&[]).is_none());
    }

    #[test]
    fn test_nan_candidates_are_undefined() {
        let mut candidates = candidates();
        candidates[10] = f64::NAN;
        let plan = AlignmentPlan::new(
            &candidates,
            1e6,
            LinearFit::IDENTITY,
            AlignParams::default(),
        )
        .unwrap();
        assert_eq!(plan.guessed[10], None);
        assert!(plan.checkpoints.iter().all(|c| c.index != 10));
    }
}
