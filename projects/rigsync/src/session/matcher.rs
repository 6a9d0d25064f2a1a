use crate::session::filename::{secs, BehaviorSession, VideoSession};
use chrono::NaiveDateTime;
use serde::Serialize;

/// Best video for one behavior session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionMatch {
    /// Index into the video list, `None` when nothing overlaps.
    pub video_index: Option<usize>,
    pub overlap_secs: f64,
}

impl SessionMatch {
    pub const NONE: SessionMatch = SessionMatch {
        video_index: None,
        overlap_secs: 0.0,
    };
}

/// Signed overlap in seconds: `min(ends) - max(starts)`. Negative when disjoint.
pub fn overlap_secs(a: (NaiveDateTime, NaiveDateTime), b: (NaiveDateTime, NaiveDateTime)) -> f64 {
    let latest_start = a.0.max(b.0);
    let earliest_end = a.1.min(b.1);
    secs(earliest_end - latest_start)
}

/// Picks the video on the same rig with the largest positive overlap.
///
/// Ties go to the earlier video. Partial video records never match.
pub fn best_video(behavior: &BehaviorSession, videos: &[VideoSession]) -> SessionMatch {
    let mut best: Option<(usize, f64)> = None;
    for (idx, video) in videos.iter().enumerate() {
        if video.rig != behavior.rig {
            continue;
        }
        let Some(interval) = video.interval() else {
            continue;
        };
        let overlap = overlap_secs((behavior.start, behavior.end), interval);
        if best.map_or(true, |(_, b)| overlap > b) {
            best = Some((idx, overlap));
        }
    }

    match best {
        Some((idx, overlap)) if overlap > 0.0 => SessionMatch {
            video_index: Some(idx),
            overlap_secs: overlap,
        },
        _ => SessionMatch::NONE,
    }
}

pub fn match_sessions(behaviors: &[BehaviorSession], videos: &[VideoSession]) -> Vec<SessionMatch> {
    behaviors.iter().map(|b| best_video(b, videos)).collect()
}
