pub mod fit;
pub mod plan;

pub use fit::LinearFit;
pub use plan::{AlignParams, AlignmentPlan, Checkpoint, Refit};

/// Maps behavior event times into video time: `fit(t - offset)`.
///
/// `offset` is the video start minus the behavior start, in seconds.
/// Undefined events stay undefined.
pub fn behavior_to_video(events: &[Option<f64>], offset: f64, fit: &LinearFit) -> Vec<Option<f64>> {
    events
        .iter()
        .map(|t| t.map(|v| fit.eval(v - offset)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_behavior_to_video() {
        let fit = LinearFit::new(2.0, 1.0);
        assert_eq!(
            behavior_to_video(&[Some(10.0), None, Some(5.0)], 5.0, &fit),
            vec![Some(11.0), None, Some(1.0)]
        );
    }
}
