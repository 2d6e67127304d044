use anyhow::{Context, bail};
use tidepool_core::Observation;

/// Scores the transition between two consecutive frames.
///
/// Errors are handed back to the caller of `step` untouched.
pub trait RewardFn: Send {
    fn reward(&mut self, previous: &Observation, next: &Observation) -> anyhow::Result<f64>;
}

impl<F> RewardFn for F
where
    F: FnMut(&Observation, &Observation) -> anyhow::Result<f64> + Send,
{
    fn reward(&mut self, previous: &Observation, next: &Observation) -> anyhow::Result<f64> {
        self(previous, next)
    }
}

/// Mean absolute per-channel RGB difference between the two frames.
///
/// Rewards touches that visibly change the screen.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeanPixelDifference;

impl RewardFn for MeanPixelDifference {
    fn reward(&mut self, previous: &Observation, next: &Observation) -> anyhow::Result<f64> {
        let before = image::load_from_memory(previous.image())
            .context("previous frame is not a readable image")?
            .to_rgb8();
        let after = image::load_from_memory(next.image())
            .context("new frame is not a readable image")?
            .to_rgb8();
        if before.dimensions() != after.dimensions() {
            bail!(
                "frame size changed from {:?} to {:?}",
                before.dimensions(),
                after.dimensions()
            );
        }

        let channels = before.as_raw().len();
        if channels == 0 {
            return Ok(0.0);
        }
        let total: u64 = before
            .as_raw()
            .iter()
            .zip(after.as_raw())
            .map(|(a, b)| u64::from(a.abs_diff(*b)))
            .sum();
        Ok(total as f64 / channels as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::tests::png;

    #[test_timeout::timeout]
    fn identical_frames_score_zero() {
        let frame = png(4, 4, [10, 20, 30]);
        assert_eq!(MeanPixelDifference.reward(&frame, &frame).expect("reward"), 0.0);
    }

    #[test_timeout::timeout]
    fn uniform_shift_scores_the_shift() {
        let before = png(4, 3, [10, 20, 30]);
        let after = png(4, 3, [11, 19, 31]);
        assert_eq!(MeanPixelDifference.reward(&before, &after).expect("reward"), 1.0);

        // Decreases count as much as increases.
        let darker = png(4, 3, [0, 0, 6]);
        assert_eq!(MeanPixelDifference.reward(&before, &darker).expect("reward"), 18.0);
        assert_eq!(MeanPixelDifference.reward(&darker, &before).expect("reward"), 18.0);
    }

    #[test_timeout::timeout]
    fn mismatched_sizes_are_an_error() {
        let err = MeanPixelDifference
            .reward(&png(4, 4, [0, 0, 0]), &png(4, 5, [0, 0, 0]))
            .expect_err("size mismatch");
        assert!(err.to_string().contains("frame size changed"));
    }

    #[test_timeout::timeout]
    fn closures_are_reward_functions() {
        let mut calls = 0;
        let mut counting = |_: &Observation, next: &Observation| -> anyhow::Result<f64> {
            calls += 1;
            Ok(next.len() as f64)
        };
        let frame = Observation::new(vec![0u8; 24]);
        assert_eq!(counting.reward(&frame, &frame).expect("reward"), 24.0);
        drop(counting);
        assert_eq!(calls, 1);
    }
}
