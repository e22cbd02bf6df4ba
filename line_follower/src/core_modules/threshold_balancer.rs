// THEORY:
// Lighting on the floor changes constantly, so a fixed binarization cutoff either
// drowns the frame in white or loses the line entirely. The `ThresholdBalancer`
// runs a short, bounded local search over the cutoff `T`: binarize, mask to the
// ROI, measure what percentage of the ROI turned white, and nudge `T` up (too
// much white) or down (too little) in fixed steps until the percentage falls
// inside the configured band.
//
// Two rules keep the search from wandering:
// 1.  **Range bound**: `T` never leaves `[min_threshold, max_threshold]`. A step
//     that would cross the bound ends the search with no frame.
// 2.  **Reversal acceptance**: if the search has to turn around (it was raising
//     `T` and now needs to lower it, or the opposite), the band is unreachable
//     between two neighbouring cutoffs. The frame just computed is accepted as
//     the best effort instead of bouncing until the iteration cap.
// The search is stateless between frames: every frame starts again from
// `initial_threshold`.

use crate::config::FollowerConfig;
use crate::core_modules::roi::{RegionOfInterest, count_non_zero};
use crate::error::TrackingError;
use image::{GrayImage, Luma};

/// Distance between two consecutive thresholds tried by the search.
pub const THRESHOLD_STEP: u8 = 10;

/// Why the search stopped with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceOutcome {
    /// The white percentage landed inside the band.
    InBand,
    /// The search changed direction; the last masked frame is a best effort.
    Reversed,
}

/// A binary, ROI-masked frame together with how it was obtained.
#[derive(Debug, Clone)]
pub struct Balanced {
    pub frame: GrayImage,
    pub threshold: u8,
    pub white_pct: f64,
    /// Number of binarize-and-measure steps performed, including the last one.
    pub iterations: u32,
    pub outcome: BalanceOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Increasing,
    Decreasing,
}

/// Bounded search for a binarization threshold.
#[derive(Debug, Clone)]
pub struct ThresholdBalancer {
    initial_threshold: u8,
    min_threshold: u8,
    max_threshold: u8,
    iterations: u32,
    min_white_pct: f64,
    max_white_pct: f64,
}

impl ThresholdBalancer {
    pub fn new(config: &FollowerConfig) -> Self {
        Self {
            initial_threshold: config
                .initial_threshold
                .clamp(config.min_threshold, config.max_threshold),
            min_threshold: config.min_threshold,
            max_threshold: config.max_threshold,
            iterations: config.balance_iterations,
            min_white_pct: config.min_white_pct,
            max_white_pct: config.max_white_pct,
        }
    }

    /// Searches a threshold for a grayscale, blurred frame.
    pub fn balance(
        &self,
        frame: &GrayImage,
        roi: &RegionOfInterest,
    ) -> Result<Balanced, TrackingError> {
        let area = roi.area();
        if area == 0 {
            return Err(TrackingError::RoiUninitialized);
        }

        let mut threshold = self.initial_threshold;
        let mut direction: Option<Direction> = None;

        for step in 1..=self.iterations {
            let masked = roi.mask_to_roi(&binarize(frame, threshold));
            let white_pct = 100.0 * count_non_zero(&masked) as f64 / area as f64;
            log::debug!("balance step {step}: threshold {threshold}, white {white_pct:.2}%");

            let accept = move |outcome| Balanced {
                frame: masked,
                threshold,
                white_pct,
                iterations: step,
                outcome,
            };

            if white_pct > self.max_white_pct {
                if direction == Some(Direction::Decreasing) {
                    return Ok(accept(BalanceOutcome::Reversed));
                }
                match threshold.checked_add(THRESHOLD_STEP) {
                    Some(next) if next <= self.max_threshold => threshold = next,
                    _ => {
                        return Err(TrackingError::ThresholdUnbalanced {
                            iterations: step,
                            last_threshold: threshold,
                        });
                    }
                }
                direction = Some(Direction::Increasing);
            } else if white_pct < self.min_white_pct {
                if direction == Some(Direction::Increasing) {
                    return Ok(accept(BalanceOutcome::Reversed));
                }
                match threshold.checked_sub(THRESHOLD_STEP) {
                    Some(next) if next >= self.min_threshold => threshold = next,
                    _ => {
                        return Err(TrackingError::ThresholdUnbalanced {
                            iterations: step,
                            last_threshold: threshold,
                        });
                    }
                }
                direction = Some(Direction::Decreasing);
            } else {
                return Ok(accept(BalanceOutcome::InBand));
            }
        }

        Err(TrackingError::ThresholdUnbalanced {
            iterations: self.iterations,
            last_threshold: threshold,
        })
    }
}

/// Pixels at or above `threshold` become 255, everything else 0.
pub fn binarize(frame: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = GrayImage::new(frame.width(), frame.height());
    for (dst, src) in out.pixels_mut().zip(frame.pixels()) {
        if src[0] >= threshold {
            *dst = Luma([255]);
        }
    }
    out
}
