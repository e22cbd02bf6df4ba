// THEORY:
// The `pipeline` module is the top-level API of the line follower. `LinePipeline`
// owns everything that must survive from one frame to the next (the lazily built
// region of interest, the drive policy with its state, the frame counter and the
// optional debug sink) and runs the stages in order for each frame:
//
//   capture -> grayscale + blur -> threshold balance (ROI-masked) -> dominant
//   contour -> oriented box -> line vector -> pose -> drive decision
//
// Every failure before the pose is a value, not a panic. Most of them mean "the
// line is lost" and are handed to the policy as a missing pose. A few are skips
// (no frame, resolution change, catching up after a slow frame): those produce no
// decision at all and leave the drive state exactly as it was.

use crate::config::FollowerConfig;
use crate::core_modules::contour::Contour;
use crate::core_modules::debug_sink::annotate;
use crate::core_modules::drive_policy::policy_for;
use crate::core_modules::line_extractor::{self, OrientedBox};
use crate::core_modules::pose::{self, LineVector, Pose};
use crate::core_modules::roi::RegionOfInterest;
use crate::core_modules::threshold_balancer::{BalanceOutcome, ThresholdBalancer};
use crate::error::TrackingError;
use image::{GrayImage, RgbImage, imageops};
use std::time::Instant;

// Re-export key data structures for the public API.
pub use crate::core_modules::debug_sink::{DebugImage, DebugSink, DiskSink, Stage};
pub use crate::core_modules::drive_policy::{
    Decision, DriveCommand, DrivePhase, DrivePolicy, DriveState, Intent, Motion, StopReason,
    TurnDirection,
};

/// Everything the geometry stages found in one frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub pose: Pose,
    pub line: LineVector,
    pub oriented_box: OrientedBox,
    pub contour: Contour,
    pub threshold: u8,
    pub white_pct: f64,
    pub iterations: u32,
    pub balance: BalanceOutcome,
}

/// The primary output of the pipeline for a single frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_index: u64,
    pub detection: Result<Detection, TrackingError>,
    /// `None` when the frame was skipped and the policy was not consulted.
    pub decision: Option<Decision>,
}

impl FrameReport {
    pub fn pose(&self) -> Option<Pose> {
        self.detection.as_ref().ok().map(|d| d.pose)
    }

    pub fn is_skipped(&self) -> bool {
        self.decision.is_none()
    }
}

/// Per-stream owner of the ROI, the drive policy and the debug side channel.
pub struct LinePipeline {
    config: FollowerConfig,
    roi: RegionOfInterest,
    balancer: ThresholdBalancer,
    policy: Box<dyn DrivePolicy>,
    sink: Option<Box<dyn DebugSink>>,
    frame_index: u64,
    skip_next: bool,
}

impl LinePipeline {
    /// Builds a pipeline; a configured debug directory gets a `DiskSink`.
    pub fn new(config: FollowerConfig) -> Self {
        let sink: Option<Box<dyn DebugSink>> = match &config.debug.dir {
            Some(dir) => match DiskSink::new(dir, config.debug.every_n_frames) {
                Ok(sink) => Some(Box::new(sink)),
                Err(e) => {
                    log::warn!("debug images disabled, cannot use {}: {e}", dir.display());
                    None
                }
            },
            None => None,
        };

        Self {
            balancer: ThresholdBalancer::new(&config),
            policy: policy_for(&config),
            roi: RegionOfInterest::new(),
            sink,
            frame_index: 0,
            skip_next: false,
            config,
        }
    }

    /// Replaces the debug sink.
    pub fn with_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &FollowerConfig {
        &self.config
    }

    pub fn roi(&self) -> &RegionOfInterest {
        &self.roi
    }

    pub fn drive_state(&self) -> &DriveState {
        self.policy.state()
    }

    /// Number of frames handed to `process_frame` so far.
    pub fn frames_seen(&self) -> u64 {
        self.frame_index
    }

    /// External restart signal: clears the policy's history and latch.
    pub fn reset(&mut self) {
        log::info!("drive state reset");
        self.policy.reset();
    }

    /// Runs one acquisition cycle: geometry on `frame`, then the drive decision.
    pub fn process_frame(&mut self, frame: Option<&RgbImage>) -> FrameReport {
        let frame_index = self.frame_index;
        self.frame_index += 1;
        let started = Instant::now();

        let detection = match frame {
            None => Err(TrackingError::FrameUnavailable),
            Some(frame) if frame.width() == 0 || frame.height() == 0 => {
                Err(TrackingError::FrameUnavailable)
            }
            Some(_) if self.skip_next => Err(TrackingError::OverBudget),
            Some(frame) => self.detect_indexed(frame, frame_index),
        };
        self.skip_next = false;

        let decision = match &detection {
            Err(e) if e.is_skip() => {
                log::warn!("frame {frame_index} skipped: {e}");
                None
            }
            Err(e) => {
                log::debug!("frame {frame_index}: no pose ({e})");
                Some(self.decide(None))
            }
            Ok(d) => Some(self.decide(Some(d.pose))),
        };

        let ran_geometry = !matches!(&detection, Err(e) if e.is_skip());
        if let Some(budget) = self.config.frame_budget().filter(|_| ran_geometry) {
            let elapsed = started.elapsed();
            if elapsed > budget {
                log::warn!(
                    "frame {frame_index} took {:.1} ms (budget {:.1} ms), skipping the next",
                    elapsed.as_secs_f64() * 1e3,
                    budget.as_secs_f64() * 1e3
                );
                self.skip_next = true;
            }
        }

        FrameReport {
            frame_index,
            detection,
            decision,
        }
    }

    /// Geometry stages only; does not consult or change the drive policy.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Detection, TrackingError> {
        self.detect_indexed(frame, self.frame_index)
    }

    fn decide(&mut self, pose: Option<Pose>) -> Decision {
        let before = self.policy.state().halted;
        let decision = self.policy.decide(pose);
        if !before && self.policy.state().halted {
            log::info!("line follower stopped, waiting for reset");
        }
        decision
    }

    fn detect_indexed(
        &mut self,
        frame: &RgbImage,
        frame_index: u64,
    ) -> Result<Detection, TrackingError> {
        let record = self.sink.as_ref().is_some_and(|s| s.wants(frame_index));

        // --- 1. Region of interest ---
        let dims = frame.dimensions();
        match self.roi.resolution() {
            None => self.roi.initialize(dims.0, dims.1),
            Some(expected) if expected != dims => {
                return Err(TrackingError::ResolutionChanged {
                    expected,
                    actual: dims,
                });
            }
            Some(_) => {}
        }

        // --- 2. Grayscale + blur ---
        let gray = self.preprocess(frame);
        if record {
            self.record(Stage::Raw, frame_index, DebugImage::Rgb(frame));
            self.record(Stage::Grayed, frame_index, DebugImage::Gray(&gray));
        }

        // --- 3. Threshold balance ---
        let balanced = self.balancer.balance(&gray, &self.roi)?;
        if record {
            self.record(Stage::Balanced, frame_index, DebugImage::Gray(&balanced.frame));
        }

        // --- 4. Dominant contour and oriented box ---
        let (contour, oriented_box) = line_extractor::extract(&balanced.frame)?;

        // --- 5. Pose ---
        let line = pose::vector_from_box(&oriented_box)?;
        let pose = pose::pose_from_vector(&line, dims.0, dims.1);
        log::debug!(
            "frame {frame_index}: threshold {} ({:.1}% white), angle {:.1}, shift {:.1}",
            balanced.threshold,
            balanced.white_pct,
            pose.angle,
            pose.shift
        );

        if record {
            let annotated = annotate(frame, &contour, &oriented_box, &line);
            self.record(Stage::Annotated, frame_index, DebugImage::Rgb(&annotated));
        }

        Ok(Detection {
            pose,
            line,
            oriented_box,
            contour,
            threshold: balanced.threshold,
            white_pct: balanced.white_pct,
            iterations: balanced.iterations,
            balance: balanced.outcome,
        })
    }

    fn preprocess(&self, frame: &RgbImage) -> GrayImage {
        let gray = imageops::grayscale(frame);
        if self.config.blur_sigma > 0.0 {
            imageops::blur(&gray, self.config.blur_sigma)
        } else {
            gray
        }
    }

    fn record(&mut self, stage: Stage, frame_index: u64, image: DebugImage<'_>) {
        if let Some(sink) = self.sink.as_mut() {
            sink.record(stage, frame_index, image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::{Arc, Mutex};

    fn strip(w: u32, h: u32, x0: u32, x1: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, _| {
            if (x0..x1).contains(&x) { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        })
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        every_n: u64,
        seen: Arc<Mutex<Vec<(Stage, u64)>>>,
    }

    impl DebugSink for RecordingSink {
        fn wants(&self, frame_index: u64) -> bool {
            frame_index % self.every_n == 0
        }

        fn record(&mut self, stage: Stage, frame_index: u64, _image: DebugImage<'_>) {
            self.seen.lock().expect("lock").push((stage, frame_index));
        }
    }

    #[test]
    fn roi_is_built_lazily_from_the_first_frame() {
        let mut pipeline = LinePipeline::new(FollowerConfig::default());
        assert_eq!(pipeline.roi().area(), 0);
        pipeline.process_frame(Some(&strip(160, 120, 70, 90)));
        assert_eq!(pipeline.roi().resolution(), Some((160, 120)));
        assert!(pipeline.roi().area() > 0);
    }

    #[test]
    fn missing_frame_is_skipped_without_a_decision() {
        let mut pipeline = LinePipeline::new(FollowerConfig::default());
        let report = pipeline.process_frame(None);
        assert!(report.is_skipped());
        assert_eq!(report.detection.unwrap_err(), TrackingError::FrameUnavailable);
        assert_eq!(pipeline.drive_state(), &DriveState::new(5));
        assert_eq!(pipeline.frames_seen(), 1);
    }

    #[test]
    fn empty_frame_is_skipped_like_a_missing_one() {
        let mut pipeline = LinePipeline::new(FollowerConfig::default());
        pipeline.process_frame(Some(&strip(160, 120, 110, 130)));
        let state = pipeline.drive_state().clone();

        for empty in [RgbImage::new(0, 0), RgbImage::new(0, 120), RgbImage::new(160, 0)] {
            let report = pipeline.process_frame(Some(&empty));
            assert!(report.is_skipped());
            assert_eq!(report.detection.as_ref().unwrap_err(), &TrackingError::FrameUnavailable);
        }
        assert_eq!(pipeline.drive_state(), &state);
        assert_eq!(pipeline.roi().resolution(), Some((160, 120)));
    }

    #[test]
    fn tiny_frames_do_not_panic() {
        for (w, h) in [(1, 1), (1, 5), (5, 1), (2, 2), (3, 7)] {
            let mut pipeline = LinePipeline::new(FollowerConfig::default());
            let report = pipeline.process_frame(Some(&RgbImage::new(w, h)));
            assert!(report.detection.is_err(), "{w}x{h}");
        }
    }

    #[test]
    fn resolution_change_is_skipped() {
        let mut pipeline = LinePipeline::new(FollowerConfig::default());
        pipeline.process_frame(Some(&strip(160, 120, 70, 90)));
        let report = pipeline.process_frame(Some(&strip(320, 240, 140, 180)));
        assert_eq!(
            report.detection.unwrap_err(),
            TrackingError::ResolutionChanged {
                expected: (160, 120),
                actual: (320, 240)
            }
        );
        assert!(report.decision.is_none());
        assert_eq!(pipeline.roi().resolution(), Some((160, 120)));
    }

    #[test]
    fn lost_line_reaches_the_policy() {
        let mut pipeline = LinePipeline::new(FollowerConfig::default());
        let report = pipeline.process_frame(Some(&RgbImage::new(160, 120)));
        assert!(matches!(
            report.detection,
            Err(TrackingError::ThresholdUnbalanced { .. })
        ));
        assert_eq!(report.decision, Some(Decision::Stop(StopReason::NoSearchDirection)));
    }

    #[test]
    fn tiny_frame_budget_skips_every_other_frame() {
        let config = FollowerConfig {
            frame_budget: Some(1e-9),
            ..FollowerConfig::default()
        };
        let mut pipeline = LinePipeline::new(config);
        let frame = strip(160, 120, 70, 90);
        let first = pipeline.process_frame(Some(&frame));
        assert!(!first.is_skipped());
        let second = pipeline.process_frame(Some(&frame));
        assert!(second.is_skipped());
        assert_eq!(second.detection.unwrap_err(), TrackingError::OverBudget);
        let third = pipeline.process_frame(Some(&frame));
        assert!(!third.is_skipped());
    }

    #[test]
    fn sink_receives_every_stage_on_sampled_frames_only() {
        let sink = RecordingSink {
            every_n: 2,
            ..RecordingSink::default()
        };
        let seen = sink.seen.clone();
        let mut pipeline = LinePipeline::new(FollowerConfig::default()).with_sink(Box::new(sink));
        let frame = strip(160, 120, 70, 90);
        for _ in 0..3 {
            pipeline.process_frame(Some(&frame));
        }
        let seen = seen.lock().expect("lock").clone();
        let stages = [Stage::Raw, Stage::Grayed, Stage::Balanced, Stage::Annotated];
        let expected: Vec<(Stage, u64)> = [0u64, 2]
            .iter()
            .flat_map(|&i| stages.iter().map(move |&s| (s, i)))
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn detect_leaves_the_policy_alone() {
        let mut pipeline = LinePipeline::new(FollowerConfig::default());
        let detection = pipeline.detect(&strip(160, 120, 70, 90)).expect("line");
        assert!((detection.pose.angle - 90.0).abs() < 2.0);
        assert_eq!(pipeline.drive_state().last_angle, None);
    }
}
