// THEORY:
// Every way a single frame can fail to produce a pose is an expected, steady-state
// outcome for a line follower: the camera hiccups, the line leaves the floor patch,
// the lighting makes the threshold search give up. None of these are exceptional,
// so they travel as plain values (`Result<_, TrackingError>`) that the pipeline and
// the drive policy branch on. Only configuration problems found at startup are
// meant to abort the process, and those live in `ConfigError`.

use std::path::PathBuf;
use thiserror::Error;

/// Why a frame produced no pose (or no decision).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    /// Acquisition yielded no frame; the cycle is skipped without touching drive state.
    #[error("no frame available this cycle")]
    FrameUnavailable,
    /// The region of interest has zero area, so no white percentage can be computed.
    #[error("region of interest is not initialized")]
    RoiUninitialized,
    /// The stream changed resolution after the region of interest was built.
    #[error("frame is {actual:?} but the region of interest was built for {expected:?}")]
    ResolutionChanged {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// The previous frame overran the frame budget; geometry is skipped to catch up.
    #[error("previous frame overran the frame budget, skipping geometry")]
    OverBudget,
    /// The threshold search ran out of iterations or threshold range.
    #[error("threshold search gave up after {iterations} step(s) at threshold {last_threshold}")]
    ThresholdUnbalanced { iterations: u32, last_threshold: u8 },
    /// The balanced binary frame contains no contour at all.
    #[error("no contour found in the balanced frame")]
    NoContourFound,
    /// The oriented box collapses to a point, so it carries no direction.
    #[error("oriented box is degenerate, no line vector")]
    DegenerateBox,
}

impl TrackingError {
    /// Skips leave the drive state untouched; every other outcome counts as "line lost".
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            TrackingError::FrameUnavailable
                | TrackingError::ResolutionChanged { .. }
                | TrackingError::OverBudget
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
