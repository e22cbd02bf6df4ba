// THEORY:
// This file is the main entry point for the `line_follower` library crate.
// The public face is `LinePipeline` (one per video stream) together with the
// data it reports per frame (`FrameReport`, `Detection`, `Decision`). The stages
// it runs live in `core_modules` and stay usable on their own for tooling and
// tests. Around the pipeline sit the seams to the outside world: a `FrameSource`
// for acquisition, a `CommandPublisher` for velocity commands and `run_follower`
// tying the three together.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod publisher;
pub mod runner;
pub mod source;

pub use config::{FollowerConfig, load_config};
pub use error::{ConfigError, SinkError, TrackingError};
pub use pipeline::{Detection, FrameReport, LinePipeline};
pub use runner::{RunSummary, run_follower, run_follower_observed};
