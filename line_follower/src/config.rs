// THEORY:
// One flat, serde-backed configuration for the whole follower. Every field has a
// default taken from the tuning the vehicle actually ran with, so a config file
// only needs to name what it overrides. The config is validated once at startup;
// a bad value is the only failure that is allowed to stop the process.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which drive policy turns poses into commands for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Angle and shift combined, bounded search when the line is lost.
    #[default]
    Steering,
    /// Angle bucketed into five fixed ranges, one compensating turn per lost frame.
    Bucket,
}

/// Half-widths of the bucket policy's ranges around 90°.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketBands {
    /// `[90 - soft, 90 + soft]` drives straight.
    pub soft_band_deg: f64,
    /// Beyond `90 ± hard` the vehicle spins in place instead of arcing.
    pub hard_band_deg: f64,
}

impl Default for BucketBands {
    fn default() -> Self {
        Self {
            soft_band_deg: 5.0,
            hard_band_deg: 15.0,
        }
    }
}

/// Fixed gains the publisher applies to the normalized intent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gains {
    pub linear: f64,
    pub angular: f64,
}

impl Default for Gains {
    fn default() -> Self {
        Self {
            linear: 0.1,
            angular: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Directory for debug captures. `None` disables the sink.
    pub dir: Option<PathBuf>,
    pub every_n_frames: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            dir: None,
            every_n_frames: 30,
        }
    }
}

/// Configuration for the follower pipeline and its drive policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    // --- Picture settings ---
    pub initial_threshold: u8,
    pub min_threshold: u8,
    pub max_threshold: u8,
    pub balance_iterations: u32,
    /// Lower edge of the target white band, in percent of the ROI area.
    pub min_white_pct: f64,
    /// Upper edge of the target white band, in percent of the ROI area.
    pub max_white_pct: f64,
    /// Gaussian sigma applied after grayscale conversion (1.7 matches a 9x9 kernel).
    pub blur_sigma: f32,

    // --- Driving settings ---
    pub policy: PolicyKind,
    pub turn_angle_threshold_deg: f64,
    pub max_shift_pct: f64,
    /// Seconds; spin used when shift and angle disagree or angle alone is off.
    pub turn_step_duration: f64,
    /// Seconds; small corrective spin when shift and angle agree.
    pub shift_step_duration: f64,
    /// Seconds of straight driving when the line is centred and upright.
    pub straight_run_duration: f64,
    pub search_attempt_budget: u32,
    /// Seconds of each recovery spin.
    pub search_turn_step: f64,
    pub bucket: BucketBands,
    pub gains: Gains,

    // --- Run settings ---
    /// Stop a run after this many frames.
    pub max_steps: Option<u64>,
    /// Seconds a frame may take before the next one skips geometry.
    pub frame_budget: Option<f64>,
    pub debug: DebugConfig,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            initial_threshold: 160,
            min_threshold: 80,
            max_threshold: 220,
            balance_iterations: 10,
            min_white_pct: 10.0,
            max_white_pct: 20.0,
            blur_sigma: 1.7,
            policy: PolicyKind::Steering,
            turn_angle_threshold_deg: 45.0,
            max_shift_pct: 20.0,
            turn_step_duration: 0.25,
            shift_step_duration: 0.125,
            straight_run_duration: 0.5,
            search_attempt_budget: 5,
            search_turn_step: 0.2,
            bucket: BucketBands::default(),
            gains: Gains::default(),
            max_steps: None,
            frame_budget: None,
            debug: DebugConfig::default(),
        }
    }
}

impl FollowerConfig {
    /// Rejects configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.min_threshold > self.max_threshold {
            return invalid(format!(
                "min_threshold {} exceeds max_threshold {}",
                self.min_threshold, self.max_threshold
            ));
        }
        if !(self.min_threshold..=self.max_threshold).contains(&self.initial_threshold) {
            return invalid(format!(
                "initial_threshold {} outside [{}, {}]",
                self.initial_threshold, self.min_threshold, self.max_threshold
            ));
        }
        if self.balance_iterations == 0 {
            return invalid("balance_iterations must be at least 1".into());
        }
        if !(0.0..=100.0).contains(&self.min_white_pct)
            || !(0.0..=100.0).contains(&self.max_white_pct)
            || self.min_white_pct > self.max_white_pct
        {
            return invalid(format!(
                "white band [{}, {}] must be an ordered range inside [0, 100]",
                self.min_white_pct, self.max_white_pct
            ));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return invalid(format!("blur_sigma {} must be a non-negative number", self.blur_sigma));
        }
        if !(0.0..=90.0).contains(&self.turn_angle_threshold_deg) {
            return invalid(format!(
                "turn_angle_threshold_deg {} outside [0, 90]",
                self.turn_angle_threshold_deg
            ));
        }
        if self.max_shift_pct < 0.0 {
            return invalid(format!("max_shift_pct {} is negative", self.max_shift_pct));
        }
        if self.bucket.soft_band_deg < 0.0 || self.bucket.soft_band_deg > self.bucket.hard_band_deg {
            return invalid(format!(
                "bucket bands soft {} / hard {} must satisfy 0 <= soft <= hard",
                self.bucket.soft_band_deg, self.bucket.hard_band_deg
            ));
        }
        if self.gains.linear <= 0.0 || self.gains.angular <= 0.0 {
            return invalid("gains must be positive".into());
        }
        for (name, secs) in [
            ("turn_step_duration", self.turn_step_duration),
            ("shift_step_duration", self.shift_step_duration),
            ("straight_run_duration", self.straight_run_duration),
            ("search_turn_step", self.search_turn_step),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return invalid(format!("{name} must be a non-negative number of seconds"));
            }
        }
        if let Some(budget) = self.frame_budget {
            if !budget.is_finite() || budget <= 0.0 {
                return invalid("frame_budget must be a positive number of seconds".into());
            }
        }
        if self.debug.every_n_frames == 0 {
            return invalid("debug.every_n_frames must be at least 1".into());
        }
        Ok(())
    }

    pub fn turn_step(&self) -> Duration {
        Duration::from_secs_f64(self.turn_step_duration)
    }

    pub fn shift_step(&self) -> Duration {
        Duration::from_secs_f64(self.shift_step_duration)
    }

    pub fn straight_run(&self) -> Duration {
        Duration::from_secs_f64(self.straight_run_duration)
    }

    pub fn search_step(&self) -> Duration {
        Duration::from_secs_f64(self.search_turn_step)
    }

    pub fn frame_budget(&self) -> Option<Duration> {
        self.frame_budget.map(Duration::from_secs_f64)
    }
}

/// Reads and validates a JSON config file.
pub fn load_config(path: &Path) -> Result<FollowerConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: FollowerConfig =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        FollowerConfig::default().validate().expect("defaults must validate");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: FollowerConfig =
            serde_json::from_str(r#"{ "initial_threshold": 150, "policy": "bucket" }"#)
                .expect("parse");
        assert_eq!(config.initial_threshold, 150);
        assert_eq!(config.policy, PolicyKind::Bucket);
        assert_eq!(config.max_threshold, 220);
        assert_eq!(config.search_attempt_budget, 5);
        assert_eq!(config.debug.every_n_frames, 30);
    }

    #[test]
    fn rejects_initial_threshold_outside_bounds() {
        let config = FollowerConfig {
            initial_threshold: 230,
            ..FollowerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_inverted_white_band() {
        let config = FollowerConfig {
            min_white_pct: 30.0,
            max_white_pct: 20.0,
            ..FollowerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_negative_durations() {
        let config = FollowerConfig {
            shift_step_duration: -0.1,
            ..FollowerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_reports_parse_errors() {
        let path = std::env::temp_dir().join("line_follower_bad_config.json");
        fs::write(&path, "{ not json").expect("write temp config");
        let err = load_config(&path).expect_err("must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_config_round_trips_a_written_file() {
        let path = std::env::temp_dir().join("line_follower_good_config.json");
        let written = FollowerConfig {
            max_steps: Some(40),
            ..FollowerConfig::default()
        };
        fs::write(&path, serde_json::to_string(&written).expect("serialize")).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, written);
        let _ = fs::remove_file(&path);
    }
}
