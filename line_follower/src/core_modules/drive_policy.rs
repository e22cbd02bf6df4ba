// THEORY:
// The `DrivePolicy` is the decision layer: it takes the pose of the current frame
// (or the fact that there is none) and answers with one discrete driving command.
// It is also the only component with memory across frames, the `DriveState`:
// which way the vehicle last turned, the last angle it saw, and how many recovery
// turns it may still spend before giving up.
//
// Two policies implement the same trait and are picked by configuration, never
// mixed within one run:
// 1.  **SteeringPolicy** combines the angle and the lateral shift, and when the line
//     is lost spins toward the last turn direction for a bounded number of frames.
//     Once that budget is spent it stops and stays stopped until `reset`.
// 2.  **BucketPolicy** looks at the angle only, sorting it into five fixed ranges,
//     and answers every lost frame with one compensating spin toward the last side.
//
// Sign convention shared by both: an angle below 90° or a positive shift maps to
// a left turn, an angle above 90° or a negative shift to a right turn.

use crate::config::{BucketBands, FollowerConfig, PolicyKind};
use crate::core_modules::pose::Pose;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    /// `+1` is left, `-1` is right, `0` is no turn.
    pub fn from_sign(sign: i8) -> Option<Self> {
        match sign {
            s if s > 0 => Some(TurnDirection::Left),
            s if s < 0 => Some(TurnDirection::Right),
            _ => None,
        }
    }
}

impl fmt::Display for TurnDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnDirection::Left => write!(f, "left"),
            TurnDirection::Right => write!(f, "right"),
        }
    }
}

/// Normalized motion intent, before the publisher's gains are applied.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Intent {
    pub linear_x: f64,
    pub linear_y: f64,
    pub linear_z: f64,
    pub angular_z: f64,
}

/// The fixed set of motions the vehicle knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Motion {
    DriveForward,
    /// Forward while arcing left.
    DriveLeft,
    /// Forward while arcing right.
    DriveRight,
    /// Spin in place to the left.
    TurnLeft,
    /// Spin in place to the right.
    TurnRight,
}

impl Motion {
    pub fn spin(direction: TurnDirection) -> Self {
        match direction {
            TurnDirection::Left => Motion::TurnLeft,
            TurnDirection::Right => Motion::TurnRight,
        }
    }

    pub fn intent(self) -> Intent {
        let (linear_x, angular_z) = match self {
            Motion::DriveForward => (1.0, 0.0),
            Motion::DriveLeft => (1.0, 1.0),
            Motion::DriveRight => (1.0, -1.0),
            Motion::TurnLeft => (0.0, 2.0),
            Motion::TurnRight => (0.0, -2.0),
        };
        Intent {
            linear_x,
            angular_z,
            ..Intent::default()
        }
    }
}

/// One command for the motion controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveCommand {
    pub motion: Motion,
    /// How long to hold the motion; `None` holds it until the next command.
    pub duration: Option<Duration>,
}

impl DriveCommand {
    pub fn new(motion: Motion, duration: Option<Duration>) -> Self {
        Self { motion, duration }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrivePhase {
    Tracking,
    Searching,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The line was never seen, so there is no side to search toward.
    NoSearchDirection,
    /// The recovery budget is spent; the vehicle holds until reset.
    SearchExhausted,
}

/// The policy's answer for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Track(DriveCommand),
    Search(DriveCommand),
    Stop(StopReason),
}

impl Decision {
    pub fn phase(&self) -> DrivePhase {
        match self {
            Decision::Track(_) => DrivePhase::Tracking,
            Decision::Search(_) => DrivePhase::Searching,
            Decision::Stop(_) => DrivePhase::Stopped,
        }
    }

    pub fn command(&self) -> Option<&DriveCommand> {
        match self {
            Decision::Track(command) | Decision::Search(command) => Some(command),
            Decision::Stop(_) => None,
        }
    }
}

/// Memory the policy carries from one frame to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveState {
    pub last_turn: Option<TurnDirection>,
    pub last_angle: Option<f64>,
    pub search_attempts_remaining: u32,
    /// Set once recovery is exhausted; cleared only by `reset`.
    pub halted: bool,
}

impl DriveState {
    pub fn new(search_attempt_budget: u32) -> Self {
        Self {
            last_turn: None,
            last_angle: None,
            search_attempts_remaining: search_attempt_budget,
            halted: false,
        }
    }
}

/// Turns a pose (or its absence) into a driving decision.
pub trait DrivePolicy: Send {
    fn decide(&mut self, pose: Option<Pose>) -> Decision;

    fn state(&self) -> &DriveState;

    /// External restart: forget history and refill the search budget.
    fn reset(&mut self);
}

/// Builds the policy named by the configuration.
pub fn policy_for(config: &FollowerConfig) -> Box<dyn DrivePolicy> {
    match config.policy {
        PolicyKind::Steering => Box::new(SteeringPolicy::new(config)),
        PolicyKind::Bucket => Box::new(BucketPolicy::new(config)),
    }
}

/// `sign(value)` when `|value| > limit`, else 0.
fn classify(value: f64, limit: f64) -> i8 {
    if value.abs() > limit {
        if value > 0.0 { 1 } else { -1 }
    } else {
        0
    }
}

/// Combined angle and shift steering with a bounded search.
#[derive(Debug, Clone)]
pub struct SteeringPolicy {
    turn_angle_threshold_deg: f64,
    max_shift_pct: f64,
    turn_step: Duration,
    shift_step: Duration,
    straight_run: Duration,
    search_step: Duration,
    search_attempt_budget: u32,
    state: DriveState,
}

impl SteeringPolicy {
    pub fn new(config: &FollowerConfig) -> Self {
        Self {
            turn_angle_threshold_deg: config.turn_angle_threshold_deg,
            max_shift_pct: config.max_shift_pct,
            turn_step: config.turn_step(),
            shift_step: config.shift_step(),
            straight_run: config.straight_run(),
            search_step: config.search_step(),
            search_attempt_budget: config.search_attempt_budget,
            state: DriveState::new(config.search_attempt_budget),
        }
    }

    fn track(&mut self, pose: Pose) -> Decision {
        let turn_state = classify(90.0 - pose.angle, self.turn_angle_threshold_deg);
        let shift_state = classify(pose.shift, self.max_shift_pct);

        let command = match (TurnDirection::from_sign(shift_state), TurnDirection::from_sign(turn_state)) {
            (Some(shift_dir), _) => {
                // Shift and angle agreeing needs only a small correction.
                let duration = if shift_state == turn_state {
                    self.shift_step
                } else {
                    self.turn_step
                };
                DriveCommand::new(Motion::spin(shift_dir), Some(duration))
            }
            (None, Some(turn_dir)) => DriveCommand::new(Motion::spin(turn_dir), Some(self.turn_step)),
            (None, None) => DriveCommand::new(Motion::DriveForward, Some(self.straight_run)),
        };

        self.state.last_turn = match command.motion {
            Motion::TurnLeft | Motion::DriveLeft => Some(TurnDirection::Left),
            Motion::TurnRight | Motion::DriveRight => Some(TurnDirection::Right),
            Motion::DriveForward => None,
        };
        self.state.search_attempts_remaining = self.search_attempt_budget;
        self.state.last_angle = Some(pose.angle);
        log::debug!(
            "angle {:.1} shift {:.1} -> turn {turn_state} shift {shift_state} -> {:?}",
            pose.angle,
            pose.shift,
            command
        );
        Decision::Track(command)
    }

    fn search(&mut self) -> Decision {
        let direction = self.state.last_turn.or_else(|| {
            self.state
                .last_angle
                .and_then(|angle| TurnDirection::from_sign(classify(90.0 - angle, 0.0)))
        });
        let Some(direction) = direction else {
            log::debug!("line lost with no history, holding");
            return Decision::Stop(StopReason::NoSearchDirection);
        };

        if self.state.search_attempts_remaining == 0 {
            self.state.halted = true;
            log::info!("search exhausted after {} attempt(s), stopping", self.search_attempt_budget);
            return Decision::Stop(StopReason::SearchExhausted);
        }

        self.state.search_attempts_remaining -= 1;
        log::info!(
            "line lost, searching {direction} ({} attempt(s) left)",
            self.state.search_attempts_remaining
        );
        Decision::Search(DriveCommand::new(Motion::spin(direction), Some(self.search_step)))
    }
}

impl DrivePolicy for SteeringPolicy {
    fn decide(&mut self, pose: Option<Pose>) -> Decision {
        if self.state.halted {
            return Decision::Stop(StopReason::SearchExhausted);
        }
        match pose {
            Some(pose) => self.track(pose),
            None => self.search(),
        }
    }

    fn state(&self) -> &DriveState {
        &self.state
    }

    fn reset(&mut self) {
        self.state = DriveState::new(self.search_attempt_budget);
    }
}

/// Angle-only policy with five fixed ranges around 90°.
#[derive(Debug, Clone)]
pub struct BucketPolicy {
    bands: BucketBands,
    search_step: Duration,
    state: DriveState,
}

impl BucketPolicy {
    pub fn new(config: &FollowerConfig) -> Self {
        Self {
            bands: config.bucket.clone(),
            search_step: config.search_step(),
            state: DriveState::new(0),
        }
    }

    fn motion_for(&self, angle: f64) -> Motion {
        let BucketBands {
            soft_band_deg: soft,
            hard_band_deg: hard,
        } = self.bands;
        if angle < 90.0 - hard {
            Motion::TurnLeft
        } else if angle < 90.0 - soft {
            Motion::DriveLeft
        } else if angle <= 90.0 + soft {
            Motion::DriveForward
        } else if angle <= 90.0 + hard {
            Motion::DriveRight
        } else {
            Motion::TurnRight
        }
    }
}

impl DrivePolicy for BucketPolicy {
    fn decide(&mut self, pose: Option<Pose>) -> Decision {
        match pose {
            Some(pose) => {
                let motion = self.motion_for(pose.angle);
                match motion {
                    Motion::TurnLeft | Motion::DriveLeft => {
                        self.state.last_turn = Some(TurnDirection::Left)
                    }
                    Motion::TurnRight | Motion::DriveRight => {
                        self.state.last_turn = Some(TurnDirection::Right)
                    }
                    Motion::DriveForward => {}
                }
                self.state.last_angle = Some(pose.angle);
                log::debug!("angle {:.1} -> {motion:?}", pose.angle);
                Decision::Track(DriveCommand::new(motion, None))
            }
            None => {
                // The vehicle starts out assuming the line is to its right.
                let direction = self.state.last_turn.unwrap_or(TurnDirection::Right);
                log::info!("line lost, compensating {direction}");
                Decision::Search(DriveCommand::new(Motion::spin(direction), Some(self.search_step)))
            }
        }
    }

    fn state(&self) -> &DriveState {
        &self.state
    }

    fn reset(&mut self) {
        self.state = DriveState::new(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(angle: f64, shift: f64) -> Option<Pose> {
        Some(Pose { angle, shift })
    }

    fn steering() -> SteeringPolicy {
        SteeringPolicy::new(&FollowerConfig::default())
    }

    fn command(decision: Decision) -> DriveCommand {
        *decision.command().expect("a command")
    }

    #[test]
    fn centred_upright_line_drives_straight() {
        let mut policy = steering();
        let c = command(policy.decide(pose(90.0, 0.0)));
        assert_eq!(c.motion, Motion::DriveForward);
        assert_eq!(c.duration, Some(Duration::from_millis(500)));
        assert_eq!(policy.state().last_turn, None);
        assert_eq!(policy.state().last_angle, Some(90.0));
    }

    #[test]
    fn steep_angle_alone_turns_with_the_turn_step() {
        let mut policy = steering();
        let c = command(policy.decide(pose(30.0, 0.0)));
        assert_eq!(c, DriveCommand::new(Motion::TurnLeft, Some(Duration::from_millis(250))));
        let c = command(policy.decide(pose(150.0, 5.0)));
        assert_eq!(c, DriveCommand::new(Motion::TurnRight, Some(Duration::from_millis(250))));
        assert_eq!(policy.state().last_turn, Some(TurnDirection::Right));
    }

    #[test]
    fn angle_inside_the_band_is_ignored() {
        let mut policy = steering();
        // |90 - 46| = 44 < 45
        let c = command(policy.decide(pose(46.0, 0.0)));
        assert_eq!(c.motion, Motion::DriveForward);
    }

    #[test]
    fn agreeing_shift_uses_the_small_step() {
        let mut policy = steering();
        let c = command(policy.decide(pose(30.0, 40.0)));
        assert_eq!(c, DriveCommand::new(Motion::TurnLeft, Some(Duration::from_millis(125))));
    }

    #[test]
    fn disagreeing_shift_uses_the_large_step_toward_the_shift() {
        let mut policy = steering();
        let c = command(policy.decide(pose(30.0, -40.0)));
        assert_eq!(c, DriveCommand::new(Motion::TurnRight, Some(Duration::from_millis(250))));
    }

    #[test]
    fn shift_alone_uses_the_large_step() {
        let mut policy = steering();
        let c = command(policy.decide(pose(90.0, 50.0)));
        assert_eq!(c, DriveCommand::new(Motion::TurnLeft, Some(Duration::from_millis(250))));
        assert_eq!(policy.state().last_turn, Some(TurnDirection::Left));
    }

    #[test]
    fn lost_line_without_history_stops_without_latching() {
        let mut policy = steering();
        assert_eq!(policy.decide(None), Decision::Stop(StopReason::NoSearchDirection));
        assert!(!policy.state().halted);
        assert_eq!(policy.decide(pose(90.0, 0.0)).phase(), DrivePhase::Tracking);
    }

    #[test]
    fn lost_line_after_straight_run_searches_toward_the_lean() {
        let mut policy = steering();
        policy.decide(pose(100.0, 0.0));
        assert_eq!(policy.state().last_turn, None);
        let c = command(policy.decide(None));
        assert_eq!(c.motion, Motion::TurnRight);

        let mut policy = steering();
        policy.decide(pose(90.0, 0.0));
        assert_eq!(policy.decide(None), Decision::Stop(StopReason::NoSearchDirection));
    }

    #[test]
    fn search_is_bounded_and_latches() {
        let config = FollowerConfig::default();
        let mut policy = SteeringPolicy::new(&config);
        policy.decide(pose(90.0, 50.0));

        for attempt in 1..=config.search_attempt_budget {
            let decision = policy.decide(None);
            assert_eq!(decision.phase(), DrivePhase::Searching, "attempt {attempt}");
            assert_eq!(
                command(decision),
                DriveCommand::new(Motion::TurnLeft, Some(config.search_step()))
            );
            assert_eq!(
                policy.state().search_attempts_remaining,
                config.search_attempt_budget - attempt
            );
        }
        assert_eq!(policy.decide(None), Decision::Stop(StopReason::SearchExhausted));
        assert!(policy.state().halted);

        // Stays stopped even when the line comes back.
        assert_eq!(policy.decide(pose(90.0, 0.0)), Decision::Stop(StopReason::SearchExhausted));

        policy.reset();
        assert_eq!(policy.decide(pose(90.0, 0.0)).phase(), DrivePhase::Tracking);
    }

    #[test]
    fn reacquiring_the_line_refills_the_budget() {
        let config = FollowerConfig::default();
        let mut policy = SteeringPolicy::new(&config);
        policy.decide(pose(30.0, 0.0));
        policy.decide(None);
        policy.decide(None);
        assert_eq!(policy.state().search_attempts_remaining, config.search_attempt_budget - 2);
        policy.decide(pose(90.0, 0.0));
        assert_eq!(policy.state().search_attempts_remaining, config.search_attempt_budget);
    }

    #[test]
    fn zero_angle_is_a_valid_pose_not_a_lost_line() {
        let mut policy = steering();
        assert_eq!(policy.decide(pose(0.0, 0.0)).phase(), DrivePhase::Tracking);
        let mut bucket = BucketPolicy::new(&FollowerConfig::default());
        assert_eq!(command(bucket.decide(pose(0.0, 0.0))).motion, Motion::TurnLeft);
    }

    #[test]
    fn bucket_ranges() {
        let mut policy = BucketPolicy::new(&FollowerConfig::default());
        let cases = [
            (60.0, Motion::TurnLeft),
            (74.9, Motion::TurnLeft),
            (75.0, Motion::DriveLeft),
            (84.9, Motion::DriveLeft),
            (85.0, Motion::DriveForward),
            (95.0, Motion::DriveForward),
            (95.1, Motion::DriveRight),
            (105.0, Motion::DriveRight),
            (105.1, Motion::TurnRight),
            (170.0, Motion::TurnRight),
        ];
        for (angle, expected) in cases {
            let c = command(policy.decide(pose(angle, 0.0)));
            assert_eq!(c.motion, expected, "angle {angle}");
            assert_eq!(c.duration, None);
        }
    }

    #[test]
    fn bucket_ignores_shift_and_never_exhausts() {
        let mut policy = BucketPolicy::new(&FollowerConfig::default());
        assert_eq!(command(policy.decide(pose(90.0, 80.0))).motion, Motion::DriveForward);
        // Default side before any turn.
        assert_eq!(command(policy.decide(None)).motion, Motion::TurnRight);
        policy.decide(pose(80.0, 0.0));
        for _ in 0..50 {
            let decision = policy.decide(None);
            assert_eq!(decision.phase(), DrivePhase::Searching);
            assert_eq!(command(decision).motion, Motion::TurnLeft);
        }
    }

    #[test]
    fn policy_for_follows_the_config() {
        let config = FollowerConfig {
            policy: PolicyKind::Bucket,
            ..FollowerConfig::default()
        };
        let mut policy = policy_for(&config);
        // Shift is ignored by the bucket policy.
        assert_eq!(command(policy.decide(pose(90.0, 80.0))).motion, Motion::DriveForward);

        let mut policy = policy_for(&FollowerConfig::default());
        assert_eq!(command(policy.decide(pose(90.0, 80.0))).motion, Motion::TurnLeft);
    }

    #[test]
    fn intents_match_the_motion_table() {
        assert_eq!(Motion::DriveForward.intent().linear_x, 1.0);
        assert_eq!(Motion::DriveLeft.intent().angular_z, 1.0);
        assert_eq!(Motion::DriveRight.intent().angular_z, -1.0);
        assert_eq!(Motion::TurnLeft.intent(), Intent { angular_z: 2.0, ..Intent::default() });
        assert_eq!(Motion::TurnRight.intent().linear_x, 0.0);
    }
}
