// THEORY:
// The follower never waits on the motion controller. A decision is turned into a
// `Twist` (the normalized intent scaled by the configured gains) and pushed onto an
// unbounded channel; a separate transport task owns the other end and is free to
// take as long as it needs. A closed channel is logged and otherwise ignored, so a
// dead transport can never stall frame processing.

use crate::config::Gains;
use crate::core_modules::drive_policy::{Decision, Intent};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Velocity command in the motion controller's units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    pub linear: [f64; 3],
    pub angular: [f64; 3],
}

impl Twist {
    pub fn scaled(intent: Intent, gains: &Gains) -> Self {
        Self {
            linear: [
                intent.linear_x * gains.linear,
                intent.linear_y * gains.linear,
                intent.linear_z * gains.linear,
            ],
            angular: [0.0, 0.0, intent.angular_z * gains.angular],
        }
    }

    pub fn is_stop(&self) -> bool {
        *self == Twist::default()
    }
}

/// A twist and how long it should be held before stopping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwistMessage {
    pub twist: Twist,
    /// `None` holds the twist until the next message.
    pub hold: Option<Duration>,
}

impl TwistMessage {
    /// The message for a decision: its command scaled by `gains`, or a stop.
    pub fn for_decision(decision: &Decision, gains: &Gains) -> Self {
        match decision.command() {
            Some(command) => Self {
                twist: Twist::scaled(command.motion.intent(), gains),
                hold: command.duration,
            },
            None => Self {
                twist: Twist::default(),
                hold: None,
            },
        }
    }
}

/// Fire-and-forget sink for velocity commands.
pub trait CommandPublisher {
    fn publish(&self, message: TwistMessage);
}

/// Publishes onto an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<TwistMessage>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TwistMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl CommandPublisher for ChannelPublisher {
    fn publish(&self, message: TwistMessage) {
        if self.sender.send(message).is_err() {
            log::warn!("command transport is gone, dropping {:?}", message.twist);
        }
    }
}

/// Default transport: logs every twist and holds it for its duration, then logs
/// the implied stop. A newer message cuts the current hold short, so the
/// transport never falls behind the frames. Resolves to the number of messages
/// handled once every publisher is dropped.
pub fn spawn_log_transport(mut receiver: mpsc::UnboundedReceiver<TwistMessage>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut handled = 0u64;
        let mut next = receiver.recv().await;
        while let Some(message) = next.take() {
            handled += 1;
            log::info!(
                "twist linear {:?} angular {:?} hold {:?}",
                message.twist.linear,
                message.twist.angular,
                message.hold
            );
            next = match message.hold {
                Some(hold) => tokio::select! {
                    newer = receiver.recv() => {
                        if newer.is_some() {
                            log::debug!("hold superseded");
                        }
                        newer
                    }
                    _ = tokio::time::sleep(hold) => {
                        log::debug!("hold elapsed, stop");
                        receiver.recv().await
                    }
                },
                None => receiver.recv().await,
            };
        }
        handled
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::drive_policy::{DriveCommand, Motion, StopReason};

    #[test]
    fn gains_scale_linear_and_angular_separately() {
        let gains = Gains::default();
        let twist = Twist::scaled(Motion::DriveLeft.intent(), &gains);
        assert!((twist.linear[0] - 0.1).abs() < 1e-12);
        assert!((twist.angular[2] - 0.2).abs() < 1e-12);
        let twist = Twist::scaled(Motion::TurnRight.intent(), &gains);
        assert_eq!(twist.linear, [0.0; 3]);
        assert!((twist.angular[2] + 0.4).abs() < 1e-12);
    }

    #[test]
    fn stop_decision_publishes_a_zero_twist() {
        let message =
            TwistMessage::for_decision(&Decision::Stop(StopReason::SearchExhausted), &Gains::default());
        assert!(message.twist.is_stop());
        assert_eq!(message.hold, None);
    }

    #[test]
    fn command_duration_becomes_the_hold() {
        let decision = Decision::Track(DriveCommand::new(
            Motion::DriveForward,
            Some(Duration::from_millis(500)),
        ));
        let message = TwistMessage::for_decision(&decision, &Gains::default());
        assert_eq!(message.hold, Some(Duration::from_millis(500)));
        assert!(!message.twist.is_stop());
    }

    #[tokio::test]
    async fn log_transport_drains_the_channel() {
        let (publisher, receiver) = ChannelPublisher::new();
        let transport = spawn_log_transport(receiver);
        for _ in 0..3 {
            publisher.publish(TwistMessage {
                twist: Twist::default(),
                hold: None,
            });
        }
        drop(publisher);
        assert_eq!(transport.await.expect("transport"), 3);
    }

    #[tokio::test]
    async fn newer_commands_cut_long_holds_short() {
        let (publisher, receiver) = ChannelPublisher::new();
        let transport = spawn_log_transport(receiver);
        let started = tokio::time::Instant::now();
        for _ in 0..10 {
            publisher.publish(TwistMessage {
                twist: Twist::scaled(Motion::TurnLeft.intent(), &Gains::default()),
                hold: Some(Duration::from_millis(250)),
            });
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        drop(publisher);

        // Serving every hold in full would take 2.5 s.
        let handled = tokio::time::timeout(Duration::from_secs(1), transport)
            .await
            .expect("transport kept up with the publisher")
            .expect("transport");
        assert_eq!(handled, 10);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn publishing_into_a_closed_channel_does_not_panic() {
        let (publisher, receiver) = ChannelPublisher::new();
        drop(receiver);
        publisher.publish(TwistMessage {
            twist: Twist::default(),
            hold: None,
        });
    }
}
