use crate::core_modules::drive_policy::{Decision, StopReason};
use crate::pipeline::{FrameReport, LinePipeline};
use crate::publisher::{CommandPublisher, TwistMessage};
use crate::source::{FrameRead, FrameSource};

/// Tally of one follower run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub tracking: u64,
    pub searching: u64,
    /// Frames that stopped without latching (no history to search with).
    pub idle: u64,
    pub skipped: u64,
    pub published: u64,
    /// The run ended on an exhausted search.
    pub halted: bool,
}

/// Feeds frames from `source` through `pipeline` and publishes every decision.
///
/// Ends at end of stream, after `max_steps` frames, or on a latched stop.
pub fn run_follower(
    source: &mut dyn FrameSource,
    pipeline: &mut LinePipeline,
    publisher: &dyn CommandPublisher,
    max_steps: Option<u64>,
) -> RunSummary {
    run_follower_observed(source, pipeline, publisher, max_steps, |_| {})
}

/// `run_follower` that also hands every report, skipped ones included, to `observe`.
pub fn run_follower_observed(
    source: &mut dyn FrameSource,
    pipeline: &mut LinePipeline,
    publisher: &dyn CommandPublisher,
    max_steps: Option<u64>,
    mut observe: impl FnMut(&FrameReport),
) -> RunSummary {
    let mut summary = RunSummary::default();

    loop {
        if max_steps.is_some_and(|max| summary.frames >= max) {
            log::info!("step limit of {} frame(s) reached", summary.frames);
            break;
        }

        let report = match source.next_frame() {
            FrameRead::EndOfStream => {
                log::info!("end of stream after {} frame(s)", summary.frames);
                break;
            }
            FrameRead::Unavailable => pipeline.process_frame(None),
            FrameRead::Frame(frame) => pipeline.process_frame(Some(&frame)),
        };
        summary.frames += 1;
        observe(&report);

        let Some(decision) = report.decision else {
            summary.skipped += 1;
            continue;
        };

        publisher.publish(TwistMessage::for_decision(&decision, &pipeline.config().gains));
        summary.published += 1;

        match decision {
            Decision::Track(_) => summary.tracking += 1,
            Decision::Search(_) => summary.searching += 1,
            Decision::Stop(StopReason::NoSearchDirection) => summary.idle += 1,
            Decision::Stop(StopReason::SearchExhausted) => {
                summary.halted = true;
                log::info!("search exhausted at frame {}, run ends", report.frame_index);
                break;
            }
        }
    }

    summary
}
