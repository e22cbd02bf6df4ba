use anyhow::{Context, Result, bail};
use line_follower::core_modules::contour::Contour;
use line_follower::core_modules::geometry::Point;
use line_follower::pipeline::{Decision, FrameReport};
use line_follower::publisher::{ChannelPublisher, spawn_log_transport};
use line_follower::source::{FrameRead, FrameSource};
use line_follower::{FollowerConfig, LinePipeline, load_config, run_follower_observed};
use opencv::{
    core::{self, Mat, Scalar, Vector},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::cell::RefCell;
use std::env;
use std::path::Path;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

const FALLBACK_FPS: f64 = 10.0;

/// CSI camera settings of the Jetson rig.
struct JetsonCamera {
    capture_width: u32,
    capture_height: u32,
    display_width: u32,
    display_height: u32,
    framerate: u32,
    flip_method: u32,
}

impl Default for JetsonCamera {
    fn default() -> Self {
        Self {
            capture_width: 1280,
            capture_height: 720,
            display_width: 820,
            display_height: 616,
            framerate: 10,
            flip_method: 0,
        }
    }
}

impl JetsonCamera {
    fn gstreamer_pipeline(&self) -> String {
        format!(
            "nvarguscamerasrc ! \
             video/x-raw(memory:NVMM), width=(int){}, height=(int){}, \
             format=(string)NV12, framerate=(fraction){}/1 ! \
             nvvidconv flip-method={} ! \
             video/x-raw, width=(int){}, height=(int){}, format=(string)BGRx ! \
             videoconvert ! video/x-raw, format=(string)BGR ! appsink",
            self.capture_width,
            self.capture_height,
            self.framerate,
            self.flip_method,
            self.display_width,
            self.display_height,
        )
    }
}

/// `jetson`, a camera index, or a video file path.
fn open_capture(input: &str) -> Result<VideoCapture> {
    let cap = if input == "jetson" {
        VideoCapture::from_file(&JetsonCamera::default().gstreamer_pipeline(), videoio::CAP_GSTREAMER)?
    } else if let Ok(index) = input.parse::<i32>() {
        VideoCapture::new(index, videoio::CAP_ANY)?
    } else {
        VideoCapture::from_file(input, videoio::CAP_ANY)?
    };
    if !cap.is_opened()? {
        bail!("cannot open video input {input}");
    }
    Ok(cap)
}

/// OpenCV capture exposed as a `FrameSource`. A successfully converted BGR frame
/// is handed to `shown` for drawing; any other read clears it.
struct CaptureSource {
    cap: VideoCapture,
    bgr: Mat,
    shown: Rc<RefCell<Option<Mat>>>,
}

impl CaptureSource {
    fn to_rgb(&self) -> opencv::Result<Option<image::RgbImage>> {
        let mut rgb = Mat::default();
        imgproc::cvt_color(&self.bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let size = rgb.size()?;
        let data = rgb.data_bytes()?.to_vec();
        Ok(image::RgbImage::from_raw(size.width as u32, size.height as u32, data))
    }
}

impl FrameSource for CaptureSource {
    fn next_frame(&mut self) -> FrameRead {
        let read = match self.cap.read(&mut self.bgr) {
            Ok(true) if !self.bgr.empty() => match self.to_rgb() {
                Ok(Some(rgb)) => FrameRead::Frame(rgb),
                Ok(None) => FrameRead::Unavailable,
                Err(e) => {
                    log::warn!("frame conversion failed: {e}");
                    FrameRead::Unavailable
                }
            },
            Ok(_) => FrameRead::EndOfStream,
            Err(e) => {
                log::warn!("error reading frame: {e}");
                FrameRead::Unavailable
            }
        };
        let shown = match read {
            FrameRead::Frame(_) => Some(std::mem::take(&mut self.bgr)),
            _ => None,
        };
        self.shown.replace(shown);
        read
    }
}

fn cv_point(p: Point) -> core::Point {
    core::Point::new(p.x.round() as i32, p.y.round() as i32)
}

/// Draws the detection and the decision on the BGR frame.
fn draw_overlay(frame: &mut Mat, report: &FrameReport) -> opencv::Result<()> {
    let red = Scalar::new(0.0, 0.0, 255.0, 0.0);
    let blue = Scalar::new(255.0, 0.0, 0.0, 0.0);
    let green = Scalar::new(0.0, 255.0, 0.0, 0.0);
    let white = Scalar::new(255.0, 255.0, 255.0, 0.0);

    let status = match &report.detection {
        Ok(detection) => {
            draw_contour(frame, &detection.contour, red)?;
            let corners: Vector<core::Point> =
                detection.oriented_box.corners().iter().map(|&c| cv_point(c)).collect();
            imgproc::polylines(frame, &corners, true, blue, 2, imgproc::LINE_8, 0)?;
            imgproc::arrowed_line(
                frame,
                cv_point(detection.line.near),
                cv_point(detection.line.far),
                green,
                2,
                imgproc::LINE_8,
                0,
                0.1,
            )?;
            format!(
                "angle {:.1} shift {:.1} T {}",
                detection.pose.angle, detection.pose.shift, detection.threshold
            )
        }
        Err(e) => e.to_string(),
    };

    let decision = match &report.decision {
        Some(Decision::Track(c)) => format!("track {:?}", c.motion),
        Some(Decision::Search(c)) => format!("search {:?}", c.motion),
        Some(Decision::Stop(reason)) => format!("stop {reason:?}"),
        None => "skipped".to_string(),
    };

    for (row, text) in [status, decision].iter().enumerate() {
        imgproc::put_text(
            frame,
            text,
            core::Point::new(10, 24 + 24 * row as i32),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.6,
            white,
            1,
            imgproc::LINE_8,
            false,
        )?;
    }
    Ok(())
}

fn draw_contour(frame: &mut Mat, contour: &Contour, color: Scalar) -> opencv::Result<()> {
    let points: Vector<core::Point> = contour
        .points
        .iter()
        .map(|p| core::Point::new(p.x, p.y))
        .collect();
    imgproc::polylines(frame, &points, true, color, 1, imgproc::LINE_8, 0)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: line_tracer <input_video_path|camera_index|jetson> <output_video_path> [config.json]");
        return Ok(());
    }
    let input = &args[1];
    let output_path = &args[2];
    let config = match args.get(3) {
        Some(path) => load_config(Path::new(path))?,
        None => FollowerConfig::default(),
    };

    // --- 2. Video I/O Initialization ---
    let cap = open_capture(input)?;
    let frame_width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
    let frame_height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
    let fps = match cap.get(videoio::CAP_PROP_FPS)? {
        fps if fps > 0.0 => fps,
        _ => FALLBACK_FPS,
    };

    let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
    let mut writer = VideoWriter::new(
        output_path,
        fourcc,
        fps,
        core::Size::new(frame_width, frame_height),
        true,
    )?;
    if !writer.is_opened()? {
        bail!("cannot open video output {output_path}");
    }

    // --- 3. Pipeline and command transport ---
    let (publisher, receiver) = ChannelPublisher::new();
    let transport = spawn_log_transport(receiver);
    let max_steps = config.max_steps;
    let mut pipeline = LinePipeline::new(config);
    let shown = Rc::new(RefCell::new(None));
    let mut source = CaptureSource {
        cap,
        bgr: Mat::default(),
        shown: Rc::clone(&shown),
    };

    // --- 4. Main Processing Loop & Visualization ---
    let mut write_error = None;
    let summary = run_follower_observed(&mut source, &mut pipeline, &publisher, max_steps, |report| {
        let Some(mut output_frame) = shown.borrow_mut().take() else {
            return;
        };
        if write_error.is_some() {
            return;
        }
        let written = draw_overlay(&mut output_frame, report)
            .context("drawing overlay")
            .and_then(|()| writer.write(&output_frame).context("writing frame"));
        if let Err(e) = written {
            log::error!("frame {}: {e:#}", report.frame_index);
            write_error = Some(e);
        }
    });
    if let Some(e) = write_error {
        return Err(e);
    }
    if summary.halted {
        log::info!("follower halted after {} frame(s)", summary.frames);
    }

    drop(publisher);
    let published = transport.await.context("transport task failed")?;
    println!(
        "Processing complete: {} frame(s), {published} command(s). Output saved to {output_path}",
        summary.frames
    );
    Ok(())
}
