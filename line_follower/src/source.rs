use image::RgbImage;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What one acquisition attempt yielded.
#[derive(Debug, Clone)]
pub enum FrameRead {
    Frame(RgbImage),
    /// Nothing usable this cycle; the stream continues.
    Unavailable,
    EndOfStream,
}

/// Anything that hands out frames one at a time (camera, video file, directory).
pub trait FrameSource {
    fn next_frame(&mut self) -> FrameRead;
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

/// Still frames from a directory, in file name order.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    paths: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn new(dir: &Path) -> io::Result<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                paths.push(path);
            }
        }
        paths.sort();
        log::info!("{} frame(s) found in {}", paths.len(), dir.display());
        Ok(Self { paths, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> FrameRead {
        let Some(path) = self.paths.get(self.next) else {
            return FrameRead::EndOfStream;
        };
        self.next += 1;
        match image::open(path) {
            Ok(img) => FrameRead::Frame(img.to_rgb8()),
            Err(e) => {
                log::warn!("cannot decode {}: {e}", path.display());
                FrameRead::Unavailable
            }
        }
    }
}

/// Replays frames already in memory.
impl FrameSource for std::vec::IntoIter<Option<RgbImage>> {
    fn next_frame(&mut self) -> FrameRead {
        match self.next() {
            Some(Some(frame)) => FrameRead::Frame(frame),
            Some(None) => FrameRead::Unavailable,
            None => FrameRead::EndOfStream,
        }
    }
}
