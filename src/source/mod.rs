//! Frame producers
//!
//! Stand-ins for the camera driver. Each source runs on its own OS thread and
//! feeds a `FrameWriter`; when the source ends the writer is dropped and
//! every stream client sees the producer stop.
//!
//! - `stdin`: MJPEG piped into the process
//! - `file:PATH`: a recorded MJPEG file, paced at the camera frame rate
//! - `exec:CMD ARGS..`: stdout of a capture command
//! - `pattern`: a synthetic moving test pattern

pub mod chunker;
pub mod pattern;

use std::fmt;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::thread::JoinHandle;

use crate::error::{Error, Result};
use crate::frame::FrameWriter;

pub use chunker::MjpegChunker;
pub use pattern::TestPattern;

/// Camera capture settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConfig {
    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Frames per second
    pub framerate: u32,

    /// JPEG quality (1-100) for encoded sources
    pub quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1640,
            height: 1232,
            framerate: 24,
            quality: 85,
        }
    }
}

impl CameraConfig {
    /// Parse a `WIDTHxHEIGHT` resolution
    pub fn parse_resolution(s: &str) -> Result<(u32, u32)> {
        let invalid = || Error::Config(format!("invalid resolution '{}', expected WIDTHxHEIGHT", s));

        let (w, h) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok((width, height))
    }
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    /// MJPEG on standard input
    Stdin,
    /// Recorded MJPEG file
    File(PathBuf),
    /// Program and arguments whose stdout is MJPEG
    Command(Vec<String>),
    /// Synthetic test pattern
    TestPattern,
}

impl FromStr for SourceConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "stdin" || s == "-" {
            return Ok(SourceConfig::Stdin);
        }
        if s == "pattern" {
            return Ok(SourceConfig::TestPattern);
        }
        if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                return Err(Error::Config("file source needs a path".into()));
            }
            return Ok(SourceConfig::File(PathBuf::from(path)));
        }
        if let Some(command) = s.strip_prefix("exec:") {
            let argv: Vec<String> = command.split_whitespace().map(String::from).collect();
            if argv.is_empty() {
                return Err(Error::Config("exec source needs a command".into()));
            }
            return Ok(SourceConfig::Command(argv));
        }

        Err(Error::Config(format!(
            "unknown source '{}', expected stdin, file:PATH, exec:CMD or pattern",
            s
        )))
    }
}

impl fmt::Display for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceConfig::Stdin => write!(f, "stdin"),
            SourceConfig::File(path) => write!(f, "file:{}", path.display()),
            SourceConfig::Command(argv) => write!(f, "exec:{}", argv.join(" ")),
            SourceConfig::TestPattern => write!(f, "pattern"),
        }
    }
}

/// Start the producer thread
///
/// The thread owns `writer` and returns the number of frames published when
/// its source ends.
pub fn spawn(
    source: SourceConfig,
    camera: CameraConfig,
    mut writer: FrameWriter,
) -> io::Result<JoinHandle<Result<u64>>> {
    std::thread::Builder::new()
        .name("frame-producer".into())
        .spawn(move || {
            tracing::info!(
                source = %source,
                width = camera.width,
                height = camera.height,
                framerate = camera.framerate,
                "Frame producer started"
            );

            let result = produce(&source, &camera, &mut writer);

            match &result {
                Ok(frames) => tracing::info!(frames = frames, "Frame producer finished"),
                Err(e) => tracing::error!(error = %e, "Frame producer failed"),
            }
            result
        })
}

fn produce(source: &SourceConfig, camera: &CameraConfig, writer: &mut FrameWriter) -> Result<u64> {
    match source {
        SourceConfig::Stdin => MjpegChunker::new(io::stdin()).run(writer),
        SourceConfig::File(path) => {
            let file = File::open(path)?;
            MjpegChunker::new(file).paced(camera.framerate).run(writer)
        }
        SourceConfig::Command(argv) => run_command(argv, writer),
        SourceConfig::TestPattern => TestPattern::new(camera).run(writer),
    }
}

fn run_command(argv: &[String], writer: &mut FrameWriter) -> Result<u64> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::Config("exec source needs a command".into()))?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()?;

    tracing::debug!(program = %program, pid = child.id(), "Capture command started");

    let result = match child.stdout.take() {
        Some(stdout) => MjpegChunker::new(stdout).run(writer),
        None => Err(Error::Io(io::Error::other("capture command has no stdout"))),
    };

    if result.is_err() {
        let _ = child.kill();
    }
    let status = child.wait()?;
    let frames = result?;

    if !status.success() {
        return Err(Error::SourceExited(status));
    }
    Ok(frames)
}
