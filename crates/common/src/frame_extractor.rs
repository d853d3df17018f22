//! Frame extraction and stream probing for camera recordings.
//!
//! Shells out to `ffmpeg`/`ffprobe`, which the camera hosts already carry
//! for their recording pipeline. Frames come back as JPEG bytes on a pipe;
//! nothing is written to disk here.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, error};

/// Stream properties of a video clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub frame_count: i64,
}

/// Probe a clip's dimensions, duration and frame count.
pub fn probe_video(video_path: &Path) -> Result<VideoProbe> {
    debug!(video = %video_path.display(), "probing video stream");

    if !video_path.exists() {
        anyhow::bail!("video file does not exist: {}", video_path.display());
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate",
            "-show_entries",
            "format=duration",
            "-of",
            "csv=p=0",
        ])
        .arg(video_path)
        .output()
        .context("failed to execute ffprobe")?;

    if !output.status.success() {
        anyhow::bail!("ffprobe failed: {:?}", output.status);
    }

    let text = String::from_utf8(output.stdout).context("ffprobe output is not valid UTF-8")?;
    parse_probe_output(&text)
}

/// Extract one JPEG frame at `timestamp_secs` into the clip, at the
/// stream's natural resolution and best JPEG quality.
pub fn extract_frame_jpeg_at(video_path: &Path, timestamp_secs: f64) -> Result<Vec<u8>> {
    debug!(
        video = %video_path.display(),
        timestamp = timestamp_secs,
        "extracting frame from video"
    );

    let output = Command::new("ffmpeg")
        .arg("-ss")
        .arg(format!("{timestamp_secs:.3}"))
        .arg("-i")
        .arg(video_path)
        .args(["-vframes", "1", "-f", "image2pipe", "-q:v", "2", "pipe:1"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .context("failed to execute ffmpeg")?;

    if !output.status.success() {
        error!(
            video = %video_path.display(),
            status = ?output.status,
            "ffmpeg frame extraction failed"
        );
        anyhow::bail!("ffmpeg exited with error: {:?}", output.status);
    }

    if output.stdout.is_empty() {
        anyhow::bail!("ffmpeg returned no frame data");
    }

    Ok(output.stdout)
}

/// Keyframe offset for a clip: 5 seconds in, or the midpoint of clips
/// shorter than that.
pub fn thumbnail_offset(duration_seconds: f64) -> f64 {
    if duration_seconds > 5.0 {
        5.0
    } else {
        duration_seconds / 2.0
    }
}

fn parse_probe_output(text: &str) -> Result<VideoProbe> {
    // Two CSV lines: "width,height,num/den" for the stream, then the
    // format duration.
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let stream_line = lines.next().context("ffprobe returned no stream line")?;
    let duration_line = lines.next().context("ffprobe returned no duration line")?;

    let fields: Vec<&str> = stream_line.trim().split(',').collect();
    if fields.len() != 3 {
        anyhow::bail!("unexpected ffprobe stream output: {stream_line}");
    }
    let width: u32 = fields[0].parse().context("failed to parse width")?;
    let height: u32 = fields[1].parse().context("failed to parse height")?;
    let fps = parse_frame_rate(fields[2])?;

    let duration_seconds: f64 = duration_line
        .trim()
        .parse()
        .context("failed to parse duration")?;

    Ok(VideoProbe {
        width,
        height,
        duration_seconds,
        frame_count: (duration_seconds * fps).round() as i64,
    })
}

fn parse_frame_rate(field: &str) -> Result<f64> {
    let (num, den) = field
        .split_once('/')
        .with_context(|| format!("unexpected frame rate: {field}"))?;
    let num: f64 = num.parse().context("failed to parse frame rate numerator")?;
    let den: f64 = den.parse().context("failed to parse frame rate denominator")?;
    if den == 0.0 {
        anyhow::bail!("zero frame rate denominator");
    }
    Ok(num / den)
}
