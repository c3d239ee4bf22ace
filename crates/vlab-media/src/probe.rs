//! Media probing: dimensions, frame rate and frame count.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;
use vlab_models::{MediaKind, MediaSource};

use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: Option<StreamTags>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamTags {
    rotate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

impl FfprobeStream {
    /// Display rotation in degrees from the display matrix, else the
    /// legacy `rotate` tag.
    fn rotation(&self) -> i64 {
        self.side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| self.tags.as_ref()?.rotate.as_deref()?.trim().parse().ok())
            .map(|deg: f64| deg.round() as i64)
            .unwrap_or(0)
    }
}

/// Probe a media file with the given `ffprobe` executable.
///
/// Still images are measured by decoding their header; videos go through
/// `ffprobe`. Anything that cannot be opened is
/// [`MediaError::SourceUnreadable`].
pub async fn probe_media(ffprobe: &Path, path: impl AsRef<Path>) -> MediaResult<MediaSource> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::source_unreadable(path, "file does not exist"));
    }

    match MediaKind::from_path(path) {
        MediaKind::Image => probe_image(path),
        MediaKind::Video => probe_video(ffprobe, path).await,
    }
}

/// Read the dimensions of a still image.
pub fn probe_image(path: &Path) -> MediaResult<MediaSource> {
    let (width, height) = image::image_dimensions(path)
        .map_err(|e| MediaError::source_unreadable(path, e.to_string()))?;
    Ok(MediaSource::image(path, width, height))
}

async fn probe_video(ffprobe: &Path, path: &Path) -> MediaResult<MediaSource> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MediaError::FfprobeNotFound
            } else {
                MediaError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(MediaError::source_unreadable(
            path,
            if stderr.is_empty() {
                "ffprobe could not open the container".to_string()
            } else {
                stderr
            },
        ));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| MediaError::source_unreadable(path, format!("invalid ffprobe output: {}", e)))?;
    let source = video_source_from_probe(path, &probe)?;

    debug!(
        path = %path.display(),
        width = source.width,
        height = source.height,
        fps = source.fps_or_default(),
        frames = source.frame_count,
        "Probed video"
    );
    Ok(source)
}

fn video_source_from_probe(path: &Path, probe: &FfprobeOutput) -> MediaResult<MediaSource> {
    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::source_unreadable(path, "no video stream found"))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(MediaError::source_unreadable(path, "video stream has no dimensions")),
    };
    // The decoder applies the display rotation, so quarter turns swap the
    // frame geometry
    let (width, height) = if stream.rotation().rem_euclid(180) == 90 {
        (height, width)
    } else {
        (width, height)
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    let duration = stream
        .duration
        .as_deref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok());

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .or_else(|| match duration {
            Some(d) if d > 0.0 && fps > 0.0 => Some((d * fps).round() as u64),
            _ => None,
        })
        .unwrap_or(0);

    Ok(MediaSource::video(path, width, height, fps, frame_count))
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate > 0.0 && rate.is_finite()).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> FfprobeOutput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_frame_count_from_nb_frames() {
        let probe = parse(
            r#"{"streams":[{"codec_type":"video","width":640,"height":360,
                "avg_frame_rate":"25/1","nb_frames":"250"}],
                "format":{"duration":"10.0"}}"#,
        );
        let source = video_source_from_probe(Path::new("a.mp4"), &probe).unwrap();
        assert_eq!(source.frame_count, 250);
        assert_eq!((source.width, source.height), (640, 360));
    }

    #[test]
    fn test_frame_count_from_duration() {
        let probe = parse(
            r#"{"streams":[{"codec_type":"audio"},{"codec_type":"video","width":320,"height":240,
                "avg_frame_rate":"0/0","r_frame_rate":"30/1"}],
                "format":{"duration":"2.5"}}"#,
        );
        let source = video_source_from_probe(Path::new("a.webm"), &probe).unwrap();
        assert_eq!(source.frame_count, 75);
        assert_eq!(source.fps, Some(30.0));
    }

    #[test]
    fn test_frame_count_unknown() {
        let probe = parse(
            r#"{"streams":[{"codec_type":"video","width":320,"height":240}]}"#,
        );
        let source = video_source_from_probe(Path::new("a.mkv"), &probe).unwrap();
        assert_eq!(source.frame_count, 0);
    }

    #[test]
    fn test_rotation_side_data_swaps_dimensions() {
        let probe = parse(
            r#"{"streams":[{"codec_type":"video","width":1920,"height":1080,
                "avg_frame_rate":"30/1","nb_frames":"90",
                "side_data_list":[{"side_data_type":"Display Matrix","rotation":-90}]}]}"#,
        );
        let source = video_source_from_probe(Path::new("phone.mp4"), &probe).unwrap();
        assert_eq!((source.width, source.height), (1080, 1920));
    }

    #[test]
    fn test_rotate_tag_swaps_dimensions() {
        let probe = parse(
            r#"{"streams":[{"codec_type":"video","width":640,"height":360,
                "tags":{"rotate":"270","language":"und"}}]}"#,
        );
        let source = video_source_from_probe(Path::new("old.mov"), &probe).unwrap();
        assert_eq!((source.width, source.height), (360, 640));
    }

    #[test]
    fn test_half_turn_keeps_dimensions() {
        let probe = parse(
            r#"{"streams":[{"codec_type":"video","width":640,"height":360,
                "side_data_list":[{"side_data_type":"Display Matrix","rotation":180}]}]}"#,
        );
        let source = video_source_from_probe(Path::new("flip.mp4"), &probe).unwrap();
        assert_eq!((source.width, source.height), (640, 360));
    }

    #[test]
    fn test_no_video_stream() {
        let probe = parse(r#"{"streams":[{"codec_type":"audio"}]}"#);
        let err = video_source_from_probe(Path::new("a.mp3"), &probe).unwrap_err();
        assert!(matches!(err, MediaError::SourceUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let err = probe_media(Path::new("ffprobe"), "/nonexistent/clip.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::SourceUnreadable { .. }));
    }

    #[test]
    fn test_probe_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        image::RgbImage::new(12, 7).save(&path).unwrap();
        let source = probe_image(&path).unwrap();
        assert_eq!((source.width, source.height), (12, 7));
        assert_eq!(source.kind, MediaKind::Image);
    }
}
