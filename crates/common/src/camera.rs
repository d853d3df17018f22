//! Camera tree and filename parsing for Foscam-style media trees.
//!
//! Cameras write motion-triggered artifacts into a two-level directory
//! structure: `<root>/<location>/<device_name>/(snap|record)/<filename>`.
//! Snapshot names look like `MDAlarm_20250712-213837.jpg` (or `HMDAlarm_`
//! for human-motion triggers); recordings look like
//! `MDalarm_20250714_003211.mkv`.

use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Device directory prefixes that mark a directory as a camera device.
pub const DEVICE_PREFIXES: &[&str] = &["FoscamCamera_", "R2_", "R2C_"];

/// Image filename prefixes, case sensitive.
const IMAGE_PREFIXES: &[&str] = &["MDAlarm_", "HMDAlarm_"];

/// Video filename prefixes, case sensitive. The cameras use a lowercase
/// `alarm` for recordings.
const VIDEO_PREFIXES: &[&str] = &["MDalarm_"];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];
const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi"];

/// Timestamp grammars embedded in filenames. Images use a dash separator,
/// videos an underscore, but devices have been observed mixing them.
const DATETIME_FORMATS: &[&str] = &["%Y%m%d-%H%M%S", "%Y%m%d_%H%M%S"];

/// Device family, inferred from the device directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    /// Standard `FoscamCamera_*` devices.
    FoscamCamera,
    /// `R2_*` devices.
    R2,
    /// `R2C_*` devices.
    R2C,
    /// Anything else.
    Unknown,
}

impl DeviceType {
    /// Infer the device family from a device directory name. `R2C` is
    /// checked before `R2` so it is not claimed by the shorter prefix.
    pub fn from_device_name(name: &str) -> Self {
        if name.starts_with("FoscamCamera") {
            Self::FoscamCamera
        } else if name.starts_with("R2C") {
            Self::R2C
        } else if name.starts_with("R2") {
            Self::R2
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FoscamCamera => "FoscamCamera",
            Self::R2 => "R2",
            Self::R2C => "R2C",
            Self::Unknown => "Unknown",
        }
    }
}

/// Which camera subdirectory an artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirKind {
    Snap,
    Record,
}

impl DirKind {
    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name {
            "snap" => Some(Self::Snap),
            "record" => Some(Self::Record),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snap => "snap",
            Self::Record => "record",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// Motion trigger kind encoded in the filename prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionType {
    /// Plain motion detection (`MDAlarm_` / `MDalarm_`).
    Md,
    /// Human motion detection (`HMDAlarm_`).
    Hmd,
}

impl MotionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md => "MD",
            Self::Hmd => "HMD",
        }
    }
}

/// A fully parsed artifact path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPath {
    pub location: String,
    pub device_name: String,
    pub device_type: DeviceType,
    pub kind: DirKind,
    pub media_type: MediaType,
    pub motion_type: MotionType,
    /// Wall-clock timestamp parsed from the filename; `None` when the
    /// timestamp group is present but unparseable.
    pub file_timestamp: Option<NaiveDateTime>,
    pub filename: String,
}

impl ArtifactPath {
    /// Parse an artifact path against the camera tree grammar.
    ///
    /// Returns `None` for paths outside the grammar; the caller decides
    /// how to report the rejection. A recognized filename whose timestamp
    /// group fails to parse is still accepted, with `file_timestamp`
    /// left empty.
    pub fn parse(path: &Path) -> Option<Self> {
        let filename = path.file_name()?.to_str()?.to_string();
        let kind_dir = path.parent()?.file_name()?.to_str()?;
        let kind = DirKind::from_dir_name(kind_dir)?;
        let device_name = path
            .parent()?
            .parent()?
            .file_name()?
            .to_str()?
            .to_string();
        let location = path
            .parent()?
            .parent()?
            .parent()?
            .file_name()?
            .to_str()?
            .to_string();
        if device_name.is_empty() || location.is_empty() {
            return None;
        }

        let (media_type, motion_type, file_timestamp) = parse_filename(&filename, kind)?;

        Some(Self {
            device_type: DeviceType::from_device_name(&device_name),
            location,
            device_name,
            kind,
            media_type,
            motion_type,
            file_timestamp,
            filename,
        })
    }

    /// Display identity of the owning camera: `<location>_<device_name>`.
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.location, self.device_name)
    }

    /// Render the canonical filename for these fields. On well-formed
    /// names (`.jpg` images, `.mkv` videos) this reproduces the input
    /// `filename` exactly.
    pub fn render_filename(&self) -> Option<String> {
        let ts = self.file_timestamp?;
        Some(match self.media_type {
            MediaType::Image => {
                let prefix = match self.motion_type {
                    MotionType::Hmd => "HMDAlarm",
                    MotionType::Md => "MDAlarm",
                };
                format!("{}_{}.jpg", prefix, ts.format("%Y%m%d-%H%M%S"))
            }
            MediaType::Video => format!("MDalarm_{}.mkv", ts.format("%Y%m%d_%H%M%S")),
        })
    }
}

/// Whether a directory name looks like a camera device directory.
pub fn is_camera_device_dir(name: &str) -> bool {
    DEVICE_PREFIXES.iter().any(|p| name.starts_with(p))
}

fn parse_filename(
    filename: &str,
    kind: DirKind,
) -> Option<(MediaType, MotionType, Option<NaiveDateTime>)> {
    let (stem, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();

    let (media_type, prefixes): (MediaType, &[&str]) = match kind {
        DirKind::Snap if IMAGE_EXTENSIONS.contains(&ext.as_str()) => {
            (MediaType::Image, IMAGE_PREFIXES)
        }
        DirKind::Record if VIDEO_EXTENSIONS.contains(&ext.as_str()) => {
            (MediaType::Video, VIDEO_PREFIXES)
        }
        _ => return None,
    };

    let prefix = prefixes.iter().find(|p| stem.starts_with(**p))?;
    let motion_type = if prefix.starts_with("HMD") {
        MotionType::Hmd
    } else {
        MotionType::Md
    };

    let timestamp_part = &stem[prefix.len()..];
    let file_timestamp = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(timestamp_part, fmt).ok());

    Some((media_type, motion_type, file_timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use std::path::PathBuf;

    fn parse(s: &str) -> Option<ArtifactPath> {
        ArtifactPath::parse(&PathBuf::from(s))
    }

    #[test]
    fn parses_snapshot_path() {
        let artifact = parse(
            "/data/ami_frontyard_left/FoscamCamera_00626EFE8B21/snap/MDAlarm_20250712-213837.jpg",
        )
        .unwrap();

        assert_eq!(artifact.location, "ami_frontyard_left");
        assert_eq!(artifact.device_name, "FoscamCamera_00626EFE8B21");
        assert_eq!(artifact.device_type, DeviceType::FoscamCamera);
        assert_eq!(artifact.kind, DirKind::Snap);
        assert_eq!(artifact.media_type, MediaType::Image);
        assert_eq!(artifact.motion_type, MotionType::Md);

        let ts = artifact.file_timestamp.unwrap();
        assert_eq!(
            ts.date(),
            NaiveDate::from_ymd_opt(2025, 7, 12).unwrap()
        );
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (21, 38, 37));
    }

    #[test]
    fn parses_recording_path() {
        let artifact = parse(
            "/data/dock_left/FoscamCamera_00626EFE89A8/record/MDalarm_20250714_003211.mkv",
        )
        .unwrap();

        assert_eq!(artifact.media_type, MediaType::Video);
        assert_eq!(artifact.motion_type, MotionType::Md);
        assert_eq!((
            artifact.file_timestamp.unwrap().hour(),
            artifact.file_timestamp.unwrap().minute()
        ), (0, 32));
    }

    #[test]
    fn human_motion_prefix_maps_to_hmd() {
        let artifact =
            parse("/data/kitchen/R2C_A1B2C3/snap/HMDAlarm_20250101-120000.jpg").unwrap();
        assert_eq!(artifact.motion_type, MotionType::Hmd);
        assert_eq!(artifact.device_type, DeviceType::R2C);
    }

    #[test]
    fn r2_prefix_does_not_claim_r2c() {
        assert_eq!(DeviceType::from_device_name("R2C_X"), DeviceType::R2C);
        assert_eq!(DeviceType::from_device_name("R2_X"), DeviceType::R2);
        assert_eq!(
            DeviceType::from_device_name("Garage_X"),
            DeviceType::Unknown
        );
    }

    #[test]
    fn rejects_names_outside_the_grammar() {
        assert!(parse("/data/loc/FoscamCamera_1/snap/readme.txt").is_none());
        // Recording prefix in a snap directory is not a snapshot.
        assert!(parse("/data/loc/FoscamCamera_1/snap/MDalarm_20250712_213837.mkv").is_none());
        // Case matters for the prefix.
        assert!(parse("/data/loc/FoscamCamera_1/snap/mdalarm_20250712-213837.jpg").is_none());
        // Missing kind directory.
        assert!(parse("/data/loc/MDAlarm_20250712-213837.jpg").is_none());
    }

    #[test]
    fn unparseable_timestamp_is_accepted_without_one() {
        let artifact = parse("/data/loc/FoscamCamera_1/snap/MDAlarm_notadate.jpg").unwrap();
        assert!(artifact.file_timestamp.is_none());
    }

    #[test]
    fn filename_round_trips_through_parsed_fields() {
        for name in [
            "MDAlarm_20250712-213837.jpg",
            "HMDAlarm_20250101-120000.jpg",
        ] {
            let artifact = parse(&format!("/data/loc/FoscamCamera_1/snap/{name}")).unwrap();
            assert_eq!(artifact.render_filename().unwrap(), name);
        }
        let artifact =
            parse("/data/loc/FoscamCamera_1/record/MDalarm_20250714_003211.mkv").unwrap();
        assert_eq!(
            artifact.render_filename().unwrap(),
            "MDalarm_20250714_003211.mkv"
        );
    }

    #[test]
    fn device_dir_recognition_uses_known_prefixes() {
        assert!(is_camera_device_dir("FoscamCamera_00626EFE8B21"));
        assert!(is_camera_device_dir("R2_ABCDEF"));
        assert!(is_camera_device_dir("R2C_ABCDEF"));
        assert!(!is_camera_device_dir("lost+found"));
    }
}
