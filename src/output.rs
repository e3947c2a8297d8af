//! Persisted artifacts: the analysis record, the timing record, the
//! narration text, and the timestamp-qualified run directories that own
//! them.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capture::{Frame, VideoMeta};
use crate::error::PersistenceError;
use crate::scenes::FrameDescription;
use crate::template::Style;

/// Which template produced an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub customized: bool,
}

impl From<&Style> for TemplateRef {
    fn from(style: &Style) -> Self {
        Self {
            id: style.id.clone(),
            name: style.name.clone(),
            customized: style.customized,
        }
    }
}

/// One described frame as persisted in the analysis record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedFrame {
    pub timestamp: f64,
    pub narration: String,
    pub frame_path: String,
}

/// Everything the analysis stage produced: video identity, metadata,
/// and the ordered frame descriptions. The narration stage can run from
/// a reloaded copy of this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub video_name: String,
    pub template: TemplateRef,
    pub metadata: VideoMeta,
    pub frames: Vec<AnalyzedFrame>,
    pub analyzed_at: String,
}

impl AnalysisRecord {
    /// The frame descriptions in timestamp order, ready for segmentation.
    pub fn descriptions(&self) -> Vec<FrameDescription> {
        self.frames
            .iter()
            .map(|f| FrameDescription {
                timestamp: f.timestamp,
                text: f.narration.clone(),
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        save_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        load_json(path)
    }
}

/// Per-scene timing for the timing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneTiming {
    pub start_time: f64,
    pub end_time: f64,
    pub original_descriptions: Vec<String>,
}

/// Traceability artifact pairing each scene's time span with the
/// descriptions that fed it. Not intended for TTS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub video_name: String,
    pub template: TemplateRef,
    pub scene_timings: Vec<SceneTiming>,
    pub generated_at: String,
}

impl TimingRecord {
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        save_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        load_json(path)
    }
}

/// RFC 3339 timestamp for artifact records.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// File stem of the input video, used to name artifacts.
pub fn video_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_owned())
}

/// A timestamp-qualified directory owned by one pipeline stage. The
/// directory and everything in it are removed on drop unless the stage
/// completes and calls [`RunDir::keep`], so partial output never
/// survives a failure or cancellation.
pub struct RunDir {
    path: PathBuf,
    keep: bool,
}

impl RunDir {
    /// Create `<root>/<base_name>_<YYYYmmdd_HHMMSS>`, suffixed with a
    /// counter if a same-second run already claimed the name.
    pub fn create(root: &Path, base_name: &str) -> Result<Self, PersistenceError> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let mut path = root.join(format!("{base_name}_{stamp}"));
        let mut attempt = 1;
        while path.exists() {
            attempt += 1;
            path = root.join(format!("{base_name}_{stamp}_{attempt}"));
        }
        fs::create_dir_all(&path).map_err(|source| PersistenceError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, keep: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mark the run as complete; the directory is left on disk.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for RunDir {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                warn!("failed to clean up {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Write the sampled frames under `<dir>/frames/` for inspection and
/// return their paths, in frame order.
pub fn write_frames(dir: &Path, frames: &[Frame]) -> Result<Vec<PathBuf>, PersistenceError> {
    let frames_dir = dir.join("frames");
    fs::create_dir_all(&frames_dir).map_err(|source| PersistenceError::Io {
        path: frames_dir.clone(),
        source,
    })?;

    let mut paths = Vec::with_capacity(frames.len());
    for frame in frames {
        let path = frames_dir.join(format!("frame_{:04}.jpg", frame.index));
        fs::write(&path, &frame.jpeg).map_err(|source| PersistenceError::Io {
            path: path.clone(),
            source,
        })?;
        paths.push(path);
    }
    Ok(paths)
}

pub fn write_text(path: &Path, text: &str) -> Result<(), PersistenceError> {
    fs::write(path, text).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let text = fs::read_to_string(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> AnalysisRecord {
        AnalysisRecord {
            video_name: "tour".to_owned(),
            template: TemplateRef {
                id: "room-tour".to_owned(),
                name: "Room Walk-through".to_owned(),
                customized: false,
            },
            metadata: VideoMeta {
                duration: 5.0,
                fps: 30.0,
                width: 1280,
                height: 720,
            },
            frames: vec![
                AnalyzedFrame {
                    timestamp: 0.0,
                    narration: "a kitchen".to_owned(),
                    frame_path: "frames/frame_0001.jpg".to_owned(),
                },
                AnalyzedFrame {
                    timestamp: 2.0,
                    narration: "moving to the patio".to_owned(),
                    frame_path: "frames/frame_0002.jpg".to_owned(),
                },
            ],
            analyzed_at: "2025-01-01T00:00:00+00:00".to_owned(),
        }
    }

    #[test]
    fn analysis_record_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tour_analysis.json");

        let record = sample_record();
        record.save(&path).unwrap();
        let loaded = AnalysisRecord::load(&path).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn descriptions_preserve_order_and_timestamps() {
        let descriptions = sample_record().descriptions();
        assert_eq!(descriptions.len(), 2);
        assert_eq!(descriptions[0].timestamp, 0.0);
        assert_eq!(descriptions[1].text, "moving to the patio");
    }

    #[test]
    fn timing_record_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tour_timing.json");

        let record = TimingRecord {
            video_name: "tour".to_owned(),
            template: TemplateRef {
                id: "room-tour".to_owned(),
                name: "Room Walk-through".to_owned(),
                customized: true,
            },
            scene_timings: vec![SceneTiming {
                start_time: 0.0,
                end_time: 2.0,
                original_descriptions: vec!["a kitchen".to_owned()],
            }],
            generated_at: now_rfc3339(),
        };
        record.save(&path).unwrap();
        assert_eq!(TimingRecord::load(&path).unwrap(), record);
    }

    #[test]
    fn run_dir_is_removed_unless_kept() {
        let root = tempfile::tempdir().unwrap();

        let discarded = RunDir::create(root.path(), "tour").unwrap();
        let discarded_path = discarded.path().to_path_buf();
        drop(discarded);
        assert!(!discarded_path.exists());

        let kept = RunDir::create(root.path(), "tour").unwrap();
        let kept_path = kept.keep();
        assert!(kept_path.exists());
    }

    #[test]
    fn frames_are_written_in_order() {
        let root = tempfile::tempdir().unwrap();
        let frames = vec![
            Frame {
                timestamp: 0.0,
                index: 1,
                total: 2,
                jpeg: vec![1, 2, 3],
            },
            Frame {
                timestamp: 2.0,
                index: 2,
                total: 2,
                jpeg: vec![4, 5, 6],
            },
        ];
        let paths = write_frames(root.path(), &frames).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("frames/frame_0001.jpg"));
        assert_eq!(fs::read(&paths[1]).unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn video_stem_falls_back_when_missing() {
        assert_eq!(video_stem(Path::new("/tmp/house_tour.mp4")), "house_tour");
        assert_eq!(video_stem(Path::new("/")), "video");
    }
}
