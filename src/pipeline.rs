//! Pipeline orchestration: sample, describe, persist the analysis,
//! segment, narrate, polish, persist the narration and timing. Every
//! step runs sequentially; any failure is terminal.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ai::{TextGenerate, VisionDescribe};
use crate::analyzer::describe_frames;
use crate::capture;
use crate::error::{Error, Result};
use crate::narrator::{draft_script, narrate_scene, polish_script, Script};
use crate::output::{
    now_rfc3339, video_stem, write_frames, write_text, AnalysisRecord, AnalyzedFrame, RunDir,
    SceneTiming, TemplateRef, TimingRecord,
};
use crate::scenes;
use crate::template::Style;

/// Where a run currently is. Reported through the progress callback so
/// a caller can mirror it in its own interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sampling,
    Describing,
    Segmenting,
    Narrating,
    Polishing,
    Done,
}

/// One progress update. `completed`/`total` are only meaningful for the
/// per-item stages (describing, narrating).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub stage: Stage,
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    fn at(stage: Stage) -> Self {
        Self {
            stage,
            completed: 0,
            total: 0,
        }
    }
}

/// Result of the analysis stage.
pub struct AnalysisOutcome {
    pub run_dir: PathBuf,
    pub record_path: PathBuf,
    pub record: AnalysisRecord,
}

/// Result of the narration stage.
#[derive(Debug)]
pub struct NarrationOutcome {
    pub run_dir: PathBuf,
    pub narration_path: PathBuf,
    pub timing_path: PathBuf,
    pub script: Script,
}

/// One pipeline run's collaborators and style, resolved up front and
/// immutable for the duration of the run.
pub struct Pipeline<'a> {
    pub describer: &'a dyn VisionDescribe,
    pub generator: &'a dyn TextGenerate,
    pub style: Style,
    pub cancel: CancellationToken,
}

impl Pipeline<'_> {
    /// Sample the video, describe every frame, and persist the analysis
    /// record together with the frame images. The run directory is
    /// discarded if any step fails or the run is cancelled.
    pub async fn analyze(
        &self,
        video: &Path,
        output_root: &Path,
        interval_secs: u32,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<AnalysisOutcome> {
        progress(Progress::at(Stage::Sampling));
        info!("sampling {} every {}s", video.display(), interval_secs);
        let (meta, frames) = capture::sample_frames(video, interval_secs)?;
        info!(
            "sampled {} frames from {:.1}s of video",
            frames.len(),
            meta.duration
        );
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let stem = video_stem(video);
        let run = RunDir::create(output_root, &stem)?;
        let frame_paths = write_frames(run.path(), &frames)?;

        let descriptions =
            describe_frames(self.describer, &self.style, &frames, &self.cancel, progress).await?;

        let record = AnalysisRecord {
            video_name: stem.clone(),
            template: TemplateRef::from(&self.style),
            metadata: meta,
            frames: descriptions
                .iter()
                .zip(&frame_paths)
                .map(|(d, path)| AnalyzedFrame {
                    timestamp: d.timestamp,
                    narration: d.text.clone(),
                    frame_path: path.to_string_lossy().into_owned(),
                })
                .collect(),
            analyzed_at: now_rfc3339(),
        };
        let record_path = run.path().join(format!("{stem}_analysis.json"));
        record.save(&record_path)?;

        let run_dir = run.keep();
        info!("analysis saved to {}", record_path.display());
        Ok(AnalysisOutcome {
            run_dir,
            record_path,
            record,
        })
    }

    /// Segment the analysis into scenes, narrate each, polish the
    /// combined draft, and persist the narration and timing artifacts.
    pub async fn narrate(
        &self,
        record: &AnalysisRecord,
        output_root: &Path,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<NarrationOutcome> {
        progress(Progress::at(Stage::Segmenting));
        let scene_list = scenes::segment(&record.descriptions());
        info!(
            "identified {} scenes across {} descriptions",
            scene_list.len(),
            record.frames.len()
        );

        let run = RunDir::create(output_root, &format!("{}_narration", record.video_name))?;

        let total = scene_list.len();
        let mut narrations = Vec::with_capacity(total);
        for (i, scene) in scene_list.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            progress(Progress {
                stage: Stage::Narrating,
                completed: i,
                total,
            });
            info!("narrating scene {} of {}", i + 1, total);
            let narration = narrate_scene(self.generator, &self.style, scene)
                .await
                .map_err(|source| Error::Narrate {
                    scene: i + 1,
                    total,
                    source,
                })?;
            narrations.push(narration);
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        progress(Progress::at(Stage::Polishing));
        let polished_text = if narrations.is_empty() {
            String::new()
        } else {
            info!("polishing final narration");
            let draft = draft_script(&narrations);
            polish_script(self.generator, &draft)
                .await
                .map_err(|source| Error::Polish { source })?
        };
        let script = Script {
            scenes: narrations,
            polished_text,
        };

        let narration_path = run
            .path()
            .join(format!("{}_narration.txt", record.video_name));
        write_text(&narration_path, &script.polished_text)?;

        let timing = TimingRecord {
            video_name: record.video_name.clone(),
            template: TemplateRef::from(&self.style),
            scene_timings: script
                .scenes
                .iter()
                .map(|n| SceneTiming {
                    start_time: n.start_time,
                    end_time: n.end_time,
                    original_descriptions: n.source_descriptions.clone(),
                })
                .collect(),
            generated_at: now_rfc3339(),
        };
        let timing_path = run
            .path()
            .join(format!("{}_timing.json", record.video_name));
        timing.save(&timing_path)?;

        progress(Progress::at(Stage::Done));
        let run_dir = run.keep();
        info!("narration saved to {}", narration_path.display());
        Ok(NarrationOutcome {
            run_dir,
            narration_path,
            timing_path,
            script,
        })
    }

    /// Narration stage starting from a saved analysis record.
    pub async fn narrate_file(
        &self,
        analysis_path: &Path,
        output_root: &Path,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<NarrationOutcome> {
        let record = AnalysisRecord::load(analysis_path)?;
        self.narrate(&record, output_root, progress).await
    }

    /// The full pipeline: analysis followed by narration.
    pub async fn run(
        &self,
        video: &Path,
        output_root: &Path,
        interval_secs: u32,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<(AnalysisOutcome, NarrationOutcome)> {
        let analysis = self
            .analyze(video, output_root, interval_secs, &mut *progress)
            .await?;
        let narration = self
            .narrate(&analysis.record, output_root, &mut *progress)
            .await?;
        Ok((analysis, narration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::VideoMeta;
    use crate::error::{CaptionError, GenerationError};
    use crate::template::TemplateSet;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct NoDescriber;

    #[async_trait]
    impl VisionDescribe for NoDescriber {
        async fn describe(
            &self,
            _instruction: &str,
            _image_jpeg: &[u8],
        ) -> std::result::Result<String, CaptionError> {
            Err(CaptionError::Unavailable("not used in this test".to_owned()))
        }
    }

    /// Replies "narration N" per scene call, then a fixed polish reply.
    struct CountingGenerator {
        calls: Mutex<usize>,
        polish_reply: String,
    }

    #[async_trait]
    impl TextGenerate for CountingGenerator {
        async fn generate(
            &self,
            system: &str,
            _user: &str,
            _max_tokens: u32,
        ) -> std::result::Result<String, GenerationError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if system.starts_with("Polish") {
                Ok(self.polish_reply.clone())
            } else {
                Ok(format!("narration {}", *calls))
            }
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerate for FailingGenerator {
        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _max_tokens: u32,
        ) -> std::result::Result<String, GenerationError> {
            Err(GenerationError::Unavailable("api down".to_owned()))
        }
    }

    fn record() -> AnalysisRecord {
        AnalysisRecord {
            video_name: "tour".to_owned(),
            template: TemplateRef {
                id: "room-tour".to_owned(),
                name: "Room Walk-through".to_owned(),
                customized: false,
            },
            metadata: VideoMeta {
                duration: 6.0,
                fps: 30.0,
                width: 1280,
                height: 720,
            },
            frames: vec![
                AnalyzedFrame {
                    timestamp: 0.0,
                    narration: "wide shot of kitchen".to_owned(),
                    frame_path: "frames/frame_0001.jpg".to_owned(),
                },
                AnalyzedFrame {
                    timestamp: 2.0,
                    narration: "moving to the living room now".to_owned(),
                    frame_path: "frames/frame_0002.jpg".to_owned(),
                },
                AnalyzedFrame {
                    timestamp: 4.0,
                    narration: "sofa and fireplace".to_owned(),
                    frame_path: "frames/frame_0003.jpg".to_owned(),
                },
            ],
            analyzed_at: "2025-01-01T00:00:00+00:00".to_owned(),
        }
    }

    fn pipeline<'a>(generator: &'a dyn TextGenerate, describer: &'a dyn VisionDescribe) -> Pipeline<'a> {
        Pipeline {
            describer,
            generator,
            style: TemplateSet::builtin().get("room-tour").unwrap().style(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn narrate_produces_both_artifacts_with_scene_timing() {
        let root = tempfile::tempdir().unwrap();
        let generator = CountingGenerator {
            calls: Mutex::new(0),
            polish_reply: "[00:00] A smooth final script.".to_owned(),
        };
        let describer = NoDescriber;
        let pipeline = pipeline(&generator, &describer);
        let mut stages = Vec::new();

        let outcome = pipeline
            .narrate(&record(), root.path(), &mut |p| stages.push(p.stage))
            .await
            .unwrap();

        // two scenes: the transition closes the first after one description
        assert_eq!(outcome.script.scenes.len(), 2);
        assert_eq!(outcome.script.scenes[0].start_time, 0.0);
        assert_eq!(outcome.script.scenes[0].end_time, 0.0);
        assert_eq!(outcome.script.scenes[1].start_time, 2.0);
        assert_eq!(outcome.script.scenes[1].end_time, 4.0);

        // polish reply survives with the leaked tag scrubbed
        assert_eq!(outcome.script.polished_text, "A smooth final script.");
        let saved = std::fs::read_to_string(&outcome.narration_path).unwrap();
        assert_eq!(saved, "A smooth final script.");

        let timing = TimingRecord::load(&outcome.timing_path).unwrap();
        assert_eq!(timing.scene_timings.len(), 2);
        assert_eq!(
            timing.scene_timings[1].original_descriptions,
            vec!["moving to the living room now", "sofa and fireplace"]
        );

        assert_eq!(
            stages,
            vec![
                Stage::Segmenting,
                Stage::Narrating,
                Stage::Narrating,
                Stage::Polishing,
                Stage::Done
            ]
        );
    }

    #[tokio::test]
    async fn narrate_failure_names_the_scene_and_discards_the_run_dir() {
        let root = tempfile::tempdir().unwrap();
        let generator = FailingGenerator;
        let describer = NoDescriber;
        let pipeline = pipeline(&generator, &describer);

        let err = pipeline
            .narrate(&record(), root.path(), &mut |_| {})
            .await
            .unwrap_err();
        match err {
            Error::Narrate { scene, total, .. } => {
                assert_eq!(scene, 1);
                assert_eq!(total, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        // the narration run directory did not survive the failure
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn cancelled_narrate_leaves_nothing_behind() {
        let root = tempfile::tempdir().unwrap();
        let generator = CountingGenerator {
            calls: Mutex::new(0),
            polish_reply: String::new(),
        };
        let describer = NoDescriber;
        let pipeline = pipeline(&generator, &describer);
        pipeline.cancel.cancel();

        let err = pipeline
            .narrate(&record(), root.path(), &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
        assert_eq!(*generator.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_analysis_yields_an_empty_script_without_polish() {
        let root = tempfile::tempdir().unwrap();
        let generator = FailingGenerator;
        let describer = NoDescriber;
        let pipeline = pipeline(&generator, &describer);
        let mut empty = record();
        empty.frames.clear();

        // the generator would fail if called, so success proves no call
        let outcome = pipeline
            .narrate(&empty, root.path(), &mut |_| {})
            .await
            .unwrap();
        assert!(outcome.script.scenes.is_empty());
        assert_eq!(outcome.script.polished_text, "");
    }

    #[tokio::test]
    async fn narrate_file_roundtrips_through_a_saved_record() {
        let root = tempfile::tempdir().unwrap();
        let analysis_path = root.path().join("tour_analysis.json");
        record().save(&analysis_path).unwrap();

        let generator = CountingGenerator {
            calls: Mutex::new(0),
            polish_reply: "Final.".to_owned(),
        };
        let describer = NoDescriber;
        let pipeline = pipeline(&generator, &describer);

        let out_root = root.path().join("narration");
        std::fs::create_dir_all(&out_root).unwrap();
        let outcome = pipeline
            .narrate_file(&analysis_path, &out_root, &mut |_| {})
            .await
            .unwrap();
        assert_eq!(outcome.script.polished_text, "Final.");
        assert!(outcome.run_dir.starts_with(&out_root));
    }
}
