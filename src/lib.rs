pub mod ai;
pub mod analyzer;
pub mod capture;
pub mod error;
pub mod narrator;
pub mod output;
pub mod pipeline;
pub mod scenes;
pub mod template;

pub use ai::{OpenAiEngine, TextGenerate, VisionDescribe};
pub use capture::{sample_frames, Frame, VideoMeta};
pub use error::{Error, Result};
pub use narrator::{SceneNarration, Script};
pub use output::{AnalysisRecord, TimingRecord};
pub use pipeline::{AnalysisOutcome, NarrationOutcome, Pipeline, Progress, Stage};
pub use scenes::{segment, FrameDescription, Scene, TRANSITION_PHRASES};
pub use template::{Style, Template, TemplateSet};
