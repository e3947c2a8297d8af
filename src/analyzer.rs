//! Frame analysis: describe each sampled frame, in timestamp order,
//! through the vision capability.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ai::VisionDescribe;
use crate::capture::Frame;
use crate::error::{Error, Result};
use crate::pipeline::{Progress, Stage};
use crate::scenes::FrameDescription;
use crate::template::Style;

/// Describe every frame with the style's analysis instruction. Frames
/// are processed strictly in order, one call at a time; the first
/// failure aborts with the frame's index and timestamp attached.
pub async fn describe_frames(
    describer: &dyn VisionDescribe,
    style: &Style,
    frames: &[Frame],
    cancel: &CancellationToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<Vec<FrameDescription>> {
    let mut descriptions = Vec::with_capacity(frames.len());
    for frame in frames {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        progress(Progress {
            stage: Stage::Describing,
            completed: frame.index - 1,
            total: frame.total,
        });
        info!("analyzing frame {} of {}", frame.index, frame.total);

        let text = describer
            .describe(&style.analysis_instruction, &frame.jpeg)
            .await
            .map_err(|source| Error::Describe {
                index: frame.index,
                total: frame.total,
                timestamp: frame.timestamp,
                source,
            })?;
        descriptions.push(FrameDescription {
            timestamp: frame.timestamp,
            text,
        });
    }
    Ok(descriptions)
}
