//! Scene narration and script assembly: turn grouped descriptions into
//! flowing narration, then polish the combined draft for delivery.

use crate::ai::TextGenerate;
use crate::error::GenerationError;
use crate::scenes::Scene;
use crate::template::Style;

const SCENE_MAX_TOKENS: u32 = 500;
const POLISH_MAX_TOKENS: u32 = 2000;

const POLISH_SYSTEM: &str = "Polish this narration for natural flow and text-to-speech delivery. \
     Ensure smooth transitions between paragraphs. \
     Do not include any technical notes or timing information.";

/// Narration for one scene, with the timing and source material kept
/// for the timing record.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNarration {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub source_descriptions: Vec<String>,
}

/// The finished script: per-scene narrations in order plus the polished
/// full text. Written once, never mutated.
#[derive(Debug, Clone)]
pub struct Script {
    pub scenes: Vec<SceneNarration>,
    pub polished_text: String,
}

/// The context block handed to the generator: the scene's descriptions,
/// one per line, in original order.
pub fn scene_context(scene: &Scene) -> String {
    scene.texts().join("\n")
}

fn narration_system(narration_instruction: &str) -> String {
    format!(
        "Create flowing, natural narration suitable for text-to-speech. \
         Do not include timestamps, stage directions, or technical notes. \
         Use the style specified:\n\n{narration_instruction}"
    )
}

/// Generate narration for one scene.
pub async fn narrate_scene(
    generator: &dyn TextGenerate,
    style: &Style,
    scene: &Scene,
) -> Result<SceneNarration, GenerationError> {
    let system = narration_system(&style.narration_instruction);
    let user = format!(
        "Create natural narration from these descriptions:\n\n{}",
        scene_context(scene)
    );
    let text = generator.generate(&system, &user, SCENE_MAX_TOKENS).await?;
    Ok(SceneNarration {
        start_time: scene.start_time(),
        end_time: scene.end_time(),
        text: text.trim().to_owned(),
        source_descriptions: scene.texts(),
    })
}

/// Join per-scene narrations with a blank line into the unpolished
/// draft.
pub fn draft_script(narrations: &[SceneNarration]) -> String {
    narrations
        .iter()
        .map(|n| n.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Run the global smoothing pass over the draft. The response is
/// trimmed and stripped of any timestamp tags the model let through.
pub async fn polish_script(
    generator: &dyn TextGenerate,
    draft: &str,
) -> Result<String, GenerationError> {
    let text = generator
        .generate(POLISH_SYSTEM, draft, POLISH_MAX_TOKENS)
        .await?;
    Ok(scrub_markers(text.trim()))
}

/// Remove bracketed timestamp tags such as `[00:12]` or `[0:05 - 0:12]`
/// from narration text, along with one trailing space. Brackets that do
/// not look like clock references are left alone.
pub fn scrub_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('[') {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);
        match timestamp_tag_len(tail) {
            Some(len) => {
                rest = tail[len..].strip_prefix(' ').unwrap_or(&tail[len..]);
            }
            None => {
                out.push('[');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Length of a bracketed clock tag at the start of `s` (which begins
/// with `[`), or `None` if the bracket holds anything else.
fn timestamp_tag_len(s: &str) -> Option<usize> {
    let inner = &s[1..];
    let close = inner.find(']')?;
    let token = &inner[..close];
    let allowed = token
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ':' | '.' | '-' | ' '));
    let has_clock = token
        .as_bytes()
        .windows(3)
        .any(|w| w[0].is_ascii_digit() && w[1] == b':' && w[2].is_ascii_digit());
    (allowed && has_clock).then_some(close + 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenes::FrameDescription;
    use async_trait::async_trait;

    struct CannedGenerator {
        reply: String,
    }

    #[async_trait]
    impl TextGenerate for CannedGenerator {
        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _max_tokens: u32,
        ) -> Result<String, GenerationError> {
            Ok(self.reply.clone())
        }
    }

    fn scene(texts: &[&str]) -> Scene {
        Scene {
            descriptions: texts
                .iter()
                .enumerate()
                .map(|(i, text)| FrameDescription {
                    timestamp: (i * 2) as f64,
                    text: (*text).to_owned(),
                })
                .collect(),
        }
    }

    #[test]
    fn context_joins_descriptions_in_order() {
        let scene = scene(&["a hallway", "a doorway"]);
        assert_eq!(scene_context(&scene), "a hallway\na doorway");
    }

    #[test]
    fn system_guidance_carries_the_style_instruction() {
        let system = narration_system("keep it brief");
        assert!(system.contains("text-to-speech"));
        assert!(system.ends_with("keep it brief"));
    }

    #[tokio::test]
    async fn scene_narration_keeps_timing_and_sources() {
        let generator = CannedGenerator {
            reply: "  We begin in the hallway.  ".to_owned(),
        };
        let style = crate::template::TemplateSet::builtin()
            .get("room-tour")
            .unwrap()
            .style();
        let scene = scene(&["a hallway", "a doorway"]);

        let narration = narrate_scene(&generator, &style, &scene).await.unwrap();
        assert_eq!(narration.text, "We begin in the hallway.");
        assert_eq!(narration.start_time, 0.0);
        assert_eq!(narration.end_time, 2.0);
        assert_eq!(narration.source_descriptions, vec!["a hallway", "a doorway"]);
    }

    #[test]
    fn draft_joins_scenes_with_blank_lines() {
        let narrations = vec![
            SceneNarration {
                start_time: 0.0,
                end_time: 2.0,
                text: "First scene.".to_owned(),
                source_descriptions: vec![],
            },
            SceneNarration {
                start_time: 4.0,
                end_time: 6.0,
                text: "Second scene.".to_owned(),
                source_descriptions: vec![],
            },
        ];
        assert_eq!(draft_script(&narrations), "First scene.\n\nSecond scene.");
    }

    #[tokio::test]
    async fn polish_scrubs_leaked_markers() {
        let generator = CannedGenerator {
            reply: "[00:12] The tour begins. [0:05 - 0:12] We move on.".to_owned(),
        };
        let polished = polish_script(&generator, "draft").await.unwrap();
        assert_eq!(polished, "The tour begins. We move on.");
        assert!(!polished.contains("[00:"));
    }

    #[test]
    fn scrub_removes_clock_tags_only() {
        assert_eq!(scrub_markers("before [12:34] after"), "before after");
        assert_eq!(scrub_markers("[0:05]start"), "start");
        assert_eq!(scrub_markers("plain text"), "plain text");
        assert_eq!(scrub_markers("keep [sic] this"), "keep [sic] this");
        assert_eq!(scrub_markers("unclosed [00:1"), "unclosed [00:1");
    }
}
