//! Scene segmentation: group ordered frame descriptions into scenes at
//! transition phrases.

/// Phrases that mark the start of a new scene when they appear in a
/// frame description. Fixed vocabulary; matching is case-insensitive
/// substring containment.
pub const TRANSITION_PHRASES: [&str; 8] = [
    "moving to",
    "entering",
    "stepping into",
    "next we have",
    "moving into",
    "heading to",
    "walking into",
    "now in",
];

/// One frame's description, in timestamp order.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescription {
    pub timestamp: f64,
    pub text: String,
}

/// A contiguous, non-empty run of descriptions treated as one narrative
/// unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub descriptions: Vec<FrameDescription>,
}

impl Scene {
    pub fn start_time(&self) -> f64 {
        self.descriptions[0].timestamp
    }

    pub fn end_time(&self) -> f64 {
        self.descriptions[self.descriptions.len() - 1].timestamp
    }

    pub fn texts(&self) -> Vec<String> {
        self.descriptions.iter().map(|d| d.text.clone()).collect()
    }
}

/// Whether a description text contains any transition phrase.
pub fn is_transition(text: &str) -> bool {
    let lowered = text.to_lowercase();
    TRANSITION_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Partition descriptions into scenes. A transition phrase closes the
/// current scene and opens a new one with the triggering description,
/// but only when the current scene is non-empty, so a transition in the
/// very first description never forces a split. Scenes preserve input
/// order and together reproduce the input exactly.
pub fn segment(descriptions: &[FrameDescription]) -> Vec<Scene> {
    let mut scenes = Vec::new();
    let mut current: Vec<FrameDescription> = Vec::new();

    for description in descriptions {
        if is_transition(&description.text) && !current.is_empty() {
            scenes.push(Scene {
                descriptions: std::mem::take(&mut current),
            });
        }
        current.push(description.clone());
    }
    if !current.is_empty() {
        scenes.push(Scene {
            descriptions: current,
        });
    }
    scenes
}
