//! Narration styles: built-in templates, user overrides, and the
//! immutable style value the pipeline consumes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PersistenceError;

/// A named pair of instructions: one guiding frame analysis, one guiding
/// narration. User overrides shadow the defaults without replacing them.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: String,
    pub default_analysis_prompt: String,
    pub default_narration_prompt: String,
    pub custom_analysis_prompt: Option<String>,
    pub custom_narration_prompt: Option<String>,
}

impl Template {
    /// Active analysis instruction: the override if present.
    pub fn analysis_prompt(&self) -> &str {
        self.custom_analysis_prompt
            .as_deref()
            .unwrap_or(&self.default_analysis_prompt)
    }

    /// Active narration instruction: the override if present.
    pub fn narration_prompt(&self) -> &str {
        self.custom_narration_prompt
            .as_deref()
            .unwrap_or(&self.default_narration_prompt)
    }

    pub fn is_customized(&self) -> bool {
        self.custom_analysis_prompt.is_some() || self.custom_narration_prompt.is_some()
    }

    pub fn reset_to_defaults(&mut self) {
        self.custom_analysis_prompt = None;
        self.custom_narration_prompt = None;
    }

    /// Snapshot the effective instructions into an immutable style value.
    pub fn style(&self) -> Style {
        Style {
            id: self.id.clone(),
            name: self.name.clone(),
            analysis_instruction: self.analysis_prompt().to_owned(),
            narration_instruction: self.narration_prompt().to_owned(),
            customized: self.is_customized(),
        }
    }
}

/// Effective instructions for one pipeline run, resolved once from a
/// template so no shared mutable state reaches the core.
#[derive(Debug, Clone)]
pub struct Style {
    pub id: String,
    pub name: String,
    pub analysis_instruction: String,
    pub narration_instruction: String,
    pub customized: bool,
}

/// Persisted form of one template's overrides; only customized templates
/// are written.
#[derive(Debug, Serialize, Deserialize)]
struct SavedOverrides {
    #[serde(default)]
    custom_analysis_prompt: Option<String>,
    #[serde(default)]
    custom_narration_prompt: Option<String>,
}

/// The built-in template collection plus any loaded overrides.
pub struct TemplateSet {
    templates: BTreeMap<String, Template>,
}

impl TemplateSet {
    /// The four built-in templates with their default prompts.
    pub fn builtin() -> Self {
        let mut templates = BTreeMap::new();
        for template in builtin_templates() {
            templates.insert(template.id.clone(), template);
        }
        Self { templates }
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Template> {
        self.templates.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    /// Apply custom prompts from a JSON side file. Unknown template ids
    /// are ignored; a missing or unreadable file leaves the defaults in
    /// place with a warning rather than failing the run.
    pub fn load_overrides(&mut self, path: &Path) {
        if !path.exists() {
            return;
        }
        let saved: BTreeMap<String, SavedOverrides> = match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
        {
            Ok(saved) => saved,
            Err(e) => {
                warn!("ignoring custom prompts in {}: {}", path.display(), e);
                return;
            }
        };
        for (id, overrides) in saved {
            if let Some(template) = self.templates.get_mut(&id) {
                template.custom_analysis_prompt = overrides.custom_analysis_prompt;
                template.custom_narration_prompt = overrides.custom_narration_prompt;
            }
        }
    }

    /// Write the customized templates back to the side file.
    pub fn save_overrides(&self, path: &Path) -> Result<(), PersistenceError> {
        let saved: BTreeMap<&str, SavedOverrides> = self
            .templates
            .values()
            .filter(|t| t.is_customized())
            .map(|t| {
                (
                    t.id.as_str(),
                    SavedOverrides {
                        custom_analysis_prompt: t.custom_analysis_prompt.clone(),
                        custom_narration_prompt: t.custom_narration_prompt.clone(),
                    },
                )
            })
            .collect();
        let json = serde_json::to_string_pretty(&saved).map_err(|source| {
            PersistenceError::Json {
                path: path.to_path_buf(),
                source,
            }
        })?;
        std::fs::write(path, json).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn builtin_templates() -> Vec<Template> {
    vec![
        Template {
            id: "room-tour".to_owned(),
            name: "Room Walk-through".to_owned(),
            description: "Perfect for real estate, hotel rooms, and interior tours".to_owned(),
            default_analysis_prompt: "\
Analyze this room as a veteran tour guide would see it. Focus on:
- Layout and practical use of space
- Notable features and amenities
- Lighting and atmosphere
- Quality of finishes and materials
Describe it clearly and directly, as if explaining to a friend."
                .to_owned(),
            default_narration_prompt: "\
Create a natural, flowing tour narrative connecting these room descriptions.
Use a straightforward, conversational style appropriate for a veteran narrator.
Focus on practical details and clear transitions between spaces."
                .to_owned(),
            custom_analysis_prompt: None,
            custom_narration_prompt: None,
        },
        Template {
            id: "outdoor-scene".to_owned(),
            name: "Outdoor Scenes".to_owned(),
            description: "Ideal for nature, landscapes, and exterior property views".to_owned(),
            default_analysis_prompt: "\
Observe this outdoor scene as an experienced guide would.
Note key features like:
- Landscape elements and views
- Natural features and terrain
- Notable landmarks or structures
- Weather and lighting conditions
Use clear, straightforward language."
                .to_owned(),
            default_narration_prompt: "\
Develop a natural narrative that guides viewers through these outdoor scenes.
Use direct, clear language that connects different views and locations.
Focus on notable features and maintain a steady, comfortable pace."
                .to_owned(),
            custom_analysis_prompt: None,
            custom_narration_prompt: None,
        },
        Template {
            id: "event-coverage".to_owned(),
            name: "Event Coverage".to_owned(),
            description: "Great for ceremonies, gatherings, and special occasions".to_owned(),
            default_analysis_prompt: "\
Analyze this event scene focusing on:
- Key activities and moments
- People and interactions
- Setting and atmosphere
- Timeline of events
Describe it clearly and chronologically."
                .to_owned(),
            default_narration_prompt: "\
Create a chronological narrative of the event that flows naturally.
Focus on key moments and transitions.
Maintain clear timing references while keeping a conversational tone."
                .to_owned(),
            custom_analysis_prompt: None,
            custom_narration_prompt: None,
        },
        Template {
            id: "product-showcase".to_owned(),
            name: "Product Showcase".to_owned(),
            description: "Suited for product demonstrations and features".to_owned(),
            default_analysis_prompt: "\
Examine this product scene focusing on:
- Key features and functions
- Design elements
- Practical benefits
- Quality and craftsmanship
Use clear, non-marketing language."
                .to_owned(),
            default_narration_prompt: "\
Develop a straightforward narrative about the product's features and benefits.
Avoid marketing jargon and focus on practical information.
Create natural transitions between different aspects of the product."
                .to_owned(),
            custom_analysis_prompt: None,
            custom_narration_prompt: None,
        },
    ]
}
