//! Analysis prompts sent to the vision backend.

use common::describe::{
    ASPECT_ACTIVITIES, ASPECT_CHANGES, ASPECT_ENVIRONMENT, ASPECT_GENERAL, ASPECT_OBJECTS,
    ASPECT_SCENE_SUMMARY, ASPECT_SECURITY, ASPECT_TIMELINE,
};
use serde::Serialize;

/// One named prompt for a backend analysis pass.
#[derive(Debug, Clone, Serialize)]
pub struct AspectPrompt {
    pub name: String,
    pub prompt: String,
}

impl AspectPrompt {
    fn new(name: &str, prompt: &str) -> Self {
        Self {
            name: name.to_string(),
            prompt: prompt.to_string(),
        }
    }
}

/// The still-image analysis pass: one prompt per caption aspect.
pub fn analysis_prompts() -> Vec<AspectPrompt> {
    vec![
        AspectPrompt::new(
            ASPECT_GENERAL,
            "Question: What is happening in this image? Describe the scene in detail. Answer:",
        ),
        AspectPrompt::new(
            ASPECT_SECURITY,
            "Question: From a security perspective, what security-relevant elements, people, \
             vehicles, or activities can you identify in this image? Answer:",
        ),
        AspectPrompt::new(
            ASPECT_OBJECTS,
            "Question: What objects, items, packages, signs, or text can you identify in this \
             image? Include any readable text, logos, or markings. Answer:",
        ),
        AspectPrompt::new(
            ASPECT_ACTIVITIES,
            "Question: What activities, movements, or behaviors are occurring in this image? \
             Answer:",
        ),
        AspectPrompt::new(
            ASPECT_ENVIRONMENT,
            "Question: What is the environmental context? Describe the location, time of day, \
             weather conditions, and setting. Answer:",
        ),
    ]
}

/// The per-frame timeline pass for videos. Subsequent frames carry a
/// truncated summary of the previous scene so the backend answers in terms
/// of changes.
pub fn timeline_prompts(is_first_frame: bool, previous_scene: &str) -> Vec<AspectPrompt> {
    if is_first_frame {
        return vec![
            AspectPrompt::new(
                ASPECT_SCENE_SUMMARY,
                "Question: What is the initial scene at the beginning of this video? Describe \
                 the setting, main elements, and any people or objects present. Answer:",
            ),
            AspectPrompt::new(
                ASPECT_TIMELINE,
                "Question: This is the opening scene of a video. What is happening and what \
                 should we watch for? Answer:",
            ),
            AspectPrompt::new(
                ASPECT_CHANGES,
                "Question: What key elements are present in this initial scene that might \
                 change later? Answer:",
            ),
        ];
    }

    let context: String = previous_scene.chars().take(100).collect();
    vec![
        AspectPrompt::new(
            ASPECT_SCENE_SUMMARY,
            "Question: What is currently happening in this scene? Focus on the main activity \
             and any people or objects. Answer:",
        ),
        AspectPrompt {
            name: ASPECT_TIMELINE.to_string(),
            prompt: format!(
                "Question: Compared to the previous scene: '{context}', what has changed or is \
                 different in this current scene? Focus only on new events or changes. Answer:"
            ),
        },
        AspectPrompt::new(
            ASPECT_CHANGES,
            "Question: What specific changes, movements, or new events can you identify in \
             this scene? Answer:",
        ),
    ]
}
