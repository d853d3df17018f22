//! Caption synthesis: raw aspect texts in, composite descriptions out.
//!
//! Images synthesize to
//! `SCENE: … | SECURITY: … | OBJECTS: … | ACTIVITY: … | SETTING: … | ALERTS: …`
//! and videos to
//! `TIMELINE ANALYSIS (12.5s, 3 events) | EVENTS: 00:05: … | EVENT TYPES: … | ALERTS: …`.
//! The `ALERTS:` tail carries the kinds the alert deriver fires over the
//! synthesized text, so the stored description is self-contained.

use common::describe::{
    AspectMap, TimelineEvent, ASPECT_ACTIVITIES, ASPECT_ENVIRONMENT, ASPECT_GENERAL,
    ASPECT_OBJECTS, ASPECT_SECURITY, ASPECT_TIMELINE,
};
use common::keywords::{
    derive_alerts, extract_activities, extract_environment_info, extract_object_counts,
    extract_security_relevance, joined_aspect_text, AlertKind,
};

/// Build the composite caption for a still image and the alert kinds its
/// text fires.
pub fn compose_image_caption(aspects: &AspectMap) -> (String, Vec<AlertKind>) {
    let mut parts = Vec::new();

    if let Some(general) = non_empty(aspects, ASPECT_GENERAL) {
        parts.push(format!("SCENE: {general}"));
    }
    if let Some(security) = non_empty(aspects, ASPECT_SECURITY) {
        if !security.to_lowercase().contains("error") {
            let relevant = extract_security_relevance(security);
            if !relevant.is_empty() {
                parts.push(format!("SECURITY: {relevant}"));
            }
        }
    }
    if let Some(objects) = non_empty(aspects, ASPECT_OBJECTS) {
        let summary = extract_object_counts(objects);
        if !summary.is_empty() {
            parts.push(format!("OBJECTS: {summary}"));
        }
    }
    if let Some(activities) = non_empty(aspects, ASPECT_ACTIVITIES) {
        if !activities.to_lowercase().contains("no activities") {
            let summary = extract_activities(activities);
            if !summary.is_empty() {
                parts.push(format!("ACTIVITY: {summary}"));
            }
        }
    }
    if let Some(environment) = non_empty(aspects, ASPECT_ENVIRONMENT) {
        let summary = extract_environment_info(environment);
        if !summary.is_empty() {
            parts.push(format!("SETTING: {summary}"));
        }
    }

    let mut caption = parts.join(" | ");
    let alerts = derive_alerts(&caption);
    if !alerts.is_empty() {
        let names: Vec<&str> = alerts.iter().map(|a| a.name()).collect();
        caption.push_str(&format!(" | ALERTS: {}", names.join(", ")));
    }
    (caption, alerts)
}

/// Confidence heuristic for an image caption: word count as the base,
/// a bonus per populated aspect beyond the first, and a bonus when the
/// high-signal alert kinds fired.
pub fn image_confidence(caption: &str, aspects: &AspectMap) -> f64 {
    let base = (caption.split_whitespace().count() as f64 / 50.0).min(1.0);

    let populated = aspects
        .values()
        .filter(|text| !text.is_empty() && !text.to_lowercase().contains("error"))
        .count();
    let aspect_bonus = populated.saturating_sub(1) as f64 * 0.1;

    let alert_bonus = if caption.contains("PERSON_DETECTED") || caption.contains("VEHICLE_DETECTED")
    {
        0.1
    } else {
        0.0
    };

    (base + aspect_bonus + alert_bonus).min(1.0)
}

/// Alert kinds fired by one timeline frame, derived over the whole
/// aspect map so changes described in any aspect count.
pub fn frame_alerts(aspects: &AspectMap) -> Vec<AlertKind> {
    derive_alerts(&joined_aspect_text(aspects))
}

/// Confidence of a timeline frame, from how specific the change
/// description is.
pub fn timeline_confidence(aspects: &AspectMap) -> f64 {
    let timeline = aspects
        .get(ASPECT_TIMELINE)
        .map(String::as_str)
        .unwrap_or_default();
    let lower = timeline.to_lowercase();

    if ["enters", "exits", "arrives", "leaves", "starts", "stops"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return 0.8;
    }
    if ["different", "changed", "new", "appears"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return 0.6;
    }
    if timeline.len() < 20 {
        return 0.3;
    }
    0.5
}

/// Render a clip offset as `mm:ss`.
pub fn format_offset(seconds: f64) -> String {
    let whole = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

/// Build the composite caption for a video from its recorded timeline.
pub fn compose_video_caption(
    events: &[TimelineEvent],
    duration_seconds: f64,
    alerts: &[AlertKind],
) -> String {
    if events.is_empty() {
        return format!(
            "Video analysis complete ({duration_seconds:.1}s) - No significant events detected"
        );
    }

    let mut parts = vec![format!(
        "TIMELINE ANALYSIS ({duration_seconds:.1}s, {} events)",
        events.len()
    )];

    let entries: Vec<String> = events
        .iter()
        .filter(|event| !event.description.is_empty())
        .map(|event| format!("{}: {}", event.time_formatted, event.description))
        .collect();
    if !entries.is_empty() {
        parts.push(format!("EVENTS: {}", entries.join(" | ")));
    }

    let mut event_types: Vec<String> = events
        .iter()
        .map(|event| event.event_type.as_str())
        .filter(|t| *t != "general_activity")
        .map(title_case)
        .collect();
    event_types.sort();
    event_types.dedup();
    if !event_types.is_empty() {
        parts.push(format!("EVENT TYPES: {}", event_types.join(", ")));
    }

    if !alerts.is_empty() {
        let names: Vec<&str> = alerts.iter().map(|a| a.name()).collect();
        parts.push(format!("ALERTS: {}", names.join(", ")));
    }

    parts.join(" | ")
}

fn non_empty<'a>(aspects: &'a AspectMap, name: &str) -> Option<&'a String> {
    aspects.get(name).filter(|text| !text.is_empty())
}

fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
