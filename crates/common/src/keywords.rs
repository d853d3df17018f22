//! Security keyword tables and alert derivation.
//!
//! Maps free-text scene descriptions onto the fixed alert catalog by
//! case-insensitive keyword presence, and provides the extraction helpers
//! the description synthesis uses to compress raw model output into the
//! `SECURITY`/`OBJECTS`/`ACTIVITY`/`SETTING` caption segments. The keyword
//! lists are the derivation policy; swapping in a learned classifier only
//! needs to preserve the output contract.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The fixed alert catalog. Order is the catalog order used for seeding
/// and for deterministic derivation output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertKind {
    PersonDetected,
    VehicleDetected,
    PackageDetected,
    UnusualActivity,
    NightTime,
}

impl AlertKind {
    pub const ALL: [AlertKind; 5] = [
        AlertKind::PersonDetected,
        AlertKind::VehicleDetected,
        AlertKind::PackageDetected,
        AlertKind::UnusualActivity,
        AlertKind::NightTime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::PersonDetected => "PERSON_DETECTED",
            Self::VehicleDetected => "VEHICLE_DETECTED",
            Self::PackageDetected => "PACKAGE_DETECTED",
            Self::UnusualActivity => "UNUSUAL_ACTIVITY",
            Self::NightTime => "NIGHT_TIME",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::PersonDetected => "Person detected in scene",
            Self::VehicleDetected => "Vehicle detected in scene",
            Self::PackageDetected => "Package or delivery detected",
            Self::UnusualActivity => "Unusual or suspicious activity",
            Self::NightTime => "Activity during night hours",
        }
    }

    /// Catalog priority: 1 = low, 4 = critical.
    pub fn priority(&self) -> i64 {
        match self {
            Self::PersonDetected => 2,
            Self::VehicleDetected => 2,
            Self::PackageDetected => 3,
            Self::UnusualActivity => 4,
            Self::NightTime => 1,
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::PersonDetected => &[
                "person",
                "people",
                "individual",
                "man",
                "woman",
                "child",
                "adult",
                "human",
                "pedestrian",
                "figure",
            ],
            Self::VehicleDetected => &[
                "vehicle",
                "car",
                "truck",
                "van",
                "suv",
                "motorcycle",
                "bike",
                "automobile",
            ],
            Self::PackageDetected => &[
                "package", "delivery", "box", "bag", "container", "parcel",
            ],
            Self::UnusualActivity => &[
                "suspicious",
                "unusual",
                "unexpected",
                "strange",
                "abnormal",
                "loitering",
                "unknown",
            ],
            Self::NightTime => &["night", "dark", "darkness", "low light", "evening", "late"],
        }
    }
}

/// Derive the alert kinds present in a description, in catalog order.
pub fn derive_alerts(text: &str) -> Vec<AlertKind> {
    let lower = text.to_lowercase();
    AlertKind::ALL
        .into_iter()
        .filter(|kind| kind.keywords().iter().any(|kw| lower.contains(kw)))
        .collect()
}

/// Denormalized alert flags stored on each detection row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFlags {
    pub has_person: bool,
    pub has_vehicle: bool,
    pub has_package: bool,
    pub has_unusual_activity: bool,
    pub is_night_time: bool,
    pub alert_count: i64,
}

impl AlertFlags {
    pub fn from_kinds(kinds: &[AlertKind]) -> Self {
        Self {
            has_person: kinds.contains(&AlertKind::PersonDetected),
            has_vehicle: kinds.contains(&AlertKind::VehicleDetected),
            has_package: kinds.contains(&AlertKind::PackageDetected),
            has_unusual_activity: kinds.contains(&AlertKind::UnusualActivity),
            is_night_time: kinds.contains(&AlertKind::NightTime),
            alert_count: kinds.len() as i64,
        }
    }
}

const ACTIVITY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "movement",
        &["walking", "running", "moving", "approaching", "leaving", "entering", "exiting"],
    ),
    (
        "delivery",
        &["delivering", "dropping off", "picking up", "carrying", "package", "box"],
    ),
    (
        "vehicles",
        &["driving", "parking", "backing up", "pulling in", "arriving", "departing"],
    ),
    (
        "interaction",
        &["talking", "meeting", "greeting", "conversation", "handshake"],
    ),
    (
        "suspicious",
        &["lurking", "hiding", "sneaking", "loitering", "prowling", "trespassing"],
    ),
    (
        "maintenance",
        &["working", "repairing", "cleaning", "servicing", "installing"],
    ),
];

const ENVIRONMENT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "time",
        &["morning", "afternoon", "evening", "night", "dawn", "dusk", "daylight", "dark"],
    ),
    (
        "weather",
        &["sunny", "cloudy", "rainy", "foggy", "clear", "overcast", "storm"],
    ),
    (
        "location",
        &["residential", "commercial", "parking", "driveway", "street", "yard", "dock", "marina"],
    ),
    (
        "lighting",
        &["bright", "dim", "shadows", "illuminated", "dark", "lit up", "spotlight"],
    ),
];

const CHANGE_KEYWORDS: &[&str] = &[
    "appears", "emerges", "arrives", "disappears", "vanishes", "leaves", "exits", "moves",
    "shifts", "relocates", "starts", "begins", "stops", "ends", "continues", "resumes",
];

const EVENT_TYPES: &[(&str, &[&str])] = &[
    (
        "person_enters",
        &["person enters", "person appears", "person arrives", "person comes"],
    ),
    (
        "person_exits",
        &["person exits", "person leaves", "person disappears", "person goes"],
    ),
    (
        "vehicle_arrives",
        &["vehicle arrives", "car arrives", "truck arrives", "vehicle appears"],
    ),
    (
        "vehicle_leaves",
        &["vehicle leaves", "car leaves", "truck leaves", "vehicle disappears"],
    ),
    ("activity_starts", &["starts", "begins", "activity begins", "movement starts"]),
    ("activity_stops", &["stops", "ends", "activity ends", "movement stops"]),
    ("scene_change", &["different", "changed", "new scene", "scene changes"]),
    ("no_change", &["no change", "same", "similar", "unchanged"]),
];

/// Event types that mark a timeline frame as worth recording on their own.
pub const NOTABLE_EVENT_TYPES: &[&str] = &[
    "person_enters",
    "person_exits",
    "vehicle_arrives",
    "vehicle_leaves",
    "activity_starts",
    "activity_stops",
];

/// Compress a security description to its security-relevant items, falling
/// back to a truncated echo when nothing matches.
pub fn extract_security_relevance(security_desc: &str) -> String {
    let lower = security_desc.to_lowercase();
    let high = ["person", "individual", "vehicle", "suspicious", "unusual", "unauthorized"];
    let medium = ["delivery", "package", "visitor", "service"];

    let mut relevant: Vec<&str> = high.iter().filter(|i| lower.contains(**i)).copied().collect();
    for item in medium {
        if lower.contains(item) && !relevant.contains(&item) {
            relevant.push(item);
        }
    }

    if relevant.is_empty() {
        truncate(security_desc, 50)
    } else {
        relevant.join(", ")
    }
}

/// Pull "N <things>" counts out of an object inventory description.
pub fn extract_object_counts(objects_desc: &str) -> String {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        const COUNT: &str = r"(\d+|one|two|three|four|five|six|seven|eight|nine|ten)";
        [
            r"\s+(people|persons?|individuals?)",
            r"\s+(cars?|vehicles?|trucks?|vans?)",
            r"\s+(packages?|boxes?|bags?)",
            r"\s+(dogs?|cats?|animals?)",
        ]
        .iter()
        .map(|tail| Regex::new(&format!("{COUNT}{tail}")).expect("static pattern"))
        .collect()
    });

    let lower = objects_desc.to_lowercase();
    let mut findings = Vec::new();
    for pattern in patterns {
        for caps in pattern.captures_iter(&lower) {
            findings.push(format!("{} {}", &caps[1], &caps[2]));
        }
    }

    if findings.is_empty() {
        truncate(objects_desc, 50)
    } else {
        findings.join(", ")
    }
}

/// Categorize activities by keyword table, one hit per category.
pub fn extract_activities(activities_desc: &str) -> String {
    let detected = first_hits(ACTIVITY_KEYWORDS, activities_desc);
    if detected.is_empty() {
        truncate(activities_desc, 50)
    } else {
        detected.join(", ")
    }
}

/// Extract the key environment facts (time of day, weather, setting).
pub fn extract_environment_info(environment_desc: &str) -> String {
    let info = first_hits(ENVIRONMENT_KEYWORDS, environment_desc);
    if info.is_empty() {
        truncate(environment_desc, 50)
    } else {
        info.join(", ")
    }
}

/// Classify a timeline description into one of the known event types.
pub fn classify_event_type(timeline_description: &str) -> String {
    let lower = timeline_description.to_lowercase();
    for (event_type, keywords) in EVENT_TYPES {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return (*event_type).to_string();
        }
    }
    "general_activity".to_string()
}

/// Extract up to three change snippets (keyword plus surrounding context)
/// from a change-detection description.
pub fn extract_changes(change_description: &str) -> Vec<String> {
    let lower = change_description.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    let mut changes = Vec::new();
    for (i, word) in words.iter().enumerate() {
        if CHANGE_KEYWORDS.contains(word) {
            let start = i.saturating_sub(2);
            let end = (i + 3).min(words.len());
            changes.push(words[start..end].join(" "));
            if changes.len() == 3 {
                break;
            }
        }
    }
    changes
}

/// Join an aspect map into one haystack for whole-analysis derivation.
pub fn joined_aspect_text(aspects: &BTreeMap<String, String>) -> String {
    aspects.values().cloned().collect::<Vec<_>>().join(" ")
}

fn first_hits(
    table: &'static [(&'static str, &'static [&'static str])],
    desc: &str,
) -> Vec<&'static str> {
    let lower = desc.to_lowercase();
    let mut hits = Vec::new();
    for (_category, keywords) in table {
        if let Some(kw) = keywords.iter().find(|kw| lower.contains(**kw)) {
            hits.push(*kw);
        }
    }
    hits
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
