//! Request classification.
//!
//! Maps a URL to exactly one [`ResourceClass`] using an ordered rule list.
//! The first matching rule wins, so rule order is part of the contract:
//! `/api/emergency-contacts` is `Emergency`, not `MedicalApi`.
//!
//! Matching looks at the URL path only (query and fragment never matter)
//! and is case-sensitive, except for image file extensions.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::policy::EMERGENCY_PRECACHE;

/// Handling category of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Emergency,
    MedicalApi,
    MedicalImage,
    Default,
}

static MEDICAL_API: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/api/(faq|emergency-contacts|specialists)(/|$)").expect("medical api pattern is valid")
});

static MEDICAL_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(uploads|medical-icons|doctor-photos)/.+\.(?i:png|jpe?g|gif|webp|svg|avif)$")
        .expect("medical image pattern is valid")
});

struct Rule {
    name: &'static str,
    matches: fn(&str) -> bool,
    class: ResourceClass,
}

const RULES: &[Rule] = &[
    Rule { name: "emergency", matches: is_emergency, class: ResourceClass::Emergency },
    Rule { name: "medical-api", matches: is_medical_api, class: ResourceClass::MedicalApi },
    Rule { name: "medical-image", matches: is_medical_image, class: ResourceClass::MedicalImage },
];

fn is_emergency(path: &str) -> bool {
    EMERGENCY_PRECACHE.contains(&path) || path.contains("/emergency") || path.contains("/notfall")
}

fn is_medical_api(path: &str) -> bool {
    MEDICAL_API.is_match(path)
}

fn is_medical_image(path: &str) -> bool {
    MEDICAL_IMAGE.is_match(path)
}

/// Path component of an absolute URL, or of a raw path-like string.
fn request_path(input: &str) -> &str {
    match input.find("://") {
        Some(scheme_end) => {
            let after_scheme = &input[scheme_end + 3..];
            match after_scheme.find('/') {
                Some(path_start) => strip_query(&after_scheme[path_start..]),
                None => "/",
            }
        }
        None => strip_query(input),
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Classify a URL. Total: anything unmatched is `Default`.
pub fn classify(url: &str) -> ResourceClass {
    classify_path(request_path(url))
}

fn classify_path(path: &str) -> ResourceClass {
    match RULES.iter().find(|rule| (rule.matches)(path)) {
        Some(rule) => {
            tracing::trace!(path, rule = rule.name, "classified request");
            rule.class
        }
        None => ResourceClass::Default,
    }
}
