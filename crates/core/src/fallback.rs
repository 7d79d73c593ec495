//! Synthetic responses served when both network and cache miss.

use html_escape::{encode_double_quoted_attribute, encode_text};
use serde_json::json;

use crate::http::{Response, ResponseSource};

/// Phone numbers printed into fallback content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyContact {
    pub emergency_number: String,
    pub on_call_number: String,
}

impl Default for EmergencyContact {
    fn default() -> Self {
        Self { emergency_number: "112".into(), on_call_number: "116 117".into() }
    }
}

/// Offline page for emergency routes. Status 503, `text/html`.
pub fn emergency_html(contact: &EmergencyContact) -> Response {
    let emergency = encode_text(&contact.emergency_number);
    let emergency_href = encode_double_quoted_attribute(&contact.emergency_number);
    let on_call = encode_text(&contact.on_call_number);
    let on_call_href = encode_double_quoted_attribute(&contact.on_call_number);
    let body = format!(
        r#"<!DOCTYPE html>
<html lang="de">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Offline - Notfall</title>
  <style>
    body {{ font-family: system-ui, sans-serif; margin: 2rem; color: #1a1a1a; }}
    .emergency {{ background: #c62828; color: #fff; padding: 1.5rem; border-radius: 8px; }}
    .emergency a {{ color: #fff; font-size: 2rem; font-weight: bold; }}
  </style>
</head>
<body>
  <h1>Sie sind offline</h1>
  <div class="emergency">
    <p>Im medizinischen Notfall rufen Sie sofort den Notruf an:</p>
    <p><a href="tel:{emergency_href}">{emergency}</a></p>
  </div>
  <p>Aerztlicher Bereitschaftsdienst: <a href="tel:{on_call_href}">{on_call}</a></p>
  <p>In an emergency call <a href="tel:{emergency_href}">{emergency}</a> immediately.</p>
</body>
</html>
"#
    );

    Response::new(503, body, ResponseSource::Fallback)
        .with_header("Content-Type", "text/html; charset=utf-8")
        .with_header("Cache-Control", "no-store")
}

/// Error body for medical API requests. Status 503, `application/json`.
pub fn api_error_json(contact: &EmergencyContact) -> Response {
    let body = json!({
        "error": "Medical data is unavailable offline. Please try again when you are connected.",
        "emergencyContact": contact.emergency_number,
        "onCallContact": contact.on_call_number,
        "offline": true,
    });

    Response::new(503, body.to_string(), ResponseSource::Fallback)
        .with_header("Content-Type", "application/json")
        .with_header("Cache-Control", "no-store")
}

/// Neutral placeholder image. Status 200 so images never hard-fail visually.
pub fn image_placeholder_svg() -> Response {
    let body = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200" role="img" aria-label="Image unavailable offline">
  <rect width="200" height="200" fill="#f0f0f0"/>
  <path d="M70 130 L95 100 L115 120 L130 105 L150 130 Z" fill="#c4c4c4"/>
  <circle cx="80" cy="80" r="10" fill="#c4c4c4"/>
  <text x="100" y="165" font-family="sans-serif" font-size="12" text-anchor="middle" fill="#8a8a8a">Offline</text>
</svg>
"##;

    Response::new(200, body, ResponseSource::Fallback)
        .with_header("Content-Type", "image/svg+xml")
        .with_header("Cache-Control", "no-store")
}
