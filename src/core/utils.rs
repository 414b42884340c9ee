//! Small shared helpers.

use chrono::Utc;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Task rows store millisecond timestamps so the retention sweep and
/// progress updates compare on the same scale.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Sanitizes a file name for local storage: anything outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
