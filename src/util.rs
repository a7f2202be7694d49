use chrono::{DateTime, Utc};

/// Fresh opaque identifier (UUID v4).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Give a record an identifier if the caller did not supply one.
/// Returns true when the id was generated.
pub fn ensure_id(id: &mut String) -> bool {
    if id.trim().is_empty() {
        *id = new_id();
        true
    } else {
        false
    }
}

/// Trimmed, lower-cased e-mail address.
///
/// Example: " Ada@Example.COM " → "ada@example.com"
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// True for empty or whitespace-only text.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Collapse a blank optional reference to `None`.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !is_blank(v))
}

/// Apply the default when `value` is blank.
pub fn or_default(value: &mut String, default: &str) {
    if is_blank(value) {
        *value = default.to_string();
    }
}

/// Stamp creation and update times for a write at `now`. Creation time is
/// only set on records that never had one.
pub fn stamp(created_at: &mut DateTime<Utc>, updated_at: &mut DateTime<Utc>, now: DateTime<Utc>) {
    if *created_at == DateTime::<Utc>::default() {
        *created_at = now;
    }
    *updated_at = now;
}
