//! Caller-facing write operations.
//!
//! Each function validates its input, fills defaults and then performs exactly
//! one consistency-preserving store operation inside a single transaction.
//! Nothing is written when validation fails.

pub mod contacts;
pub mod deals;
pub mod interactions;
pub mod organizations;
pub mod pipelines;
pub mod projects;
pub mod quotations;
pub mod seed;
pub mod users;

use crate::db::CrmDb;
use crate::entity::EntityKind;
use crate::error::{CrmError, CrmResult};
use crate::util::is_blank;

/// Reject blank required text.
pub(crate) fn require(value: &str, field: &str) -> CrmResult<()> {
    if is_blank(value) {
        return Err(CrmError::validation(format!("{field} is required")));
    }
    Ok(())
}

/// Reject a reference to a record that does not exist.
pub(crate) fn require_existing(db: &CrmDb, kind: EntityKind, id: &str) -> CrmResult<()> {
    if db.exists(kind, id)? {
        Ok(())
    } else {
        Err(CrmError::not_found(kind, id))
    }
}

/// The row just written, read back so callers see stored values.
pub(crate) fn stored<T>(row: Option<T>, kind: EntityKind, id: &str) -> CrmResult<T> {
    row.ok_or_else(|| CrmError::not_found(kind, id))
}

/// Ids from a `?id=` or comma-separated `?ids=` query pair. `id` wins when
/// both are present.
pub fn ids_from_query(id: Option<&str>, ids: Option<&str>) -> CrmResult<Vec<String>> {
    if let Some(id) = id.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(vec![id.to_string()]);
    }
    let parsed: Vec<String> = ids
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if parsed.is_empty() {
        return Err(CrmError::validation("id or ids is required"));
    }
    Ok(parsed)
}

/// Run `delete` for every non-blank id, each as its own transaction.
/// Stops at the first failure; earlier deletions stay committed.
pub fn delete_each<T, F>(db: &CrmDb, ids: &[String], mut delete: F) -> CrmResult<Vec<T>>
where
    F: FnMut(&CrmDb, &str) -> CrmResult<T>,
{
    let mut outcomes = Vec::with_capacity(ids.len());
    for id in ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        outcomes.push(db.with_transaction(|db| delete(db, id))?);
    }
    Ok(outcomes)
}
