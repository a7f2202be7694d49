//! Shared type definitions for the database layer.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("No next value left for {0}")]
    SequenceExhausted(String),
}

/// Declares a closed set of lower-case status labels stored as TEXT.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? } default $default:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($label => Ok($name::$variant),)+
                    other => Err(format!("invalid {}: {:?}", stringify!($name), other)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse().map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(
    /// Lifecycle of a sales opportunity.
    DealStatus { Open => "open", Won => "won", Lost => "lost" } default Open
);

text_enum!(
    PaymentStatus { Planned => "planned", Paid => "paid", Void => "void" } default Paid
);

text_enum!(
    ProjectStatus { Active => "active", Completed => "completed", Support => "support" } default Active
);

text_enum!(
    TaskStatus {
        Todo => "todo",
        InProgress => "in_progress",
        Done => "done",
        Blocked => "blocked",
    } default Todo
);

text_enum!(
    QuotationStatus {
        Draft => "draft",
        Sent => "sent",
        Viewed => "viewed",
        Accepted => "accepted",
        Declined => "declined",
        Expired => "expired",
    } default Draft
);

text_enum!(
    InteractionType { Call => "call", Email => "email", Meeting => "meeting", Note => "note" } default Note
);

text_enum!(
    /// Access role of a user account.
    UserRole {
        Admin => "admin",
        Sales => "sales",
        ProjectManager => "project_manager",
        Developer => "developer",
    } default Developer
);

/// A row from the `organizations` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub industry: String,
    pub website: String,
    pub email: String,
    pub phone: String,
    pub billing_email: String,
    pub tax_id: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `contacts` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contact {
    pub id: String,
    pub organization_id: String,
    pub first_name: String,
    pub last_name: String,
    pub job_title: String,
    pub email: String,
    pub phone: String,
    pub mobile: String,
    #[serde(rename = "linkedinUrl")]
    pub linkedin_url: String,
    pub notes: String,
    pub primary_contact: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `pipelines` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "default")]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `pipeline_stages` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineStage {
    pub id: String,
    pub pipeline_id: String,
    pub name: String,
    pub color: String,
    /// 1-based, unique within the pipeline. Zero or negative asks the write
    /// path to append after the last stage.
    pub position: i32,
    pub probability: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `deals` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Deal {
    pub id: String,
    pub organization_id: String,
    pub contact_id: String,
    pub pipeline_stage_id: Option<String>,
    pub title: String,
    pub description: String,

    pub domain: String,
    pub domain_acquired_at: Option<DateTime<Utc>>,
    pub domain_expires_at: Option<DateTime<Utc>>,
    pub domain_cost: f64,

    pub deposit: f64,
    pub costs: f64,
    pub taxes: f64,
    pub net_total: f64,
    pub share_gil: f64,
    pub share_ric: f64,
    pub work_type: String,
    pub work_closed_at: Option<DateTime<Utc>>,

    pub value: f64,
    pub currency: String,
    pub expected_close_at: Option<DateTime<Utc>>,
    pub status: DealStatus,
    pub probability: i32,
    pub source: String,
    pub notes: String,
    pub lost_reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `payments` table: one instalment received for a deal,
/// optionally split between the two partners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Payment {
    pub id: String,
    pub deal_id: String,
    pub title: String,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub due_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub method: String,
    pub notes: String,
    pub gil_amount: f64,
    pub ric_amount: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `projects` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub id: String,
    pub deal_id: String,
    pub name: String,
    pub description: String,
    pub code: String,
    pub status: ProjectStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub target_end_date: Option<DateTime<Utc>>,
    pub actual_end_date: Option<DateTime<Utc>>,
    pub budget: f64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `tasks` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub owner_user_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: i32,
    pub actual_hours: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `quotations` table. `subtotal`, `tax_amount` and `total`
/// are owned by the totals calculator and overwritten on every recompute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Quotation {
    pub id: String,
    pub deal_id: String,
    pub created_by_user_id: Option<String>,
    pub number: String,
    pub title: String,
    pub introduction: String,
    pub terms: String,
    pub currency: String,
    pub status: QuotationStatus,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub discount_amount: f64,
    pub total: f64,
    pub valid_until: Option<DateTime<Utc>>,
    pub version: i32,
    pub public_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `quotation_items` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuotationItem {
    pub id: String,
    pub quotation_id: String,
    pub name: String,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub unit_type: String,
    pub line_total: f64,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A quotation item as submitted by a caller. Absent fields are derived:
/// quantity falls back to 1, the line total to quantity × unit price, and the
/// position to "after the last item".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuotationItemDraft {
    pub id: String,
    pub quotation_id: String,
    pub name: String,
    pub description: String,
    pub quantity: Option<f64>,
    pub unit_price: f64,
    pub unit_type: String,
    pub line_total: Option<f64>,
    pub position: Option<i32>,
}

/// A row from the `interactions` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Interaction {
    pub id: String,
    pub user_id: Option<String>,
    pub organization_id: Option<String>,
    pub contact_id: Option<String>,
    pub deal_id: Option<String>,
    pub interaction_type: InteractionType,
    pub subject: String,
    pub body: String,
    pub occurred_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub transcript: String,
    pub cleaned_transcript: String,
    pub follow_up_completed: bool,
    pub follow_up_date: Option<DateTime<Utc>>,
    pub follow_up_notes: String,
    pub transcription_language: String,
    pub transcription_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `users` table. The hash never leaves the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: String,
    pub email_address: String,
    pub name: String,
    pub role: UserRole,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row from the `sessions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub user_agent: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Every collection at one point in time, read inside a single transaction.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmSnapshot {
    pub users: Vec<User>,
    pub organizations: Vec<Organization>,
    pub contacts: Vec<Contact>,
    pub pipelines: Vec<Pipeline>,
    pub pipeline_stages: Vec<PipelineStage>,
    pub deals: Vec<Deal>,
    pub payments: Vec<Payment>,
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub quotations: Vec<Quotation>,
    pub quotation_items: Vec<QuotationItem>,
    pub interactions: Vec<Interaction>,
}

// =============================================================================
// Timestamp columns
// =============================================================================

/// Fixed-width RFC 3339 text, so `ORDER BY` on the column is chronological.
pub(crate) fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn opt_ts(value: &Option<DateTime<Utc>>) -> Option<String> {
    value.as_ref().map(ts)
}

fn parse_ts(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn row_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_ts(idx, &text)
}

pub(crate) fn row_opt_ts(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) if !text.is_empty() => parse_ts(idx, &text).map(Some),
        _ => Ok(None),
    }
}
