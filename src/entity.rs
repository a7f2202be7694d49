//! Entity kinds of the sales graph.
//!
//! Every record stored by `CrmDb` belongs to exactly one kind. The kind names
//! its table, labels not-found errors, and keys the per-kind counters in
//! cascade reports.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Session,
    Organization,
    Contact,
    Pipeline,
    PipelineStage,
    Deal,
    Payment,
    Project,
    Task,
    Quotation,
    QuotationItem,
    Interaction,
}

impl EntityKind {
    /// String label used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Session => "session",
            EntityKind::Organization => "organization",
            EntityKind::Contact => "contact",
            EntityKind::Pipeline => "pipeline",
            EntityKind::PipelineStage => "pipeline_stage",
            EntityKind::Deal => "deal",
            EntityKind::Payment => "payment",
            EntityKind::Project => "project",
            EntityKind::Task => "task",
            EntityKind::Quotation => "quotation",
            EntityKind::QuotationItem => "quotation_item",
            EntityKind::Interaction => "interaction",
        }
    }

    /// Backing SQL table.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Session => "sessions",
            EntityKind::Organization => "organizations",
            EntityKind::Contact => "contacts",
            EntityKind::Pipeline => "pipelines",
            EntityKind::PipelineStage => "pipeline_stages",
            EntityKind::Deal => "deals",
            EntityKind::Payment => "payments",
            EntityKind::Project => "projects",
            EntityKind::Task => "tasks",
            EntityKind::Quotation => "quotations",
            EntityKind::QuotationItem => "quotation_items",
            EntityKind::Interaction => "interactions",
        }
    }

    /// Primary-key column. Sessions are keyed by their token.
    pub fn key_column(&self) -> &'static str {
        match self {
            EntityKind::Session => "token",
            _ => "id",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
