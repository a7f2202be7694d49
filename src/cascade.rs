//! Ordered deletion plans for the sales graph.
//!
//! Deleting a parent record removes or detaches everything that only exists
//! in its context. Each root kind has a static plan: an ordered list of steps
//! naming the kind it touches, what it does, and which rows it selects via a
//! `WHERE` clause bound to the root id as `?1`. Plans are plain data, so their
//! order can be inspected without a database.
//!
//! `CrmDb::run_cascade` executes a plan inside one transaction. If any step
//! fails, the whole deletion rolls back.

use serde::Serialize;

use crate::db::{CrmDb, DbError};
use crate::entity::EntityKind;

/// What a step does to the rows it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Delete,
    /// Clear an optional reference column, keeping the row.
    Detach { column: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionStep {
    pub entity: EntityKind,
    pub action: StepAction,
    pub filter: &'static str,
}

impl DeletionStep {
    const fn delete(entity: EntityKind, filter: &'static str) -> Self {
        Self {
            entity,
            action: StepAction::Delete,
            filter,
        }
    }

    const fn detach(entity: EntityKind, column: &'static str, filter: &'static str) -> Self {
        Self {
            entity,
            action: StepAction::Detach { column },
            filter,
        }
    }

    /// The statement this step runs, with the root id bound as `?1`.
    pub fn sql(&self) -> String {
        match self.action {
            StepAction::Delete => {
                format!("DELETE FROM {} WHERE {}", self.entity.table(), self.filter)
            }
            StepAction::Detach { column } => format!(
                "UPDATE {} SET {} = NULL WHERE {}",
                self.entity.table(),
                column,
                self.filter
            ),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CascadePlan {
    pub root: EntityKind,
    pub steps: &'static [DeletionStep],
}

// Deals reachable from an organization: its own, plus any deal that names one
// of its contacts.
macro_rules! org_deals {
    () => {
        "SELECT id FROM deals WHERE organization_id = ?1
            OR contact_id IN (SELECT id FROM contacts WHERE organization_id = ?1)"
    };
}

macro_rules! contact_deals {
    () => {
        "SELECT id FROM deals WHERE contact_id = ?1"
    };
}

use crate::entity::EntityKind::*;

pub const ORGANIZATION_PLAN: CascadePlan = CascadePlan {
    root: Organization,
    steps: &[
        DeletionStep::delete(
            Interaction,
            "contact_id IN (SELECT id FROM contacts WHERE organization_id = ?1)",
        ),
        DeletionStep::delete(Interaction, concat!("deal_id IN (", org_deals!(), ")")),
        DeletionStep::delete(
            Task,
            concat!(
                "project_id IN (SELECT id FROM projects WHERE deal_id IN (",
                org_deals!(),
                "))"
            ),
        ),
        DeletionStep::delete(Project, concat!("deal_id IN (", org_deals!(), ")")),
        DeletionStep::delete(
            QuotationItem,
            concat!(
                "quotation_id IN (SELECT id FROM quotations WHERE deal_id IN (",
                org_deals!(),
                "))"
            ),
        ),
        DeletionStep::delete(Quotation, concat!("deal_id IN (", org_deals!(), ")")),
        DeletionStep::delete(Payment, concat!("deal_id IN (", org_deals!(), ")")),
        DeletionStep::delete(Interaction, "organization_id = ?1"),
        DeletionStep::delete(Deal, concat!("id IN (", org_deals!(), ")")),
        DeletionStep::delete(Contact, "organization_id = ?1"),
        DeletionStep::delete(Organization, "id = ?1"),
    ],
};

pub const CONTACT_PLAN: CascadePlan = CascadePlan {
    root: Contact,
    steps: &[
        DeletionStep::delete(Interaction, "contact_id = ?1"),
        DeletionStep::delete(Interaction, concat!("deal_id IN (", contact_deals!(), ")")),
        DeletionStep::delete(
            Task,
            concat!(
                "project_id IN (SELECT id FROM projects WHERE deal_id IN (",
                contact_deals!(),
                "))"
            ),
        ),
        DeletionStep::delete(Project, concat!("deal_id IN (", contact_deals!(), ")")),
        DeletionStep::delete(
            QuotationItem,
            concat!(
                "quotation_id IN (SELECT id FROM quotations WHERE deal_id IN (",
                contact_deals!(),
                "))"
            ),
        ),
        DeletionStep::delete(Quotation, concat!("deal_id IN (", contact_deals!(), ")")),
        DeletionStep::delete(Payment, concat!("deal_id IN (", contact_deals!(), ")")),
        DeletionStep::delete(Deal, "contact_id = ?1"),
        DeletionStep::delete(Contact, "id = ?1"),
    ],
};

pub const DEAL_PLAN: CascadePlan = CascadePlan {
    root: Deal,
    steps: &[
        DeletionStep::delete(
            Task,
            "project_id IN (SELECT id FROM projects WHERE deal_id = ?1)",
        ),
        DeletionStep::delete(Project, "deal_id = ?1"),
        DeletionStep::delete(
            QuotationItem,
            "quotation_id IN (SELECT id FROM quotations WHERE deal_id = ?1)",
        ),
        DeletionStep::delete(Quotation, "deal_id = ?1"),
        DeletionStep::delete(Payment, "deal_id = ?1"),
        DeletionStep::delete(Interaction, "deal_id = ?1"),
        DeletionStep::delete(Deal, "id = ?1"),
    ],
};

pub const PROJECT_PLAN: CascadePlan = CascadePlan {
    root: Project,
    steps: &[
        DeletionStep::delete(Task, "project_id = ?1"),
        DeletionStep::delete(Project, "id = ?1"),
    ],
};

pub const QUOTATION_PLAN: CascadePlan = CascadePlan {
    root: Quotation,
    steps: &[
        DeletionStep::delete(QuotationItem, "quotation_id = ?1"),
        DeletionStep::delete(Quotation, "id = ?1"),
    ],
};

pub const USER_PLAN: CascadePlan = CascadePlan {
    root: User,
    steps: &[
        DeletionStep::detach(Task, "owner_user_id", "owner_user_id = ?1"),
        DeletionStep::detach(Interaction, "user_id", "user_id = ?1"),
        DeletionStep::detach(Quotation, "created_by_user_id", "created_by_user_id = ?1"),
        DeletionStep::delete(Session, "user_id = ?1"),
        DeletionStep::delete(User, "id = ?1"),
    ],
};

/// Rows touched by one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub entity: EntityKind,
    pub detached: bool,
    pub rows: usize,
}

/// Result of a cascade. Empty when the root did not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub root_id: String,
    pub steps: Vec<StepOutcome>,
}

impl CascadeReport {
    /// Rows of `kind` deleted across all steps.
    pub fn deleted(&self, kind: EntityKind) -> usize {
        self.steps
            .iter()
            .filter(|s| s.entity == kind && !s.detached)
            .map(|s| s.rows)
            .sum()
    }

    /// Rows of `kind` whose reference was cleared.
    pub fn detached(&self, kind: EntityKind) -> usize {
        self.steps
            .iter()
            .filter(|s| s.entity == kind && s.detached)
            .map(|s| s.rows)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl CrmDb {
    /// Run `plan` for `root_id` as one transaction. Deleting a root that does
    /// not exist is a no-op.
    pub fn run_cascade(&self, plan: &CascadePlan, root_id: &str) -> Result<CascadeReport, DbError> {
        self.with_transaction(|db| {
            let mut report = CascadeReport {
                root_id: root_id.to_string(),
                steps: Vec::new(),
            };
            if !db.exists(plan.root, root_id)? {
                return Ok(report);
            }

            for step in plan.steps {
                let rows = db.conn_ref().execute(&step.sql(), [root_id])?;
                report.steps.push(StepOutcome {
                    entity: step.entity,
                    detached: matches!(step.action, StepAction::Detach { .. }),
                    rows,
                });
            }

            log::info!(
                "Deleted {} {} ({} dependent rows touched)",
                plan.root,
                root_id,
                report.steps.iter().map(|s| s.rows).sum::<usize>().saturating_sub(1)
            );
            Ok(report)
        })
    }
}
