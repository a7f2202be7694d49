//! First-run bootstrap.
//!
//! `seed_if_needed` is safe to call on every start: each step only fills in
//! what is missing (an admin user, a default pipeline with stages, stage
//! references on old deals, and a small demo graph when the store has no
//! organizations).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::CredentialHasher;
use crate::db::{
    Contact, CrmDb, Deal, DealStatus, Organization, Pipeline, PipelineStage, Project,
    ProjectStatus, Task, TaskStatus, User, UserRole,
};
use crate::entity::EntityKind;
use crate::error::{CrmError, CrmResult};
use crate::util::new_id;

/// Stages of a freshly created pipeline: name, colour, win probability.
pub const DEFAULT_STAGES: &[(&str, &str, f64)] = &[
    ("Lead", "#CF8445", 10.0),
    ("Qualified", "#DC9F68", 30.0),
    ("Proposal", "#E9C29A", 55.0),
    ("Won", "#22C55E", 100.0),
    ("Lost", "#64748B", 0.0),
];

#[derive(Debug, Clone, PartialEq)]
pub struct SeedOptions {
    pub admin_email: String,
    pub admin_password: String,
    pub admin_name: String,
    /// Create the demo organization when the store has none.
    pub demo_data: bool,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            admin_email: "admin@dealdesk.local".to_string(),
            admin_password: "admin".to_string(),
            admin_name: "Admin".to_string(),
            demo_data: true,
        }
    }
}

/// What a bootstrap run created.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub admin_user_id: Option<String>,
    pub pipeline_id: Option<String>,
    pub stages_created: usize,
    pub deals_backfilled: usize,
    pub demo_organization_id: Option<String>,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        *self == SeedReport::default()
    }
}

pub fn seed_if_needed(
    db: &CrmDb,
    hasher: &dyn CredentialHasher,
    options: &SeedOptions,
) -> CrmResult<SeedReport> {
    let report = db.with_transaction(|db| {
        let now = Utc::now();
        let mut report = SeedReport::default();

        if db.count(EntityKind::User)? == 0 {
            report.admin_user_id = Some(seed_admin(db, hasher, options, now)?);
        }

        let pipeline_id = match db.primary_pipeline()? {
            Some(p) => p.id,
            None => {
                let pipeline = Pipeline {
                    id: new_id(),
                    name: "Sales Pipeline".to_string(),
                    description: "Default sales stages.".to_string(),
                    is_default: true,
                    created_at: now,
                    updated_at: now,
                };
                db.upsert_pipeline(&pipeline)?;
                report.pipeline_id = Some(pipeline.id.clone());
                pipeline.id
            }
        };

        if db.first_stage(&pipeline_id)?.is_none() {
            for (idx, (name, color, probability)) in DEFAULT_STAGES.iter().enumerate() {
                db.upsert_pipeline_stage(&PipelineStage {
                    id: new_id(),
                    pipeline_id: pipeline_id.clone(),
                    name: name.to_string(),
                    color: color.to_string(),
                    position: idx as i32 + 1,
                    probability: *probability,
                    created_at: now,
                    updated_at: now,
                })?;
            }
            report.stages_created = DEFAULT_STAGES.len();
        }

        let first_stage = db.first_stage(&pipeline_id)?.map(|s| s.id);
        if let Some(ref stage_id) = first_stage {
            report.deals_backfilled = db.backfill_deal_stages(stage_id)?;
        }

        if options.demo_data && db.count(EntityKind::Organization)? == 0 {
            let owner = match report.admin_user_id.clone() {
                Some(id) => Some(id),
                None => db.list_users()?.into_iter().next().map(|u| u.id),
            };
            report.demo_organization_id = Some(seed_demo(db, first_stage, owner, now)?);
        }

        Ok::<_, CrmError>(report)
    })?;

    if !report.is_empty() {
        log::info!(
            "Seeded store: admin={:?} pipeline={:?} stages={} backfilled={} demo={:?}",
            report.admin_user_id,
            report.pipeline_id,
            report.stages_created,
            report.deals_backfilled,
            report.demo_organization_id
        );
    }
    Ok(report)
}

fn seed_admin(
    db: &CrmDb,
    hasher: &dyn CredentialHasher,
    options: &SeedOptions,
    now: DateTime<Utc>,
) -> CrmResult<String> {
    let user = User {
        id: new_id(),
        email_address: options.admin_email.trim().to_lowercase(),
        name: options.admin_name.trim().to_string(),
        role: UserRole::Admin,
        password_hash: hasher.hash(&options.admin_password)?,
        created_at: now,
        updated_at: now,
    };
    db.upsert_user(&user)?;
    Ok(user.id)
}

fn seed_demo(
    db: &CrmDb,
    stage_id: Option<String>,
    owner_id: Option<String>,
    now: DateTime<Utc>,
) -> CrmResult<String> {
    let org = Organization {
        id: new_id(),
        name: "Example Studio".to_string(),
        industry: "Design + Engineering".to_string(),
        website: "https://example.com".to_string(),
        email: "hello@example.com".to_string(),
        phone: "+1 555 000 0000".to_string(),
        billing_email: "billing@example.com".to_string(),
        address: "123 Main Street".to_string(),
        city: "New York".to_string(),
        country: "US".to_string(),
        notes: "Seeded organization.".to_string(),
        created_at: now,
        updated_at: now,
        ..Default::default()
    };
    db.upsert_organization(&org)?;

    let contact = Contact {
        id: new_id(),
        organization_id: org.id.clone(),
        first_name: "Avery".to_string(),
        last_name: "Client".to_string(),
        job_title: "Operations".to_string(),
        email: "avery@example.com".to_string(),
        primary_contact: true,
        created_at: now,
        updated_at: now,
        ..Default::default()
    };
    db.upsert_contact(&contact)?;

    let deal = Deal {
        id: new_id(),
        organization_id: org.id.clone(),
        contact_id: contact.id.clone(),
        pipeline_stage_id: stage_id,
        title: "Website refresh".to_string(),
        description: "Design + build marketing site refresh.".to_string(),
        value: 12000.0,
        currency: "USD".to_string(),
        status: DealStatus::Open,
        probability: 35,
        source: "Referral".to_string(),
        created_at: now,
        updated_at: now,
        ..Default::default()
    };
    db.upsert_deal(&deal)?;

    let project = Project {
        id: new_id(),
        deal_id: deal.id.clone(),
        name: deal.title.clone(),
        description: "Project created from the initial deal.".to_string(),
        status: ProjectStatus::Active,
        budget: 12000.0,
        currency: "USD".to_string(),
        created_at: now,
        updated_at: now,
        ..Default::default()
    };
    db.upsert_project(&project)?;

    db.upsert_task(&Task {
        id: new_id(),
        project_id: project.id.clone(),
        owner_user_id: owner_id,
        title: "Kickoff call".to_string(),
        description: "Schedule and run kickoff with stakeholder list.".to_string(),
        status: TaskStatus::Todo,
        priority: 1,
        estimated_hours: 1,
        created_at: now,
        updated_at: now,
        ..Default::default()
    })?;

    Ok(org.id)
}
