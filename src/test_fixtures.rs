//! Record builders shared by unit tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::db::*;

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .expect("valid test date")
}

pub fn organization(id: &str, name: &str) -> Organization {
    Organization {
        id: id.into(),
        name: name.into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Default::default()
    }
}

pub fn contact(id: &str, org_id: &str) -> Contact {
    Contact {
        id: id.into(),
        organization_id: org_id.into(),
        first_name: "Avery".into(),
        last_name: id.into(),
        primary_contact: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Default::default()
    }
}

pub fn deal(id: &str, org_id: &str, contact_id: &str) -> Deal {
    Deal {
        id: id.into(),
        organization_id: org_id.into(),
        contact_id: contact_id.into(),
        title: format!("Deal {}", id),
        currency: "EUR".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Default::default()
    }
}

pub fn pipeline(id: &str, is_default: bool, created_at: DateTime<Utc>) -> Pipeline {
    Pipeline {
        id: id.into(),
        name: format!("Pipeline {}", id),
        is_default,
        created_at,
        updated_at: created_at,
        ..Default::default()
    }
}

pub fn stage(id: &str, pipeline_id: &str, position: i32) -> PipelineStage {
    PipelineStage {
        id: id.into(),
        pipeline_id: pipeline_id.into(),
        name: format!("Stage {}", id),
        position,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Default::default()
    }
}

pub fn project(id: &str, deal_id: &str) -> Project {
    Project {
        id: id.into(),
        deal_id: deal_id.into(),
        name: format!("Project {}", id),
        currency: "EUR".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Default::default()
    }
}

pub fn task(id: &str, project_id: &str) -> Task {
    Task {
        id: id.into(),
        project_id: project_id.into(),
        title: format!("Task {}", id),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Default::default()
    }
}

pub fn quotation(id: &str, deal_id: &str, number: &str) -> Quotation {
    Quotation {
        id: id.into(),
        deal_id: deal_id.into(),
        number: number.into(),
        title: format!("Quotation {}", id),
        currency: "EUR".into(),
        version: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Default::default()
    }
}

pub fn payment(id: &str, deal_id: &str, amount: f64) -> Payment {
    Payment {
        id: id.into(),
        deal_id: deal_id.into(),
        amount,
        currency: "EUR".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Default::default()
    }
}

pub fn interaction(id: &str, deal_id: Option<&str>) -> Interaction {
    Interaction {
        id: id.into(),
        deal_id: deal_id.map(String::from),
        subject: format!("Call {}", id),
        occurred_at: Utc::now(),
        transcription_language: "it".into(),
        transcription_status: "pending".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Default::default()
    }
}

pub fn user(id: &str, email: &str) -> User {
    User {
        id: id.into(),
        email_address: email.into(),
        name: format!("User {}", id),
        password_hash: "hash".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Default::default()
    }
}

pub fn session(token: &str, user_id: &str, expires_at: DateTime<Utc>) -> Session {
    Session {
        token: token.into(),
        user_id: user_id.into(),
        user_agent: String::new(),
        ip_address: String::new(),
        created_at: Utc::now(),
        expires_at,
    }
}

/// Ids of one organization's full subgraph.
pub struct Graph {
    pub contact: String,
    pub deal: String,
    pub project: String,
    pub task: String,
    pub quotation: String,
    pub item: String,
    pub payment: String,
    pub interaction: String,
}

/// Organization → contact → deal with a project, task, quotation, item,
/// payment and an interaction touching all three.
pub fn build_graph(db: &CrmDb, org_id: &str) -> Graph {
    let g = Graph {
        contact: format!("{}-contact", org_id),
        deal: format!("{}-deal", org_id),
        project: format!("{}-project", org_id),
        task: format!("{}-task", org_id),
        quotation: format!("{}-quotation", org_id),
        item: format!("{}-item", org_id),
        payment: format!("{}-payment", org_id),
        interaction: format!("{}-interaction", org_id),
    };

    db.upsert_organization(&organization(org_id, org_id)).unwrap();
    db.upsert_contact(&contact(&g.contact, org_id)).unwrap();
    db.upsert_deal(&deal(&g.deal, org_id, &g.contact)).unwrap();
    db.upsert_project(&project(&g.project, &g.deal)).unwrap();
    db.upsert_task(&task(&g.task, &g.project)).unwrap();
    db.save_quotation(&quotation(
        &g.quotation,
        &g.deal,
        &format!("QUO-2024-{}", org_id),
    ))
    .unwrap();
    db.save_quotation_item(&QuotationItemDraft {
        id: g.item.clone(),
        quotation_id: g.quotation.clone(),
        name: "Design".into(),
        quantity: Some(1.0),
        unit_price: 100.0,
        ..Default::default()
    })
    .unwrap();
    db.upsert_payment(&payment(&g.payment, &g.deal, 100.0)).unwrap();

    let mut touch = interaction(&g.interaction, Some(&g.deal));
    touch.organization_id = Some(org_id.into());
    touch.contact_id = Some(g.contact.clone());
    db.upsert_interaction(&touch).unwrap();

    g
}
