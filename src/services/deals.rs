// Deals and their payments.

use chrono::Utc;

use super::{delete_each, require, require_existing, stored};
use crate::cascade::CascadeReport;
use crate::db::{CrmDb, Deal, Payment, PaymentStatus};
use crate::entity::EntityKind;
use crate::error::{CrmError, CrmResult};
use crate::util::{ensure_id, non_blank, or_default, stamp};

/// Slack allowed when the partner split is compared with the payment amount.
pub const SPLIT_TOLERANCE: f64 = 0.01;

pub const DEFAULT_CURRENCY: &str = "EUR";

// =============================================================================
// Deals
// =============================================================================

/// Save a deal. A deal without a stage lands on the first stage of the
/// primary pipeline; this applies on every save, so replacing a deal with an
/// empty stage is repaired the same way.
pub fn save_deal(db: &CrmDb, mut deal: Deal) -> CrmResult<Deal> {
    require(&deal.title, "title")?;
    require(&deal.organization_id, "organizationId")?;
    require(&deal.contact_id, "contactId")?;
    or_default(&mut deal.currency, DEFAULT_CURRENCY);
    deal.pipeline_stage_id = non_blank(deal.pipeline_stage_id.take());
    ensure_id(&mut deal.id);
    stamp(&mut deal.created_at, &mut deal.updated_at, Utc::now());

    db.with_transaction(|db| {
        require_existing(db, EntityKind::Organization, &deal.organization_id)?;
        require_existing(db, EntityKind::Contact, &deal.contact_id)?;
        match deal.pipeline_stage_id {
            Some(ref stage_id) => require_existing(db, EntityKind::PipelineStage, stage_id)?,
            None => deal.pipeline_stage_id = db.default_stage_for_new_deal()?.map(|s| s.id),
        }

        db.upsert_deal(&deal)?;
        stored(db.get_deal(&deal.id)?, EntityKind::Deal, &deal.id)
    })
}

/// Delete a deal with its projects, tasks, quotations, payments and interactions.
pub fn delete_deal(db: &CrmDb, id: &str) -> CrmResult<CascadeReport> {
    Ok(db.delete_deal(id)?)
}

pub fn delete_deals(db: &CrmDb, ids: &[String]) -> CrmResult<Vec<CascadeReport>> {
    delete_each(db, ids, delete_deal)
}

// =============================================================================
// Payments
// =============================================================================

/// Amount and split checks for a payment.
pub fn validate_payment_amounts(payment: &Payment) -> CrmResult<()> {
    if payment.amount < 0.0 {
        return Err(CrmError::validation("amount must be >= 0"));
    }
    if payment.gil_amount < 0.0 || payment.ric_amount < 0.0 {
        return Err(CrmError::validation("gilAmount and ricAmount must be >= 0"));
    }
    if payment.gil_amount + payment.ric_amount > payment.amount + SPLIT_TOLERANCE {
        return Err(CrmError::validation("gilAmount + ricAmount must be <= amount"));
    }
    Ok(())
}

/// Save a payment against an existing deal. A paid payment without a
/// payment date is stamped with the current time.
pub fn save_payment(db: &CrmDb, mut payment: Payment) -> CrmResult<Payment> {
    require(&payment.deal_id, "dealId")?;
    or_default(&mut payment.currency, DEFAULT_CURRENCY);
    validate_payment_amounts(&payment)?;

    let now = Utc::now();
    if payment.status == PaymentStatus::Paid && payment.paid_at.is_none() {
        payment.paid_at = Some(now);
    }
    ensure_id(&mut payment.id);
    stamp(&mut payment.created_at, &mut payment.updated_at, now);

    db.with_transaction(|db| {
        require_existing(db, EntityKind::Deal, &payment.deal_id)?;
        db.upsert_payment(&payment)?;
        stored(db.get_payment(&payment.id)?, EntityKind::Payment, &payment.id)
    })
}

pub fn delete_payments(db: &CrmDb, ids: &[String]) -> CrmResult<usize> {
    let removed = delete_each(db, ids, |db, id| Ok(db.delete_payment(id)?))?;
    Ok(removed.into_iter().filter(|deleted| *deleted).count())
}
