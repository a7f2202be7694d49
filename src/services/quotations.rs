// Quotations and their line items. Totals are recomputed by the store on
// every write; numbers and public tokens are assigned here.

use chrono::{Datelike, Utc};

use super::{delete_each, require, require_existing};
use crate::auth::{new_token, PUBLIC_TOKEN_BYTES};
use crate::cascade::CascadeReport;
use crate::db::{CrmDb, Quotation, QuotationItem, QuotationItemDraft};
use crate::entity::EntityKind;
use crate::error::{CrmError, CrmResult};
use crate::util::{ensure_id, is_blank, non_blank, or_default, stamp};

/// Save a quotation. A blank number takes the next one for the current year,
/// a blank public token gets a fresh one, and `created_by` falls back to the
/// acting user. Totals always come from the stored items.
pub fn save_quotation(
    db: &CrmDb,
    mut quotation: Quotation,
    actor_id: Option<&str>,
) -> CrmResult<Quotation> {
    require(&quotation.deal_id, "dealId")?;
    require(&quotation.title, "title")?;
    or_default(&mut quotation.currency, "EUR");
    quotation.version = quotation.version.max(1);
    quotation.created_by_user_id =
        non_blank(quotation.created_by_user_id.take()).or_else(|| actor_id.map(String::from));
    quotation.number = quotation.number.trim().to_string();
    if is_blank(&quotation.public_token) {
        quotation.public_token = new_token(PUBLIC_TOKEN_BYTES);
    }
    ensure_id(&mut quotation.id);
    let now = Utc::now();
    stamp(&mut quotation.created_at, &mut quotation.updated_at, now);

    db.with_transaction(|db| {
        require_existing(db, EntityKind::Deal, &quotation.deal_id)?;

        if quotation.number.is_empty() {
            quotation.number = db.next_quotation_number(now.year())?;
        } else if let Some(other) = db.get_quotation_by_number(&quotation.number)? {
            if other.id != quotation.id {
                return Err(CrmError::Conflict(format!(
                    "quotation number {} already exists",
                    quotation.number
                )));
            }
        }

        Ok(db.save_quotation(&quotation)?)
    })
}

/// Delete a quotation and its items.
pub fn delete_quotation(db: &CrmDb, id: &str) -> CrmResult<CascadeReport> {
    Ok(db.delete_quotation(id)?)
}

pub fn delete_quotations(db: &CrmDb, ids: &[String]) -> CrmResult<Vec<CascadeReport>> {
    delete_each(db, ids, delete_quotation)
}

/// Save a line item and recompute its quotation in the same transaction.
pub fn save_quotation_item(db: &CrmDb, mut draft: QuotationItemDraft) -> CrmResult<QuotationItem> {
    require(&draft.quotation_id, "quotationId")?;
    require(&draft.name, "name")?;
    ensure_id(&mut draft.id);

    db.with_transaction(|db| {
        require_existing(db, EntityKind::Quotation, &draft.quotation_id)?;
        Ok(db.save_quotation_item(&draft)?)
    })
}

/// Delete items and recompute every quotation they belonged to, all in one
/// transaction. Blank ids are skipped.
pub fn delete_quotation_items(db: &CrmDb, ids: &[String]) -> CrmResult<usize> {
    let ids: Vec<String> = ids
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    Ok(db.delete_quotation_items(&ids)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::db::test_utils::test_db;
    use crate::services::{contacts, deals, organizations};
    use crate::test_fixtures::*;

    fn seed_deal(db: &CrmDb) {
        db.upsert_organization(&organization("o1", "Acme")).unwrap();
        db.upsert_contact(&contact("c1", "o1")).unwrap();
        db.upsert_deal(&deal("d1", "o1", "c1")).unwrap();
    }

    fn item(quotation_id: &str, quantity: f64, unit_price: f64) -> QuotationItemDraft {
        QuotationItemDraft {
            quotation_id: quotation_id.into(),
            name: "Work".into(),
            quantity: Some(quantity),
            unit_price,
            ..Default::default()
        }
    }

    #[test]
    fn test_blank_number_takes_next_in_year() {
        let db = test_db();
        seed_deal(&db);
        let year = Utc::now().year();

        let first = save_quotation(&db, quotation("", "d1", ""), None).unwrap();
        let second = save_quotation(&db, quotation("", "d1", " "), None).unwrap();
        assert_eq!(first.number, format!("QUO-{year}-001"));
        assert_eq!(second.number, format!("QUO-{year}-002"));
        assert_eq!(first.public_token.len(), 32);
        assert_eq!(first.status, crate::db::QuotationStatus::Draft);
    }

    #[test]
    fn test_duplicate_number_is_a_conflict() {
        let db = test_db();
        seed_deal(&db);
        save_quotation(&db, quotation("q1", "d1", "QUO-2024-001"), None).unwrap();

        let err = save_quotation(&db, quotation("q2", "d1", "QUO-2024-001"), None).unwrap_err();
        assert!(matches!(err, CrmError::Conflict(_)));
        assert_eq!(err.http_status(), 409);

        // Re-saving under its own number is fine
        assert!(save_quotation(&db, quotation("q1", "d1", "QUO-2024-001"), None).is_ok());
    }

    #[test]
    fn test_defaults_and_actor() {
        let db = test_db();
        seed_deal(&db);
        db.upsert_user(&user("u1", "ada@example.com")).unwrap();

        let mut q = quotation("q1", "d1", "");
        q.version = 0;
        q.currency = String::new();
        q.public_token = "keep-me".into();
        let saved = save_quotation(&db, q, Some("u1")).unwrap();
        assert_eq!(saved.version, 1);
        assert_eq!(saved.currency, "EUR");
        assert_eq!(saved.public_token, "keep-me");
        assert_eq!(saved.created_by_user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_supplied_totals_are_ignored() {
        let db = test_db();
        seed_deal(&db);
        let mut q = quotation("q1", "d1", "");
        q.subtotal = 999.0;
        q.total = 999.0;
        let saved = save_quotation(&db, q, None).unwrap();
        assert_eq!(saved.subtotal, 0.0);
        assert_eq!(saved.total, 0.0);
    }

    #[test]
    fn test_item_requires_existing_quotation() {
        let db = test_db();
        let err = save_quotation_item(&db, item("ghost", 1.0, 1.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = save_quotation_item(&db, item("", 1.0, 1.0)).unwrap_err();
        assert_eq!(err.to_string(), "quotationId is required");
    }

    #[test]
    fn test_totals_follow_every_item_write() {
        let db = test_db();
        seed_deal(&db);
        let mut q = quotation("q1", "d1", "");
        q.tax_rate = 22.0;
        q.discount_amount = 3.0;
        save_quotation(&db, q, None).unwrap();

        let a = save_quotation_item(&db, item("q1", 3.0, 7.5)).unwrap();
        let b = save_quotation_item(&db, item("q1", 0.0, 40.0)).unwrap();
        assert_eq!(b.quantity, 1.0);
        assert_eq!((a.position, b.position), (1, 2));

        let check = |db: &CrmDb| {
            let q = db.get_quotation("q1").unwrap().unwrap();
            let sum: f64 = db
                .list_items_for_quotation("q1")
                .unwrap()
                .iter()
                .map(|i| i.line_total)
                .sum();
            assert_eq!(q.subtotal, sum);
            assert_eq!(q.total, q.subtotal + q.tax_amount - q.discount_amount);
        };
        check(&db);

        let mut edit = item("q1", 2.0, 7.5);
        edit.id = a.id.clone();
        save_quotation_item(&db, edit).unwrap();
        check(&db);

        delete_quotation_items(&db, &[b.id.clone(), "  ".into()]).unwrap();
        check(&db);
        assert_eq!(db.get_quotation("q1").unwrap().unwrap().subtotal, 15.0);
    }

    #[test]
    fn test_end_to_end_example() {
        let db = test_db();
        let mut main = pipeline("", true, at(2024, 1, 1));
        main.name = "Sales".into();
        let main = crate::services::pipelines::save_pipeline(&db, main).unwrap();
        let lead = crate::services::pipelines::save_stage(&db, stage("", &main.id, 0)).unwrap();
        crate::services::pipelines::save_stage(&db, stage("", &main.id, 0)).unwrap();

        let org = organizations::save_organization(&db, organization("", "O")).unwrap();
        let c = contacts::save_contact(&db, contact("", &org.id)).unwrap();
        let d = deals::save_deal(&db, deal("", &org.id, &c.id)).unwrap();
        assert_eq!(d.pipeline_stage_id.as_deref(), Some(lead.id.as_str()));

        let mut q = quotation("", &d.id, "");
        q.tax_rate = 10.0;
        q.discount_amount = 5.0;
        let q = save_quotation(&db, q, None).unwrap();
        save_quotation_item(&db, item(&q.id, 2.0, 50.0)).unwrap();
        save_quotation_item(&db, item(&q.id, 1.0, 25.0)).unwrap();

        let q = db.get_quotation(&q.id).unwrap().unwrap();
        assert_eq!(q.subtotal, 125.0);
        assert_eq!(q.tax_amount, 12.5);
        assert_eq!(q.total, 132.5);

        organizations::delete_organization(&db, &org.id).unwrap();
        assert!(db.get_deal(&d.id).unwrap().is_none());
        assert!(db.get_quotation(&q.id).unwrap().is_none());
        assert_eq!(db.count(EntityKind::QuotationItem).unwrap(), 0);
    }
}
