// Organizations service: validated writes and cascading deletes.

use chrono::Utc;

use super::{delete_each, require, stored};
use crate::cascade::CascadeReport;
use crate::db::{CrmDb, Organization};
use crate::entity::EntityKind;
use crate::error::CrmResult;
use crate::util::{ensure_id, stamp};

pub fn save_organization(db: &CrmDb, mut org: Organization) -> CrmResult<Organization> {
    require(&org.name, "name")?;
    ensure_id(&mut org.id);
    stamp(&mut org.created_at, &mut org.updated_at, Utc::now());

    db.with_transaction(|db| {
        db.upsert_organization(&org)?;
        stored(db.get_organization(&org.id)?, EntityKind::Organization, &org.id)
    })
}

/// Delete an organization with its contacts, deals and everything beneath them.
pub fn delete_organization(db: &CrmDb, id: &str) -> CrmResult<CascadeReport> {
    let report = db.delete_organization(id)?;
    Ok(report)
}

pub fn delete_organizations(db: &CrmDb, ids: &[String]) -> CrmResult<Vec<CascadeReport>> {
    delete_each(db, ids, delete_organization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::error::ErrorKind;
    use crate::test_fixtures::*;

    #[test]
    fn test_save_generates_id_and_keeps_created_at() {
        let db = test_db();
        let saved = save_organization(
            &db,
            Organization {
                name: "Acme".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!saved.id.is_empty());

        let replaced = save_organization(
            &db,
            Organization {
                id: saved.id.clone(),
                name: "Acme Ltd".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(replaced.name, "Acme Ltd");
        assert_eq!(replaced.created_at, saved.created_at);
        assert_eq!(db.count(EntityKind::Organization).unwrap(), 1);
    }

    #[test]
    fn test_name_required() {
        let db = test_db();
        let err = save_organization(&db, Organization::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(db.count(EntityKind::Organization).unwrap(), 0);
    }

    #[test]
    fn test_batch_delete_leaves_other_graphs() {
        let db = test_db();
        build_graph(&db, "o1");
        build_graph(&db, "o2");
        let keep = build_graph(&db, "o3");

        let reports =
            delete_organizations(&db, &["o1".to_string(), "".to_string(), "o2".to_string()])
                .unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(db.count(EntityKind::Organization).unwrap(), 1);
        assert!(db.get_deal(&keep.deal).unwrap().is_some());
        assert_eq!(db.count(EntityKind::QuotationItem).unwrap(), 1);
    }
}
