// Contacts service.

use chrono::Utc;

use super::{delete_each, require, require_existing, stored};
use crate::cascade::CascadeReport;
use crate::db::{Contact, CrmDb};
use crate::entity::EntityKind;
use crate::error::CrmResult;
use crate::util::{ensure_id, stamp};

/// Save a contact under an existing organization.
pub fn save_contact(db: &CrmDb, mut contact: Contact) -> CrmResult<Contact> {
    require(&contact.organization_id, "organizationId")?;
    ensure_id(&mut contact.id);
    stamp(&mut contact.created_at, &mut contact.updated_at, Utc::now());

    db.with_transaction(|db| {
        require_existing(db, EntityKind::Organization, &contact.organization_id)?;
        db.upsert_contact(&contact)?;
        stored(db.get_contact(&contact.id)?, EntityKind::Contact, &contact.id)
    })
}

/// Delete a contact with its deals and their dependents.
pub fn delete_contact(db: &CrmDb, id: &str) -> CrmResult<CascadeReport> {
    Ok(db.delete_contact(id)?)
}

pub fn delete_contacts(db: &CrmDb, ids: &[String]) -> CrmResult<Vec<CascadeReport>> {
    delete_each(db, ids, delete_contact)
}
