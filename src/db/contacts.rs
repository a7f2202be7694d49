use super::*;
use crate::cascade::{CascadeReport, CONTACT_PLAN};

const CONTACT_COLUMNS: &str = "id, organization_id, first_name, last_name, job_title, email,
        phone, mobile, linkedin_url, notes, primary_contact, created_at, updated_at";

impl CrmDb {
    // =========================================================================
    // Contacts
    // =========================================================================

    pub fn upsert_contact(&self, contact: &Contact) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO contacts (
                id, organization_id, first_name, last_name, job_title, email,
                phone, mobile, linkedin_url, notes, primary_contact, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                organization_id = excluded.organization_id,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                job_title = excluded.job_title,
                email = excluded.email,
                phone = excluded.phone,
                mobile = excluded.mobile,
                linkedin_url = excluded.linkedin_url,
                notes = excluded.notes,
                primary_contact = excluded.primary_contact,
                updated_at = excluded.updated_at",
            params![
                contact.id,
                contact.organization_id,
                contact.first_name,
                contact.last_name,
                contact.job_title,
                contact.email,
                contact.phone,
                contact.mobile,
                contact.linkedin_url,
                contact.notes,
                contact.primary_contact as i32,
                ts(&contact.created_at),
                ts(&contact.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_contact(&self, id: &str) -> Result<Option<Contact>, DbError> {
        self.first_row(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
            params![id],
            Self::map_contact_row,
        )
    }

    /// All contacts, newest first.
    pub fn list_contacts(&self) -> Result<Vec<Contact>, DbError> {
        self.collect_rows(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY created_at DESC, rowid DESC"),
            [],
            Self::map_contact_row,
        )
    }

    pub fn list_contacts_for_organization(&self, org_id: &str) -> Result<Vec<Contact>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE organization_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![org_id],
            Self::map_contact_row,
        )
    }

    /// Delete a contact with its deals and everything under them. Other
    /// contacts of the same organization are untouched.
    pub fn delete_contact(&self, id: &str) -> Result<CascadeReport, DbError> {
        self.run_cascade(&CONTACT_PLAN, id)
    }

    fn map_contact_row(row: &rusqlite::Row) -> rusqlite::Result<Contact> {
        Ok(Contact {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            job_title: row.get(4)?,
            email: row.get(5)?,
            phone: row.get(6)?,
            mobile: row.get(7)?,
            linkedin_url: row.get(8)?,
            notes: row.get(9)?,
            primary_contact: row.get::<_, i32>(10)? != 0,
            created_at: row_ts(row, 11)?,
            updated_at: row_ts(row, 12)?,
        })
    }
}
