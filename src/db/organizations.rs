use super::*;
use crate::cascade::{CascadeReport, ORGANIZATION_PLAN};

const ORGANIZATION_COLUMNS: &str = "id, name, industry, website, email, phone, billing_email,
        tax_id, address, city, country, notes, created_at, updated_at";

impl CrmDb {
    // =========================================================================
    // Organizations
    // =========================================================================

    /// Insert or replace an organization. `created_at` survives a replace.
    pub fn upsert_organization(&self, org: &Organization) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO organizations (
                id, name, industry, website, email, phone, billing_email,
                tax_id, address, city, country, notes, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                industry = excluded.industry,
                website = excluded.website,
                email = excluded.email,
                phone = excluded.phone,
                billing_email = excluded.billing_email,
                tax_id = excluded.tax_id,
                address = excluded.address,
                city = excluded.city,
                country = excluded.country,
                notes = excluded.notes,
                updated_at = excluded.updated_at",
            params![
                org.id,
                org.name,
                org.industry,
                org.website,
                org.email,
                org.phone,
                org.billing_email,
                org.tax_id,
                org.address,
                org.city,
                org.country,
                org.notes,
                ts(&org.created_at),
                ts(&org.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_organization(&self, id: &str) -> Result<Option<Organization>, DbError> {
        self.first_row(
            &format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = ?1"),
            params![id],
            Self::map_organization_row,
        )
    }

    /// All organizations, newest first.
    pub fn list_organizations(&self) -> Result<Vec<Organization>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {ORGANIZATION_COLUMNS} FROM organizations
                 ORDER BY created_at DESC, rowid DESC"
            ),
            [],
            Self::map_organization_row,
        )
    }

    /// Delete an organization with its contacts, deals and everything under them.
    pub fn delete_organization(&self, id: &str) -> Result<CascadeReport, DbError> {
        self.run_cascade(&ORGANIZATION_PLAN, id)
    }

    fn map_organization_row(row: &rusqlite::Row) -> rusqlite::Result<Organization> {
        Ok(Organization {
            id: row.get(0)?,
            name: row.get(1)?,
            industry: row.get(2)?,
            website: row.get(3)?,
            email: row.get(4)?,
            phone: row.get(5)?,
            billing_email: row.get(6)?,
            tax_id: row.get(7)?,
            address: row.get(8)?,
            city: row.get(9)?,
            country: row.get(10)?,
            notes: row.get(11)?,
            created_at: row_ts(row, 12)?,
            updated_at: row_ts(row, 13)?,
        })
    }
}
