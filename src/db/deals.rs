use super::*;
use crate::cascade::{CascadeReport, DEAL_PLAN};

const DEAL_COLUMNS: &str = "id, organization_id, contact_id, pipeline_stage_id, title, description,
        domain, domain_acquired_at, domain_expires_at, domain_cost,
        deposit, costs, taxes, net_total, share_gil, share_ric, work_type, work_closed_at,
        value, currency, expected_close_at, status, probability, source, notes, lost_reason,
        created_at, updated_at";

impl CrmDb {
    // =========================================================================
    // Deals
    // =========================================================================

    pub fn upsert_deal(&self, deal: &Deal) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO deals (
                id, organization_id, contact_id, pipeline_stage_id, title, description,
                domain, domain_acquired_at, domain_expires_at, domain_cost,
                deposit, costs, taxes, net_total, share_gil, share_ric, work_type, work_closed_at,
                value, currency, expected_close_at, status, probability, source, notes, lost_reason,
                created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                       ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)
             ON CONFLICT(id) DO UPDATE SET
                organization_id = excluded.organization_id,
                contact_id = excluded.contact_id,
                pipeline_stage_id = excluded.pipeline_stage_id,
                title = excluded.title,
                description = excluded.description,
                domain = excluded.domain,
                domain_acquired_at = excluded.domain_acquired_at,
                domain_expires_at = excluded.domain_expires_at,
                domain_cost = excluded.domain_cost,
                deposit = excluded.deposit,
                costs = excluded.costs,
                taxes = excluded.taxes,
                net_total = excluded.net_total,
                share_gil = excluded.share_gil,
                share_ric = excluded.share_ric,
                work_type = excluded.work_type,
                work_closed_at = excluded.work_closed_at,
                value = excluded.value,
                currency = excluded.currency,
                expected_close_at = excluded.expected_close_at,
                status = excluded.status,
                probability = excluded.probability,
                source = excluded.source,
                notes = excluded.notes,
                lost_reason = excluded.lost_reason,
                updated_at = excluded.updated_at",
            params![
                deal.id,
                deal.organization_id,
                deal.contact_id,
                deal.pipeline_stage_id,
                deal.title,
                deal.description,
                deal.domain,
                opt_ts(&deal.domain_acquired_at),
                opt_ts(&deal.domain_expires_at),
                deal.domain_cost,
                deal.deposit,
                deal.costs,
                deal.taxes,
                deal.net_total,
                deal.share_gil,
                deal.share_ric,
                deal.work_type,
                opt_ts(&deal.work_closed_at),
                deal.value,
                deal.currency,
                opt_ts(&deal.expected_close_at),
                deal.status,
                deal.probability,
                deal.source,
                deal.notes,
                deal.lost_reason,
                ts(&deal.created_at),
                ts(&deal.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_deal(&self, id: &str) -> Result<Option<Deal>, DbError> {
        self.first_row(
            &format!("SELECT {DEAL_COLUMNS} FROM deals WHERE id = ?1"),
            params![id],
            Self::map_deal_row,
        )
    }

    /// All deals, newest first.
    pub fn list_deals(&self) -> Result<Vec<Deal>, DbError> {
        self.collect_rows(
            &format!("SELECT {DEAL_COLUMNS} FROM deals ORDER BY created_at DESC, rowid DESC"),
            [],
            Self::map_deal_row,
        )
    }

    pub fn list_deals_for_organization(&self, org_id: &str) -> Result<Vec<Deal>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {DEAL_COLUMNS} FROM deals WHERE organization_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![org_id],
            Self::map_deal_row,
        )
    }

    pub fn list_deals_for_contact(&self, contact_id: &str) -> Result<Vec<Deal>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {DEAL_COLUMNS} FROM deals WHERE contact_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![contact_id],
            Self::map_deal_row,
        )
    }

    pub fn list_deals_for_stage(&self, stage_id: &str) -> Result<Vec<Deal>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {DEAL_COLUMNS} FROM deals WHERE pipeline_stage_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![stage_id],
            Self::map_deal_row,
        )
    }

    /// Point every deal on `from_stage` at `to_stage`, or clear the reference
    /// when there is nowhere to go. Returns the number of deals moved.
    pub(crate) fn reassign_deals_from_stage(
        &self,
        from_stage: &str,
        to_stage: Option<&str>,
    ) -> Result<usize, DbError> {
        let now = ts(&Utc::now());
        Ok(self.conn.execute(
            "UPDATE deals SET pipeline_stage_id = ?1, updated_at = ?2
             WHERE pipeline_stage_id = ?3",
            params![to_stage, now, from_stage],
        )?)
    }

    /// Same as `reassign_deals_from_stage` for every stage of a pipeline.
    pub(crate) fn reassign_deals_from_pipeline(
        &self,
        pipeline_id: &str,
        to_stage: Option<&str>,
    ) -> Result<usize, DbError> {
        let now = ts(&Utc::now());
        Ok(self.conn.execute(
            "UPDATE deals SET pipeline_stage_id = ?1, updated_at = ?2
             WHERE pipeline_stage_id IN (SELECT id FROM pipeline_stages WHERE pipeline_id = ?3)",
            params![to_stage, now, pipeline_id],
        )?)
    }

    /// Give every deal without a stage the supplied one.
    pub(crate) fn backfill_deal_stages(&self, stage_id: &str) -> Result<usize, DbError> {
        let now = ts(&Utc::now());
        Ok(self.conn.execute(
            "UPDATE deals SET pipeline_stage_id = ?1, updated_at = ?2
             WHERE pipeline_stage_id IS NULL OR pipeline_stage_id = ''",
            params![stage_id, now],
        )?)
    }

    /// Delete a deal with its projects, tasks, quotations, payments and interactions.
    pub fn delete_deal(&self, id: &str) -> Result<CascadeReport, DbError> {
        self.run_cascade(&DEAL_PLAN, id)
    }

    fn map_deal_row(row: &rusqlite::Row) -> rusqlite::Result<Deal> {
        Ok(Deal {
            id: row.get(0)?,
            organization_id: row.get(1)?,
            contact_id: row.get(2)?,
            pipeline_stage_id: row
                .get::<_, Option<String>>(3)?
                .filter(|s| !s.is_empty()),
            title: row.get(4)?,
            description: row.get(5)?,
            domain: row.get(6)?,
            domain_acquired_at: row_opt_ts(row, 7)?,
            domain_expires_at: row_opt_ts(row, 8)?,
            domain_cost: row.get(9)?,
            deposit: row.get(10)?,
            costs: row.get(11)?,
            taxes: row.get(12)?,
            net_total: row.get(13)?,
            share_gil: row.get(14)?,
            share_ric: row.get(15)?,
            work_type: row.get(16)?,
            work_closed_at: row_opt_ts(row, 17)?,
            value: row.get(18)?,
            currency: row.get(19)?,
            expected_close_at: row_opt_ts(row, 20)?,
            status: row.get(21)?,
            probability: row.get(22)?,
            source: row.get(23)?,
            notes: row.get(24)?,
            lost_reason: row.get(25)?,
            created_at: row_ts(row, 26)?,
            updated_at: row_ts(row, 27)?,
        })
    }
}
