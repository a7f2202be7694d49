use super::*;
use crate::cascade::{CascadeReport, PROJECT_PLAN};

const PROJECT_COLUMNS: &str = "id, deal_id, name, description, code, status, start_date,
        target_end_date, actual_end_date, budget, currency, created_at, updated_at";

impl CrmDb {
    // =========================================================================
    // Projects
    // =========================================================================

    pub fn upsert_project(&self, project: &Project) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO projects (
                id, deal_id, name, description, code, status, start_date,
                target_end_date, actual_end_date, budget, currency, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                deal_id = excluded.deal_id,
                name = excluded.name,
                description = excluded.description,
                code = excluded.code,
                status = excluded.status,
                start_date = excluded.start_date,
                target_end_date = excluded.target_end_date,
                actual_end_date = excluded.actual_end_date,
                budget = excluded.budget,
                currency = excluded.currency,
                updated_at = excluded.updated_at",
            params![
                project.id,
                project.deal_id,
                project.name,
                project.description,
                project.code,
                project.status,
                opt_ts(&project.start_date),
                opt_ts(&project.target_end_date),
                opt_ts(&project.actual_end_date),
                project.budget,
                project.currency,
                ts(&project.created_at),
                ts(&project.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>, DbError> {
        self.first_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id],
            Self::map_project_row,
        )
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, DbError> {
        self.collect_rows(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at DESC, rowid DESC"),
            [],
            Self::map_project_row,
        )
    }

    pub fn list_projects_for_deal(&self, deal_id: &str) -> Result<Vec<Project>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE deal_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![deal_id],
            Self::map_project_row,
        )
    }

    /// Delete a project and its tasks.
    pub fn delete_project(&self, id: &str) -> Result<CascadeReport, DbError> {
        self.run_cascade(&PROJECT_PLAN, id)
    }

    fn map_project_row(row: &rusqlite::Row) -> rusqlite::Result<Project> {
        Ok(Project {
            id: row.get(0)?,
            deal_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            code: row.get(4)?,
            status: row.get(5)?,
            start_date: row_opt_ts(row, 6)?,
            target_end_date: row_opt_ts(row, 7)?,
            actual_end_date: row_opt_ts(row, 8)?,
            budget: row.get(9)?,
            currency: row.get(10)?,
            created_at: row_ts(row, 11)?,
            updated_at: row_ts(row, 12)?,
        })
    }
}
