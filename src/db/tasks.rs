use super::*;

const TASK_COLUMNS: &str = "id, project_id, owner_user_id, title, description, status, priority,
        due_date, estimated_hours, actual_hours, created_at, updated_at";

impl CrmDb {
    // =========================================================================
    // Tasks
    // =========================================================================

    pub fn upsert_task(&self, task: &Task) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO tasks (
                id, project_id, owner_user_id, title, description, status, priority,
                due_date, estimated_hours, actual_hours, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                project_id = excluded.project_id,
                owner_user_id = excluded.owner_user_id,
                title = excluded.title,
                description = excluded.description,
                status = excluded.status,
                priority = excluded.priority,
                due_date = excluded.due_date,
                estimated_hours = excluded.estimated_hours,
                actual_hours = excluded.actual_hours,
                updated_at = excluded.updated_at",
            params![
                task.id,
                task.project_id,
                task.owner_user_id,
                task.title,
                task.description,
                task.status,
                task.priority,
                opt_ts(&task.due_date),
                task.estimated_hours,
                task.actual_hours,
                ts(&task.created_at),
                ts(&task.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>, DbError> {
        self.first_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            Self::map_task_row,
        )
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, DbError> {
        self.collect_rows(
            &format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC, rowid DESC"),
            [],
            Self::map_task_row,
        )
    }

    pub fn list_tasks_for_project(&self, project_id: &str) -> Result<Vec<Task>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![project_id],
            Self::map_task_row,
        )
    }

    pub fn list_tasks_for_owner(&self, user_id: &str) -> Result<Vec<Task>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_user_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![user_id],
            Self::map_task_row,
        )
    }

    pub fn delete_task(&self, id: &str) -> Result<bool, DbError> {
        let rows = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn map_task_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        Ok(Task {
            id: row.get(0)?,
            project_id: row.get(1)?,
            owner_user_id: row
                .get::<_, Option<String>>(2)?
                .filter(|s| !s.is_empty()),
            title: row.get(3)?,
            description: row.get(4)?,
            status: row.get(5)?,
            priority: row.get(6)?,
            due_date: row_opt_ts(row, 7)?,
            estimated_hours: row.get(8)?,
            actual_hours: row.get(9)?,
            created_at: row_ts(row, 10)?,
            updated_at: row_ts(row, 11)?,
        })
    }
}
