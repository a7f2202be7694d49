use super::*;
use crate::cascade::{CascadeReport, USER_PLAN};

const USER_COLUMNS: &str = "id, email, name, role, password_hash, created_at, updated_at";
const SESSION_COLUMNS: &str = "token, user_id, user_agent, ip_address, created_at, expires_at";

impl CrmDb {
    // =========================================================================
    // Users
    // =========================================================================

    pub fn upsert_user(&self, user: &User) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO users (id, email, name, role, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                name = excluded.name,
                role = excluded.role,
                password_hash = excluded.password_hash,
                updated_at = excluded.updated_at",
            params![
                user.id,
                user.email_address,
                user.name,
                user.role,
                user.password_hash,
                ts(&user.created_at),
                ts(&user.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>, DbError> {
        self.first_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            Self::map_user_row,
        )
    }

    /// Look up a user by e-mail, ignoring case.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        self.first_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER(?1)"),
            params![email.trim()],
            Self::map_user_row,
        )
    }

    pub fn list_users(&self) -> Result<Vec<User>, DbError> {
        self.collect_rows(
            &format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, rowid DESC"),
            [],
            Self::map_user_row,
        )
    }

    /// Delete a user and their sessions. Work they own or authored is kept
    /// with the reference cleared.
    pub fn delete_user(&self, id: &str) -> Result<CascadeReport, DbError> {
        self.run_cascade(&USER_PLAN, id)
    }

    fn map_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email_address: row.get(1)?,
            name: row.get(2)?,
            role: row.get(3)?,
            password_hash: row.get(4)?,
            created_at: row_ts(row, 5)?,
            updated_at: row_ts(row, 6)?,
        })
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub fn insert_session(&self, session: &Session) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, user_agent, ip_address, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.token,
                session.user_id,
                session.user_agent,
                session.ip_address,
                ts(&session.created_at),
                ts(&session.expires_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, token: &str) -> Result<Option<Session>, DbError> {
        self.first_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE token = ?1"),
            params![token],
            Self::map_session_row,
        )
    }

    pub fn delete_session(&self, token: &str) -> Result<bool, DbError> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(rows > 0)
    }

    fn map_session_row(row: &rusqlite::Row) -> rusqlite::Result<Session> {
        Ok(Session {
            token: row.get(0)?,
            user_id: row.get(1)?,
            user_agent: row.get(2)?,
            ip_address: row.get(3)?,
            created_at: row_ts(row, 4)?,
            expires_at: row_ts(row, 5)?,
        })
    }
}
