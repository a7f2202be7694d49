//! Hot copy of the live database.
//!
//! Uses `rusqlite::backup::Backup` so the source connection stays open and
//! usable. `main` writes `<data>/dealdesk.db.bak` after bootstrap.

use std::path::{Path, PathBuf};

use crate::db::{CrmDb, DbError};

/// Backup file name next to the live database.
pub const BACKUP_FILE_NAME: &str = "dealdesk.db.bak";

/// Default backup destination for a data directory.
pub fn backup_path(data_dir: &Path) -> PathBuf {
    data_dir.join(BACKUP_FILE_NAME)
}

/// Copy the live database to `dest`, replacing any previous backup.
pub fn backup_database(db: &CrmDb, dest: &Path) -> Result<PathBuf, DbError> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
        }
    }

    let mut backup_conn = rusqlite::Connection::open(dest)?;
    let backup = rusqlite::backup::Backup::new(db.conn_ref(), &mut backup_conn)?;

    // Small store, copy every page in one step
    backup.step(-1)?;

    log::info!("Database backed up to {}", dest.display());
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::entity::EntityKind;
    use crate::test_fixtures::*;

    #[test]
    fn test_backup_copies_rows() {
        let db = test_db();
        db.upsert_organization(&organization("o1", "Acme")).unwrap();
        db.upsert_pipeline(&pipeline("p1", true, at(2024, 1, 1))).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = backup_path(&dir.path().join("data"));
        let written = backup_database(&db, &dest).unwrap();
        assert_eq!(written, dest);

        let copy = CrmDb::open_at(dest).unwrap();
        assert_eq!(copy.count(EntityKind::Organization).unwrap(), 1);
        assert!(copy.get_default_pipeline().unwrap().is_some());
    }

    #[test]
    fn test_backup_overwrites_previous_copy() {
        let db = test_db();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(BACKUP_FILE_NAME);

        db.upsert_organization(&organization("o1", "Acme")).unwrap();
        backup_database(&db, &dest).unwrap();
        db.delete_organization("o1").unwrap();
        backup_database(&db, &dest).unwrap();

        let copy = CrmDb::open_at(dest).unwrap();
        assert_eq!(copy.count(EntityKind::Organization).unwrap(), 0);
    }
}
