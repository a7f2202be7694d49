// Projects spun off from won deals, and their tasks.

use chrono::Utc;

use super::{delete_each, require, require_existing, stored};
use crate::cascade::CascadeReport;
use crate::db::{CrmDb, Project, Task};
use crate::entity::EntityKind;
use crate::error::{CrmError, CrmResult};
use crate::util::{ensure_id, is_blank, non_blank, or_default, stamp};

/// Save a project. The name always mirrors the deal title and the code is
/// cleared, so projects stay lightweight views of their deal.
pub fn save_project(db: &CrmDb, mut project: Project) -> CrmResult<Project> {
    require(&project.deal_id, "dealId")?;
    or_default(&mut project.currency, "EUR");
    project.code.clear();
    ensure_id(&mut project.id);
    stamp(&mut project.created_at, &mut project.updated_at, Utc::now());

    db.with_transaction(|db| {
        let deal = db
            .get_deal(&project.deal_id)?
            .filter(|d| !is_blank(&d.title))
            .ok_or_else(|| CrmError::not_found(EntityKind::Deal, &project.deal_id))?;
        project.name = deal.title.trim().to_string();

        db.upsert_project(&project)?;
        stored(db.get_project(&project.id)?, EntityKind::Project, &project.id)
    })
}

/// Delete a project and its tasks.
pub fn delete_project(db: &CrmDb, id: &str) -> CrmResult<CascadeReport> {
    Ok(db.delete_project(id)?)
}

pub fn delete_projects(db: &CrmDb, ids: &[String]) -> CrmResult<Vec<CascadeReport>> {
    delete_each(db, ids, delete_project)
}

/// Save a task. A new task without an owner is assigned to `actor_id`; any
/// owner must be an existing user.
pub fn save_task(db: &CrmDb, mut task: Task, actor_id: Option<&str>) -> CrmResult<Task> {
    require(&task.title, "title")?;
    require(&task.project_id, "projectId")?;
    task.owner_user_id = non_blank(task.owner_user_id.take());
    let generated = ensure_id(&mut task.id);
    stamp(&mut task.created_at, &mut task.updated_at, Utc::now());

    db.with_transaction(|db| {
        require_existing(db, EntityKind::Project, &task.project_id)?;

        let is_new = generated || !db.exists(EntityKind::Task, &task.id)?;
        if is_new && task.owner_user_id.is_none() {
            task.owner_user_id = actor_id.map(String::from);
        }
        if let Some(ref owner) = task.owner_user_id {
            require_existing(db, EntityKind::User, owner)?;
        }

        db.upsert_task(&task)?;
        stored(db.get_task(&task.id)?, EntityKind::Task, &task.id)
    })
}

pub fn delete_tasks(db: &CrmDb, ids: &[String]) -> CrmResult<usize> {
    let removed = delete_each(db, ids, |db, id| Ok(db.delete_task(id)?))?;
    Ok(removed.into_iter().filter(|deleted| *deleted).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::error::ErrorKind;
    use crate::test_fixtures::*;

    fn seed_deal(db: &CrmDb) {
        db.upsert_organization(&organization("o1", "Acme")).unwrap();
        db.upsert_contact(&contact("c1", "o1")).unwrap();
        let mut d = deal("d1", "o1", "c1");
        d.title = "  Website refresh ".into();
        db.upsert_deal(&d).unwrap();
    }

    #[test]
    fn test_project_takes_deal_title_and_drops_code() {
        let db = test_db();
        seed_deal(&db);
        let mut p = project("", "d1");
        p.name = "Ignored".into();
        p.code = "WM-9".into();
        p.currency = String::new();

        let saved = save_project(&db, p).unwrap();
        assert_eq!(saved.name, "Website refresh");
        assert_eq!(saved.code, "");
        assert_eq!(saved.currency, "EUR");

        let err = save_project(&db, project("", "ghost")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_new_task_defaults_owner_to_actor() {
        let db = test_db();
        seed_deal(&db);
        db.upsert_project(&project("p1", "d1")).unwrap();
        db.upsert_user(&user("u1", "ada@example.com")).unwrap();
        db.upsert_user(&user("u2", "bob@example.com")).unwrap();

        let created = save_task(&db, task("", "p1"), Some("u1")).unwrap();
        assert_eq!(created.owner_user_id.as_deref(), Some("u1"));

        // Replacing an existing task keeps an explicit clear
        let mut cleared = created.clone();
        cleared.owner_user_id = None;
        let saved = save_task(&db, cleared, Some("u2")).unwrap();
        assert_eq!(saved.owner_user_id, None);
    }

    #[test]
    fn test_task_owner_must_exist() {
        let db = test_db();
        seed_deal(&db);
        db.upsert_project(&project("p1", "d1")).unwrap();

        let mut t = task("t1", "p1");
        t.owner_user_id = Some("ghost".into());
        let err = save_task(&db, t, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(db.get_task("t1").unwrap().is_none());

        let err = save_task(&db, task("t1", ""), None).unwrap_err();
        assert_eq!(err.to_string(), "projectId is required");
    }

    #[test]
    fn test_delete_project_takes_tasks() {
        let db = test_db();
        seed_deal(&db);
        db.upsert_project(&project("p1", "d1")).unwrap();
        save_task(&db, task("t1", "p1"), None).unwrap();
        save_task(&db, task("t2", "p1"), None).unwrap();

        let reports = delete_projects(&db, &["p1".to_string()]).unwrap();
        assert_eq!(reports[0].deleted(EntityKind::Task), 2);
        assert_eq!(db.count(EntityKind::Task).unwrap(), 0);
        assert!(db.get_deal("d1").unwrap().is_some());
    }
}
