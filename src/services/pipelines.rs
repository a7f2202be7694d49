// Pipelines and stages. Default-flag and stage-reference repair lives in the
// store; this layer validates and picks positions.

use chrono::Utc;

use super::{delete_each, require, require_existing, stored};
use crate::db::{CrmDb, Pipeline, PipelineDeletion, PipelineStage, StageDeletion};
use crate::entity::EntityKind;
use crate::error::{CrmError, CrmResult};
use crate::util::{ensure_id, stamp};

/// Save a pipeline. Flagging it default clears every other default in the
/// same transaction.
pub fn save_pipeline(db: &CrmDb, mut pipeline: Pipeline) -> CrmResult<Pipeline> {
    require(&pipeline.name, "name")?;
    ensure_id(&mut pipeline.id);
    stamp(&mut pipeline.created_at, &mut pipeline.updated_at, Utc::now());

    db.with_transaction(|db| {
        db.upsert_pipeline(&pipeline)?;
        stored(db.get_pipeline(&pipeline.id)?, EntityKind::Pipeline, &pipeline.id)
    })
}

pub fn delete_pipeline(db: &CrmDb, id: &str) -> CrmResult<PipelineDeletion> {
    Ok(db.delete_pipeline(id)?)
}

pub fn delete_pipelines(db: &CrmDb, ids: &[String]) -> CrmResult<Vec<PipelineDeletion>> {
    delete_each(db, ids, delete_pipeline)
}

/// Save a stage. A position of zero or below appends after the last stage;
/// an explicit position must not be used by another stage of the pipeline.
pub fn save_stage(db: &CrmDb, mut stage: PipelineStage) -> CrmResult<PipelineStage> {
    require(&stage.pipeline_id, "pipelineId")?;
    require(&stage.name, "name")?;
    ensure_id(&mut stage.id);
    stamp(&mut stage.created_at, &mut stage.updated_at, Utc::now());

    db.with_transaction(|db| {
        require_existing(db, EntityKind::Pipeline, &stage.pipeline_id)?;

        if stage.position <= 0 {
            stage.position = match db.get_pipeline_stage(&stage.id)? {
                Some(existing) if existing.pipeline_id == stage.pipeline_id => existing.position,
                _ => db.next_stage_position(&stage.pipeline_id)?,
            };
        } else if db.stage_position_taken(&stage.pipeline_id, stage.position, &stage.id)? {
            return Err(CrmError::validation(format!(
                "position {} is already used in this pipeline",
                stage.position
            )));
        }

        db.upsert_pipeline_stage(&stage)?;
        stored(
            db.get_pipeline_stage(&stage.id)?,
            EntityKind::PipelineStage,
            &stage.id,
        )
    })
}

pub fn delete_stage(db: &CrmDb, id: &str) -> CrmResult<StageDeletion> {
    Ok(db.delete_pipeline_stage(id)?)
}

pub fn delete_stages(db: &CrmDb, ids: &[String]) -> CrmResult<Vec<StageDeletion>> {
    delete_each(db, ids, delete_stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::error::ErrorKind;
    use crate::services::deals::save_deal;
    use crate::test_fixtures::*;

    #[test]
    fn test_new_default_clears_previous() {
        let db = test_db();
        save_pipeline(&db, pipeline("a", true, at(2024, 1, 1))).unwrap();
        save_pipeline(&db, pipeline("b", true, at(2024, 2, 1))).unwrap();

        let defaults: Vec<_> = db
            .list_pipelines()
            .unwrap()
            .into_iter()
            .filter(|p| p.is_default)
            .map(|p| p.id)
            .collect();
        assert_eq!(defaults, vec!["b"]);
    }

    #[test]
    fn test_stage_positions_append_and_stay_unique() {
        let db = test_db();
        save_pipeline(&db, pipeline("p", true, at(2024, 1, 1))).unwrap();

        let first = save_stage(&db, stage("", "p", 0)).unwrap();
        let second = save_stage(&db, stage("", "p", -3)).unwrap();
        assert_eq!((first.position, second.position), (1, 2));

        let err = save_stage(&db, stage("", "p", 2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // Re-saving a stage at its own position is not a clash
        let mut again = second.clone();
        again.name = "Renamed".into();
        assert_eq!(save_stage(&db, again).unwrap().position, 2);

        // Zero keeps the current slot on replace
        let mut keep = first.clone();
        keep.position = 0;
        assert_eq!(save_stage(&db, keep).unwrap().position, 1);
    }

    #[test]
    fn test_stage_requires_existing_pipeline() {
        let db = test_db();
        let err = save_stage(&db, stage("s", "ghost", 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = save_stage(&db, stage("s", "", 1)).unwrap_err();
        assert_eq!(err.to_string(), "pipelineId is required");
    }

    #[test]
    fn test_deleting_default_pipeline_moves_deals_to_promoted() {
        let db = test_db();
        db.upsert_organization(&organization("o1", "Acme")).unwrap();
        db.upsert_contact(&contact("c1", "o1")).unwrap();
        save_pipeline(&db, pipeline("backup", false, at(2024, 1, 1))).unwrap();
        save_pipeline(&db, pipeline("main", true, at(2024, 2, 1))).unwrap();
        save_stage(&db, stage("b2", "backup", 2)).unwrap();
        save_stage(&db, stage("b1", "backup", 1)).unwrap();
        save_stage(&db, stage("m1", "main", 1)).unwrap();
        let d = save_deal(&db, deal("d1", "o1", "c1")).unwrap();
        assert_eq!(d.pipeline_stage_id.as_deref(), Some("m1"));

        let outcome = delete_pipeline(&db, "main").unwrap();
        assert!(outcome.was_default);
        assert_eq!(outcome.promoted_pipeline_id.as_deref(), Some("backup"));
        assert!(db.get_pipeline("backup").unwrap().unwrap().is_default);
        assert_eq!(
            db.get_deal("d1").unwrap().unwrap().pipeline_stage_id.as_deref(),
            Some("b1")
        );
    }

    #[test]
    fn test_deleting_only_stage_clears_deals() {
        let db = test_db();
        db.upsert_organization(&organization("o1", "Acme")).unwrap();
        db.upsert_contact(&contact("c1", "o1")).unwrap();
        save_pipeline(&db, pipeline("p", true, at(2024, 1, 1))).unwrap();
        save_stage(&db, stage("only", "p", 1)).unwrap();
        save_deal(&db, deal("d1", "o1", "c1")).unwrap();

        let outcomes = delete_stages(&db, &["only".to_string()]).unwrap();
        assert_eq!(outcomes[0].deals_reassigned, 1);
        assert_eq!(outcomes[0].fallback_stage_id, None);
        assert_eq!(db.get_deal("d1").unwrap().unwrap().pipeline_stage_id, None);
    }
}
