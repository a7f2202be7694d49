use serde::Serialize;

use super::*;

const PIPELINE_COLUMNS: &str = "id, name, description, is_default, created_at, updated_at";
const STAGE_COLUMNS: &str =
    "id, pipeline_id, name, color, position, probability, created_at, updated_at";

/// Outcome of deleting a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDeletion {
    pub found: bool,
    pub was_default: bool,
    pub fallback_pipeline_id: Option<String>,
    pub fallback_stage_id: Option<String>,
    pub deals_reassigned: usize,
    pub stages_deleted: usize,
    /// Pipeline flagged default as a result of this deletion.
    pub promoted_pipeline_id: Option<String>,
}

/// Outcome of deleting a single stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDeletion {
    pub found: bool,
    pub fallback_stage_id: Option<String>,
    pub deals_reassigned: usize,
}

impl CrmDb {
    // =========================================================================
    // Pipelines
    // =========================================================================

    /// Insert or replace a pipeline. Saving one flagged default clears the
    /// flag everywhere else first; saving the only pipeline without the flag
    /// promotes it, so exactly one default exists afterwards.
    pub fn upsert_pipeline(&self, pipeline: &Pipeline) -> Result<(), DbError> {
        self.with_transaction(|db| {
            if pipeline.is_default {
                db.clear_default_pipelines(Some(&pipeline.id))?;
            }
            db.conn.execute(
                "INSERT INTO pipelines (id, name, description, is_default, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    is_default = excluded.is_default,
                    updated_at = excluded.updated_at",
                params![
                    pipeline.id,
                    pipeline.name,
                    pipeline.description,
                    pipeline.is_default as i32,
                    ts(&pipeline.created_at),
                    ts(&pipeline.updated_at),
                ],
            )?;
            db.ensure_default_pipeline()?;
            Ok(())
        })
    }

    pub fn get_pipeline(&self, id: &str) -> Result<Option<Pipeline>, DbError> {
        self.first_row(
            &format!("SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE id = ?1"),
            params![id],
            Self::map_pipeline_row,
        )
    }

    /// All pipelines: the default first, then newest first.
    pub fn list_pipelines(&self) -> Result<Vec<Pipeline>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {PIPELINE_COLUMNS} FROM pipelines
                 ORDER BY is_default DESC, created_at DESC, rowid DESC"
            ),
            [],
            Self::map_pipeline_row,
        )
    }

    pub fn get_default_pipeline(&self) -> Result<Option<Pipeline>, DbError> {
        self.first_row(
            &format!(
                "SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE is_default = 1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            [],
            Self::map_pipeline_row,
        )
    }

    /// The pipeline new deals land in: the default one, or the oldest
    /// pipeline when none is flagged.
    pub fn primary_pipeline(&self) -> Result<Option<Pipeline>, DbError> {
        if let Some(pipeline) = self.get_default_pipeline()? {
            return Ok(Some(pipeline));
        }
        self.first_row(
            &format!(
                "SELECT {PIPELINE_COLUMNS} FROM pipelines
                 ORDER BY created_at ASC, rowid ASC LIMIT 1"
            ),
            [],
            Self::map_pipeline_row,
        )
    }

    /// First stage of the primary pipeline, used for deals saved without one.
    pub fn default_stage_for_new_deal(&self) -> Result<Option<PipelineStage>, DbError> {
        match self.primary_pipeline()? {
            Some(pipeline) => self.first_stage(&pipeline.id),
            None => Ok(None),
        }
    }

    /// Flag `id` as the only default pipeline.
    pub fn set_default_pipeline(&self, id: &str) -> Result<(), DbError> {
        self.with_transaction(|db| {
            db.clear_default_pipelines(Some(id))?;
            db.conn.execute(
                "UPDATE pipelines SET is_default = 1, updated_at = ?1 WHERE id = ?2",
                params![ts(&Utc::now()), id],
            )?;
            Ok(())
        })
    }

    fn clear_default_pipelines(&self, except: Option<&str>) -> Result<usize, DbError> {
        Ok(self.conn.execute(
            "UPDATE pipelines SET is_default = 0, updated_at = ?1
             WHERE is_default = 1 AND (?2 IS NULL OR id != ?2)",
            params![ts(&Utc::now()), except],
        )?)
    }

    /// Restore "exactly one default" when pipelines exist. Promotes the newest
    /// pipeline if none is flagged, and keeps only the newest flagged one if
    /// several are. Returns the pipeline promoted, if any.
    pub fn ensure_default_pipeline(&self) -> Result<Option<String>, DbError> {
        self.with_transaction(|db| {
            let defaults: Vec<String> = db.collect_rows(
                "SELECT id FROM pipelines WHERE is_default = 1
                 ORDER BY created_at DESC, rowid DESC",
                [],
                |row| row.get(0),
            )?;

            if defaults.len() > 1 {
                log::warn!(
                    "{} pipelines flagged default; keeping {}",
                    defaults.len(),
                    defaults[0]
                );
                db.clear_default_pipelines(Some(&defaults[0]))?;
                return Ok(None);
            }
            if !defaults.is_empty() {
                return Ok(None);
            }

            let newest: Option<String> = db.first_row(
                "SELECT id FROM pipelines ORDER BY created_at DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )?;
            if let Some(ref id) = newest {
                log::warn!("No default pipeline; promoting {}", id);
                db.conn.execute(
                    "UPDATE pipelines SET is_default = 1, updated_at = ?1 WHERE id = ?2",
                    params![ts(&Utc::now()), id],
                )?;
            }
            Ok(newest)
        })
    }

    /// Delete a pipeline and its stages, moving their deals to the first stage
    /// of the surviving pipeline that ranks highest (default first, then
    /// newest). Deals are left without a stage when no such stage exists.
    pub fn delete_pipeline(&self, id: &str) -> Result<PipelineDeletion, DbError> {
        self.with_transaction(|db| {
            let Some(pipeline) = db.get_pipeline(id)? else {
                return Ok(PipelineDeletion::default());
            };

            let fallback: Option<String> = db.first_row(
                "SELECT id FROM pipelines WHERE id != ?1
                 ORDER BY is_default DESC, created_at DESC, rowid DESC LIMIT 1",
                params![id],
                |row| row.get(0),
            )?;
            let fallback_stage = match fallback {
                Some(ref pid) => db.first_stage(pid)?.map(|s| s.id),
                None => None,
            };

            let deals_reassigned = db.reassign_deals_from_pipeline(id, fallback_stage.as_deref())?;
            let stages_deleted = db.conn.execute(
                "DELETE FROM pipeline_stages WHERE pipeline_id = ?1",
                params![id],
            )?;
            db.conn
                .execute("DELETE FROM pipelines WHERE id = ?1", params![id])?;

            let mut promoted = None;
            if pipeline.is_default {
                if let Some(ref pid) = fallback {
                    db.set_default_pipeline(pid)?;
                    promoted = Some(pid.clone());
                }
            }
            if let Some(repaired) = db.ensure_default_pipeline()? {
                promoted = Some(repaired);
            }

            log::info!(
                "Deleted pipeline {} ({} stages, {} deals moved to {:?})",
                id,
                stages_deleted,
                deals_reassigned,
                fallback_stage
            );

            Ok(PipelineDeletion {
                found: true,
                was_default: pipeline.is_default,
                fallback_pipeline_id: fallback,
                fallback_stage_id: fallback_stage,
                deals_reassigned,
                stages_deleted,
                promoted_pipeline_id: promoted,
            })
        })
    }

    fn map_pipeline_row(row: &rusqlite::Row) -> rusqlite::Result<Pipeline> {
        Ok(Pipeline {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            is_default: row.get::<_, i32>(3)? != 0,
            created_at: row_ts(row, 4)?,
            updated_at: row_ts(row, 5)?,
        })
    }

    // =========================================================================
    // Pipeline stages
    // =========================================================================

    pub fn upsert_pipeline_stage(&self, stage: &PipelineStage) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO pipeline_stages (
                id, pipeline_id, name, color, position, probability, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                pipeline_id = excluded.pipeline_id,
                name = excluded.name,
                color = excluded.color,
                position = excluded.position,
                probability = excluded.probability,
                updated_at = excluded.updated_at",
            params![
                stage.id,
                stage.pipeline_id,
                stage.name,
                stage.color,
                stage.position,
                stage.probability,
                ts(&stage.created_at),
                ts(&stage.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_pipeline_stage(&self, id: &str) -> Result<Option<PipelineStage>, DbError> {
        self.first_row(
            &format!("SELECT {STAGE_COLUMNS} FROM pipeline_stages WHERE id = ?1"),
            params![id],
            Self::map_stage_row,
        )
    }

    /// All stages, grouped by pipeline in position order.
    pub fn list_pipeline_stages(&self) -> Result<Vec<PipelineStage>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {STAGE_COLUMNS} FROM pipeline_stages
                 ORDER BY pipeline_id, position, rowid"
            ),
            [],
            Self::map_stage_row,
        )
    }

    pub fn list_stages_for_pipeline(&self, pipeline_id: &str) -> Result<Vec<PipelineStage>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {STAGE_COLUMNS} FROM pipeline_stages WHERE pipeline_id = ?1
                 ORDER BY position, rowid"
            ),
            params![pipeline_id],
            Self::map_stage_row,
        )
    }

    /// Lowest-position stage of a pipeline.
    pub fn first_stage(&self, pipeline_id: &str) -> Result<Option<PipelineStage>, DbError> {
        self.first_row(
            &format!(
                "SELECT {STAGE_COLUMNS} FROM pipeline_stages WHERE pipeline_id = ?1
                 ORDER BY position, rowid LIMIT 1"
            ),
            params![pipeline_id],
            Self::map_stage_row,
        )
    }

    /// Position after the current last stage of a pipeline.
    pub fn next_stage_position(&self, pipeline_id: &str) -> Result<i32, DbError> {
        let max: i32 = self.conn.query_row(
            "SELECT COALESCE(MAX(position), 0) FROM pipeline_stages WHERE pipeline_id = ?1",
            params![pipeline_id],
            |row| row.get(0),
        )?;
        max.checked_add(1).ok_or_else(|| {
            DbError::SequenceExhausted(format!("stage positions of pipeline {pipeline_id}"))
        })
    }

    /// Whether another stage of the pipeline already holds `position`.
    pub fn stage_position_taken(
        &self,
        pipeline_id: &str,
        position: i32,
        except_id: &str,
    ) -> Result<bool, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT 1 FROM pipeline_stages
             WHERE pipeline_id = ?1 AND position = ?2 AND id != ?3 LIMIT 1",
        )?;
        Ok(stmt.exists(params![pipeline_id, position, except_id])?)
    }

    /// Delete a stage, moving its deals to the lowest-position remaining stage
    /// of the same pipeline, or clearing their stage when it was the last one.
    pub fn delete_pipeline_stage(&self, id: &str) -> Result<StageDeletion, DbError> {
        self.with_transaction(|db| {
            let Some(stage) = db.get_pipeline_stage(id)? else {
                return Ok(StageDeletion::default());
            };

            let fallback: Option<String> = db.first_row(
                "SELECT id FROM pipeline_stages WHERE pipeline_id = ?1 AND id != ?2
                 ORDER BY position, rowid LIMIT 1",
                params![stage.pipeline_id, id],
                |row| row.get(0),
            )?;

            let deals_reassigned = db.reassign_deals_from_stage(id, fallback.as_deref())?;
            db.conn
                .execute("DELETE FROM pipeline_stages WHERE id = ?1", params![id])?;

            log::info!(
                "Deleted stage {} ({} deals moved to {:?})",
                id,
                deals_reassigned,
                fallback
            );

            Ok(StageDeletion {
                found: true,
                fallback_stage_id: fallback,
                deals_reassigned,
            })
        })
    }

    fn map_stage_row(row: &rusqlite::Row) -> rusqlite::Result<PipelineStage> {
        Ok(PipelineStage {
            id: row.get(0)?,
            pipeline_id: row.get(1)?,
            name: row.get(2)?,
            color: row.get(3)?,
            position: row.get(4)?,
            probability: row.get(5)?,
            created_at: row_ts(row, 6)?,
            updated_at: row_ts(row, 7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::test_db;
    use crate::db::*;
    use crate::entity::EntityKind;
    use crate::test_fixtures::*;

    fn defaults(db: &CrmDb) -> Vec<String> {
        db.list_pipelines()
            .unwrap()
            .into_iter()
            .filter(|p| p.is_default)
            .map(|p| p.id)
            .collect()
    }

    #[test]
    fn test_saving_default_clears_others() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("a", true, at(2024, 1, 1))).unwrap();
        db.upsert_pipeline(&pipeline("b", true, at(2024, 2, 1))).unwrap();
        assert_eq!(defaults(&db), vec!["b"]);

        let listed: Vec<String> = db.list_pipelines().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(listed, vec!["b", "a"]);
    }

    #[test]
    fn test_concurrent_default_saves_leave_one_default() {
        let db = test_db();
        let path = db.file_path().unwrap().to_path_buf();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let conn = CrmDb::open_at(path).unwrap();
                    for round in 0..5 {
                        let id = format!("p{worker}-{round}");
                        conn.upsert_pipeline(&pipeline(&id, true, at(2024, 1, 1)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(db.count(EntityKind::Pipeline).unwrap(), 20);
        assert_eq!(defaults(&db).len(), 1);
    }

    #[test]
    fn test_first_pipeline_becomes_default() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("a", false, at(2024, 1, 1))).unwrap();
        assert_eq!(defaults(&db), vec!["a"]);

        db.upsert_pipeline(&pipeline("b", false, at(2024, 2, 1))).unwrap();
        assert_eq!(defaults(&db), vec!["a"]);
    }

    #[test]
    fn test_delete_default_promotes_fallback_and_moves_deals() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("old", false, at(2024, 1, 1))).unwrap();
        db.upsert_pipeline(&pipeline("main", true, at(2024, 2, 1))).unwrap();
        db.upsert_pipeline_stage(&stage("old-2", "old", 2)).unwrap();
        db.upsert_pipeline_stage(&stage("old-1", "old", 1)).unwrap();
        db.upsert_pipeline_stage(&stage("main-1", "main", 1)).unwrap();
        db.upsert_pipeline_stage(&stage("main-2", "main", 2)).unwrap();

        let mut on_main = deal("d1", "o1", "c1");
        on_main.pipeline_stage_id = Some("main-2".into());
        let mut on_old = deal("d2", "o1", "c1");
        on_old.pipeline_stage_id = Some("old-2".into());
        db.upsert_deal(&on_main).unwrap();
        db.upsert_deal(&on_old).unwrap();

        let outcome = db.delete_pipeline("main").unwrap();
        assert!(outcome.was_default);
        assert_eq!(outcome.fallback_stage_id.as_deref(), Some("old-1"));
        assert_eq!(outcome.stages_deleted, 2);
        assert_eq!(outcome.deals_reassigned, 1);
        assert_eq!(outcome.promoted_pipeline_id.as_deref(), Some("old"));

        assert_eq!(defaults(&db), vec!["old"]);
        assert_eq!(
            db.get_deal("d1").unwrap().unwrap().pipeline_stage_id.as_deref(),
            Some("old-1")
        );
        assert_eq!(
            db.get_deal("d2").unwrap().unwrap().pipeline_stage_id.as_deref(),
            Some("old-2")
        );
        assert!(db.get_pipeline_stage("main-1").unwrap().is_none());
    }

    #[test]
    fn test_fallback_prefers_default_then_newest() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("a", true, at(2024, 1, 1))).unwrap();
        db.upsert_pipeline(&pipeline("b", false, at(2024, 2, 1))).unwrap();
        db.upsert_pipeline(&pipeline("c", false, at(2024, 3, 1))).unwrap();

        // Deleting a non-default pipeline falls back to the default one
        let outcome = db.delete_pipeline("c").unwrap();
        assert_eq!(outcome.fallback_pipeline_id.as_deref(), Some("a"));
        assert_eq!(outcome.promoted_pipeline_id, None);
        assert_eq!(defaults(&db), vec!["a"]);

        // Deleting the default falls back to the newest survivor
        let outcome = db.delete_pipeline("a").unwrap();
        assert_eq!(outcome.fallback_pipeline_id.as_deref(), Some("b"));
        assert_eq!(defaults(&db), vec!["b"]);
    }

    #[test]
    fn test_promoted_pipeline_without_stages_clears_deals() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("empty", false, at(2024, 1, 1))).unwrap();
        db.upsert_pipeline(&pipeline("main", true, at(2024, 2, 1))).unwrap();
        db.upsert_pipeline_stage(&stage("main-1", "main", 1)).unwrap();
        let mut d = deal("d1", "o1", "c1");
        d.pipeline_stage_id = Some("main-1".into());
        db.upsert_deal(&d).unwrap();

        db.delete_pipeline("main").unwrap();
        assert_eq!(defaults(&db), vec!["empty"]);
        assert_eq!(db.get_deal("d1").unwrap().unwrap().pipeline_stage_id, None);
    }

    #[test]
    fn test_delete_only_pipeline() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("only", true, at(2024, 1, 1))).unwrap();
        db.upsert_pipeline_stage(&stage("s1", "only", 1)).unwrap();
        db.upsert_pipeline_stage(&stage("s2", "only", 2)).unwrap();
        let mut a = deal("a", "o1", "c1");
        a.pipeline_stage_id = Some("s1".into());
        let mut b = deal("b", "o1", "c1");
        b.pipeline_stage_id = Some("s2".into());
        db.upsert_deal(&a).unwrap();
        db.upsert_deal(&b).unwrap();

        let outcome = db.delete_pipeline("only").unwrap();
        assert_eq!(outcome.fallback_pipeline_id, None);
        assert_eq!(outcome.deals_reassigned, 2);
        assert!(db.list_pipelines().unwrap().is_empty());
        assert!(db.list_pipeline_stages().unwrap().is_empty());
        assert!(db
            .list_deals()
            .unwrap()
            .iter()
            .all(|d| d.pipeline_stage_id.is_none()));
    }

    #[test]
    fn test_missing_default_is_repaired_on_delete() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("a", true, at(2024, 1, 1))).unwrap();
        db.upsert_pipeline(&pipeline("b", false, at(2024, 2, 1))).unwrap();
        db.upsert_pipeline(&pipeline("c", false, at(2024, 3, 1))).unwrap();
        // Corrupt the flag behind the store's back
        db.conn_ref()
            .execute("UPDATE pipelines SET is_default = 0", [])
            .unwrap();

        let outcome = db.delete_pipeline("b").unwrap();
        assert_eq!(outcome.promoted_pipeline_id.as_deref(), Some("c"));
        assert_eq!(defaults(&db), vec!["c"]);
    }

    #[test]
    fn test_delete_missing_pipeline_is_noop() {
        let db = test_db();
        let outcome = db.delete_pipeline("ghost").unwrap();
        assert!(!outcome.found);
    }

    #[test]
    fn test_primary_pipeline_falls_back_to_oldest() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("old", false, at(2024, 1, 1))).unwrap();
        db.upsert_pipeline(&pipeline("new", false, at(2024, 2, 1))).unwrap();
        db.conn_ref()
            .execute("UPDATE pipelines SET is_default = 0", [])
            .unwrap();
        db.upsert_pipeline_stage(&stage("old-1", "old", 1)).unwrap();

        assert_eq!(db.primary_pipeline().unwrap().unwrap().id, "old");
        assert_eq!(db.default_stage_for_new_deal().unwrap().unwrap().id, "old-1");
    }

    #[test]
    fn test_delete_stage_moves_deals_to_lowest_other_stage() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("p", true, at(2024, 1, 1))).unwrap();
        db.upsert_pipeline_stage(&stage("s1", "p", 1)).unwrap();
        db.upsert_pipeline_stage(&stage("s2", "p", 2)).unwrap();
        db.upsert_pipeline_stage(&stage("s3", "p", 3)).unwrap();
        let mut d = deal("d1", "o1", "c1");
        d.pipeline_stage_id = Some("s1".into());
        db.upsert_deal(&d).unwrap();

        let outcome = db.delete_pipeline_stage("s1").unwrap();
        assert_eq!(outcome.fallback_stage_id.as_deref(), Some("s2"));
        assert_eq!(outcome.deals_reassigned, 1);
        assert_eq!(
            db.get_deal("d1").unwrap().unwrap().pipeline_stage_id.as_deref(),
            Some("s2")
        );
    }

    #[test]
    fn test_delete_only_stage_clears_deals() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("p", true, at(2024, 1, 1))).unwrap();
        db.upsert_pipeline_stage(&stage("s1", "p", 1)).unwrap();
        let mut d = deal("d1", "o1", "c1");
        d.pipeline_stage_id = Some("s1".into());
        db.upsert_deal(&d).unwrap();

        let outcome = db.delete_pipeline_stage("s1").unwrap();
        assert_eq!(outcome.fallback_stage_id, None);
        assert_eq!(db.get_deal("d1").unwrap().unwrap().pipeline_stage_id, None);
        assert!(db.list_stages_for_pipeline("p").unwrap().is_empty());
    }

    #[test]
    fn test_stage_positions() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("p", true, at(2024, 1, 1))).unwrap();
        assert_eq!(db.next_stage_position("p").unwrap(), 1);
        db.upsert_pipeline_stage(&stage("s1", "p", 1)).unwrap();
        db.upsert_pipeline_stage(&stage("s5", "p", 5)).unwrap();
        assert_eq!(db.next_stage_position("p").unwrap(), 6);

        assert!(db.stage_position_taken("p", 5, "other").unwrap());
        assert!(!db.stage_position_taken("p", 5, "s5").unwrap());
        assert!(!db.stage_position_taken("p", 2, "other").unwrap());

        let ordered: Vec<i32> = db
            .list_stages_for_pipeline("p")
            .unwrap()
            .into_iter()
            .map(|s| s.position)
            .collect();
        assert_eq!(ordered, vec![1, 5]);
    }

    #[test]
    fn test_next_stage_position_after_i32_max_is_exhausted() {
        let db = test_db();
        db.upsert_pipeline(&pipeline("p", true, at(2024, 1, 1))).unwrap();
        db.upsert_pipeline_stage(&stage("s1", "p", i32::MAX)).unwrap();
        assert!(matches!(
            db.next_stage_position("p"),
            Err(DbError::SequenceExhausted(_))
        ));
    }
}
