use super::*;

const INTERACTION_COLUMNS: &str = "id, user_id, organization_id, contact_id, deal_id,
        interaction_type, subject, body, occurred_at, duration_minutes, transcript,
        cleaned_transcript, follow_up_completed, follow_up_date, follow_up_notes,
        transcription_language, transcription_status, created_at, updated_at";

impl CrmDb {
    // =========================================================================
    // Interactions
    // =========================================================================

    pub fn upsert_interaction(&self, i: &Interaction) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO interactions (
                id, user_id, organization_id, contact_id, deal_id,
                interaction_type, subject, body, occurred_at, duration_minutes, transcript,
                cleaned_transcript, follow_up_completed, follow_up_date, follow_up_notes,
                transcription_language, transcription_status, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                       ?15, ?16, ?17, ?18, ?19)
             ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                organization_id = excluded.organization_id,
                contact_id = excluded.contact_id,
                deal_id = excluded.deal_id,
                interaction_type = excluded.interaction_type,
                subject = excluded.subject,
                body = excluded.body,
                occurred_at = excluded.occurred_at,
                duration_minutes = excluded.duration_minutes,
                transcript = excluded.transcript,
                cleaned_transcript = excluded.cleaned_transcript,
                follow_up_completed = excluded.follow_up_completed,
                follow_up_date = excluded.follow_up_date,
                follow_up_notes = excluded.follow_up_notes,
                transcription_language = excluded.transcription_language,
                transcription_status = excluded.transcription_status,
                updated_at = excluded.updated_at",
            params![
                i.id,
                i.user_id,
                i.organization_id,
                i.contact_id,
                i.deal_id,
                i.interaction_type,
                i.subject,
                i.body,
                ts(&i.occurred_at),
                i.duration_minutes,
                i.transcript,
                i.cleaned_transcript,
                i.follow_up_completed as i32,
                opt_ts(&i.follow_up_date),
                i.follow_up_notes,
                i.transcription_language,
                i.transcription_status,
                ts(&i.created_at),
                ts(&i.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_interaction(&self, id: &str) -> Result<Option<Interaction>, DbError> {
        self.first_row(
            &format!("SELECT {INTERACTION_COLUMNS} FROM interactions WHERE id = ?1"),
            params![id],
            Self::map_interaction_row,
        )
    }

    /// All interactions, most recent touchpoint first.
    pub fn list_interactions(&self) -> Result<Vec<Interaction>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {INTERACTION_COLUMNS} FROM interactions
                 ORDER BY occurred_at DESC, created_at DESC, rowid DESC"
            ),
            [],
            Self::map_interaction_row,
        )
    }

    pub fn list_interactions_for_deal(&self, deal_id: &str) -> Result<Vec<Interaction>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {INTERACTION_COLUMNS} FROM interactions WHERE deal_id = ?1
                 ORDER BY occurred_at DESC, created_at DESC, rowid DESC"
            ),
            params![deal_id],
            Self::map_interaction_row,
        )
    }

    pub fn delete_interaction(&self, id: &str) -> Result<bool, DbError> {
        let rows = self
            .conn
            .execute("DELETE FROM interactions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn map_interaction_row(row: &rusqlite::Row) -> rusqlite::Result<Interaction> {
        let optional = |idx: usize| -> rusqlite::Result<Option<String>> {
            Ok(row.get::<_, Option<String>>(idx)?.filter(|s| !s.is_empty()))
        };
        Ok(Interaction {
            id: row.get(0)?,
            user_id: optional(1)?,
            organization_id: optional(2)?,
            contact_id: optional(3)?,
            deal_id: optional(4)?,
            interaction_type: row.get(5)?,
            subject: row.get(6)?,
            body: row.get(7)?,
            occurred_at: row_ts(row, 8)?,
            duration_minutes: row.get(9)?,
            transcript: row.get(10)?,
            cleaned_transcript: row.get(11)?,
            follow_up_completed: row.get::<_, i32>(12)? != 0,
            follow_up_date: row_opt_ts(row, 13)?,
            follow_up_notes: row.get(14)?,
            transcription_language: row.get(15)?,
            transcription_status: row.get(16)?,
            created_at: row_ts(row, 17)?,
            updated_at: row_ts(row, 18)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::test_db;
    use crate::test_fixtures::*;

    #[test]
    fn test_interactions_ordered_by_occurrence() {
        let db = test_db();
        let mut early = interaction("early", Some("d1"));
        early.occurred_at = at(2024, 1, 1);
        let mut late = interaction("late", Some("d1"));
        late.occurred_at = at(2024, 5, 1);
        let mut other = interaction("other", None);
        other.occurred_at = at(2024, 3, 1);
        db.upsert_interaction(&early).unwrap();
        db.upsert_interaction(&late).unwrap();
        db.upsert_interaction(&other).unwrap();

        let ids: Vec<String> = db
            .list_interactions()
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["late", "other", "early"]);

        let for_deal = db.list_interactions_for_deal("d1").unwrap();
        assert_eq!(for_deal.len(), 2);
        assert_eq!(db.get_interaction("other").unwrap().unwrap().deal_id, None);

        assert!(db.delete_interaction("early").unwrap());
        assert_eq!(db.list_interactions_for_deal("d1").unwrap().len(), 1);
    }
}
