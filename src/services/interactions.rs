// Logged touchpoints: calls, e-mails, meetings and notes.

use chrono::{DateTime, Utc};

use super::{delete_each, require_existing, stored};
use crate::db::{CrmDb, Interaction};
use crate::entity::EntityKind;
use crate::error::CrmResult;
use crate::util::{ensure_id, non_blank, or_default, stamp};

pub const DEFAULT_TRANSCRIPTION_LANGUAGE: &str = "it";
pub const DEFAULT_TRANSCRIPTION_STATUS: &str = "pending";

/// Save an interaction. The author defaults to the acting user and the
/// occurrence time to now; every reference given must exist.
pub fn save_interaction(
    db: &CrmDb,
    mut interaction: Interaction,
    actor_id: Option<&str>,
) -> CrmResult<Interaction> {
    let now = Utc::now();
    interaction.user_id =
        non_blank(interaction.user_id.take()).or_else(|| actor_id.map(String::from));
    interaction.organization_id = non_blank(interaction.organization_id.take());
    interaction.contact_id = non_blank(interaction.contact_id.take());
    interaction.deal_id = non_blank(interaction.deal_id.take());
    if interaction.occurred_at == DateTime::<Utc>::default() {
        interaction.occurred_at = now;
    }
    or_default(
        &mut interaction.transcription_language,
        DEFAULT_TRANSCRIPTION_LANGUAGE,
    );
    or_default(
        &mut interaction.transcription_status,
        DEFAULT_TRANSCRIPTION_STATUS,
    );
    ensure_id(&mut interaction.id);
    stamp(&mut interaction.created_at, &mut interaction.updated_at, now);

    db.with_transaction(|db| {
        let references = [
            (EntityKind::User, &interaction.user_id),
            (EntityKind::Organization, &interaction.organization_id),
            (EntityKind::Contact, &interaction.contact_id),
            (EntityKind::Deal, &interaction.deal_id),
        ];
        for (kind, id) in references {
            if let Some(id) = id {
                require_existing(db, kind, id)?;
            }
        }

        db.upsert_interaction(&interaction)?;
        stored(
            db.get_interaction(&interaction.id)?,
            EntityKind::Interaction,
            &interaction.id,
        )
    })
}

pub fn delete_interactions(db: &CrmDb, ids: &[String]) -> CrmResult<usize> {
    let removed = delete_each(db, ids, |db, id| Ok(db.delete_interaction(id)?))?;
    Ok(removed.into_iter().filter(|deleted| *deleted).count())
}
