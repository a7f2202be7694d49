pub mod auth;
pub mod cascade;
pub mod config;
pub mod db;
pub mod db_backup;
pub mod entity;
pub mod error;
mod migrations;
pub mod services;
pub mod state;
pub mod util;

#[cfg(test)]
mod test_fixtures;

use std::sync::Arc;

use auth::Argon2Hasher;
use config::{AppConfig, SettingsStore};
use db::CrmDb;
use error::CrmResult;
use services::seed::{seed_if_needed, SeedReport};
use state::AppState;

/// Open the store and settings for `config`, run the first-start bootstrap
/// when enabled, and return the shared state for request handlers.
pub fn bootstrap(config: &AppConfig) -> CrmResult<(Arc<AppState>, SeedReport)> {
    let db = CrmDb::open_at(config.db_path.clone())?;
    let settings = match SettingsStore::load(config.settings_path.clone()) {
        Ok(store) => store,
        Err(e) => {
            log::warn!("Settings unreadable, using defaults: {e}");
            SettingsStore::new(config.settings_path.clone(), Default::default())
        }
    };
    let hasher = Arc::new(Argon2Hasher::new());

    let report = if config.seed {
        seed_if_needed(&db, hasher.as_ref(), &config.seed_options)?
    } else {
        SeedReport::default()
    };

    Ok((Arc::new(AppState::new(db, settings, hasher)), report))
}
