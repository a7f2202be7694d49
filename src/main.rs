//! DealDesk bootstrap.
//!
//! Resolves configuration from the environment, opens and migrates the
//! store, seeds a fresh install, and writes a hot backup next to the live
//! database. Request handling is left to whatever transport embeds the
//! library.

use dealdesk_lib::config::AppConfig;
use dealdesk_lib::db_backup::{backup_database, backup_path};
use dealdesk_lib::entity::EntityKind;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to resolve configuration: {e}");
            std::process::exit(1);
        }
    };
    log::info!("Data directory: {}", config.data_dir.display());

    let (state, report) = match dealdesk_lib::bootstrap(&config) {
        Ok(started) => started,
        Err(e) => {
            log::error!("Failed to open {}: {e}", config.db_path.display());
            std::process::exit(1);
        }
    };
    if report.is_empty() {
        log::debug!("Store already seeded");
    }

    state.with_db(|db| {
        if let Err(e) = backup_database(db, &backup_path(&config.data_dir)) {
            log::warn!("Backup failed: {e}");
        }

        let counts: Vec<String> = [
            EntityKind::Organization,
            EntityKind::Contact,
            EntityKind::Deal,
            EntityKind::Project,
            EntityKind::Quotation,
            EntityKind::User,
        ]
        .into_iter()
        .map(|kind| match db.count(kind) {
            Ok(n) => format!("{kind}={n}"),
            Err(_) => format!("{kind}=?"),
        })
        .collect();
        log::info!("Store ready: {}", counts.join(" "));
    });

    let settings = state.settings.snapshot();
    log::info!("Settings: theme={} provider={:?}", settings.theme, settings.provider);
}
