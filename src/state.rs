use std::sync::Arc;

use parking_lot::Mutex;

use crate::auth::CredentialHasher;
use crate::config::SettingsStore;
use crate::db::CrmDb;

/// State shared by every request handler.
///
/// The connection sits behind one mutex; each core operation locks it for the
/// length of its own transaction. Settings have their own read-write lock.
pub struct AppState {
    pub db: Mutex<CrmDb>,
    pub settings: SettingsStore,
    pub hasher: Arc<dyn CredentialHasher>,
}

impl AppState {
    pub fn new(db: CrmDb, settings: SettingsStore, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            db: Mutex::new(db),
            settings,
            hasher,
        }
    }

    /// Run `f` with exclusive use of the connection.
    pub fn with_db<T>(&self, f: impl FnOnce(&CrmDb) -> T) -> T {
        let guard = self.db.lock();
        f(&guard)
    }
}
