//! Runtime configuration.
//!
//! `AppConfig` is resolved once at startup from `DEALDESK_*` environment
//! variables. `Settings` is the user-editable JSON document (theme and AI
//! provider knobs) and lives behind `SettingsStore`, a single read-write lock:
//! readers take a snapshot copy, writers hold the lock only while applying a
//! change and persisting it.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::seed::SeedOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write settings {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

// =============================================================================
// Process configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub settings_path: PathBuf,
    /// Run the first-start bootstrap (admin user, default pipeline, demo data).
    pub seed: bool,
    pub seed_options: SeedOptions,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
        Ok(Self::from_lookup(&home, |key| std::env::var(key).ok()))
    }

    /// Resolve against an arbitrary variable source; blank values count as unset.
    pub fn from_lookup<F>(home: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = var("DEALDESK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".dealdesk"));
        let db_path = var("DEALDESK_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("dealdesk.db"));
        let settings_path = var("DEALDESK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("config.json"));
        let seed = var("DEALDESK_SEED")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);

        let defaults = SeedOptions::default();
        let seed_options = SeedOptions {
            admin_email: var("DEALDESK_ADMIN_EMAIL")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.admin_email),
            admin_password: var("DEALDESK_ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            admin_name: var("DEALDESK_ADMIN_NAME").unwrap_or(defaults.admin_name),
            demo_data: defaults.demo_data,
        };

        Self {
            data_dir,
            db_path,
            settings_path,
            seed,
            seed_options,
        }
    }
}

// =============================================================================
// User settings
// =============================================================================

pub const THEMES: &[&str] = &["sand", "ocean", "forest", "graphite", "rose"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: String,
    pub provider: Provider,
    pub openai_key: String,
    pub anthropic_key: String,
    pub ollama_base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub verbose: bool,
    pub use_ansi: bool,
    pub auto_summary: bool,
    pub ollama_header_timeout_seconds: u32,
    pub ollama_overall_timeout_seconds: u32,
    pub ollama_max_attempts: u32,
    pub ollama_backoff_base_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "sand".to_string(),
            provider: Provider::OpenAi,
            openai_key: String::new(),
            anthropic_key: String::new(),
            ollama_base_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 400,
            temperature: 0.4,
            verbose: false,
            use_ansi: true,
            auto_summary: true,
            ollama_header_timeout_seconds: 10,
            ollama_overall_timeout_seconds: 180,
            ollama_max_attempts: 5,
            ollama_backoff_base_ms: 0,
        }
    }
}

/// Lower-cased theme name, or `sand` for anything unknown.
pub fn normalize_theme(value: &str) -> String {
    let theme = value.trim().to_lowercase();
    if THEMES.contains(&theme.as_str()) {
        theme
    } else {
        "sand".to_string()
    }
}

impl Settings {
    /// Read settings from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let mut settings: Settings = serde_json::from_str(&content)?;
        settings.normalize();
        Ok(settings)
    }

    /// Write settings as pretty JSON, readable only by the owner.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(write_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(write_err)?;
        }
        Ok(())
    }

    /// Replace blank or zero values with defaults.
    pub fn normalize(&mut self) {
        let defaults = Settings::default();
        self.theme = normalize_theme(&self.theme);
        if self.ollama_base_url.trim().is_empty() {
            self.ollama_base_url = defaults.ollama_base_url;
        }
        if self.model.trim().is_empty() {
            self.model = defaults.model;
        }
        if self.max_tokens == 0 {
            self.max_tokens = defaults.max_tokens;
        }
        if self.temperature == 0.0 {
            self.temperature = defaults.temperature;
        }
        if self.ollama_header_timeout_seconds == 0 {
            self.ollama_header_timeout_seconds = defaults.ollama_header_timeout_seconds;
        }
        if self.ollama_overall_timeout_seconds == 0 {
            self.ollama_overall_timeout_seconds = defaults.ollama_overall_timeout_seconds;
        }
        if self.ollama_max_attempts == 0 {
            self.ollama_max_attempts = defaults.ollama_max_attempts;
        }

        // Cloud-hosted Ollama models start slowly
        if self.provider == Provider::Ollama && self.model.contains(":cloud") {
            self.ollama_header_timeout_seconds = self.ollama_header_timeout_seconds.max(15);
            self.ollama_overall_timeout_seconds = self.ollama_overall_timeout_seconds.max(180);
        }
    }

    /// Settings as shown to clients: keys are reported as present or absent.
    pub fn public_view(&self) -> SettingsView {
        SettingsView {
            theme: self.theme.clone(),
            provider: self.provider,
            model: self.model.clone(),
            ollama_base_url: self.ollama_base_url.clone(),
            ollama_header_timeout_seconds: self.ollama_header_timeout_seconds,
            ollama_overall_timeout_seconds: self.ollama_overall_timeout_seconds,
            ollama_max_attempts: self.ollama_max_attempts,
            ollama_backoff_base_ms: self.ollama_backoff_base_ms,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            verbose: self.verbose,
            use_ansi: self.use_ansi,
            auto_summary: self.auto_summary,
            has_openai_key: !self.openai_key.is_empty(),
            has_anthropic_key: !self.anthropic_key.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsView {
    pub theme: String,
    pub provider: Provider,
    pub model: String,
    pub ollama_base_url: String,
    pub ollama_header_timeout_seconds: u32,
    pub ollama_overall_timeout_seconds: u32,
    pub ollama_max_attempts: u32,
    pub ollama_backoff_base_ms: u32,
    pub max_tokens: u32,
    pub temperature: f64,
    pub verbose: bool,
    pub use_ansi: bool,
    pub auto_summary: bool,
    pub has_openai_key: bool,
    pub has_anthropic_key: bool,
}

/// Partial settings update. Absent, blank and non-positive values leave the
/// current setting alone; explicit numbers for the Ollama knobs always apply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub theme: Option<String>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub ollama_base_url: Option<String>,
    pub ollama_header_timeout_seconds: Option<u32>,
    pub ollama_overall_timeout_seconds: Option<u32>,
    pub ollama_max_attempts: Option<u32>,
    pub ollama_backoff_base_ms: Option<u32>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub verbose: Option<bool>,
    pub use_ansi: Option<bool>,
    pub auto_summary: Option<bool>,
    pub openai_key: Option<String>,
    pub anthropic_key: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl SettingsPatch {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(theme) = non_blank(&self.theme) {
            settings.theme = normalize_theme(theme);
        }
        if let Some(provider) = self.provider {
            settings.provider = provider;
        }
        if let Some(model) = non_blank(&self.model) {
            settings.model = model.to_string();
        }
        if let Some(url) = non_blank(&self.ollama_base_url) {
            settings.ollama_base_url = url.to_string();
        }
        if let Some(v) = self.ollama_header_timeout_seconds {
            settings.ollama_header_timeout_seconds = v;
        }
        if let Some(v) = self.ollama_overall_timeout_seconds {
            settings.ollama_overall_timeout_seconds = v;
        }
        if let Some(v) = self.ollama_max_attempts {
            settings.ollama_max_attempts = v;
        }
        if let Some(v) = self.ollama_backoff_base_ms {
            settings.ollama_backoff_base_ms = v;
        }
        if let Some(v) = self.max_tokens.filter(|v| *v > 0) {
            settings.max_tokens = v;
        }
        if let Some(v) = self.temperature.filter(|v| *v > 0.0) {
            settings.temperature = v;
        }
        if let Some(v) = self.verbose {
            settings.verbose = v;
        }
        if let Some(v) = self.use_ansi {
            settings.use_ansi = v;
        }
        if let Some(v) = self.auto_summary {
            settings.auto_summary = v;
        }
        if let Some(key) = non_blank(&self.openai_key) {
            settings.openai_key = key.to_string();
        }
        if let Some(key) = non_blank(&self.anthropic_key) {
            settings.anthropic_key = key.to_string();
        }
    }
}

/// Current settings behind one read-write lock, persisted on every update.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf, settings: Settings) -> Self {
        Self {
            path,
            current: RwLock::new(settings),
        }
    }

    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        let settings = Settings::load(&path)?;
        Ok(Self::new(path, settings))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.current.read().clone()
    }

    /// Apply `f` and persist under the write lock. On a failed write the
    /// in-memory settings are left unchanged.
    pub fn update<F>(&self, f: F) -> Result<Settings, ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.current.write();
        let mut next = guard.clone();
        f(&mut next);
        next.save(&self.path)?;
        *guard = next.clone();
        Ok(next)
    }

    pub fn apply_patch(&self, patch: &SettingsPatch) -> Result<Settings, ConfigError> {
        self.update(|settings| patch.apply(settings))
    }
}
