use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_SETTINGS_FILE: &str = "interactor.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub debounce_window_ms: u64,
    pub log_filter: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            debounce_window_ms: 300,
            log_filter: "info".into(),
        }
    }
}

impl RuntimeSettings {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }
}

/// Loads settings from `path`, or from `interactor.toml` in the working
/// directory when no path is given and that file exists, then applies
/// environment overrides.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<RuntimeSettings> {
    let mut settings = match path {
        Some(path) => read_settings_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_SETTINGS_FILE);
            if default_path.exists() {
                read_settings_file(default_path)?
            } else {
                RuntimeSettings::default()
            }
        }
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn parse_settings(raw: &str) -> anyhow::Result<RuntimeSettings> {
    toml::from_str(raw).context("invalid runtime settings")
}

fn read_settings_file(path: &Path) -> anyhow::Result<RuntimeSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    parse_settings(&raw).with_context(|| format!("in settings file '{}'", path.display()))
}

fn apply_env_overrides(settings: &mut RuntimeSettings, lookup: impl Fn(&str) -> Option<String>) {
    for key in ["INTERACTOR_DEBOUNCE_MS", "APP__DEBOUNCE_WINDOW_MS"] {
        if let Some(raw) = lookup(key) {
            if let Ok(parsed) = raw.trim().parse::<u64>() {
                settings.debounce_window_ms = parsed;
            }
        }
    }
    for key in ["INTERACTOR_LOG", "APP__LOG_FILTER"] {
        if let Some(filter) = lookup(key) {
            settings.log_filter = filter;
        }
    }
}
