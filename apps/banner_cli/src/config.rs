use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::{DEFAULT_LOCALE, DEFAULT_ROTATION_INTERVAL_MS};

pub const DEFAULT_CONFIG_FILE: &str = "banner.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rotation_interval_ms: i64,
    pub locale: String,
    pub run_seconds: u64,
    pub json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rotation_interval_ms: DEFAULT_ROTATION_INTERVAL_MS,
            locale: DEFAULT_LOCALE.into(),
            run_seconds: 12,
            json: false,
        }
    }
}

/// Keys accepted in the settings file; anything left out keeps its default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    rotation_interval_ms: Option<i64>,
    locale: Option<String>,
    run_seconds: Option<u64>,
    json: Option<bool>,
}

/// Defaults, then the settings file, then `APP__*` environment variables.
///
/// An explicitly requested file must exist; the default `banner.toml` is
/// optional.
pub fn load_settings(explicit: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(&path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?,
        Err(error) if explicit.is_some() => {
            return Err(error)
                .with_context(|| format!("failed to read settings file '{}'", path.display()));
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file.rotation_interval_ms {
        settings.rotation_interval_ms = v;
    }
    if let Some(v) = file.locale {
        settings.locale = v;
    }
    if let Some(v) = file.run_seconds {
        settings.run_seconds = v;
    }
    if let Some(v) = file.json {
        settings.json = v;
    }
    Ok(())
}

fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("APP__ROTATION_INTERVAL_MS") {
        settings.rotation_interval_ms = v
            .trim()
            .parse()
            .with_context(|| format!("APP__ROTATION_INTERVAL_MS is not an integer: '{v}'"))?;
    }
    if let Some(v) = lookup("APP__LOCALE") {
        settings.locale = v;
    }
    if let Some(v) = lookup("APP__RUN_SECONDS") {
        settings.run_seconds = v
            .trim()
            .parse()
            .with_context(|| format!("APP__RUN_SECONDS is not a whole number: '{v}'"))?;
    }
    if let Some(v) = lookup("APP__JSON") {
        settings.json = matches!(v.trim(), "1" | "true" | "yes");
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
