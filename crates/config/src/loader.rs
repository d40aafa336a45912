use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use {
    anyhow::Context,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::TidingsConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "tidings.toml",
    "tidings.yaml",
    "tidings.yml",
    "tidings.json",
];

/// Environment variable overriding `api.base_url` after the file is parsed.
pub const API_URL_ENV: &str = "TIDINGS_API_URL";

static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Restrict config discovery (and the default token location) to `path`.
/// Each call replaces the previous override.
pub fn set_config_dir(path: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<TidingsConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut config = parse_config(&substitute_env(&raw), path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./tidings.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/tidings/tidings.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `TidingsConfig::default()` when nothing is found or the
/// file cannot be parsed.
pub fn discover_and_load() -> TidingsConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        let mut config = TidingsConfig::default();
        apply_env_overrides(&mut config);
        return config;
    };

    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            let mut config = TidingsConfig::default();
            apply_env_overrides(&mut config);
            config
        },
    }
}

fn apply_env_overrides(config: &mut TidingsConfig) {
    if let Ok(url) = std::env::var(API_URL_ENV)
        && !url.trim().is_empty()
    {
        config.api.base_url = url;
    }
}

/// When an override is set only that directory is searched.
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return first_existing(&dir);
    }

    first_existing(Path::new(".")).or_else(|| home_config_dir().and_then(|d| first_existing(&d)))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the config directory: override, or `~/.config/tidings/`.
pub fn config_dir() -> Option<PathBuf> {
    config_dir_override().or_else(home_config_dir)
}

/// Returns the data directory: `~/.tidings/`.
pub fn data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".tidings"))
        .unwrap_or_else(|| PathBuf::from(".tidings"))
}

fn home_config_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".config").join("tidings"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<TidingsConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
