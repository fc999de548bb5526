//! Reading and writing `maiguru.toml`

use crate::error::{Error, Result};
use regex::{Captures, Regex};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::Config;

pub const CONFIG_FILENAME: &str = "maiguru.toml";

/// Overrides the upward search for `maiguru.toml`
pub const CONFIG_PATH_ENV: &str = "MAIGURU_CONFIG";

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("static pattern")
});

/// Load configuration from maiguru.toml
pub fn load_config() -> Result<Config> {
    let config_path = find_config_file()?;
    load_config_from_path(&config_path)
}

/// Load configuration, falling back to defaults when no file exists
pub fn load_config_or_default() -> Result<Config> {
    match load_config() {
        Err(Error::ConfigNotFound) => Ok(Config::default()),
        other => other,
    }
}

pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path).map_err(|_| Error::ConfigNotFound)?;
    Ok(toml::from_str(&interpolate_env_vars(&raw))?)
}

/// Save configuration to a specific path
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

/// `$MAIGURU_CONFIG` if set, otherwise the nearest `maiguru.toml` walking up
/// from the working directory.
fn find_config_file() -> Result<PathBuf> {
    locate_config(env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
}

/// An explicit path must exist; only the upward search may come up empty.
fn locate_config(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "{} points to {}, which does not exist",
                CONFIG_PATH_ENV,
                path.display()
            )));
        }
        return Ok(path);
    }

    let cwd = env::current_dir().map_err(|e| Error::Config(e.to_string()))?;
    cwd.ancestors()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .find(|candidate| candidate.is_file())
        .ok_or(Error::ConfigNotFound)
}

/// Expands `${NAME}` and `${NAME:-fallback}`. Unset names without a fallback
/// become empty.
fn interpolate_env_vars(content: &str) -> String {
    ENV_REFERENCE
        .replace_all(content, |caps: &Captures| {
            let fallback = caps.get(2).map_or("", |m| m.as_str());
            env::var(&caps[1]).unwrap_or_else(|_| fallback.to_owned())
        })
        .into_owned()
}

/// Starter file written by `maiguru init`
pub fn default_config_content() -> &'static str {
    r#"# Mai-Guru client configuration

[api]
base_url = "${MAIGURU_API_URL:-http://localhost:8000}"
timeout_secs = 30

[storage]
# Credentials (access + refresh token) are kept here between runs
path = ".maiguru/credentials.json"

[session]
# Set to true when the backend rotates refresh tokens on every refresh
adopt_rotated_refresh_token = false

# Where each role lands after login, and where unauthenticated visitors go
[routes]
login = "/auth"
return_param = "redirect"
admin = "/admin/dashboard"
client = "/client/dashboard"
expert = "/expert/dashboard"
"#
}
