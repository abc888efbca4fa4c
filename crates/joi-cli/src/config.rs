//! Configuration vault – reads/writes `~/.joi/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Supported AI provider choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Ollama,
    OpenAI,
    Anthropic,
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiProvider::Ollama => write!(f, "ollama"),
            AiProvider::OpenAI => write!(f, "openai"),
            AiProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Persisted user configuration stored in `~/.joi/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chosen AI provider.
    #[serde(default)]
    pub ai_provider: AiProvider,

    /// Active model name (e.g. "llama3").
    #[serde(default = "default_model")]
    pub active_model: String,

    /// Base URL of the Ollama instance.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Display name of the user Joi is assisting.
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Turns replayed into each prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Turns retained on disk.
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,

    /// Per-request completion timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// OpenAI API key (stored as plain text – the config file is written
    /// with owner-only permissions).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub openai_api_key: String,

    /// Anthropic API key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub anthropic_api_key: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("ai_provider", &self.ai_provider)
            .field("active_model", &self.active_model)
            .field("ollama_url", &self.ollama_url)
            .field("user_name", &self.user_name)
            .field("history_window", &self.history_window)
            .field("history_retention", &self.history_retention)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "openai_api_key",
                if self.openai_api_key.is_empty() {
                    &"<not set>"
                } else {
                    &"<redacted>"
                },
            )
            .field(
                "anthropic_api_key",
                if self.anthropic_api_key.is_empty() {
                    &"<not set>"
                } else {
                    &"<redacted>"
                },
            )
            .finish()
    }
}

fn default_model() -> String {
    "llama3".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_user_name() -> String {
    "Juan".to_string()
}
fn default_history_window() -> usize {
    30
}
fn default_history_retention() -> usize {
    joi_memory::history::DEFAULT_RETENTION
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_provider: AiProvider::default(),
            active_model: default_model(),
            ollama_url: default_ollama_url(),
            user_name: default_user_name(),
            history_window: default_history_window(),
            history_retention: default_history_retention(),
            request_timeout_secs: default_request_timeout_secs(),
            openai_api_key: String::new(),
            anthropic_api_key: String::new(),
        }
    }
}

/// Return the path to `~/.joi`.
pub fn joi_dir() -> PathBuf {
    joi_dir_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Return the path to `~/.joi/config.toml`.
pub fn config_path() -> PathBuf {
    joi_dir().join("config.toml")
}

/// Build the joi directory relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn joi_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".joi")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `JOI_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `JOI_OLLAMA_URL` | `ollama_url` |
/// | `JOI_MODEL` | `active_model` |
/// | `JOI_USER` | `user_name` |
/// | `JOI_HISTORY_WINDOW` | `history_window` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("JOI_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Ok(v) = std::env::var("JOI_MODEL") {
        cfg.active_model = v;
    }
    if let Ok(v) = std::env::var("JOI_USER") {
        cfg.user_name = v;
    }
    if let Ok(v) = std::env::var("JOI_HISTORY_WINDOW")
        && let Ok(window) = v.parse::<usize>()
    {
        cfg.history_window = window;
    }
}

/// Save the config to disk, creating `~/.joi/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Write the file with owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_api_keys() {
        let mut cfg = Config::default();
        cfg.openai_api_key = "sk-super-secret".to_string();
        cfg.anthropic_api_key = "ant-super-secret".to_string();
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("sk-super-secret"));
        assert!(!debug_str.contains("ant-super-secret"));
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn config_debug_shows_not_set_for_empty_keys() {
        let cfg = Config::default();
        let debug_str = format!("{:?}", cfg);
        assert!(debug_str.contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = joi_dir_for_home(&dir.path().to_string_lossy()).join("config.toml");

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = joi_dir_for_home(&dir.path().to_string_lossy()).join("config.toml");

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.ai_provider, AiProvider::Ollama);
        assert_eq!(loaded.active_model, "llama3");
        assert_eq!(loaded.user_name, "Juan");
        assert_eq!(loaded.history_window, 30);
        assert_eq!(loaded.history_retention, 200);
    }

    #[test]
    fn joi_dir_points_to_dotfile() {
        let p = joi_dir_for_home("/home/testuser");
        assert!(p.to_string_lossy().ends_with(".joi"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = joi_dir_for_home(&dir.path().to_string_lossy()).join("config.toml");
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_config_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = joi_dir_for_home(&dir.path().to_string_lossy()).join("config.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "active_model = \"mistral\"\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.active_model, "mistral");
        assert_eq!(loaded.history_window, 30);
    }

    #[test]
    fn apply_env_overrides_changes_model_and_user() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe {
            std::env::set_var("JOI_MODEL", "mistral");
            std::env::set_var("JOI_USER", "Ana");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.active_model, "mistral");
        assert_eq!(cfg.user_name, "Ana");
        unsafe {
            std::env::remove_var("JOI_MODEL");
            std::env::remove_var("JOI_USER");
        }
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_window() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("JOI_HISTORY_WINDOW", "muchos") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.history_window, 30);
        unsafe { std::env::remove_var("JOI_HISTORY_WINDOW") };
    }
}
