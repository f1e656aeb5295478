//! Tool configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/rtransfer/config.toml`
//! - Windows: `%APPDATA%/rtransfer/config.toml`
//!
//! ```toml
//! [[servers]]
//! id = "source"
//! url = "https://source.example.com/artifactory/"
//! access_token = "..."
//!
//! [[servers]]
//! id = "target"
//! url = "https://target.example.com/artifactory/"
//! user = "admin"
//! password = "..."
//!
//! [transfer]
//! properties_diff_enabled = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use rtransfer_client::{DEFAULT_PLUGIN_PATH, ServerDetails};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub servers: Vec<ServerDetails>,

    #[serde(default)]
    pub transfer: TransferSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Replay property changes after the files diff.
    #[serde(default = "default_true")]
    pub properties_diff_enabled: bool,

    /// Path of the transfer plugin below the source server URL.
    #[serde(default = "default_plugin_path")]
    pub plugin_path: String,

    /// Where the state file and failure logs live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_plugin_path() -> String {
    DEFAULT_PLUGIN_PATH.into()
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            properties_diff_enabled: default_true(),
            plugin_path: default_plugin_path(),
            state_dir: None,
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, or from the default location.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_dir()?.join("config.toml"),
        };
        if !path.exists() {
            bail!("no configuration found at {}", path.display());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), servers = config.servers.len(), "configuration loaded");
        Ok(config)
    }

    pub fn server(&self, id: &str) -> anyhow::Result<&ServerDetails> {
        self.servers
            .iter()
            .find(|s| s.id == id)
            .with_context(|| format!("server '{id}' is not configured"))
    }

    /// Configured state directory, or `<config dir>/transfer`.
    pub fn state_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.transfer.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(config_dir()?.join("transfer")),
        }
    }
}

/// Returns the platform-specific configuration directory.
fn config_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home).join(".config").join("rtransfer"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("rtransfer"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/rtransfer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[servers]]
id = "source"
url = "https://source.example.com/artifactory"
access_token = "src-token"

[[servers]]
id = "target"
url = "https://target.example.com/artifactory/"
user = "admin"
password = "secret"

[transfer]
properties_diff_enabled = false
state_dir = "/var/lib/rtransfer"
"#;

    #[test]
    fn parses_servers_and_settings() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.servers.len(), 2);

        let target = config.server("target").unwrap();
        assert_eq!(target.user, "admin");
        assert_eq!(target.password, "secret");
        assert!(target.access_token.is_empty());

        assert!(!config.transfer.properties_diff_enabled);
        assert_eq!(config.transfer.plugin_path, "api/plugins/execute/");
        assert_eq!(config.state_dir().unwrap(), PathBuf::from("/var/lib/rtransfer"));
    }

    #[test]
    fn transfer_table_is_optional() {
        let config: Config = toml::from_str(
            r#"
[[servers]]
id = "source"
url = "https://source/"
"#,
        )
        .unwrap();
        assert!(config.transfer.properties_diff_enabled);
        assert!(config.state_dir().unwrap().ends_with("rtransfer/transfer"));
    }

    #[test]
    fn unknown_server_is_an_error() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let err = config.server("nope").unwrap_err();
        assert!(err.to_string().contains("'nope'"));
    }

    #[test]
    fn load_from_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server("source").unwrap().access_token, "src-token");
    }

    #[test]
    fn missing_file_names_the_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("absent.toml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
