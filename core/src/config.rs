//! Layered configuration for the permit log.
//!
//! Three layers, later ones winning:
//! 1. Defaults (no remote endpoint, the two site projects, XDG data dir)
//! 2. File config (`$PERMIT_LOG_HOME/config.toml`, default `~/.permit-log/config.toml`)
//! 3. Environment overrides (`PERMIT_LOG_*`)
//!
//! An empty `endpoint` at any layer means "not configured": the coordinator
//! then stays local-only and never touches the network.
//!
//! ```toml
//! endpoint = "https://script.google.com/macros/s/.../exec"
//! projects = ["TWS O-16123", "TW O-16124"]
//! default_project = "TWS O-16123"
//! confirm_writes = false
//! request_timeout_ms = 15000
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::local_store::{self, LocalStore, LocalStoreError};
use crate::remote::{HttpGateway, RemoteError};

/// Project partitions available out of the box.
pub const DEFAULT_PROJECTS: [&str; 2] = ["TWS O-16123", "TW O-16124"];

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "PERMIT_LOG";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid endpoint '{value}': {reason}")]
    InvalidEndpoint { value: String, reason: String },

    #[error("invalid value for ${var}: '{value}' (expected: {expected})")]
    InvalidEnvValue {
        var: String,
        value: String,
        expected: String,
    },

    #[error("config validation error: {0}")]
    Validation(String),

    #[error("cannot determine home directory")]
    NoHome,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PermitLogConfig {
    /// Remote sheet endpoint. `None` pins the coordinator to local storage.
    pub endpoint: Option<Url>,
    /// Allowed project partitions, in display order.
    pub projects: Vec<String>,
    /// Project selected at start-up.
    pub default_project: String,
    /// Local storage directory. `None` uses the XDG data directory.
    pub data_dir: Option<PathBuf>,
    /// Where CSV exports are written.
    pub export_dir: PathBuf,
    /// Read publish responses and report confirmed writes.
    pub confirm_writes: bool,
    /// Per-request timeout for remote calls. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for PermitLogConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            projects: DEFAULT_PROJECTS.iter().map(|p| (*p).to_string()).collect(),
            default_project: DEFAULT_PROJECTS[0].to_string(),
            data_dir: None,
            export_dir: PathBuf::from("."),
            confirm_writes: false,
            request_timeout: None,
        }
    }
}

impl PermitLogConfig {
    pub fn is_remote_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn is_known_project(&self, project: &str) -> bool {
        self.projects.iter().any(|p| p == project)
    }

    /// Resolved local storage directory.
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(local_store::default_data_dir)
    }

    pub fn local_store(&self) -> Result<LocalStore, LocalStoreError> {
        match self.resolved_data_dir() {
            Some(dir) => LocalStore::with_base_dir(dir),
            None => Err(LocalStoreError::NoDataDir),
        }
    }

    /// HTTP gateway for the configured endpoint, or `None` when unconfigured.
    pub fn remote_gateway(&self) -> Result<Option<HttpGateway>, RemoteError> {
        let Some(endpoint) = self.endpoint.clone() else {
            return Ok(None);
        };
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Some(
            HttpGateway::with_client(client, endpoint).confirm_writes(self.confirm_writes),
        ))
    }
}

/// Parse an endpoint string. Blank means "not configured".
pub fn parse_endpoint(raw: &str) -> Result<Option<Url>, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidEndpoint {
        value: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(Some(url)),
        other => Err(ConfigError::InvalidEndpoint {
            value: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    endpoint: Option<String>,
    projects: Option<Vec<String>>,
    default_project: Option<String>,
    data_dir: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    confirm_writes: Option<bool>,
    request_timeout_ms: Option<u64>,
}

/// Builder for layered configuration loading.
pub struct ConfigLoader {
    home: Option<PathBuf>,
    config_file: Option<PathBuf>,
    env_prefix: String,
    env_vars: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            home: None,
            config_file: None,
            env_prefix: ENV_PREFIX.to_string(),
            env_vars: None,
        }
    }

    /// Set the home directory that holds `config.toml`.
    ///
    /// If not set, falls back to `$PERMIT_LOG_HOME`, then `~/.permit-log`.
    pub fn with_home(mut self, path: PathBuf) -> Self {
        self.home = Some(path);
        self
    }

    /// Read this file instead of `<home>/config.toml`. Unlike the default
    /// location, an explicit file must exist.
    pub fn with_config_file(mut self, path: PathBuf) -> Self {
        self.config_file = Some(path);
        self
    }

    /// Read overrides from `vars` instead of the process environment.
    pub fn with_env_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.env_vars = Some(vars);
        self
    }

    /// Load configuration with all enabled layers.
    ///
    /// Precedence: default < file < environment.
    pub fn load(self) -> Result<PermitLogConfig, ConfigError> {
        let mut config = PermitLogConfig::default();

        let file_config = match &self.config_file {
            Some(path) => Self::read_file(path)?,
            None => {
                let path = self.resolve_home()?.join(CONFIG_FILE_NAME);
                Self::read_optional_file(&path)?
            }
        };
        Self::merge_file(&mut config, file_config)?;

        self.apply_env_overrides(&mut config)?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn env_var(&self, name: &str) -> Option<String> {
        match &self.env_vars {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    /// Priority: explicit home, `$<PREFIX>_HOME`, `~/.permit-log`.
    fn resolve_home(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.home {
            return Ok(path.clone());
        }
        if let Some(path) = self.env_var(&format!("{}_HOME", self.env_prefix))
            && !path.trim().is_empty()
        {
            return Ok(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join(".permit-log"))
            .ok_or(ConfigError::NoHome)
    }

    fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    fn read_optional_file(path: &Path) -> Result<FileConfig, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("{} not found, using defaults", path.display());
                Ok(FileConfig::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn merge_file(config: &mut PermitLogConfig, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(endpoint) = file.endpoint {
            config.endpoint = parse_endpoint(&endpoint)?;
        }
        if let Some(projects) = file.projects {
            config.projects = projects;
        }
        if let Some(project) = file.default_project {
            config.default_project = project;
        } else if !config.is_known_project(&config.default_project)
            && let Some(first) = config.projects.first()
        {
            config.default_project = first.clone();
        }
        if let Some(dir) = file.data_dir {
            config.data_dir = Some(dir);
        }
        if let Some(dir) = file.export_dir {
            config.export_dir = dir;
        }
        if let Some(confirm) = file.confirm_writes {
            config.confirm_writes = confirm;
        }
        if let Some(ms) = file.request_timeout_ms {
            config.request_timeout = (ms > 0).then_some(Duration::from_millis(ms));
        }
        Ok(())
    }

    fn apply_env_overrides(&self, config: &mut PermitLogConfig) -> Result<(), ConfigError> {
        let prefix = &self.env_prefix;

        // An empty endpoint is meaningful here: it switches the remote off.
        let endpoint_var = format!("{prefix}_ENDPOINT");
        if let Some(value) = self.env_var(&endpoint_var) {
            tracing::debug!("Applying env override: {endpoint_var}={value}");
            config.endpoint = parse_endpoint(&value)?;
        }

        let data_dir_var = format!("{prefix}_DATA_DIR");
        if let Some(value) = self.env_var(&data_dir_var)
            && !value.trim().is_empty()
        {
            tracing::debug!("Applying env override: {data_dir_var}={value}");
            config.data_dir = Some(PathBuf::from(value));
        }

        let project_var = format!("{prefix}_PROJECT");
        if let Some(value) = self.env_var(&project_var)
            && !value.trim().is_empty()
        {
            tracing::debug!("Applying env override: {project_var}={value}");
            config.default_project = value;
        }

        let confirm_var = format!("{prefix}_CONFIRM_WRITES");
        if let Some(value) = self.env_var(&confirm_var) {
            config.confirm_writes = match value.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnvValue {
                        var: confirm_var,
                        value,
                        expected: "true/false, 1/0, yes/no, on/off".to_string(),
                    });
                }
            };
        }

        let timeout_var = format!("{prefix}_TIMEOUT_MS");
        if let Some(value) = self.env_var(&timeout_var) {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    var: timeout_var.clone(),
                    value: value.clone(),
                    expected: "milliseconds as a non-negative integer (0 disables)".to_string(),
                })?;
            config.request_timeout = (ms > 0).then_some(Duration::from_millis(ms));
        }

        Ok(())
    }

    fn validate(config: &PermitLogConfig) -> Result<(), ConfigError> {
        if config.projects.is_empty() {
            return Err(ConfigError::Validation(
                "at least one project must be configured".to_string(),
            ));
        }
        if config.projects.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "project names must not be blank".to_string(),
            ));
        }
        if !config.is_known_project(&config.default_project) {
            return Err(ConfigError::Validation(format!(
                "default project '{}' is not in the project list",
                config.default_project
            )));
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn loader(home: &TempDir) -> ConfigLoader {
        ConfigLoader::new()
            .with_home(home.path().to_path_buf())
            .with_env_vars(HashMap::new())
    }

    #[test]
    fn defaults_are_local_only() {
        let home = TempDir::new().unwrap();
        let config = loader(&home).load().unwrap();
        assert_eq!(config, PermitLogConfig::default());
        assert!(!config.is_remote_configured());
        assert_eq!(config.default_project, "TWS O-16123");
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let home = TempDir::new().unwrap();
        std::fs::write(
            home.path().join("config.toml"),
            r#"
endpoint = "https://example.com/exec"
projects = ["Depot", "Yard"]
confirm_writes = true
request_timeout_ms = 2500
"#,
        )
        .unwrap();

        let config = loader(&home).load().unwrap();
        assert_eq!(
            config.endpoint.as_ref().map(Url::as_str),
            Some("https://example.com/exec")
        );
        assert_eq!(config.projects, vec!["Depot".to_string(), "Yard".to_string()]);
        assert_eq!(config.default_project, "Depot");
        assert!(config.confirm_writes);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn empty_env_endpoint_disables_remote() {
        let home = TempDir::new().unwrap();
        std::fs::write(
            home.path().join("config.toml"),
            "endpoint = \"https://example.com/exec\"\n",
        )
        .unwrap();

        let config = loader(&home)
            .with_env_vars(env(&[("PERMIT_LOG_ENDPOINT", "")]))
            .load()
            .unwrap();
        assert_eq!(config.endpoint, None);
    }

    #[test]
    fn env_overrides_win() {
        let home = TempDir::new().unwrap();
        let config = loader(&home)
            .with_env_vars(env(&[
                ("PERMIT_LOG_ENDPOINT", "http://127.0.0.1:9/exec"),
                ("PERMIT_LOG_PROJECT", "TW O-16124"),
                ("PERMIT_LOG_DATA_DIR", "/tmp/permits"),
                ("PERMIT_LOG_CONFIRM_WRITES", "yes"),
                ("PERMIT_LOG_TIMEOUT_MS", "0"),
            ]))
            .load()
            .unwrap();
        assert!(config.is_remote_configured());
        assert_eq!(config.default_project, "TW O-16124");
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/permits")));
        assert!(config.confirm_writes);
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn invalid_values_are_reported() {
        let home = TempDir::new().unwrap();
        let err = loader(&home)
            .with_env_vars(env(&[("PERMIT_LOG_CONFIRM_WRITES", "maybe")]))
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvValue { .. }));

        let err = loader(&home)
            .with_env_vars(env(&[("PERMIT_LOG_ENDPOINT", "YOUR_APPS_SCRIPT_URL_HERE")]))
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));

        let err = loader(&home)
            .with_env_vars(env(&[("PERMIT_LOG_ENDPOINT", "ftp://example.com/x")]))
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn unknown_default_project_is_rejected() {
        let home = TempDir::new().unwrap();
        let err = loader(&home)
            .with_env_vars(env(&[("PERMIT_LOG_PROJECT", "Elsewhere")]))
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let home = TempDir::new().unwrap();
        let err = loader(&home)
            .with_config_file(home.path().join("missing.toml"))
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn gateway_only_built_when_configured() {
        let config = PermitLogConfig::default();
        assert!(config.remote_gateway().unwrap().is_none());

        let config = PermitLogConfig {
            endpoint: parse_endpoint("https://example.com/exec").unwrap(),
            ..Default::default()
        };
        let gateway = config.remote_gateway().unwrap().unwrap();
        assert_eq!(gateway.endpoint().as_str(), "https://example.com/exec");
    }
}
