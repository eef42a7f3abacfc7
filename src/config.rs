use crate::candidates::CandidateRule;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SHELLS_FILE: &str = "/etc/shells";
pub const DEFAULT_ACCOUNTS_FILE: &str = "/etc/passwd";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0:?}")]
    NotFound(PathBuf),
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How a single `su` conversation is driven and classified
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub su_binary: String,
    pub check_command: String,
    pub password_prompt: String,
    pub prompt_marker: String,
    pub failure_message: String,
    pub timeout_seconds: u64,
    /// Treat output collected before the child exits as the captured text
    /// when the prompt marker never appears.
    pub accept_output_on_exit: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            su_binary: "su".to_string(),
            check_command: "whoami".to_string(),
            password_prompt: "Password:".to_string(),
            prompt_marker: "%".to_string(),
            failure_message: "su: Authentication failure".to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            accept_output_on_exit: false,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub shells_file: PathBuf,
    pub accounts_file: PathBuf,
    pub max_concurrent_probes: Option<usize>,
    pub log_level: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            shells_file: PathBuf::from(DEFAULT_SHELLS_FILE),
            accounts_file: PathBuf::from(DEFAULT_ACCOUNTS_FILE),
            max_concurrent_probes: None,
            log_level: None,
        }
    }
}

impl GlobalConfig {
    /// Size of the run-wide worker pool bounding live `su` sessions
    pub fn worker_count(&self) -> usize {
        self.max_concurrent_probes
            .unwrap_or_else(|| num_cpus::get() * 4)
            .max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    pub rules: Vec<CandidateRule>,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        CandidateConfig {
            rules: CandidateRule::defaults(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub global: GlobalConfig,
    pub probe: ProbeConfig,
    pub candidates: CandidateConfig,
}

/// Values given on the command line that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub shells_file: Option<PathBuf>,
    pub accounts_file: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
    pub workers: Option<usize>,
}

impl AuditConfig {
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(path) = &overrides.shells_file {
            self.global.shells_file = path.clone();
        }
        if let Some(path) = &overrides.accounts_file {
            self.global.accounts_file = path.clone();
        }
        if let Some(timeout) = overrides.timeout_seconds {
            self.probe.timeout_seconds = timeout;
        }
        if let Some(workers) = overrides.workers {
            self.global.max_concurrent_probes = Some(workers);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("timeout_seconds must be greater than zero".to_string()));
        }
        if self.probe.password_prompt.is_empty() || self.probe.prompt_marker.is_empty() {
            return Err(ConfigError::Invalid("password_prompt and prompt_marker must not be empty".to_string()));
        }
        if self.probe.su_binary.is_empty() {
            return Err(ConfigError::Invalid("su_binary must not be empty".to_string()));
        }
        if self.global.max_concurrent_probes == Some(0) {
            return Err(ConfigError::Invalid("max_concurrent_probes must be at least 1".to_string()));
        }
        if self.candidates.rules.is_empty() {
            return Err(ConfigError::Invalid("at least one candidate rule is required".to_string()));
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<AuditConfig, ConfigError> {
    match path {
        Some(config_path) => {
            if !config_path.exists() {
                return Err(ConfigError::NotFound(config_path.to_path_buf()));
            }

            let config_content = fs::read_to_string(config_path)?;
            let config: AuditConfig = serde_json::from_str(&config_content)?;
            debug!("Loaded configuration from {config_path:?}");
            Ok(config)
        }
        None => {
            debug!("No config file provided, using default configuration");
            Ok(AuditConfig::default())
        }
    }
}

/// Load the optional config file, apply command-line overrides and validate
pub fn resolve_config(path: Option<&Path>, overrides: &Overrides) -> Result<AuditConfig, ConfigError> {
    let config = load_config(path)?.with_overrides(overrides);
    config.validate()?;
    Ok(config)
}
