// Policy configuration loading
// All verification thresholds live here, not at call sites

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::mfa::anomaly::AnomalyConfig;
use crate::mfa::backup_codes::BackupCodeConfig;
use crate::mfa::lockout::LockoutConfig;
use crate::mfa::totp::TotpConfig;

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "failed to read config file: {}", msg),
            ConfigError::Parse(msg) => write!(f, "failed to parse YAML config: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Verification policy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MfaConfig {
    pub totp: TotpConfig,
    pub lockout: LockoutConfig,
    pub backup_codes: BackupCodeConfig,
    pub anomaly: AnomalyConfig,
}

impl MfaConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.totp.time_step == 0 {
            return Err(ConfigError::Invalid(
                "totp.time_step must be at least 1 second".to_string(),
            ));
        }
        if !(6..=8).contains(&self.totp.digits) {
            return Err(ConfigError::Invalid(
                "totp.digits must be between 6 and 8".to_string(),
            ));
        }
        if self.totp.skew > 2 {
            return Err(ConfigError::Invalid(
                "totp.skew above 2 steps defeats the point of a time-based code".to_string(),
            ));
        }
        if self.lockout.max_failed_attempts == 0 {
            return Err(ConfigError::Invalid(
                "lockout.max_failed_attempts must be at least 1".to_string(),
            ));
        }
        if self.lockout.lockout_minutes < 1 {
            return Err(ConfigError::Invalid(
                "lockout.lockout_minutes must be at least 1".to_string(),
            ));
        }
        if self.backup_codes.count == 0 || self.backup_codes.count > 20 {
            return Err(ConfigError::Invalid(
                "backup_codes.count must be between 1 and 20".to_string(),
            ));
        }
        if self.backup_codes.code_length < 6 || self.backup_codes.code_length > 32 {
            return Err(ConfigError::Invalid(
                "backup_codes.code_length must be between 6 and 32".to_string(),
            ));
        }
        if self.anomaly.failed_medium > self.anomaly.failed_high {
            return Err(ConfigError::Invalid(
                "anomaly.failed_medium must not exceed anomaly.failed_high".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load policy configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MfaConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading MFA policy configuration from: {}", path.display());

    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("'{}': {}", path.display(), e)))?;

    let config: MfaConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

    config.validate()?;
    Ok(config)
}

/// Load policy configuration with fallback options: the `MFA_CONFIG_PATH`
/// environment variable, then conventional file names, then defaults.
pub fn load_config_with_fallback() -> MfaConfig {
    if let Ok(config_path) = std::env::var("MFA_CONFIG_PATH") {
        match load_config(&config_path) {
            Ok(config) => return config,
            Err(e) => warn!(
                "Failed to load config from MFA_CONFIG_PATH ({}): {}",
                config_path, e
            ),
        }
    }

    for path in ["mfa.yaml", "mfa.yml"] {
        if Path::new(path).exists() {
            match load_config(path) {
                Ok(config) => return config,
                Err(e) => warn!("Failed to load config from '{}': {}", path, e),
            }
        }
    }

    info!("No MFA policy configuration found, using defaults");
    MfaConfig::default()
}
