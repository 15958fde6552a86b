use ocsp_proto::{HashAlgorithm, OcspConfig, OcspError, TrustModel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] OcspError),
}

/// Configuration file for the `ocsp-check` tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[serde(default)]
    pub log_level: Option<String>,

    /// OCSP client settings
    #[serde(default)]
    pub ocsp: OcspConfig,
}

impl CliConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: CliConfig = serde_json::from_str(&contents)?;
        config.ocsp.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Example configuration written by `--write-example`
    pub fn example() -> Self {
        Self {
            log_level: Some("info".to_string()),
            ocsp: OcspConfig {
                hash_algorithm: HashAlgorithm::Sha256,
                nonce_required: false,
                use_get_for_small_requests: false,
                trust: TrustModel::IssuerOrDelegated,
                ..OcspConfig::default()
            },
        }
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}
