//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::audit::{DEFAULT_PAGE_SIZE, MIN_RETENTION_YEARS};
use crate::domain::compliance::RetryPolicy;
use crate::domain::compliance::retry::{
    DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS,
};
use crate::domain::keys::{KdfParams, MasterKey};
use crate::infrastructure::keys::keyring::DEFAULT_KEYRING_SERVICE;
use crate::storage::{DatabaseConfig, default_database_path};

/// Overrides the configuration directory
pub const CONFIG_DIR_ENV: &str = "CAREVAULT_CONFIG_DIR";
/// Base64 master material used to seed key version 1
pub const MASTER_KEY_ENV: &str = "CAREVAULT_MASTER_KEY";
/// Overrides `ledger.path`
pub const LEDGER_PATH_ENV: &str = "CAREVAULT_LEDGER_PATH";

/// Lowest Argon2 memory cost accepted from configuration (KiB)
const MIN_KDF_MEMORY_KIB: u32 = 19_456;
const MIN_KDF_ITERATIONS: u32 = 2;

/// CareVault configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Where key versions are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// OS credential store
    Keyring,
    /// Process memory only; keys are lost on exit
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Only ever present to be rejected; material comes from the environment
    #[serde(skip_serializing)]
    pub master_key: Option<String>,
    pub source: KeySource,
    pub keyring_service: String,
    pub kdf_memory_kib: u32,
    pub kdf_iterations: u32,
    pub kdf_parallelism: u32,
    /// Cadence for the external rotation scheduler
    pub rotation_interval_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite file; defaults to `<config dir>/carevault/ledger.db`
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    pub retention_years: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for KeysConfig {
    fn default() -> Self {
        let kdf = KdfParams::default();
        Self {
            master_key: None,
            source: KeySource::Keyring,
            keyring_service: DEFAULT_KEYRING_SERVICE.to_string(),
            kdf_memory_kib: kdf.memory_kib,
            kdf_iterations: kdf.iterations,
            kdf_parallelism: kdf.parallelism,
            rotation_interval_days: 90,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
            retention_years: MIN_RETENTION_YEARS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl KeysConfig {
    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.master_key.is_some() {
            return Err(anyhow!(
                "Master key material must be provided via {}, not stored in configuration",
                MASTER_KEY_ENV
            ));
        }
        Ok(())
    }
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        Self::config_dir_with(process_env)
    }

    pub(crate) fn config_dir_with(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<PathBuf> {
        let dir = if let Some(custom_dir) = lookup(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("carevault")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, or defaults if the file doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            // Return default config without creating file
            Ok(Config::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.keys.enforce_env_only()?;

        if self.keys.kdf_memory_kib < MIN_KDF_MEMORY_KIB {
            return Err(anyhow!(
                "keys.kdf_memory_kib must be at least {}",
                MIN_KDF_MEMORY_KIB
            ));
        }
        if self.keys.kdf_iterations < MIN_KDF_ITERATIONS {
            return Err(anyhow!(
                "keys.kdf_iterations must be at least {}",
                MIN_KDF_ITERATIONS
            ));
        }
        if self.keys.kdf_parallelism == 0 {
            return Err(anyhow!("keys.kdf_parallelism must be at least 1"));
        }
        if self.keys.rotation_interval_days == 0 {
            return Err(anyhow!("keys.rotation_interval_days must be at least 1"));
        }
        if self.keys.source == KeySource::Keyring && self.keys.keyring_service.trim().is_empty() {
            return Err(anyhow!("keys.keyring_service must not be empty"));
        }

        if self.ledger.retention_years < MIN_RETENTION_YEARS {
            return Err(anyhow!(
                "ledger.retention_years must be at least {}",
                MIN_RETENTION_YEARS
            ));
        }
        if self.ledger.max_connections == 0 {
            return Err(anyhow!("ledger.max_connections must be at least 1"));
        }
        if self.ledger.page_size == 0 {
            return Err(anyhow!("ledger.page_size must be at least 1"));
        }

        if self.audit.max_attempts == 0 {
            return Err(anyhow!("audit.max_attempts must be at least 1"));
        }
        if self.audit.max_backoff_ms < self.audit.initial_backoff_ms {
            return Err(anyhow!(
                "audit.max_backoff_ms must not be below audit.initial_backoff_ms"
            ));
        }

        Ok(())
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams::new(
            self.keys.kdf_memory_kib,
            self.keys.kdf_iterations,
            self.keys.kdf_parallelism,
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.audit.max_attempts,
            Duration::from_millis(self.audit.initial_backoff_ms),
            Duration::from_millis(self.audit.max_backoff_ms),
        )
    }

    /// Ledger database path: environment, then config, then the default
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path_with(process_env)
    }

    pub(crate) fn ledger_path_with(&self, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
        lookup(LEDGER_PATH_ENV)
            .map(PathBuf::from)
            .or_else(|| self.ledger.path.clone())
            .unwrap_or_else(default_database_path)
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::with_path(self.ledger_path()).max_connections(self.ledger.max_connections)
    }

    /// Master material supplied through the environment, if any
    pub fn master_key_material(&self) -> anyhow::Result<Option<MasterKey>> {
        self.master_key_material_with(process_env)
    }

    pub(crate) fn master_key_material_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Option<MasterKey>> {
        self.keys.enforce_env_only()?;

        lookup(MASTER_KEY_ENV)
            .map(|encoded| {
                let encoded = zeroize::Zeroizing::new(encoded);
                MasterKey::from_base64(encoded.trim())
                    .with_context(|| format!("Invalid {}", MASTER_KEY_ENV))
            })
            .transpose()
    }
}
