use directories::ProjectDirs;
use doc_model::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use doc_model::{SignerConfig, SignerProfile};

const CONFIG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("config schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigEnvelope {
    version: u32,
    config: SignerConfig,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "Countersign", "Countersign")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("signer.json")
    }

    /// Stored config, or defaults when nothing has been saved yet.
    pub fn load_config(&self) -> Result<SignerConfig, StorageError> {
        let path = self.config_path();
        if !path.exists() {
            log::debug!("no signer config at {}, using defaults", path.display());
            return Ok(SignerConfig::default());
        }

        let bytes = fs::read(&path)?;
        let envelope: ConfigEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > CONFIG_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: envelope.version,
                supported: CONFIG_SCHEMA_VERSION,
            });
        }

        Ok(envelope.config)
    }

    /// Stored config with the `COUNTERSIGN_*` environment overrides applied.
    pub fn load_effective_config(&self) -> Result<SignerConfig, StorageError> {
        Ok(self.load_config()?.with_env_overrides()?)
    }

    pub fn save_config(&self, config: &SignerConfig) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope = ConfigEnvelope { version: CONFIG_SCHEMA_VERSION, config: config.clone() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.config_path(), bytes)?;
        log::debug!("saved signer config to {}", self.config_path().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{ENV_FIELD_WIDTH, ENV_SIGNER_NAME};
    use serial_test::serial;

    #[test]
    fn config_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        let config = SignerConfig::default()
            .with_signer_name("Ada Lovelace")
            .with_field_size(180.0, 60.0)
            .with_require_complete(false);

        store.save_config(&config).expect("save should succeed");
        let loaded = store.load_config().expect("load should succeed");

        assert_eq!(loaded, config);
    }

    #[test]
    fn load_defaults_when_file_absent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        let loaded = store.load_config().expect("load should succeed");
        assert_eq!(loaded, SignerConfig::default());
    }

    #[test]
    fn missing_keys_take_defaults() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());
        fs::write(store.config_path(), r#"{"version":1,"config":{"profile":{"name":"Ada"}}}"#)
            .expect("write should succeed");

        let loaded = store.load_config().expect("load should succeed");

        assert_eq!(loaded, SignerConfig::default().with_signer_name("Ada"));
    }

    #[test]
    fn newer_schema_is_rejected() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());
        fs::write(store.config_path(), r#"{"version":7,"config":{}}"#)
            .expect("write should succeed");

        let err = store.load_config().expect_err("future schema should fail");
        assert!(matches!(err, StorageError::UnsupportedVersion { found: 7, supported: 1 }));
    }

    #[test]
    #[serial]
    fn environment_overrides_stored_config() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());
        store
            .save_config(&SignerConfig::default().with_signer_name("Stored Name"))
            .expect("save should succeed");

        std::env::set_var(ENV_SIGNER_NAME, "Env Name");
        std::env::set_var(ENV_FIELD_WIDTH, "250");
        let loaded = store.load_effective_config();
        std::env::remove_var(ENV_SIGNER_NAME);
        std::env::remove_var(ENV_FIELD_WIDTH);

        let loaded = loaded.expect("load should succeed");
        assert_eq!(loaded.profile.name, "Env Name");
        assert_eq!(loaded.field_size(), (250.0, 100.0));
    }

    #[test]
    #[serial]
    fn invalid_environment_value_is_an_error() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        std::env::set_var(ENV_FIELD_WIDTH, "wide");
        let result = store.load_effective_config();
        std::env::remove_var(ENV_FIELD_WIDTH);

        assert!(matches!(result, Err(StorageError::Config(_))));
    }
}
