use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine settings, read from `~/.config/slotkeeper/config.toml`.
///
/// ```toml
/// store_root = "/var/lib/slotkeeper"
///
/// [cleanup]
/// grace_days = 7
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Days an account may stay unverified before cleanup removes it.
    #[serde(default = "default_grace_days")]
    pub grace_days: u32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            grace_days: default_grace_days(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_root: default_store_root(),
            cleanup: CleanupConfig::default(),
        }
    }
}

fn default_grace_days() -> u32 {
    7
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn default_store_root() -> PathBuf {
    home_dir().map_or_else(
        || PathBuf::from(".slotkeeper"),
        |home| home.join(".local/share/slotkeeper"),
    )
}

/// Expand a leading `~/` against `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

impl EngineConfig {
    /// Load `~/.config/slotkeeper/config.toml`, or defaults if it does not exist.
    pub fn load_default() -> Result<Self, CoreError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.store_root = expand_home(&config.store_root);
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::Config(format!("cannot create {}: {e}", parent.display())))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, content)
            .map_err(|e| CoreError::Config(format!("cannot write {}: {e}", path.display())))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cleanup.grace_days < 1 {
            return Err(CoreError::Config(
                "cleanup.grace_days must be at least 1".to_owned(),
            ));
        }
        if self.store_root.as_os_str().is_empty() {
            return Err(CoreError::Config("store_root must not be empty".to_owned()));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".config/slotkeeper/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = EngineConfig {
            store_root: dir.path().join("store"),
            cleanup: CleanupConfig { grace_days: 14 },
        };
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "store_root = \"/srv/slotkeeper\"\n").unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.store_root, PathBuf::from("/srv/slotkeeper"));
        assert_eq!(loaded.cleanup.grace_days, 7);
    }

    #[test]
    fn zero_grace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cleanup]\ngrace_days = 0\n").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "store_root = [").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn tilde_paths_are_left_alone_without_prefix() {
        assert_eq!(expand_home(Path::new("/abs/path")), PathBuf::from("/abs/path"));
    }
}
