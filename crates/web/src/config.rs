//! Web server configuration

use inplace_common::Locale;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// HTTP listen address
    pub listen: SocketAddr,

    /// SQLite database path
    pub db_path: PathBuf,

    /// Locale used when a request carries no usable Accept-Language
    pub default_locale: Locale,

    /// Expose fixture seeding for end-to-end runs
    pub test_mode: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: inplace_common::default_db_path(),
            default_locale: Locale::english(),
            test_mode: false,
        }
    }
}

impl WebConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `INPLACE_*` environment overrides
    pub fn with_env(self) -> anyhow::Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = non_empty("INPLACE_WEB_ADDR") {
            self.listen = addr.trim().parse()?;
        }
        if let Some(path) = non_empty("INPLACE_DB_PATH") {
            self.db_path = PathBuf::from(path.trim());
        }
        if let Some(locale) = non_empty("INPLACE_DEFAULT_LOCALE") {
            self.default_locale = Locale::parse(&locale)?;
        }
        if let Some(flag) = non_empty("INPLACE_E2E_TEST_MODE") {
            self.test_mode = matches!(flag.trim(), "1" | "true" | "yes");
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = WebConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.listen.port(), 8080);
        assert!(!cfg.test_mode);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("web.toml");
        let cfg = WebConfig {
            default_locale: Locale::parse("de").unwrap(),
            test_mode: true,
            ..WebConfig::default()
        };
        cfg.save(&path).unwrap();

        let loaded = WebConfig::load(&path).unwrap();
        assert_eq!(loaded.default_locale.language, "de");
        assert!(loaded.test_mode);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let cfg: WebConfig = toml::from_str("test_mode = true\n").unwrap();
        assert!(cfg.test_mode);
        assert_eq!(cfg.default_locale, Locale::english());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("INPLACE_WEB_ADDR", "127.0.0.1:9123"),
            ("INPLACE_DEFAULT_LOCALE", "de_DE"),
            ("INPLACE_E2E_TEST_MODE", "1"),
            ("INPLACE_DB_PATH", " "),
        ]
        .into_iter()
        .collect();

        let cfg = WebConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.listen.port(), 9123);
        assert_eq!(cfg.default_locale.canonical(), "de_DE");
        assert!(cfg.test_mode);
        assert_eq!(cfg.db_path, inplace_common::default_db_path());
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let result = WebConfig::default().with_overrides(|k| {
            (k == "INPLACE_WEB_ADDR").then(|| "not-an-address".to_string())
        });
        assert!(result.is_err());
    }
}
