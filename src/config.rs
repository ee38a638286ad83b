use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;

/// Name of the secrets file looked up next to the working directory.
pub const CONFIG_FILE_NAME: &str = "minerwatch.toml";

/// Default ledger file, resolved next to the secrets file.
fn default_ledger_path() -> PathBuf {
    PathBuf::from("minerwatch.db")
}

fn default_mail_command() -> String {
    "sendmail -t".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0} (copy minerwatch.toml.example to create it)")]
    Missing(PathBuf),
    #[error("Failed to read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Login for the CloudAtCost wallet panel.
#[derive(Debug, Deserialize)]
pub struct CloudAtCostConfig {
    pub username: String,
    pub password: SecretString,

    /// Base32 TOTP seed. Only set when the account has 2FA enabled.
    #[serde(default)]
    pub code_2fa: Option<SecretString>,

    /// Override for the panel URL (tests point this at a mock server).
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub goal_usd: Option<Decimal>,
    #[serde(default)]
    pub goal_btc: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EthermineConfig {
    /// Wallet address the pool pays out to.
    pub address: String,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub goal_usd: Option<Decimal>,
    #[serde(default)]
    pub goal_eth: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,

    /// Command the rendered message is piped into.
    #[serde(default = "default_mail_command")]
    pub command: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            command: default_mail_command(),
        }
    }
}

/// Contents of the secrets file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Path to the ledger database. If relative, resolved from the config
    /// file location.
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    #[serde(default)]
    pub cloudatcost: Option<CloudAtCostConfig>,

    #[serde(default)]
    pub ethermine: Option<EthermineConfig>,

    #[serde(default)]
    pub mail: MailConfig,
}

impl Config {
    /// Load config from a TOML file. A missing file is an error: nothing can
    /// be polled without credentials.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the ledger path against the directory holding the config.
    pub fn resolve_ledger_path(&self, config_dir: &Path) -> PathBuf {
        if self.ledger_path.is_absolute() {
            self.ledger_path.clone()
        } else {
            config_dir.join(&self.ledger_path)
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub ledger_path: PathBuf,
    pub cloudatcost: Option<CloudAtCostConfig>,
    pub ethermine: Option<EthermineConfig>,
    pub mail: MailConfig,
}

impl ResolvedConfig {
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let config = Config::load(config_path)?;
        let config_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        Ok(Self {
            ledger_path: config.resolve_ledger_path(config_dir),
            cloudatcost: config.cloudatcost,
            ethermine: config.ethermine,
            mail: config.mail,
        })
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./minerwatch.toml` if it exists in current directory
/// 2. `~/.config/minerwatch/minerwatch.toml` (XDG config directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("minerwatch").join(CONFIG_FILE_NAME);
    }

    local_config
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("minerwatch.toml");
        match Config::load(&path) {
            Err(ConfigError::Missing(p)) => assert_eq!(p, path),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_load_full_config() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("minerwatch.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(
            file,
            r#"
ledger_path = "data/ledger.db"

[cloudatcost]
username = "miner@example.com"
password = "hunter2"
code_2fa = "JBSWY3DPEHPK3PXP"
goal_usd = 17000
goal_btc = 1

[ethermine]
address = "0x0892c9b9b58ad5a7878d5dcd4da4ee72109c32c6"

[mail]
from = "crypto@example.com"
to = "me@example.com"
"#
        )?;

        let config = ResolvedConfig::load(&config_path)?;
        assert_eq!(config.ledger_path, dir.path().join("data/ledger.db"));

        let cac = config.cloudatcost.expect("cloudatcost section");
        assert_eq!(cac.username, "miner@example.com");
        assert_eq!(cac.password.expose_secret(), "hunter2");
        assert_eq!(
            cac.code_2fa.as_ref().map(|s| s.expose_secret().to_string()),
            Some("JBSWY3DPEHPK3PXP".to_string())
        );
        assert_eq!(cac.goal_usd, Some(Decimal::from(17000)));

        let etm = config.ethermine.expect("ethermine section");
        assert!(etm.address.starts_with("0x"));
        assert_eq!(config.mail.to.as_deref(), Some("me@example.com"));
        assert_eq!(config.mail.command, "sendmail -t");
        Ok(())
    }

    #[test]
    fn test_minimal_config_defaults() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("minerwatch.toml");
        std::fs::write(
            &config_path,
            "[cloudatcost]\nusername = \"u\"\npassword = \"p\"\n",
        )?;

        let config = ResolvedConfig::load(&config_path)?;
        assert_eq!(config.ledger_path, dir.path().join("minerwatch.db"));
        assert!(config.ethermine.is_none());
        let cac = config.cloudatcost.expect("cloudatcost section");
        assert!(cac.code_2fa.is_none());
        assert!(cac.base_url.is_none());
        Ok(())
    }

    #[test]
    fn test_absolute_ledger_path_is_kept() {
        let config: Config = toml::from_str("ledger_path = \"/var/lib/minerwatch.db\"").unwrap();
        assert_eq!(
            config.resolve_ledger_path(Path::new("/home/user")),
            PathBuf::from("/var/lib/minerwatch.db")
        );
    }

    #[test]
    fn test_invalid_config_reports_path() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("minerwatch.toml");
        std::fs::write(&config_path, "[cloudatcost]\nusername = 3\n")?;

        match Config::load(&config_path) {
            Err(ConfigError::Invalid { path, .. }) => assert_eq!(path, config_path),
            other => panic!("unexpected: {other:?}"),
        }
        Ok(())
    }
}
