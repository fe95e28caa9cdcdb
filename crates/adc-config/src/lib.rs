//! AD Config Connector Configuration
//!
//! Settings are read once at process start and passed down explicitly.
//! Environment variables win over the optional TOML file named by
//! `ADC_CONFIG_FILE`.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LDAP_FQDN` | - | Directory host (required) |
//! | `LDAP_PORT` | - | Directory port (required) |
//! | `LDAP_SECURE` | - | `true` for LDAPS, anything else for plain LDAP (required) |
//! | `AD_DOMAIN_NAME` | - | NetBIOS domain used to qualify the bind user (required) |
//! | `AD_DOMAIN_BASE` | - | Search base DN (required) |
//! | `AD_BIND_USER_SM_ARN` | - | Secret holding `bindusername`/`bindpassword` (required) |
//! | `RESOURCE_TYPE` | - | Store resource type for user records (required) |
//! | `LDAP_TLS_VERIFY` | `true` | Verify the directory certificate |
//! | `LDAP_CONNECT_TIMEOUT_SECS` | `10` | Directory connect timeout |
//! | `ADC_SYNC_INTERVAL_SECS` | `60` | Sync cadence |
//! | `ADC_SYNC_REFUSE_EMPTY` | `false` | Abort instead of deleting everything on an empty fetch |
//! | `ADC_SYNC_MAX_DELETIONS` | - | Abort when a cycle would delete more than this |
//! | `ADC_SYNC_RUN_ONCE` | `false` | Run a single cycle and exit with its outcome |
//! | `ADC_SECRETS_PROVIDER` | `aws-sm` | `aws-sm` or `env` |
//! | `ADC_RULE_PORT` | `8080` | Rule server listen port |
//! | `ADC_METRICS_PORT` | `9090` | Health/metrics port |

use std::path::Path;
use std::str::FromStr;

use adc_common::AdcError;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(String),
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<ConfigError> for AdcError {
    fn from(e: ConfigError) -> Self {
        AdcError::Configuration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Connection parameters for the directory server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub host: String,
    pub port: u16,
    pub domain_name: String,
    pub search_base: String,
    pub use_ssl: bool,
    pub tls_verify: bool,
    pub connect_timeout_secs: u64,
}

impl DirectoryConfig {
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Safeguards against treating a bad fetch as authoritative.
/// Both are off by default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncGuardConfig {
    pub refuse_empty_fetch: bool,
    pub max_deletions: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub directory: DirectoryConfig,
    pub bind_secret_ref: String,
    pub resource_type: String,
    pub interval_secs: u64,
    pub run_once: bool,
    pub guard: SyncGuardConfig,
    pub secrets_provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleConfig {
    pub listen_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub metrics_port: u16,
}

// TOML layout; every field may be overridden from the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: DirectorySection,
    pub sync: SyncSection,
    pub server: ServerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DirectorySection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub domain_name: Option<String>,
    pub search_base: Option<String>,
    pub secure: Option<bool>,
    pub tls_verify: Option<bool>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub bind_secret_ref: Option<String>,
    pub resource_type: Option<String>,
    pub interval_secs: Option<u64>,
    pub run_once: Option<bool>,
    pub refuse_empty_fetch: Option<bool>,
    pub max_deletions: Option<usize>,
    pub secrets_provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub rule_port: Option<u16>,
    pub metrics_port: Option<u16>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Read the file named by `ADC_CONFIG_FILE`, or an empty config when unset
    pub fn from_env() -> Result<Self> {
        match std::env::var("ADC_CONFIG_FILE") {
            Ok(path) => {
                info!(path = %path, "Loading configuration file");
                Self::from_path(Path::new(&path))
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn non_empty(key: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key.to_string())),
    }
}

// `true` (any case) enables, everything else disables.
fn flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

impl SyncConfig {
    /// Build from the process environment layered over `ADC_CONFIG_FILE`
    pub fn load() -> Result<Self> {
        let file = FileConfig::from_env()?;
        Self::from_sources(|key| std::env::var(key).ok(), file)
    }

    pub fn from_sources<F>(env: F, file: FileConfig) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dir = file.directory;
        let sync = file.sync;

        let host = non_empty("LDAP_FQDN", env("LDAP_FQDN").or(dir.host))?;
        let port = match env("LDAP_PORT") {
            Some(raw) => parse_value("LDAP_PORT", &raw)?,
            None => dir.port.ok_or_else(|| ConfigError::Missing("LDAP_PORT".to_string()))?,
        };
        let use_ssl = match env("LDAP_SECURE") {
            Some(raw) => flag(&raw),
            None => dir.secure.ok_or_else(|| ConfigError::Missing("LDAP_SECURE".to_string()))?,
        };
        let tls_verify = match env("LDAP_TLS_VERIFY") {
            Some(raw) => flag(&raw),
            None => dir.tls_verify.unwrap_or(true),
        };
        let connect_timeout_secs = match env("LDAP_CONNECT_TIMEOUT_SECS") {
            Some(raw) => parse_value("LDAP_CONNECT_TIMEOUT_SECS", &raw)?,
            None => dir.connect_timeout_secs.unwrap_or(10),
        };

        let directory = DirectoryConfig {
            host,
            port,
            domain_name: non_empty("AD_DOMAIN_NAME", env("AD_DOMAIN_NAME").or(dir.domain_name))?,
            search_base: non_empty("AD_DOMAIN_BASE", env("AD_DOMAIN_BASE").or(dir.search_base))?,
            use_ssl,
            tls_verify,
            connect_timeout_secs,
        };

        let interval_secs = match env("ADC_SYNC_INTERVAL_SECS") {
            Some(raw) => parse_value("ADC_SYNC_INTERVAL_SECS", &raw)?,
            None => sync.interval_secs.unwrap_or(60),
        };
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "ADC_SYNC_INTERVAL_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let run_once = match env("ADC_SYNC_RUN_ONCE") {
            Some(raw) => flag(&raw),
            None => sync.run_once.unwrap_or(false),
        };

        let refuse_empty_fetch = match env("ADC_SYNC_REFUSE_EMPTY") {
            Some(raw) => flag(&raw),
            None => sync.refuse_empty_fetch.unwrap_or(false),
        };
        let max_deletions = match env("ADC_SYNC_MAX_DELETIONS") {
            Some(raw) => Some(parse_value("ADC_SYNC_MAX_DELETIONS", &raw)?),
            None => sync.max_deletions,
        };

        Ok(Self {
            directory,
            bind_secret_ref: non_empty(
                "AD_BIND_USER_SM_ARN",
                env("AD_BIND_USER_SM_ARN").or(sync.bind_secret_ref),
            )?,
            resource_type: non_empty("RESOURCE_TYPE", env("RESOURCE_TYPE").or(sync.resource_type))?,
            interval_secs,
            run_once,
            guard: SyncGuardConfig {
                refuse_empty_fetch,
                max_deletions,
            },
            secrets_provider: env("ADC_SECRETS_PROVIDER")
                .or(sync.secrets_provider)
                .unwrap_or_else(|| "aws-sm".to_string()),
        })
    }
}

impl RuleConfig {
    pub fn load() -> Result<Self> {
        let file = FileConfig::from_env()?;
        Self::from_sources(|key| std::env::var(key).ok(), file)
    }

    pub fn from_sources<F>(env: F, file: FileConfig) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_port = match env("ADC_RULE_PORT") {
            Some(raw) => parse_value("ADC_RULE_PORT", &raw)?,
            None => file.server.rule_port.unwrap_or(8080),
        };
        Ok(Self { listen_port })
    }
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        let file = FileConfig::from_env()?;
        Self::from_sources(|key| std::env::var(key).ok(), file)
    }

    pub fn from_sources<F>(env: F, file: FileConfig) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let metrics_port = match env("ADC_METRICS_PORT") {
            Some(raw) => parse_value("ADC_METRICS_PORT", &raw)?,
            None => file.server.metrics_port.unwrap_or(9090),
        };
        Ok(Self { metrics_port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn required_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("LDAP_FQDN", "dc1.corp.example.com"),
            ("LDAP_PORT", "636"),
            ("LDAP_SECURE", "True"),
            ("AD_DOMAIN_NAME", "CORP"),
            ("AD_DOMAIN_BASE", "DC=corp,DC=example,DC=com"),
            ("AD_BIND_USER_SM_ARN", "arn:aws:secretsmanager:us-east-1:123456789012:secret:ad-bind"),
            ("RESOURCE_TYPE", "MyCompany::AD::User"),
        ])
    }

    fn lookup<'a>(vars: &'a HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| vars.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_load_from_env() {
        let vars = required_env();
        let config = SyncConfig::from_sources(lookup(&vars), FileConfig::default()).unwrap();

        assert_eq!(config.directory.host, "dc1.corp.example.com");
        assert_eq!(config.directory.port, 636);
        assert!(config.directory.use_ssl);
        assert!(config.directory.tls_verify);
        assert_eq!(config.directory.url(), "ldaps://dc1.corp.example.com:636");
        assert_eq!(config.resource_type, "MyCompany::AD::User");
        assert_eq!(config.interval_secs, 60);
        assert!(!config.run_once);
        assert_eq!(config.guard, SyncGuardConfig::default());
        assert_eq!(config.secrets_provider, "aws-sm");
    }

    #[test]
    fn test_secure_flag_only_true_enables_ssl() {
        let mut vars = required_env();
        vars.insert("LDAP_SECURE", "yes");
        vars.insert("LDAP_PORT", "389");
        let config = SyncConfig::from_sources(lookup(&vars), FileConfig::default()).unwrap();

        assert!(!config.directory.use_ssl);
        assert_eq!(config.directory.url(), "ldap://dc1.corp.example.com:389");
    }

    #[test]
    fn test_missing_required_setting() {
        let mut vars = required_env();
        vars.remove("RESOURCE_TYPE");
        let err = SyncConfig::from_sources(lookup(&vars), FileConfig::default()).unwrap_err();

        assert!(matches!(err, ConfigError::Missing(ref key) if key == "RESOURCE_TYPE"));
        let adc: AdcError = err.into();
        assert_eq!(adc.kind(), "configuration");
    }

    #[test]
    fn test_invalid_port() {
        let mut vars = required_env();
        vars.insert("LDAP_PORT", "ldaps");
        let err = SyncConfig::from_sources(lookup(&vars), FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "LDAP_PORT"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[directory]
host = "dc2.corp.example.com"
port = 389
domain_name = "CORP"
search_base = "DC=corp,DC=example,DC=com"
secure = false

[sync]
bind_secret_ref = "ad-bind"
resource_type = "MyCompany::AD::User"
interval_secs = 300
run_once = true
refuse_empty_fetch = true
max_deletions = 25
"#
        )
        .unwrap();

        let parsed = FileConfig::from_path(file.path()).unwrap();
        let vars = HashMap::from([("LDAP_FQDN", "dc1.corp.example.com")]);
        let config = SyncConfig::from_sources(lookup(&vars), parsed).unwrap();

        assert_eq!(config.directory.host, "dc1.corp.example.com");
        assert_eq!(config.directory.port, 389);
        assert!(!config.directory.use_ssl);
        assert_eq!(config.interval_secs, 300);
        assert!(config.run_once);
        assert!(config.guard.refuse_empty_fetch);
        assert_eq!(config.guard.max_deletions, Some(25));
    }

    #[test]
    fn test_run_once_from_env() {
        let mut vars = required_env();
        vars.insert("ADC_SYNC_RUN_ONCE", "TRUE");
        let config = SyncConfig::from_sources(lookup(&vars), FileConfig::default()).unwrap();
        assert!(config.run_once);

        vars.insert("ADC_SYNC_RUN_ONCE", "1");
        let config = SyncConfig::from_sources(lookup(&vars), FileConfig::default()).unwrap();
        assert!(!config.run_once);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut vars = required_env();
        vars.insert("ADC_SYNC_INTERVAL_SECS", "0");
        assert!(SyncConfig::from_sources(lookup(&vars), FileConfig::default()).is_err());
    }

    #[test]
    fn test_server_defaults() {
        let vars = HashMap::new();
        let rule = RuleConfig::from_sources(lookup(&vars), FileConfig::default()).unwrap();
        let server = ServerConfig::from_sources(lookup(&vars), FileConfig::default()).unwrap();
        assert_eq!(rule.listen_port, 8080);
        assert_eq!(server.metrics_port, 9090);
    }
}
