use std::collections::HashMap;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_CHUNK_SIZE, Provider};
use crate::error::SourcingError;
use crate::{getchips, nexar, token};

pub const DEFAULT_CONFIG_FILE: &str = "part-sourcing.json";
pub const DEFAULT_UPLOAD_FOLDER: &str = "uploads";
pub const DEFAULT_FTP_PORT: u16 = 21;
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_SSH_REMOTE_DIR: &str = "uploads";
pub const DEFAULT_GETCHIPS_CURRENCY: &str = "RUB";
pub const DEFAULT_ERP_OPERATION: &str = "ExchangeOctopart";
pub const DEFAULT_ERP_FIELD: &str = "Data";
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_WATCH_ATTEMPTS: u32 = 10;

/// On-disk settings. Every field is optional; environment variables take
/// precedence over the file.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub provider: Option<Provider>,
    pub chunk_size: Option<usize>,
    pub parallelism: Option<usize>,
    pub upload_folder: Option<String>,
    pub nexar: NexarEntry,
    pub getchips: GetChipsEntry,
    pub ftp: TransferEntry,
    pub ssh: TransferEntry,
    pub enterprise: EnterpriseEntry,
    pub watch: WatchEntry,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NexarEntry {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_url: Option<String>,
    pub token_url: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GetChipsEntry {
    pub url: Option<String>,
    pub token: Option<String>,
    pub currency: Option<String>,
    pub quantity: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TransferEntry {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub remote_dir: Option<String>,
    pub archive_input: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EnterpriseEntry {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub namespace: Option<String>,
    pub operation: Option<String>,
    pub field: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchEntry {
    pub folder: Option<String>,
    pub extensions: Option<Vec<String>>,
    pub interval_ms: Option<u64>,
    pub attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NexarSettings {
    pub client_id: String,
    pub client_secret: String,
    pub api_url: String,
    pub token_url: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetChipsSettings {
    pub url: String,
    pub token: String,
    pub currency: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub remote_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub remote_dir: String,
    /// Copy each input file to the host before it is processed.
    pub archive_input: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterpriseSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    pub namespace: String,
    pub operation: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    pub folder: Option<Utf8PathBuf>,
    pub extensions: Vec<String>,
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            folder: None,
            extensions: vec!["xlsx".to_string()],
            interval: Duration::from_millis(DEFAULT_WATCH_INTERVAL_MS),
            attempts: DEFAULT_WATCH_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub provider: Provider,
    pub chunk_size: usize,
    pub parallelism: usize,
    pub upload_folder: Utf8PathBuf,
    pub nexar: NexarSettings,
    pub getchips: GetChipsSettings,
    pub ftp: Option<FtpSettings>,
    pub ssh: Option<SshSettings>,
    pub enterprise: Option<EnterpriseSettings>,
    pub watch: WatchSettings,
}

/// Where environment-style variables come from.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedSettings, SourcingError> {
        let config = Self::load(path)?;
        Self::resolve_config(config, &ProcessEnv)
    }

    /// Reads the settings file; a missing default file is an empty config,
    /// a missing explicit file is an error.
    pub fn load(path: Option<&str>) -> Result<Config, SourcingError> {
        let config_path = Utf8PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if path.is_none() && !config_path.as_std_path().exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|err| SourcingError::Config(format!("read {config_path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| SourcingError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(
        config: Config,
        env: &dyn EnvSource,
    ) -> Result<ResolvedSettings, SourcingError> {
        let provider = match env_var(env, "PART_PROVIDER") {
            Some(value) => value.parse()?,
            None => config.provider.unwrap_or(Provider::Nexar),
        };
        let chunk_size = env_parse(env, "CHUNK_SIZE")?
            .or(config.chunk_size)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(SourcingError::Config("chunk size must be at least 1".to_string()));
        }
        let parallelism = env_parse(env, "LOOKUP_PARALLELISM")?
            .or(config.parallelism)
            .unwrap_or(1);
        if parallelism == 0 {
            return Err(SourcingError::Config(
                "lookup parallelism must be at least 1".to_string(),
            ));
        }
        let upload_folder = env_var(env, "UPLOAD_FOLDER")
            .or(config.upload_folder)
            .unwrap_or_else(|| DEFAULT_UPLOAD_FOLDER.to_string());

        let nexar = NexarSettings {
            client_id: pick(env, "NEXAR_CLIENT_ID", config.nexar.client_id).unwrap_or_default(),
            client_secret: pick(env, "NEXAR_CLIENT_SECRET", config.nexar.client_secret)
                .unwrap_or_default(),
            api_url: pick(env, "NEXAR_API_URL", config.nexar.api_url)
                .unwrap_or_else(|| nexar::DEFAULT_API_URL.to_string()),
            token_url: pick(env, "NEXAR_TOKEN_URL", config.nexar.token_url)
                .unwrap_or_else(|| token::DEFAULT_TOKEN_URL.to_string()),
            currency: pick(env, "NEXAR_CURRENCY", config.nexar.currency)
                .unwrap_or_else(|| nexar::DEFAULT_CURRENCY.to_string()),
        };

        let getchips = GetChipsSettings {
            url: pick(env, "GETCHIPS_URL", config.getchips.url)
                .unwrap_or_else(|| getchips::DEFAULT_BASE_URL.to_string()),
            token: pick(env, "GETCHIPS_TOKEN", config.getchips.token).unwrap_or_default(),
            currency: pick(env, "GETCHIPS_CURRENCY", config.getchips.currency)
                .unwrap_or_else(|| DEFAULT_GETCHIPS_CURRENCY.to_string()),
            quantity: env_parse(env, "GETCHIPS_QTY")?
                .or(config.getchips.quantity)
                .unwrap_or(getchips::DEFAULT_QUANTITY),
        };

        // Ports and flags are validated even when their host is unset.
        let ftp_port = env_parse(env, "FTP_PORT")?.or(config.ftp.port);
        let ssh_port = env_parse(env, "SSH_PORT")?.or(config.ssh.port);
        let archive_input = env_flag(env, "SSH_ARCHIVE_INPUT")?
            .or(config.ssh.archive_input)
            .unwrap_or(false);

        let ftp = pick(env, "FTP_HOST", config.ftp.host).map(|host| FtpSettings {
            host,
            port: ftp_port.unwrap_or(DEFAULT_FTP_PORT),
            user: pick(env, "FTP_USER", config.ftp.user).unwrap_or_default(),
            password: pick(env, "FTP_PASSWORD", config.ftp.password).unwrap_or_default(),
            remote_dir: pick(env, "FTP_REMOTE_DIR", config.ftp.remote_dir),
        });

        let ssh = pick(env, "SSH_HOST", config.ssh.host).map(|host| SshSettings {
            host,
            port: ssh_port.unwrap_or(DEFAULT_SSH_PORT),
            user: pick(env, "SSH_USER", config.ssh.user).unwrap_or_default(),
            password: pick(env, "SSH_PASSWORD", config.ssh.password).unwrap_or_default(),
            remote_dir: pick(env, "SSH_REMOTE_DIR", config.ssh.remote_dir)
                .unwrap_or_else(|| DEFAULT_SSH_REMOTE_DIR.to_string()),
            archive_input,
        });
        if archive_input && ssh.is_none() {
            return Err(SourcingError::Config(
                "SSH_ARCHIVE_INPUT needs SSH_HOST".to_string(),
            ));
        }

        let enterprise = match pick(env, "OCTOPART_URL", config.enterprise.url) {
            Some(url) => {
                let namespace = pick(env, "OCTOPART_NAMESPACE", config.enterprise.namespace)
                    .ok_or_else(|| {
                        SourcingError::Config(
                            "OCTOPART_URL is set but OCTOPART_NAMESPACE is not".to_string(),
                        )
                    })?;
                Some(EnterpriseSettings {
                    url,
                    user: pick(env, "OCTOPART_USER", config.enterprise.user).unwrap_or_default(),
                    password: pick(env, "OCTOPART_PASSWORD", config.enterprise.password)
                        .unwrap_or_default(),
                    namespace,
                    operation: pick(env, "OCTOPART_OPERATION", config.enterprise.operation)
                        .unwrap_or_else(|| DEFAULT_ERP_OPERATION.to_string()),
                    field: pick(env, "OCTOPART_FIELD", config.enterprise.field)
                        .unwrap_or_else(|| DEFAULT_ERP_FIELD.to_string()),
                })
            }
            None => None,
        };

        let defaults = WatchSettings::default();
        let watch = WatchSettings {
            folder: pick(env, "WATCH_FOLDER", config.watch.folder).map(Utf8PathBuf::from),
            extensions: config
                .watch
                .extensions
                .map(|exts| {
                    exts.into_iter()
                        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                        .collect()
                })
                .unwrap_or(defaults.extensions),
            interval: env_parse(env, "WATCH_INTERVAL_MS")?
                .or(config.watch.interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            attempts: env_parse(env, "WATCH_ATTEMPTS")?
                .or(config.watch.attempts)
                .unwrap_or(defaults.attempts),
        };

        Ok(ResolvedSettings {
            provider,
            chunk_size,
            parallelism,
            upload_folder: Utf8PathBuf::from(upload_folder),
            nexar,
            getchips,
            ftp,
            ssh,
            enterprise,
            watch,
        })
    }
}

fn env_var(env: &dyn EnvSource, key: &str) -> Option<String> {
    env.var(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn pick(env: &dyn EnvSource, key: &str, fallback: Option<String>) -> Option<String> {
    env_var(env, key).or_else(|| fallback.filter(|value| !value.trim().is_empty()))
}

fn env_parse<T: FromStr>(env: &dyn EnvSource, key: &str) -> Result<Option<T>, SourcingError> {
    match env_var(env, key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| SourcingError::ConfigParse(format!("{key}={value} is not valid"))),
        None => Ok(None),
    }
}

/// `1`/`true`/`yes`/`on` and `0`/`false`/`no`/`off`, case-insensitive.
fn env_flag(env: &dyn EnvSource, key: &str) -> Result<Option<bool>, SourcingError> {
    match env_var(env, key) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(SourcingError::ConfigParse(format!("{key}={value} is not a flag"))),
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved =
            ConfigLoader::resolve_config(Config::default(), &HashMap::<String, String>::new()).unwrap();
        assert_eq!(resolved.provider, Provider::Nexar);
        assert_eq!(resolved.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(resolved.parallelism, 1);
        assert_eq!(resolved.upload_folder, Utf8PathBuf::from("uploads"));
        assert_eq!(resolved.nexar.currency, "EUR");
        assert!(resolved.ftp.is_none());
        assert!(resolved.ssh.is_none());
        assert!(resolved.enterprise.is_none());
        assert_eq!(resolved.watch, WatchSettings::default());
    }
}
