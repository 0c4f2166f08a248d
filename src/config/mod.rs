use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::time::{TimestampFormat, DEFAULT_TIMESTAMP_FORMAT};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub stats_server: ServerConfig,
    pub stats: StatsConfig,
    pub cache: CacheConfig,
    pub client_ip: ClientIpConfig,
    /// strftime pattern for every timestamp on the wire
    pub timestamp_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// App name attached to every hit emitted by the event service
    pub app_name: String,
    /// Remote stats server; when unset the event service records in-process
    pub server_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cached single-event lookups; 0 disables the cache
    pub max_entries: u64,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket address only
    None,
    /// Honour `Forwarded` / `X-Forwarded-For`
    Standard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIpConfig {
    pub trusted_proxy_mode: TrustedProxyMode,
    /// Proxies allowed to append to `X-Forwarded-For`
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    /// Fixed number of proxies in front of the service
    #[serde(default)]
    pub num_trusted_proxies: Option<usize>,
}

impl Default for ClientIpConfig {
    fn default() -> Self {
        Self {
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
        }
    }
}

impl DatabaseConfig {
    /// Connection string with any password masked
    pub fn database_url_for_log(&self) -> String {
        match (self.url.find("://"), self.url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                let credentials = &self.url[scheme_end + 3..at];
                match credentials.split_once(':') {
                    Some((user, _)) => format!(
                        "{}{user}:***{}",
                        &self.url[..scheme_end + 3],
                        &self.url[at..]
                    ),
                    None => self.url.clone(),
                }
            }
            _ => self.url.clone(),
        }
    }
}

impl Config {
    pub fn timestamp_format(&self) -> TimestampFormat {
        TimestampFormat::new(self.timestamp_format.clone())
    }

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "memory" => DatabaseBackend::Memory,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres, memory"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./evently.db?mode=rwc".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a port number")?;

        let stats_host = std::env::var("STATS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let stats_port = std::env::var("STATS_PORT")
            .unwrap_or_else(|_| "9090".to_string())
            .parse::<u16>()
            .context("STATS_PORT must be a port number")?;

        let app_name =
            std::env::var("APP_NAME").unwrap_or_else(|_| "ewm-main-service".to_string());
        let stats_server_url = std::env::var("STATS_SERVER_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let cache_max_entries = std::env::var("CACHE_MAX_ENTRIES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10_000);
        let cache_ttl_secs = std::env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard"
                );
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .ok()
            .map(|list| parse_cidr_list(&list))
            .transpose()?
            .unwrap_or_default();

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok());

        let timestamp_format = std::env::var("TIMESTAMP_FORMAT")
            .unwrap_or_else(|_| DEFAULT_TIMESTAMP_FORMAT.to_string());

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            stats_server: ServerConfig {
                host: stats_host,
                port: stats_port,
            },
            stats: StatsConfig {
                app_name,
                server_url: stats_server_url,
            },
            cache: CacheConfig {
                max_entries: cache_max_entries,
                ttl_secs: cache_ttl_secs,
            },
            client_ip: ClientIpConfig {
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
            timestamp_format,
        })
    }
}

/// Parse a comma separated list of CIDR blocks; bare addresses become host routes
fn parse_cidr_list(list: &str) -> anyhow::Result<Vec<IpNet>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNet>()
                .or_else(|_| s.parse::<std::net::IpAddr>().map(IpNet::from))
                .with_context(|| format!("Invalid entry '{s}' in TRUSTED_PROXIES"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr_list() {
        let nets = parse_cidr_list("10.0.0.0/8, 192.168.1.7 ,").unwrap();
        assert_eq!(nets.len(), 2);
        assert!(nets[1].contains(&"192.168.1.7".parse::<std::net::IpAddr>().unwrap()));
    }

    #[test]
    fn test_database_url_for_log_masks_password() {
        let config = DatabaseConfig {
            backend: DatabaseBackend::Postgres,
            url: "postgres://ewm:secret@db:5432/ewm".to_string(),
            max_connections: 5,
        };
        assert_eq!(config.database_url_for_log(), "postgres://ewm:***@db:5432/ewm");

        let sqlite = DatabaseConfig {
            backend: DatabaseBackend::Sqlite,
            url: "sqlite://./evently.db?mode=rwc".to_string(),
            max_connections: 5,
        };
        assert_eq!(sqlite.database_url_for_log(), "sqlite://./evently.db?mode=rwc");
    }

    #[test]
    fn test_parse_cidr_list_rejects_garbage() {
        assert!(parse_cidr_list("10.0.0.0/8,not-an-ip").is_err());
    }
}
