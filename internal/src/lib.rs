pub mod attrs;
pub mod auth;
pub mod config;
pub mod controls;
pub mod dn;
pub mod entity;
pub mod error;
pub mod manager;
pub mod pool;
pub mod query;
pub mod reconcile;
pub mod secret;
pub mod session;

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, Result};
use crate::secret::PasswordScheme;
use crate::session::{DirectoryConnector, LdapConnector, SearchRequest};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub dn: String,
    pub pass: String,
}

/// Directory server address, written as `host:port` in the configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct DirectoryServer {
    pub host: String,
    pub port: u16,
}

impl DirectoryServer {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn url(&self, tls: bool) -> String {
        let scheme = if tls { "ldaps" } else { "ldap" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for DirectoryServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for DirectoryServer {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|e| {
                    DirectoryError::Config(format!("invalid port in server `{s}`: {e}"))
                })?;
                (host, port)
            }
            None => (s, 389),
        };

        if host.is_empty() {
            return Err(DirectoryError::Config(format!(
                "server `{s}` has no host"
            )));
        }

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for DirectoryServer {
    type Error = DirectoryError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DirectoryServer> for String {
    fn from(server: DirectoryServer) -> Self {
        server.to_string()
    }
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LdapConfig {
    #[serde(default = "default_servers")]
    pub servers: Vec<DirectoryServer>,

    /// Connect with `ldaps://`
    #[serde(default)]
    pub tls: bool,

    #[serde(default = "default_true")]
    pub verify_certs: bool,

    /// Connections per pool; the shared and the clean pool have this size each
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_page_size")]
    pub page_size: i32,

    #[serde(default = "default_max_results")]
    pub max_results: i32,

    #[serde(default, rename = "search_base")]
    pub default_base: String,

    /// Attribute ordering windowed searches
    #[serde(default = "default_sort_attribute")]
    pub sort_attribute: String,

    #[serde(default)]
    pub password_scheme: PasswordScheme,

    pub connect_timeout_seconds: Option<u64>,

    pub bind: Option<Bind>,
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            tls: false,
            verify_certs: true,
            pool_size: default_pool_size(),
            page_size: default_page_size(),
            max_results: default_max_results(),
            default_base: Default::default(),
            sort_attribute: default_sort_attribute(),
            password_scheme: PasswordScheme::default(),
            connect_timeout_seconds: None,
            bind: None,
        }
    }
}

fn default_servers() -> Vec<DirectoryServer> {
    vec![DirectoryServer::new("localhost", 389)]
}

fn default_pool_size() -> usize {
    5
}

fn default_page_size() -> i32 {
    999
}

fn default_max_results() -> i32 {
    1000
}

fn default_sort_attribute() -> String {
    "cn".to_string()
}

impl LdapConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_seconds.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(DirectoryError::Config(
                "at least one server has to be configured".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(DirectoryError::Config(
                "pool_size must be greater than 0".to_string(),
            ));
        }
        if self.max_results < 0 {
            return Err(DirectoryError::Config(
                "max_results cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Fills `default_base` with the first naming context of the first
    /// reachable server
    pub async fn detect_base(&mut self) -> Result<()> {
        let connector = LdapConnector::new(self);
        let mut last_error = None;

        for server in &self.servers {
            let mut session = match connector.connect(server).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!("Cannot reach {server} for base detection: {e}");
                    last_error = Some(e);
                    continue;
                }
            };

            let request = SearchRequest::base_object("", "(objectClass=*)", &["namingContexts"]);
            let entries = session.search(&request).await?;
            // Best effort, the session is dropped anyway
            let _ = session.unbind().await;

            let base = entries
                .first()
                .and_then(|entry| entry.attrs.first_str("namingContexts"))
                .ok_or_else(|| {
                    DirectoryError::Config(format!("{server} publishes no naming contexts"))
                })?;

            self.default_base = base.to_string();
            return Ok(());
        }

        Err(last_error.unwrap_or_else(|| {
            DirectoryError::Config("Cannot retrieve naming contexts".to_string())
        }))
    }
}
