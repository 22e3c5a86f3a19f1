//! Configuration manager for the OU filter.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

const DEFAULT_CONFIG_PATH: &str = "ou-filter.yaml";
const DEFAULT_LDAP_PORT: u16 = 389;
const DEFAULT_LDAPS_PORT: u16 = 636;
const DEFAULT_TIMEOUT: u64 = 10;
const DEFAULT_POOL_SIZE: u32 = 2;

/// Generic container names that never identify a specific unit.
pub const DEFAULT_GENERIC_OUS: &[&str] = &[
    "mail",
    "users",
    "departments",
    "ou",
    "organization",
    "organizational",
    "containers",
    "computers",
    "groups",
];

/// Fields probed, in order, for the identifier of a search result entry.
/// A dot walks into a nested object.
pub const DEFAULT_IDENTIFIER_FIELDS: &[&str] =
    &["value.shareWith", "value.name", "shareWith", "name"];

/// Result categories filtered by default.
pub const DEFAULT_CATEGORIES: &[&str] = &["users", "remotes"];

/// Tables holding the identifier to DN mapping kept by the host's
/// directory sync, tried in order.
pub const DEFAULT_MAPPING_TABLES: &[&str] = &[
    "oc_ldap_user_mapping",
    "ldap_user_mapping",
    "oc_user_ldap_users_mapping",
    "user_ldap_users_mapping",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Default log level, overridden by `RUST_LOG`.
    pub log_level: String,
    /// Allow everything when an OU cannot be determined.
    pub fail_open: bool,
    /// Network timeout in seconds, for connect and every operation.
    pub timeout: u64,
    /// Deny-list of container names skipped during OU extraction.
    pub generic_ous: Vec<String>,
    /// Directory tried before the priority scan.
    pub primary_directory: Option<String>,
    /// Every configured directory.
    pub directories: Vec<Directory>,
    /// Persisted identifier to DN mapping.
    pub mapping: Option<Mapping>,
    /// Search result shapes.
    pub filter: Filter,
    #[serde(skip)]
    pub(crate) path: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            fail_open: true,
            timeout: DEFAULT_TIMEOUT,
            generic_ous: to_strings(DEFAULT_GENERIC_OUS),
            primary_directory: None,
            directories: Vec::new(),
            mapping: None,
            filter: Filter::default(),
            path: PathBuf::new(),
        }
    }
}

/// LDAP or Active Directory server configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    /// Name used to pick the primary directory.
    pub name: String,
    /// Hostname, optionally prefixed with `ldap://` or `ldaps://`.
    pub host: String,
    pub port: Option<u16>,
    /// Where user searches start.
    pub base_dn: String,
    /// Service account DN.
    pub bind_dn: Option<String>,
    #[serde(skip_serializing)]
    pub bind_password: Option<String>,
    #[serde(default = "enabled")]
    pub active: bool,
    /// Lower is tried first.
    #[serde(default)]
    pub priority: i32,
}

fn enabled() -> bool {
    true
}

impl Directory {
    /// Whether both bind DN and password are set.
    pub fn has_credentials(&self) -> bool {
        matches!(
            (&self.bind_dn, &self.bind_password),
            (Some(dn), Some(password)) if !dn.is_empty() && !password.is_empty()
        )
    }

    /// Build the `ldap://host:port` address of this directory.
    pub fn url(&self) -> Result<Url> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(Error::config(format!(
                "directory `{}` has no host",
                self.name
            )));
        }

        let mut url = if host.starts_with("ldap://") || host.starts_with("ldaps://") {
            Url::parse(host)?
        } else {
            Url::parse(&format!("ldap://{host}"))?
        };

        if url.port().is_none() {
            let port = self.port.unwrap_or(match url.scheme() {
                "ldaps" => DEFAULT_LDAPS_PORT,
                _ => DEFAULT_LDAP_PORT,
            });
            url.set_port(Some(port))
                .map_err(|_| Error::config(format!("cannot set port on `{host}`")))?;
        }

        Ok(url)
    }
}

/// PostgreSQL mapping store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    /// `postgres://` connection string.
    #[serde(skip_serializing)]
    pub url: String,
    #[serde(default = "default_tables")]
    pub tables: Vec<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_tables() -> Vec<String> {
    to_strings(DEFAULT_MAPPING_TABLES)
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

/// Search result handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    /// Category keys whose entries are filtered.
    pub categories: Vec<String>,
    /// Identifier fields, probed in order.
    pub identifier_fields: Vec<String>,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            categories: to_strings(DEFAULT_CATEGORIES),
            identifier_fields: to_strings(DEFAULT_IDENTIFIER_FIELDS),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Network timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }

    /// Directories ordered by priority, the lowest first.
    /// The sort is stable so equal priorities keep file order.
    pub fn directories_by_priority(&self) -> Vec<&Directory> {
        let mut directories = self.directories.iter().collect::<Vec<_>>();
        directories.sort_by_key(|d| d.priority);
        directories
    }

    /// Reads the configuration file from the specified path or the default
    /// location.
    pub fn read(self) -> Self {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(&file_path) {
            Ok(file) => match Self::from_reader(file) {
                Ok(config) => config.path(file_path),
                Err(err) => self.error(err),
            },
            Err(err) => self.error(err),
        }
    }

    /// Parse and validate a YAML configuration.
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        let config: Configuration = serde_yaml::from_reader(reader)?;

        for directory in &config.directories {
            directory.url()?;
        }
        if let Some(name) = &config.primary_directory {
            if !config.directories.iter().any(|d| &d.name == name) {
                return Err(Error::config(format!(
                    "primary directory `{name}` is not configured"
                )));
            }
        }

        Ok(config)
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, path = %self.path.display(), "configuration not loaded, using defaults");
        Self {
            path: self.path.clone(),
            ..Default::default()
        }
    }
}
