//! Error handler for the OU filter.
//!
//! Lookups never surface these to the host: the resolver and the
//! membership service log them and degrade to "not found". Only the
//! configuration loader and the diagnostic binary return them.

use ldap3::LdapError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing every failure the crate can observe.
#[derive(Debug, Error)]
pub enum Error {
    #[error("directory unavailable: {0}")]
    Directory(#[from] LdapError),

    #[error("directory did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("SQL request failed: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("invalid configuration, {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse result set: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL is invalid: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a [`Error::Config`] from anything printable.
    pub fn config(details: impl Into<String>) -> Self {
        Self::Config(details.into())
    }

    /// Whether this error means the directory could not be reached at all,
    /// as opposed to a query the directory answered badly.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Directory(_) | Self::Timeout(_) | Self::Io(_))
    }
}
