//! Persisted identifier to DN mappings.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Mapping;
use crate::error::{Error, Result};
use crate::resolver::DnSource;

/// Mapping table kept by the host's directory sync, stored in PostgreSQL.
///
/// Each table is expected to expose `ldap_dn`, `owncloud_name` and
/// `directory_uuid` columns.
#[derive(Debug, Clone)]
pub struct PgMapping {
    pool: PgPool,
    tables: Vec<String>,
}

impl PgMapping {
    /// Create a new [`PgMapping`] on an existing pool.
    pub fn new(pool: PgPool, tables: Vec<String>) -> Result<Self> {
        if tables.is_empty() {
            return Err(Error::config("mapping needs at least one table"));
        }
        if let Some(table) = tables.iter().find(|t| !is_identifier(t)) {
            return Err(Error::config(format!("invalid mapping table `{table}`")));
        }

        Ok(Self { pool, tables })
    }

    /// Open a lazy pool described by `config`.
    ///
    /// No connection is made until the first lookup, so an unreachable
    /// database only degrades lookups.
    pub fn connect(config: &Mapping) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_lazy(&config.url)?;

        tracing::info!(tables = ?config.tables, "mapping store configured");

        Self::new(pool, config.tables.clone())
    }
}

#[async_trait]
impl DnSource for PgMapping {
    fn name(&self) -> &str {
        "mapping"
    }

    async fn lookup(&self, identifier: &str) -> Result<Option<String>> {
        let mut scan = TableScan::default();

        for table in &self.tables {
            let query = format!(
                r#"SELECT ldap_dn FROM {table}
                WHERE owncloud_name = $1 OR directory_uuid = $1
                LIMIT 1"#
            );

            let outcome = sqlx::query_scalar::<_, String>(&query)
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await;
            if let Err(err) = &outcome {
                tracing::debug!(%table, error = %err, "mapping table unusable");
            }
            if let Some(dn) = scan.record(outcome) {
                return Ok(Some(dn));
            }
        }

        scan.finish()
    }
}

/// Outcome of probing the mapping tables one after the other.
///
/// A table that answers without a DN makes the whole lookup a miss, even
/// if other tables failed. Only when no table answered is the last error
/// returned.
#[derive(Debug, Default)]
struct TableScan {
    answered: bool,
    last_error: Option<sqlx::Error>,
}

impl TableScan {
    /// Record one table's outcome. Returns the DN when this table has one.
    fn record(&mut self, outcome: std::result::Result<Option<String>, sqlx::Error>) -> Option<String> {
        match outcome {
            Ok(Some(dn)) if !dn.is_empty() => return Some(dn),
            Ok(_) => self.answered = true,
            Err(err) => self.last_error = Some(err),
        }
        None
    }

    fn finish(self) -> Result<Option<String>> {
        match self.last_error {
            Some(err) if !self.answered => Err(err.into()),
            _ => Ok(None),
        }
    }
}

/// In-memory mapping, for hosts that already hold identifier to DN pairs.
#[derive(Debug, Clone, Default)]
pub struct StaticMapping {
    entries: HashMap<String, String>,
}

impl StaticMapping {
    /// Create an empty [`StaticMapping`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a mapping.
    pub fn insert(&mut self, identifier: impl Into<String>, dn: impl Into<String>) {
        self.entries.insert(identifier.into(), dn.into());
    }
}

impl<I: Into<String>, D: Into<String>> FromIterator<(I, D)> for StaticMapping {
    fn from_iter<T: IntoIterator<Item = (I, D)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(id, dn)| (id.into(), dn.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl DnSource for StaticMapping {
    fn name(&self) -> &str {
        "static"
    }

    async fn lookup(&self, identifier: &str) -> Result<Option<String>> {
        Ok(self.entries.get(identifier).cloned())
    }
}

/// Whether `name` is a plain SQL identifier, safe to splice into a query.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
