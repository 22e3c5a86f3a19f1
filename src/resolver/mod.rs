//! Resolve user identifiers to directory distinguished names.
//!
//! [`DnResolver`] walks an ordered chain of [`DnSource`]s and returns the
//! first DN found. A source that fails is logged and skipped, it never
//! aborts the chain and is never retried within one resolution.

mod directory;
mod mapping;

pub use directory::*;
pub use mapping::*;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::ldap::DirectoryClient;

/// One strategy able to turn an identifier into a DN.
#[async_trait]
pub trait DnSource: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &str;

    /// Look `identifier` up. `Ok(None)` means "not known here".
    async fn lookup(&self, identifier: &str) -> Result<Option<String>>;

    /// Upper bound this source enforces on a lookup by itself.
    ///
    /// When set, the resolver waits that long instead of its own timeout,
    /// so the source can release its resources before giving up.
    fn deadline(&self) -> Option<Duration> {
        None
    }
}

/// Ordered chain of [`DnSource`]s. Clones share the sources.
#[derive(Clone)]
pub struct DnResolver {
    sources: Vec<Arc<dyn DnSource>>,
    timeout: Duration,
}

impl std::fmt::Debug for DnResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnResolver")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DnResolver {
    /// Create an empty [`DnResolver`]. Each source gets `timeout` to answer.
    pub fn new(timeout: Duration) -> Self {
        Self {
            sources: Vec::new(),
            timeout,
        }
    }

    /// Append a strategy to the chain.
    pub fn with_source(mut self, source: impl DnSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Build the chain described by `config`:
    /// mapping store, primary directory, then the first active directory
    /// with complete credentials by priority.
    pub fn from_config(config: &Configuration, mapping: Option<PgMapping>) -> Result<Self> {
        let timeout = config.timeout();
        let mut resolver = Self::new(timeout);

        if let Some(mapping) = mapping {
            resolver = resolver.with_source(mapping);
        }

        let primary = config.primary_directory.as_deref().and_then(|name| {
            config.directories.iter().find(|d| d.name == name && d.active)
        });
        if let Some(directory) = primary {
            resolver = resolver.with_source(DirectorySource::new(
                DirectoryClient::new(directory, timeout)?,
            ));
        } else if let Some(name) = &config.primary_directory {
            tracing::warn!(directory = %name, "primary directory is inactive");
        }

        let fallback = config.directories_by_priority().into_iter().find(|d| {
            d.active
                && d.has_credentials()
                && primary.is_none_or(|p| p.name != d.name)
        });
        if let Some(directory) = fallback {
            resolver = resolver.with_source(DirectorySource::new(
                DirectoryClient::new(directory, timeout)?,
            ));
        }

        if resolver.sources.is_empty() {
            tracing::warn!("no DN source configured, every lookup will miss");
        }

        Ok(resolver)
    }

    /// Names of the configured sources, in order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.name())
    }

    /// Resolve `identifier` to its DN, or `None` once every source missed.
    pub async fn resolve(&self, identifier: &str) -> Option<String> {
        for source in &self.sources {
            let name = source.name();
            let limit = source.deadline().unwrap_or(self.timeout);
            let outcome = match tokio::time::timeout(limit, source.lookup(identifier)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Timeout(limit)),
            };

            match outcome {
                Ok(Some(dn)) => {
                    tracing::debug!(source = %name, %identifier, %dn, "DN resolved");
                    count(name, "found");
                    return Some(dn);
                },
                Ok(None) => {
                    tracing::debug!(source = %name, %identifier, "no DN");
                    count(name, "missing");
                },
                Err(err) => {
                    if err.is_unavailable() {
                        tracing::warn!(source = %name, %identifier, error = %err, "DN source unavailable");
                    } else {
                        tracing::error!(source = %name, %identifier, error = %err, "DN lookup failed");
                    }
                    count(name, "error");
                },
            }
        }

        tracing::debug!(%identifier, "could not find DN");
        None
    }
}

fn count(source: &str, outcome: &'static str) {
    metrics::counter!(
        "dn_resolution_total",
        "strategy" => source.to_owned(),
        "outcome" => outcome
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::Directory;

    struct Failing(Arc<AtomicUsize>);

    #[async_trait]
    impl DnSource for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn lookup(&self, _identifier: &str) -> Result<Option<String>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(Error::Io(std::io::ErrorKind::ConnectionRefused.into()))
        }
    }

    struct Hanging;

    #[async_trait]
    impl DnSource for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn lookup(&self, _identifier: &str) -> Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    /// Slow source that bounds itself.
    struct Bounded;

    #[async_trait]
    impl DnSource for Bounded {
        fn name(&self) -> &str {
            "bounded"
        }

        async fn lookup(&self, _identifier: &str) -> Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(25)).await;
            Ok(Some("CN=erin,OU=first,DC=x".into()))
        }

        fn deadline(&self) -> Option<Duration> {
            Some(Duration::from_secs(31))
        }
    }

    fn mapping(entries: &[(&str, &str)]) -> StaticMapping {
        entries.iter().map(|(id, dn)| (*id, *dn)).collect()
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let resolver = DnResolver::new(Duration::from_secs(1))
            .with_source(mapping(&[("alice", "CN=alice,OU=first,DC=x")]))
            .with_source(mapping(&[("alice", "CN=alice,OU=second,DC=x")]));

        assert_eq!(
            resolver.resolve("alice").await.as_deref(),
            Some("CN=alice,OU=first,DC=x")
        );
    }

    #[tokio::test]
    async fn test_failure_falls_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = DnResolver::new(Duration::from_secs(1))
            .with_source(Failing(Arc::clone(&calls)))
            .with_source(mapping(&[]))
            .with_source(mapping(&[("bob", "CN=bob,OU=second,DC=x")]));

        assert_eq!(
            resolver.resolve("bob").await.as_deref(),
            Some("CN=bob,OU=second,DC=x")
        );
        assert_eq!(resolver.resolve("carol").await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_skips_source() {
        let resolver = DnResolver::new(Duration::from_secs(10))
            .with_source(Hanging)
            .with_source(mapping(&[("dave", "CN=dave,OU=first,DC=x")]));

        assert_eq!(
            resolver.resolve("dave").await.as_deref(),
            Some("CN=dave,OU=first,DC=x")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_deadline_overrides_timeout() {
        let resolver = DnResolver::new(Duration::from_secs(10)).with_source(Bounded);

        assert_eq!(
            resolver.resolve("erin").await.as_deref(),
            Some("CN=erin,OU=first,DC=x")
        );
    }

    #[test]
    fn test_chain_from_config() {
        let directory = |name: &str, priority: i32, active: bool, creds: bool| Directory {
            name: name.into(),
            host: format!("{name}.example.com"),
            base_dn: "DC=example,DC=com".into(),
            bind_dn: creds.then(|| "CN=svc,DC=example,DC=com".to_owned()),
            bind_password: creds.then(|| "secret".to_owned()),
            active,
            priority,
            ..Default::default()
        };

        let config = Configuration {
            primary_directory: Some("s01".into()),
            directories: vec![
                directory("s01", 0, true, true),
                directory("s02", 2, true, true),
                directory("s03", 1, false, true),
                directory("s04", 1, true, false),
            ],
            ..Default::default()
        };

        let resolver = DnResolver::from_config(&config, None).unwrap();
        assert_eq!(
            resolver.sources().collect::<Vec<_>>(),
            vec!["directory:s01", "directory:s02"]
        );

        let config = Configuration {
            directories: vec![directory("s03", 5, true, true), directory("s04", 1, true, true)],
            ..Default::default()
        };
        let resolver = DnResolver::from_config(&config, None).unwrap();
        assert_eq!(resolver.sources().collect::<Vec<_>>(), vec!["directory:s04"]);
    }
}
