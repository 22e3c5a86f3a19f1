//! Restrict collaborator search results to users of the same LDAP
//! organizational unit.
//!
//! The pieces compose leaf to root:
//! [`resolver::DnResolver`] finds a user's DN, [`ou::OuExtractor`] picks
//! its specific OU, [`membership::OuService`] caches and compares OUs, and
//! [`filter::ResultFilter`] applies all of it to the host's result shapes.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod filter;
pub mod ldap;
pub mod membership;
pub mod ou;
pub mod resolver;
pub mod telemetry;

use std::sync::Arc;

use config::Configuration;
use error::Result;
use filter::{OuFilterPlugin, ResultFilter, UserSession};
use membership::{FailPolicy, OuService};
use ou::OuExtractor;
use resolver::{DnResolver, PgMapping};

/// Long-lived wiring built once from the configuration.
///
/// Every [`OuService`] it hands out starts with an empty cache, so hosts
/// create one per request or session.
#[derive(Debug, Clone)]
pub struct OuFilter {
    pub config: Arc<Configuration>,
    resolver: DnResolver,
    extractor: OuExtractor,
}

impl OuFilter {
    /// Build the resolver chain and the extractor described by `config`.
    ///
    /// The mapping store pool is lazy: this needs a Tokio runtime but no
    /// reachable database.
    pub fn new(config: Configuration) -> Result<Self> {
        let mapping = config.mapping.as_ref().map(PgMapping::connect).transpose()?;
        let resolver = DnResolver::from_config(&config, mapping)?;
        let extractor = OuExtractor::new(&config.generic_ous);

        tracing::info!(
            sources = ?resolver.sources().collect::<Vec<_>>(),
            fail_open = config.fail_open,
            "OU filter ready"
        );

        Ok(Self {
            config: Arc::new(config),
            resolver,
            extractor,
        })
    }

    /// Create an [`OuFilter`] from already built parts.
    pub fn from_parts(config: Configuration, resolver: DnResolver, extractor: OuExtractor) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            extractor,
        }
    }

    /// Configured DN resolver chain.
    pub fn resolver(&self) -> &DnResolver {
        &self.resolver
    }

    pub fn extractor(&self) -> &OuExtractor {
        &self.extractor
    }

    /// New membership service with its own cache.
    pub fn service(&self) -> OuService {
        OuService::new(
            self.resolver.clone(),
            self.extractor.clone(),
            FailPolicy::from_fail_open(self.config.fail_open),
        )
    }

    /// New result filter on top of a fresh [`OuService`].
    pub fn result_filter(&self) -> ResultFilter {
        ResultFilter::new(Arc::new(self.service()), &self.config.filter)
    }

    /// Search plugin for one request or session.
    pub fn plugin(&self, session: Arc<dyn UserSession>) -> OuFilterPlugin {
        OuFilterPlugin::new(Arc::new(self.result_filter()), session)
    }
}
