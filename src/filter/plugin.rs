//! Host-facing search plugin.

use std::sync::Arc;

use async_trait::async_trait;

use crate::filter::{ResultFilter, ResultSet};

/// Gives access to the user performing the search.
pub trait UserSession: Send + Sync {
    /// Identifier of the logged-in user, `None` when anonymous.
    fn current_user(&self) -> Option<String>;
}

impl<F> UserSession for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn current_user(&self) -> Option<String> {
        self()
    }
}

/// Session with a fixed user.
#[derive(Debug, Clone, Default)]
pub struct StaticSession(pub Option<String>);

impl UserSession for StaticSession {
    fn current_user(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Search request parameters, passed through for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub limit: usize,
    pub offset: usize,
}

/// Hook run by the host on every collaborator search.
#[async_trait]
pub trait SearchPlugin: Send + Sync {
    /// Adjust `results` in place.
    ///
    /// Returns whether the host should stop running other plugins.
    async fn search(&self, query: &SearchQuery, results: &mut ResultSet) -> bool;
}

/// Plugin removing users outside the searching user's OU.
#[derive(Clone)]
pub struct OuFilterPlugin {
    filter: Arc<ResultFilter>,
    session: Arc<dyn UserSession>,
}

impl std::fmt::Debug for OuFilterPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OuFilterPlugin")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl OuFilterPlugin {
    /// Create a new [`OuFilterPlugin`].
    pub fn new(filter: Arc<ResultFilter>, session: Arc<dyn UserSession>) -> Self {
        Self { filter, session }
    }
}

#[async_trait]
impl SearchPlugin for OuFilterPlugin {
    async fn search(&self, query: &SearchQuery, results: &mut ResultSet) -> bool {
        let Some(current) = self.session.current_user() else {
            tracing::warn!("no current user in session, results left unfiltered");
            return false;
        };

        tracing::debug!(
            term = %query.term,
            limit = query.limit,
            offset = query.offset,
            %current,
            "OU filter plugin activated"
        );
        self.filter.filter_results(results, &current).await;

        // Filtering is cooperative, other plugins still run.
        false
    }
}
