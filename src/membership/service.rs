use crate::membership::{FailPolicy, OuCache};
use crate::ou::{OuExtractor, same_unit};
use crate::resolver::DnResolver;

/// OU membership manager.
///
/// One instance lives for a request or a session: its cache is never
/// invalidated except through [`OuService::clear_cache`].
#[derive(Debug)]
pub struct OuService {
    resolver: DnResolver,
    extractor: OuExtractor,
    policy: FailPolicy,
    cache: OuCache,
}

impl OuService {
    /// Create a new [`OuService`].
    pub fn new(resolver: DnResolver, extractor: OuExtractor, policy: FailPolicy) -> Self {
        Self {
            resolver,
            extractor,
            policy,
            cache: OuCache::new(),
        }
    }

    pub fn policy(&self) -> FailPolicy {
        self.policy
    }

    /// Find the OU of `identifier`.
    ///
    /// `None` when its DN could not be resolved, an empty string when the
    /// DN carries no OU. Both outcomes are cached.
    pub async fn get_ou(&self, identifier: &str) -> Option<String> {
        let (ou, hit) = self
            .cache
            .get_or_lookup(identifier, || self.lookup(identifier))
            .await;

        let outcome = match (&ou, hit) {
            (_, true) => "cache_hit",
            (Some(_), false) => "resolved",
            (None, false) => "not_found",
        };
        metrics::counter!("ou_lookups_total", "outcome" => outcome).increment(1);

        ou
    }

    /// Resolve and extract, bypassing the cache.
    async fn lookup(&self, identifier: &str) -> Option<String> {
        let Some(dn) = self.resolver.resolve(identifier).await else {
            tracing::debug!(%identifier, "could not find DN for user");
            return None;
        };

        let ou = self.extractor.extract(&dn);
        tracing::debug!(%identifier, %ou, "user OU");
        Some(ou)
    }

    /// Whether `a` and `b` share an OU, ignoring case.
    ///
    /// If either OU is unknown or empty, the [`FailPolicy`] decides.
    pub async fn same_ou(&self, a: &str, b: &str) -> bool {
        let ou_a = self.get_ou(a).await.unwrap_or_default();
        let ou_b = self.get_ou(b).await.unwrap_or_default();

        if ou_a.is_empty() || ou_b.is_empty() {
            tracing::debug!(%a, %b, "could not determine OU for users");
            return self.policy.allows();
        }

        let same = same_unit(&ou_a, &ou_b);
        tracing::debug!(%a, %ou_a, %b, %ou_b, same, "OU comparison");
        same
    }

    /// Keep the entries sharing `current`'s OU.
    ///
    /// `identifier` reads the user of an entry; entries without one are
    /// dropped. Entries whose own OU is unknown are dropped as well. When
    /// the OU of `current` itself is unknown, the [`FailPolicy`] decides
    /// for the whole collection: everything or nothing.
    pub async fn filter_by_ou<T, F>(&self, entries: Vec<T>, current: &str, identifier: F) -> Vec<T>
    where
        F: Fn(&T) -> Option<String>,
    {
        let current_ou = self.get_ou(current).await.unwrap_or_default();
        if current_ou.is_empty() {
            tracing::debug!(%current, "could not determine OU for current user");
            return match self.policy {
                FailPolicy::Open => entries,
                FailPolicy::Closed => Vec::new(),
            };
        }

        let total = entries.len();
        let mut kept = Vec::with_capacity(total);
        for entry in entries {
            let Some(id) = identifier(&entry) else {
                tracing::debug!("skipping entry without identifier");
                continue;
            };

            let ou = self.get_ou(&id).await.unwrap_or_default();
            if same_unit(&current_ou, &ou) {
                kept.push(entry);
            } else {
                tracing::trace!(user = %id, %ou, "filtered out");
            }
        }

        tracing::debug!(%current, ou = %current_ou, total, kept = kept.len(), "filtered users by OU");
        kept
    }

    /// Evict `identifier` from the cache, or everything when `None`.
    pub fn clear_cache(&self, identifier: Option<&str>) {
        self.cache.clear(identifier);
        match identifier {
            Some(identifier) => tracing::info!(%identifier, "cleared OU cache for user"),
            None => tracing::info!("cleared all OU cache"),
        }
    }
}
