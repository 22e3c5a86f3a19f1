//! Search result filtering.
//!
//! [`ResultFilter`] applies [`OuService`] to the result shapes the host
//! hands over and writes back something the host can always consume: a
//! category is either left alone, replaced by its filtered subset, or
//! explicitly emptied. It never leaves a category absent.

mod plugin;
mod shape;

pub use plugin::*;
pub use shape::*;

use std::sync::Arc;

use serde_json::Value;

use crate::config::Filter as FilterConfig;
use crate::membership::OuService;

/// Identifier field probed on mention candidates.
const MENTION_FIELD: &str = "id";

/// What to do with a category once its entries were filtered.
#[derive(Debug, Clone, PartialEq)]
pub enum Writeback {
    /// Every entry survived, nothing to write.
    Untouched,
    /// Some entries survived, replace the content with them.
    Replace(Vec<SearchResultEntry>),
    /// No entry survived, store an explicitly empty list.
    Empty,
}

impl Writeback {
    /// Decide from the original entry count and the surviving entries.
    pub fn decide(original: usize, filtered: Vec<SearchResultEntry>) -> Self {
        match filtered.len() {
            0 => Self::Empty,
            kept if kept >= original => Self::Untouched,
            _ => Self::Replace(filtered),
        }
    }

    /// Short name used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untouched => "untouched",
            Self::Replace(_) => "replaced",
            Self::Empty => "emptied",
        }
    }

    /// Write the decision into `entries`.
    pub fn apply(self, entries: &mut Vec<SearchResultEntry>) {
        match self {
            Self::Untouched => {},
            Self::Replace(filtered) => *entries = filtered,
            Self::Empty => entries.clear(),
        }
    }
}

/// Adapter between host result shapes and [`OuService`].
#[derive(Debug, Clone)]
pub struct ResultFilter {
    service: Arc<OuService>,
    categories: Vec<String>,
    identifier_fields: Vec<String>,
}

impl ResultFilter {
    /// Create a new [`ResultFilter`].
    pub fn new(service: Arc<OuService>, config: &FilterConfig) -> Self {
        Self {
            service,
            categories: config.categories.clone(),
            identifier_fields: config.identifier_fields.clone(),
        }
    }

    pub fn service(&self) -> &OuService {
        &self.service
    }

    /// Identifier of a result entry.
    ///
    /// A bare string is its own identifier, otherwise the configured fields
    /// are probed in order. Dotted fields walk into nested objects.
    pub fn identifier(&self, entry: &SearchResultEntry) -> Option<String> {
        if let Value::String(id) = entry {
            return non_empty(id);
        }

        self.identifier_fields
            .iter()
            .find_map(|field| lookup(entry, field))
    }

    /// Filter one category's entries for `current`.
    ///
    /// Returns the content to store back: the input itself when nothing
    /// was removed or nobody is logged in.
    pub async fn filter_category(
        &self,
        category: &str,
        mut entries: Vec<SearchResultEntry>,
        current: Option<&str>,
    ) -> Vec<SearchResultEntry> {
        if let Some(current) = current {
            self.filter_slot(category, &mut entries, current).await;
        }
        entries
    }

    /// Filter every configured category of `results` in place.
    pub async fn filter_results(&self, results: &mut ResultSet, current: &str) {
        let before = results.count(&self.categories);
        for slot in results.slots(&self.categories) {
            self.filter_slot(&slot.label, slot.entries, current).await;
        }

        tracing::debug!(%current, before, after = results.count(&self.categories), "filtered result set");
    }

    /// Filter mention candidates, identified by their `id` field.
    ///
    /// Each candidate is compared on its own: one whose OU is unknown is
    /// kept under the fail-open policy.
    pub async fn filter_mentions(
        &self,
        candidates: Vec<SearchResultEntry>,
        current: &str,
    ) -> Vec<SearchResultEntry> {
        let total = candidates.len();
        let mut kept = Vec::with_capacity(total);

        for candidate in candidates {
            let Some(id) = lookup(&candidate, MENTION_FIELD) else {
                continue;
            };
            if self.service.same_ou(current, &id).await {
                kept.push(candidate);
            }
        }

        tracing::debug!(%current, total, kept = kept.len(), "filtered mention candidates");
        kept
    }

    async fn filter_slot(&self, label: &str, entries: &mut Vec<SearchResultEntry>, current: &str) {
        if entries.is_empty() {
            tracing::debug!(category = %label, "no results to filter");
            return;
        }

        let original = entries.len();
        let filtered = self
            .service
            .filter_by_ou(entries.clone(), current, |entry| {
                let id = self.identifier(entry);
                if id.is_none() {
                    tracing::debug!(category = %label, "result without identifier, skipped as indeterminate");
                }
                id
            })
            .await;

        let writeback = Writeback::decide(original, filtered);
        tracing::info!(
            category = %label,
            %current,
            original,
            decision = writeback.as_str(),
            "filtered search results"
        );
        metrics::counter!(
            "search_results_filtered_total",
            "category" => label.to_owned(),
            "decision" => writeback.as_str()
        )
        .increment(1);

        writeback.apply(entries);
    }
}

fn lookup(entry: &Value, field: &str) -> Option<String> {
    let value = field
        .split('.')
        .try_fold(entry, |value, key| value.get(key))?;

    match value {
        Value::String(id) => non_empty(id),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn non_empty(id: &str) -> Option<String> {
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_owned())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::membership::FailPolicy;
    use crate::membership::tests::{Directory, service};

    fn filter(directory: &Directory, policy: FailPolicy) -> ResultFilter {
        ResultFilter::new(Arc::new(service(directory, policy)), &FilterConfig::default())
    }

    fn share(id: &str) -> Value {
        json!({"label": id, "value": {"shareType": 0, "shareWith": id}})
    }

    fn scenario() -> Directory {
        Directory::with(&[
            ("me", "CN=me,OU=first,OU=Mail,DC=x"),
            ("u1", "CN=u1,OU=first,OU=Mail,DC=x"),
            ("u2", "CN=u2,OU=FIRST,DC=x"),
            ("u3", "CN=u3,OU=second,OU=Mail,DC=x"),
            ("u4", "CN=u4,OU=second,DC=x"),
        ])
    }

    #[test]
    fn test_identifier_order() {
        let filter = filter(&Directory::default(), FailPolicy::Open);

        assert_eq!(
            filter.identifier(&json!({"value": {"shareWith": "a", "name": "b"}, "shareWith": "c"})),
            Some("a".into())
        );
        assert_eq!(
            filter.identifier(&json!({"value": {"name": "b"}, "shareWith": "c"})),
            Some("b".into())
        );
        assert_eq!(
            filter.identifier(&json!({"value": {"shareWith": ""}, "shareWith": "c", "name": "d"})),
            Some("c".into())
        );
        assert_eq!(filter.identifier(&json!({"name": "d"})), Some("d".into()));
        assert_eq!(filter.identifier(&json!({"value": {"shareWith": 42}})), Some("42".into()));
        assert_eq!(filter.identifier(&json!("alice")), Some("alice".into()));
        assert_eq!(filter.identifier(&json!({"label": "nobody"})), None);
        assert_eq!(filter.identifier(&json!(null)), None);
    }

    #[test]
    fn test_writeback_decision() {
        let entries = vec![json!("a"), json!("b"), json!("c")];

        assert_eq!(Writeback::decide(3, entries.clone()), Writeback::Untouched);
        assert_eq!(Writeback::decide(3, vec![]), Writeback::Empty);
        assert_eq!(
            Writeback::decide(3, entries[..1].to_vec()),
            Writeback::Replace(vec![json!("a")])
        );

        let mut stored = entries.clone();
        Writeback::Empty.apply(&mut stored);
        assert!(stored.is_empty());

        let mut stored = entries.clone();
        Writeback::Untouched.apply(&mut stored);
        assert_eq!(stored, entries);
    }

    #[tokio::test]
    async fn test_scenario_same_ou_only() {
        let filter = filter(&scenario(), FailPolicy::Open);
        let entries = ["u1", "u3", "ghost", "u2", "u4"].map(share).to_vec();

        let filtered = filter.filter_category("users", entries.clone(), Some("me")).await;
        assert_eq!(filtered, vec![share("u1"), share("u2")]);

        let again = filter.filter_category("users", filtered.clone(), Some("me")).await;
        assert_eq!(again, filtered);
    }

    #[tokio::test]
    async fn test_no_survivor_empties_category() {
        let filter = filter(&scenario(), FailPolicy::Open);
        let entries = ["u3", "u4"].map(share).to_vec();

        let filtered = filter.filter_category("users", entries, Some("me")).await;
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn test_pass_through() {
        let directory = scenario();
        let filter = filter(&directory, FailPolicy::Open);
        let entries = ["u3", "u4"].map(share).to_vec();

        let anonymous = filter.filter_category("users", entries.clone(), None).await;
        assert_eq!(anonymous, entries);
        assert_eq!(directory.calls(), 0);

        let unknown = filter.filter_category("users", entries.clone(), Some("ghost")).await;
        assert_eq!(unknown, entries);
    }

    #[tokio::test]
    async fn test_malformed_entries_skipped() {
        let filter = filter(&scenario(), FailPolicy::Open);
        let entries = vec![share("u1"), json!({"label": "broken"}), share("u2")];

        let filtered = filter.filter_category("users", entries, Some("me")).await;
        assert_eq!(filtered, vec![share("u1"), share("u2")]);
    }

    #[tokio::test]
    async fn test_filter_nextcloud_results() {
        let filter = filter(&scenario(), FailPolicy::Open);
        let mut results: ResultSet = serde_json::from_value(json!({
            "users": [share("u1"), share("u3")],
            "groups": [share("u4")],
            "remotes": {"results": [share("u2")], "exact": [share("u4")]},
            "exact": {"users": [share("u4")], "groups": []}
        }))
        .unwrap();

        filter.filter_results(&mut results, "me").await;

        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            json!({
                "users": [share("u1")],
                "groups": [share("u4")],
                "remotes": {"results": [share("u2")], "exact": []},
                "exact": {"users": [], "groups": []}
            })
        );
    }

    #[tokio::test]
    async fn test_filter_mentions() {
        let filter = filter(&scenario(), FailPolicy::Open);
        let candidates = vec![
            json!({"id": "u1", "label": "U1"}),
            json!({"id": "u3", "label": "U3"}),
            json!({"id": "ghost", "label": "Ghost"}),
            json!({"label": "no id"}),
        ];

        let kept = filter.filter_mentions(candidates, "me").await;
        assert_eq!(
            kept,
            vec![json!({"id": "u1", "label": "U1"}), json!({"id": "ghost", "label": "Ghost"})]
        );
    }
}
