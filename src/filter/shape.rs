//! Result set shapes accepted from the host.
//!
//! Hosts hand over either a flat list of entries or a map keyed by
//! category. A category holds a list, a `{results, exact}` split or a
//! nested map of categories (Nextcloud's `exact: {users: [...]}`).
//! [`ResultSet::slots`] flattens any of them into labelled entry lists so
//! filtering only ever deals with one canonical sequence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single search result, kept as the host sent it.
pub type SearchResultEntry = Value;

/// Whole search result as received from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultSet {
    Flat(Vec<SearchResultEntry>),
    Keyed(BTreeMap<String, Category>),
}

/// Content of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Category {
    Entries(Vec<SearchResultEntry>),
    Split(Split),
    Nested(BTreeMap<String, Category>),
    Opaque(Value),
}

/// Category separated into fuzzy and exact matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub results: Vec<SearchResultEntry>,
    #[serde(default)]
    pub exact: Vec<SearchResultEntry>,
    /// Anything else the host stored next to the results.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry list found inside a [`ResultSet`].
#[derive(Debug)]
pub struct Slot<'a> {
    /// Dotted path of the list, e.g. `users` or `exact.users`.
    pub label: String,
    pub entries: &'a mut Vec<SearchResultEntry>,
}

impl ResultSet {
    /// Every entry list that belongs to one of `categories`.
    ///
    /// A flat result set is a single list labelled `flat`.
    pub fn slots<'a>(&'a mut self, categories: &[String]) -> Vec<Slot<'a>> {
        let mut slots = Vec::new();
        match self {
            ResultSet::Flat(entries) => slots.push(Slot {
                label: "flat".into(),
                entries,
            }),
            ResultSet::Keyed(map) => collect(map, None, categories, &mut slots),
        }
        slots
    }

    /// Total number of entries in `categories`.
    pub fn count(&mut self, categories: &[String]) -> usize {
        self.slots(categories).iter().map(|s| s.entries.len()).sum()
    }
}

fn collect<'a>(
    map: &'a mut BTreeMap<String, Category>,
    prefix: Option<&str>,
    categories: &[String],
    slots: &mut Vec<Slot<'a>>,
) {
    for (key, category) in map.iter_mut() {
        let label = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        let wanted = categories.iter().any(|c| c == key);

        match category {
            Category::Entries(entries) if wanted => slots.push(Slot { label, entries }),
            Category::Split(split) if wanted => {
                slots.push(Slot {
                    label: format!("{label}.results"),
                    entries: &mut split.results,
                });
                slots.push(Slot {
                    label: format!("{label}.exact"),
                    entries: &mut split.exact,
                });
            },
            Category::Nested(inner) => collect(inner, Some(&label), categories, slots),
            _ => {},
        }
    }
}
