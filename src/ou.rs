//! Organizational unit extraction from distinguished names.
//!
//! Directory trees often nest the unit that matters under a generic
//! container, e.g. `CN=hunter1,OU=cyberfirst,OU=Mail,DC=frist,DC=loc`.
//! [`OuExtractor`] skips such containers so that every user below `Mail`
//! does not end up in the same bucket.

use std::collections::HashSet;

/// Picks the specific OU out of a DN.
#[derive(Debug, Clone)]
pub struct OuExtractor {
    generic: HashSet<String>,
}

impl Default for OuExtractor {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_GENERIC_OUS.iter().copied())
    }
}

impl OuExtractor {
    /// Create a new [`OuExtractor`] with a deny-list of generic OU names.
    pub fn new<I, S>(generic: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            generic: generic
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    /// Whether `value` is a generic container name.
    pub fn is_generic(&self, value: &str) -> bool {
        self.generic.contains(&value.trim().to_lowercase())
    }

    /// Extract the specific OU of `dn`.
    ///
    /// Returns the left-most `OU=` component whose value is not generic,
    /// or the left-most `OU=` component when all of them are generic.
    /// The component is returned as written in the DN, e.g.
    /// `OU=cyberfirst`. An empty string means the DN has no OU at all.
    pub fn extract(&self, dn: &str) -> String {
        let units = ou_components(dn);

        let Some(first) = units.first() else {
            tracing::debug!(%dn, "no OU component in DN");
            return String::new();
        };

        let selected = units
            .iter()
            .find(|unit| !self.is_generic(unit.value))
            .unwrap_or(first);

        tracing::debug!(%dn, levels = units.len(), ou = selected.raw, "selected OU");
        selected.raw.to_owned()
    }
}

/// One `OU=value` component of a DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Component<'a> {
    raw: &'a str,
    value: &'a str,
}

impl<'a> Component<'a> {
    /// Parse `raw` as an `OU=value` component with a non-empty value.
    fn parse(raw: &'a str) -> Option<Self> {
        let (attribute, value) = raw.split_once('=')?;
        let value = value.trim();

        (attribute.trim().eq_ignore_ascii_case("ou") && !value.is_empty())
            .then_some(Component { raw, value })
    }
}

/// Every `OU=` component of `dn`, most specific first.
fn ou_components(dn: &str) -> Vec<Component<'_>> {
    split_dn(dn).into_iter().filter_map(Component::parse).collect()
}

/// Split a DN on unescaped commas and trim each component.
fn split_dn(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (idx, c) in dn.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                parts.push(dn[start..idx].trim());
                start = idx + 1;
            },
            _ => {},
        }
    }
    parts.push(dn[start..].trim());

    parts.retain(|part| !part.is_empty());
    parts
}

/// Value of an OU as returned by [`OuExtractor::extract`]: `OU = Sales`
/// yields `Sales`. Anything else is taken as a bare value.
pub fn unit_value(ou: &str) -> &str {
    let ou = ou.trim();
    match ou.split_once('=') {
        Some((attribute, value)) if attribute.trim().eq_ignore_ascii_case("ou") => value.trim(),
        _ => ou,
    }
}

/// Case-insensitive equality of OU values. Empty OUs never match.
pub fn same_unit(a: &str, b: &str) -> bool {
    let (a, b) = (unit_value(a), unit_value(b));
    !a.is_empty() && !b.is_empty() && a.to_lowercase() == b.to_lowercase()
}
