use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical neighborhood name; the join key across every cleaned table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NeighborhoodKey(String);

impl NeighborhoodKey {
    /// Trims and collapses internal whitespace. Returns `None` for blank names.
    pub fn new(name: &str) -> Option<Self> {
        let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            None
        } else {
            Some(Self(collapsed))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn folded(&self) -> String {
        fold(&self.0)
    }
}

impl fmt::Display for NeighborhoodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn fold(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Maps name variants from any source onto the canonical spelling.
///
/// Canonical spellings come from the boundary file. Lookups ignore case and
/// repeated whitespace; configured aliases redirect other spellings.
#[derive(Debug, Clone, Default)]
pub struct KeyResolver {
    known: HashMap<String, NeighborhoodKey>,
    aliases: HashMap<String, NeighborhoodKey>,
}

impl KeyResolver {
    pub fn new<'a>(
        canonical: impl IntoIterator<Item = &'a NeighborhoodKey>,
        aliases: &BTreeMap<String, String>,
    ) -> Self {
        let known: HashMap<String, NeighborhoodKey> = canonical
            .into_iter()
            .map(|key| (key.folded(), key.clone()))
            .collect();

        let aliases = aliases
            .iter()
            .filter_map(|(variant, target)| {
                let target = NeighborhoodKey::new(target)?;
                let target = known.get(&target.folded()).cloned().unwrap_or(target);
                Some((fold(variant), target))
            })
            .collect();

        Self { known, aliases }
    }

    pub fn has_known_names(&self) -> bool {
        !self.known.is_empty()
    }

    fn lookup(&self, key: &NeighborhoodKey) -> Option<&NeighborhoodKey> {
        let folded = key.folded();
        self.known.get(&folded).or_else(|| self.aliases.get(&folded))
    }

    /// Canonical key for `raw`, passing unknown names through unchanged.
    pub fn resolve(&self, raw: &str) -> Option<NeighborhoodKey> {
        let key = NeighborhoodKey::new(raw)?;
        Some(self.lookup(&key).cloned().unwrap_or(key))
    }

    /// Canonical key for `raw` only if it names a known neighborhood.
    ///
    /// With no known names (no boundary data), behaves like [`Self::resolve`].
    pub fn resolve_known(&self, raw: &str) -> Option<NeighborhoodKey> {
        let key = NeighborhoodKey::new(raw)?;
        match self.lookup(&key) {
            Some(canonical) => Some(canonical.clone()),
            None if !self.has_known_names() => Some(key),
            None => None,
        }
    }

    pub fn is_known(&self, key: &NeighborhoodKey) -> bool {
        self.lookup(key).is_some()
    }
}
