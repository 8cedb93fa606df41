//! Static postal-code -> neighborhood table used when coordinates are unusable.

use std::collections::BTreeMap;

use crate::schema::normalize::normalize_postal_code;

/// Built-in Boston ZIP code assignments.
const BOSTON_ZIP_CODES: &[(&str, &str)] = &[
    ("02108", "Beacon Hill"),
    ("02109", "North End"),
    ("02110", "Downtown"),
    ("02111", "Chinatown"),
    ("02113", "North End"),
    ("02114", "West End"),
    ("02115", "Fenway"),
    ("02116", "Back Bay"),
    ("02118", "South End"),
    ("02119", "Roxbury"),
    ("02120", "Mission Hill"),
    ("02121", "Roxbury"),
    ("02122", "Dorchester"),
    ("02124", "Dorchester"),
    ("02125", "Dorchester"),
    ("02126", "Mattapan"),
    ("02127", "South Boston"),
    ("02128", "East Boston"),
    ("02129", "Charlestown"),
    ("02130", "Jamaica Plain"),
    ("02131", "Roslindale"),
    ("02132", "West Roxbury"),
    ("02134", "Allston"),
    ("02135", "Brighton"),
    ("02136", "Hyde Park"),
    ("02151", "East Boston"),
    ("02163", "Allston"),
    ("02171", "Harbor Islands"),
    ("02199", "Back Bay"),
    ("02201", "Downtown"),
    ("02203", "Downtown"),
    ("02210", "South Boston Waterfront"),
    ("02211", "Downtown"),
    ("02215", "Fenway"),
    ("02228", "East Boston"),
    ("02446", "Longwood"),
    ("02467", "Brighton"),
];

#[derive(Debug, Clone)]
pub struct PostalLookup {
    table: BTreeMap<String, String>,
}

impl PostalLookup {
    pub fn boston() -> Self {
        Self {
            table: BOSTON_ZIP_CODES
                .iter()
                .map(|(zip, name)| (zip.to_string(), name.to_string()))
                .collect(),
        }
    }

    /// Adds or replaces entries. Keys must already be 5-digit codes.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        self.table
            .extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Neighborhood name for a raw postal code in any accepted spelling.
    pub fn lookup(&self, raw: &str) -> Option<&str> {
        let code = normalize_postal_code(raw)?;
        self.table.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for PostalLookup {
    fn default() -> Self {
        Self::boston()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_normalizes_spelling() {
        let lookup = PostalLookup::boston();
        assert_eq!(lookup.lookup("2134"), Some("Allston"));
        assert_eq!(lookup.lookup("02130.0"), Some("Jamaica Plain"));
        assert_eq!(lookup.lookup("02116-4401"), Some("Back Bay"));
        assert_eq!(lookup.lookup("90210"), None);
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let overrides = BTreeMap::from([
            ("02446".to_string(), "Brookline".to_string()),
            ("02445".to_string(), "Brookline".to_string()),
        ]);
        let lookup = PostalLookup::boston().with_overrides(&overrides);
        assert_eq!(lookup.lookup("02446"), Some("Brookline"));
        assert_eq!(lookup.lookup("02445"), Some("Brookline"));
        assert_eq!(lookup.len(), BOSTON_ZIP_CODES.len() + 1);
    }
}
