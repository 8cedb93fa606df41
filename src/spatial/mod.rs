//! Neighborhood attribution.
//!
//! Assigns records to neighborhoods by point-in-polygon containment against
//! the boundary set, falling back to a postal-code table and then to an
//! explicit name column when coordinates cannot be used.

pub mod boundary;
pub mod crs;
pub mod key;
pub mod postal;

pub use boundary::{BoundarySet, NeighborhoodPolygon};
pub use crs::Crs;
pub use key::{KeyResolver, NeighborhoodKey};
pub use postal::PostalLookup;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite, in range, and not the `(0, 0)` placeholder used for missing geocodes.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
            && !(self.lat == 0.0 && self.lon == 0.0)
    }

    /// Builds a position from optional parts, keeping it only if valid.
    pub fn from_parts(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
        let position = Self::new(lat?, lon?);
        position.is_valid().then_some(position)
    }
}

/// Everything a record offers for attribution, in fallback order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Location<'r> {
    pub position: Option<LatLon>,
    pub postal_code: Option<&'r str>,
    pub name: Option<&'r str>,
}

/// How a record ended up with (or without) a neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Polygon,
    PostalCode,
    Name,
    Unmatched,
}

/// Attribution service for one run. Shares the boundary set read-only.
#[derive(Debug)]
pub struct Attributor<'b> {
    boundaries: &'b BoundarySet,
    postal: PostalLookup,
    resolver: KeyResolver,
}

impl<'b> Attributor<'b> {
    pub fn new(boundaries: &'b BoundarySet, config: &PipelineConfig) -> Self {
        Self::with_parts(
            boundaries,
            PostalLookup::boston().with_overrides(&config.postal_codes),
            KeyResolver::new(boundaries.keys(), &config.neighborhood_aliases),
        )
    }

    pub fn with_parts(boundaries: &'b BoundarySet, postal: PostalLookup, resolver: KeyResolver) -> Self {
        Self {
            boundaries,
            postal,
            resolver,
        }
    }

    pub fn boundaries(&self) -> &BoundarySet {
        self.boundaries
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    pub fn has_polygons(&self) -> bool {
        !self.boundaries.is_empty()
    }

    /// One neighborhood (or `None`) per point, in input order.
    ///
    /// With an empty boundary set every result is `None`.
    pub fn attribute(&self, points: &[LatLon]) -> Vec<Option<NeighborhoodKey>> {
        points
            .iter()
            .map(|&point| self.boundaries.locate(point).cloned())
            .collect()
    }

    pub fn by_postal_code(&self, raw: &str) -> Option<NeighborhoodKey> {
        self.postal
            .lookup(raw)
            .and_then(|name| self.resolver.resolve(name))
    }

    pub fn by_name(&self, raw: &str) -> Option<NeighborhoodKey> {
        self.resolver.resolve_known(raw)
    }

    /// Attributes a batch of records.
    ///
    /// Positions go through polygon containment when boundaries are loaded; a
    /// located-but-unmatched position stays unmatched. Records without a usable
    /// position, or every record when no boundaries are loaded, fall back to
    /// postal code and then name.
    pub fn attribute_all(&self, locations: &[Location<'_>]) -> Vec<(Option<NeighborhoodKey>, Attribution)> {
        let points: Vec<LatLon> = locations.iter().filter_map(|l| l.position).collect();
        let mut located = self.attribute(&points).into_iter();

        locations
            .iter()
            .map(|location| {
                let hit = location.position.and_then(|_| located.next().flatten());
                if location.position.is_some() && self.has_polygons() {
                    match hit {
                        Some(key) => (Some(key), Attribution::Polygon),
                        None => (None, Attribution::Unmatched),
                    }
                } else {
                    self.fallback(location)
                }
            })
            .collect()
    }

    fn fallback(&self, location: &Location<'_>) -> (Option<NeighborhoodKey>, Attribution) {
        if let Some(key) = location.postal_code.and_then(|code| self.by_postal_code(code)) {
            return (Some(key), Attribution::PostalCode);
        }
        if let Some(key) = location.name.and_then(|name| self.by_name(name)) {
            return (Some(key), Attribution::Name);
        }
        (None, Attribution::Unmatched)
    }
}

#[cfg(test)]
mod tests {
    use super::boundary::tests::{collection, default_keys, square_feature};
    use super::*;

    fn boundaries() -> BoundarySet {
        let text = collection(&[
            square_feature("Name", "Roxbury", -71.10, 42.30, -71.08, 42.32),
            square_feature("Name", "Allston", -71.14, 42.35, -71.12, 42.37),
        ]);
        BoundarySet::from_geojson_str(&text, &default_keys()).unwrap()
    }

    #[test]
    fn test_attribute_preserves_order() {
        let set = boundaries();
        let attributor = Attributor::new(&set, &PipelineConfig::default());
        let keys = attributor.attribute(&[
            LatLon::new(42.36, -71.13),
            LatLon::new(10.0, 10.0),
            LatLon::new(42.31, -71.09),
        ]);
        let names: Vec<Option<&str>> = keys.iter().map(|k| k.as_ref().map(|k| k.as_str())).collect();
        assert_eq!(names, vec![Some("Allston"), None, Some("Roxbury")]);
    }

    #[test]
    fn test_empty_boundaries_yield_all_absent() {
        let set = BoundarySet::empty();
        let attributor = Attributor::new(&set, &PipelineConfig::default());
        let keys = attributor.attribute(&[LatLon::new(42.31, -71.09), LatLon::new(42.36, -71.13)]);
        assert_eq!(keys, vec![None, None]);
    }

    #[test]
    fn test_attribute_all_fallback_chain() {
        let set = boundaries();
        let attributor = Attributor::new(&set, &PipelineConfig::default());
        let locations = [
            Location {
                position: Some(LatLon::new(42.31, -71.09)),
                postal_code: Some("02134"),
                ..Default::default()
            },
            Location {
                position: None,
                postal_code: Some("2134"),
                ..Default::default()
            },
            Location {
                position: Some(LatLon::new(41.0, -70.0)),
                postal_code: Some("02134"),
                ..Default::default()
            },
            Location {
                position: None,
                postal_code: Some("99999"),
                name: Some("ROXBURY"),
            },
            Location {
                position: None,
                postal_code: None,
                name: Some("Boston"),
            },
        ];
        let results = attributor.attribute_all(&locations);
        let summary: Vec<(Option<&str>, Attribution)> = results
            .iter()
            .map(|(k, via)| (k.as_ref().map(|k| k.as_str()), *via))
            .collect();

        assert_eq!(
            summary,
            vec![
                (Some("Roxbury"), Attribution::Polygon),
                (Some("Allston"), Attribution::PostalCode),
                (None, Attribution::Unmatched),
                (Some("Roxbury"), Attribution::Name),
                (None, Attribution::Unmatched),
            ]
        );
    }

    #[test]
    fn test_postal_fallback_when_boundaries_missing() {
        let set = BoundarySet::empty();
        let attributor = Attributor::new(&set, &PipelineConfig::default());
        let results = attributor.attribute_all(&[Location {
            position: Some(LatLon::new(42.31, -71.09)),
            postal_code: Some("02119"),
            name: None,
        }]);
        assert_eq!(results[0].0.as_ref().map(|k| k.as_str()), Some("Roxbury"));
        assert_eq!(results[0].1, Attribution::PostalCode);
    }

    #[test]
    fn test_lat_lon_validity() {
        assert!(LatLon::new(42.3, -71.1).is_valid());
        assert!(!LatLon::new(0.0, 0.0).is_valid());
        assert!(LatLon::from_parts(Some(42.3), None).is_none());
    }
}
