//! Neighborhood boundary polygons and the R-tree used to query them.

use std::collections::HashSet;
use std::path::Path;

use geo::{Area, BoundingRect, Contains, Intersects, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, GeoJson};
use rstar::RTree;
use rstar::primitives::{GeomWithData, Rectangle};
use tracing::{debug, info, warn};

use super::crs::Crs;
use super::key::NeighborhoodKey;
use super::LatLon;
use crate::datasets::Dataset;
use crate::error::Result;
use crate::schema::raw::read_source_text;

type IndexedEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// A named neighborhood polygon in the boundary file's CRS.
#[derive(Debug, Clone)]
pub struct NeighborhoodPolygon {
    pub key: NeighborhoodKey,
    pub geometry: MultiPolygon<f64>,
    /// Planar area in CRS units; used to break ties between overlapping matches.
    pub area: f64,
}

/// The set of neighborhood polygons for one run. Immutable once loaded.
#[derive(Debug)]
pub struct BoundarySet {
    polygons: Vec<NeighborhoodPolygon>,
    index: RTree<IndexedEnvelope>,
    crs: Crs,
    name_key: Option<String>,
    collection: FeatureCollection,
    duplicates_dropped: usize,
}

impl BoundarySet {
    pub fn empty() -> Self {
        Self {
            polygons: Vec::new(),
            index: RTree::new(),
            crs: Crs::Wgs84,
            name_key: None,
            collection: FeatureCollection {
                bbox: None,
                features: Vec::new(),
                foreign_members: None,
            },
            duplicates_dropped: 0,
        }
    }

    pub fn load(path: &Path, name_keys: &[String]) -> Result<Self> {
        let text = read_source_text(Dataset::Boundaries, path)?;
        let set = Self::from_geojson_str(&text, name_keys)?;
        if set.is_empty() {
            warn!(path = %path.display(), "Boundary file contains no usable polygons");
        } else {
            info!(
                path = %path.display(),
                polygons = set.len(),
                crs = ?set.crs,
                name_key = set.name_key.as_deref().unwrap_or(""),
                "Neighborhood boundaries loaded"
            );
        }
        Ok(set)
    }

    pub fn from_geojson_str(text: &str, name_keys: &[String]) -> Result<Self> {
        let geojson: GeoJson = text.parse()?;
        let collection = FeatureCollection::try_from(geojson)?;
        Ok(Self::from_collection(collection, name_keys))
    }

    /// Builds the set from a feature collection.
    ///
    /// Exact-duplicate features are dropped. The name property is the first of
    /// `name_keys` present on any feature, and that one key is used for every
    /// feature.
    pub fn from_collection(mut collection: FeatureCollection, name_keys: &[String]) -> Self {
        let crs = Crs::of_collection(&collection);

        let duplicates_dropped = drop_duplicate_features(&mut collection.features);

        let name_key = choose_name_key(&collection.features, name_keys);

        let mut polygons = Vec::new();
        if let Some(key) = name_key.as_deref() {
            for (position, feature) in collection.features.iter().enumerate() {
                let Some(name) = feature_name(feature, key) else {
                    warn!(feature = position, name_key = key, "Boundary feature has no name, skipping");
                    continue;
                };
                let Some(geometry) = feature_multipolygon(feature) else {
                    warn!(feature = position, neighborhood = %name, "Boundary feature has no polygonal geometry, skipping");
                    continue;
                };
                let area = geometry.unsigned_area();
                if area <= 0.0 {
                    warn!(feature = position, neighborhood = %name, "Boundary polygon has zero area, skipping");
                    continue;
                }
                polygons.push(NeighborhoodPolygon {
                    key: name,
                    geometry,
                    area,
                });
            }
        } else if !collection.features.is_empty() {
            warn!(candidates = ?name_keys, "No boundary name property found on any feature");
        }

        let envelopes = polygons
            .iter()
            .enumerate()
            .filter_map(|(i, polygon)| {
                let rect = polygon.geometry.bounding_rect()?;
                Some(GeomWithData::new(
                    Rectangle::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                    i,
                ))
            })
            .collect();

        Self {
            polygons,
            index: RTree::bulk_load(envelopes),
            crs,
            name_key,
            collection,
            duplicates_dropped,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn polygons(&self) -> &[NeighborhoodPolygon] {
        &self.polygons
    }

    pub fn keys(&self) -> impl Iterator<Item = &NeighborhoodKey> {
        self.polygons.iter().map(|p| &p.key)
    }

    /// The cleaned feature collection (duplicates removed), in file order.
    pub fn collection(&self) -> &FeatureCollection {
        &self.collection
    }

    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }

    /// The neighborhood name of a feature, read through the chosen name key.
    pub fn feature_key(&self, feature: &Feature) -> Option<NeighborhoodKey> {
        feature_name(feature, self.name_key.as_deref()?)
    }

    /// Neighborhood containing a WGS84 position.
    pub fn locate(&self, position: LatLon) -> Option<&NeighborhoodKey> {
        let point = self.crs.project(position)?;
        self.locate_projected(point)
    }

    /// Neighborhood containing a point already expressed in this set's CRS.
    ///
    /// Interior containment is preferred over boundary contact. Among several
    /// matches the smallest polygon wins, then the earliest in file order.
    pub fn locate_projected(&self, point: Point<f64>) -> Option<&NeighborhoodKey> {
        let mut candidates: Vec<usize> = self
            .index
            .locate_all_at_point(&[point.x(), point.y()])
            .map(|envelope| envelope.data)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_unstable();

        let interior = candidates
            .iter()
            .copied()
            .filter(|&i| self.polygons[i].geometry.contains(&point));
        let chosen = self.smallest(interior).or_else(|| {
            let touching = candidates
                .iter()
                .copied()
                .filter(|&i| self.polygons[i].geometry.intersects(&point));
            self.smallest(touching)
        })?;

        Some(&self.polygons[chosen].key)
    }

    fn smallest(&self, matches: impl Iterator<Item = usize>) -> Option<usize> {
        matches.min_by(|&a, &b| {
            self.polygons[a]
                .area
                .total_cmp(&self.polygons[b].area)
                .then(a.cmp(&b))
        })
    }
}

fn choose_name_key(features: &[Feature], name_keys: &[String]) -> Option<String> {
    let present: Vec<&String> = name_keys
        .iter()
        .filter(|key| !key.trim().is_empty())
        .filter(|key| features.iter().any(|f| feature_name(f, key).is_some()))
        .collect();

    let (chosen, ignored) = present.split_first()?;
    if !ignored.is_empty() {
        warn!(
            name_key = %chosen,
            ?ignored,
            "Boundary features carry several name properties, using the first in priority order"
        );
    } else {
        debug!(name_key = %chosen, "Boundary name property resolved");
    }
    Some((*chosen).clone())
}

fn feature_name(feature: &Feature, key: &str) -> Option<NeighborhoodKey> {
    feature
        .property(key)
        .and_then(|value| value.as_str())
        .and_then(NeighborhoodKey::new)
}

/// Drops features identical to an earlier one, keeping file order. Returns the number dropped.
pub fn drop_duplicate_features(features: &mut Vec<Feature>) -> usize {
    retain_first(features, |feature| serde_json::to_string(feature).ok())
}

/// Keeps the first item per key. Items without a key are never treated as duplicates.
fn retain_first<T>(items: &mut Vec<T>, key: impl Fn(&T) -> Option<String>) -> usize {
    let before = items.len();
    let mut seen = HashSet::new();
    items.retain(|item| key(item).is_none_or(|k| seen.insert(k)));
    before - items.len()
}

/// Polygon or multipolygon geometry of a feature, if it has one.
pub fn feature_multipolygon(feature: &Feature) -> Option<MultiPolygon<f64>> {
    let geometry = feature.geometry.as_ref()?;
    match geo::Geometry::<f64>::try_from(geometry.value.clone()).ok()? {
        geo::Geometry::Polygon(polygon) => Some(MultiPolygon::new(vec![polygon])),
        geo::Geometry::MultiPolygon(multi) if !multi.0.is_empty() => Some(multi),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn default_keys() -> Vec<String> {
        ["Name", "neighborhood", "NEIGHBORHO", "name"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Square polygon feature spanning `[x0, x1] x [y0, y1]` (lon, lat).
    pub(crate) fn square_feature(key: &str, name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> String {
        format!(
            r#"{{ "type": "Feature", "properties": {{ "{key}": "{name}" }},
                 "geometry": {{ "type": "Polygon", "coordinates": [[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]] }} }}"#
        )
    }

    pub(crate) fn collection(features: &[String]) -> String {
        format!(
            r#"{{ "type": "FeatureCollection", "features": [{}] }}"#,
            features.join(",")
        )
    }

    #[test]
    fn test_point_inside_single_polygon() {
        let text = collection(&[
            square_feature("Name", "Roxbury", -71.10, 42.30, -71.08, 42.32),
            square_feature("Name", "Fenway", -71.12, 42.33, -71.09, 42.35),
        ]);
        let set = BoundarySet::from_geojson_str(&text, &default_keys()).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(
            set.locate(LatLon::new(42.31, -71.09)).map(|k| k.as_str()),
            Some("Roxbury")
        );
        assert_eq!(
            set.locate(LatLon::new(42.34, -71.10)).map(|k| k.as_str()),
            Some("Fenway")
        );
    }

    #[test]
    fn test_point_outside_every_polygon() {
        let text = collection(&[square_feature("Name", "Roxbury", -71.10, 42.30, -71.08, 42.32)]);
        let set = BoundarySet::from_geojson_str(&text, &default_keys()).unwrap();
        assert!(set.locate(LatLon::new(42.40, -71.00)).is_none());
    }

    #[test]
    fn test_overlap_prefers_smallest_polygon() {
        let text = collection(&[
            square_feature("Name", "Big", -71.20, 42.20, -71.00, 42.40),
            square_feature("Name", "Small", -71.11, 42.29, -71.09, 42.31),
        ]);
        let set = BoundarySet::from_geojson_str(&text, &default_keys()).unwrap();
        assert_eq!(
            set.locate(LatLon::new(42.30, -71.10)).map(|k| k.as_str()),
            Some("Small")
        );
        assert_eq!(
            set.locate(LatLon::new(42.38, -71.18)).map(|k| k.as_str()),
            Some("Big")
        );
    }

    #[test]
    fn test_shared_boundary_goes_to_smaller_polygon() {
        let text = collection(&[
            square_feature("Name", "West", -71.20, 42.30, -71.10, 42.40),
            square_feature("Name", "East", -71.10, 42.30, -71.05, 42.40),
        ]);
        let set = BoundarySet::from_geojson_str(&text, &default_keys()).unwrap();
        assert_eq!(
            set.locate(LatLon::new(42.35, -71.10)).map(|k| k.as_str()),
            Some("East")
        );
    }

    #[test]
    fn test_name_key_priority_is_pinned() {
        let text = r#"{ "type": "FeatureCollection", "features": [
            { "type": "Feature",
              "properties": { "neighborhood": "nb-name", "Name": "Name-name" },
              "geometry": { "type": "Polygon", "coordinates": [[[-71.1,42.3],[-71.0,42.3],[-71.0,42.4],[-71.1,42.3]]] } }
        ] }"#;
        let set = BoundarySet::from_geojson_str(text, &default_keys()).unwrap();
        assert_eq!(set.keys().next().map(|k| k.as_str()), Some("Name-name"));
    }

    #[test]
    fn test_duplicate_features_dropped() {
        let feature = square_feature("Name", "Roxbury", -71.10, 42.30, -71.08, 42.32);
        let text = collection(&[feature.clone(), feature]);
        let set = BoundarySet::from_geojson_str(&text, &default_keys()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.duplicates_dropped(), 1);
        assert_eq!(set.collection().features.len(), 1);
    }

    #[test]
    fn test_unkeyed_items_are_never_duplicates() {
        let mut items = vec![Some("a"), None, Some("a"), None, Some("b")];
        let dropped = retain_first(&mut items, |item| item.map(String::from));
        assert_eq!(dropped, 1);
        assert_eq!(items, vec![Some("a"), None, None, Some("b")]);
    }

    #[test]
    fn test_web_mercator_boundaries_reproject_points() {
        let (x0, y0) = crate::spatial::crs::to_web_mercator(LatLon::new(42.30, -71.10));
        let (x1, y1) = crate::spatial::crs::to_web_mercator(LatLon::new(42.32, -71.08));
        let text = format!(
            r#"{{ "type": "FeatureCollection",
                 "crs": {{ "type": "name", "properties": {{ "name": "EPSG:3857" }} }},
                 "features": [{}] }}"#,
            square_feature("Name", "Roxbury", x0, y0, x1, y1)
        );
        let set = BoundarySet::from_geojson_str(&text, &default_keys()).unwrap();
        assert_eq!(set.crs(), Crs::WebMercator);
        assert_eq!(
            set.locate(LatLon::new(42.31, -71.09)).map(|k| k.as_str()),
            Some("Roxbury")
        );
    }

    #[test]
    fn test_malformed_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.geojson");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(BoundarySet::load(&path, &default_keys()).is_err());

        let missing = dir.path().join("missing.geojson");
        assert!(matches!(
            BoundarySet::load(&missing, &default_keys()),
            Err(crate::error::PipelineError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_features_without_polygons_yield_empty_set() {
        let text = r#"{ "type": "FeatureCollection", "features": [
            { "type": "Feature", "properties": { "Name": "Dot" },
              "geometry": { "type": "Point", "coordinates": [-71.05, 42.30] } }
        ] }"#;
        let set = BoundarySet::from_geojson_str(text, &default_keys()).unwrap();
        assert!(set.is_empty());
        assert!(set.locate(LatLon::new(42.30, -71.05)).is_none());
    }
}
