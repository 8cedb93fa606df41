//! Parks and open-space parcels (GeoJSON).

use std::path::Path;

use geo::{Area, InteriorPoint, MapCoords};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde_json::Value;
use tracing::warn;

use super::{Attributed, CleanedTable, Dataset, Diagnostics};
use crate::error::Result;
use crate::schema::raw::read_source_text;
use crate::spatial::boundary::{drop_duplicate_features, feature_multipolygon};
use crate::spatial::{Attributor, Crs, Location, NeighborhoodKey};

const NAME_KEYS: &[&str] = &["SITE_NAME", "name", "Name"];

/// One valid open-space parcel.
#[derive(Debug, Clone)]
pub struct OpenSpaceParcel {
    pub name: Option<String>,
    /// Planar area in EPSG:3857 square meters.
    pub area: f64,
    pub neighborhood: Option<NeighborhoodKey>,
    /// Source feature with `area` and `neighborhood` written into its properties.
    pub feature: Feature,
}

impl Attributed for OpenSpaceParcel {
    fn neighborhood(&self) -> Option<&NeighborhoodKey> {
        self.neighborhood.as_ref()
    }
}

pub fn read(path: &Path) -> Result<FeatureCollection> {
    let geojson: GeoJson = read_source_text(Dataset::OpenSpace, path)?.parse()?;
    Ok(FeatureCollection::try_from(geojson)?)
}

/// Cleans an open-space collection: duplicates and features without a
/// positive-area polygon are dropped, area is measured in Web Mercator
/// meters, and each parcel is attributed from an interior point.
pub fn clean(mut collection: FeatureCollection, attributor: &Attributor<'_>) -> Result<CleanedTable<OpenSpaceParcel>> {
    let crs = Crs::of_collection(&collection);
    let mut diagnostics = Diagnostics {
        rows_read: collection.features.len(),
        duplicates_dropped: drop_duplicate_features(&mut collection.features),
        ..Default::default()
    };

    let mut parcels = Vec::with_capacity(collection.features.len());
    let mut anchors = Vec::with_capacity(collection.features.len());
    for (position, feature) in collection.features.into_iter().enumerate() {
        let Some(geometry) = feature_multipolygon(&feature) else {
            warn!(feature = position, "Open-space feature has no polygonal geometry, dropping");
            diagnostics.rejected += 1;
            continue;
        };
        let area = geometry.map_coords(|c| crs.to_meters(c)).unsigned_area();
        if !area.is_finite() || area <= 0.0 {
            warn!(feature = position, "Open-space feature has zero area, dropping");
            diagnostics.rejected += 1;
            continue;
        }

        anchors.push(geometry.interior_point().map(|p| crs.unproject(p)));
        parcels.push(OpenSpaceParcel {
            name: NAME_KEYS
                .iter()
                .find_map(|key| feature.property(key).and_then(Value::as_str))
                .map(str::to_string),
            area,
            neighborhood: None,
            feature,
        });
    }

    let locations: Vec<Location<'_>> = anchors
        .into_iter()
        .map(|anchor| Location {
            position: anchor.filter(|p| p.is_valid()),
            ..Default::default()
        })
        .collect();
    let attributed = attributor.attribute_all(&locations);
    for (parcel, (key, via)) in parcels.iter_mut().zip(attributed) {
        diagnostics.record_attribution(via);
        parcel.feature.set_property("area", parcel.area);
        parcel.feature.set_property(
            "neighborhood",
            key.as_ref().map_or(Value::Null, |k| Value::from(k.as_str())),
        );
        parcel.neighborhood = key;
    }

    Ok(CleanedTable::new(Dataset::OpenSpace, parcels, diagnostics))
}

/// Reassembles cleaned parcels into a feature collection for output.
/// `foreign_members` of the source collection, such as a legacy `crs`
/// declaration, are carried over so coordinates keep their meaning.
pub fn to_collection(parcels: &[OpenSpaceParcel], foreign_members: Option<JsonObject>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: parcels.iter().map(|p| p.feature.clone()).collect(),
        foreign_members,
    }
}
