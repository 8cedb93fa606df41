use std::collections::HashMap;

use geojson::FeatureCollection;
use serde_json::Value;
use tracing::{info, warn};

use super::NeighborhoodSummary;
use crate::error::Result;
use crate::spatial::{BoundarySet, NeighborhoodKey};

/// Copies the boundary collection and merges each feature's summary row into
/// its properties. `median_home_value` repeats `median_property_value` for
/// map consumers that expect that name.
pub fn enrich_boundaries(boundaries: &BoundarySet, summaries: &[NeighborhoodSummary]) -> Result<FeatureCollection> {
    let by_key: HashMap<&NeighborhoodKey, &NeighborhoodSummary> =
        summaries.iter().map(|s| (&s.neighborhood, s)).collect();

    let mut enriched = boundaries.collection().clone();
    let mut matched = 0usize;
    for (position, feature) in enriched.features.iter_mut().enumerate() {
        let key = boundaries.feature_key(feature);
        let Some(summary) = key.as_ref().and_then(|k| by_key.get(k)) else {
            warn!(
                feature = position,
                neighborhood = key.as_ref().map(|k| k.as_str()).unwrap_or(""),
                "Boundary feature has no summary row"
            );
            continue;
        };

        if let Value::Object(fields) = serde_json::to_value(summary)? {
            for (name, value) in fields {
                feature.set_property(name, value);
            }
        }
        feature.set_property("median_home_value", summary.median_property_value);
        matched += 1;
    }

    info!(
        features = enriched.features.len(),
        matched,
        "Boundary features enriched"
    );
    Ok(enriched)
}
