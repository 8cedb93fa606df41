//! Transit stops from the GTFS archive's `stops.txt`.

use serde::{Deserialize, Serialize};

use super::{Attributed, CleanedTable, Dataset, Diagnostics, prepare};
use crate::error::Result;
use crate::schema::{ColumnSpec, RawTable, SchemaMapping};
use crate::spatial::{Attributor, LatLon, Location, NeighborhoodKey};

/// Archive entry holding the stop table.
pub const STOPS_ENTRY: &str = "stops.txt";

pub static SCHEMA: SchemaMapping = SchemaMapping {
    dataset: Dataset::Transit,
    columns: &[
        ColumnSpec::required("stop_id", &["stop_id"]),
        ColumnSpec::optional("stop_name", &["stop_name"]),
        ColumnSpec::required("stop_lat", &["stop_lat"]),
        ColumnSpec::required("stop_lon", &["stop_lon"]),
        ColumnSpec::optional("stop_url", &["stop_url"]),
        ColumnSpec::optional("location_type", &["location_type"]),
        ColumnSpec::optional("wheelchair_boarding", &["wheelchair_boarding"]),
        ColumnSpec::optional("on_street", &["on_street"]),
        ColumnSpec::optional("at_street", &["at_street"]),
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub stop_lat: f64,
    pub stop_lon: f64,
    pub stop_url: Option<String>,
    pub location_type: Option<u32>,
    pub wheelchair_boarding: Option<u32>,
    pub on_street: Option<String>,
    pub at_street: Option<String>,
    pub neighborhood: Option<NeighborhoodKey>,
}

impl Attributed for StopRecord {
    fn neighborhood(&self) -> Option<&NeighborhoodKey> {
        self.neighborhood.as_ref()
    }
}

pub fn clean(mut raw: RawTable, attributor: &Attributor<'_>) -> Result<CleanedTable<StopRecord>> {
    let mut diagnostics = Diagnostics::default();
    let schema = prepare(&SCHEMA, &mut raw, &mut diagnostics)?;

    let mut records = Vec::with_capacity(raw.len());
    for row in &raw.rows {
        let Some(position) = LatLon::from_parts(schema.number(row, "stop_lat"), schema.number(row, "stop_lon"))
        else {
            diagnostics.missing_required += 1;
            continue;
        };
        let Some(stop_id) = schema.text(row, "stop_id") else {
            diagnostics.quarantine(row, "missing stop_id");
            continue;
        };
        records.push(StopRecord {
            stop_id,
            stop_name: schema.text(row, "stop_name"),
            stop_lat: position.lat,
            stop_lon: position.lon,
            stop_url: schema.text(row, "stop_url"),
            location_type: schema.count(row, "location_type"),
            wheelchair_boarding: schema.count(row, "wheelchair_boarding"),
            on_street: schema.text(row, "on_street"),
            at_street: schema.text(row, "at_street"),
            neighborhood: None,
        });
    }

    let locations: Vec<Location<'_>> = records
        .iter()
        .map(|r| Location {
            position: Some(LatLon::new(r.stop_lat, r.stop_lon)),
            ..Default::default()
        })
        .collect();
    let attributed = attributor.attribute_all(&locations);
    for (record, (key, via)) in records.iter_mut().zip(attributed) {
        diagnostics.record_attribution(via);
        record.neighborhood = key;
    }

    Ok(CleanedTable::new(Dataset::Transit, records, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::datasets::tests::raw;
    use crate::spatial::BoundarySet;
    use crate::spatial::boundary::tests::{collection, default_keys, square_feature};

    #[test]
    fn test_clean_stops() {
        let text = collection(&[square_feature("Name", "Roxbury", -71.10, 42.30, -71.08, 42.32)]);
        let set = BoundarySet::from_geojson_str(&text, &default_keys()).unwrap();
        let attributor = Attributor::new(&set, &PipelineConfig::default());

        let extract = "\
stop_id,stop_name,stop_lat,stop_lon,wheelchair_boarding,location_type
place-dudly,Nubian,42.3294,-71.0838,1,1
1,Washington St @ Melnea Cass,42.31,-71.09,1,0
2,Warren St,42.315,-71.085,,0
3,No Coordinates,,,0,0
,Orphan,42.31,-71.09,0,0
";
        let table = clean(raw(extract), &attributor).unwrap();

        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.diagnostics.missing_required, 1);
        assert_eq!(table.diagnostics.rejected, 1);
        assert_eq!(table.diagnostics.quarantined[0].reason, "missing stop_id");
        assert!(table.rows[0].neighborhood.is_none());
        assert_eq!(table.rows[1].neighborhood.as_ref().unwrap().as_str(), "Roxbury");
        assert_eq!(table.rows[2].wheelchair_boarding, None);
        assert_eq!(table.diagnostics.attributed_by_polygon, 2);
    }

    #[test]
    fn test_stops_without_position_columns_is_schema_mismatch() {
        let set = BoundarySet::empty();
        let attributor = Attributor::new(&set, &PipelineConfig::default());
        assert!(clean(raw("stop_id,stop_name\n1,A\n"), &attributor).is_err());
    }
}
