//! Public schools.

use serde::{Deserialize, Serialize};

use super::{Attributed, CleanedTable, Dataset, Diagnostics, prepare};
use crate::error::Result;
use crate::schema::{ColumnSpec, RawTable, SchemaMapping};
use crate::spatial::{Attributor, LatLon, Location, NeighborhoodKey};

pub static SCHEMA: SchemaMapping = SchemaMapping {
    dataset: Dataset::Schools,
    columns: &[
        ColumnSpec::required("name", &["name", "SCH_NAME", "BLDG_NAME"]),
        ColumnSpec::optional("address", &["ADDRESS"]),
        ColumnSpec::optional("city", &["CITY", "neighborhood"]),
        ColumnSpec::optional("zip_code", &["ZIPCODE", "ZIP_CODE", "zip"]),
        ColumnSpec::optional("school_type", &["SCH_TYPE"]),
        ColumnSpec::optional("latitude", &["Lat", "latitude"]),
        ColumnSpec::optional("longitude", &["Long", "longitude"]),
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRecord {
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub school_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub neighborhood: Option<NeighborhoodKey>,
}

impl Attributed for SchoolRecord {
    fn neighborhood(&self) -> Option<&NeighborhoodKey> {
        self.neighborhood.as_ref()
    }
}

pub fn clean(mut raw: RawTable, attributor: &Attributor<'_>) -> Result<CleanedTable<SchoolRecord>> {
    let mut diagnostics = Diagnostics::default();
    let schema = prepare(&SCHEMA, &mut raw, &mut diagnostics)?;

    let mut records = Vec::with_capacity(raw.len());
    for row in &raw.rows {
        let Some(name) = schema.text(row, "name") else {
            diagnostics.missing_required += 1;
            continue;
        };
        records.push(SchoolRecord {
            name,
            address: schema.text(row, "address"),
            city: schema.text(row, "city"),
            zip_code: schema.postal_code(row, "zip_code"),
            school_type: schema.text(row, "school_type"),
            latitude: schema.number(row, "latitude"),
            longitude: schema.number(row, "longitude"),
            neighborhood: None,
        });
    }

    // CITY holds the neighborhood name for Boston addresses ("Roxbury",
    // "Dorchester"), so it doubles as the name fallback.
    let locations: Vec<Location<'_>> = records
        .iter()
        .map(|r| Location {
            position: LatLon::from_parts(r.latitude, r.longitude),
            postal_code: r.zip_code.as_deref(),
            name: r.city.as_deref(),
        })
        .collect();
    let attributed = attributor.attribute_all(&locations);
    for (record, (key, via)) in records.iter_mut().zip(attributed) {
        diagnostics.record_attribution(via);
        record.neighborhood = key;
    }

    Ok(CleanedTable::new(Dataset::Schools, records, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::datasets::tests::raw;
    use crate::spatial::BoundarySet;
    use crate::spatial::boundary::tests::{collection, default_keys, square_feature};

    #[test]
    fn test_clean_schools_fallback_chain() {
        let text = collection(&[
            square_feature("Name", "Roxbury", -71.10, 42.30, -71.08, 42.32),
            square_feature("Name", "Dorchester", -71.08, 42.28, -71.04, 42.32),
        ]);
        let set = BoundarySet::from_geojson_str(&text, &default_keys()).unwrap();
        let attributor = Attributor::new(&set, &PipelineConfig::default());

        let extract = "\
SCH_NAME,CITY,ZIPCODE,Lat,Long
Dearborn,Roxbury,2119,42.31,-71.09
Holland,Dorchester,,,
Mystery,Roxbury,02119,,
Elsewhere,Springfield,,,
,Roxbury,02119,42.31,-71.09
";
        let table = clean(raw(extract), &attributor).unwrap();
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.diagnostics.missing_required, 1);

        let keys: Vec<Option<&str>> = table
            .rows
            .iter()
            .map(|r| r.neighborhood.as_ref().map(|k| k.as_str()))
            .collect();
        assert_eq!(keys, vec![Some("Roxbury"), Some("Dorchester"), Some("Roxbury"), None]);
        assert_eq!(table.diagnostics.attributed_by_polygon, 1);
        assert_eq!(table.diagnostics.attributed_by_name, 1);
        assert_eq!(table.diagnostics.attributed_by_postal_code, 1);
        assert_eq!(table.diagnostics.unattributed, 1);
        assert_eq!(table.rows[0].zip_code.as_deref(), Some("02119"));
    }
}
