//! Property assessment extract.

use serde::{Deserialize, Serialize};

use super::{Attributed, CleanedTable, Dataset, Diagnostics, prepare};
use crate::error::{PipelineError, Result};
use crate::schema::{ColumnSpec, RawTable, SchemaMapping};
use crate::spatial::{Attributor, LatLon, Location, NeighborhoodKey};
use crate::stats::positive_median;

pub static SCHEMA: SchemaMapping = SchemaMapping {
    dataset: Dataset::Property,
    columns: &[
        ColumnSpec::required("pid", &["PID", "parcel_id"]),
        ColumnSpec::optional("st_num", &["ST_NUM"]),
        ColumnSpec::optional("st_name", &["ST_NAME"]),
        ColumnSpec::optional("city", &["CITY"]),
        ColumnSpec::optional("zip_code", &["ZIP_CODE", "ZIPCODE", "zip"]),
        ColumnSpec::optional("latitude", &["Lat", "latitude", "LATITUDE"]),
        ColumnSpec::optional("longitude", &["Long", "longitude", "LONGITUDE", "Lon"]),
        ColumnSpec::optional("neighborhood", &["neighborhood", "NEIGHBORHOOD"]),
        ColumnSpec::optional("land_sf", &["LAND_SF"]),
        ColumnSpec::optional("gross_area", &["GROSS_AREA"]),
        ColumnSpec::optional("living_area", &["LIVING_AREA"]),
        ColumnSpec::optional("land_value", &["LAND_VALUE"]),
        ColumnSpec::optional("bldg_value", &["BLDG_VALUE"]),
        ColumnSpec::required("total_value", &["TOTAL_VALUE", "AV_TOTAL"]),
        ColumnSpec::optional("gross_tax", &["GROSS_TAX"]),
        ColumnSpec::optional("yr_built", &["YR_BUILT"]),
        ColumnSpec::optional("yr_remodel", &["YR_REMODEL", "YR_REMOD"]),
        ColumnSpec::optional("int_con", &["INT_COND", "INT_CON"]),
        ColumnSpec::optional("ext_con", &["EXT_COND", "EXT_CON"]),
        ColumnSpec::optional("overall_con", &["OVERALL_COND", "OVERALL_CON"]),
        ColumnSpec::optional("bed_rms", &["BED_RMS"]),
        ColumnSpec::optional("full_bth", &["FULL_BTH"]),
        ColumnSpec::optional("hlf_bth", &["HLF_BTH"]),
        ColumnSpec::optional("kitchens", &["KITCHENS", "KITCHEN"]),
        ColumnSpec::optional("heat_type", &["HEAT_TYPE"]),
        ColumnSpec::optional("ac_type", &["AC_TYPE"]),
        ColumnSpec::optional("fireplaces", &["FIREPLACES", "FIRE_PLACE"]),
        ColumnSpec::optional("num_parking", &["NUM_PARKING"]),
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub pid: String,
    pub st_num: Option<String>,
    pub st_name: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub land_sf: f64,
    pub gross_area: f64,
    pub living_area: f64,
    pub land_value: f64,
    pub bldg_value: f64,
    pub total_value: f64,
    pub gross_tax: f64,
    pub yr_built: Option<i32>,
    pub yr_remodel: Option<i32>,
    pub int_con: Option<String>,
    pub ext_con: Option<String>,
    pub overall_con: Option<String>,
    pub bed_rms: u32,
    pub full_bth: u32,
    pub hlf_bth: u32,
    pub kitchens: u32,
    pub heat_type: Option<String>,
    pub ac_type: Option<String>,
    pub fireplaces: u32,
    pub num_parking: u32,
    pub neighborhood: Option<NeighborhoodKey>,
}

impl PropertyRecord {
    /// Full baths plus half a bath for each half bath.
    pub fn bathrooms(&self) -> f64 {
        self.full_bth as f64 + self.hlf_bth as f64 * 0.5
    }
}

impl Attributed for PropertyRecord {
    fn neighborhood(&self) -> Option<&NeighborhoodKey> {
        self.neighborhood.as_ref()
    }
}

/// Cleans the property assessment table.
///
/// Total value is median-filled from the table's positive values; other
/// currency and count fields are zero-filled. Rows are attributed by
/// coordinates when the extract has them, otherwise by ZIP code.
pub fn clean(mut raw: RawTable, attributor: &Attributor<'_>) -> Result<CleanedTable<PropertyRecord>> {
    let mut diagnostics = Diagnostics::default();
    let schema = prepare(&SCHEMA, &mut raw, &mut diagnostics)?;

    let has_coordinates = schema.has("latitude") && schema.has("longitude");
    if !has_coordinates && !schema.has("zip_code") && !schema.has("neighborhood") {
        return Err(PipelineError::SchemaMismatch {
            dataset: Dataset::Property,
            detail: "neither coordinates, ZIP_CODE nor neighborhood column present".into(),
        });
    }

    let fill_value = positive_median(raw.rows.iter().filter_map(|row| schema.number(row, "total_value")))
        .unwrap_or(0.0);

    let mut records = Vec::with_capacity(raw.len());
    for row in &raw.rows {
        let Some(pid) = schema.text(row, "pid") else {
            diagnostics.quarantine(row, "missing PID");
            continue;
        };
        let number = |field: &str| schema.number(row, field).unwrap_or(0.0);
        let count = |field: &str| schema.count(row, field).unwrap_or(0);

        records.push(PropertyRecord {
            pid,
            st_num: schema.text(row, "st_num"),
            st_name: schema.text(row, "st_name"),
            city: schema.text(row, "city"),
            zip_code: schema.postal_code(row, "zip_code"),
            latitude: schema.number(row, "latitude"),
            longitude: schema.number(row, "longitude"),
            land_sf: number("land_sf"),
            gross_area: number("gross_area"),
            living_area: number("living_area"),
            land_value: number("land_value"),
            bldg_value: number("bldg_value"),
            total_value: schema.number(row, "total_value").unwrap_or(fill_value),
            gross_tax: number("gross_tax"),
            yr_built: schema.year(row, "yr_built"),
            yr_remodel: schema.year(row, "yr_remodel"),
            int_con: schema.text(row, "int_con"),
            ext_con: schema.text(row, "ext_con"),
            overall_con: schema.text(row, "overall_con"),
            bed_rms: count("bed_rms"),
            full_bth: count("full_bth"),
            hlf_bth: count("hlf_bth"),
            kitchens: count("kitchens"),
            heat_type: schema.text(row, "heat_type"),
            ac_type: schema.text(row, "ac_type"),
            fireplaces: count("fireplaces"),
            num_parking: count("num_parking"),
            neighborhood: schema.text(row, "neighborhood").and_then(|n| NeighborhoodKey::new(&n)),
        });
    }

    let locations: Vec<Location<'_>> = records
        .iter()
        .map(|r| Location {
            position: LatLon::from_parts(r.latitude, r.longitude),
            postal_code: r.zip_code.as_deref(),
            name: r.neighborhood.as_ref().map(|k| k.as_str()),
        })
        .collect();
    let attributed = attributor.attribute_all(&locations);

    for (record, (key, via)) in records.iter_mut().zip(attributed) {
        diagnostics.record_attribution(via);
        record.neighborhood = key;
    }

    Ok(CleanedTable::new(Dataset::Property, records, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::datasets::tests::raw;
    use crate::spatial::BoundarySet;

    const EXTRACT: &str = "\
PID,ST_NUM,ST_NAME,CITY,ZIP_CODE,TOTAL_VALUE,LIVING_AREA,BED_RMS,FULL_BTH,HLF_BTH,YR_BUILT
100,12,Main St,Boston,2134,\"$500,000\",1200,3,1,1,1925
101,14,Main St,Boston,02116,\"$900,000\",1800,4,2,0,0
102,16,Main St,Boston,02119,,900,2,1,0,
100,12,Main St,Boston,2134,\"$500,000\",1200,3,1,1,1925
,18,Main St,Boston,02119,\"$100,000\",,,,,
103,20,Main St,Boston,90210,\"$300,000\",1000,2.0,1,0,1990
";

    #[test]
    fn test_clean_property_assessment() {
        let boundaries = BoundarySet::empty();
        let attributor = Attributor::new(&boundaries, &PipelineConfig::default());
        let table = clean(raw(EXTRACT), &attributor).unwrap();

        assert_eq!(table.diagnostics.rows_read, 6);
        assert_eq!(table.diagnostics.duplicates_dropped, 1);
        assert_eq!(table.diagnostics.rejected, 1);
        assert_eq!(table.rows.len(), 4);

        let first = &table.rows[0];
        assert_eq!(first.total_value, 500_000.0);
        assert_eq!(first.zip_code.as_deref(), Some("02134"));
        assert_eq!(first.neighborhood.as_ref().unwrap().as_str(), "Allston");
        assert_eq!(first.bathrooms(), 1.5);
        assert_eq!(first.yr_built, Some(1925));

        assert_eq!(table.rows[1].yr_built, None);
        assert_eq!(table.rows[1].neighborhood.as_ref().unwrap().as_str(), "Back Bay");
    }

    #[test]
    fn test_every_row_without_pid_yields_empty_table() {
        let extract = "\
PID,ZIP_CODE,TOTAL_VALUE
,02119,\"$100,000\"
,02134,\"$200,000\"
 ,02116,
";
        let boundaries = BoundarySet::empty();
        let attributor = Attributor::new(&boundaries, &PipelineConfig::default());
        let table = clean(raw(extract), &attributor).unwrap();

        assert!(table.is_empty());
        assert_eq!(table.diagnostics.rows_read, 3);
        assert_eq!(table.diagnostics.rejected, 3);
        assert_eq!(table.diagnostics.quarantined.len(), 3);
        assert!(table.diagnostics.quarantined.iter().all(|q| q.reason == "missing PID"));
    }

    #[test]
    fn test_missing_total_value_is_median_filled() {
        let boundaries = BoundarySet::empty();
        let attributor = Attributor::new(&boundaries, &PipelineConfig::default());
        let table = clean(raw(EXTRACT), &attributor).unwrap();

        // positive values 500k, 900k, 100k (quarantined row still counts), 300k
        let filled = &table.rows[2];
        assert_eq!(filled.pid, "102");
        assert_eq!(filled.total_value, 400_000.0);
        assert_eq!(filled.living_area, 900.0);
    }

    #[test]
    fn test_unknown_zip_is_unattributed() {
        let boundaries = BoundarySet::empty();
        let attributor = Attributor::new(&boundaries, &PipelineConfig::default());
        let table = clean(raw(EXTRACT), &attributor).unwrap();

        let last = table.rows.last().unwrap();
        assert_eq!(last.pid, "103");
        assert!(last.neighborhood.is_none());
        assert_eq!(last.bed_rms, 2);
        assert_eq!(table.diagnostics.unattributed, 1);
        assert_eq!(table.diagnostics.attributed_by_postal_code, 3);
    }

    #[test]
    fn test_missing_location_columns_is_schema_mismatch() {
        let boundaries = BoundarySet::empty();
        let attributor = Attributor::new(&boundaries, &PipelineConfig::default());
        let err = clean(raw("PID,TOTAL_VALUE\n1,100\n"), &attributor).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }
}
