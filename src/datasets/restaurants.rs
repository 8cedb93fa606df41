//! Restaurant inspections. One establishment usually has many inspection rows.

use serde::{Deserialize, Serialize};

use super::{Attributed, CleanedTable, Dataset, Diagnostics, prepare};
use crate::error::Result;
use crate::schema::normalize::parse_location_pair;
use crate::schema::{ColumnSpec, RawTable, SchemaMapping};
use crate::spatial::{Attributor, LatLon, Location, NeighborhoodKey};

pub static SCHEMA: SchemaMapping = SchemaMapping {
    dataset: Dataset::Restaurants,
    columns: &[
        ColumnSpec::required("business_name", &["businessname", "business_name"]),
        ColumnSpec::optional("license_no", &["licenseno", "license_no"]),
        ColumnSpec::optional("address", &["address"]),
        ColumnSpec::optional("city", &["city"]),
        ColumnSpec::optional("zip_code", &["zip", "zip_code", "zipcode"]),
        ColumnSpec::optional("result", &["result"]),
        ColumnSpec::optional("result_date", &["resultdttm"]),
        ColumnSpec::optional("latitude", &["Lat", "latitude"]),
        ColumnSpec::optional("longitude", &["Long", "longitude"]),
        ColumnSpec::optional("location", &["location"]),
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantRecord {
    pub business_name: String,
    pub license_no: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub result: Option<String>,
    pub result_date: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub neighborhood: Option<NeighborhoodKey>,
}

impl RestaurantRecord {
    /// Identity of the establishment behind an inspection row: the license
    /// number, else the folded business name and address.
    pub fn establishment_id(&self) -> String {
        match &self.license_no {
            Some(license) => format!("license:{license}"),
            None => format!(
                "name:{}|{}",
                self.business_name.to_lowercase(),
                self.address.as_deref().unwrap_or_default().to_lowercase()
            ),
        }
    }
}

impl Attributed for RestaurantRecord {
    fn neighborhood(&self) -> Option<&NeighborhoodKey> {
        self.neighborhood.as_ref()
    }
}

pub fn clean(mut raw: RawTable, attributor: &Attributor<'_>) -> Result<CleanedTable<RestaurantRecord>> {
    let mut diagnostics = Diagnostics::default();
    let schema = prepare(&SCHEMA, &mut raw, &mut diagnostics)?;

    let mut records = Vec::with_capacity(raw.len());
    for row in &raw.rows {
        let Some(business_name) = schema.text(row, "business_name") else {
            diagnostics.missing_required += 1;
            continue;
        };

        let position = LatLon::from_parts(schema.number(row, "latitude"), schema.number(row, "longitude"))
            .or_else(|| {
                let (lat, lon) = schema.cell(row, "location").and_then(parse_location_pair)?;
                LatLon::from_parts(Some(lat), Some(lon))
            });

        records.push(RestaurantRecord {
            business_name,
            license_no: schema.text(row, "license_no"),
            address: schema.text(row, "address"),
            city: schema.text(row, "city"),
            zip_code: schema.postal_code(row, "zip_code"),
            result: schema.text(row, "result"),
            result_date: schema.text(row, "result_date"),
            latitude: position.map(|p| p.lat),
            longitude: position.map(|p| p.lon),
            neighborhood: None,
        });
    }

    let locations: Vec<Location<'_>> = records
        .iter()
        .map(|r| Location {
            position: LatLon::from_parts(r.latitude, r.longitude),
            postal_code: r.zip_code.as_deref(),
            name: None,
        })
        .collect();
    let attributed = attributor.attribute_all(&locations);
    for (record, (key, via)) in records.iter_mut().zip(attributed) {
        diagnostics.record_attribution(via);
        record.neighborhood = key;
    }

    Ok(CleanedTable::new(Dataset::Restaurants, records, diagnostics))
}
