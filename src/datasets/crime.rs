//! Crime incident reports.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Attributed, CleanedTable, Dataset, Diagnostics, prepare};
use crate::error::Result;
use crate::schema::{ColumnSpec, RawTable, SchemaMapping};
use crate::spatial::{Attributor, LatLon, Location, NeighborhoodKey};
use crate::stats::per_thousand;

pub static SCHEMA: SchemaMapping = SchemaMapping {
    dataset: Dataset::Crime,
    columns: &[
        ColumnSpec::optional("incident_number", &["INCIDENT_NUMBER", "incident_number"]),
        ColumnSpec::optional("offense_code", &["OFFENSE_CODE"]),
        ColumnSpec::optional("offense_description", &["OFFENSE_DESCRIPTION"]),
        ColumnSpec::optional("district", &["DISTRICT"]),
        ColumnSpec::optional("date", &["OCCURRED_ON_DATE", "date"]),
        ColumnSpec::optional("day_of_week", &["DAY_OF_WEEK"]),
        ColumnSpec::optional("hour", &["HOUR"]),
        ColumnSpec::optional("street", &["STREET"]),
        ColumnSpec::required("latitude", &["Lat", "latitude"]),
        ColumnSpec::required("longitude", &["Long", "longitude"]),
    ],
};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeRecord {
    pub incident_number: String,
    pub offense_code: Option<String>,
    pub offense_description: Option<String>,
    pub district: Option<String>,
    pub date: Option<NaiveDateTime>,
    pub day_of_week: Option<String>,
    pub hour: Option<u32>,
    pub street: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub neighborhood: Option<NeighborhoodKey>,
    /// Incidents per 1,000 attributed incidents, shared by every row of a neighborhood.
    pub crime_rate: Option<f64>,
}

impl CrimeRecord {
    /// `YYYY-MM` of the occurrence date, if known.
    pub fn month(&self) -> Option<String> {
        self.date.map(|d| d.format("%Y-%m").to_string())
    }
}

impl Attributed for CrimeRecord {
    fn neighborhood(&self) -> Option<&NeighborhoodKey> {
        self.neighborhood.as_ref()
    }
}

/// Parses an occurrence timestamp. Offsets such as `+00` are accepted and
/// dropped; a bare date maps to midnight.
pub fn parse_occurred_on(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%#z") {
        return Some(with_offset.naive_local());
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Incidents per 1,000 attributed incidents for each neighborhood.
pub fn crime_rates<'a>(
    neighborhoods: impl IntoIterator<Item = Option<&'a NeighborhoodKey>>,
) -> BTreeMap<NeighborhoodKey, f64> {
    let mut counts: BTreeMap<NeighborhoodKey, usize> = BTreeMap::new();
    for key in neighborhoods.into_iter().flatten() {
        *counts.entry(key.clone()).or_default() += 1;
    }
    let total: usize = counts.values().sum();
    counts
        .into_iter()
        .map(|(key, count)| (key, per_thousand(count, total)))
        .collect()
}

/// Cleans crime incidents. Rows without a usable `Lat`/`Long` pair are
/// dropped; rows without an incident number are quarantined.
pub fn clean(mut raw: RawTable, attributor: &Attributor<'_>) -> Result<CleanedTable<CrimeRecord>> {
    let mut diagnostics = Diagnostics::default();
    let schema = prepare(&SCHEMA, &mut raw, &mut diagnostics)?;

    let mut records = Vec::with_capacity(raw.len());
    for row in &raw.rows {
        let Some(position) = LatLon::from_parts(schema.number(row, "latitude"), schema.number(row, "longitude"))
        else {
            diagnostics.missing_required += 1;
            continue;
        };
        let Some(incident_number) = schema.text(row, "incident_number") else {
            diagnostics.quarantine(row, "missing incident number");
            continue;
        };
        let date = schema.cell(row, "date").and_then(|raw_date| {
            let parsed = parse_occurred_on(raw_date);
            if parsed.is_none() {
                debug!(line = row.line, date = raw_date, "Unparseable occurrence date");
            }
            parsed
        });

        records.push(CrimeRecord {
            incident_number,
            offense_code: schema.text(row, "offense_code"),
            offense_description: schema.text(row, "offense_description"),
            district: schema.text(row, "district"),
            date,
            day_of_week: schema.text(row, "day_of_week"),
            hour: schema.count(row, "hour").filter(|h| *h < 24),
            street: schema.text(row, "street"),
            latitude: position.lat,
            longitude: position.lon,
            neighborhood: None,
            crime_rate: None,
        });
    }

    let locations: Vec<Location<'_>> = records
        .iter()
        .map(|r| Location {
            position: Some(LatLon::new(r.latitude, r.longitude)),
            ..Default::default()
        })
        .collect();
    let attributed = attributor.attribute_all(&locations);
    for (record, (key, via)) in records.iter_mut().zip(attributed) {
        diagnostics.record_attribution(via);
        record.neighborhood = key;
    }

    let rates = crime_rates(records.iter().map(|r| r.neighborhood.as_ref()));
    for record in &mut records {
        record.crime_rate = record.neighborhood.as_ref().and_then(|key| rates.get(key).copied());
    }

    Ok(CleanedTable::new(Dataset::Crime, records, diagnostics))
}
