//! Joins the cleaned tables on neighborhood key into one summary row per
//! neighborhood, with a min-max score for every metric.

pub mod enrich;

pub use enrich::enrich_boundaries;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::datasets::crime::CrimeRecord;
use crate::datasets::demographics::DemographicsRecord;
use crate::datasets::open_space::OpenSpaceParcel;
use crate::datasets::property::PropertyRecord;
use crate::datasets::restaurants::RestaurantRecord;
use crate::datasets::schools::SchoolRecord;
use crate::datasets::transit::StopRecord;
use crate::datasets::{Attributed, CleanedTable};
use crate::error::{PipelineError, Result};
use crate::spatial::NeighborhoodKey;
use crate::stats::{mean, min_max_scale, positive_median, ratio};

/// Upper bound of every `_score` column.
pub const SCORE_SCALE: f64 = 100.0;

/// One optional cleaned table per dataset. `None` means the dataset failed or was absent.
#[derive(Debug, Default)]
pub struct CleanedTables {
    pub property: Option<CleanedTable<PropertyRecord>>,
    pub crime: Option<CleanedTable<CrimeRecord>>,
    pub demographics: Option<CleanedTable<DemographicsRecord>>,
    pub schools: Option<CleanedTable<SchoolRecord>>,
    pub transit: Option<CleanedTable<StopRecord>>,
    pub restaurants: Option<CleanedTable<RestaurantRecord>>,
    pub open_space: Option<CleanedTable<OpenSpaceParcel>>,
}

impl CleanedTables {
    /// True when none of the metric-bearing tables is present. Open space
    /// carries no summary metric, so it never counts on its own.
    pub fn is_empty(&self) -> bool {
        self.property.is_none()
            && self.crime.is_none()
            && self.demographics.is_none()
            && self.schools.is_none()
            && self.transit.is_none()
            && self.restaurants.is_none()
    }
}

/// Summary metrics for one neighborhood. Absent metrics serialize as empty cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodSummary {
    pub neighborhood: NeighborhoodKey,
    pub median_property_value: Option<f64>,
    pub crime_rate: Option<f64>,
    pub school_count: Option<u32>,
    pub transit_stops: Option<u32>,
    pub restaurant_count: Option<u32>,
    pub median_income: Option<f64>,
    pub affordability_ratio: Option<f64>,
    pub median_property_value_score: Option<f64>,
    pub crime_rate_score: Option<f64>,
    pub school_count_score: Option<f64>,
    pub transit_stops_score: Option<f64>,
    pub restaurant_count_score: Option<f64>,
    pub median_income_score: Option<f64>,
    pub affordability_score: Option<f64>,
}

impl NeighborhoodSummary {
    fn new(neighborhood: NeighborhoodKey) -> Self {
        Self {
            neighborhood,
            median_property_value: None,
            crime_rate: None,
            school_count: None,
            transit_stops: None,
            restaurant_count: None,
            median_income: None,
            affordability_ratio: None,
            median_property_value_score: None,
            crime_rate_score: None,
            school_count_score: None,
            transit_stops_score: None,
            restaurant_count_score: None,
            median_income_score: None,
            affordability_score: None,
        }
    }
}

type Groups<'a, T> = BTreeMap<&'a NeighborhoodKey, Vec<&'a T>>;

/// Rows of a table grouped by neighborhood; unattributed rows are left out.
fn group<T: Attributed>(table: Option<&CleanedTable<T>>) -> Option<Groups<'_, T>> {
    let table = table?;
    let mut groups: Groups<'_, T> = BTreeMap::new();
    for row in &table.rows {
        if let Some(key) = row.neighborhood() {
            groups.entry(key).or_default().push(row);
        }
    }
    Some(groups)
}

fn row_count<T>(groups: &Option<Groups<'_, T>>, key: &NeighborhoodKey) -> Option<u32> {
    groups
        .as_ref()
        .map(|g| g.get(key).map_or(0, |rows| rows.len() as u32))
}

/// Builds the per-neighborhood summary, ordered by key.
///
/// Every key found in any table gets a row. Counts are zero for keys absent
/// from a present table and absent when the table itself is absent.
#[instrument(skip_all)]
pub fn aggregate(tables: &CleanedTables) -> Result<Vec<NeighborhoodSummary>> {
    if tables.is_empty() {
        return Err(PipelineError::NothingToAggregate);
    }

    let property = group(tables.property.as_ref());
    let crime = group(tables.crime.as_ref());
    let demographics = group(tables.demographics.as_ref());
    let schools = group(tables.schools.as_ref());
    let transit = group(tables.transit.as_ref());
    let restaurants = group(tables.restaurants.as_ref());
    let open_space = group(tables.open_space.as_ref());

    let mut keys: BTreeSet<&NeighborhoodKey> = BTreeSet::new();
    macro_rules! collect_keys {
        ($($groups:expr),*) => {
            $( if let Some(groups) = &$groups { keys.extend(groups.keys().copied()); } )*
        };
    }
    collect_keys!(property, crime, demographics, schools, transit, restaurants, open_space);

    let mut summaries: Vec<NeighborhoodSummary> = keys
        .into_iter()
        .map(|key| {
            let mut summary = NeighborhoodSummary::new(key.clone());

            if let Some(rows) = property.as_ref().and_then(|g| g.get(key)) {
                summary.median_property_value = positive_median(rows.iter().map(|r| r.total_value));
            }
            if let Some(rows) = crime.as_ref().and_then(|g| g.get(key)) {
                let rates: Vec<f64> = rows.iter().filter_map(|r| r.crime_rate).collect();
                summary.crime_rate = mean(&rates);
            }
            if let Some(rows) = demographics.as_ref().and_then(|g| g.get(key)) {
                summary.median_income = positive_median(rows.iter().filter_map(|r| r.median_family_income));
            }

            summary.school_count = row_count(&schools, key);
            summary.transit_stops = row_count(&transit, key);
            summary.restaurant_count = restaurants.as_ref().map(|g| {
                g.get(key).map_or(0, |rows| {
                    rows.iter()
                        .map(|r| r.establishment_id())
                        .collect::<HashSet<_>>()
                        .len() as u32
                })
            });
            summary.affordability_ratio = ratio(summary.median_property_value, summary.median_income);
            summary
        })
        .collect();

    score(&mut summaries);

    info!(
        neighborhoods = summaries.len(),
        with_property_value = summaries.iter().filter(|s| s.median_property_value.is_some()).count(),
        with_income = summaries.iter().filter(|s| s.median_income.is_some()).count(),
        "Neighborhood summary built"
    );
    Ok(summaries)
}

/// Fills every `_score` column by min-max scaling its metric across neighborhoods.
fn score(summaries: &mut [NeighborhoodSummary]) {
    macro_rules! score_column {
        ($metric:ident => $score:ident) => {
            let values: Vec<Option<f64>> = summaries.iter().map(|s| s.$metric.map(f64::from)).collect();
            for (summary, scaled) in summaries.iter_mut().zip(min_max_scale(&values, SCORE_SCALE)) {
                summary.$score = scaled;
            }
            debug!(metric = stringify!($metric), present = values.iter().flatten().count(), "Scored");
        };
    }

    score_column!(median_property_value => median_property_value_score);
    score_column!(crime_rate => crime_rate_score);
    score_column!(school_count => school_count_score);
    score_column!(transit_stops => transit_stops_score);
    score_column!(restaurant_count => restaurant_count_score);
    score_column!(median_income => median_income_score);
    score_column!(affordability_ratio => affordability_score);
}
