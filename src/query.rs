//! Read-only views over the processed outputs, printed by the CLI.
//!
//! Every median here follows the same policy as the aggregator: positive
//! values only, mean of the two central values for an even count, absent for
//! an empty set.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::datasets::crime::CrimeRecord;
use crate::datasets::demographics::DemographicsRecord;
use crate::datasets::property::PropertyRecord;
use crate::datasets::restaurants::RestaurantRecord;
use crate::datasets::schools::SchoolRecord;
use crate::datasets::transit::StopRecord;
use crate::datasets::{Attributed, Dataset};
use crate::error::{PipelineError, Result};
use crate::output::read_table;
use crate::spatial::NeighborhoodKey;
use crate::stats::{mean, median, positive_median, ratio};

/// The cleaned tables as last written by a pipeline run.
#[derive(Debug, Default)]
pub struct ProcessedData {
    pub property: Vec<PropertyRecord>,
    pub crime: Vec<CrimeRecord>,
    pub demographics: Vec<DemographicsRecord>,
    pub schools: Vec<SchoolRecord>,
    pub transit: Vec<StopRecord>,
    pub restaurants: Vec<RestaurantRecord>,
}

fn load_or_default<T: DeserializeOwned>(config: &PipelineConfig, dataset: Dataset) -> Result<Vec<T>> {
    let path = config.processed_path(dataset.cleaned_file());
    if !Path::new(&path).exists() {
        warn!(%dataset, path = %path.display(), "Processed table missing, treating as empty");
        return Ok(Vec::new());
    }
    read_table(&path)
}

fn in_neighborhood<'a, T: Attributed>(rows: &'a [T], key: &'a NeighborhoodKey) -> impl Iterator<Item = &'a T> {
    rows.iter().filter(move |r| r.neighborhood() == Some(key))
}

fn distinct_establishments<'a>(rows: impl Iterator<Item = &'a RestaurantRecord>) -> u32 {
    rows.map(RestaurantRecord::establishment_id)
        .collect::<HashSet<_>>()
        .len() as u32
}

#[derive(Debug, Clone, Serialize)]
pub struct AgeDistribution {
    pub age_0_9: f64,
    pub age_10_19: f64,
    pub age_20_34: f64,
    pub age_35_54: f64,
    pub age_55_64: f64,
    pub age_65_plus: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Education {
    pub less_than_high_school: f64,
    pub high_school_or_ged: f64,
    pub some_college: f64,
    pub bachelor_plus: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceEthnicity {
    pub white: f64,
    pub black: f64,
    pub hispanic: f64,
    pub asian: f64,
    pub other: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemographicsProfile {
    pub population: u32,
    pub median_family_income: Option<f64>,
    pub per_capita_income: Option<f64>,
    pub age_distribution: AgeDistribution,
    pub education: Education,
    pub race_ethnicity: RaceEthnicity,
}

impl From<&DemographicsRecord> for DemographicsProfile {
    fn from(d: &DemographicsRecord) -> Self {
        Self {
            population: d.population,
            median_family_income: d.median_family_income,
            per_capita_income: d.per_capita_income,
            age_distribution: AgeDistribution {
                age_0_9: d.age_0_9_years,
                age_10_19: d.age_10_19_years,
                age_20_34: d.age_20_34_years,
                age_35_54: d.age_35_54_years,
                age_55_64: d.age_55_64_years,
                age_65_plus: d.age_65_years_and_over,
            },
            education: Education {
                less_than_high_school: d.less_than_high_school,
                high_school_or_ged: d.high_school_or_ged,
                some_college: d.some_college_or_associate_degree,
                bachelor_plus: d.bachelor_degree_or_higher,
            },
            race_ethnicity: RaceEthnicity {
                white: d.white,
                black: d.black_or_african_american,
                hispanic: d.hispanic,
                asian: d.asian_or_pi,
                other: d.other,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyStats {
    pub total_properties: usize,
    pub median_property_value: Option<f64>,
    pub median_living_area: Option<f64>,
    pub median_year_built: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrimeStats {
    pub total_crimes: usize,
    pub crime_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Amenities {
    pub schools: u32,
    pub transit_stops: u32,
    pub restaurants: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborhoodProfile {
    pub neighborhood: NeighborhoodKey,
    pub demographics: Option<DemographicsProfile>,
    pub property_stats: PropertyStats,
    pub crime_stats: CrimeStats,
    pub amenities: Amenities,
}

/// Property filters for [`ProcessedData::search`]. Unset filters match everything.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub neighborhood: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub bedrooms: Option<u32>,
    /// Full baths plus half a bath per half bath.
    pub bathrooms: Option<f64>,
}

impl SearchFilter {
    fn matches(&self, property: &PropertyRecord, neighborhood: Option<&NeighborhoodKey>) -> bool {
        neighborhood.is_none_or(|key| property.neighborhood.as_ref() == Some(key))
            && self.min_price.is_none_or(|min| property.total_value >= min)
            && self.max_price.is_none_or(|max| property.total_value <= max)
            && self.bedrooms.is_none_or(|beds| property.bed_rms == beds)
            && self.bathrooms.is_none_or(|baths| (property.bathrooms() - baths).abs() < f64::EPSILON)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub neighborhood: NeighborhoodKey,
    pub median_price: Option<f64>,
    pub property_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborhoodAffordability {
    pub name: NeighborhoodKey,
    pub median_price: f64,
    pub median_income: f64,
    pub price_to_income_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AffordabilityReport {
    pub city_median_price: Option<f64>,
    pub city_median_income: Option<f64>,
    /// Mean of the per-neighborhood ratios.
    pub mean_price_to_income_ratio: Option<f64>,
    pub neighborhoods: Vec<NeighborhoodAffordability>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub neighborhood: NeighborhoodKey,
    pub population: u32,
    pub median_family_income: Option<f64>,
    pub median_property_value: Option<f64>,
    pub median_crime_rate: Option<f64>,
    pub school_count: u32,
    pub transit_stops: u32,
    pub restaurant_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCount {
    pub month: String,
    pub crime_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionRow {
    pub neighborhood: NeighborhoodKey,
    pub property_count: usize,
    pub median_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxPrice {
    pub max_price: f64,
}

/// Neighborhood and row-count bounds for the map listings.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub neighborhood: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrimePoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "type")]
    pub offense_code: Option<String>,
    pub description: Option<String>,
    pub neighborhood: Option<NeighborhoodKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchoolPoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub neighborhood: Option<NeighborhoodKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopPoint {
    pub id: String,
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub url: Option<String>,
    pub wheelchair_boarding: Option<u32>,
    pub neighborhood: Option<NeighborhoodKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestaurantPoint {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub neighborhood: Option<NeighborhoodKey>,
}

impl ProcessedData {
    /// Loads every cleaned table from the processed directory. A missing
    /// table is treated as empty.
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let data = Self {
            property: load_or_default(config, Dataset::Property)?,
            crime: load_or_default(config, Dataset::Crime)?,
            demographics: load_or_default(config, Dataset::Demographics)?,
            schools: load_or_default(config, Dataset::Schools)?,
            transit: load_or_default(config, Dataset::Transit)?,
            restaurants: load_or_default(config, Dataset::Restaurants)?,
        };
        debug!(
            properties = data.property.len(),
            incidents = data.crime.len(),
            neighborhoods = data.demographics.len(),
            "Processed data loaded"
        );
        Ok(data)
    }

    /// Finds the canonical key for `name` among every table, ignoring case.
    fn find_key(&self, name: &str) -> Option<NeighborhoodKey> {
        let wanted = NeighborhoodKey::new(name)?.as_str().to_lowercase();
        let mut keys = self
            .demographics
            .iter()
            .filter_map(Attributed::neighborhood)
            .chain(self.property.iter().filter_map(Attributed::neighborhood))
            .chain(self.crime.iter().filter_map(Attributed::neighborhood))
            .chain(self.schools.iter().filter_map(Attributed::neighborhood))
            .chain(self.transit.iter().filter_map(Attributed::neighborhood))
            .chain(self.restaurants.iter().filter_map(Attributed::neighborhood));
        keys.find(|k| k.as_str().to_lowercase() == wanted).cloned()
    }

    fn property_values<'a>(&'a self, key: &'a NeighborhoodKey) -> impl Iterator<Item = &'a PropertyRecord> {
        in_neighborhood(&self.property, key).filter(|p| p.total_value > 0.0)
    }

    pub fn profile(&self, name: &str) -> Result<NeighborhoodProfile> {
        let key = self
            .find_key(name)
            .ok_or_else(|| PipelineError::NeighborhoodNotFound(name.to_string()))?;

        let valued: Vec<&PropertyRecord> = self.property_values(&key).collect();
        let property_stats = PropertyStats {
            total_properties: valued.len(),
            median_property_value: positive_median(valued.iter().map(|p| p.total_value)),
            median_living_area: positive_median(valued.iter().map(|p| p.living_area)),
            median_year_built: positive_median(valued.iter().filter_map(|p| p.yr_built.map(f64::from))),
        };

        let rates: Vec<f64> = in_neighborhood(&self.crime, &key).filter_map(|c| c.crime_rate).collect();
        let crime_stats = CrimeStats {
            total_crimes: in_neighborhood(&self.crime, &key).count(),
            crime_rate: mean(&rates),
        };

        let amenities = Amenities {
            schools: in_neighborhood(&self.schools, &key).count() as u32,
            transit_stops: in_neighborhood(&self.transit, &key).count() as u32,
            restaurants: distinct_establishments(in_neighborhood(&self.restaurants, &key)),
        };

        let demographics = in_neighborhood(&self.demographics, &key).next().map(DemographicsProfile::from);

        Ok(NeighborhoodProfile {
            demographics,
            neighborhood: key,
            property_stats,
            crime_stats,
            amenities,
        })
    }

    /// Median price and count of positively valued properties per neighborhood,
    /// over the properties matching `filter`.
    pub fn search(&self, filter: &SearchFilter) -> Result<Vec<SearchResult>> {
        let wanted = match filter.neighborhood.as_deref() {
            Some(name) => Some(
                self.find_key(name)
                    .ok_or_else(|| PipelineError::NeighborhoodNotFound(name.to_string()))?,
            ),
            None => None,
        };

        let mut groups: BTreeMap<&NeighborhoodKey, Vec<f64>> = BTreeMap::new();
        for property in &self.property {
            let Some(key) = property.neighborhood.as_ref() else {
                continue;
            };
            if filter.matches(property, wanted.as_ref()) {
                groups.entry(key).or_default().push(property.total_value);
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, values)| SearchResult {
                neighborhood: key.clone(),
                median_price: positive_median(values.iter().copied()),
                property_count: values.iter().filter(|v| **v > 0.0).count(),
            })
            .collect())
    }

    pub fn affordability(&self) -> AffordabilityReport {
        let mut neighborhoods = Vec::new();
        for row in &self.demographics {
            let (Some(key), Some(income)) = (row.neighborhood.as_ref(), row.median_family_income) else {
                continue;
            };
            let Some(price) = positive_median(self.property_values(key).map(|p| p.total_value)) else {
                debug!(neighborhood = %key, "No valued properties, skipping affordability");
                continue;
            };
            if let Some(price_to_income_ratio) = ratio(Some(price), Some(income)) {
                neighborhoods.push(NeighborhoodAffordability {
                    name: key.clone(),
                    median_price: price,
                    median_income: income,
                    price_to_income_ratio,
                });
            }
        }

        let ratios: Vec<f64> = neighborhoods.iter().map(|n| n.price_to_income_ratio).collect();
        AffordabilityReport {
            city_median_price: positive_median(self.property.iter().map(|p| p.total_value)),
            city_median_income: positive_median(self.demographics.iter().filter_map(|d| d.median_family_income)),
            mean_price_to_income_ratio: mean(&ratios),
            neighborhoods,
        }
    }

    pub fn comparison(&self) -> Vec<ComparisonRow> {
        self.demographics
            .iter()
            .filter_map(|row| {
                let key = row.neighborhood.as_ref()?;
                let rates: Vec<f64> = in_neighborhood(&self.crime, key).filter_map(|c| c.crime_rate).collect();
                Some(ComparisonRow {
                    neighborhood: key.clone(),
                    population: row.population,
                    median_family_income: row.median_family_income,
                    median_property_value: positive_median(self.property_values(key).map(|p| p.total_value)),
                    median_crime_rate: median(&rates),
                    school_count: in_neighborhood(&self.schools, key).count() as u32,
                    transit_stops: in_neighborhood(&self.transit, key).count() as u32,
                    restaurant_count: distinct_establishments(in_neighborhood(&self.restaurants, key)),
                })
            })
            .collect()
    }

    /// Incident counts per neighborhood per `YYYY-MM`. Undated and
    /// unattributed incidents are left out.
    pub fn crime_trends(&self) -> BTreeMap<NeighborhoodKey, Vec<MonthlyCount>> {
        let mut counts: BTreeMap<NeighborhoodKey, BTreeMap<String, usize>> = BTreeMap::new();
        for incident in &self.crime {
            let (Some(key), Some(month)) = (incident.neighborhood.as_ref(), incident.month()) else {
                continue;
            };
            *counts.entry(key.clone()).or_default().entry(month).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(key, months)| {
                let series = months
                    .into_iter()
                    .map(|(month, crime_count)| MonthlyCount { month, crime_count })
                    .collect();
                (key, series)
            })
            .collect()
    }

    pub fn property_distribution(&self) -> Vec<DistributionRow> {
        let mut groups: BTreeMap<&NeighborhoodKey, Vec<f64>> = BTreeMap::new();
        for property in self.property.iter().filter(|p| p.total_value > 0.0) {
            if let Some(key) = property.neighborhood.as_ref() {
                groups.entry(key).or_default().push(property.total_value);
            }
        }
        groups
            .into_iter()
            .filter_map(|(key, values)| {
                Some(DistributionRow {
                    neighborhood: key.clone(),
                    property_count: values.len(),
                    median_value: median(&values)?,
                })
            })
            .collect()
    }

    pub fn max_price(&self) -> MaxPrice {
        let max_price = self
            .property
            .iter()
            .map(|p| p.total_value)
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
            .unwrap_or(0.0);
        MaxPrice { max_price }
    }

    /// Distinct neighborhoods with demographics, in key order.
    pub fn neighborhoods(&self) -> Vec<NeighborhoodKey> {
        self.demographics
            .iter()
            .filter_map(Attributed::neighborhood)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Rows of `rows` that have coordinates and match `filter`, mapped by `point`.
    fn listing<T: Attributed, P>(
        &self,
        rows: &[T],
        filter: &ListingFilter,
        point: impl Fn(&T) -> Option<P>,
    ) -> Result<Vec<P>> {
        let wanted = match filter.neighborhood.as_deref() {
            Some(name) => Some(
                self.find_key(name)
                    .ok_or_else(|| PipelineError::NeighborhoodNotFound(name.to_string()))?,
            ),
            None => None,
        };
        Ok(rows
            .iter()
            .filter(|row| wanted.as_ref().is_none_or(|key| row.neighborhood() == Some(key)))
            .filter_map(point)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect())
    }

    pub fn crime_points(&self, filter: &ListingFilter) -> Result<Vec<CrimePoint>> {
        self.listing(&self.crime, filter, |c| {
            Some(CrimePoint {
                latitude: c.latitude,
                longitude: c.longitude,
                offense_code: c.offense_code.clone(),
                description: c.offense_description.clone(),
                neighborhood: c.neighborhood.clone(),
            })
        })
    }

    pub fn school_points(&self, filter: &ListingFilter) -> Result<Vec<SchoolPoint>> {
        self.listing(&self.schools, filter, |s| {
            Some(SchoolPoint {
                name: s.name.clone(),
                latitude: s.latitude?,
                longitude: s.longitude?,
                neighborhood: s.neighborhood.clone(),
            })
        })
    }

    pub fn transit_points(&self, filter: &ListingFilter) -> Result<Vec<StopPoint>> {
        self.listing(&self.transit, filter, |stop| {
            Some(StopPoint {
                id: stop.stop_id.clone(),
                name: stop.stop_name.clone(),
                latitude: stop.stop_lat,
                longitude: stop.stop_lon,
                url: stop.stop_url.clone(),
                wheelchair_boarding: stop.wheelchair_boarding,
                neighborhood: stop.neighborhood.clone(),
            })
        })
    }

    pub fn restaurant_points(&self, filter: &ListingFilter) -> Result<Vec<RestaurantPoint>> {
        self.listing(&self.restaurants, filter, |r| {
            Some(RestaurantPoint {
                name: r.business_name.clone(),
                latitude: r.latitude?,
                longitude: r.longitude?,
                neighborhood: r.neighborhood.clone(),
            })
        })
    }
}
