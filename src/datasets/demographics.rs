//! Neighborhood demographics (one row per neighborhood).

use serde::{Deserialize, Serialize};

use super::{Attributed, CleanedTable, Dataset, Diagnostics, prepare};
use crate::error::Result;
use crate::schema::{ColumnSpec, RawTable, SchemaMapping};
use crate::spatial::{Attribution, Attributor, NeighborhoodKey};

pub static SCHEMA: SchemaMapping = SchemaMapping {
    dataset: Dataset::Demographics,
    columns: &[
        ColumnSpec::required("neighborhood", &["neighborhood", "NAME"]),
        ColumnSpec::optional("population", &["population", "Total Population"]),
        ColumnSpec::optional("age_0_9_years", &["age_0_9_years", "0-9 years"]),
        ColumnSpec::optional("age_10_19_years", &["age_10_19_years", "10-19 years"]),
        ColumnSpec::optional("age_20_34_years", &["age_20_34_years", "20-34 years"]),
        ColumnSpec::optional("age_35_54_years", &["age_35_54_years", "35-54 years"]),
        ColumnSpec::optional("age_55_64_years", &["age_55_64_years", "55-64 years"]),
        ColumnSpec::optional("age_65_years_and_over", &["age_65_years_and_over", "65 years and over"]),
        ColumnSpec::optional("less_than_high_school", &["less_than_high_school", "Less than High School"]),
        ColumnSpec::optional("high_school_or_ged", &["high_school_or_ged", "High School or GED"]),
        ColumnSpec::optional(
            "some_college_or_associate_degree",
            &["some_college_or_associate_degree", "Some College or Associate's Degree"],
        ),
        ColumnSpec::optional(
            "bachelor_degree_or_higher",
            &["bachelor_degree_or_higher", "Bachelor's Degree or Higher"],
        ),
        ColumnSpec::optional("white", &["white", "White"]),
        ColumnSpec::optional(
            "black_or_african_american",
            &["black_or_african_american", "Black/African-American"],
        ),
        ColumnSpec::optional("hispanic", &["hispanic", "Hispanic"]),
        ColumnSpec::optional("asian_or_pi", &["asian_or_pi", "Asian/PI"]),
        ColumnSpec::optional("other", &["other", "Other"]),
        ColumnSpec::optional("per_capita_income", &["per_capita_income", "Per Capita Income"]),
        ColumnSpec::optional(
            "median_family_income",
            &["median_family_income", "Median Family Income", "median_income"],
        ),
    ],
};

/// Percentage fields; zero-filled and stored as fractions.
const SHARES: [&str; 15] = [
    "age_0_9_years",
    "age_10_19_years",
    "age_20_34_years",
    "age_35_54_years",
    "age_55_64_years",
    "age_65_years_and_over",
    "less_than_high_school",
    "high_school_or_ged",
    "some_college_or_associate_degree",
    "bachelor_degree_or_higher",
    "white",
    "black_or_african_american",
    "hispanic",
    "asian_or_pi",
    "other",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicsRecord {
    pub neighborhood: Option<NeighborhoodKey>,
    pub population: u32,
    pub age_0_9_years: f64,
    pub age_10_19_years: f64,
    pub age_20_34_years: f64,
    pub age_35_54_years: f64,
    pub age_55_64_years: f64,
    pub age_65_years_and_over: f64,
    pub less_than_high_school: f64,
    pub high_school_or_ged: f64,
    pub some_college_or_associate_degree: f64,
    pub bachelor_degree_or_higher: f64,
    pub white: f64,
    pub black_or_african_american: f64,
    pub hispanic: f64,
    pub asian_or_pi: f64,
    pub other: f64,
    pub per_capita_income: Option<f64>,
    pub median_family_income: Option<f64>,
}

impl Attributed for DemographicsRecord {
    fn neighborhood(&self) -> Option<&NeighborhoodKey> {
        self.neighborhood.as_ref()
    }
}

/// Cleans the demographics table. Names are canonicalized through the
/// resolver's aliases; names that match no boundary are kept as given.
pub fn clean(mut raw: RawTable, attributor: &Attributor<'_>) -> Result<CleanedTable<DemographicsRecord>> {
    let mut diagnostics = Diagnostics::default();
    let schema = prepare(&SCHEMA, &mut raw, &mut diagnostics)?;

    let mut records = Vec::with_capacity(raw.len());
    for row in &raw.rows {
        let Some(name) = schema.cell(row, "neighborhood") else {
            diagnostics.missing_required += 1;
            continue;
        };
        let neighborhood = attributor.resolver().resolve(name);
        diagnostics.record_attribution(if neighborhood.is_some() {
            Attribution::Name
        } else {
            Attribution::Unmatched
        });

        let [a0, a10, a20, a35, a55, a65, lhs, hs, college, bachelor, white, black, hispanic, asian, other] =
            SHARES.map(|field| schema.percentage(row, field).unwrap_or(0.0));

        records.push(DemographicsRecord {
            neighborhood,
            population: schema.count(row, "population").unwrap_or(0),
            age_0_9_years: a0,
            age_10_19_years: a10,
            age_20_34_years: a20,
            age_35_54_years: a35,
            age_55_64_years: a55,
            age_65_years_and_over: a65,
            less_than_high_school: lhs,
            high_school_or_ged: hs,
            some_college_or_associate_degree: college,
            bachelor_degree_or_higher: bachelor,
            white,
            black_or_african_american: black,
            hispanic,
            asian_or_pi: asian,
            other,
            per_capita_income: schema.number(row, "per_capita_income"),
            median_family_income: schema.number(row, "median_family_income"),
        });
    }

    Ok(CleanedTable::new(Dataset::Demographics, records, diagnostics))
}
