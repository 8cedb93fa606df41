use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use neighborhood_pipeline::aggregate::NeighborhoodSummary;
use neighborhood_pipeline::datasets::Dataset;
use neighborhood_pipeline::output::read_table;
use neighborhood_pipeline::pipeline::{ENRICHED_BOUNDARIES_FILE, REPORT_FILE, SUMMARY_FILE};
use neighborhood_pipeline::query::ProcessedData;
use neighborhood_pipeline::spatial::NeighborhoodKey;
use neighborhood_pipeline::{Pipeline, PipelineConfig};
use tempfile::TempDir;
use walkdir::WalkDir;

fn square(name: &str, key: &str, west: f64, south: f64, east: f64, north: f64) -> String {
    format!(
        r#"{{ "type": "Feature", "properties": {{ "{key}": "{name}" }},
            "geometry": {{ "type": "Polygon", "coordinates": [[
                [{west}, {south}], [{east}, {south}], [{east}, {north}], [{west}, {north}], [{west}, {south}]
            ]] }} }}"#
    )
}

fn collection(features: &[String]) -> String {
    format!(r#"{{ "type": "FeatureCollection", "features": [{}] }}"#, features.join(","))
}

/// Raw extracts for two neighborhoods: Roxbury around (42.32, -71.09) and
/// Fenway around (42.345, -71.10).
fn write_extracts(raw: &Path) {
    fs::create_dir_all(raw).unwrap();

    fs::write(
        raw.join("boston-neighborhoods.geojson"),
        collection(&[
            square("Roxbury", "Name", -71.10, 42.31, -71.08, 42.33),
            square("Fenway", "Name", -71.11, 42.34, -71.09, 42.35),
        ]),
    )
    .unwrap();

    fs::write(
        raw.join("property-assessment-fy2025.csv"),
        "PID,ZIP_CODE,Lat,Long,TOTAL_VALUE,BED_RMS,FULL_BTH,HLF_BTH,LIVING_AREA,YR_BUILT\n\
         0100001000,02119,42.32,-71.09,500000,3,1,1,1500,1920\n\
         0100002000,02119,42.321,-71.091,700000,4,2,0,2100,1905\n\
         0100003000,02119,,,300000,2,1,0,900,1950\n\
         0500001000,02215,42.345,-71.10,900000,3,2,0,1800,1899\n\
         ,02119,42.32,-71.09,400000,1,1,0,600,1980\n",
    )
    .unwrap();

    fs::write(
        raw.join("crime-incident-reports.csv"),
        "INCIDENT_NUMBER,OFFENSE_DESCRIPTION,OCCURRED_ON_DATE,Lat,Long\n\
         I240001,LARCENY,2024-01-05 10:00:00+00,42.32,-71.09\n\
         I240002,VANDALISM,2024-01-20 22:15:00+00,42.322,-71.085\n\
         I240003,LARCENY,2024-02-01 08:30:00+00,42.345,-71.10\n\
         I240004,TOWED,2024-02-03 12:00:00+00,42.0,-70.5\n\
         I240005,TOWED,2024-02-04 12:00:00+00,,\n",
    )
    .unwrap();

    fs::write(
        raw.join("neighborhood-demographics.csv"),
        "neighborhood,population,median_family_income\nRoxbury,50000,50000\n",
    )
    .unwrap();

    fs::write(
        raw.join("schools.csv"),
        "SCH_NAME,ZIPCODE,CITY,Lat,Long\n\
         Dearborn STEM Academy,02119,Roxbury,42.315,-71.085\n\
         Boston Latin School,,Fenway,,\n",
    )
    .unwrap();

    fs::write(
        raw.join("restaurant-inspections.csv"),
        "businessname,licenseno,address,zip,result,Lat,Long\n\
         Dudley Cafe,L1,15 Warren St,02119,HE_Pass,42.32,-71.09\n\
         Dudley Cafe,L1,15 Warren St,02119,HE_Fail,42.32,-71.09\n\
         Fenway Grill,L2,1 Jersey St,02215,HE_Pass,42.345,-71.10\n",
    )
    .unwrap();

    let archive = fs::File::create(raw.join("mbta-gtfs.zip")).unwrap();
    let mut zip = zip::ZipWriter::new(archive);
    zip.start_file("stops.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(
        b"stop_id,stop_name,stop_lat,stop_lon\n\
          place-nubn,Nubian,42.329,-71.084\n\
          1234,Warren St,42.318,-71.082\n\
          9999,Quincy Center,42.25,-71.005\n",
    )
    .unwrap();
    zip.finish().unwrap();

    fs::write(
        raw.join("open-space.geojson"),
        collection(&[square("Franklin Park", "SITE_NAME", -71.095, 42.315, -71.090, 42.320)]),
    )
    .unwrap();
}

fn config(dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        raw_dir: dir.path().join("raw"),
        processed_dir: dir.path().join("processed"),
        source_urls: BTreeMap::new(),
        ..Default::default()
    }
}

fn key(name: &str) -> NeighborhoodKey {
    NeighborhoodKey::new(name).unwrap()
}

fn summaries(config: &PipelineConfig) -> BTreeMap<NeighborhoodKey, NeighborhoodSummary> {
    read_table::<NeighborhoodSummary>(&config.processed_path(SUMMARY_FILE))
        .unwrap()
        .into_iter()
        .map(|s| (s.neighborhood.clone(), s))
        .collect()
}

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.unwrap_or_else(|| panic!("expected {expected}, got none"));
    assert!((actual - expected).abs() < 1e-6, "expected {expected}, got {actual}");
}

/// Every processed output except the run report, which carries a timestamp.
fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && !entry.path().ends_with(REPORT_FILE))
        .map(|entry| {
            let relative = entry.path().strip_prefix(dir).unwrap().to_path_buf();
            (relative, fs::read(entry.path()).unwrap())
        })
        .collect()
}

#[test]
fn test_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    write_extracts(&dir.path().join("raw"));
    let config = config(&dir);

    let report = Pipeline::new(config.clone()).run().expect("pipeline run failed");
    assert_eq!(report.neighborhoods, 2);
    for dataset in [
        Dataset::Boundaries,
        Dataset::Property,
        Dataset::Crime,
        Dataset::Demographics,
        Dataset::Schools,
        Dataset::Transit,
        Dataset::Restaurants,
        Dataset::OpenSpace,
    ] {
        assert!(report.succeeded(dataset), "{dataset} stage failed: {:?}", report.datasets.get(&dataset));
        assert!(config.processed_path(dataset.cleaned_file()).exists());
    }

    let by_name = summaries(&config);
    assert_eq!(by_name.len(), 2);

    let roxbury = &by_name[&key("Roxbury")];
    assert_close(roxbury.median_property_value, 500_000.0);
    assert_close(roxbury.median_income, 50_000.0);
    assert_close(roxbury.affordability_ratio, 10.0);
    assert_close(roxbury.crime_rate, 2000.0 / 3.0);
    assert_eq!(roxbury.school_count, Some(1));
    assert_eq!(roxbury.transit_stops, Some(2));
    assert_eq!(roxbury.restaurant_count, Some(1));

    let fenway = &by_name[&key("Fenway")];
    assert_close(fenway.median_property_value, 900_000.0);
    assert_close(fenway.crime_rate, 1000.0 / 3.0);
    assert_eq!(fenway.median_income, None);
    assert_eq!(fenway.affordability_ratio, None);
    assert_eq!(fenway.school_count, Some(1));
    assert_eq!(fenway.transit_stops, Some(0));
    assert_eq!(fenway.restaurant_count, Some(1));

    for summary in by_name.values() {
        for score in [summary.median_property_value_score, summary.crime_rate_score, summary.school_count_score]
            .into_iter()
            .flatten()
        {
            assert!((0.0..=100.0).contains(&score));
        }
    }

    let property = &report.datasets[&Dataset::Property];
    let diagnostics = property.diagnostics.as_ref().unwrap();
    assert_eq!(diagnostics.rows_written, 4);
    assert_eq!(diagnostics.attributed_by_postal_code, 1);
    assert!(property.quarantine.as_ref().unwrap().exists());

    let enriched: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.processed_path(ENRICHED_BOUNDARIES_FILE)).unwrap())
            .unwrap();
    let features = enriched["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    let roxbury_feature = features
        .iter()
        .find(|f| f["properties"]["Name"] == "Roxbury")
        .unwrap();
    assert_eq!(roxbury_feature["properties"]["median_home_value"], 500_000.0);

    let report_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.processed_path(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(report_json["neighborhoods"], 2);
}

#[test]
fn test_rerun_on_unchanged_extracts_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    write_extracts(&dir.path().join("raw"));
    let config = config(&dir);

    Pipeline::new(config.clone()).run().unwrap();
    let first = snapshot(&config.processed_dir);
    Pipeline::new(config.clone()).run().unwrap();
    let second = snapshot(&config.processed_dir);

    assert!(first.contains_key(Path::new(SUMMARY_FILE)));
    assert_eq!(first, second);
}

#[test]
fn test_views_over_processed_outputs() {
    let dir = tempfile::tempdir().unwrap();
    write_extracts(&dir.path().join("raw"));
    let config = config(&dir);
    Pipeline::new(config.clone()).run().unwrap();

    let data = ProcessedData::load(&config).unwrap();

    let profile = data.profile("Roxbury").unwrap();
    assert_eq!(profile.property_stats.total_properties, 3);
    assert_eq!(profile.crime_stats.total_crimes, 2);
    assert_eq!(profile.amenities.restaurants, 1);
    assert!(data.profile("Atlantis").is_err());

    let trends = data.crime_trends();
    let roxbury = &trends[&key("Roxbury")];
    assert_eq!(roxbury.len(), 1);
    assert_eq!(roxbury[0].month, "2024-01");
    assert_eq!(roxbury[0].crime_count, 2);

    assert_eq!(data.max_price().max_price, 900_000.0);

    let affordability = data.affordability();
    assert_eq!(affordability.neighborhoods.len(), 1);
    assert_close(Some(affordability.neighborhoods[0].price_to_income_ratio), 10.0);
}

#[test]
fn test_malformed_boundaries_fall_back_to_postal_codes() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    write_extracts(&raw);
    fs::write(raw.join("boston-neighborhoods.geojson"), "{ not geojson").unwrap();
    let config = config(&dir);

    let report = Pipeline::new(config.clone()).run().expect("run should survive bad boundaries");
    assert!(!report.succeeded(Dataset::Boundaries));
    assert!(report.succeeded(Dataset::Property));
    assert!(!config.processed_path(ENRICHED_BOUNDARIES_FILE).exists());

    let by_name = summaries(&config);
    let roxbury = &by_name[&key("Roxbury")];
    assert_close(roxbury.median_property_value, 500_000.0);

    // Crime rows carry coordinates only, so nothing can be attributed.
    let crime = report.datasets[&Dataset::Crime].diagnostics.as_ref().unwrap();
    assert_eq!(crime.attributed(), 0);
    assert_eq!(crime.rows_written, 4);
}
