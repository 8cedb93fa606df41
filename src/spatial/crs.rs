//! Coordinate reference systems used by the boundary and open-space files.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use geo::{Coord, Point};
use geojson::FeatureCollection;
use serde::Serialize;

use super::LatLon;

/// Spherical Mercator earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_378_137.0;
/// Latitude limit of the square Web Mercator world.
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Crs {
    /// EPSG:4326 / OGC CRS84 longitude-latitude degrees.
    #[default]
    Wgs84,
    /// EPSG:3857 meters.
    WebMercator,
}

impl Crs {
    /// Reads the legacy `crs` member of a feature collection. Anything that is
    /// not recognizably Web Mercator is treated as WGS84.
    pub fn of_collection(collection: &FeatureCollection) -> Self {
        let name = collection
            .foreign_members
            .as_ref()
            .and_then(|members| members.get("crs"))
            .and_then(|crs| crs.pointer("/properties/name"))
            .and_then(|name| name.as_str());

        match name {
            Some(name) if ["3857", "900913", "102100", "3785"].iter().any(|code| name.contains(code)) => {
                Crs::WebMercator
            }
            _ => Crs::Wgs84,
        }
    }

    /// Projects a WGS84 position into this CRS. Invalid positions yield `None`.
    pub fn project(self, position: LatLon) -> Option<Point<f64>> {
        if !position.is_valid() {
            return None;
        }
        Some(match self {
            Crs::Wgs84 => Point::new(position.lon, position.lat),
            Crs::WebMercator => {
                let (x, y) = to_web_mercator(position);
                Point::new(x, y)
            }
        })
    }

    /// Converts a point in this CRS back to WGS84.
    pub fn unproject(self, point: Point<f64>) -> LatLon {
        match self {
            Crs::Wgs84 => LatLon::new(point.y(), point.x()),
            Crs::WebMercator => from_web_mercator(point.x(), point.y()),
        }
    }

    /// Converts a coordinate in this CRS to Web Mercator meters.
    pub fn to_meters(self, coord: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::WebMercator => coord,
            Crs::Wgs84 => {
                let (x, y) = to_web_mercator(LatLon::new(coord.y, coord.x));
                Coord { x, y }
            }
        }
    }
}

pub fn to_web_mercator(position: LatLon) -> (f64, f64) {
    let lat = position.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = EARTH_RADIUS_M * position.lon.to_radians();
    let y = EARTH_RADIUS_M * (FRAC_PI_4 + lat / 2.0).tan().ln();
    (x, y)
}

pub fn from_web_mercator(x: f64, y: f64) -> LatLon {
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - FRAC_PI_2).to_degrees();
    LatLon::new(lat, lon)
}
