//! Coordinates and their cache keys

use serde::{Deserialize, Serialize};
use std::fmt;

/// A WGS84 point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and within the latitude/longitude ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Round to `precision` decimal places for use as a cache key.
    ///
    /// Two points that round to the same value share a key.
    pub fn key(&self, precision: u32) -> CoordKey {
        let scale = 10f64.powi(precision as i32);
        CoordKey {
            lat: (self.lat * scale).round() as i64,
            lon: (self.lon * scale).round() as i64,
            precision,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lon)
    }
}

/// Coordinate rounded to a fixed number of decimal places, stored as
/// scaled integers so equal keys hash equally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordKey {
    lat: i64,
    lon: i64,
    precision: u32,
}

impl CoordKey {
    pub fn precision(&self) -> u32 {
        self.precision
    }
}

impl fmt::Display for CoordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = 10f64.powi(self.precision as i32);
        let places = self.precision as usize;
        write!(
            f,
            "{:.*},{:.*}",
            places,
            self.lat as f64 / scale,
            places,
            self.lon as f64 / scale
        )
    }
}
