//! # Coordinate Conventions
//!
//! Coordinates travel on the wire as integers in the E7 representation:
//! degrees multiplied by [`COORD_FACTOR`] and rounded to the nearest integer.
//! This module adds the conversions and formatting the server uses when it
//! logs features, on top of the generated [`Point`] and [`Feature`] types.

use crate::proto::{Feature, Point};
use core::fmt;

/// Scale between degrees and the integer E7 representation.
pub const COORD_FACTOR: f64 = 1e7;

impl Point {
    /// Builds a point from floating-point degrees, rounding to E7.
    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: (latitude * COORD_FACTOR).round() as i32,
            longitude: (longitude * COORD_FACTOR).round() as i32,
        }
    }

    pub fn latitude_degrees(&self) -> f64 {
        f64::from(self.latitude) / COORD_FACTOR
    }

    pub fn longitude_degrees(&self) -> f64 {
        f64::from(self.longitude) / COORD_FACTOR
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.7}, {:.7}",
            self.latitude_degrees(),
            self.longitude_degrees()
        )
    }
}

impl Feature {
    /// Returns `true` when the record names an actual feature. An empty name
    /// marks a location with nothing on it.
    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    /// Location of the feature, or the origin when the snapshot omitted it.
    pub fn point(&self) -> Point {
        self.location.unwrap_or_default()
    }
}
