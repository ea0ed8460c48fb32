//! Defines the parking station record returned by the station list endpoint,
//! plus the `rstar` implementations used for nearest-station lookups.

use rstar::{PointDistance, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

/// A parking station and its location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingStation {
    /// Upstream station code (e.g. `"103"`), always stored as text.
    pub code: String,
    /// Human readable name, e.g. `"P03 - Piazza Walther"`.
    pub name: String,
    /// Municipality from the station metadata, if reported.
    pub municipality: Option<String>,
    pub location: Coordinate,
}

/// WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Stations are points, so the envelope is a degenerate box at `[latitude, longitude]`.
impl RTreeObject for ParkingStation {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.location.latitude, self.location.longitude])
    }
}

/// Squared planar distance in degree space. Only used to order R-tree candidates;
/// real distances are computed with the haversine formula afterwards.
impl PointDistance for ParkingStation {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.location.latitude - point[0];
        let dy = self.location.longitude - point[1];
        dx * dx + dy * dy
    }
}
