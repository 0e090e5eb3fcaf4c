//! Nearest-reference-point lookup over a small, static set of coordinates.

use std::hash::{Hash, Hasher};
use std::path::Path;

use geo::{Distance, Geodesic, Point};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SignalError};
use crate::features::{FeatureRow, FeatureTable};

/// A (latitude, longitude) pair compared bit-for-bit.
///
/// Two coordinates are the same key only when both floats have identical bit
/// patterns, so `0.0` and `-0.0` are distinct and no tolerance is applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    fn bits(&self) -> (u64, u64) {
        (self.latitude.to_bits(), self.longitude.to_bits())
    }

    fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Geodesic (WGS84 ellipsoid) distance in metres.
    pub fn geodesic_distance(&self, other: &Coordinate) -> f64 {
        Geodesic.distance(self.to_point(), other.to_point())
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// A known location with the feature row that stands in for any query near it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePoint {
    pub coordinate: Coordinate,
    pub features: FeatureRow,
}

#[derive(Debug, Deserialize)]
struct LocationRecord {
    #[serde(rename = "Lat")]
    lat: f64,
    #[serde(rename = "Long")]
    long: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    points: Vec<ReferencePoint>,
}

impl ReferenceIndex {
    pub fn new(points: Vec<ReferencePoint>) -> Self {
        Self { points }
    }

    /// Indexes the distinct coordinates of a feature table in first-seen order,
    /// each carrying the first feature row recorded for it.
    pub fn from_table(table: &FeatureTable) -> Self {
        let points = table
            .coordinates()
            .into_iter()
            .map(|coordinate| ReferencePoint {
                coordinate,
                features: table.first_row_at(&coordinate).unwrap_or_default(),
            })
            .collect();
        Self { points }
    }

    /// Loads a location list with `Lat` and `Long` columns. Any other column is
    /// ignored. Points start with an empty feature row until
    /// [`attach_features`](Self::attach_features) fills them.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_path(path.as_ref())?;
        let mut points = Vec::new();
        for record in reader.deserialize() {
            let record: LocationRecord = record?;
            points.push(ReferencePoint {
                coordinate: Coordinate::new(record.lat, record.long),
                features: FeatureRow::default(),
            });
        }
        debug!(path = %path.as_ref().display(), points = points.len(), "Loaded reference locations");
        Ok(Self { points })
    }

    /// Sets each point's features to the first row the table holds at its
    /// coordinate. Points the table does not cover keep an empty row.
    pub fn attach_features(&mut self, table: &FeatureTable) {
        let mut uncovered = 0;
        for point in &mut self.points {
            match table.first_row_at(&point.coordinate) {
                Some(row) => point.features = row,
                None => uncovered += 1,
            }
        }
        if uncovered > 0 {
            debug!(table = table.name(), uncovered, "Reference points without feature rows");
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ReferencePoint] {
        &self.points
    }

    /// Returns the reference point geodesically closest to the query.
    ///
    /// Linear scan; on equal distances the point seen first in load order wins.
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Result<&ReferencePoint> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(SignalError::invalid_data(
                "query",
                format!("non-finite coordinates ({latitude}, {longitude})"),
            ));
        }

        let query = Coordinate::new(latitude, longitude);
        let mut best: Option<(&ReferencePoint, f64)> = None;

        for point in &self.points {
            let distance = query.geodesic_distance(&point.coordinate);
            match best {
                Some((_, min)) if distance >= min => {}
                _ => best = Some((point, distance)),
            }
        }

        best.map(|(point, _)| point).ok_or(SignalError::NoReferenceData)
    }
}
