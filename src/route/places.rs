use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{Result, SignalError};
use crate::geo_index::Coordinate;

#[derive(Debug, Deserialize)]
struct PlaceRecord {
    #[serde(rename = "Place Name")]
    name: String,
    #[serde(rename = "Latitude")]
    latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    longitude: Option<f64>,
}

/// Exact-name lookup from place to coordinates. A place listed with a blank
/// latitude or longitude is known but unresolvable.
#[derive(Debug, Clone, Default)]
pub struct PlaceDirectory {
    places: HashMap<String, Option<Coordinate>>,
}

impl PlaceDirectory {
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let directory = Self::from_reader(file)?;
        info!(path = %path.as_ref().display(), places = directory.places.len(), "Loaded place coordinates");
        Ok(directory)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut places = HashMap::new();
        for result in rdr.deserialize() {
            let record: PlaceRecord = result?;
            let coordinate = match (record.latitude, record.longitude) {
                (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
                _ => None,
            };
            // first listing of a name wins
            places.entry(record.name).or_insert(coordinate);
        }
        Ok(Self { places })
    }

    pub fn insert(&mut self, name: impl Into<String>, coordinate: Option<Coordinate>) {
        self.places.insert(name.into(), coordinate);
    }

    pub fn resolve(&self, place: &str) -> Result<Coordinate> {
        self.places
            .get(place)
            .copied()
            .flatten()
            .ok_or_else(|| SignalError::UnresolvedPlace {
                place: place.to_string(),
            })
    }
}
