//! Feature rows keyed by exact reference coordinates, and assembly of the
//! predictor input row for a query.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info};

use crate::error::{Result, SignalError};
use crate::geo_index::{Coordinate, ReferenceIndex, ReferencePoint};

const LAT_COLUMN: &str = "Lat";
const LONG_COLUMN: &str = "Long";

/// A single cell of a feature row. Numeric and categorical columns share this
/// type so every assembled row has the same shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

/// How every cell of one CSV column is read. A column is numeric only when
/// all of its non-blank cells parse as numbers; otherwise every cell is text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Numeric,
    Text,
}

impl ColumnKind {
    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let mut cells = cells.map(str::trim).filter(|c| !c.is_empty());
        if cells.all(|c| c.parse::<f64>().is_ok()) {
            Self::Numeric
        } else {
            Self::Text
        }
    }

    /// Reads a raw cell. Blank and NaN cells are missing.
    fn read(self, cell: &str) -> Option<FeatureValue> {
        let cell = cell.trim();
        if cell.is_empty() {
            return None;
        }
        match self {
            Self::Numeric => cell
                .parse::<f64>()
                .ok()
                .filter(|n| !n.is_nan())
                .map(FeatureValue::Number),
            Self::Text if cell.eq_ignore_ascii_case("nan") => None,
            Self::Text => Some(FeatureValue::Text(cell.to_string())),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for FeatureValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

/// Named values in a fixed column order. Serializes as a JSON object whose
/// keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    columns: Vec<String>,
    values: Vec<FeatureValue>,
}

impl FeatureRow {
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<FeatureValue>) {
        self.columns.push(column.into());
        self.values.push(value.into());
    }

    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }
}

impl Serialize for FeatureRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// The exact input row handed to a predictor.
pub type AssembledRow = FeatureRow;

/// A location/time query as received from callers. Calendar validity is not
/// checked; values are passed through to the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub latitude: f64,
    pub longitude: f64,
    pub hour: u32,
    pub month: u32,
    pub day: u32,
}

#[derive(Debug, Clone)]
struct StoredRow {
    coordinate: Coordinate,
    cells: Vec<Option<FeatureValue>>,
}

/// Precomputed feature rows loaded from a CSV with `Lat` and `Long` columns.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    name: String,
    columns: Vec<String>,
    rows: Vec<StoredRow>,
    by_coordinate: HashMap<Coordinate, Vec<usize>>,
}

impl FeatureTable {
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(path.display().to_string(), file)?;
        info!(
            table = %table.name,
            rows = table.rows.len(),
            columns = table.columns.len(),
            "Loaded feature table"
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self> {
        let name = name.into();
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();

        let position = |column: &str| {
            headers
                .iter()
                .position(|h| h.trim() == column)
                .ok_or_else(|| SignalError::invalid_data(&name, format!("missing column '{column}'")))
        };
        let lat_idx = position(LAT_COLUMN)?;
        let long_idx = position(LONG_COLUMN)?;

        let feature_idx: Vec<usize> = (0..headers.len())
            .filter(|&i| i != lat_idx && i != long_idx)
            .collect();
        let columns = feature_idx
            .iter()
            .map(|&i| headers[i].trim().to_string())
            .collect();

        let records = rdr.records().collect::<std::result::Result<Vec<_>, _>>()?;
        let kinds: Vec<ColumnKind> = feature_idx
            .iter()
            .map(|&i| ColumnKind::infer(records.iter().filter_map(|r| r.get(i))))
            .collect();

        let mut rows = Vec::with_capacity(records.len());
        let mut by_coordinate: HashMap<Coordinate, Vec<usize>> = HashMap::new();

        for (line, record) in records.iter().enumerate() {
            let parse_coord = |idx: usize| {
                record
                    .get(idx)
                    .and_then(|cell| cell.trim().parse::<f64>().ok())
                    .ok_or_else(|| {
                        SignalError::invalid_data(
                            &name,
                            format!("row {}: unreadable coordinate", line + 1),
                        )
                    })
            };
            let coordinate = Coordinate::new(parse_coord(lat_idx)?, parse_coord(long_idx)?);
            let cells = feature_idx
                .iter()
                .zip(&kinds)
                .map(|(&i, kind)| record.get(i).and_then(|cell| kind.read(cell)))
                .collect();

            by_coordinate.entry(coordinate).or_default().push(rows.len());
            rows.push(StoredRow { coordinate, cells });
        }

        Ok(Self {
            name,
            columns,
            rows,
            by_coordinate,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Feature column names, excluding `Lat` and `Long`.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct coordinates in the order they first appear.
    pub fn coordinates(&self) -> Vec<Coordinate> {
        let mut seen = std::collections::HashSet::new();
        self.rows
            .iter()
            .filter(|row| seen.insert(row.coordinate))
            .map(|row| row.coordinate)
            .collect()
    }

    /// Number of rows stored for an exact coordinate.
    pub fn matches(&self, coordinate: &Coordinate) -> usize {
        self.by_coordinate.get(coordinate).map_or(0, Vec::len)
    }

    /// The first row recorded at `coordinate`, with missing cells filled with 0.
    pub fn first_row_at(&self, coordinate: &Coordinate) -> Option<FeatureRow> {
        let idx = *self.by_coordinate.get(coordinate)?.first()?;
        let mut row = FeatureRow::default();
        for (column, cell) in self.columns.iter().zip(&self.rows[idx].cells) {
            row.push(column.clone(), cell.clone().unwrap_or(FeatureValue::Number(0.0)));
        }
        Some(row)
    }
}

/// Builds the predictor input for `query` from the feature row stored at the
/// nearest reference point.
///
/// The row starts with `Lat`, `Long`, `Hour`, `Day`, `Month` taken from the
/// query, followed by every feature column of the matched row. When several
/// rows share the coordinate, the first one is used.
///
/// # Errors
///
/// Returns [`SignalError::FeatureNotFound`] if `dataset` holds no row at the
/// exact coordinate of `nearest`.
pub fn assemble(nearest: &ReferencePoint, query: &Query, dataset: &FeatureTable) -> Result<AssembledRow> {
    let coordinate = nearest.coordinate;
    let features = dataset
        .first_row_at(&coordinate)
        .ok_or(SignalError::FeatureNotFound {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
        })?;

    let matched = dataset.matches(&coordinate);
    if matched > 1 {
        debug!(
            table = dataset.name(),
            lat = coordinate.latitude,
            long = coordinate.longitude,
            matched,
            "Several feature rows share a coordinate, using the first"
        );
    }

    let mut row = FeatureRow::default();
    row.push(LAT_COLUMN, query.latitude);
    row.push(LONG_COLUMN, query.longitude);
    row.push("Hour", query.hour);
    row.push("Day", query.day);
    row.push("Month", query.month);
    for (column, value) in features.iter() {
        row.push(column, value.clone());
    }
    Ok(row)
}

/// A reference index together with the feature table it resolves into.
#[derive(Debug, Clone)]
pub struct ReferenceSet {
    pub index: ReferenceIndex,
    pub features: FeatureTable,
}

impl ReferenceSet {
    /// Indexes the feature table's own coordinates.
    pub fn from_table(features: FeatureTable) -> Self {
        Self {
            index: ReferenceIndex::from_table(&features),
            features,
        }
    }

    /// Loads the feature table, and the location list when one is given and
    /// exists on disk.
    pub fn load(features_path: impl AsRef<Path>, locations_path: Option<&Path>) -> Result<Self> {
        let features = FeatureTable::load_csv(features_path)?;
        match locations_path {
            Some(path) if path.exists() => {
                let mut index = ReferenceIndex::load_csv(path)?;
                index.attach_features(&features);
                Ok(Self { index, features })
            }
            _ => Ok(Self::from_table(features)),
        }
    }

    /// Nearest reference point, then feature assembly.
    pub fn resolve(&self, query: &Query) -> Result<AssembledRow> {
        let nearest = self.index.nearest(query.latitude, query.longitude)?;
        debug!(
            lat = nearest.coordinate.latitude,
            long = nearest.coordinate.longitude,
            "Nearest reference point"
        );
        assemble(nearest, query, &self.features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = "\
Lat,Long,Road Type,Lanes,Speed Limit
10.0,20.0,primary,2,50
10.0,25.0,secondary,,30
10.0,20.0,tertiary,1,20
";

    #[test]
    fn test_load_splits_coordinates_from_features() {
        let table = table();
        assert_eq!(table.columns(), ["Road Type", "Lanes", "Speed Limit"]);
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.coordinates(),
            vec![Coordinate::new(10.0, 20.0), Coordinate::new(10.0, 25.0)]
        );
        assert_eq!(table.matches(&Coordinate::new(10.0, 20.0)), 2);
    }

    #[test]
    fn test_load_without_lat_column_fails() {
        let result = FeatureTable::from_reader("bad", "Latitude,Long,x\n1,2,3\n".as_bytes());
        assert!(matches!(result, Err(SignalError::InvalidData { .. })));
    }

    #[test]
    fn test_assemble_uses_query_coordinates_and_matched_features() {
        let table = table();
        let index = ReferenceIndex::from_table(&table);
        let query = query(10.0, 21.0);
        let nearest = index.nearest(query.latitude, query.longitude).unwrap();

        let row = assemble(nearest, &query, &table).unwrap();

        assert_eq!(
            row.columns(),
            ["Lat", "Long", "Hour", "Day", "Month", "Road Type", "Lanes", "Speed Limit"]
        );
        assert_eq!(row.get("Lat"), Some(&FeatureValue::Number(10.0)));
        assert_eq!(row.get("Long"), Some(&FeatureValue::Number(21.0)));
        assert_eq!(row.get("Hour"), Some(&FeatureValue::Integer(8)));
        assert_eq!(row.get("Day"), Some(&FeatureValue::Integer(14)));
        assert_eq!(row.get("Month"), Some(&FeatureValue::Integer(3)));
        assert_eq!(
            row.get("Road Type"),
            Some(&FeatureValue::Text("primary".to_string()))
        );
    }

    #[test]
    fn test_assemble_fills_missing_cells_with_zero() {
        let table = table();
        let set = ReferenceSet::from_table(table);
        let row = set.resolve(&query(10.0, 24.9)).unwrap();
        assert_eq!(row.get("Lanes"), Some(&FeatureValue::Number(0.0)));
        assert_eq!(row.get("Speed Limit"), Some(&FeatureValue::Number(30.0)));
    }

    #[test]
    fn test_assemble_missing_coordinate_is_an_error() {
        let table = table();
        let stray = ReferencePoint {
            coordinate: Coordinate::new(11.0, 20.0),
            features: FeatureRow::default(),
        };
        match assemble(&stray, &query(11.0, 20.0), &table) {
            Err(SignalError::FeatureNotFound {
                latitude,
                longitude,
            }) => {
                assert_eq!(latitude, 11.0);
                assert_eq!(longitude, 20.0);
            }
            other => panic!("expected FeatureNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let set = ReferenceSet::from_table(table());
        let q = query(10.2, 20.4);
        assert_eq!(set.resolve(&q).unwrap(), set.resolve(&q).unwrap());
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let mut row = FeatureRow::default();
        row.push("Zeta", 1.0);
        row.push("Alpha", FeatureValue::Text("x".to_string()));
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"Zeta":1.0,"Alpha":"x"}"#);
    }

    #[test]
    fn test_column_type_is_shared_by_every_row() {
        let csv = "Lat,Long,Road Class,Width\n10.0,20.0,A,3.5\n10.0,25.0,2,4\n10.0,30.0,,nan\n";
        let table = FeatureTable::from_reader("mixed", csv.as_bytes()).unwrap();

        let a = table.first_row_at(&Coordinate::new(10.0, 20.0)).unwrap();
        let b = table.first_row_at(&Coordinate::new(10.0, 25.0)).unwrap();
        let blank = table.first_row_at(&Coordinate::new(10.0, 30.0)).unwrap();

        assert_eq!(a.get("Road Class"), Some(&FeatureValue::Text("A".to_string())));
        assert_eq!(b.get("Road Class"), Some(&FeatureValue::Text("2".to_string())));
        assert_eq!(b.get("Width"), Some(&FeatureValue::Number(4.0)));
        assert_eq!(blank.get("Road Class"), Some(&FeatureValue::Number(0.0)));
        assert_eq!(blank.get("Width"), Some(&FeatureValue::Number(0.0)));
        assert_eq!(
            serde_json::to_string(&b).unwrap(),
            r#"{"Road Class":"2","Width":4.0}"#
        );
    }

    #[test]
    fn test_calendar_fields_serialize_as_integers() {
        let set = ReferenceSet::from_table(table());
        let row = set.resolve(&query(10.0, 20.0)).unwrap();
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["Hour"], serde_json::json!(8));
        assert!(json["Hour"].is_u64());
        assert!(json["Lat"].is_f64());
    }

    #[test]
    fn test_load_with_location_file_carries_features() {
        let dir = std::env::temp_dir().join("city_signals_test_locations");
        std::fs::create_dir_all(&dir).unwrap();
        let features_path = dir.join("features.csv");
        let locations_path = dir.join("locations.csv");
        std::fs::write(&features_path, DATASET).unwrap();
        std::fs::write(&locations_path, " Lat , Long \n10.0,25.0\n12.0,20.0\n").unwrap();

        let set = ReferenceSet::load(&features_path, Some(locations_path.as_path())).unwrap();

        let covered = set.index.nearest(10.0, 24.0).unwrap();
        assert_eq!(
            covered.features.get("Road Type"),
            Some(&FeatureValue::Text("secondary".to_string()))
        );
        let uncovered = set.index.nearest(12.0, 20.0).unwrap();
        assert!(uncovered.features.is_empty());
        assert!(matches!(
            set.resolve(&query(12.0, 20.0)),
            Err(SignalError::FeatureNotFound { .. })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    fn table() -> FeatureTable {
        FeatureTable::from_reader("test", DATASET.as_bytes()).unwrap()
    }

    fn query(latitude: f64, longitude: f64) -> Query {
        Query {
            latitude,
            longitude,
            hour: 8,
            month: 3,
            day: 14,
        }
    }
}
