//! Output formatting and persistence for CLI results.
//!
//! Supports pretty-printing, JSON serialization, and CSV append of fleet
//! allocations.

use std::fs::OpenOptions;
use std::path::Path;

use csv::WriterBuilder;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::fleet::CityAllocation;

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty(value: &impl std::fmt::Debug) {
    debug!("{:#?}", value);
}

/// Prints a value to stdout as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One CSV row of a month's allocation.
#[derive(Debug, Serialize)]
struct AllocationRecord<'a> {
    month: u32,
    city: &'a str,
    raw_recommended: f64,
    varied_recommended: f64,
    recommended_buses: i64,
}

/// Appends one row per city to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_allocations(path: impl AsRef<Path>, month: u32, allocations: &[CityAllocation]) -> Result<()> {
    let path = path.as_ref();
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, rows = allocations.len(), "Appending allocation rows");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for allocation in allocations {
        writer.serialize(AllocationRecord {
            month,
            city: &allocation.city,
            raw_recommended: allocation.raw_recommended,
            varied_recommended: allocation.varied_recommended,
            recommended_buses: allocation.scaled_recommended,
        })?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn allocations() -> Vec<CityAllocation> {
        vec![
            CityAllocation {
                city: "Cork".to_string(),
                raw_recommended: 120.0,
                varied_recommended: 118.5,
                scaled_recommended: 300,
            },
            CityAllocation {
                city: "Dublin".to_string(),
                raw_recommended: 170.0,
                varied_recommended: 162.4,
                scaled_recommended: 411,
            },
        ]
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&allocations());
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&allocations()).unwrap();
    }

    #[test]
    fn test_append_allocations_creates_file() {
        let path = temp_path("city_signals_test_create.csv");
        let _ = fs::remove_file(&path);

        append_allocations(&path, 3, &allocations()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines[0],
            "month,city,raw_recommended,varied_recommended,recommended_buses"
        );
        assert_eq!(lines[1], "3,Cork,120.0,118.5,300");
        assert_eq!(lines.len(), 3);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_allocations_writes_header_once() {
        let path = temp_path("city_signals_test_header.csv");
        let _ = fs::remove_file(&path);

        append_allocations(&path, 1, &allocations()).unwrap();
        append_allocations(&path, 2, &allocations()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.starts_with("month,")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 5);

        fs::remove_file(&path).unwrap();
    }
}
