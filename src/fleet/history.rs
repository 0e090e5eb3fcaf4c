//! Monthly ridership history and its per city/weekday aggregates.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::utility::mean;
use crate::error::{Result, SignalError};

/// One row of the monthly history table.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoricalRecord {
    #[serde(rename = "Month")]
    pub month: u32,
    #[serde(rename = "Bus City Services")]
    pub city: String,
    #[serde(rename = "Day of Week")]
    pub day_of_week: String,
    #[serde(rename = "Number of passengers")]
    pub passengers: u64,
    #[serde(rename = "Number of buses")]
    pub buses: u64,
}

impl HistoricalRecord {
    pub fn passenger_to_bus_ratio(&self) -> f64 {
        self.passengers as f64 / self.buses as f64
    }
}

/// Mean passenger-to-bus ratio and total passengers for one city and weekday
/// within a month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityMonthRatio {
    pub city: String,
    pub day_of_week: String,
    pub mean_passenger_to_bus_ratio: f64,
    pub total_passengers: u64,
}

impl CityMonthRatio {
    /// Buses needed to carry the weekday's passengers at the mean ratio.
    pub fn recommended_buses(&self) -> f64 {
        self.total_passengers as f64 / self.mean_passenger_to_bus_ratio
    }
}

pub fn load_history(path: impl AsRef<Path>) -> Result<Vec<HistoricalRecord>> {
    let mut rdr = csv::Reader::from_path(path.as_ref())?;
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let record: HistoricalRecord = result?;
        rows.push(record);
    }
    info!(path = %path.as_ref().display(), rows = rows.len(), "Loaded fleet history");
    Ok(rows)
}

/// Groups the rows of `month` by (city, weekday), ordered by city then weekday.
///
/// # Errors
///
/// [`SignalError::NoHistoricalData`] when no row belongs to `month`;
/// [`SignalError::DegenerateAllocation`] when a row has no buses, or a group's
/// mean ratio is zero or not finite.
pub fn city_month_ratios(history: &[HistoricalRecord], month: u32) -> Result<Vec<CityMonthRatio>> {
    let mut groups: BTreeMap<(&str, &str), (Vec<f64>, u64)> = BTreeMap::new();

    for record in history.iter().filter(|r| r.month == month) {
        let ratio = record.passenger_to_bus_ratio();
        if !ratio.is_finite() {
            return Err(SignalError::DegenerateAllocation {
                month,
                reason: format!(
                    "{} on {} has {} passengers for {} buses",
                    record.city, record.day_of_week, record.passengers, record.buses
                ),
            });
        }
        let (ratios, total) = groups
            .entry((record.city.as_str(), record.day_of_week.as_str()))
            .or_default();
        ratios.push(ratio);
        *total += record.passengers;
    }

    if groups.is_empty() {
        return Err(SignalError::NoHistoricalData { month });
    }

    groups
        .into_iter()
        .map(|((city, day_of_week), (ratios, total_passengers))| {
            let mean_ratio = mean(&ratios);
            if mean_ratio == 0.0 || !mean_ratio.is_finite() {
                return Err(SignalError::DegenerateAllocation {
                    month,
                    reason: format!("{city} on {day_of_week} has a mean passenger-to-bus ratio of {mean_ratio}"),
                });
            }
            Ok(CityMonthRatio {
                city: city.to_string(),
                day_of_week: day_of_week.to_string(),
                mean_passenger_to_bus_ratio: mean_ratio,
                total_passengers,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_by_city_and_weekday() {
        let history = vec![
            record(3, "Dublin", "Monday", 100, 10),
            record(3, "Dublin", "Monday", 300, 10),
            record(3, "Cork", "Tuesday", 50, 5),
            record(4, "Dublin", "Monday", 999, 1),
        ];

        let ratios = city_month_ratios(&history, 3).unwrap();

        assert_eq!(ratios.len(), 2);
        assert_eq!(ratios[0].city, "Cork");
        assert_eq!(ratios[1].city, "Dublin");
        assert_eq!(ratios[1].mean_passenger_to_bus_ratio, 20.0);
        assert_eq!(ratios[1].total_passengers, 400);
        assert_eq!(ratios[1].recommended_buses(), 20.0);
    }

    #[test]
    fn test_month_without_rows() {
        let history = vec![record(3, "Dublin", "Monday", 100, 10)];
        assert!(matches!(
            city_month_ratios(&history, 7),
            Err(SignalError::NoHistoricalData { month: 7 })
        ));
    }

    #[test]
    fn test_zero_buses_is_degenerate() {
        let history = vec![record(3, "Dublin", "Monday", 100, 0)];
        assert!(matches!(
            city_month_ratios(&history, 3),
            Err(SignalError::DegenerateAllocation { month: 3, .. })
        ));
    }

    #[test]
    fn test_zero_ratio_is_degenerate() {
        let history = vec![record(3, "Galway", "Sunday", 0, 4)];
        assert!(matches!(
            city_month_ratios(&history, 3),
            Err(SignalError::DegenerateAllocation { .. })
        ));
    }

    fn record(month: u32, city: &str, day: &str, passengers: u64, buses: u64) -> HistoricalRecord {
        HistoricalRecord {
            month,
            city: city.to_string(),
            day_of_week: day.to_string(),
            passengers,
            buses,
        }
    }
}
