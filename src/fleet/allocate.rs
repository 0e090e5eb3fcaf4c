use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, instrument};

use super::history::{HistoricalRecord, city_month_ratios, load_history};
use super::variability::{SeededVariability, VariabilitySource};
use crate::error::{Result, SignalError};

/// Number of buses every monthly allocation must add up to.
pub const FLEET_TOTAL: i64 = 711;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityAllocation {
    pub city: String,
    pub raw_recommended: f64,
    pub varied_recommended: f64,
    pub scaled_recommended: i64,
}

pub struct FleetAllocationEngine {
    history: Vec<HistoricalRecord>,
    variability: Box<dyn VariabilitySource>,
}

impl FleetAllocationEngine {
    pub fn new(history: Vec<HistoricalRecord>) -> Self {
        Self {
            history,
            variability: Box::new(SeededVariability::default()),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load_history(path)?))
    }

    pub fn with_variability(mut self, variability: impl VariabilitySource + 'static) -> Self {
        self.variability = Box::new(variability);
        self
    }

    /// Integer bus allocation per city for `month`, ordered by city name.
    ///
    /// The result is fully determined by the history and the month: the
    /// per-city perturbation comes from a generator seeded with the month.
    #[instrument(skip(self))]
    pub fn recommend(&self, month: u32) -> Result<Vec<CityAllocation>> {
        let ratios = city_month_ratios(&self.history, month)?;

        let mut raw_by_city: BTreeMap<&str, f64> = BTreeMap::new();
        for ratio in &ratios {
            *raw_by_city.entry(ratio.city.as_str()).or_default() += ratio.recommended_buses();
        }

        let factors = self.variability.factors(month, raw_by_city.len());
        if factors.len() != raw_by_city.len() {
            return Err(SignalError::DegenerateAllocation {
                month,
                reason: format!(
                    "{} variability factors for {} cities",
                    factors.len(),
                    raw_by_city.len()
                ),
            });
        }

        let mut allocations: Vec<CityAllocation> = raw_by_city
            .into_iter()
            .zip(factors)
            .map(|((city, raw), factor)| CityAllocation {
                city: city.to_string(),
                raw_recommended: raw,
                varied_recommended: raw * factor,
                scaled_recommended: 0,
            })
            .collect();

        let varied_total: f64 = allocations.iter().map(|a| a.varied_recommended).sum();
        if !(varied_total > 0.0 && varied_total.is_finite()) {
            return Err(SignalError::DegenerateAllocation {
                month,
                reason: format!("total varied recommendation is {varied_total}"),
            });
        }

        let scaling_factor = FLEET_TOTAL as f64 / varied_total;
        for allocation in &mut allocations {
            allocation.scaled_recommended =
                (allocation.varied_recommended * scaling_factor).round_ties_even() as i64;
        }
        debug!(scaling_factor, cities = allocations.len(), "Scaled allocation");

        correct_remainder(&mut allocations, FLEET_TOTAL);

        info!(month, cities = allocations.len(), "Fleet allocation computed");
        Ok(allocations)
    }
}

/// Adjusts rounded allocations one bus at a time until they sum to `total`.
///
/// Missing buses go to the city with the largest varied recommendation;
/// surplus buses come off the city with the smallest varied recommendation
/// that still has at least one bus. Ties go to the earlier city.
pub fn correct_remainder(allocations: &mut [CityAllocation], total: i64) {
    let mut remainder = total - allocations.iter().map(|a| a.scaled_recommended).sum::<i64>();

    while remainder != 0 {
        if remainder > 0 {
            let Some(idx) = extreme_varied(allocations, |candidate, best| candidate > best, |_| true)
            else {
                break;
            };
            allocations[idx].scaled_recommended += 1;
            remainder -= 1;
        } else {
            let Some(idx) = extreme_varied(
                allocations,
                |candidate, best| candidate < best,
                |a| a.scaled_recommended > 0,
            ) else {
                break;
            };
            allocations[idx].scaled_recommended -= 1;
            remainder += 1;
        }
    }
}

fn extreme_varied(
    allocations: &[CityAllocation],
    better: impl Fn(f64, f64) -> bool,
    eligible: impl Fn(&CityAllocation) -> bool,
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, allocation) in allocations.iter().enumerate() {
        if !eligible(allocation) {
            continue;
        }
        match best {
            Some(b) if !better(allocation.varied_recommended, allocations[b].varied_recommended) => {}
            _ => best = Some(idx),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedVariability(f64);

    impl VariabilitySource for FixedVariability {
        fn factors(&self, _month: u32, count: usize) -> Vec<f64> {
            vec![self.0; count]
        }
    }

    #[test]
    fn test_surplus_comes_off_smallest_city() {
        // two equal cities: 355.5 each rounds to 356, one bus too many
        let history = vec![record("City1", 10, 1), record("City2", 10, 1)];
        let engine = FleetAllocationEngine::new(history).with_variability(FixedVariability(1.0));

        let allocations = engine.recommend(3).unwrap();

        assert_eq!(scaled(&allocations), vec![355, 356]);
        assert_eq!(allocations[0].raw_recommended, 1.0);
    }

    #[test]
    fn test_shortfall_goes_to_largest_city() {
        // six equal cities: 118.5 each rounds to 118, three buses short
        let history: Vec<_> = ["A", "B", "C", "D", "E", "F"]
            .iter()
            .map(|c| record(c, 10, 1))
            .collect();
        let engine = FleetAllocationEngine::new(history).with_variability(FixedVariability(1.0));

        let allocations = engine.recommend(3).unwrap();

        assert_eq!(scaled(&allocations), vec![121, 118, 118, 118, 118, 118]);
    }

    #[test]
    fn test_seeded_allocation_sums_to_fleet_total() {
        let engine = FleetAllocationEngine::new(sample_history());
        for month in [3, 4] {
            let allocations = engine.recommend(month).unwrap();
            assert_eq!(allocations.len(), 4);
            assert_eq!(
                allocations.iter().map(|a| a.scaled_recommended).sum::<i64>(),
                FLEET_TOTAL
            );
            assert!(allocations.iter().all(|a| a.scaled_recommended >= 0));
            for a in &allocations {
                let factor = a.varied_recommended / a.raw_recommended;
                assert!(factor > 0.9 - 1e-9 && factor < 1.1 + 1e-9);
            }
        }
    }

    #[test]
    fn test_same_month_is_reproducible() {
        let first = FleetAllocationEngine::new(sample_history()).recommend(3).unwrap();
        let second = FleetAllocationEngine::new(sample_history()).recommend(3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_month() {
        let engine = FleetAllocationEngine::new(sample_history());
        assert!(matches!(
            engine.recommend(12),
            Err(SignalError::NoHistoricalData { month: 12 })
        ));
    }

    #[test]
    fn test_zero_variability_is_degenerate() {
        let engine =
            FleetAllocationEngine::new(sample_history()).with_variability(FixedVariability(0.0));
        assert!(matches!(
            engine.recommend(3),
            Err(SignalError::DegenerateAllocation { month: 3, .. })
        ));
    }

    #[test]
    fn test_correct_remainder_moves_one_unit() {
        let mut allocations = vec![
            allocation("City1", 4.0, 355),
            allocation("City2", 6.0, 357),
        ];
        correct_remainder(&mut allocations, 711);
        assert_eq!(scaled(&allocations), vec![354, 357]);

        let mut allocations = vec![
            allocation("City1", 4.0, 354),
            allocation("City2", 6.0, 356),
        ];
        correct_remainder(&mut allocations, 711);
        assert_eq!(scaled(&allocations), vec![354, 357]);
    }

    #[test]
    fn test_correct_remainder_skips_empty_cities() {
        let mut allocations = vec![
            allocation("Tiny", 0.1, 0),
            allocation("Big", 9.0, 12),
        ];
        correct_remainder(&mut allocations, 10);
        assert_eq!(scaled(&allocations), vec![0, 10]);
    }

    fn scaled(allocations: &[CityAllocation]) -> Vec<i64> {
        allocations.iter().map(|a| a.scaled_recommended).collect()
    }

    fn allocation(city: &str, varied: f64, scaled: i64) -> CityAllocation {
        CityAllocation {
            city: city.to_string(),
            raw_recommended: varied,
            varied_recommended: varied,
            scaled_recommended: scaled,
        }
    }

    fn record(city: &str, passengers: u64, buses: u64) -> HistoricalRecord {
        HistoricalRecord {
            month: 3,
            city: city.to_string(),
            day_of_week: "Monday".to_string(),
            passengers,
            buses,
        }
    }

    fn sample_history() -> Vec<HistoricalRecord> {
        let mut rows = Vec::new();
        for month in [3, 4] {
            for (city, base) in [("Cork", 900), ("Dublin", 5200), ("Galway", 610), ("Limerick", 480)] {
                for (i, day) in ["Monday", "Saturday", "Sunday"].iter().enumerate() {
                    rows.push(HistoricalRecord {
                        month,
                        city: city.to_string(),
                        day_of_week: day.to_string(),
                        passengers: base + 37 * i as u64 + u64::from(month),
                        buses: 12 + i as u64,
                    });
                }
            }
        }
        rows
    }
}
