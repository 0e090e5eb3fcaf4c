//! Fleet sizing from monthly ridership history.
//!
//! Historical rows are grouped per city and weekday, turned into a raw bus
//! estimate per city, perturbed by a month-seeded factor and finally scaled
//! to an integer allocation that sums exactly to [`FLEET_TOTAL`].

pub mod allocate;
pub mod history;
pub mod utility;
pub mod variability;

pub use allocate::{CityAllocation, FLEET_TOTAL, FleetAllocationEngine, correct_remainder};
pub use history::{CityMonthRatio, HistoricalRecord, city_month_ratios, load_history};
pub use variability::{SeededVariability, VariabilitySource};
