//! Environmental quality of trash-pickup routes: each stop is resolved to a
//! coordinate and scored for traffic congestion and air quality.

pub mod aggregate;
pub mod book;
pub mod places;

pub use aggregate::{FALLBACK_READING, Reading, RouteQualityAggregator, RouteStop};
pub use book::{RouteBook, ScheduledStop};
pub use places::PlaceDirectory;
