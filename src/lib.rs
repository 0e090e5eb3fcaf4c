pub mod aqi;
pub mod config;
pub mod context;
pub mod error;
pub mod features;
pub mod fetch;
pub mod fleet;
pub mod geo_index;
pub mod narrative;
pub mod output;
pub mod predict;
pub mod route;
pub mod server;
