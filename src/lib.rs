//! Charging schedules for electric vehicle stations under different grid
//! tariff designs.
//!
//! Every optimized tariff shares one linear formulation
//! ([`optimizer::ModelBuilder`]) and adds its own variables and cost term
//! through [`optimizer::TariffPolicy`]. The flat capacity tariff is driven
//! timestep by timestep by [`controller::RollingHorizonController`].

pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod optimizer;
pub mod scenario;
pub mod telemetry;

pub use error::{Result, SchedulingError};
