//! Holder-side presentation flows.

pub mod proximity;

pub use proximity::{EstablishedSession, ProximityService};
