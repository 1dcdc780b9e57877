//! Battery health estimation for school device fleets.
//!
//! [`drain`] turns timestamped battery readings into per-device daily drain
//! estimates and per-school rollups. [`source`] is the fetch boundary and
//! [`analysis`] ties the two together for callers that want load state.

pub mod analysis;
pub mod drain;
pub mod models;
pub mod report;
pub mod source;
