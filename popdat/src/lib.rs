//! Synthesizes a population from traveler diaries and the parcel/census data in the store, turns it
//! into simulator inputs, and reads the simulator's results back.

#[macro_use]
extern crate log;

pub use crate::events::{person_route, route_geojson, OutputRegistry};
pub use crate::households::{assign_households, AssignmentSummary};
pub use crate::inputs::{build_inputs, InputSummary};
pub use crate::sampling::{rng, SamplingError};
pub use crate::summary::DemandMatrix;
pub use crate::trips::{build_trips, DiarySummary};

pub mod events;
pub mod households;
pub mod inputs;
mod sampling;
pub mod summary;
pub mod trips;
