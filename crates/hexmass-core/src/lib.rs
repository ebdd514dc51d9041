//! Mass-preserving disaggregation of coarse hexagon predictions onto fine
//! hexagons, plus the exposure-join and spatial statistics recipes that
//! surround it.
//!
//! Pipeline order for a disaggregation run:
//!   1. Schema resolution (`schema`)
//!   2. Unit loading (`units`)
//!   3. Parent-child linkage (`linkage`)
//!   4. Per-parent proportions (`weights`)
//!   5. Allocation and conservation check (`allocate`)
//!
//! `pipeline::run` drives all five.

pub mod allocate;
pub mod config;
pub mod error;
pub mod exposure;
pub mod geometry;
pub mod linkage;
pub mod logging;
pub mod pipeline;
pub mod schema;
pub mod stats;
pub mod table;
pub mod units;
pub mod weights;

pub use config::DisaggConfig;
pub use error::{Error, Result};
pub use pipeline::{run, DisaggOutput, DisaggReport};
pub use table::Table;
