//! A directed graph of coordinate frames and the transforms between them.
//!
//! Transforms are registered once as edges; any two connected frames can then
//! be converted between, the graph finding the cheapest route, folding its
//! edges into one transform and applying it to the whole batch at once.
//!
//! ```
//! use skyframe::astro::{register_builtin, Icrs, Sagittarius};
//! use skyframe::{Coordinate, SphericalPosition, TransformGraph};
//!
//! let graph = TransformGraph::new();
//! register_builtin(&graph).unwrap();
//!
//! let star = Coordinate::from_spherical(
//!     "icrs",
//!     &SphericalPosition::from_degrees(280.161732, 11.91934),
//! )
//! .unwrap();
//! let sgr = graph.transform_to_frame::<Sagittarius>(&star).unwrap();
//! let position = sgr.to_spherical()[0];
//! assert!((position.lon_degrees() - 346.8183).abs() < 1e-3);
//! assert!((position.lat_degrees() + 39.2836).abs() < 1e-3);
//!
//! let back = graph.transform_to_frame::<Icrs>(&sgr).unwrap();
//! assert!(back.approx_eq(&star, 1e-12));
//! ```

pub mod astro;
pub mod compose;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod frames;
pub mod graph;
mod path_cache;
pub mod representation;
pub mod transform;

#[cfg(test)]
mod test_utils;

use arrayvec::ArrayString;

/// Fixed-capacity identity of a frame variant.
pub type FrameIdString = ArrayString<64>;

pub use compose::compose;
pub use config::{read_configuration, GraphConfig, PayloadConfig, TransformConfig};
pub use coordinate::{Coordinate, Epoch};
pub use error::{FrameGraphError, FrameGraphResult};
pub use frames::{frame_id, frame_variant_id, FrameDescriptor, SkyFrame};
pub use graph::TransformGraph;
pub use representation::{Differential, NamedComponents, Representation, SphericalPosition};
pub use transform::{Transform, TransformKind};
