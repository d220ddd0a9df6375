//! RON description of frames and transforms.
//!
//! ```ron
//! (
//!     frames: [
//!         (id: "sagittarius", representation: Spherical, differential: SphericalCosLat,
//!          axis_names: {"lon": "Lambda", "lat": "Beta"}),
//!     ],
//!     transforms: [
//!         (from: "galactic", to: "sagittarius", inverse: true,
//!          payload: Euler(axes: "zxz", angles: (183.75, 76.54, 194.111534), flip_z: true)),
//!     ],
//! )
//! ```
//!
//! Only matrix and affine transforms can be described here; dynamic and
//! function transforms are registered from code.

use crate::astro::{rotation_matrix, Axis};
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::frames::FrameDescriptor;
use crate::graph::TransformGraph;
use crate::transform::{Transform, TransformKind};
use nalgebra::{Matrix3, Vector3};
use ron::extensions::Extensions;
use ron::Options;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;

/// Rotation (and offsets) carried by a configured transform.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum PayloadConfig {
    /// Row-major 3×3 rotation.
    Matrix([[f64; 3]; 3]),
    /// Successive passive rotations about `axes` (e.g. `"zxz"`) by `angles` in
    /// degrees, the first listed applied first.
    Euler {
        axes: String,
        angles: [f64; 3],
        #[serde(default)]
        flip_z: bool,
    },
    /// Row-major rotation, position offset and optional velocity offset.
    Affine {
        matrix: [[f64; 3]; 3],
        offset: [f64; 3],
        #[serde(default)]
        velocity_offset: Option<[f64; 3]>,
    },
}

fn parse_axis(axis: char) -> FrameGraphResult<Axis> {
    match axis.to_ascii_lowercase() {
        'x' => Ok(Axis::X),
        'y' => Ok(Axis::Y),
        'z' => Ok(Axis::Z),
        other => Err(FrameGraphError::Config(format!(
            "Unknown rotation axis '{other}'"
        ))),
    }
}

fn matrix_from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| rows[i][j])
}

impl PayloadConfig {
    pub fn kind(&self) -> FrameGraphResult<TransformKind> {
        match self {
            PayloadConfig::Matrix(rows) => Ok(TransformKind::StaticMatrix(matrix_from_rows(rows))),
            PayloadConfig::Euler {
                axes,
                angles,
                flip_z,
            } => {
                let axes = axes.chars().map(parse_axis).collect::<FrameGraphResult<Vec<_>>>()?;
                if axes.len() != angles.len() {
                    return Err(FrameGraphError::Config(format!(
                        "Euler rotation needs {} axes, got {}",
                        angles.len(),
                        axes.len()
                    )));
                }
                let rotation = axes
                    .iter()
                    .zip(angles)
                    .fold(Matrix3::identity(), |acc, (axis, angle)| {
                        rotation_matrix(angle.to_radians(), *axis) * acc
                    });
                if *flip_z {
                    let flip = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
                    return Ok(TransformKind::StaticMatrix(flip * rotation));
                }
                Ok(TransformKind::StaticMatrix(rotation))
            }
            PayloadConfig::Affine {
                matrix,
                offset,
                velocity_offset,
            } => Ok(TransformKind::Affine {
                rotation: matrix_from_rows(matrix),
                offset: Vector3::from(*offset),
                velocity_offset: velocity_offset.map(Vector3::from),
            }),
        }
    }
}

/// One directed transform.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransformConfig {
    pub from: String,
    pub to: String,
    pub payload: PayloadConfig,
    #[serde(default)]
    pub cost: Option<u32>,
    /// Also register the derived inverse.
    #[serde(default)]
    pub inverse: bool,
}

impl TransformConfig {
    pub fn to_transform(&self) -> FrameGraphResult<Transform> {
        let transform = Transform::new(&self.from, &self.to, self.payload.kind()?)?;
        Ok(match self.cost {
            Some(cost) => transform.with_cost(cost),
            None => transform,
        })
    }
}

/// Frames and transforms to load into a [`TransformGraph`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct GraphConfig {
    #[serde(default)]
    pub frames: Vec<FrameDescriptor>,
    #[serde(default)]
    pub transforms: Vec<TransformConfig>,
}

impl GraphConfig {
    fn get_options() -> Options {
        Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .with_default_extension(Extensions::UNWRAP_NEWTYPES)
            .with_default_extension(Extensions::UNWRAP_VARIANT_NEWTYPES)
    }

    pub fn serialize_ron(&self) -> FrameGraphResult<String> {
        let ron = Self::get_options();
        let pretty = ron::ser::PrettyConfig::default();
        ron.to_string_pretty(&self, pretty)
            .map_err(|e| FrameGraphError::Config(format!("Failed to serialize configuration: {e}")))
    }

    pub fn deserialize_ron(ron: &str) -> FrameGraphResult<Self> {
        Self::get_options()
            .from_str(ron)
            .map_err(|e| FrameGraphError::Config(format!("Syntax error in configuration: {e}")))
    }

    /// Registers every frame, then every transform, on `graph`.
    pub fn apply(&self, graph: &TransformGraph) -> FrameGraphResult<()> {
        for frame in &self.frames {
            graph.register_frame(frame.clone())?;
        }
        for entry in &self.transforms {
            let transform = entry.to_transform()?;
            if entry.inverse {
                graph.register_with_inverse(transform)?;
            } else {
                graph.register_transform(transform);
            }
        }
        Ok(())
    }

    /// A new graph holding exactly this configuration.
    pub fn build(&self) -> FrameGraphResult<TransformGraph> {
        let graph = TransformGraph::new();
        self.apply(&graph)?;
        Ok(graph)
    }
}

pub fn read_configuration(config_filename: impl AsRef<Path>) -> FrameGraphResult<GraphConfig> {
    let config_filename = config_filename.as_ref();
    let config_content = read_to_string(config_filename).map_err(|e| {
        FrameGraphError::Config(format!(
            "Failed to read configuration file {}: {e}",
            config_filename.display()
        ))
    })?;
    GraphConfig::deserialize_ron(&config_content)
}
