//! Transforms between two frame variants and their application to coordinates.

use crate::coordinate::Coordinate;
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::frames::frame_id;
use crate::FrameIdString;
use log::warn;
use nalgebra::{Matrix3, Vector3};
use std::fmt;
use std::sync::Arc;

/// Tolerance used when a transform kind requires an orthonormal matrix.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-9;

/// Batches at least this large are split across threads with the `parallel` feature.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 1024;

/// Resolves a rotation from the coordinate being transformed (typically its epoch).
pub type MatrixFn = Arc<dyn Fn(&Coordinate) -> FrameGraphResult<Matrix3<f64>> + Send + Sync>;

/// Maps a coordinate in the source frame to a coordinate in the target frame.
pub type CoordinateFn = Arc<dyn Fn(&Coordinate) -> FrameGraphResult<Coordinate> + Send + Sync>;

/// Payload of a transform, one variant per kind.
#[derive(Clone)]
pub enum TransformKind {
    /// Fixed rotation.
    StaticMatrix(Matrix3<f64>),
    /// Rotation computed from the source coordinate at application time.
    DynamicMatrix(MatrixFn),
    /// Rotation followed by a position offset and an optional velocity offset.
    Affine {
        rotation: Matrix3<f64>,
        offset: Vector3<f64>,
        velocity_offset: Option<Vector3<f64>>,
    },
    /// Opaque function, applied as is.
    Function(CoordinateFn),
}

impl TransformKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransformKind::StaticMatrix(_) => "static-matrix",
            TransformKind::DynamicMatrix(_) => "dynamic-matrix",
            TransformKind::Affine { .. } => "affine",
            TransformKind::Function(_) => "function",
        }
    }
}

impl fmt::Debug for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformKind::StaticMatrix(m) => f.debug_tuple("StaticMatrix").field(m).finish(),
            TransformKind::DynamicMatrix(_) => f.write_str("DynamicMatrix(<fn>)"),
            TransformKind::Affine {
                rotation,
                offset,
                velocity_offset,
            } => f
                .debug_struct("Affine")
                .field("rotation", rotation)
                .field("offset", offset)
                .field("velocity_offset", velocity_offset)
                .finish(),
            TransformKind::Function(_) => f.write_str("Function(<fn>)"),
        }
    }
}

/// A directed conversion from `source` to `target`.
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use skyframe::{Coordinate, Transform};
///
/// let swap = Transform::static_matrix(
///     "a",
///     "b",
///     Matrix3::new(0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0),
/// )
/// .unwrap();
/// let out = swap.apply(&Coordinate::new("a", Vector3::x()).unwrap()).unwrap();
/// assert_eq!(out.frame().as_str(), "b");
/// ```
#[derive(Clone, Debug)]
pub struct Transform {
    source: FrameIdString,
    target: FrameIdString,
    kind: TransformKind,
    cost: u32,
}

impl Transform {
    pub const DEFAULT_COST: u32 = 1;

    pub(crate) fn from_parts(
        source: FrameIdString,
        target: FrameIdString,
        kind: TransformKind,
        cost: u32,
    ) -> Self {
        Self {
            source,
            target,
            kind,
            cost,
        }
    }

    pub fn new(source: &str, target: &str, kind: TransformKind) -> FrameGraphResult<Self> {
        Ok(Self::from_parts(
            frame_id(source)?,
            frame_id(target)?,
            kind,
            Self::DEFAULT_COST,
        ))
    }

    pub fn static_matrix(
        source: &str,
        target: &str,
        rotation: Matrix3<f64>,
    ) -> FrameGraphResult<Self> {
        Self::new(source, target, TransformKind::StaticMatrix(rotation))
    }

    /// A rotation resolved from each input coordinate, usually from its epoch.
    ///
    /// Once composed with other matrix edges, every resolver on the route is
    /// handed the coordinate given to the composite, still tagged with the
    /// route's first frame and holding its positions. Only the epoch is
    /// guaranteed to match what the edge would see on its own, so resolvers
    /// should depend on nothing else.
    pub fn dynamic_matrix<F>(source: &str, target: &str, resolve: F) -> FrameGraphResult<Self>
    where
        F: Fn(&Coordinate) -> FrameGraphResult<Matrix3<f64>> + Send + Sync + 'static,
    {
        Self::new(source, target, TransformKind::DynamicMatrix(Arc::new(resolve)))
    }

    pub fn affine(
        source: &str,
        target: &str,
        rotation: Matrix3<f64>,
        offset: Vector3<f64>,
        velocity_offset: Option<Vector3<f64>>,
    ) -> FrameGraphResult<Self> {
        Self::new(
            source,
            target,
            TransformKind::Affine {
                rotation,
                offset,
                velocity_offset,
            },
        )
    }

    pub fn function<F>(source: &str, target: &str, apply: F) -> FrameGraphResult<Self>
    where
        F: Fn(&Coordinate) -> FrameGraphResult<Coordinate> + Send + Sync + 'static,
    {
        Self::new(source, target, TransformKind::Function(Arc::new(apply)))
    }

    /// Path search weight of this edge.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    pub fn source(&self) -> &FrameIdString {
        &self.source
    }

    pub fn target(&self) -> &FrameIdString {
        &self.target
    }

    pub fn kind(&self) -> &TransformKind {
        &self.kind
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    fn malformed(&self, reason: impl Into<String>) -> FrameGraphError {
        FrameGraphError::MalformedTransform {
            from: self.source.to_string(),
            to: self.target.to_string(),
            reason: reason.into(),
        }
    }

    /// Resolves a dynamic matrix and checks that it is a rotation.
    pub(crate) fn resolve_rotation(
        &self,
        resolve: &MatrixFn,
        coordinate: &Coordinate,
    ) -> FrameGraphResult<Matrix3<f64>> {
        let rotation = resolve(coordinate)?;
        if !is_orthonormal(&rotation, ORTHONORMAL_TOLERANCE) {
            return Err(self.malformed("resolved matrix is not orthonormal"));
        }
        Ok(rotation)
    }

    /// Applies this transform, producing a coordinate tagged with the target frame.
    pub fn apply(&self, coordinate: &Coordinate) -> FrameGraphResult<Coordinate> {
        if *coordinate.frame() != self.source {
            return Err(FrameGraphError::FrameMismatch {
                expected: self.source.to_string(),
                actual: coordinate.frame().to_string(),
            });
        }

        match &self.kind {
            TransformKind::StaticMatrix(rotation) => self.rotate(rotation, coordinate),
            TransformKind::DynamicMatrix(resolve) => {
                let rotation = self.resolve_rotation(resolve, coordinate)?;
                self.rotate(&rotation, coordinate)
            }
            TransformKind::Affine {
                rotation,
                offset,
                velocity_offset,
            } => {
                let positions = map_vectors(coordinate.positions(), |p| rotation * p + offset);
                let velocity_offset = velocity_offset.unwrap_or_else(Vector3::zeros);
                let velocities = coordinate
                    .velocities()
                    .map(|v| map_vectors(v, |v| rotation * v + velocity_offset));
                Coordinate::from_parts(self.target, positions, velocities, coordinate.epoch())
            }
            TransformKind::Function(apply) => {
                let output = apply(coordinate)?;
                Ok(output.retagged(self.target))
            }
        }
    }

    fn rotate(
        &self,
        rotation: &Matrix3<f64>,
        coordinate: &Coordinate,
    ) -> FrameGraphResult<Coordinate> {
        let positions = map_vectors(coordinate.positions(), |p| rotation * p);
        let velocities = coordinate
            .velocities()
            .map(|v| map_vectors(v, |v| rotation * v));
        Coordinate::from_parts(self.target, positions, velocities, coordinate.epoch())
    }

    /// Derives the reverse edge.
    ///
    /// Rotations are inverted by transposition. A static or affine rotation that
    /// is not orthonormal still yields an edge, one that fails with
    /// `MalformedTransform` when applied. Function transforms are opaque and
    /// cannot be inverted.
    pub fn inverse(&self) -> FrameGraphResult<Transform> {
        let kind = match &self.kind {
            TransformKind::StaticMatrix(rotation) => {
                if is_orthonormal(rotation, ORTHONORMAL_TOLERANCE) {
                    TransformKind::StaticMatrix(rotation.transpose())
                } else {
                    self.deferred_malformed()
                }
            }
            TransformKind::DynamicMatrix(resolve) => {
                let resolve = Arc::clone(resolve);
                TransformKind::DynamicMatrix(Arc::new(move |c: &Coordinate| {
                    resolve(c).map(|m| m.transpose())
                }))
            }
            TransformKind::Affine {
                rotation,
                offset,
                velocity_offset,
            } => {
                if is_orthonormal(rotation, ORTHONORMAL_TOLERANCE) {
                    let inverse = rotation.transpose();
                    TransformKind::Affine {
                        rotation: inverse,
                        offset: -(inverse * offset),
                        velocity_offset: velocity_offset.map(|v| -(inverse * v)),
                    }
                } else {
                    self.deferred_malformed()
                }
            }
            TransformKind::Function(_) => {
                return Err(FrameGraphError::NotInvertible {
                    from: self.source.to_string(),
                    to: self.target.to_string(),
                })
            }
        };
        Ok(Transform::from_parts(
            self.target,
            self.source,
            kind,
            self.cost,
        ))
    }

    fn deferred_malformed(&self) -> TransformKind {
        warn!(
            "Transform {} -> {} is not orthonormal, its inverse will fail when used",
            self.source, self.target
        );
        let error = FrameGraphError::MalformedTransform {
            from: self.target.to_string(),
            to: self.source.to_string(),
            reason: "inverse of a non-orthonormal matrix".to_string(),
        };
        TransformKind::Function(Arc::new(
            move |_: &Coordinate| -> FrameGraphResult<Coordinate> { Err(error.clone()) },
        ))
    }
}

/// `m · mᵗ ≈ I` with every entry within `tolerance`.
pub fn is_orthonormal(m: &Matrix3<f64>, tolerance: f64) -> bool {
    (m * m.transpose() - Matrix3::identity()).amax() <= tolerance
}

#[cfg(not(feature = "parallel"))]
fn map_vectors<F>(vectors: &[Vector3<f64>], f: F) -> Vec<Vector3<f64>>
where
    F: Fn(&Vector3<f64>) -> Vector3<f64> + Sync + Send,
{
    vectors.iter().map(f).collect()
}

#[cfg(feature = "parallel")]
fn map_vectors<F>(vectors: &[Vector3<f64>], f: F) -> Vec<Vector3<f64>>
where
    F: Fn(&Vector3<f64>) -> Vector3<f64> + Sync + Send,
{
    use rayon::prelude::*;
    if vectors.len() >= PARALLEL_THRESHOLD {
        vectors.par_iter().map(f).collect()
    } else {
        vectors.iter().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::{rotation_matrix, Axis};
    use crate::coordinate::Epoch;
    use crate::test_utils::assert_vector_approx_eq;

    fn quarter_turn() -> Matrix3<f64> {
        rotation_matrix(std::f64::consts::FRAC_PI_2, Axis::Z)
    }

    #[test]
    fn test_static_matrix_rotates_position_and_velocity() {
        let t = Transform::static_matrix("a", "b", quarter_turn()).unwrap();
        let coord = Coordinate::new("a", Vector3::new(1.0, 0.0, 0.0))
            .unwrap()
            .with_velocity(Vector3::new(0.0, 2.0, 0.0))
            .unwrap();
        let out = t.apply(&coord).unwrap();
        assert_eq!(out.frame().as_str(), "b");
        assert_vector_approx_eq(&out.positions()[0], &Vector3::new(0.0, -1.0, 0.0), 1e-12, "position");
        assert_vector_approx_eq(
            &out.velocities().unwrap()[0],
            &Vector3::new(2.0, 0.0, 0.0),
            1e-12,
            "velocity",
        );
    }

    #[test]
    fn test_absent_velocity_stays_absent() {
        let t = Transform::affine(
            "a",
            "b",
            Matrix3::identity(),
            Vector3::new(1.0, 0.0, 0.0),
            Some(Vector3::new(5.0, 0.0, 0.0)),
        )
        .unwrap();
        let out = t.apply(&Coordinate::new("a", Vector3::zeros()).unwrap()).unwrap();
        assert!(out.velocities().is_none());
        assert_vector_approx_eq(&out.positions()[0], &Vector3::new(1.0, 0.0, 0.0), 1e-12, "position");
    }

    #[test]
    fn test_affine_offsets_are_independent() {
        let t = Transform::affine(
            "a",
            "b",
            quarter_turn(),
            Vector3::new(1.0, 0.0, 0.0),
            Some(Vector3::new(0.0, 0.0, 3.0)),
        )
        .unwrap();
        let coord = Coordinate::new("a", Vector3::new(1.0, 0.0, 0.0))
            .unwrap()
            .with_velocity(Vector3::new(1.0, 0.0, 0.0))
            .unwrap();
        let out = t.apply(&coord).unwrap();
        assert_vector_approx_eq(&out.positions()[0], &Vector3::new(1.0, -1.0, 0.0), 1e-12, "position");
        assert_vector_approx_eq(
            &out.velocities().unwrap()[0],
            &Vector3::new(0.0, -1.0, 3.0),
            1e-12,
            "velocity",
        );
    }

    #[test]
    fn test_dynamic_matrix_uses_epoch() {
        let t = Transform::dynamic_matrix("a", "b", |c: &Coordinate| {
            let years = c.epoch().unwrap_or_default().julian_year() - 2000.0;
            Ok(rotation_matrix(years.to_radians(), Axis::Z))
        })
        .unwrap();
        let coord = Coordinate::new("a", Vector3::x())
            .unwrap()
            .with_epoch(Epoch::from_julian_year(2090.0));
        let out = t.apply(&coord).unwrap();
        assert_vector_approx_eq(&out.positions()[0], &Vector3::new(0.0, -1.0, 0.0), 1e-9, "position");
        assert_eq!(out.epoch(), coord.epoch());
    }

    #[test]
    fn test_dynamic_matrix_must_be_orthonormal() {
        let t = Transform::dynamic_matrix("a", "b", |_: &Coordinate| Ok(Matrix3::identity() * 2.0))
            .unwrap();
        let result = t.apply(&Coordinate::new("a", Vector3::x()).unwrap());
        assert!(matches!(result, Err(FrameGraphError::MalformedTransform { .. })));
    }

    #[test]
    fn test_function_output_is_retagged() {
        let t = Transform::function("a", "b", |c: &Coordinate| {
            let doubled = c.positions().iter().map(|p| p * 2.0).collect();
            Coordinate::from_positions("whatever", doubled)
        })
        .unwrap();
        let out = t.apply(&Coordinate::new("a", Vector3::x()).unwrap()).unwrap();
        assert_eq!(out.frame().as_str(), "b");
        assert_vector_approx_eq(&out.positions()[0], &Vector3::new(2.0, 0.0, 0.0), 1e-12, "position");
    }

    #[test]
    fn test_frame_mismatch() {
        let t = Transform::static_matrix("a", "b", Matrix3::identity()).unwrap();
        let result = t.apply(&Coordinate::new("c", Vector3::x()).unwrap());
        assert_eq!(
            result,
            Err(FrameGraphError::FrameMismatch {
                expected: "a".to_string(),
                actual: "c".to_string()
            })
        );
    }

    #[test]
    fn test_affine_inverse_round_trip() {
        let t = Transform::affine(
            "a",
            "b",
            quarter_turn(),
            Vector3::new(1.0, 2.0, 3.0),
            Some(Vector3::new(-1.0, 0.5, 0.0)),
        )
        .unwrap()
        .with_cost(3);
        let inverse = t.inverse().unwrap();
        assert_eq!(inverse.source().as_str(), "b");
        assert_eq!(inverse.target().as_str(), "a");
        assert_eq!(inverse.cost(), 3);

        let coord = Coordinate::new("a", Vector3::new(0.3, -0.2, 0.9))
            .unwrap()
            .with_velocity(Vector3::new(0.01, 0.02, 0.03))
            .unwrap();
        let back = inverse.apply(&t.apply(&coord).unwrap()).unwrap();
        assert!(back.approx_eq(&coord, 1e-12));
    }

    #[test]
    fn test_inverse_of_skewed_matrix_fails_lazily() {
        let skewed = Matrix3::new(1.0, 0.5, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        let t = Transform::static_matrix("a", "b", skewed).unwrap();
        let inverse = t.inverse().unwrap();
        let result = inverse.apply(&Coordinate::new("b", Vector3::x()).unwrap());
        assert!(matches!(result, Err(FrameGraphError::MalformedTransform { .. })));
    }

    #[test]
    fn test_function_not_invertible() {
        let t = Transform::function("a", "b", |c: &Coordinate| Ok(c.clone())).unwrap();
        assert!(matches!(t.inverse(), Err(FrameGraphError::NotInvertible { .. })));
    }

    #[test]
    fn test_kind_names() {
        let t = Transform::static_matrix("a", "b", Matrix3::identity()).unwrap();
        assert_eq!(t.kind().name(), "static-matrix");
        assert!(!t.is_self_loop());
        assert_eq!(t.cost(), Transform::DEFAULT_COST);
    }
}
