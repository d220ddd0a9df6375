//! Folding a path of edges into one effective transform.
//!
//! Matrix and affine edges are pre-multiplied. Dynamic matrices stay dynamic and
//! are resolved together from the coordinate handed to the composite; matrix
//! transforms never change a coordinate's epoch, so every constituent sees the
//! same instant. Anything that cannot be expressed algebraically (a function, or
//! a dynamic matrix mixed with an affine offset) becomes a function that applies
//! the constituents in sequence.

use crate::coordinate::Coordinate;
use crate::error::FrameGraphResult;
use crate::transform::{MatrixFn, Transform, TransformKind};
use nalgebra::{Matrix3, Vector3};
use std::sync::Arc;

/// Composes `path` left to right. An empty path is the identity and yields `None`;
/// a single edge is returned as is.
pub fn compose(path: &[Arc<Transform>]) -> Option<Arc<Transform>> {
    let (first, rest) = path.split_first()?;
    debug_assert!(
        path.windows(2).all(|w| w[0].target() == w[1].source()),
        "path edges must chain"
    );
    Some(rest.iter().fold(Arc::clone(first), |acc, next| {
        Arc::new(then(&acc, next))
    }))
}

/// The rotation of a matrix edge as a resolver; dynamic matrices are validated
/// as they are resolved.
fn matrix_resolver(edge: &Arc<Transform>) -> Option<MatrixFn> {
    match edge.kind() {
        TransformKind::StaticMatrix(rotation) => {
            let rotation = *rotation;
            Some(Arc::new(
                move |_: &Coordinate| -> FrameGraphResult<Matrix3<f64>> { Ok(rotation) },
            ))
        }
        TransformKind::DynamicMatrix(resolve) => {
            let edge = Arc::clone(edge);
            let resolve = Arc::clone(resolve);
            Some(Arc::new(move |c: &Coordinate| edge.resolve_rotation(&resolve, c)))
        }
        _ => None,
    }
}

fn shift_velocity(
    rotation: &Matrix3<f64>,
    earlier: Option<Vector3<f64>>,
    later: Option<Vector3<f64>>,
) -> Option<Vector3<f64>> {
    match (earlier, later) {
        (None, None) => None,
        (earlier, later) => Some(
            rotation * earlier.unwrap_or_else(Vector3::zeros) + later.unwrap_or_else(Vector3::zeros),
        ),
    }
}

/// `first` followed by `second`.
fn then(first: &Arc<Transform>, second: &Arc<Transform>) -> Transform {
    use TransformKind::*;

    let kind = match (first.kind(), second.kind()) {
        (StaticMatrix(a), StaticMatrix(b)) => StaticMatrix(b * a),
        (
            StaticMatrix(a),
            Affine {
                rotation,
                offset,
                velocity_offset,
            },
        ) => Affine {
            rotation: rotation * a,
            offset: *offset,
            velocity_offset: *velocity_offset,
        },
        (
            Affine {
                rotation,
                offset,
                velocity_offset,
            },
            StaticMatrix(b),
        ) => Affine {
            rotation: b * rotation,
            offset: b * offset,
            velocity_offset: velocity_offset.map(|v| b * v),
        },
        (
            Affine {
                rotation: ra,
                offset: oa,
                velocity_offset: va,
            },
            Affine {
                rotation: rb,
                offset: ob,
                velocity_offset: vb,
            },
        ) => Affine {
            rotation: rb * ra,
            offset: rb * oa + ob,
            velocity_offset: shift_velocity(rb, *va, *vb),
        },
        _ => match (matrix_resolver(first), matrix_resolver(second)) {
            (Some(resolve_first), Some(resolve_second)) => DynamicMatrix(Arc::new(
                move |c: &Coordinate| -> FrameGraphResult<Matrix3<f64>> {
                    Ok(resolve_second(c)? * resolve_first(c)?)
                },
            )),
            _ => sequential(first, second),
        },
    };

    Transform::from_parts(
        *first.source(),
        *second.target(),
        kind,
        first.cost().saturating_add(second.cost()),
    )
}

fn sequential(first: &Arc<Transform>, second: &Arc<Transform>) -> TransformKind {
    let first = Arc::clone(first);
    let second = Arc::clone(second);
    TransformKind::Function(Arc::new(
        move |c: &Coordinate| -> FrameGraphResult<Coordinate> {
            let intermediate = first.apply(c)?;
            second.apply(&intermediate)
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astro::{rotation_matrix, Axis};
    use crate::coordinate::Epoch;
    use crate::error::FrameGraphError;
    use crate::test_utils::{assert_matrix_approx_eq, assert_vector_approx_eq};

    fn edge(t: FrameGraphResult<Transform>) -> Arc<Transform> {
        Arc::new(t.unwrap())
    }

    fn apply_sequentially(path: &[Arc<Transform>], coord: &Coordinate) -> Coordinate {
        path.iter()
            .fold(coord.clone(), |c, t| t.apply(&c).unwrap())
    }

    fn sample(frame: &str) -> Coordinate {
        Coordinate::from_positions(
            frame,
            vec![Vector3::new(0.3, -1.2, 0.7), Vector3::new(-2.0, 0.1, 0.4)],
        )
        .unwrap()
        .with_velocities(vec![Vector3::new(0.01, 0.0, -0.02), Vector3::new(0.5, 0.5, 0.5)])
        .unwrap()
        .with_epoch(Epoch::from_julian_year(2031.5))
    }

    #[test]
    fn test_empty_and_single() {
        assert!(compose(&[]).is_none());
        let e = edge(Transform::static_matrix("a", "b", Matrix3::identity()));
        let composed = compose(&[Arc::clone(&e)]).unwrap();
        assert!(Arc::ptr_eq(&composed, &e));
    }

    #[test]
    fn test_matrix_product_order() {
        let rz = rotation_matrix(0.4, Axis::Z);
        let rx = rotation_matrix(-1.1, Axis::X);
        let path = [
            edge(Transform::static_matrix("a", "b", rz)),
            edge(Transform::static_matrix("b", "c", rx)),
        ];
        let composed = compose(&path).unwrap();
        assert_eq!(composed.source().as_str(), "a");
        assert_eq!(composed.target().as_str(), "c");
        assert_eq!(composed.cost(), 2);
        match composed.kind() {
            TransformKind::StaticMatrix(m) => {
                assert_matrix_approx_eq(m, &(rx * rz), 1e-12, "product");
            }
            other => panic!("expected a static matrix, got {}", other.name()),
        }
    }

    #[test]
    fn test_affine_chain_offsets() {
        let rz = rotation_matrix(std::f64::consts::FRAC_PI_2, Axis::Z);
        let path = [
            edge(Transform::affine(
                "a",
                "b",
                Matrix3::identity(),
                Vector3::new(1.0, 0.0, 0.0),
                None,
            )),
            edge(Transform::affine(
                "b",
                "c",
                rz,
                Vector3::new(0.0, 0.0, 2.0),
                Some(Vector3::new(0.0, 1.0, 0.0)),
            )),
        ];
        let composed = compose(&path).unwrap();
        match composed.kind() {
            TransformKind::Affine {
                rotation,
                offset,
                velocity_offset,
            } => {
                assert_matrix_approx_eq(rotation, &rz, 1e-12, "rotation");
                assert_vector_approx_eq(offset, &Vector3::new(0.0, -1.0, 2.0), 1e-12, "offset");
                assert_vector_approx_eq(
                    &velocity_offset.unwrap(),
                    &Vector3::new(0.0, 1.0, 0.0),
                    1e-12,
                    "velocity_offset",
                );
            }
            other => panic!("expected an affine transform, got {}", other.name()),
        }
    }

    #[test]
    fn test_velocity_offset_absent_when_no_edge_has_one() {
        let path = [
            edge(Transform::affine("a", "b", Matrix3::identity(), Vector3::x(), None)),
            edge(Transform::static_matrix("b", "c", rotation_matrix(0.3, Axis::Y))),
        ];
        match compose(&path).unwrap().kind() {
            TransformKind::Affine {
                velocity_offset, ..
            } => assert!(velocity_offset.is_none()),
            other => panic!("expected an affine transform, got {}", other.name()),
        }
    }

    #[test]
    fn test_composition_matches_sequential_application() {
        let path = [
            edge(Transform::static_matrix("a", "b", rotation_matrix(0.7, Axis::Z))),
            edge(Transform::dynamic_matrix("b", "c", |c: &Coordinate| {
                let t = c.epoch().unwrap_or_default().julian_centuries_since_j2000();
                Ok(rotation_matrix(t, Axis::X))
            })),
            edge(Transform::affine(
                "c",
                "d",
                rotation_matrix(-0.2, Axis::Y),
                Vector3::new(8.0, 0.0, 0.02),
                Some(Vector3::new(11.1, 232.2, 7.3)),
            )),
            edge(Transform::function("d", "e", |c: &Coordinate| {
                let scaled = c.positions().iter().map(|p| p * 0.5).collect();
                let coord = Coordinate::from_positions("e", scaled)?;
                match c.velocities() {
                    Some(v) => coord.with_velocities(v.to_vec()),
                    None => Ok(coord),
                }
            })),
            edge(Transform::static_matrix("e", "f", rotation_matrix(1.3, Axis::Z))),
        ];
        let coord = sample("a");
        let composed = compose(&path).unwrap();
        assert_eq!(composed.kind().name(), "function");

        let expected = apply_sequentially(&path, &coord);
        let actual = composed.apply(&coord).unwrap();
        assert!(actual.approx_eq(&expected, 1e-9));

        // Grouping does not matter either.
        let left = compose(&path[..2]).unwrap();
        let right = compose(&path[2..]).unwrap();
        let regrouped = compose(&[left, right]).unwrap();
        assert!(regrouped.apply(&coord).unwrap().approx_eq(&expected, 1e-9));
    }

    #[test]
    fn test_dynamic_chain_stays_dynamic() {
        let path = [
            edge(Transform::dynamic_matrix("a", "b", |c: &Coordinate| {
                Ok(rotation_matrix(c.epoch().unwrap_or_default().julian_year() * 1e-3, Axis::Z))
            })),
            edge(Transform::static_matrix("b", "c", rotation_matrix(0.5, Axis::X))),
        ];
        let composed = compose(&path).unwrap();
        assert_eq!(composed.kind().name(), "dynamic-matrix");
        let coord = sample("a");
        assert!(composed
            .apply(&coord)
            .unwrap()
            .approx_eq(&apply_sequentially(&path, &coord), 1e-12));
    }

    #[test]
    fn test_composed_resolvers_see_the_route_input() {
        // Each resolver fails unless it sees the first frame and the input epoch.
        let expects_input = |c: &Coordinate| -> FrameGraphResult<Matrix3<f64>> {
            let epoch = c.epoch().unwrap_or_default().julian_year();
            if c.frame().as_str() == "a" && (epoch - 2031.5).abs() < 1e-9 {
                Ok(rotation_matrix(epoch * 1e-3, Axis::Y))
            } else {
                Err(FrameGraphError::FrameNotFound(c.frame().to_string()))
            }
        };
        let path = [
            edge(Transform::dynamic_matrix("a", "b", expects_input)),
            edge(Transform::dynamic_matrix("b", "c", expects_input)),
        ];
        let composed = compose(&path).unwrap();
        let out = composed.apply(&sample("a")).unwrap();
        assert_eq!(out.frame().as_str(), "c");
        assert_eq!(out.epoch(), sample("a").epoch());

        // Applied edge by edge, the second resolver sees frame b instead.
        assert!(path[0].apply(&sample("a")).and_then(|c| path[1].apply(&c)).is_err());
    }

    #[test]
    fn test_malformed_constituent_is_reported() {
        let path = [
            edge(Transform::dynamic_matrix("a", "b", |_: &Coordinate| {
                Ok(Matrix3::identity() * 3.0)
            })),
            edge(Transform::dynamic_matrix("b", "c", |_: &Coordinate| {
                Ok(Matrix3::identity() / 3.0)
            })),
        ];
        let composed = compose(&path).unwrap();
        let result = composed.apply(&sample("a"));
        assert!(matches!(
            result,
            Err(FrameGraphError::MalformedTransform { from, .. }) if from == "a"
        ));
    }
}
