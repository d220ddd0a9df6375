/// Test helpers for comparing floating point results
use nalgebra::{Matrix3, Vector3};

/// Helper macro to create FrameIdString from string literal
#[macro_export]
macro_rules! frame_id {
    ($s:expr) => {
        $crate::FrameIdString::from($s).unwrap()
    };
}

pub fn assert_approx_eq(actual: f64, expected: f64, epsilon: f64, message: &str) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= epsilon,
        "{message}: expected {expected}, got {actual}, difference {diff} exceeds {epsilon}"
    );
}

pub fn assert_vector_approx_eq(
    actual: &Vector3<f64>,
    expected: &Vector3<f64>,
    epsilon: f64,
    message: &str,
) {
    for i in 0..3 {
        assert_approx_eq(actual[i], expected[i], epsilon, &format!("{message}[{i}]"));
    }
}

pub fn assert_matrix_approx_eq(
    actual: &Matrix3<f64>,
    expected: &Matrix3<f64>,
    epsilon: f64,
    message: &str,
) {
    for i in 0..3 {
        for j in 0..3 {
            assert_approx_eq(
                actual[(i, j)],
                expected[(i, j)],
                epsilon,
                &format!("{message}[{i}][{j}]"),
            );
        }
    }
}
