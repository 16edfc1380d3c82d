//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Assert two bounding boxes are approximately equal
pub fn assert_bounds_eq(a: [f64; 6], b: [f64; 6]) {
    for (x, y) in a.iter().zip(b.iter()) {
        assert_float_eq(*x, *y, 1e-12);
    }
}
