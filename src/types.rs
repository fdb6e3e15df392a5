//! Common types and traits for box geometry.
//!
//! Every length in this crate is a millimetre value stored as `f64`.
//! Axis naming follows the catalog convention: length (X), width (Y),
//! height (Z).

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Global numerical tolerance for floating-point comparisons.
///
/// Used for dimension comparisons and floor divisions where an exact fit
/// (e.g. 300 / 100) must not be lost to rounding.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Outer or inner dimensions of a box: length × width × height.
///
/// Serializes as a `[length, width, height]` array.
///
/// # Examples
/// ```
/// use carton_fit::types::Dims;
///
/// let carton = Dims::new(600.0, 400.0, 300.0);
/// let margin = Dims::new(10.0, 10.0, 0.0);
/// assert_eq!(carton - margin, Dims::new(590.0, 390.0, 300.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64, f64)", into = "(f64, f64, f64)")]
pub struct Dims {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl Dims {
    /// Creates new dimensions.
    #[inline]
    pub const fn new(length: f64, width: f64, height: f64) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    /// Creates the zero vector.
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Same value on all three axes.
    #[inline]
    pub const fn uniform(value: f64) -> Self {
        Self::new(value, value, value)
    }

    #[inline]
    pub const fn as_tuple(&self) -> (f64, f64, f64) {
        (self.length, self.width, self.height)
    }

    #[inline]
    pub const fn from_tuple(tuple: (f64, f64, f64)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }

    /// Returns the axes as an array indexed 0 = length, 1 = width, 2 = height.
    #[inline]
    pub const fn as_array(&self) -> [f64; 3] {
        [self.length, self.width, self.height]
    }

    /// Calculates the volume (product of all components).
    #[inline]
    pub fn volume(&self) -> f64 {
        self.length * self.width * self.height
    }

    /// Calculates the footprint area (length × width).
    #[inline]
    pub fn footprint_area(&self) -> f64 {
        self.length * self.width
    }

    /// Checks if all components are positive and finite.
    #[inline]
    pub fn is_valid_dimension(&self) -> bool {
        self.as_array()
            .iter()
            .all(|value| *value > 0.0 && value.is_finite())
    }

    /// Checks if every component is strictly greater than `tolerance`.
    #[inline]
    pub fn is_strictly_positive(&self, tolerance: f64) -> bool {
        self.length > tolerance && self.width > tolerance && self.height > tolerance
    }

    /// Checks if these dimensions fit within `container` (component-wise <=).
    #[inline]
    pub fn fits_within(&self, container: &Self, tolerance: f64) -> bool {
        self.length <= container.length + tolerance
            && self.width <= container.width + tolerance
            && self.height <= container.height + tolerance
    }

    /// Swaps length and width (a 90° turn around the height axis).
    #[inline]
    pub const fn turned(&self) -> Self {
        Self::new(self.width, self.length, self.height)
    }
}

impl Add for Dims {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(
            self.length + rhs.length,
            self.width + rhs.width,
            self.height + rhs.height,
        )
    }
}

impl Sub for Dims {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(
            self.length - rhs.length,
            self.width - rhs.width,
            self.height - rhs.height,
        )
    }
}

impl Mul<f64> for Dims {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.length * scalar, self.width * scalar, self.height * scalar)
    }
}

impl From<(f64, f64, f64)> for Dims {
    #[inline]
    fn from(tuple: (f64, f64, f64)) -> Self {
        Self::from_tuple(tuple)
    }
}

impl From<Dims> for (f64, f64, f64) {
    #[inline]
    fn from(dims: Dims) -> Self {
        dims.as_tuple()
    }
}

impl std::fmt::Display for Dims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.length, self.width, self.height)
    }
}

/// Trait for objects with box dimensions.
pub trait Dimensional {
    /// Returns the dimensions of the object.
    fn dimensions(&self) -> Dims;

    /// Calculates the volume.
    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    /// Calculates the footprint area.
    fn footprint_area(&self) -> f64 {
        self.dimensions().footprint_area()
    }

    /// Checks if this object fits in a space with the given dimensions.
    fn fits_in(&self, space: &Dims, tolerance: f64) -> bool {
        self.dimensions().fits_within(space, tolerance)
    }
}

impl Dimensional for Dims {
    fn dimensions(&self) -> Dims {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dims_operations() {
        let a = Dims::new(1.0, 2.0, 3.0);
        let b = Dims::new(4.0, 5.0, 6.0);

        assert_eq!(a + b, Dims::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Dims::new(3.0, 3.0, 3.0));
        assert_eq!(a * 2.0, Dims::new(2.0, 4.0, 6.0));
    }

    #[test]
    fn test_dims_volume_and_area() {
        let dims = Dims::new(10.0, 20.0, 30.0);
        assert_relative_eq!(dims.volume(), 6000.0);
        assert_relative_eq!(dims.footprint_area(), 200.0);
    }

    #[test]
    fn test_dims_fits_within() {
        let small = Dims::uniform(5.0);
        let large = Dims::uniform(10.0);

        assert!(small.fits_within(&large, EPSILON_GENERAL));
        assert!(!large.fits_within(&small, EPSILON_GENERAL));
    }

    #[test]
    fn test_dims_validity() {
        assert!(Dims::new(1.0, 2.0, 3.0).is_valid_dimension());
        assert!(!Dims::new(0.0, 2.0, 3.0).is_valid_dimension());
        assert!(!Dims::new(1.0, f64::NAN, 3.0).is_valid_dimension());
        assert!(!Dims::new(1.0, 2.0, f64::INFINITY).is_valid_dimension());
    }

    #[test]
    fn test_dims_serializes_as_array() {
        let json = serde_json::to_string(&Dims::new(1.0, 2.5, 3.0)).unwrap();
        assert_eq!(json, "[1.0,2.5,3.0]");
        let parsed: Dims = serde_json::from_str("[4, 5, 6]").unwrap();
        assert_eq!(parsed, Dims::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_turned_swaps_footprint() {
        assert_eq!(
            Dims::new(300.0, 200.0, 150.0).turned(),
            Dims::new(200.0, 300.0, 150.0)
        );
    }
}
