//! Orientation enumeration, usable-space resolution and grid fitting.
//!
//! Everything here is closed-form: one container and one orientation cost a
//! handful of divisions, there is no search.

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::model::{AxisCaps, MarginSpec};
use crate::types::Dims;

/// Source-axis permutations in enumeration order.
///
/// Entry `[a, b, c]` places product axis `a` along the container length,
/// `b` along the width and `c` along the height (0 = length, 1 = width,
/// 2 = height of the product).
pub const AXIS_PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Which rotations of the product are allowed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrientationPolicy {
    /// All distinct axis-aligned orientations.
    #[default]
    Any,
    /// Product height stays on the container height axis ("this side up").
    Upright,
    /// The product is placed exactly as specified.
    Fixed,
}

impl OrientationPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "any" | "all" => Some(Self::Any),
            "upright" | "this_side_up" => Some(Self::Upright),
            "fixed" | "none" => Some(Self::Fixed),
            _ => None,
        }
    }

    fn allows(&self, permutation: [usize; 3]) -> bool {
        match self {
            OrientationPolicy::Any => true,
            OrientationPolicy::Upright => permutation[2] == 2,
            OrientationPolicy::Fixed => permutation == [0, 1, 2],
        }
    }
}

/// One axis-aligned placement of the product inside a container.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct OrientationVariant {
    /// Position in the enumeration order; lower indices win score ties.
    pub index: usize,
    #[schema(value_type = [usize; 3])]
    pub permutation: [usize; 3],
    /// Product dimensions along the container's length, width and height.
    #[schema(value_type = [f64; 3], example = json!([100.0, 80.0, 60.0]))]
    pub dims: Dims,
}

/// Returns the distinct orientations of a box in enumeration order.
///
/// A permutation that reproduces an earlier triple (because two product
/// dimensions are equal) is skipped, so a cube yields a single orientation.
///
/// # Examples
/// ```
/// use carton_fit::geometry::orientations;
/// use carton_fit::types::Dims;
///
/// assert_eq!(orientations(Dims::new(100.0, 80.0, 60.0)).len(), 6);
/// assert_eq!(orientations(Dims::new(100.0, 80.0, 80.0)).len(), 3);
/// assert_eq!(orientations(Dims::new(50.0, 50.0, 50.0)).len(), 1);
/// ```
pub fn orientations(product: Dims) -> Vec<OrientationVariant> {
    let axes = product.as_array();
    let mut variants: Vec<OrientationVariant> = Vec::with_capacity(AXIS_PERMUTATIONS.len());

    for permutation in AXIS_PERMUTATIONS {
        let dims = Dims::new(
            axes[permutation[0]],
            axes[permutation[1]],
            axes[permutation[2]],
        );
        if variants.iter().any(|existing| existing.dims == dims) {
            continue;
        }
        variants.push(OrientationVariant {
            index: variants.len(),
            permutation,
            dims,
        });
    }

    variants
}

/// Distinct orientations allowed by `policy`, re-indexed in order.
pub fn allowed_orientations(product: Dims, policy: OrientationPolicy) -> Vec<OrientationVariant> {
    orientations(product)
        .into_iter()
        .filter(|variant| policy.allows(variant.permutation))
        .enumerate()
        .map(|(index, variant)| OrientationVariant { index, ..variant })
        .collect()
}

/// Interior space left after margins and both walls.
///
/// Returns `None` when any axis ends up at or below zero; callers must not
/// run grid fitting on such a container.
///
/// # Parameters
/// * `outer` - Outer container dimensions
/// * `margins` - Per-axis margins, subtracted once
/// * `wall_thickness` - Wall thickness, subtracted twice per axis
pub fn usable_space(outer: Dims, margins: &MarginSpec, wall_thickness: f64) -> Option<Dims> {
    let walls = Dims::uniform(2.0 * wall_thickness);
    let usable = outer - margins.as_dims() - walls;
    usable.is_strictly_positive(0.0).then_some(usable)
}

/// Number of whole product lengths along one axis.
///
/// Truncating division with a small tolerance, so an exact fit computed in
/// floating point (e.g. 0.3 / 0.1) is not rounded down to one less.
#[inline]
pub fn axis_count(usable: f64, product: f64, epsilon: f64) -> u32 {
    if usable <= 0.0 || product <= 0.0 {
        return 0;
    }
    let count = ((usable + epsilon) / product).floor();
    if count >= u32::MAX as f64 {
        u32::MAX
    } else {
        count as u32
    }
}

/// Integer grid of one orientation: rows × columns × layers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GridFit {
    /// Units along the container length.
    pub rows: u32,
    /// Units along the container width.
    pub columns: u32,
    /// Units along the container height.
    pub layers: u32,
}

impl GridFit {
    /// Saturates at `u64::MAX` for extreme product/container ratios.
    pub fn unit_count(&self) -> u64 {
        self.units_per_layer().saturating_mul(u64::from(self.layers))
    }

    pub fn is_valid(&self) -> bool {
        self.rows > 0 && self.columns > 0 && self.layers > 0
    }

    pub fn units_per_layer(&self) -> u64 {
        u64::from(self.rows).saturating_mul(u64::from(self.columns))
    }
}

/// Computes the capped grid for one orientation in one usable space.
pub fn grid_fit(usable: Dims, oriented: Dims, caps: &AxisCaps, epsilon: f64) -> GridFit {
    GridFit {
        rows: AxisCaps::clamp(axis_count(usable.length, oriented.length, epsilon), caps.rows),
        columns: AxisCaps::clamp(
            axis_count(usable.width, oriented.width, epsilon),
            caps.columns,
        ),
        layers: AxisCaps::clamp(
            axis_count(usable.height, oriented.height, epsilon),
            caps.layers,
        ),
    }
}

/// Result of evaluating one orientation against one container.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct FitConfiguration {
    pub orientation: OrientationVariant,
    pub grid: GridFit,
}

impl FitConfiguration {
    /// Evaluates an orientation; `None` when any axis count is zero.
    pub fn evaluate(
        usable: Dims,
        orientation: OrientationVariant,
        caps: &AxisCaps,
        epsilon: f64,
    ) -> Option<Self> {
        let grid = grid_fit(usable, orientation.dims, caps, epsilon);
        grid.is_valid().then_some(Self { orientation, grid })
    }

    pub fn unit_count(&self) -> u64 {
        self.grid.unit_count()
    }

    /// Volume occupied by all units together.
    pub fn filled_volume(&self) -> f64 {
        self.unit_count() as f64 * self.orientation.dims.volume()
    }

    /// Bounding box of the packed block of units.
    pub fn block_dims(&self) -> Dims {
        let d = self.orientation.dims;
        Dims::new(
            d.length * f64::from(self.grid.rows),
            d.width * f64::from(self.grid.columns),
            d.height * f64::from(self.grid.layers),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EPSILON_GENERAL;
    use approx::assert_relative_eq;

    #[test]
    fn enumeration_order_is_stable() {
        let variants = orientations(Dims::new(100.0, 80.0, 60.0));
        let dims: Vec<_> = variants.iter().map(|v| v.dims.as_tuple()).collect();
        assert_eq!(
            dims,
            vec![
                (100.0, 80.0, 60.0),
                (100.0, 60.0, 80.0),
                (80.0, 100.0, 60.0),
                (80.0, 60.0, 100.0),
                (60.0, 100.0, 80.0),
                (60.0, 80.0, 100.0),
            ]
        );
        for (idx, variant) in variants.iter().enumerate() {
            assert_eq!(variant.index, idx);
        }
    }

    #[test]
    fn repeated_dimensions_are_deduplicated() {
        let variants = orientations(Dims::new(80.0, 100.0, 80.0));
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].dims, Dims::new(80.0, 100.0, 80.0));
        assert_eq!(variants[1].dims, Dims::new(80.0, 80.0, 100.0));
        assert_eq!(variants[2].dims, Dims::new(100.0, 80.0, 80.0));
    }

    #[test]
    fn policies_filter_orientations() {
        let product = Dims::new(100.0, 80.0, 60.0);
        let upright = allowed_orientations(product, OrientationPolicy::Upright);
        assert_eq!(upright.len(), 2);
        assert!(upright.iter().all(|v| v.dims.height == 60.0));
        assert_eq!(upright[1].index, 1);

        let fixed = allowed_orientations(product, OrientationPolicy::Fixed);
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].dims, product);
    }

    #[test]
    fn policy_parsing() {
        assert_eq!(OrientationPolicy::parse(" Upright "), Some(OrientationPolicy::Upright));
        assert_eq!(OrientationPolicy::parse("ANY"), Some(OrientationPolicy::Any));
        assert_eq!(OrientationPolicy::parse("fixed"), Some(OrientationPolicy::Fixed));
        assert_eq!(OrientationPolicy::parse("sideways"), None);
    }

    #[test]
    fn usable_space_subtracts_margins_and_both_walls() {
        let margins = MarginSpec::new(10.0, 20.0, 0.0).unwrap();
        let usable = usable_space(Dims::new(300.0, 200.0, 150.0), &margins, 3.0).unwrap();
        assert_relative_eq!(usable.length, 284.0);
        assert_relative_eq!(usable.width, 174.0);
        assert_relative_eq!(usable.height, 144.0);
    }

    #[test]
    fn usable_space_rejects_non_positive_axes() {
        let margins = MarginSpec::new(0.0, 0.0, 150.0).unwrap();
        assert!(usable_space(Dims::new(300.0, 200.0, 150.0), &margins, 0.0).is_none());
        assert!(usable_space(Dims::new(300.0, 200.0, 10.0), &MarginSpec::none(), 5.0).is_none());
    }

    #[test]
    fn axis_count_truncates() {
        assert_eq!(axis_count(600.0, 100.0, EPSILON_GENERAL), 6);
        assert_eq!(axis_count(599.0, 100.0, EPSILON_GENERAL), 5);
        assert_eq!(axis_count(99.0, 100.0, EPSILON_GENERAL), 0);
        assert_eq!(axis_count(100.0, 100.0, EPSILON_GENERAL), 1);
        assert_eq!(axis_count(0.3, 0.1, EPSILON_GENERAL), 3);
        assert_eq!(axis_count(-5.0, 1.0, EPSILON_GENERAL), 0);
    }

    #[test]
    fn grid_fit_applies_caps() {
        let usable = Dims::new(600.0, 400.0, 300.0);
        let oriented = Dims::new(100.0, 80.0, 60.0);

        let free = grid_fit(usable, oriented, &AxisCaps::unlimited(), EPSILON_GENERAL);
        assert_eq!(free, GridFit { rows: 6, columns: 5, layers: 5 });
        assert_eq!(free.unit_count(), 150);

        let capped = grid_fit(usable, oriented, &AxisCaps::new(4, 0, 2), EPSILON_GENERAL);
        assert_eq!(capped, GridFit { rows: 4, columns: 5, layers: 2 });
        assert_eq!(capped.unit_count(), 40);
    }

    #[test]
    fn configuration_with_zero_axis_is_invalid() {
        let variant = orientations(Dims::new(310.0, 80.0, 60.0))[0];
        let usable = Dims::new(300.0, 200.0, 150.0);
        assert!(
            FitConfiguration::evaluate(usable, variant, &AxisCaps::unlimited(), EPSILON_GENERAL)
                .is_none()
        );
    }

    #[test]
    fn filled_volume_and_block() {
        let variant = orientations(Dims::new(100.0, 80.0, 60.0))[0];
        let fit = FitConfiguration::evaluate(
            Dims::new(600.0, 400.0, 300.0),
            variant,
            &AxisCaps::unlimited(),
            EPSILON_GENERAL,
        )
        .unwrap();
        assert_relative_eq!(fit.filled_volume(), 150.0 * 480_000.0);
        assert_eq!(fit.block_dims(), Dims::new(600.0, 400.0, 300.0));
        assert_eq!(fit.grid.units_per_layer(), 30);
    }

    #[test]
    fn extreme_ratios_saturate_instead_of_overflowing() {
        let variant = orientations(Dims::new(0.001, 0.001, 0.001))[0];
        let fit = FitConfiguration::evaluate(
            Dims::new(1e4, 1e4, 1e4),
            variant,
            &AxisCaps::unlimited(),
            EPSILON_GENERAL,
        )
        .unwrap();
        assert_eq!(fit.grid.rows, 10_000_000);
        assert_eq!(fit.unit_count(), u64::MAX);
        assert!(fit.filled_volume().is_finite());

        let widest = GridFit {
            rows: u32::MAX,
            columns: u32::MAX,
            layers: u32::MAX,
        };
        assert_eq!(widest.units_per_layer(), u64::from(u32::MAX) * u64::from(u32::MAX));
        assert_eq!(widest.unit_count(), u64::MAX);
    }
}
