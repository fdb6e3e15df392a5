//! Property-based tests for orientation enumeration and grid fitting.
//!
//! Run with: cargo test --test proptest_properties

use carton_fit::geometry::{axis_count, grid_fit, orientations, usable_space};
use carton_fit::model::{AxisCaps, MarginSpec};
use carton_fit::types::{Dims, EPSILON_GENERAL};
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

/// Dimensions drawn from a small set so that equal axes occur often.
fn arb_product() -> impl Strategy<Value = Dims> {
    prop::array::uniform3(1u32..6).prop_map(|[l, w, h]| {
        Dims::new(f64::from(l) * 10.0, f64::from(w) * 10.0, f64::from(h) * 10.0)
    })
}

fn arb_dims(min: f64, max: f64) -> impl Strategy<Value = Dims> {
    prop::array::uniform3(min..max).prop_map(|[l, w, h]| Dims::new(l, w, h))
}

fn arb_margins() -> impl Strategy<Value = MarginSpec> {
    (0.0..50.0f64, 0.0..50.0f64, 0.0..50.0f64, 0.0..10.0f64).prop_map(|(l, w, h, wall)| {
        MarginSpec {
            length: l,
            width: w,
            height: h,
            wall_thickness: Some(wall),
        }
    })
}

fn sorted(dims: Dims) -> [f64; 3] {
    let mut axes = dims.as_array();
    axes.sort_by(|a, b| a.total_cmp(b));
    axes
}

// =============================================================================
// Orientation enumeration
// =============================================================================

proptest! {
    #[test]
    fn orientations_are_distinct_permutations(product in arb_product()) {
        let variants = orientations(product);
        prop_assert!((1..=6).contains(&variants.len()));

        for (idx, variant) in variants.iter().enumerate() {
            prop_assert_eq!(variant.index, idx);
            prop_assert_eq!(sorted(variant.dims), sorted(product));
            for other in &variants[idx + 1..] {
                prop_assert_ne!(variant.dims, other.dims);
            }
        }

        let repeated = product.length == product.width
            || product.width == product.height
            || product.length == product.height;
        prop_assert_eq!(variants.len() < 6, repeated);
    }

    #[test]
    fn first_orientation_is_the_product_as_given(product in arb_product()) {
        prop_assert_eq!(orientations(product)[0].dims, product);
    }
}

// =============================================================================
// Grid fitting
// =============================================================================

proptest! {
    #[test]
    fn axis_count_is_a_floor(usable in 1.0..2000.0f64, product in 1.0..2000.0f64) {
        let count = f64::from(axis_count(usable, product, EPSILON_GENERAL));
        let slack = EPSILON_GENERAL + usable * 1e-12;
        prop_assert!(count * product <= usable + slack);
        prop_assert!(usable < (count + 1.0) * product);
    }

    #[test]
    fn unit_count_is_the_product_of_axis_counts(
        usable in arb_dims(1.0, 2000.0),
        product in arb_dims(1.0, 500.0),
    ) {
        let grid = grid_fit(usable, product, &AxisCaps::unlimited(), EPSILON_GENERAL);
        prop_assert_eq!(grid.rows, axis_count(usable.length, product.length, EPSILON_GENERAL));
        prop_assert_eq!(grid.columns, axis_count(usable.width, product.width, EPSILON_GENERAL));
        prop_assert_eq!(grid.layers, axis_count(usable.height, product.height, EPSILON_GENERAL));
        prop_assert_eq!(
            grid.unit_count(),
            u64::from(grid.rows) * u64::from(grid.columns) * u64::from(grid.layers)
        );
    }

    #[test]
    fn caps_never_raise_counts(
        usable in arb_dims(1.0, 2000.0),
        product in arb_dims(1.0, 500.0),
        caps in prop::array::uniform3(0u32..10),
    ) {
        let free = grid_fit(usable, product, &AxisCaps::unlimited(), EPSILON_GENERAL);
        let capped = grid_fit(
            usable,
            product,
            &AxisCaps::new(caps[0], caps[1], caps[2]),
            EPSILON_GENERAL,
        );
        prop_assert!(capped.unit_count() <= free.unit_count());
        // A cap of 0 means unlimited.
        if caps[0] == 0 {
            prop_assert_eq!(capped.rows, free.rows);
        }
    }

    #[test]
    fn larger_margins_never_increase_unit_count(
        outer in arb_dims(100.0, 1500.0),
        product in arb_dims(10.0, 300.0),
        margins in arb_margins(),
        extra in arb_margins(),
    ) {
        let bigger = MarginSpec {
            length: margins.length + extra.length,
            width: margins.width + extra.width,
            height: margins.height + extra.height,
            wall_thickness: margins.wall_thickness,
        };
        let caps = AxisCaps::unlimited();
        let count = |m: &MarginSpec| {
            let wall = m.wall_thickness.unwrap_or(0.0);
            usable_space(outer, m, wall)
                .map(|usable| grid_fit(usable, product, &caps, EPSILON_GENERAL).unit_count())
                .unwrap_or(0)
        };
        prop_assert!(count(&bigger) <= count(&margins));
    }
}
