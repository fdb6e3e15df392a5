//! Secondary stacking of filled containers onto a pallet.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::geometry::axis_count;
use crate::model::{ExclusionReason, ValidationError, validate_dimension, validate_non_negative};
use crate::types::Dims;

/// Pallet footprint and height budget.
///
/// # Fields
/// * `length`, `width` - Footprint in mm
/// * `max_height` - Maximum total height including the empty pallet
/// * `base_height` - Height of the empty pallet
/// * `allow_footprint_rotation` - Also try the container turned by 90°
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PalletSpec {
    pub length: f64,
    pub width: f64,
    pub max_height: f64,
    #[serde(default)]
    pub base_height: f64,
    #[serde(default)]
    pub allow_footprint_rotation: bool,
}

impl PalletSpec {
    pub const DEFAULT_LENGTH: f64 = 1200.0;
    pub const DEFAULT_WIDTH: f64 = 800.0;
    pub const DEFAULT_MAX_HEIGHT: f64 = 1200.0;
    pub const DEFAULT_BASE_HEIGHT: f64 = 150.0;

    pub fn new(
        length: f64,
        width: f64,
        max_height: f64,
        base_height: f64,
    ) -> Result<Self, ValidationError> {
        let spec = Self {
            length,
            width,
            max_height,
            base_height,
            allow_footprint_rotation: false,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn with_footprint_rotation(mut self, allow: bool) -> Self {
        self.allow_footprint_rotation = allow;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_dimension(self.length, "Pallet length")?;
        validate_dimension(self.width, "Pallet width")?;
        validate_dimension(self.max_height, "Pallet max height")?;
        validate_non_negative(self.base_height, "Pallet base height")?;
        Ok(())
    }

    /// Height available for containers above the empty pallet.
    pub fn height_budget(&self) -> f64 {
        self.max_height - self.base_height
    }
}

impl Default for PalletSpec {
    fn default() -> Self {
        Self {
            length: Self::DEFAULT_LENGTH,
            width: Self::DEFAULT_WIDTH,
            max_height: Self::DEFAULT_MAX_HEIGHT,
            base_height: Self::DEFAULT_BASE_HEIGHT,
            allow_footprint_rotation: false,
        }
    }
}

/// How many containers (and units) one pallet carries.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PalletPlan {
    /// Containers along the pallet length.
    pub per_row: u32,
    /// Containers along the pallet width.
    pub per_column: u32,
    pub containers_per_layer: u64,
    pub layers: u32,
    pub containers_per_pallet: u64,
    pub units_per_pallet: u64,
    /// Total height including the empty pallet.
    pub load_height: f64,
    /// Containers are placed turned by 90° on the pallet.
    pub footprint_rotated: bool,
}

/// Outcome of the pallet stage for one container.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PalletOutcome {
    Planned { plan: PalletPlan },
    Excluded { reason: ExclusionReason },
}

impl PalletOutcome {
    pub fn plan(&self) -> Option<&PalletPlan> {
        match self {
            PalletOutcome::Planned { plan } => Some(plan),
            PalletOutcome::Excluded { .. } => None,
        }
    }

    pub fn exclusion(&self) -> Option<ExclusionReason> {
        match self {
            PalletOutcome::Planned { .. } => None,
            PalletOutcome::Excluded { reason } => Some(*reason),
        }
    }
}

/// Stacks containers of the given outer size on a pallet.
///
/// Layers come straight from the height budget,
/// floor((max_height − base_height) / container_height), so the load height
/// never exceeds `max_height`. A zero factor anywhere excludes the
/// container instead of reporting an empty plan.
///
/// # Examples
/// ```
/// use carton_fit::pallet::{PalletSpec, plan_pallet};
/// use carton_fit::types::{Dims, EPSILON_GENERAL};
///
/// let pallet = PalletSpec::new(1200.0, 800.0, 1800.0, 150.0).unwrap();
/// let outcome = plan_pallet(Dims::new(300.0, 200.0, 150.0), 1, &pallet, EPSILON_GENERAL);
/// assert_eq!(outcome.plan().unwrap().containers_per_pallet, 176);
/// ```
pub fn plan_pallet(
    container_outer: Dims,
    units_per_container: u64,
    pallet: &PalletSpec,
    epsilon: f64,
) -> PalletOutcome {
    let layers = axis_count(pallet.height_budget(), container_outer.height, epsilon);
    if layers == 0 {
        return PalletOutcome::Excluded {
            reason: ExclusionReason::ExceedsPalletHeightBudget,
        };
    }

    let footprint = |dims: Dims| {
        (
            axis_count(pallet.length, dims.length, epsilon),
            axis_count(pallet.width, dims.width, epsilon),
        )
    };

    let (mut per_row, mut per_column) = footprint(container_outer);
    let mut footprint_rotated = false;
    if pallet.allow_footprint_rotation {
        let (rot_row, rot_column) = footprint(container_outer.turned());
        if u64::from(rot_row).saturating_mul(u64::from(rot_column))
            > u64::from(per_row).saturating_mul(u64::from(per_column))
        {
            per_row = rot_row;
            per_column = rot_column;
            footprint_rotated = true;
        }
    }

    let containers_per_layer = u64::from(per_row).saturating_mul(u64::from(per_column));
    if containers_per_layer == 0 {
        return PalletOutcome::Excluded {
            reason: ExclusionReason::PalletFootprintTooSmall,
        };
    }

    let containers_per_pallet = containers_per_layer.saturating_mul(u64::from(layers));
    PalletOutcome::Planned {
        plan: PalletPlan {
            per_row,
            per_column,
            containers_per_layer,
            layers,
            containers_per_pallet,
            units_per_pallet: containers_per_pallet.saturating_mul(units_per_container),
            load_height: pallet.base_height + f64::from(layers) * container_outer.height,
            footprint_rotated,
        },
    }
}
