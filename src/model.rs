//! Data models for carton selection.
//!
//! This module defines the values one optimization run works on:
//! - `ProductSpec`: the product shape that gets packed
//! - `ContainerRecord`: one candidate carton or pallet from the catalog
//! - `MarginSpec` and `AxisCaps`: the constraints applied per container
//! - `ExclusionReason`: why a container dropped out of the ranking

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{Dimensional, Dims};

/// Validation error for input values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid margin: {0}")]
    InvalidMargin(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Checks that a single dimension is positive and finite.
pub(crate) fn validate_dimension(value: f64, name: &str) -> Result<(), ValidationError> {
    if value <= 0.0 || !value.is_finite() {
        return Err(ValidationError::InvalidDimension(format!(
            "{} must be positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

/// Checks that a margin-like value is zero or positive and finite.
pub(crate) fn validate_non_negative(value: f64, name: &str) -> Result<(), ValidationError> {
    if value < 0.0 || !value.is_finite() {
        return Err(ValidationError::InvalidMargin(format!(
            "{} must be zero or positive, got: {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_dims(dims: Dims, subject: &str) -> Result<(), ValidationError> {
    validate_dimension(dims.length, &format!("{subject} length"))?;
    validate_dimension(dims.width, &format!("{subject} width"))?;
    validate_dimension(dims.height, &format!("{subject} height"))?;
    Ok(())
}

/// The product that is packed into every candidate container.
///
/// # Fields
/// * `reference` - Optional product reference used in reports
/// * `dims` - Length, width and height in mm
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductSpec {
    #[serde(default)]
    pub reference: Option<String>,
    #[schema(value_type = [f64; 3], example = json!([100.0, 80.0, 60.0]))]
    pub dims: Dims,
}

impl ProductSpec {
    /// Creates a validated product.
    ///
    /// # Examples
    /// ```
    /// use carton_fit::model::ProductSpec;
    /// use carton_fit::types::Dims;
    ///
    /// assert!(ProductSpec::new(None, Dims::new(100.0, 80.0, 60.0)).is_ok());
    /// assert!(ProductSpec::new(None, Dims::new(0.0, 80.0, 60.0)).is_err());
    /// ```
    pub fn new(reference: Option<String>, dims: Dims) -> Result<Self, ValidationError> {
        let product = Self { reference, dims };
        product.validate()?;
        Ok(product)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_dims(self.dims, "Product")
    }
}

impl Dimensional for ProductSpec {
    fn dimensions(&self) -> Dims {
        self.dims
    }
}

/// One candidate container from the catalog.
///
/// The engine only reads records; it never changes them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContainerRecord {
    pub id: String,
    #[schema(value_type = [f64; 3], example = json!([600.0, 400.0, 300.0]))]
    pub outer: Dims,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_thickness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
}

impl ContainerRecord {
    /// Creates a validated record without wall thickness or stock.
    pub fn new(id: impl Into<String>, outer: Dims) -> Result<Self, ValidationError> {
        let record = Self {
            id: id.into(),
            outer,
            wall_thickness: None,
            stock: None,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn with_wall_thickness(mut self, thickness: f64) -> Self {
        self.wall_thickness = Some(thickness);
        self
    }

    pub fn with_stock(mut self, stock: u32) -> Self {
        self.stock = Some(stock);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_dims(self.outer, "Container")?;
        if let Some(thickness) = self.wall_thickness {
            validate_non_negative(thickness, "Container wall thickness")?;
        }
        Ok(())
    }
}

impl Dimensional for ContainerRecord {
    fn dimensions(&self) -> Dims {
        self.outer
    }
}

/// Space that must stay free inside a container, per axis.
///
/// A margin is subtracted once per axis; the wall thickness twice
/// (both walls).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MarginSpec {
    #[serde(default)]
    pub length: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    /// Overrides the record's own wall thickness when set.
    #[serde(default)]
    pub wall_thickness: Option<f64>,
}

impl MarginSpec {
    pub fn new(length: f64, width: f64, height: f64) -> Result<Self, ValidationError> {
        let margins = Self {
            length,
            width,
            height,
            wall_thickness: None,
        };
        margins.validate()?;
        Ok(margins)
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_wall_thickness(mut self, thickness: f64) -> Self {
        self.wall_thickness = Some(thickness);
        self
    }

    pub fn as_dims(&self) -> Dims {
        Dims::new(self.length, self.width, self.height)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_non_negative(self.length, "Length margin")?;
        validate_non_negative(self.width, "Width margin")?;
        validate_non_negative(self.height, "Height margin")?;
        if let Some(thickness) = self.wall_thickness {
            validate_non_negative(thickness, "Wall thickness")?;
        }
        Ok(())
    }
}

/// Optional per-axis maximum counts (rows, columns, layers).
///
/// A cap of `0` and an absent cap both mean "unlimited". There is no way to
/// express "exclude this axis"; a container that should not be used belongs
/// out of the catalog instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AxisCaps {
    #[serde(default)]
    pub rows: Option<u32>,
    #[serde(default)]
    pub columns: Option<u32>,
    #[serde(default)]
    pub layers: Option<u32>,
}

impl AxisCaps {
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Builds caps from raw values, turning `0` into "unlimited".
    pub fn new(rows: u32, columns: u32, layers: u32) -> Self {
        Self {
            rows: Self::normalize(Some(rows)),
            columns: Self::normalize(Some(columns)),
            layers: Self::normalize(Some(layers)),
        }
    }

    fn normalize(cap: Option<u32>) -> Option<u32> {
        cap.filter(|value| *value > 0)
    }

    /// Clamps a count to an axis cap; `None` and `Some(0)` leave it untouched.
    #[inline]
    pub fn clamp(count: u32, cap: Option<u32>) -> u32 {
        match Self::normalize(cap) {
            Some(limit) => count.min(limit),
            None => count,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        [self.rows, self.columns, self.layers]
            .into_iter()
            .all(|cap| Self::normalize(cap).is_none())
    }
}

/// Reasons why a container does not appear in the ranked results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    UsableSpaceNonPositive,
    NoFittingOrientation,
    ExceedsPalletHeightBudget,
    PalletFootprintTooSmall,
    EmptySpaceAboveThreshold,
    InsufficientStock,
    UnitCountOutOfRange,
}

impl ExclusionReason {
    pub fn code(&self) -> &'static str {
        match self {
            ExclusionReason::UsableSpaceNonPositive => "usable_space_non_positive",
            ExclusionReason::NoFittingOrientation => "no_fitting_orientation",
            ExclusionReason::ExceedsPalletHeightBudget => "exceeds_pallet_height_budget",
            ExclusionReason::PalletFootprintTooSmall => "pallet_footprint_too_small",
            ExclusionReason::EmptySpaceAboveThreshold => "empty_space_above_threshold",
            ExclusionReason::InsufficientStock => "insufficient_stock",
            ExclusionReason::UnitCountOutOfRange => "unit_count_out_of_range",
        }
    }
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionReason::UsableSpaceNonPositive => write!(f, "usable space ≤ 0"),
            ExclusionReason::NoFittingOrientation => write!(f, "unit count = 0"),
            ExclusionReason::ExceedsPalletHeightBudget => {
                write!(f, "exceeds pallet height budget")
            }
            ExclusionReason::PalletFootprintTooSmall => {
                write!(f, "container footprint does not fit on the pallet")
            }
            ExclusionReason::EmptySpaceAboveThreshold => {
                write!(f, "empty space exceeds the allowed fraction")
            }
            ExclusionReason::InsufficientStock => write!(f, "stock below the required minimum"),
            ExclusionReason::UnitCountOutOfRange => {
                write!(f, "unit count outside the requested range")
            }
        }
    }
}
