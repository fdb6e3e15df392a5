//! Flat result rows, CSV export and unit layouts for diagrams.

use std::fmt::Write as _;
use std::io;

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::geometry::FitConfiguration;
use crate::model::ProductSpec;
use crate::optimizer::{Exclusion, OptimizationOutcome, RunStatus, ScoredResult};
use crate::pallet::PalletOutcome;
use crate::types::Dims;

/// Column order of the CSV export.
pub const CSV_HEADER: [&str; 23] = [
    "rank",
    "container_id",
    "outer_length",
    "outer_width",
    "outer_height",
    "usable_length",
    "usable_width",
    "usable_height",
    "orientation_length",
    "orientation_width",
    "orientation_height",
    "rows",
    "columns",
    "layers",
    "unit_count",
    "score",
    "efficiency_percent",
    "empty_space_percent",
    "pallet_status",
    "containers_per_layer",
    "pallet_layers",
    "containers_per_pallet",
    "units_per_pallet",
];

/// One ranked container, flattened for tables and exports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResultRow {
    pub rank: usize,
    pub container_id: String,
    #[schema(value_type = [f64; 3], example = json!([600.0, 400.0, 300.0]))]
    pub outer: Dims,
    #[schema(value_type = [f64; 3], example = json!([594.0, 394.0, 294.0]))]
    pub usable: Dims,
    /// Product dimensions along the container axes.
    #[schema(value_type = [f64; 3], example = json!([100.0, 80.0, 60.0]))]
    pub orientation: Dims,
    pub rows: u32,
    pub columns: u32,
    pub layers: u32,
    pub unit_count: u64,
    pub score: f64,
    /// Filled volume / outer volume, in percent with 2 decimals.
    pub efficiency_percent: f64,
    pub empty_space_percent: f64,
    /// `planned`, `excluded` or absent when no pallet was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pallet_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers_per_layer: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pallet_layers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers_per_pallet: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units_per_pallet: Option<u64>,
}

impl ResultRow {
    pub fn from_result(result: &ScoredResult) -> Self {
        let efficiency = round2(result.efficiency_percent());
        let plan = result.pallet.as_ref().and_then(PalletOutcome::plan);

        Self {
            rank: result.rank,
            container_id: result.container.id.clone(),
            outer: result.container.outer,
            usable: result.usable,
            orientation: result.best.orientation.dims,
            rows: result.best.grid.rows,
            columns: result.best.grid.columns,
            layers: result.best.grid.layers,
            unit_count: result.unit_count(),
            score: result.score,
            efficiency_percent: efficiency,
            empty_space_percent: round2(100.0 - efficiency),
            pallet_status: result.pallet.as_ref().map(|outcome| match outcome {
                PalletOutcome::Planned { .. } => "planned".to_string(),
                PalletOutcome::Excluded { reason } => format!("excluded: {}", reason.code()),
            }),
            containers_per_layer: plan.map(|p| p.containers_per_layer),
            pallet_layers: plan.map(|p| p.layers),
            containers_per_pallet: plan.map(|p| p.containers_per_pallet),
            units_per_pallet: plan.map(|p| p.units_per_pallet),
        }
    }

    fn write_csv_line(&self, out: &mut String) {
        let optional = |value: Option<String>| value.unwrap_or_default();
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{:.2},{:.2},{},{},{},{},{}",
            self.rank,
            escape_csv(&self.container_id),
            self.outer.length,
            self.outer.width,
            self.outer.height,
            self.usable.length,
            self.usable.width,
            self.usable.height,
            self.orientation.length,
            self.orientation.width,
            self.orientation.height,
            self.rows,
            self.columns,
            self.layers,
            self.unit_count,
            self.score,
            self.efficiency_percent,
            self.empty_space_percent,
            escape_csv(self.pallet_status.as_deref().unwrap_or("")),
            optional(self.containers_per_layer.map(|v| v.to_string())),
            optional(self.pallet_layers.map(|v| v.to_string())),
            optional(self.containers_per_pallet.map(|v| v.to_string())),
            optional(self.units_per_pallet.map(|v| v.to_string())),
        );
    }
}

/// All rows of one run plus the exclusions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResultTable {
    #[serde(default)]
    pub product_reference: Option<String>,
    pub scoring: String,
    pub status: RunStatus,
    pub rows: Vec<ResultRow>,
    pub exclusions: Vec<Exclusion>,
}

impl ResultTable {
    pub fn from_outcome(outcome: &OptimizationOutcome, product: &ProductSpec) -> Self {
        Self {
            product_reference: product.reference.clone(),
            scoring: outcome.scoring.clone(),
            status: outcome.status(),
            rows: outcome.results.iter().map(ResultRow::from_result).collect(),
            exclusions: outcome.exclusions.clone(),
        }
    }

    /// Renders the rows as CSV with the fixed [`CSV_HEADER`].
    pub fn to_csv(&self) -> String {
        let mut out = CSV_HEADER.join(",");
        out.push('\n');
        for row in &self.rows {
            row.write_csv_line(&mut out);
        }
        out
    }

    pub fn write_csv<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(self.to_csv().as_bytes())
    }

    /// Download name for the CSV export, e.g. `carton_fit_PRD-001.csv`.
    pub fn csv_file_name(&self) -> String {
        let reference = self
            .product_reference
            .as_deref()
            .map(sanitize_file_stem)
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| "results".to_string());
        format!("carton_fit_{reference}.csv")
    }
}

fn sanitize_file_stem(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// One placed unit of a grid configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct UnitCell {
    /// Zero-based (row, column, layer) position in the grid.
    #[schema(value_type = [u32; 3])]
    pub index: [u32; 3],
    /// Lower corner relative to the usable interior.
    #[schema(value_type = [f64; 3])]
    pub origin: Dims,
    #[schema(value_type = [f64; 3])]
    pub size: Dims,
}

/// Cell limit of a layout unless configured otherwise.
pub const DEFAULT_MAX_LAYOUT_CELLS: u64 = 100_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("layout of {unit_count} units exceeds the limit of {limit} cells")]
    TooLarge { unit_count: u64, limit: u64 },
}

/// Lays out every unit of a configuration, bottom layer first.
///
/// Configurations with more than `max_cells` units are rejected before
/// anything is allocated.
pub fn unit_cells(fit: &FitConfiguration, max_cells: u64) -> Result<Vec<UnitCell>, LayoutError> {
    let size = fit.orientation.dims;
    let grid = fit.grid;
    let unit_count = grid.unit_count();
    let capacity = match usize::try_from(unit_count) {
        Ok(capacity) if unit_count <= max_cells => capacity,
        _ => {
            return Err(LayoutError::TooLarge {
                unit_count,
                limit: max_cells,
            });
        }
    };
    let mut cells = Vec::with_capacity(capacity);

    for layer in 0..grid.layers {
        for column in 0..grid.columns {
            for row in 0..grid.rows {
                cells.push(UnitCell {
                    index: [row, column, layer],
                    origin: Dims::new(
                        f64::from(row) * size.length,
                        f64::from(column) * size.width,
                        f64::from(layer) * size.height,
                    ),
                    size,
                });
            }
        }
    }

    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::geometry::orientations;
    use crate::model::{AxisCaps, ContainerRecord};
    use crate::optimizer::{EngineConfig, OptimizationRequest, optimize};
    use crate::pallet::PalletSpec;
    use crate::types::EPSILON_GENERAL;
    use approx::assert_relative_eq;

    fn run(records: Vec<ContainerRecord>, pallet: Option<PalletSpec>) -> ResultTable {
        let product =
            ProductSpec::new(Some("PRD 001/A".to_string()), Dims::new(100.0, 80.0, 60.0))
                .unwrap();
        let mut request = OptimizationRequest::new(product.clone());
        if let Some(pallet) = pallet {
            request = request.with_pallet(pallet);
        }
        let outcome = optimize(
            &Catalog::from_records(records),
            &request,
            &EngineConfig::default(),
        )
        .unwrap();
        ResultTable::from_outcome(&outcome, &product)
    }

    #[test]
    fn rows_carry_rank_and_rounded_efficiency() {
        let table = run(
            vec![
                ContainerRecord::new("A", Dims::new(600.0, 400.0, 300.0)).unwrap(),
                ContainerRecord::new("B", Dims::new(330.0, 170.0, 130.0)).unwrap(),
            ],
            None,
        );
        assert_eq!(table.status, RunStatus::Matched);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].container_id, "A");
        assert_eq!(table.rows[0].unit_count, 150);
        assert_relative_eq!(table.rows[0].efficiency_percent, 100.0);

        // 3 x 2 x 2 = 12 units of 480 cm³ in 7 293 cm³
        let second = &table.rows[1];
        assert_eq!(second.rank, 2);
        assert_eq!(second.unit_count, 12);
        assert_relative_eq!(second.efficiency_percent, 78.98);
        assert_relative_eq!(second.empty_space_percent, 21.02);
        assert!(second.pallet_status.is_none());
    }

    #[test]
    fn csv_has_fixed_header_and_one_line_per_row() {
        let table = run(
            vec![ContainerRecord::new("Box, large", Dims::new(600.0, 400.0, 300.0)).unwrap()],
            Some(PalletSpec::default()),
        );
        let csv = table.to_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER.join(",").as_str()));
        let line = lines.next().unwrap();
        assert!(line.starts_with("1,\"Box, large\",600,400,300,"));
        // 2 x 2 per layer, 3 layers under 1200 - 150 mm
        assert!(line.ends_with(",100.00,0.00,planned,4,3,12,1800"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn excluded_pallet_is_reported_in_status() {
        let table = run(
            vec![ContainerRecord::new("Tall", Dims::new(300.0, 200.0, 1100.0)).unwrap()],
            Some(PalletSpec::default()),
        );
        let row = &table.rows[0];
        assert_eq!(
            row.pallet_status.as_deref(),
            Some("excluded: exceeds_pallet_height_budget")
        );
        assert!(row.units_per_pallet.is_none());
    }

    #[test]
    fn csv_file_name_uses_sanitized_reference() {
        let table = run(vec![], None);
        assert_eq!(table.status, RunStatus::NoMatches);
        assert_eq!(table.csv_file_name(), "carton_fit_PRD_001_A.csv");
        assert_eq!(table.to_csv().lines().count(), 1);
    }

    #[test]
    fn escape_csv_quotes_special_characters() {
        assert_eq!(escape_csv("simple"), "simple");
        assert_eq!(escape_csv("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv("with\"quote"), "\"with\"\"quote\"");
        assert_eq!(escape_csv("with\nnewline"), "\"with\nnewline\"");
    }

    #[test]
    fn unit_cells_cover_the_packed_block() {
        let table_fit = {
            let product = ProductSpec::new(None, Dims::new(100.0, 80.0, 60.0)).unwrap();
            let catalog = Catalog::from_records(vec![
                ContainerRecord::new("A", Dims::new(200.0, 160.0, 130.0)).unwrap(),
            ]);
            let outcome = optimize(
                &catalog,
                &OptimizationRequest::new(product),
                &EngineConfig::default(),
            )
            .unwrap();
            outcome.results[0].best
        };

        let cells = unit_cells(&table_fit, DEFAULT_MAX_LAYOUT_CELLS).unwrap();
        assert_eq!(cells.len() as u64, table_fit.unit_count());
        assert_eq!(cells[0].index, [0, 0, 0]);
        assert_eq!(cells[0].origin, Dims::zero());
        assert_eq!(cells[1].index, [1, 0, 0]);

        let block = table_fit.block_dims();
        for cell in &cells {
            let far = cell.origin + cell.size;
            assert!(far.length <= block.length + 1e-9);
            assert!(far.width <= block.width + 1e-9);
            assert!(far.height <= block.height + 1e-9);
        }
    }

    #[test]
    fn oversized_layouts_are_rejected_before_allocation() {
        let variant = orientations(Dims::new(0.1, 0.1, 0.1))[0];
        let fit = FitConfiguration::evaluate(
            Dims::new(1e4, 1e4, 1e3),
            variant,
            &AxisCaps::unlimited(),
            EPSILON_GENERAL,
        )
        .unwrap();
        assert_eq!(
            unit_cells(&fit, DEFAULT_MAX_LAYOUT_CELLS),
            Err(LayoutError::TooLarge {
                unit_count: 100_000_000_000_000,
                limit: DEFAULT_MAX_LAYOUT_CELLS,
            })
        );

        let small = FitConfiguration::evaluate(
            Dims::new(0.3, 0.2, 0.1),
            variant,
            &AxisCaps::unlimited(),
            EPSILON_GENERAL,
        )
        .unwrap();
        assert_eq!(unit_cells(&small, 6).unwrap().len(), 6);
        assert!(unit_cells(&small, 5).is_err());
    }
}
