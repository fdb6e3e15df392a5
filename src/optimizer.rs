//! Carton selection engine.
//!
//! For every container of a catalog snapshot the engine:
//! - resolves the usable interior (margins, both walls)
//! - fits the product on a regular grid in every allowed orientation
//! - keeps the best-scoring configuration (earliest orientation wins ties)
//! - applies stock, unit-count, empty-space and pallet filters
//!
//! and finally ranks the surviving containers by score. Containers that drop
//! out are returned next to the ranking with a reason, never silently.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;

use crate::catalog::Catalog;
use crate::geometry::{
    FitConfiguration, OrientationPolicy, OrientationVariant, allowed_orientations, usable_space,
};
use crate::model::{
    AxisCaps, ContainerRecord, ExclusionReason, MarginSpec, ProductSpec, ValidationError,
    validate_non_negative,
};
use crate::pallet::{PalletOutcome, PalletSpec, plan_pallet};
use crate::scoring::{ScoreContext, Scorer, ScoringStrategy, fill_ratio};
use crate::types::{Dims, EPSILON_GENERAL};

/// Engine settings that are not part of a single request.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Numerical tolerance for floor divisions and threshold comparisons.
    pub general_epsilon: f64,
    /// Wall thickness for records that do not carry their own.
    pub default_wall_thickness: f64,
    /// Which product rotations are evaluated.
    pub orientation_policy: OrientationPolicy,
    /// Number of runner-up configurations kept per container.
    pub alternatives: usize,
}

impl EngineConfig {
    pub const DEFAULT_GENERAL_EPSILON: f64 = EPSILON_GENERAL;
    pub const DEFAULT_WALL_THICKNESS: f64 = 0.0;
    pub const DEFAULT_ALTERNATIVES: usize = 0;

    /// Creates a builder for a custom configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Checks the tolerance range and the default wall thickness.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.general_epsilon > 0.0 && self.general_epsilon < 1.0) {
            return Err(ValidationError::InvalidConfiguration(format!(
                "general_epsilon must be between 0 and 1 (exclusive), got: {}",
                self.general_epsilon
            )));
        }
        validate_non_negative(self.default_wall_thickness, "Default wall thickness")
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            general_epsilon: Self::DEFAULT_GENERAL_EPSILON,
            default_wall_thickness: Self::DEFAULT_WALL_THICKNESS,
            orientation_policy: OrientationPolicy::default(),
            alternatives: Self::DEFAULT_ALTERNATIVES,
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Clone, Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn general_epsilon(mut self, epsilon: f64) -> Self {
        self.config.general_epsilon = epsilon;
        self
    }

    pub fn default_wall_thickness(mut self, thickness: f64) -> Self {
        self.config.default_wall_thickness = thickness;
        self
    }

    pub fn orientation_policy(mut self, policy: OrientationPolicy) -> Self {
        self.config.orientation_policy = policy;
        self
    }

    pub fn alternatives(mut self, count: usize) -> Self {
        self.config.alternatives = count;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<EngineConfig, ValidationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Optional filters applied after the best configuration is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RankingFilters {
    /// Exclude containers whose empty-space fraction is above this (0..=1).
    #[serde(default)]
    pub max_empty_fraction: Option<f64>,
    /// Exclude containers with known stock below this. Unknown stock passes.
    #[serde(default)]
    pub min_stock: Option<u32>,
    #[serde(default)]
    pub min_units: Option<u64>,
    #[serde(default)]
    pub max_units: Option<u64>,
    /// Move containers whose pallet plan fails into the exclusions.
    #[serde(default)]
    pub require_pallet_fit: bool,
}

impl RankingFilters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(fraction) = self.max_empty_fraction {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(ValidationError::InvalidConfiguration(format!(
                    "max_empty_fraction must be between 0 and 1, got: {}",
                    fraction
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_units, self.max_units) {
            if min > max {
                return Err(ValidationError::InvalidConfiguration(format!(
                    "min_units ({}) must not exceed max_units ({})",
                    min, max
                )));
            }
        }
        Ok(())
    }
}

/// Everything one run needs besides the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationRequest {
    pub product: ProductSpec,
    pub margins: MarginSpec,
    pub caps: AxisCaps,
    pub scoring: ScoringStrategy,
    pub filters: RankingFilters,
    pub pallet: Option<PalletSpec>,
    /// Keep only the best `top_k` containers of the ranking.
    pub top_k: Option<usize>,
    /// Overrides [`EngineConfig::orientation_policy`].
    pub orientation_policy: Option<OrientationPolicy>,
    /// Overrides [`EngineConfig::alternatives`].
    pub alternatives: Option<usize>,
}

impl OptimizationRequest {
    pub fn new(product: ProductSpec) -> Self {
        Self {
            product,
            margins: MarginSpec::none(),
            caps: AxisCaps::unlimited(),
            scoring: ScoringStrategy::default(),
            filters: RankingFilters::default(),
            pallet: None,
            top_k: None,
            orientation_policy: None,
            alternatives: None,
        }
    }

    pub fn with_margins(mut self, margins: MarginSpec) -> Self {
        self.margins = margins;
        self
    }

    pub fn with_caps(mut self, caps: AxisCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringStrategy) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_filters(mut self, filters: RankingFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_pallet(mut self, pallet: PalletSpec) -> Self {
        self.pallet = Some(pallet);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_orientation_policy(mut self, policy: OrientationPolicy) -> Self {
        self.orientation_policy = Some(policy);
        self
    }

    pub fn with_alternatives(mut self, count: usize) -> Self {
        self.alternatives = Some(count);
        self
    }

    /// Checks every parameter before the run starts.
    pub fn validate(&self) -> Result<(), OptimizeError> {
        self.product.validate().map_err(OptimizeError::InvalidProduct)?;
        self.margins.validate().map_err(OptimizeError::InvalidMargins)?;
        if let Some(pallet) = &self.pallet {
            pallet.validate().map_err(OptimizeError::InvalidPallet)?;
        }
        self.filters.validate().map_err(OptimizeError::InvalidFilters)?;
        if self.top_k == Some(0) {
            return Err(OptimizeError::InvalidFilters(
                ValidationError::InvalidConfiguration("top_k must be at least 1".to_string()),
            ));
        }
        Ok(())
    }
}

/// Input errors that stop a run before it starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    #[error("Invalid product: {0}")]
    InvalidProduct(#[source] ValidationError),
    #[error("Invalid margins: {0}")]
    InvalidMargins(#[source] ValidationError),
    #[error("Invalid pallet: {0}")]
    InvalidPallet(#[source] ValidationError),
    #[error("Invalid filters: {0}")]
    InvalidFilters(#[source] ValidationError),
    #[error("Invalid engine configuration: {0}")]
    InvalidEngineConfig(#[source] ValidationError),
}

/// A configuration together with its score.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct ScoredFit {
    pub fit: FitConfiguration,
    pub score: f64,
}

/// Best configuration of one container, as it appears in the ranking.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredResult {
    /// 1-based position in the catalog ranking.
    pub rank: usize,
    pub container: ContainerRecord,
    pub usable: Dims,
    /// Wall thickness that was actually applied.
    pub wall_thickness: f64,
    pub best: FitConfiguration,
    pub score: f64,
    /// Filled volume / outer volume.
    pub fill_ratio: f64,
    /// Runner-up configurations, best first.
    pub alternatives: Vec<ScoredFit>,
    pub pallet: Option<PalletOutcome>,
}

impl ScoredResult {
    pub fn unit_count(&self) -> u64 {
        self.best.unit_count()
    }

    pub fn efficiency_percent(&self) -> f64 {
        self.fill_ratio * 100.0
    }

    pub fn empty_space_fraction(&self) -> f64 {
        1.0 - self.fill_ratio
    }
}

/// A container that did not make it into the ranking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Exclusion {
    pub container_id: String,
    pub reason: ExclusionReason,
}

/// Whether a finished run found anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Matched,
    NoMatches,
}

/// Ranked results plus exclusions of one run.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationOutcome {
    pub results: Vec<ScoredResult>,
    pub exclusions: Vec<Exclusion>,
    /// Name of the scorer that produced the ranking.
    pub scoring: String,
    /// Number of containers before `top_k` truncation.
    pub matched: usize,
}

impl OptimizationOutcome {
    /// `NoMatches` is a successful run with nothing to show, not an error.
    pub fn status(&self) -> RunStatus {
        if self.results.is_empty() {
            RunStatus::NoMatches
        } else {
            RunStatus::Matched
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn best(&self) -> Option<&ScoredResult> {
        self.results.first()
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    pub fn exclusion_count(&self) -> usize {
        self.exclusions.len()
    }
}

/// Events emitted during a run, for live progress views.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum OptimizeEvent {
    /// The run started on a catalog snapshot.
    RunStarted {
        containers: usize,
        orientations: usize,
        scoring: String,
    },
    /// A container produced a valid best configuration.
    ContainerEvaluated {
        container_id: String,
        unit_count: u64,
        score: f64,
        orientation: (f64, f64, f64),
    },
    /// A container dropped out.
    ContainerExcluded {
        container_id: String,
        reason_code: String,
        reason_text: String,
    },
    /// Run finished.
    Finished { ranked: usize, excluded: usize },
}

/// Best configuration of a single container before ranking.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerEvaluation {
    pub usable: Dims,
    pub wall_thickness: f64,
    pub best: ScoredFit,
    pub alternatives: Vec<ScoredFit>,
    pub fill_ratio: f64,
}

/// Runs the engine with the request's built-in scoring strategy.
///
/// # Parameters
/// * `catalog` - Snapshot of candidate containers; read only
/// * `request` - Product and constraints
/// * `config` - Engine settings
///
/// # Returns
/// Ranked results and exclusions, or the validation error that stopped the run
pub fn optimize(
    catalog: &Catalog,
    request: &OptimizationRequest,
    config: &EngineConfig,
) -> Result<OptimizationOutcome, OptimizeError> {
    optimize_with_scorer(catalog, request, &request.scoring, config)
}

/// Like [`optimize`], but ranks with a caller-supplied scorer.
pub fn optimize_with_scorer(
    catalog: &Catalog,
    request: &OptimizationRequest,
    scorer: &dyn Scorer,
    config: &EngineConfig,
) -> Result<OptimizationOutcome, OptimizeError> {
    optimize_with_progress(catalog, request, scorer, config, |_| {})
}

/// Runs the engine and reports every step to `on_event`.
pub fn optimize_with_progress(
    catalog: &Catalog,
    request: &OptimizationRequest,
    scorer: &dyn Scorer,
    config: &EngineConfig,
    mut on_event: impl FnMut(&OptimizeEvent),
) -> Result<OptimizationOutcome, OptimizeError> {
    request.validate()?;
    config
        .validate()
        .map_err(OptimizeError::InvalidEngineConfig)?;

    let policy = request
        .orientation_policy
        .unwrap_or(config.orientation_policy);
    let variants = allowed_orientations(request.product.dims, policy);

    on_event(&OptimizeEvent::RunStarted {
        containers: catalog.len(),
        orientations: variants.len(),
        scoring: scorer.name().to_string(),
    });

    let mut results: Vec<ScoredResult> = Vec::new();
    let mut exclusions: Vec<Exclusion> = Vec::new();

    for record in catalog.records() {
        match assess_container(record, &variants, request, scorer, config) {
            Ok(result) => {
                on_event(&OptimizeEvent::ContainerEvaluated {
                    container_id: record.id.clone(),
                    unit_count: result.unit_count(),
                    score: result.score,
                    orientation: result.best.orientation.dims.as_tuple(),
                });
                results.push(result);
            }
            Err(reason) => {
                debug!(container = %record.id, reason = reason.code(), "container excluded");
                on_event(&OptimizeEvent::ContainerExcluded {
                    container_id: record.id.clone(),
                    reason_code: reason.code().to_string(),
                    reason_text: reason.to_string(),
                });
                exclusions.push(Exclusion {
                    container_id: record.id.clone(),
                    reason,
                });
            }
        }
    }

    rank_results(&mut results);
    let matched = results.len();
    if let Some(top_k) = request.top_k {
        results.truncate(top_k);
    }

    on_event(&OptimizeEvent::Finished {
        ranked: results.len(),
        excluded: exclusions.len(),
    });

    Ok(OptimizationOutcome {
        results,
        exclusions,
        scoring: scorer.name().to_string(),
        matched,
    })
}

/// Evaluation plus filters for one container; rank is assigned later.
fn assess_container(
    record: &ContainerRecord,
    variants: &[OrientationVariant],
    request: &OptimizationRequest,
    scorer: &dyn Scorer,
    config: &EngineConfig,
) -> Result<ScoredResult, ExclusionReason> {
    let alternatives = request.alternatives.unwrap_or(config.alternatives);
    let evaluation = evaluate_container(
        record,
        variants,
        &request.margins,
        &request.caps,
        scorer,
        config,
        alternatives,
    )?;

    let unit_count = evaluation.best.fit.unit_count();
    check_filters(record, unit_count, evaluation.fill_ratio, &request.filters, config)?;

    let pallet = request
        .pallet
        .as_ref()
        .map(|spec| plan_pallet(record.outer, unit_count, spec, config.general_epsilon));
    if request.filters.require_pallet_fit {
        if let Some(reason) = pallet.as_ref().and_then(PalletOutcome::exclusion) {
            return Err(reason);
        }
    }

    Ok(ScoredResult {
        rank: 0,
        container: record.clone(),
        usable: evaluation.usable,
        wall_thickness: evaluation.wall_thickness,
        best: evaluation.best.fit,
        score: evaluation.best.score,
        fill_ratio: evaluation.fill_ratio,
        alternatives: evaluation.alternatives,
        pallet,
    })
}

/// Wall thickness applied to a record: request, then record, then default.
pub fn effective_wall_thickness(
    record: &ContainerRecord,
    margins: &MarginSpec,
    config: &EngineConfig,
) -> f64 {
    margins
        .wall_thickness
        .or(record.wall_thickness)
        .unwrap_or(config.default_wall_thickness)
}

/// Finds the best configuration of one container over `variants`.
///
/// The usable space is checked before any orientation is evaluated. Among
/// equal scores the orientation enumerated first wins.
///
/// # Parameters
/// * `record` - The container
/// * `variants` - Orientations in enumeration order
/// * `margins` - Margins and optional wall thickness override
/// * `caps` - Per-axis maximum counts
/// * `scorer` - Ranking criterion
/// * `config` - Engine settings
/// * `alternatives` - Number of runner-up configurations to keep
pub fn evaluate_container(
    record: &ContainerRecord,
    variants: &[OrientationVariant],
    margins: &MarginSpec,
    caps: &AxisCaps,
    scorer: &dyn Scorer,
    config: &EngineConfig,
    alternatives: usize,
) -> Result<ContainerEvaluation, ExclusionReason> {
    let wall_thickness = effective_wall_thickness(record, margins, config);
    let usable = usable_space(record.outer, margins, wall_thickness)
        .ok_or(ExclusionReason::UsableSpaceNonPositive)?;

    let mut candidates: Vec<ScoredFit> = variants
        .iter()
        .filter_map(|variant| {
            FitConfiguration::evaluate(usable, *variant, caps, config.general_epsilon)
        })
        .map(|fit| {
            let score = scorer.score(&ScoreContext {
                container: record,
                usable,
                fit: &fit,
            });
            ScoredFit { fit, score }
        })
        .collect();

    let best_index = select_best(&candidates).ok_or(ExclusionReason::NoFittingOrientation)?;
    let best = candidates.remove(best_index);

    // Stable sort keeps enumeration order among equal scores.
    candidates.sort_by(|a, b| compare_scores(b.score, a.score));
    candidates.truncate(alternatives);

    Ok(ContainerEvaluation {
        usable,
        wall_thickness,
        fill_ratio: fill_ratio(best.fit.filled_volume(), record.outer.volume()),
        best,
        alternatives: candidates,
    })
}

/// Index of the highest score; the first of several equal scores wins.
fn select_best(candidates: &[ScoredFit]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        match best {
            None => best = Some(idx),
            Some(current) => {
                if compare_scores(candidate.score, candidates[current].score) == Ordering::Greater
                {
                    best = Some(idx);
                }
            }
        }
    }
    best
}

fn compare_scores(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

fn check_filters(
    record: &ContainerRecord,
    unit_count: u64,
    fill_ratio: f64,
    filters: &RankingFilters,
    config: &EngineConfig,
) -> Result<(), ExclusionReason> {
    if let (Some(minimum), Some(stock)) = (filters.min_stock, record.stock) {
        if stock < minimum {
            return Err(ExclusionReason::InsufficientStock);
        }
    }

    let below = filters.min_units.is_some_and(|min| unit_count < min);
    let above = filters.max_units.is_some_and(|max| unit_count > max);
    if below || above {
        return Err(ExclusionReason::UnitCountOutOfRange);
    }

    if let Some(threshold) = filters.max_empty_fraction {
        if 1.0 - fill_ratio > threshold + config.general_epsilon {
            return Err(ExclusionReason::EmptySpaceAboveThreshold);
        }
    }

    Ok(())
}

/// Sorts by score, descending, keeping catalog order among ties, and
/// assigns 1-based ranks.
fn rank_results(results: &mut [ScoredResult]) {
    results.sort_by(|a, b| compare_scores(b.score, a.score));
    for (idx, result) in results.iter_mut().enumerate() {
        result.rank = idx + 1;
    }
}
