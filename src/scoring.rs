//! Scoring strategies for ranking fit configurations.
//!
//! Which configuration counts as "best" is business policy, so the engine
//! only asks a [`Scorer`] for a number. Higher is better.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::geometry::FitConfiguration;
use crate::model::ContainerRecord;
use crate::types::Dims;

/// Everything a scorer may look at for one configuration.
#[derive(Clone, Copy, Debug)]
pub struct ScoreContext<'a> {
    pub container: &'a ContainerRecord,
    pub usable: Dims,
    pub fit: &'a FitConfiguration,
}

impl ScoreContext<'_> {
    pub fn unit_count(&self) -> u64 {
        self.fit.unit_count()
    }

    pub fn filled_volume(&self) -> f64 {
        self.fit.filled_volume()
    }

    pub fn outer_volume(&self) -> f64 {
        self.container.outer.volume()
    }

    /// Share of the outer volume occupied by product, between 0 and 1.
    pub fn fill_ratio(&self) -> f64 {
        fill_ratio(self.filled_volume(), self.outer_volume())
    }

    /// 1 − filled volume / outer volume.
    pub fn empty_space_fraction(&self) -> f64 {
        1.0 - self.fill_ratio()
    }
}

pub(crate) fn fill_ratio(filled_volume: f64, outer_volume: f64) -> f64 {
    if outer_volume <= 0.0 {
        return 0.0;
    }
    (filled_volume / outer_volume).clamp(0.0, 1.0)
}

/// A ranking criterion for fit configurations.
pub trait Scorer {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &str;

    /// Scalar score of one configuration; higher ranks first.
    fn score(&self, ctx: &ScoreContext<'_>) -> f64;
}

/// Built-in scoring strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategy {
    /// Raw number of units.
    #[default]
    UnitCount,
    /// Units × oriented product volume.
    FilledVolume,
    /// Units × (1 − empty-space fraction of the outer volume).
    SpaceEfficiency,
}

impl ScoringStrategy {
    pub const ALL: [ScoringStrategy; 3] = [
        ScoringStrategy::UnitCount,
        ScoringStrategy::FilledVolume,
        ScoringStrategy::SpaceEfficiency,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ScoringStrategy::UnitCount => "unit_count",
            ScoringStrategy::FilledVolume => "filled_volume",
            ScoringStrategy::SpaceEfficiency => "space_efficiency",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.code() == normalized)
    }
}

impl Scorer for ScoringStrategy {
    fn name(&self) -> &str {
        self.code()
    }

    fn score(&self, ctx: &ScoreContext<'_>) -> f64 {
        let units = ctx.unit_count() as f64;
        match self {
            ScoringStrategy::UnitCount => units,
            ScoringStrategy::FilledVolume => units * ctx.fit.orientation.dims.volume(),
            ScoringStrategy::SpaceEfficiency => units * (1.0 - ctx.empty_space_fraction()),
        }
    }
}

impl std::fmt::Display for ScoringStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
