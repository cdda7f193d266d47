use std::collections::HashMap;

use rand::Rng;

use crate::prompts::error::GenerationError;
use crate::prompts::preferences::PreferenceState;
use crate::prompts::sampling::{uniform_choice, weighted_choice};
use crate::prompts::types::{
    Color, Designer, Garment, GarmentPools, PromptStructure, SamplingContext,
};

pub const TOPS_SHARE: f64 = 0.75;
const SCORE_FLOOR: f64 = 0.1;
const SHIFT_MARGIN: f64 = 0.1;

/// Coefficients for scoring structures when the optimizer has sent no
/// scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicWeights {
    pub outlier: f64,
    pub usage: f64,
    pub rating: f64,
    pub z_score: f64,
    pub staleness: f64,
    pub fresh_weeks: f64,
    pub explore_max_age_weeks: f64,
    pub explore_max_usage: f64,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        HeuristicWeights {
            outlier: 2.0,
            usage: 0.1,
            rating: 2.0,
            z_score: 3.0,
            staleness: 0.2,
            fresh_weeks: 4.0,
            explore_max_age_weeks: 4.0,
            explore_max_usage: 10.0,
        }
    }
}

impl HeuristicWeights {
    pub fn score(&self, structure: &PromptStructure) -> f64 {
        let stale_weeks = (structure.age_weeks - self.fresh_weeks).max(0.0);
        structure.outlier_count * self.outlier
            + structure.usage_count * self.usage
            + structure.avg_rating * self.rating
            + structure.z_score * self.z_score
            - stale_weeks * self.staleness
    }

    fn is_exploratory(&self, structure: &PromptStructure) -> bool {
        structure.age_weeks < self.explore_max_age_weeks
            || structure.usage_count < self.explore_max_usage
    }
}

/// Draws sampling contexts from the request pools using the batch's
/// explore/exploit decision and a preference snapshot.
pub struct SelectionEngine<'a> {
    designers: &'a [Designer],
    colors: &'a [Color],
    garments: &'a GarmentPools,
    structures: &'a [PromptStructure],
    preferences: &'a PreferenceState,
    heuristics: HeuristicWeights,
}

impl<'a> SelectionEngine<'a> {
    /// `structures` must already be restricted to the request's renderer.
    pub fn new(
        designers: &'a [Designer],
        colors: &'a [Color],
        garments: &'a GarmentPools,
        structures: &'a [PromptStructure],
        preferences: &'a PreferenceState,
    ) -> Self {
        SelectionEngine {
            designers,
            colors,
            garments,
            structures,
            preferences,
            heuristics: HeuristicWeights::default(),
        }
    }

    pub fn with_heuristics(mut self, heuristics: HeuristicWeights) -> Self {
        self.heuristics = heuristics;
        self
    }

    pub fn build_contexts<R: Rng + ?Sized>(
        &self,
        count: usize,
        explore: bool,
        rng: &mut R,
    ) -> Result<Vec<SamplingContext>, GenerationError> {
        (0..count).map(|_| self.draw_context(explore, rng)).collect()
    }

    pub fn draw_context<R: Rng + ?Sized>(
        &self,
        explore: bool,
        rng: &mut R,
    ) -> Result<SamplingContext, GenerationError> {
        let designer = uniform_choice(self.designers, rng)
            .ok_or(GenerationError::MissingDesignersOrColors)?;
        let color =
            uniform_choice(self.colors, rng).ok_or(GenerationError::MissingDesignersOrColors)?;
        let garment = select_garment(self.garments, rng)?;
        let prompt_structure = self.select_structure(explore, rng)?;
        Ok(SamplingContext {
            designer: designer.clone(),
            color: color.clone(),
            garment: garment.clone(),
            prompt_structure: prompt_structure.clone(),
        })
    }

    pub fn select_structure<R: Rng + ?Sized>(
        &self,
        explore: bool,
        rng: &mut R,
    ) -> Result<&'a PromptStructure, GenerationError> {
        let structures = self.structures;
        if structures.is_empty() {
            return Err(GenerationError::NoStructures);
        }

        if explore {
            let exploratory = structures
                .iter()
                .filter(|structure| self.heuristics.is_exploratory(structure))
                .collect::<Vec<_>>();
            if let Some(structure) = uniform_choice(&exploratory, rng).copied() {
                return Ok(structure);
            }
            return uniform_choice(structures, rng).ok_or(GenerationError::NoStructures);
        }

        if self.preferences.has_structure_scores() {
            if let Some(structure) = self.select_by_optimizer_score(rng) {
                return Ok(structure);
            }
        }

        let scores = structures
            .iter()
            .map(|structure| self.heuristics.score(structure))
            .collect::<Vec<_>>();
        let min_score = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let shift = if min_score < 0.0 {
            min_score.abs() + SHIFT_MARGIN
        } else {
            SHIFT_MARGIN
        };
        let weights = scores.iter().map(|score| score + shift).collect::<Vec<_>>();

        weighted_choice(structures, &weights, rng)
            .or_else(|| uniform_choice(structures, rng))
            .ok_or(GenerationError::NoStructures)
    }

    fn select_by_optimizer_score<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Option<&'a PromptStructure> {
        let ids = self
            .structures
            .iter()
            .map(|structure| structure.id.as_str())
            .collect::<Vec<_>>();
        let ranked = self.preferences.rank(&ids);

        let mut by_id: HashMap<&str, &'a PromptStructure> = HashMap::with_capacity(ids.len());
        for structure in self.structures {
            by_id.entry(structure.id.as_str()).or_insert(structure);
        }

        let mut candidates = Vec::with_capacity(ranked.len());
        let mut weights = Vec::with_capacity(ranked.len());
        for (id, score) in &ranked {
            if let Some(&structure) = by_id.get(id.as_str()) {
                candidates.push(structure);
                weights.push(score.max(SCORE_FLOOR));
            }
        }

        weighted_choice(&candidates, &weights, rng).copied()
    }
}

pub fn select_garment<'a, R: Rng + ?Sized>(
    garments: &'a GarmentPools,
    rng: &mut R,
) -> Result<&'a Garment, GenerationError> {
    let tops = garments.tops.as_slice();
    let others = garments.others.as_slice();
    if tops.is_empty() && others.is_empty() {
        return Err(GenerationError::NoGarments);
    }

    let draw = rng.random::<f64>();
    let pool = if !tops.is_empty() && (others.is_empty() || draw < TOPS_SHARE) {
        tops
    } else {
        others
    };
    uniform_choice(pool, rng).ok_or(GenerationError::NoGarments)
}
