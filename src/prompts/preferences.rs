use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_EXPLORATION_RATE: f64 = 0.2;

const ADJECTIVE_MAP: &[(&str, &str)] = &[
    ("oversized", "oversized"),
    ("tailored", "tailored"),
    ("relaxed_fit", "relaxed"),
    ("slim_fit", "slim"),
    ("cropped", "cropped"),
    ("elongated", "elongated"),
    ("boxy", "boxy"),
    ("fitted", "fitted"),
    ("flowy", "flowy"),
    ("structured", "structured"),
    ("minimalist", "minimalist"),
    ("earth_tones", "earth-toned"),
    ("monochromatic", "monochromatic"),
    ("tonal", "tonal"),
    ("muted", "muted"),
    ("neutral", "neutral"),
    ("luxe_hand", "luxurious"),
    ("refined_casual", "refined"),
    ("elevated_basic", "elevated"),
    ("travel_ready", "travel-ready"),
    ("versatile", "versatile"),
    ("lightweight", "lightweight"),
    ("drapey", "draped"),
    ("crisp", "crisp"),
];

/// Thresholds used when turning attribute weights into guidance text and
/// adjective candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreferencePolicy {
    pub strong_threshold: f64,
    pub strong_limit: usize,
    pub weak_threshold: f64,
    pub weak_limit: usize,
    pub adjective_threshold: f64,
    /// Score assumed for structures the optimizer has not scored.
    pub neutral_score: f64,
    pub insight_examples: usize,
    pub preview_chars: usize,
}

impl Default for PreferencePolicy {
    fn default() -> Self {
        PreferencePolicy {
            strong_threshold: 0.6,
            strong_limit: 10,
            weak_threshold: 0.3,
            weak_limit: 5,
            adjective_threshold: 0.4,
            neutral_score: 0.5,
            insight_examples: 3,
            preview_chars: 120,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptInsight {
    #[serde(default)]
    pub prompt_preview: String,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub sample_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureInsights {
    #[serde(default)]
    pub top_prompts: Vec<PromptInsight>,
    #[serde(default)]
    pub avg_success_rate: f64,
}

/// Feedback pushed by the optimizer. `None` fields leave the stored value
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct FeedbackUpdate {
    pub attribute_weights: HashMap<String, f64>,
    pub exploration_rate: Option<f64>,
    pub structure_scores: Option<HashMap<String, f64>>,
    pub structure_insights: Option<HashMap<String, StructureInsights>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplorationStats {
    pub exploration_count: u64,
    pub exploitation_count: u64,
    pub total_decisions: u64,
    pub actual_exploration_rate: f64,
    pub configured_exploration_rate: f64,
}

#[derive(Debug, Clone)]
pub struct PreferenceState {
    attribute_weights: Vec<(String, f64)>,
    attribute_index: HashMap<String, f64>,
    exploration_rate: f64,
    structure_scores: Vec<(String, f64)>,
    structure_index: HashMap<String, f64>,
    structure_insights: HashMap<String, StructureInsights>,
    last_updated: Option<DateTime<Utc>>,
    exploration_count: u64,
    exploitation_count: u64,
    default_exploration_rate: f64,
    policy: PreferencePolicy,
}

fn sorted_descending(values: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut entries = values
        .iter()
        .map(|(name, score)| (name.clone(), *score))
        .collect::<Vec<_>>();
    entries.sort_by(|a, b| descending_by_score(a, b));
    entries
}

fn descending_by_score(a: &(String, f64), b: &(String, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        return 0.0;
    }
    rate.clamp(0.0, 1.0)
}

impl PreferenceState {
    pub fn new(default_exploration_rate: f64, policy: PreferencePolicy) -> Self {
        let default_exploration_rate = clamp_rate(default_exploration_rate);
        PreferenceState {
            attribute_weights: Vec::new(),
            attribute_index: HashMap::new(),
            exploration_rate: default_exploration_rate,
            structure_scores: Vec::new(),
            structure_index: HashMap::new(),
            structure_insights: HashMap::new(),
            last_updated: None,
            exploration_count: 0,
            exploitation_count: 0,
            default_exploration_rate,
            policy,
        }
    }

    fn apply(&mut self, update: FeedbackUpdate) {
        self.attribute_weights = sorted_descending(&update.attribute_weights);
        self.attribute_index = update.attribute_weights;
        if let Some(rate) = update.exploration_rate {
            self.exploration_rate = clamp_rate(rate);
        }
        if let Some(scores) = update.structure_scores {
            self.structure_scores = sorted_descending(&scores);
            self.structure_index = scores;
        }
        if let Some(insights) = update.structure_insights {
            self.structure_insights = insights;
        }
        self.last_updated = Some(Utc::now());
    }

    fn reset(&mut self) {
        *self = PreferenceState::new(self.default_exploration_rate, self.policy);
        self.last_updated = Some(Utc::now());
    }

    fn decide_exploration<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let exploring = rng.random::<f64>() < self.exploration_rate;
        if exploring {
            self.exploration_count += 1;
        } else {
            self.exploitation_count += 1;
        }
        exploring
    }

    pub fn policy(&self) -> &PreferencePolicy {
        &self.policy
    }

    pub fn has_preferences(&self) -> bool {
        !self.attribute_weights.is_empty()
    }

    pub fn has_structure_scores(&self) -> bool {
        !self.structure_scores.is_empty()
    }

    pub fn has_structure_insights(&self) -> bool {
        !self.structure_insights.is_empty()
    }

    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn structures_with_scores_count(&self) -> usize {
        self.structure_scores.len()
    }

    pub fn structures_with_insights_count(&self) -> usize {
        self.structure_insights.len()
    }

    pub fn top_preferences(&self, n: usize) -> Vec<(String, f64)> {
        self.attribute_weights.iter().take(n).cloned().collect()
    }

    pub fn preference_score(&self, attribute: &str) -> f64 {
        self.attribute_index
            .get(attribute)
            .copied()
            .unwrap_or(self.policy.neutral_score)
    }

    pub fn structure_score(&self, structure_id: &str) -> Option<f64> {
        self.structure_index.get(structure_id).copied()
    }

    pub fn top_structures(&self, n: usize) -> Vec<(String, f64)> {
        self.structure_scores.iter().take(n).cloned().collect()
    }

    pub fn structure_insights(&self, structure_id: &str) -> Option<&StructureInsights> {
        self.structure_insights.get(structure_id)
    }

    /// Orders ids by optimizer score, highest first. Unscored ids get the
    /// neutral score. Equal scores keep their input order.
    pub fn rank<S: AsRef<str>>(&self, ids: &[S]) -> Vec<(String, f64)> {
        let mut ranked = ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                let score = self
                    .structure_score(id)
                    .unwrap_or(self.policy.neutral_score);
                (id.to_string(), score)
            })
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    pub fn style_guidance(&self, structure_id: Option<&str>) -> String {
        if self.attribute_weights.is_empty() {
            return String::new();
        }

        let policy = &self.policy;
        let mut sections = Vec::new();

        let strong = self
            .attribute_weights
            .iter()
            .filter(|(_, score)| *score > policy.strong_threshold)
            .take(policy.strong_limit)
            .map(|(name, score)| format!("{} ({:.1})", name.replace('_', " "), score))
            .collect::<Vec<_>>();
        if !strong.is_empty() {
            sections.push(format!(
                "PREFERRED ATTRIBUTES (incorporate these): {}",
                strong.join(", ")
            ));
        }

        let weak = self
            .attribute_weights
            .iter()
            .filter(|(_, score)| *score < policy.weak_threshold)
            .take(policy.weak_limit)
            .map(|(name, _)| name.replace('_', " "))
            .collect::<Vec<_>>();
        if !weak.is_empty() {
            sections.push(format!(
                "LESS FAVORED ATTRIBUTES (use sparingly): {}",
                weak.join(", ")
            ));
        }

        if let Some(insights) = structure_id.and_then(|id| self.structure_insights.get(id)) {
            let examples = insights
                .top_prompts
                .iter()
                .take(policy.insight_examples)
                .map(|prompt| {
                    let preview: String = prompt
                        .prompt_preview
                        .chars()
                        .take(policy.preview_chars)
                        .collect();
                    format!(
                        "  • \"{}...\" ({:.0}% success)",
                        preview,
                        prompt.success_rate * 100.0
                    )
                })
                .collect::<Vec<_>>();
            if !examples.is_empty() {
                sections.push(format!(
                    "HIGH-PERFORMING PROMPTS FOR THIS STRUCTURE (use as inspiration):\n{}",
                    examples.join("\n")
                ));
            }
        }

        sections.join("\n\n")
    }

    pub fn weighted_adjectives(&self) -> Vec<(String, f64)> {
        let mut weighted = self
            .attribute_weights
            .iter()
            .filter(|(_, score)| *score > self.policy.adjective_threshold)
            .filter_map(|(name, score)| {
                ADJECTIVE_MAP
                    .iter()
                    .find(|(attribute, _)| attribute == name)
                    .map(|(_, adjective)| (adjective.to_string(), *score))
            })
            .collect::<Vec<_>>();
        weighted.sort_by(|a, b| b.1.total_cmp(&a.1));
        weighted
    }

    pub fn exploration_stats(&self) -> ExplorationStats {
        let total = self.exploration_count + self.exploitation_count;
        let actual = if total > 0 {
            let rate = self.exploration_count as f64 / total as f64;
            (rate * 10_000.0).round() / 10_000.0
        } else {
            0.0
        };
        ExplorationStats {
            exploration_count: self.exploration_count,
            exploitation_count: self.exploitation_count,
            total_decisions: total,
            actual_exploration_rate: actual,
            configured_exploration_rate: self.exploration_rate,
        }
    }
}

/// Process-wide handle on the optimizer feedback. Clones share one state;
/// every operation takes the lock exactly once so readers never see a
/// half-applied update.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    inner: Arc<Mutex<PreferenceState>>,
}

impl Default for PreferenceStore {
    fn default() -> Self {
        PreferenceStore::new(DEFAULT_EXPLORATION_RATE)
    }
}

impl PreferenceStore {
    pub fn new(default_exploration_rate: f64) -> Self {
        PreferenceStore::with_policy(default_exploration_rate, PreferencePolicy::default())
    }

    pub fn with_policy(default_exploration_rate: f64, policy: PreferencePolicy) -> Self {
        PreferenceStore {
            inner: Arc::new(Mutex::new(PreferenceState::new(
                default_exploration_rate,
                policy,
            ))),
        }
    }

    pub fn update(&self, update: FeedbackUpdate) {
        let mut state = self.inner.lock();
        state.apply(update);
        info!(
            "Preferences updated: {} attributes, {} structure scores, {} structure insights, exploration_rate={}",
            state.attribute_weights.len(),
            state.structure_scores.len(),
            state.structure_insights.len(),
            state.exploration_rate
        );
    }

    pub fn clear(&self) {
        self.inner.lock().reset();
        info!("Preferences cleared");
    }

    pub fn should_explore<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        self.inner.lock().decide_exploration(rng)
    }

    /// Makes the single explore/exploit decision for a batch and returns it
    /// together with a snapshot for the rest of the request. Without loaded
    /// preferences the batch exploits and no counter moves.
    pub fn begin_batch<R: Rng + ?Sized>(&self, rng: &mut R) -> (bool, PreferenceState) {
        let mut state = self.inner.lock();
        let explore = if state.has_preferences() {
            state.decide_exploration(rng)
        } else {
            false
        };
        (explore, state.clone())
    }

    pub fn snapshot(&self) -> PreferenceState {
        self.inner.lock().clone()
    }

    pub fn reset_exploration_stats(&self) {
        let mut state = self.inner.lock();
        state.exploration_count = 0;
        state.exploitation_count = 0;
    }

    pub fn has_preferences(&self) -> bool {
        self.inner.lock().has_preferences()
    }

    pub fn rank<S: AsRef<str>>(&self, ids: &[S]) -> Vec<(String, f64)> {
        self.inner.lock().rank(ids)
    }

    pub fn style_guidance(&self, structure_id: Option<&str>) -> String {
        self.inner.lock().style_guidance(structure_id)
    }

    pub fn weighted_adjectives(&self) -> Vec<(String, f64)> {
        self.inner.lock().weighted_adjectives()
    }

    pub fn exploration_stats(&self) -> ExplorationStats {
        self.inner.lock().exploration_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn weights(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries
            .iter()
            .map(|(name, score)| (name.to_string(), *score))
            .collect()
    }

    #[test]
    fn snapshots_never_mix_two_updates() {
        let store = PreferenceStore::default();
        let rounds = 500;

        std::thread::scope(|scope| {
            let writer = store.clone();
            scope.spawn(move || {
                for round in 0..rounds {
                    let value = round as f64 / rounds as f64;
                    writer.update(FeedbackUpdate {
                        attribute_weights: weights(&[("tailored", 0.9)]),
                        exploration_rate: Some(value),
                        structure_scores: Some(weights(&[("recA", value), ("recB", value)])),
                        ..FeedbackUpdate::default()
                    });
                }
            });

            for seed in 0..3u64 {
                let reader = store.clone();
                scope.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed);
                    for _ in 0..rounds {
                        let (_, batch) = reader.begin_batch(&mut rng);
                        let snapshot = reader.snapshot();
                        for state in [batch, snapshot] {
                            let Some(score) = state.structure_score("recA") else {
                                continue;
                            };
                            assert_eq!(state.exploration_rate(), score);
                            assert_eq!(state.structure_score("recB"), Some(score));
                            assert_eq!(state.top_structures(2).len(), 2);
                        }
                    }
                });
            }
        });

        let last = (rounds - 1) as f64 / rounds as f64;
        assert_eq!(store.snapshot().structure_score("recA"), Some(last));
    }

    #[test]
    fn score_lookups_follow_the_latest_update() {
        let store = PreferenceStore::default();
        store.update(FeedbackUpdate {
            attribute_weights: weights(&[("tailored", 0.9), ("boxy", 0.1)]),
            structure_scores: Some(weights(&[("recA", 0.8)])),
            ..FeedbackUpdate::default()
        });
        store.update(FeedbackUpdate {
            attribute_weights: weights(&[("boxy", 0.7)]),
            structure_scores: Some(weights(&[("recB", 0.3)])),
            ..FeedbackUpdate::default()
        });

        let snapshot = store.snapshot();
        assert_eq!(snapshot.preference_score("boxy"), 0.7);
        assert_eq!(snapshot.preference_score("tailored"), 0.5);
        assert_eq!(snapshot.structure_score("recA"), None);
        assert_eq!(snapshot.structure_score("recB"), Some(0.3));

        store.clear();
        assert_eq!(store.snapshot().structure_score("recB"), None);
    }

    fn store_with(rate: f64) -> PreferenceStore {
        let store = PreferenceStore::default();
        store.update(FeedbackUpdate {
            attribute_weights: weights(&[("tailored", 0.9)]),
            exploration_rate: Some(rate),
            ..FeedbackUpdate::default()
        });
        store
    }

    #[test]
    fn update_sorts_and_clamps() {
        let store = PreferenceStore::default();
        store.update(FeedbackUpdate {
            attribute_weights: weights(&[("muted", 0.2), ("tailored", 0.9), ("crisp", 0.5)]),
            exploration_rate: Some(3.5),
            structure_scores: Some(weights(&[("recA", 0.1), ("recB", 0.7)])),
            structure_insights: None,
        });

        let snapshot = store.snapshot();
        assert_eq!(snapshot.exploration_rate(), 1.0);
        let names = snapshot
            .top_preferences(20)
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["tailored", "crisp", "muted"]);
        assert_eq!(snapshot.top_structures(1), vec![("recB".to_string(), 0.7)]);
        assert!(snapshot.last_updated().is_some());
    }

    #[test]
    fn omitted_fields_are_left_untouched() {
        let store = PreferenceStore::default();
        store.update(FeedbackUpdate {
            attribute_weights: weights(&[("tailored", 0.9)]),
            exploration_rate: Some(0.5),
            structure_scores: Some(weights(&[("recA", 0.8)])),
            structure_insights: Some(HashMap::from([(
                "recA".to_string(),
                StructureInsights::default(),
            )])),
        });
        store.update(FeedbackUpdate {
            attribute_weights: weights(&[("boxy", 0.7)]),
            ..FeedbackUpdate::default()
        });

        let snapshot = store.snapshot();
        assert_eq!(snapshot.exploration_rate(), 0.5);
        assert_eq!(snapshot.structure_score("recA"), Some(0.8));
        assert!(snapshot.has_structure_insights());
        assert_eq!(snapshot.preference_score("boxy"), 0.7);
        assert_eq!(snapshot.preference_score("tailored"), 0.5);
    }

    #[test]
    fn negative_rate_clamps_to_zero() {
        let store = store_with(-0.4);
        assert_eq!(store.snapshot().exploration_rate(), 0.0);
    }

    #[test]
    fn clear_restores_defaults() {
        let store = PreferenceStore::new(0.3);
        store.update(FeedbackUpdate {
            attribute_weights: weights(&[("tailored", 0.9)]),
            exploration_rate: Some(0.9),
            structure_scores: Some(weights(&[("recA", 0.8)])),
            structure_insights: Some(HashMap::from([(
                "recA".to_string(),
                StructureInsights::default(),
            )])),
        });
        let mut rng = StdRng::seed_from_u64(5);
        store.should_explore(&mut rng);

        store.clear();

        let snapshot = store.snapshot();
        assert!(!snapshot.has_preferences());
        assert!(!snapshot.has_structure_scores());
        assert!(!snapshot.has_structure_insights());
        assert_eq!(snapshot.exploration_rate(), 0.3);
        assert_eq!(snapshot.exploration_stats().total_decisions, 0);
    }

    #[test]
    fn exploration_boundaries_are_deterministic() {
        let mut rng = StdRng::seed_from_u64(11);
        let never = store_with(0.0);
        let always = store_with(1.0);
        for _ in 0..200 {
            assert!(!never.should_explore(&mut rng));
            assert!(always.should_explore(&mut rng));
        }
        assert_eq!(never.exploration_stats().exploitation_count, 200);
        assert_eq!(always.exploration_stats().exploration_count, 200);
        assert_eq!(always.exploration_stats().actual_exploration_rate, 1.0);
    }

    #[test]
    fn begin_batch_without_preferences_exploits_silently() {
        let store = PreferenceStore::new(1.0);
        let mut rng = StdRng::seed_from_u64(2);
        let (explore, snapshot) = store.begin_batch(&mut rng);
        assert!(!explore);
        assert_eq!(snapshot.exploration_stats().total_decisions, 0);
    }

    #[test]
    fn reset_stats_keeps_scores() {
        let store = store_with(1.0);
        store.update(FeedbackUpdate {
            attribute_weights: weights(&[("tailored", 0.9)]),
            structure_scores: Some(weights(&[("recA", 0.8)])),
            ..FeedbackUpdate::default()
        });
        let mut rng = StdRng::seed_from_u64(2);
        store.should_explore(&mut rng);
        store.reset_exploration_stats();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.exploration_stats().total_decisions, 0);
        assert_eq!(snapshot.exploration_stats().actual_exploration_rate, 0.0);
        assert_eq!(snapshot.structure_score("recA"), Some(0.8));
    }

    #[test]
    fn rank_defaults_unknown_ids_to_neutral() {
        let store = PreferenceStore::default();
        store.update(FeedbackUpdate {
            attribute_weights: HashMap::new(),
            structure_scores: Some(weights(&[("recA", 0.9), ("recB", 0.2)])),
            ..FeedbackUpdate::default()
        });

        let ranked = store.rank(&["recB", "recNew", "recA"]);
        assert_eq!(
            ranked,
            vec![
                ("recA".to_string(), 0.9),
                ("recNew".to_string(), 0.5),
                ("recB".to_string(), 0.2),
            ]
        );
    }

    #[test]
    fn style_guidance_lists_strong_weak_and_examples() {
        let store = PreferenceStore::default();
        store.update(FeedbackUpdate {
            attribute_weights: weights(&[
                ("relaxed_fit", 0.82),
                ("earth_tones", 0.4),
                ("high_shine", 0.1),
            ]),
            structure_insights: Some(HashMap::from([(
                "recA".to_string(),
                StructureInsights {
                    top_prompts: vec![PromptInsight {
                        prompt_preview: "A tailored trench in fog".to_string(),
                        success_rate: 0.85,
                        sample_count: 12,
                    }],
                    avg_success_rate: 0.6,
                },
            )])),
            ..FeedbackUpdate::default()
        });

        let guidance = store.style_guidance(Some("recA"));
        assert!(guidance.contains("PREFERRED ATTRIBUTES (incorporate these): relaxed fit (0.8)"));
        assert!(guidance.contains("LESS FAVORED ATTRIBUTES (use sparingly): high shine"));
        assert!(guidance.contains("  • \"A tailored trench in fog...\" (85% success)"));
        assert!(!guidance.contains("earth tones"));

        let without_structure = store.style_guidance(None);
        assert!(!without_structure.contains("HIGH-PERFORMING"));
    }

    #[test]
    fn style_guidance_is_empty_without_preferences() {
        assert_eq!(PreferenceStore::default().style_guidance(Some("recA")), "");
    }

    #[test]
    fn weighted_adjectives_filter_and_map() {
        let store = PreferenceStore::default();
        store.update(FeedbackUpdate {
            attribute_weights: weights(&[
                ("luxe_hand", 0.7),
                ("drapey", 0.9),
                ("boxy", 0.3),
                ("unlisted", 0.95),
            ]),
            ..FeedbackUpdate::default()
        });

        assert_eq!(
            store.weighted_adjectives(),
            vec![("draped".to_string(), 0.9), ("luxurious".to_string(), 0.7)]
        );
    }
}
