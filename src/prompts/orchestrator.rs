use std::collections::HashSet;

use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::llm::TextGenerator;
use crate::prompts::error::GenerationError;
use crate::prompts::instructions::build_system_instruction;
use crate::prompts::preferences::{PreferenceState, PreferenceStore};
use crate::prompts::sampling::weighted_choice;
use crate::prompts::selection::SelectionEngine;
use crate::prompts::template::{
    build_variable_map, finalize_prompt_text, render_prompt, PREFERENCE_ADJECTIVE_KEY,
};
use crate::prompts::types::{
    GeneratedPrompt, GenerationRequest, PromptPools, PromptStructure, SamplingContext,
};

pub const MAX_GENERATION_ATTEMPTS: usize = 2;
/// Hard ceiling on one batch; every context is materialised up front.
pub const MAX_PROMPTS_PER_REQUEST: usize = 200;
const ADJECTIVE_CANDIDATES: usize = 3;

/// Ids an accepted generator item may reference.
struct KnownIds<'a> {
    designers: HashSet<&'a str>,
    garments: HashSet<&'a str>,
    structures: HashSet<&'a str>,
}

impl<'a> KnownIds<'a> {
    fn new(pools: &'a PromptPools, structures: &'a [PromptStructure]) -> Self {
        KnownIds {
            designers: pools.designers.iter().map(|d| d.id.as_str()).collect(),
            garments: pools.garments.iter().map(|g| g.id.as_str()).collect(),
            structures: structures.iter().map(|s| s.id.as_str()).collect(),
        }
    }
}

/// Generates exactly `request.num_prompts` prompts, or fails.
///
/// Without a generator every prompt is filled locally from its structure's
/// skeleton. With one, up to [`MAX_GENERATION_ATTEMPTS`] calls are made and
/// each retry only asks for the shortfall.
pub async fn generate_prompts<G, R>(
    request: &GenerationRequest,
    pools: &PromptPools,
    store: &PreferenceStore,
    generator: Option<&G>,
    rng: &mut R,
) -> Result<Vec<GeneratedPrompt>, GenerationError>
where
    G: TextGenerator,
    R: Rng + Send,
{
    if request.num_prompts == 0 {
        return Err(GenerationError::InvalidRequest(
            "num_prompts must be greater than 0".to_string(),
        ));
    }
    if request.num_prompts > MAX_PROMPTS_PER_REQUEST {
        return Err(GenerationError::InvalidRequest(format!(
            "num_prompts must be at most {MAX_PROMPTS_PER_REQUEST}"
        )));
    }
    let renderer = request.renderer.as_str();
    if renderer.trim().is_empty() {
        return Err(GenerationError::InvalidRequest(
            "renderer is required".to_string(),
        ));
    }

    let structures = pools
        .structures
        .iter()
        .filter(|structure| structure.renderer == renderer)
        .cloned()
        .collect::<Vec<_>>();
    if structures.is_empty() {
        return Err(GenerationError::NoStructuresForRenderer(renderer.to_string()));
    }
    if pools.designers.is_empty() || pools.colors.is_empty() {
        return Err(GenerationError::MissingDesignersOrColors);
    }

    let (explore, preferences) = store.begin_batch(rng);
    if explore {
        info!(
            "Exploration mode activated for batch of {} prompts",
            request.num_prompts
        );
    } else {
        info!("Exploitation mode for batch of {} prompts", request.num_prompts);
    }

    let engine = SelectionEngine::new(
        &pools.designers,
        &pools.colors,
        &pools.garments,
        &structures,
        &preferences,
    );
    let contexts = engine.build_contexts(request.num_prompts, explore, rng)?;

    let Some(generator) = generator else {
        return Ok(generate_locally(
            &contexts,
            renderer,
            explore,
            &preferences,
            rng,
        ));
    };

    let known_ids = KnownIds::new(pools, &structures);
    let target = request.num_prompts;
    let mut accepted: Vec<GeneratedPrompt> = Vec::with_capacity(target);
    let mut remaining = contexts;

    for attempt in 0..MAX_GENERATION_ATTEMPTS {
        let primary_structure = primary_structure_id(&remaining);
        let instruction =
            build_system_instruction(&preferences, primary_structure.as_deref(), explore);
        let payload = json!({
            "num_prompts": remaining.len(),
            "renderer": renderer,
            "prompt_structures": structures,
            "prompt_contexts": remaining,
            "explore_mode": explore,
        });

        let parsed = match generator.complete(&instruction, &payload).await {
            Ok(raw) => parse_envelope(&raw),
            Err(err) => {
                warn!(
                    "Prompt generator call failed (attempt={}/{}): {}",
                    attempt + 1,
                    MAX_GENERATION_ATTEMPTS,
                    err
                );
                continue;
            }
        };
        let Some(envelope) = parsed else {
            warn!(
                "Prompt generator returned malformed JSON (attempt={}/{})",
                attempt + 1,
                MAX_GENERATION_ATTEMPTS
            );
            continue;
        };

        collect_valid_prompts(&envelope, renderer, &known_ids, target, &mut accepted);
        if accepted.len() >= target {
            accepted.truncate(target);
            return Ok(accepted);
        }

        let shortfall = target - accepted.len();
        info!(
            "Prompt generator short by {} prompt(s) after attempt {}/{}",
            shortfall,
            attempt + 1,
            MAX_GENERATION_ATTEMPTS
        );
        if attempt + 1 < MAX_GENERATION_ATTEMPTS {
            remaining = engine.build_contexts(shortfall, explore, rng)?;
        }
    }

    Err(GenerationError::Exhausted {
        requested: target,
        produced: accepted.len(),
    })
}

fn generate_locally<R: Rng + ?Sized>(
    contexts: &[SamplingContext],
    renderer: &str,
    explore: bool,
    preferences: &PreferenceState,
    rng: &mut R,
) -> Vec<GeneratedPrompt> {
    let adjectives = if !explore && preferences.has_preferences() {
        preferences
            .weighted_adjectives()
            .into_iter()
            .take(ADJECTIVE_CANDIDATES)
            .collect::<Vec<_>>()
    } else {
        Vec::new()
    };
    let adjective_weights = adjectives.iter().map(|(_, w)| *w).collect::<Vec<_>>();

    contexts
        .iter()
        .map(|context| {
            let mut variables = build_variable_map(context);
            if let Some((adjective, _)) = weighted_choice(&adjectives, &adjective_weights, rng) {
                variables.insert(PREFERENCE_ADJECTIVE_KEY.to_string(), adjective.clone());
            }
            GeneratedPrompt {
                prompt_text: render_prompt(&context.prompt_structure.skeleton, &variables),
                designer_id: context.designer.id.clone(),
                garment_id: context.garment.id.clone(),
                prompt_structure_id: context.prompt_structure.id.clone(),
                renderer: renderer.to_string(),
            }
        })
        .collect()
}

/// Most frequent structure id among the contexts; ties go to the one seen
/// first.
pub fn primary_structure_id(contexts: &[SamplingContext]) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for context in contexts {
        let id = context.prompt_structure.id.as_str();
        match counts.iter_mut().find(|(seen, _)| *seen == id) {
            Some((_, count)) => *count += 1,
            None => counts.push((id, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (id, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((id, count));
        }
    }
    best.map(|(id, _)| id.to_string())
}

/// Parses the generator's reply. Tolerates prose or code fences around the
/// JSON object.
fn parse_envelope(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

fn collect_valid_prompts(
    envelope: &Value,
    renderer: &str,
    known_ids: &KnownIds<'_>,
    target: usize,
    accepted: &mut Vec<GeneratedPrompt>,
) {
    let Some(items) = envelope.get("prompts").and_then(|v| v.as_array()) else {
        debug!("Prompt generator response had no prompts array");
        return;
    };

    for item in items {
        if accepted.len() >= target {
            break;
        }
        match validate_prompt(item, renderer, known_ids) {
            Some(prompt) => accepted.push(prompt),
            None => debug!("Dropping invalid generated prompt: {}", item),
        }
    }
}

fn validate_prompt(item: &Value, renderer: &str, known_ids: &KnownIds<'_>) -> Option<GeneratedPrompt> {
    let field = |name: &str| item.get(name).and_then(|v| v.as_str());

    let prompt_text = field("promptText")?;
    let designer_id = field("designerId")?;
    let garment_id = field("garmentId")?;
    let prompt_structure_id = field("promptStructureId")?;
    let item_renderer = field("renderer")?;

    if item_renderer != renderer {
        return None;
    }
    if !known_ids.designers.contains(designer_id)
        || !known_ids.garments.contains(garment_id)
        || !known_ids.structures.contains(prompt_structure_id)
    {
        return None;
    }

    Some(GeneratedPrompt {
        prompt_text: finalize_prompt_text(prompt_text),
        designer_id: designer_id.to_string(),
        garment_id: garment_id.to_string(),
        prompt_structure_id: prompt_structure_id.to_string(),
        renderer: renderer.to_string(),
    })
}
