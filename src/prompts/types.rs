use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Designer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub style: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Garment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub primary_design_elements: Vec<String>,
    #[serde(default)]
    pub technical_features: Vec<String>,
    #[serde(default)]
    pub premium_constructions: Vec<String>,
}

/// Garments split the way selection needs them: tops, and everything else
/// (dresses, outerwear and pants merged).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GarmentPools {
    #[serde(default)]
    pub tops: Vec<Garment>,
    #[serde(default)]
    pub others: Vec<Garment>,
}

impl GarmentPools {
    pub fn iter(&self) -> impl Iterator<Item = &Garment> {
        self.tops.iter().chain(self.others.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptStructure {
    pub id: String,
    #[serde(default, rename = "structureId")]
    pub structure_id: String,
    pub renderer: String,
    pub skeleton: String,
    #[serde(default)]
    pub outlier_count: f64,
    #[serde(default)]
    pub usage_count: f64,
    #[serde(default)]
    pub avg_rating: f64,
    #[serde(default)]
    pub z_score: f64,
    #[serde(default)]
    pub age_weeks: f64,
    #[serde(default)]
    pub ai_critique: String,
    #[serde(default)]
    pub comments: String,
}

/// One resolved designer/color/garment/structure combination for a single
/// output prompt. Serialised as-is into the generator payload.
#[derive(Debug, Clone, Serialize)]
pub struct SamplingContext {
    pub designer: Designer,
    pub color: Color,
    pub garment: Garment,
    pub prompt_structure: PromptStructure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPrompt {
    pub prompt_text: String,
    pub designer_id: String,
    pub garment_id: String,
    pub prompt_structure_id: String,
    pub renderer: String,
}

/// Candidate records for one generation request, as supplied by the record
/// source.
#[derive(Debug, Clone, Default)]
pub struct PromptPools {
    pub designers: Vec<Designer>,
    pub colors: Vec<Color>,
    pub garments: GarmentPools,
    pub structures: Vec<PromptStructure>,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub num_prompts: usize,
    pub renderer: String,
}
