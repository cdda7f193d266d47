use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::prompts::types::SamplingContext;

pub const SUFFIX_MARKER: &str = "---";
pub const PREFERENCE_ADJECTIVE_KEY: &str = "preferenceAdjective";
const LOWERCASE_COLOR_TOKEN: &str = "color.toLowerCase()";

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid placeholder regex"));

fn join_first(values: &[String], limit: usize) -> String {
    values
        .iter()
        .take(limit)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_variable_map(context: &SamplingContext) -> HashMap<String, String> {
    let garment = &context.garment;
    let design_elements = garment.primary_design_elements.join(", ");
    let premium = garment.premium_constructions.join(", ");
    let technical = garment.technical_features.join(", ");

    let mut variables = HashMap::new();
    variables.insert("designer".to_string(), context.designer.name.clone());
    variables.insert("color".to_string(), context.color.name.clone());
    variables.insert("garmentName".to_string(), garment.name.clone());
    variables.insert(
        "pde1".to_string(),
        garment.primary_design_elements.first().cloned().unwrap_or_default(),
    );
    variables.insert("designElements".to_string(), design_elements);
    variables.insert("pcs".to_string(), premium.clone());
    variables.insert("premiumConstruction".to_string(), premium);
    variables.insert("tcs".to_string(), technical.clone());
    variables.insert("technicalConstruction".to_string(), technical);
    variables.insert(
        "premiumConstructions".to_string(),
        join_first(&garment.premium_constructions, 2),
    );
    variables.insert(
        "technicalConstructions".to_string(),
        join_first(&garment.technical_features, 2),
    );
    variables
}

/// Replaces every `${name}` in the skeleton. Unknown names become empty.
pub fn fill_skeleton(skeleton: &str, variables: &HashMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(skeleton, |caps: &Captures| {
            let key = &caps[1];
            if key == LOWERCASE_COLOR_TOKEN {
                return variables
                    .get("color")
                    .map(|color| color.to_lowercase())
                    .unwrap_or_default();
            }
            variables.get(key).cloned().unwrap_or_default()
        })
        .into_owned()
}

pub fn finalize_prompt_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.ends_with(SUFFIX_MARKER) {
        trimmed.to_string()
    } else {
        format!("{trimmed} {SUFFIX_MARKER}")
    }
}

pub fn render_prompt(skeleton: &str, variables: &HashMap<String, String>) -> String {
    finalize_prompt_text(&fill_skeleton(skeleton, variables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::types::{Color, Designer, Garment, PromptStructure};

    fn context(skeleton: &str) -> SamplingContext {
        SamplingContext {
            designer: Designer {
                id: "recDesigner1".to_string(),
                name: "Prada".to_string(),
                style: Vec::new(),
            },
            color: Color {
                id: "recColor1".to_string(),
                name: "Cream".to_string(),
            },
            garment: Garment {
                id: "recGarment".to_string(),
                name: "Safari Jacket".to_string(),
                primary_design_elements: vec![
                    "Convertible Sleeves".to_string(),
                    "Storm Flap".to_string(),
                ],
                technical_features: vec![
                    "Moisture-wicking".to_string(),
                    "Four-way stretch".to_string(),
                    "UPF 50".to_string(),
                ],
                premium_constructions: vec!["French Seams".to_string()],
            },
            prompt_structure: PromptStructure {
                id: "recStruct".to_string(),
                structure_id: String::new(),
                renderer: "Recraft".to_string(),
                skeleton: skeleton.to_string(),
                outlier_count: 0.0,
                usage_count: 0.0,
                avg_rating: 0.0,
                z_score: 0.0,
                age_weeks: 0.0,
                ai_critique: String::new(),
                comments: String::new(),
            },
        }
    }

    fn render(skeleton: &str) -> String {
        let ctx = context(skeleton);
        render_prompt(skeleton, &build_variable_map(&ctx))
    }

    #[test]
    fn existing_marker_is_not_duplicated() {
        assert_eq!(render("${designer} wears ${color} ---"), "Prada wears Cream ---");
    }

    #[test]
    fn marker_is_appended_when_missing() {
        assert_eq!(render("  ${designer} wears ${color}  "), "Prada wears Cream ---");
    }

    #[test]
    fn lowercase_color_and_aliases() {
        assert_eq!(
            render("${color.toLowerCase()} | ${pde1} | ${designElements}"),
            "cream | Convertible Sleeves | Convertible Sleeves, Storm Flap ---"
        );
        assert_eq!(
            render("${tcs} / ${technicalConstruction} / ${technicalConstructions}"),
            "Moisture-wicking, Four-way stretch, UPF 50 / Moisture-wicking, Four-way stretch, UPF 50 / Moisture-wicking, Four-way stretch ---"
        );
        assert_eq!(
            render("${pcs}|${premiumConstruction}|${premiumConstructions}"),
            "French Seams|French Seams|French Seams ---"
        );
    }

    #[test]
    fn unknown_placeholders_become_empty() {
        assert_eq!(render("${garmentName} ${nope}"), "Safari Jacket ---");
    }

    #[test]
    fn empty_lists_yield_empty_values() {
        let mut ctx = context("");
        ctx.garment.primary_design_elements.clear();
        ctx.garment.premium_constructions.clear();
        let vars = build_variable_map(&ctx);
        assert_eq!(vars["pde1"], "");
        assert_eq!(vars["premiumConstructions"], "");
        assert_eq!(render_prompt("[${pde1}]", &vars), "[] ---");
    }
}
