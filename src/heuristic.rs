//! Keyword-count processing heuristic.
//!
//! A deterministic, I/O-free stand-in for the processing-score oracle. It
//! looks only at how many ingredients a product lists and how many
//! ultra-processing markers appear among them.

/// Ingredient markers typical of industrial formulations. Matched
/// case-insensitively as substrings of each ingredient.
pub const ULTRA_PROCESSED_MARKERS: &[&str] = &[
    "high fructose corn syrup",
    "corn syrup",
    "hydrogenated",
    "emulsifier",
    "modified starch",
    "modified food starch",
    "maltodextrin",
    "dextrose",
    "artificial flavor",
    "natural flavors",
    "artificial color",
    "mono and diglycerides",
    "polysorbate",
    "carrageenan",
    "soy lecithin",
    "sodium nitrite",
    "aspartame",
    "sucralose",
    "acesulfame",
    "monosodium glutamate",
    "xanthan gum",
    "guar gum",
    "cellulose gum",
    "protein isolate",
];

/// Fixed explanation for each score level, index 0 = score 1.
pub const EXPLANATIONS: [&str; 5] = [
    "Minimally processed: a single ingredient or a few easily recognizable whole foods.",
    "Slightly processed: a short ingredient list with no industrial additives.",
    "Processed: a moderate number of ingredients, still largely recognizable.",
    "Ultra-processed: many ingredients, including additives not used in home kitchens.",
    "Highly ultra-processed: a long ingredient list dominated by industrial formulations and additives.",
];

/// Score a tokenized ingredient list from 1 (minimally processed) to 5.
///
/// Each marker counts at most once, however many ingredients contain it.
pub fn heuristic_score<S: AsRef<str>>(ingredients: &[S]) -> (u8, &'static str) {
    let count = ingredients.len();
    let lowered: Vec<String> = ingredients
        .iter()
        .map(|i| i.as_ref().to_lowercase())
        .collect();

    let matches = ULTRA_PROCESSED_MARKERS
        .iter()
        .filter(|marker| lowered.iter().any(|ingredient| ingredient.contains(*marker)))
        .count();

    let score = if count <= 1 {
        1
    } else if count <= 5 && matches == 0 {
        2
    } else if count <= 10 && matches <= 1 {
        3
    } else if matches >= 4 || count > 20 {
        5
    } else {
        4
    };

    (score, EXPLANATIONS[score as usize - 1])
}
