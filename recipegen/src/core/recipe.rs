//! The structured payload returned by text generation and its stored form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Serialization format version written alongside every stored body.
pub const BODY_FORMAT_VERSION: u32 = 1;

/// The unit system a recipe is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitSystem {
    /// Cups, ounces, Fahrenheit.
    #[default]
    #[serde(rename = "us customary", alias = "US Customary", alias = "us_customary")]
    UsCustomary,
    /// Grams, litres, Celsius.
    #[serde(rename = "metric", alias = "Metric")]
    Metric,
}

impl UnitSystem {
    /// Maps a stored numeric preference, falling back to US customary.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Metric,
            _ => Self::UsCustomary,
        }
    }

    /// Returns the text substituted into prompts.
    #[must_use]
    pub fn text(&self) -> &'static str {
        match self {
            Self::UsCustomary => "US Customary",
            Self::Metric => "Metric",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// One ingredient line.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ingredient {
    /// Ingredient name without unit or amount.
    #[serde(default)]
    pub name: String,
    /// Unit in the requested unit system.
    #[serde(default)]
    pub unit: String,
    /// Quantity in `unit`.
    #[serde(default)]
    pub amount: f64,
}

/// A single recipe: the main dish or a sub-recipe such as a sauce.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecipeSection {
    /// Name of this recipe.
    #[serde(default)]
    pub recipe_name: String,
    /// Ingredients used.
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    /// Unnumbered preparation steps.
    #[serde(default)]
    pub instructions: Vec<String>,
    /// Total time in minutes.
    #[serde(default)]
    pub time_to_cook: f64,
}

impl RecipeSection {
    /// Returns true if the section has neither ingredients nor steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty() && self.instructions.is_empty()
    }
}

/// The structured payload produced by the text-generation call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecipeDef {
    /// Title of the recipe or meal.
    #[serde(default)]
    pub title: String,
    /// The main recipe.
    #[serde(default)]
    pub main_recipe: RecipeSection,
    /// Sides, sauces, doughs and the like.
    #[serde(default)]
    pub sub_recipes: Vec<RecipeSection>,
    /// Prompt for the illustrative image.
    #[serde(default)]
    pub image_prompt: String,
    /// Unit system the model says it used.
    #[serde(default)]
    pub unit_system: UnitSystem,
    /// Raw tag names, normalized before storage.
    #[serde(default)]
    pub hashtags: Vec<String>,
}

impl RecipeDef {
    /// Parses the raw JSON arguments returned by the text call.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Checks the fields that must be present before the body is persisted.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("payload has an empty title".to_string());
        }
        if self.main_recipe.is_empty() {
            return Err("payload has an empty main recipe".to_string());
        }
        Ok(())
    }

    /// Returns the stored body for this payload.
    #[must_use]
    pub fn body(&self) -> RecipeBody {
        RecipeBody {
            main_recipe: self.main_recipe.clone(),
            sub_recipes: self.sub_recipes.clone(),
            image_prompt: self.image_prompt.clone(),
        }
    }
}

/// The persisted subset of a [`RecipeDef`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecipeBody {
    /// The main recipe.
    pub main_recipe: RecipeSection,
    /// Sub-recipes.
    #[serde(default)]
    pub sub_recipes: Vec<RecipeSection>,
    /// The image prompt that produced the stored image.
    #[serde(default)]
    pub image_prompt: String,
}

impl RecipeBody {
    /// Serializes the body under the current format version.
    pub fn encode(&self) -> Result<EncodedBody, serde_json::Error> {
        Ok(EncodedBody {
            version: BODY_FORMAT_VERSION,
            json: serde_json::to_string(self)?,
        })
    }
}

/// A body as stored: opaque JSON tagged with its format version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedBody {
    /// Format version; immutable once written.
    pub version: u32,
    /// The serialized body.
    pub json: String,
}

impl EncodedBody {
    /// Returns true if nothing was serialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.json.trim().is_empty()
    }

    /// Decodes the body, dispatching on the stored version.
    pub fn decode(&self) -> Result<RecipeBody, String> {
        match self.version {
            1 => serde_json::from_str(&self.json).map_err(|e| e.to_string()),
            other => Err(format!("unsupported body format version: {other}")),
        }
    }
}
