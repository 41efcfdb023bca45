//! Builds the text-generation request from templates, request and history.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::PromptTemplates;
use crate::core::{GenerationMode, GenerationRequest, HistoryEntry};

/// Name of the structured-output function the model must call.
pub const RECIPE_FUNCTION_NAME: &str = "create_recipe";

/// One message in the chat sent to the text service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatTurn {
    /// System instructions.
    System {
        /// Message text.
        content: String,
    },
    /// A user message.
    User {
        /// Message text.
        content: String,
    },
    /// A previous structured reply replayed as context.
    Assistant {
        /// Function called.
        name: String,
        /// JSON arguments returned.
        arguments: String,
    },
}

/// A complete text-generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
    /// Messages in order.
    pub messages: Vec<ChatTurn>,
    /// Function the reply must call.
    pub function_name: String,
    /// JSON schema of the function arguments.
    pub schema: serde_json::Value,
}

impl TextRequest {
    /// Returns the last user message, used as the history prompt.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|turn| match turn {
            ChatTurn::User { content } => Some(content.as_str()),
            _ => None,
        })
    }
}

/// Builds the request for one run.
///
/// Initial runs send the system and user messages. Refinement replays the
/// record's history: the first entry as the assistant's original reply, each
/// later entry as a follow-up and its reply, then the new follow-up.
#[must_use]
pub fn build_text_request(
    templates: &PromptTemplates,
    request: &GenerationRequest,
    history: &[HistoryEntry],
) -> TextRequest {
    let system = templates
        .system
        .replace("{unitSystem}", request.unit_system.text())
        .replace("{requirements}", &request.requirements);
    let user = templates.user.replace("{userPrompt}", &request.prompt);

    let mut messages = vec![ChatTurn::System { content: system }, ChatTurn::User { content: user }];

    if let GenerationMode::Refine { followup } = &request.mode {
        for (i, entry) in history.iter().enumerate() {
            if i > 0 {
                messages.push(ChatTurn::User {
                    content: refinement(templates, &entry.prompt),
                });
            }
            messages.push(ChatTurn::Assistant {
                name: RECIPE_FUNCTION_NAME.to_string(),
                arguments: entry.response.clone(),
            });
        }
        messages.push(ChatTurn::User {
            content: refinement(templates, followup),
        });
    }

    TextRequest {
        messages,
        function_name: RECIPE_FUNCTION_NAME.to_string(),
        schema: recipe_schema(),
    }
}

fn refinement(templates: &PromptTemplates, followup: &str) -> String {
    templates.refinement.replace("{followupPrompt}", followup)
}

/// JSON schema for the `create_recipe` arguments.
#[must_use]
pub fn recipe_schema() -> serde_json::Value {
    let recipe = json!({
        "type": "object",
        "properties": {
            "recipe_name": {"type": "string", "description": "Name of the recipe"},
            "ingredients": {
                "type": "array",
                "description": "Ingredients used in the recipe",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "Ingredient name without unit or amount"},
                        "unit": {
                            "type": "string",
                            "description": "Unit in the requested unit system",
                            "enum": ["pieces", "tsp", "tbsp", "fl oz", "cup", "pt", "qt", "gal", "oz", "lb",
                                     "mL", "L", "mg", "g", "kg", "pinch", "dash", "drop", "bushel"]
                        },
                        "amount": {"type": "number", "description": "Amount of the ingredient"}
                    },
                    "required": ["name", "unit", "amount"]
                }
            },
            "instructions": {
                "type": "array",
                "description": "Steps to prepare the recipe, unnumbered",
                "items": {"type": "string"}
            },
            "time_to_cook": {"type": "number", "description": "Total time in minutes"}
        },
        "required": ["recipe_name", "ingredients", "instructions", "time_to_cook"]
    });

    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string", "description": "Title of the recipe, or of the meal if there are several recipes"},
            "main_recipe": recipe.clone(),
            "sub_recipes": {
                "type": "array",
                "description": "Additional recipes such as sauces, sides, buns or tortillas",
                "items": recipe
            },
            "image_prompt": {"type": "string", "description": "Prompt for an image of the finished dish"},
            "unit_system": {
                "type": "string",
                "enum": ["us customary", "metric"],
                "description": "Unit system used"
            },
            "hashtags": {
                "type": "array",
                "description": "Ten or more general tags for the recipe, alphanumeric, camelCase, without '#'",
                "items": {"type": "string"}
            }
        },
        "required": ["title", "main_recipe", "image_prompt", "unit_system", "hashtags"]
    })
}
