//! Prompt template registry.
//!
//! Templates use `{{variable}}` placeholders. The standard registry carries
//! the prompts used by the FlowMentor activities.

use crate::backend::GenerationRequest;
use crate::error::PromptError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};

/// Template used to ask for day-plan micro tips.
pub const DAY_PLAN_TIPS: &str = "day_plan_tips";
/// Template used to summarize a daily reflection.
pub const DAILY_SUMMARY: &str = "daily_summary";
/// Template used to justify weekly micro-goals.
pub const MICRO_GOALS: &str = "micro_goals";

const COACH_SYSTEM_PROMPT: &str =
    "You are FlowMentor, a calm productivity coach. Answer with short, concrete sentences.";

/// A prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name (used for lookup).
    pub name: String,
    /// Template content with placeholders.
    pub content: String,
    /// Optional system prompt.
    pub system_prompt: Option<String>,
    /// Variable definitions (name -> definition).
    pub variables: BTreeMap<String, VariableDefinition>,
}

/// Definition of a template variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDefinition {
    /// Description of what this variable is for.
    pub description: String,
    /// Whether this variable is required.
    pub required: bool,
    /// Default value if not provided.
    pub default: Option<JsonValue>,
}

impl VariableDefinition {
    /// Creates a required variable definition.
    #[must_use]
    pub fn required(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Creates an optional variable definition.
    #[must_use]
    pub fn optional(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: false,
            default: None,
        }
    }

    /// Sets a default value.
    #[must_use]
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }
}

impl PromptTemplate {
    /// Creates a new prompt template.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            system_prompt: None,
            variables: BTreeMap::new(),
        }
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Adds a variable definition.
    #[must_use]
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        definition: VariableDefinition,
    ) -> Self {
        self.variables.insert(name.into(), definition);
        self
    }

    /// Renders the template, substituting `{{name}}` placeholders.
    ///
    /// Placeholders without a supplied value fall back to the variable's
    /// default; anything still unresolved is left in place.
    #[must_use]
    pub fn render(&self, variables: &HashMap<String, JsonValue>) -> String {
        let mut result = self.content.clone();

        for (name, value) in variables {
            result = result.replace(&placeholder(name), &plain_text(value));
        }

        for (name, def) in &self.variables {
            let placeholder = placeholder(name);
            if let Some(default) = &def.default
                && result.contains(&placeholder)
            {
                result = result.replace(&placeholder, &plain_text(default));
            }
        }

        result
    }

    /// Validates that all required variables are provided.
    ///
    /// # Errors
    ///
    /// Returns the names of the missing variables.
    pub fn validate_variables(
        &self,
        variables: &HashMap<String, JsonValue>,
    ) -> Result<(), PromptError> {
        let missing: Vec<String> = self
            .variables
            .iter()
            .filter(|(_, def)| def.required && def.default.is_none())
            .filter(|(name, _)| !variables.contains_key(*name))
            .map(|(name, _)| name.clone())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PromptError::MissingVariables {
                template: self.name.clone(),
                variables: missing,
            })
        }
    }
}

fn placeholder(name: &str) -> String {
    format!("{{{{{name}}}}}")
}

fn plain_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(items) => items
            .iter()
            .map(plain_text)
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

/// Registry of prompt templates.
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Creates a registry holding the FlowMentor activity prompts.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register(
            PromptTemplate::new(
                DAY_PLAN_TIPS,
                "The user's energy today is {{energy_level}}/5. Their priorities are: \
                 {{priorities}}. Morning note: {{morning_reflection}}. \
                 Give three one-line tips for the day.",
            )
            .with_system_prompt(COACH_SYSTEM_PROMPT)
            .with_variable("energy_level", VariableDefinition::required("Energy from 1 to 5"))
            .with_variable("priorities", VariableDefinition::required("Priorities for today"))
            .with_variable(
                "morning_reflection",
                VariableDefinition::optional("Free-form morning note")
                    .with_default(JsonValue::String("none".to_string())),
            ),
        );

        registry.register(
            PromptTemplate::new(
                DAILY_SUMMARY,
                "Summarize this day in two sentences. Completed {{completed_blocks}} of \
                 {{total_blocks}} focus blocks, productivity {{overall_productivity}}/5. \
                 Wins: {{wins}}. Challenges: {{challenges}}. Reflection: {{reflection_text}}",
            )
            .with_system_prompt(COACH_SYSTEM_PROMPT)
            .with_variable("completed_blocks", VariableDefinition::required("Blocks done"))
            .with_variable("total_blocks", VariableDefinition::required("Blocks planned"))
            .with_variable(
                "overall_productivity",
                VariableDefinition::required("Self-rated productivity"),
            )
            .with_variable("wins", VariableDefinition::optional("Wins of the day"))
            .with_variable("challenges", VariableDefinition::optional("Challenges of the day"))
            .with_variable(
                "reflection_text",
                VariableDefinition::optional("Free-form reflection")
                    .with_default(JsonValue::String(String::new())),
            ),
        );

        registry.register(
            PromptTemplate::new(
                MICRO_GOALS,
                "Last week the user completed {{completion_rate}}% of planned focus blocks \
                 with average productivity {{average_productivity}}/5. Recurring \
                 challenges: {{recurring_challenges}}. Explain in one sentence why a small \
                 goal for next week would help.",
            )
            .with_system_prompt(COACH_SYSTEM_PROMPT)
            .with_variable("completion_rate", VariableDefinition::required("Completion %"))
            .with_variable(
                "average_productivity",
                VariableDefinition::required("Average productivity"),
            )
            .with_variable(
                "recurring_challenges",
                VariableDefinition::optional("Challenges seen more than once")
                    .with_default(JsonValue::String("none recorded".to_string())),
            ),
        );

        registry
    }

    /// Registers a template.
    pub fn register(&mut self, template: PromptTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Gets a template by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }

    /// Builds a generation request from a named template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is unknown or a required variable is
    /// missing.
    pub fn request(
        &self,
        name: &str,
        variables: &HashMap<String, JsonValue>,
    ) -> Result<GenerationRequest, PromptError> {
        let template = self.get(name).ok_or_else(|| PromptError::TemplateNotFound {
            name: name.to_string(),
        })?;
        template.validate_variables(variables)?;

        let mut request = GenerationRequest::new(template.render(variables)).with_template(name);
        if let Some(system) = &template.system_prompt {
            request = request.with_system(system.clone());
        }
        Ok(request)
    }

    /// Returns the number of registered templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
